//! Day-by-day scheduling availability, rebuilt from every gateway query.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::model::ShiftId;

/// Number of half-hour slots in a full day grid.
pub const SLOTS_PER_DAY: usize = 48;

#[derive(Debug, Clone, Deserialize)]
/// A shift summary as reported inside an availability response.
pub struct ShiftOpening {
    /// Shift identifier.
    #[serde(rename = "objectId")]
    pub id: ShiftId,
    /// Travel/buffer seconds the gateway budgeted for this shift.
    #[serde(rename = "travelTime")]
    pub travel_secs: u32,
    /// Shift start.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    /// Half-hour slot weights for the shift.
    pub availability: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
/// Wire shape of the gateway's scheduling query response.
pub struct SchedulePayload {
    /// Number of day entries in `dates`.
    pub count: usize,
    /// One openings array per day, in calendar order from the query's start.
    pub dates: Vec<Vec<u32>>,
    /// Travel/buffer seconds to add ahead of any slot before presenting an
    /// actual appointment time.
    pub delay: u32,
    /// Earliest serviceable hour of day (0-23).
    pub open: u32,
    /// Latest serviceable hour of day (0-23).
    pub close: u32,
    /// Shifts backing the openings.
    #[serde(default)]
    pub shifts: Vec<ShiftOpening>,
}

#[derive(Debug, Clone)]
/// One day of the availability grid.
pub struct Day {
    /// The calendar date this entry describes.
    pub date: NaiveDate,
    /// Half-hour slot weights, 1-origin-indexed: a non-zero value at index
    /// `i` means the slot starting at `midnight + i * 30min` is bookable,
    /// and the value encodes remaining capacity or travel-adjusted slack.
    pub openings: Vec<u32>,
}

impl Day {
    /// Whether any slot on this day is bookable. Inactive days are kept in
    /// the grid; callers choose whether to hide or gray them out.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.openings.iter().any(|slot| *slot != 0)
    }

    /// Start of the 1-origin-indexed slot, or `None` when the index is out
    /// of range for this day's grid.
    #[must_use]
    pub fn slot_start(&self, index: usize) -> Option<NaiveDateTime> {
        if index == 0 || index > self.openings.len() {
            return None;
        }
        let minutes = i64::try_from(index).ok()? * 30;
        let midnight = self.date.and_hms_opt(0, 0, 0)?;
        midnight.checked_add_signed(Duration::minutes(minutes))
    }
}

#[derive(Debug, Clone)]
/// Result of one scheduling query. Derived from shift state that changes
/// continuously, so it is rebuilt per query and never cached.
pub struct Availability {
    /// Earliest serviceable hour of day (0-23).
    pub open: u32,
    /// Latest serviceable hour of day (0-23).
    pub close: u32,
    /// Descriptive travel/buffer seconds. Not subtracted from any slot by
    /// this engine; callers add it when presenting an appointment time.
    pub delay_secs: u32,
    /// One entry per day from the query's start date, in order.
    pub days: Vec<Day>,
    /// Shifts backing the grid.
    pub shifts: Vec<ShiftOpening>,
}

impl Availability {
    /// Reconstruct the day grid from a gateway payload, associating the
    /// `i`-th openings array with `start + i` days.
    #[must_use]
    pub fn from_payload(start: NaiveDate, payload: SchedulePayload) -> Self {
        if payload.count != payload.dates.len() {
            tracing::warn!(
                count = payload.count,
                dates = payload.dates.len(),
                "availability count disagrees with date entries"
            );
        }

        let mut days = Vec::with_capacity(payload.dates.len());
        for (index, openings) in payload.dates.into_iter().enumerate() {
            let date = u64::try_from(index)
                .ok()
                .and_then(|offset| start.checked_add_days(Days::new(offset)));
            let Some(date) = date else { break };
            days.push(Day { date, openings });
        }

        Self {
            open: payload.open,
            close: payload.close,
            delay_secs: payload.delay,
            days,
            shifts: payload.shifts,
        }
    }

    /// Days that have at least one bookable slot.
    pub fn active_days(&self) -> impl Iterator<Item = &Day> {
        self.days.iter().filter(|day| day.is_active())
    }
}

/// Default start for a scheduling query: the next midnight boundary after
/// the given instant.
#[must_use]
pub fn default_start(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or_else(|| now.date_naive())
}
