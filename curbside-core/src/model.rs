//! Domain data structures for tickets, shifts, services, and locations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default scheduling window length: three weeks, in seconds.
pub const STD_WINDOW_SECS: i64 = 60 * 60 * 24 * 7 * 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Server-assigned identifier for a ticket.
pub struct TicketId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a customer vehicle.
pub struct VehicleId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a bookable service.
pub struct ServiceId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a technician shift.
pub struct ShiftId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a user account.
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a service hub.
pub struct HubId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a payment charge.
pub struct ChargeId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier for a saved location.
pub struct LocationId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// A resolved latitude/longitude pair.
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A saved pickup or drop-off location.
pub struct Location {
    /// Unique identifier.
    pub id: LocationId,
    /// Human-friendly label, e.g. "Home" or a street address.
    pub label: String,
    /// Geocoded position, once resolved. Scheduling queries require this.
    pub point: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// A bookable maintenance service.
pub struct Service {
    /// Unique identifier.
    pub id: ServiceId,
    /// Display name.
    pub name: String,
    /// Time needed to perform the service, in seconds.
    pub duration_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Submission status of a ticket.
///
/// The variant order matches the wire codes, so `status >= Status::Open`
/// means "submitted or further along".
pub enum Status {
    /// Freshly constructed client-side, never persisted.
    New,
    /// Being edited; not yet submitted.
    Draft,
    /// Submitted for scheduling.
    Open,
    /// Cancelled by the customer. Terminal.
    Cancelled,
    /// Work completed, closed server-side. Terminal.
    Closed,
    /// Awaiting remote confirmation.
    Pending,
}

impl Status {
    /// Wire code stored by the backend.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Status::New => -1,
            Status::Draft => 0,
            Status::Open => 1,
            Status::Cancelled => 2,
            Status::Closed => 3,
            Status::Pending => 4,
        }
    }

    /// Decode a wire code. Unrecognized codes fall back to [`Status::New`],
    /// matching the backend's treatment of absent status fields.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Draft,
            1 => Status::Open,
            2 => Status::Cancelled,
            3 => Status::Closed,
            4 => Status::Pending,
            _ => Status::New,
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Cancelled | Status::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Live progress stage reported by a technician during a service run.
pub enum TechnicianStatus {
    /// En route to the pickup location.
    DrivingPickup,
    /// Arriving at the pickup location.
    ArrivingPickup,
    /// En route to the shop.
    DrivingShop,
    /// Arriving at the shop.
    ArrivingShop,
    /// En route to the drop-off location.
    DrivingDropoff,
    /// Arriving at the drop-off location.
    ArrivingDropoff,
    /// Started on-site work.
    WorkingStartOnsite,
    /// Finished on-site work.
    WorkingEndOnsite,
}

impl TechnicianStatus {
    /// Wire code pushed to the gateway.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            TechnicianStatus::DrivingPickup => 1,
            TechnicianStatus::ArrivingPickup => 2,
            TechnicianStatus::DrivingShop => 3,
            TechnicianStatus::ArrivingShop => 4,
            TechnicianStatus::DrivingDropoff => 5,
            TechnicianStatus::ArrivingDropoff => 6,
            TechnicianStatus::WorkingStartOnsite => 7,
            TechnicianStatus::WorkingEndOnsite => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which of a user's contact points have been verified.
pub enum Verified {
    /// Neither email nor phone.
    Neither,
    /// Email only.
    Email,
    /// Phone only.
    Phone,
    /// Both email and phone.
    Both,
}

impl Verified {
    /// Combine the two verification flags reported by the gateway.
    #[must_use]
    pub fn from_flags(email: bool, phone: bool) -> Self {
        match (email, phone) {
            (true, true) => Verified::Both,
            (true, false) => Verified::Email,
            (false, true) => Verified::Phone,
            (false, false) => Verified::Neither,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A technician's bounded working window. The client only ever holds
/// read-only projections of these; the scheduling backend owns them.
pub struct Shift {
    /// Unique identifier.
    pub id: ShiftId,
    /// Technician assigned to the shift.
    pub technician: UserId,
    /// Hub the shift is based out of.
    pub hub: Option<HubId>,
    /// Start of the working window.
    pub start: DateTime<Utc>,
    /// End of the working window.
    pub end: DateTime<Utc>,
    /// Whether the shift is currently in effect.
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Inclusive time window in epoch seconds, used for roster queries.
pub struct TimeWindow {
    /// Window start (inclusive), epoch seconds.
    pub start: i64,
    /// Window end (inclusive), epoch seconds.
    pub end: i64,
}

impl TimeWindow {
    /// Build a window from raw epoch values. Inputs larger than `i32::MAX`
    /// are taken to be milliseconds and are normalized to seconds.
    #[must_use]
    pub fn from_epoch(start: i64, end: i64) -> Self {
        Self {
            start: normalize_secs(start),
            end: normalize_secs(end),
        }
    }

    /// A window of [`STD_WINDOW_SECS`] starting at the given instant.
    #[must_use]
    pub fn standard_from(start: DateTime<Utc>) -> Self {
        let secs = start.timestamp();
        Self {
            start: secs,
            end: secs + STD_WINDOW_SECS,
        }
    }

    /// Whether the instant falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let secs = instant.timestamp();
        secs >= self.start && secs <= self.end
    }
}

fn normalize_secs(value: i64) -> i64 {
    if value > i64::from(i32::MAX) {
        value / 1000
    } else {
        value
    }
}
