//! Grouping of scheduled tickets under a technician's shifts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Shift, ShiftId, Status, TimeWindow, UserId};
use crate::ports::{ApiError, ShiftStore, TicketStore};
use crate::ticket::Ticket;

#[derive(Debug)]
/// One shift and the tickets scheduled against it inside a window.
pub struct ShiftAssignment {
    /// The shift itself.
    pub shift: Shift,
    /// Tickets assigned to the shift, open or further along.
    pub tickets: Vec<Ticket>,
}

/// Resolves which tickets belong to which of a technician's shifts.
pub struct ShiftRegistry {
    shifts: Arc<dyn ShiftStore>,
    tickets: Arc<dyn TicketStore>,
}

impl ShiftRegistry {
    /// Create a registry over the given stores.
    #[must_use]
    pub fn new(shifts: Arc<dyn ShiftStore>, tickets: Arc<dyn TicketStore>) -> Self {
        Self { shifts, tickets }
    }

    /// Fetch the technician's active shifts starting inside the window, then
    /// the tickets assigned to them, grouped per shift.
    ///
    /// Only tickets at [`Status::Open`] or beyond, starting inside the
    /// window, are considered. Tickets whose shift id does not match any
    /// fetched shift are dropped silently; the shift list is the broadening
    /// filter, never the ticket list.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when either store query fails.
    pub async fn roster(
        &self,
        technician: &UserId,
        window: TimeWindow,
    ) -> Result<Vec<ShiftAssignment>, ApiError> {
        let shifts = self.shifts.active_shifts(technician, window).await?;
        let shift_ids: Vec<ShiftId> = shifts.iter().map(|shift| shift.id.clone()).collect();

        let tickets = self
            .tickets
            .tickets_for_shifts(&shift_ids, Status::Open, window)
            .await?;

        // Re-apply the constraints locally; stores are collaborators and may
        // over-return.
        let mut by_shift: HashMap<ShiftId, Vec<Ticket>> = HashMap::new();
        for ticket in tickets {
            if ticket.status() < Status::Open {
                continue;
            }
            if !ticket.start_time().is_some_and(|start| window.contains(start)) {
                continue;
            }
            let Some(shift_id) = ticket.shift() else {
                continue;
            };
            if !shift_ids.contains(shift_id) {
                continue;
            }
            by_shift.entry(shift_id.clone()).or_default().push(ticket);
        }

        Ok(shifts
            .into_iter()
            .map(|shift| {
                let tickets = by_shift.remove(&shift.id).unwrap_or_default();
                ShiftAssignment { shift, tickets }
            })
            .collect())
    }
}
