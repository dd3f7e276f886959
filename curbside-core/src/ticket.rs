//! Ticket lifecycle: status transitions, field mutation, and change listeners.
//!
//! All mutation goes through the methods here; UI code never writes fields
//! directly. Local mutations notify listeners synchronously, before any
//! remote persistence, so screens reflect edits without waiting on the
//! network. Remote reconciliation is tracked separately in [`SyncState`].

use std::fmt;

use chrono::{DateTime, Utc};

use crate::model::{ChargeId, Location, Service, ShiftId, Status, TicketId, VehicleId};
use crate::ports::ApiError;

#[derive(Debug, Clone)]
/// A single observed change to a ticket, carrying the field that moved.
pub enum TicketChange {
    /// The start time was set or cleared.
    Time(Option<DateTime<Utc>>),
    /// The service selection changed.
    Services {
        /// New combined duration of all selected services, in seconds.
        duration_secs: u32,
        /// The services now on the ticket.
        services: Vec<Service>,
    },
    /// A pickup or drop-off location changed; both are reported.
    Location {
        /// Current pickup location.
        pickup: Option<Location>,
        /// Current drop-off location.
        dropoff: Option<Location>,
    },
    /// The submission status changed.
    Status {
        /// Status before the transition.
        prev: Status,
        /// Status after the transition.
        next: Status,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Handle returned by [`Ticket::subscribe`], used to unsubscribe later.
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Reconciliation state of the most recent local mutation against the
/// remote side. Local state is optimistic and never rolled back; a
/// [`SyncState::Failed`] marker is how divergence is surfaced instead of
/// being silently dropped.
pub enum SyncState {
    /// No mutation awaiting reconciliation.
    Idle,
    /// A mutation was applied locally and the remote call is in flight.
    Pending,
    /// The remote side confirmed the last mutation.
    Committed,
    /// The remote call failed; local and remote state may diverge.
    Failed,
}

type Callback = Box<dyn Fn(&TicketChange) + Send + Sync>;

/// Observer registry keyed by subscription handle. Notification iterates a
/// stable snapshot of the entry list, so unsubscribing is deterministic and
/// never races a broadcast.
#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Callback)>,
}

impl Listeners {
    fn subscribe(&mut self, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    fn notify(&self, change: &TicketChange) {
        for (_, callback) in &self.entries {
            callback(change);
        }
    }
}

/// A service ticket for a customer vehicle, owned by the requesting session.
pub struct Ticket {
    id: Option<TicketId>,
    vehicle: Option<VehicleId>,
    status: Status,
    pickup: Option<Location>,
    dropoff: Option<Location>,
    start: Option<DateTime<Utc>>,
    services: Vec<Service>,
    duration_secs: u32,
    shift: Option<ShiftId>,
    charge: Option<ChargeId>,
    sync: SyncState,
    listeners: Listeners,
}

impl Ticket {
    /// Create a fresh, unpersisted ticket for the vehicle. Starts in
    /// [`Status::New`].
    #[must_use]
    pub fn new(vehicle: VehicleId) -> Self {
        Self {
            id: None,
            vehicle: Some(vehicle),
            status: Status::New,
            pickup: None,
            dropoff: None,
            start: None,
            services: Vec::new(),
            duration_secs: 0,
            shift: None,
            charge: None,
            sync: SyncState::Idle,
            listeners: Listeners::default(),
        }
    }

    /// Rebuild a ticket from a persisted record. Used by store
    /// implementations when hydrating query results.
    #[must_use]
    pub fn restore(
        id: TicketId,
        vehicle: Option<VehicleId>,
        status: Status,
        start: Option<DateTime<Utc>>,
        shift: Option<ShiftId>,
    ) -> Self {
        Self {
            id: Some(id),
            vehicle,
            status,
            pickup: None,
            dropoff: None,
            start,
            services: Vec::new(),
            duration_secs: 0,
            shift,
            charge: None,
            sync: SyncState::Idle,
            listeners: Listeners::default(),
        }
    }

    /// Server-assigned id, once persisted.
    #[must_use]
    pub fn id(&self) -> Option<&TicketId> {
        self.id.as_ref()
    }

    /// Record the id assigned by the store after first persistence.
    pub fn set_id(&mut self, id: TicketId) {
        self.id = Some(id);
    }

    /// Current submission status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// The vehicle this ticket services.
    #[must_use]
    pub fn vehicle(&self) -> Option<&VehicleId> {
        self.vehicle.as_ref()
    }

    /// Current pickup location.
    #[must_use]
    pub fn pickup(&self) -> Option<&Location> {
        self.pickup.as_ref()
    }

    /// Current drop-off location.
    #[must_use]
    pub fn dropoff(&self) -> Option<&Location> {
        self.dropoff.as_ref()
    }

    /// Scheduled start time, if set.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// Shift the ticket is scheduled against, if any.
    #[must_use]
    pub fn shift(&self) -> Option<&ShiftId> {
        self.shift.as_ref()
    }

    /// Charge attached for payment, if any.
    #[must_use]
    pub fn charge(&self) -> Option<&ChargeId> {
        self.charge.as_ref()
    }

    /// Combined duration of the selected services, in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Reconciliation state of the last mutation.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.sync
    }

    /// The selected services. While the ticket is [`Status::New`] no
    /// vehicle/location context exists yet, so the query is suppressed and
    /// this yields an empty set rather than an error.
    #[must_use]
    pub fn services(&self) -> &[Service] {
        if self.status == Status::New {
            &[]
        } else {
            &self.services
        }
    }

    /// Register a change listener. Fires synchronously on every successful
    /// mutation of time, services, location, or status.
    pub fn subscribe(
        &mut self,
        callback: impl Fn(&TicketChange) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.subscribe(Box::new(callback))
    }

    /// Remove a listener. True if the handle was still registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Replace the service selection, deduplicating by service id, and
    /// recompute the combined duration.
    pub fn set_services(&mut self, services: Vec<Service>) {
        let mut selected: Vec<Service> = Vec::with_capacity(services.len());
        for service in services {
            if !selected.iter().any(|existing| existing.id == service.id) {
                selected.push(service);
            }
        }

        self.duration_secs = selected.iter().map(|service| service.duration_secs).sum();
        self.services = selected;

        self.listeners.notify(&TicketChange::Services {
            duration_secs: self.duration_secs,
            services: self.services.clone(),
        });
    }

    /// Set or clear the scheduled start time.
    pub fn set_time(&mut self, time: Option<DateTime<Utc>>) {
        self.start = time;
        self.listeners.notify(&TicketChange::Time(time));
    }

    /// Set the pickup location.
    pub fn set_pickup(&mut self, location: Option<Location>) {
        self.pickup = location;
        self.notify_location();
    }

    /// Set the drop-off location.
    pub fn set_dropoff(&mut self, location: Option<Location>) {
        self.dropoff = location;
        self.notify_location();
    }

    /// Assign or clear the shift the ticket is scheduled against.
    pub fn assign_shift(&mut self, shift: Option<ShiftId>) {
        self.shift = shift;
    }

    /// Attach the payment charge reference.
    pub fn attach_charge(&mut self, charge: ChargeId) {
        self.charge = Some(charge);
    }

    /// Move the ticket to [`Status::Open`] and mark the mutation
    /// [`SyncState::Pending`]. Each listener is notified exactly once with
    /// the prior and new status. The remote submission happens afterwards
    /// (see `CurbsideService::finalize_draft`); a failed submission does not
    /// roll this back.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidTransition`] when the ticket is already
    /// closed or cancelled.
    pub fn finalize_draft(&mut self) -> Result<Status, ApiError> {
        if self.status.is_terminal() {
            return Err(ApiError::InvalidTransition {
                from: self.status,
                to: Status::Open,
            });
        }

        let prev = self.status;
        self.status = Status::Open;
        self.listeners.notify(&TicketChange::Status {
            prev,
            next: Status::Open,
        });
        self.sync = SyncState::Pending;
        Ok(prev)
    }

    /// Pull the ticket (back) into [`Status::Draft`]. Returns whether it was
    /// previously open, so callers can warn that an active booking was
    /// withdrawn.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidTransition`] when the ticket is already
    /// closed or cancelled.
    pub fn save_draft(&mut self) -> Result<bool, ApiError> {
        if self.status.is_terminal() {
            return Err(ApiError::InvalidTransition {
                from: self.status,
                to: Status::Draft,
            });
        }

        let prev = self.status;
        self.status = Status::Draft;
        self.listeners.notify(&TicketChange::Status {
            prev,
            next: Status::Draft,
        });
        self.sync = SyncState::Pending;
        Ok(prev == Status::Open)
    }

    /// Cancel the ticket unconditionally.
    pub fn cancel(&mut self) {
        let prev = self.status;
        self.status = Status::Cancelled;
        self.listeners.notify(&TicketChange::Status {
            prev,
            next: Status::Cancelled,
        });
        self.sync = SyncState::Pending;
    }

    /// Record that the remote side confirmed the last mutation.
    pub fn mark_committed(&mut self) {
        self.sync = SyncState::Committed;
    }

    /// Record that the remote call for the last mutation failed. Local
    /// state is kept as-is; the caller owns reconciliation.
    pub fn mark_failed(&mut self) {
        self.sync = SyncState::Failed;
    }

    fn notify_location(&self) {
        self.listeners.notify(&TicketChange::Location {
            pickup: self.pickup.clone(),
            dropoff: self.dropoff.clone(),
        });
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Ticket")
            .field("id", &self.id)
            .field("vehicle", &self.vehicle)
            .field("status", &self.status)
            .field("start", &self.start)
            .field("shift", &self.shift)
            .field("duration_secs", &self.duration_secs)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::model::ServiceId;

    fn service(id: &str, duration_secs: u32) -> Service {
        Service {
            id: ServiceId(String::from(id)),
            name: String::from(id),
            duration_secs,
        }
    }

    fn capture(ticket: &mut Ticket) -> (ListenerId, Arc<Mutex<Vec<TicketChange>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = ticket.subscribe(move |change| {
            if let Ok(mut log) = sink.lock() {
                log.push(change.clone());
            }
        });
        (id, seen)
    }

    #[test]
    fn fresh_ticket_starts_new() {
        let ticket = Ticket::new(VehicleId(String::from("v1")));
        assert_eq!(ticket.status(), Status::New);
        assert_eq!(ticket.sync_state(), SyncState::Idle);
        assert!(ticket.id().is_none());
    }

    #[test]
    fn finalize_fires_exactly_one_status_notification_per_listener() {
        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        let (_, first) = capture(&mut ticket);
        let (_, second) = capture(&mut ticket);

        let prev = ticket.finalize_draft().expect("fresh ticket finalizes");
        assert_eq!(prev, Status::New, "prior status is reported back");
        assert_eq!(ticket.status(), Status::Open);
        assert_eq!(ticket.sync_state(), SyncState::Pending);

        for seen in [first, second] {
            let log = seen.lock().expect("listener log");
            let status_changes: Vec<_> = log
                .iter()
                .filter(|change| matches!(change, TicketChange::Status { .. }))
                .collect();
            assert_eq!(status_changes.len(), 1);
            assert!(matches!(
                status_changes.first(),
                Some(TicketChange::Status {
                    prev: Status::New,
                    next: Status::Open,
                })
            ));
        }
    }

    #[test]
    fn finalize_rejects_terminal_states() {
        let mut ticket = Ticket::restore(
            TicketId(String::from("t1")),
            None,
            Status::Closed,
            None,
            None,
        );
        let err = ticket.finalize_draft().unwrap_err();
        assert!(matches!(
            err,
            ApiError::InvalidTransition {
                from: Status::Closed,
                to: Status::Open,
            }
        ));
        assert_eq!(ticket.status(), Status::Closed);
    }

    #[test]
    fn save_draft_reports_whether_ticket_was_open() {
        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        ticket.finalize_draft().expect("finalize");
        assert!(ticket.save_draft().expect("pull back to draft"));

        assert_eq!(ticket.status(), Status::Draft);
        assert!(!ticket.save_draft().expect("stay in draft"));
    }

    #[test]
    fn cancel_is_unconditional() {
        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        ticket.cancel();
        assert_eq!(ticket.status(), Status::Cancelled);

        // Even a pending ticket cancels.
        let mut pending = Ticket::restore(
            TicketId(String::from("t2")),
            None,
            Status::Pending,
            None,
            None,
        );
        pending.cancel();
        assert_eq!(pending.status(), Status::Cancelled);
    }

    #[test]
    fn services_query_is_suppressed_while_new() {
        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        ticket.set_services(vec![service("oil", 1800), service("tires", 2400)]);

        // Still NEW, so reads are empty, not an error.
        assert!(ticket.services().is_empty());
        // The derived duration is kept regardless.
        assert_eq!(ticket.duration_secs(), 4200);

        ticket.save_draft().expect("draft");
        assert_eq!(ticket.services().len(), 2);
    }

    #[test]
    fn set_services_dedupes_and_recomputes_duration() {
        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        let (_, seen) = capture(&mut ticket);

        ticket.set_services(vec![
            service("oil", 1800),
            service("oil", 1800),
            service("brakes", 3600),
        ]);
        assert_eq!(ticket.duration_secs(), 5400);

        let log = seen.lock().expect("listener log");
        assert!(matches!(
            log.first(),
            Some(TicketChange::Services {
                duration_secs: 5400,
                ..
            })
        ));
    }

    #[test]
    fn unsubscribe_is_deterministic() {
        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        let (id, seen) = capture(&mut ticket);

        assert!(ticket.unsubscribe(id));
        assert!(!ticket.unsubscribe(id));

        ticket.set_time(Some(Utc::now()));
        assert!(seen.lock().expect("listener log").is_empty());
    }

    #[test]
    fn location_changes_report_both_ends() {
        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        let (_, seen) = capture(&mut ticket);

        ticket.set_pickup(Some(Location {
            id: crate::model::LocationId(String::from("l1")),
            label: String::from("Home"),
            point: None,
        }));

        let log = seen.lock().expect("listener log");
        assert!(matches!(
            log.first(),
            Some(TicketChange::Location {
                pickup: Some(_),
                dropoff: None,
            })
        ));
    }
}
