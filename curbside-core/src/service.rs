//! High-level facade orchestrating local ticket mutation against the
//! persistence store and the scheduling gateway.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::availability::Availability;
use crate::model::{Service, TechnicianStatus, TimeWindow, UserId, VehicleId};
use crate::ports::{ApiError, Geolocator, SchedulingGateway, ShiftStore, TicketStore};
use crate::roster::{ShiftAssignment, ShiftRegistry};
use crate::ticket::Ticket;

/// Public entry point for ticket lifecycle and scheduling operations.
///
/// Every mutation applies locally (notifying listeners) before the remote
/// call, and is never rolled back on remote failure; the ticket's
/// [`crate::ticket::SyncState`] records the outcome instead.
pub struct CurbsideService {
    tickets: Arc<dyn TicketStore>,
    gateway: Arc<dyn SchedulingGateway>,
    geolocator: Arc<dyn Geolocator>,
    registry: ShiftRegistry,
}

impl CurbsideService {
    /// Create a service bound to the provided collaborators.
    #[must_use]
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        shifts: Arc<dyn ShiftStore>,
        gateway: Arc<dyn SchedulingGateway>,
        geolocator: Arc<dyn Geolocator>,
    ) -> Self {
        let registry = ShiftRegistry::new(shifts, Arc::clone(&tickets));
        Self {
            tickets,
            gateway,
            geolocator,
            registry,
        }
    }

    /// Finalize the draft: mark the ticket open locally, persist it, then
    /// submit the schedule to the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidTransition`] from a terminal state,
    /// [`ApiError::MalformedData`] when the ticket has no persisted id or no
    /// assigned shift, or the store/gateway error. Local state stays open on
    /// failure; the sync state moves to `Failed`.
    pub async fn finalize_draft(&self, ticket: &mut Ticket) -> Result<(), ApiError> {
        ticket.finalize_draft()?;

        if let Err(err) = self.tickets.save(ticket).await {
            ticket.mark_failed();
            return Err(err);
        }

        let (Some(id), Some(shift)) = (ticket.id().cloned(), ticket.shift().cloned()) else {
            ticket.mark_failed();
            return Err(ApiError::MalformedData);
        };

        match self.gateway.submit_schedule(&id, &shift).await {
            Ok(confirmed) => {
                debug!(ticket = %id.0, shift = %shift.0, confirmed, "schedule submitted");
                ticket.mark_committed();
                Ok(())
            }
            Err(err) => {
                warn!(ticket = %id.0, error = %err, "schedule submission failed");
                ticket.mark_failed();
                Err(err)
            }
        }
    }

    /// Pull the ticket (back) into draft and persist. Returns whether an
    /// active booking was withdrawn, so the caller can warn the user.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidTransition`] from a terminal state, or the
    /// store error.
    pub async fn save_draft(&self, ticket: &mut Ticket) -> Result<bool, ApiError> {
        let was_open = ticket.save_draft()?;
        match self.tickets.save(ticket).await {
            Ok(()) => {
                ticket.mark_committed();
                Ok(was_open)
            }
            Err(err) => {
                ticket.mark_failed();
                Err(err)
            }
        }
    }

    /// Cancel the ticket unconditionally and persist.
    ///
    /// # Errors
    ///
    /// Returns the store error; the local cancellation stands regardless.
    pub async fn cancel(&self, ticket: &mut Ticket) -> Result<(), ApiError> {
        ticket.cancel();
        match self.tickets.save(ticket).await {
            Ok(()) => {
                ticket.mark_committed();
                Ok(())
            }
            Err(err) => {
                ticket.mark_failed();
                Err(err)
            }
        }
    }

    /// Replace the ticket's service selection and persist.
    ///
    /// # Errors
    ///
    /// Returns the store error. The local selection and derived duration are
    /// kept either way.
    pub async fn set_services(
        &self,
        ticket: &mut Ticket,
        services: Vec<Service>,
    ) -> Result<(), ApiError> {
        ticket.set_services(services);
        self.tickets.save(ticket).await
    }

    /// Query the availability grid for the ticket.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedData`] when the ticket's pickup location
    /// has no resolved geo-point, or a taxonomy error from the gateway.
    pub async fn openings(&self, ticket: &Ticket) -> Result<Availability, ApiError> {
        self.gateway.availability(ticket).await
    }

    /// Push the technician's current progress stage for the ticket, using
    /// the device's last known position. Advisory; not exactly-once.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedData`] when the ticket has no id or no
    /// position fix is available, or a taxonomy error from the gateway.
    pub async fn push_progress(
        &self,
        ticket: &Ticket,
        stage: TechnicianStatus,
    ) -> Result<bool, ApiError> {
        let Some(id) = ticket.id() else {
            return Err(ApiError::MalformedData);
        };
        let Some(point) = self.geolocator.last_known().await else {
            return Err(ApiError::MalformedData);
        };
        self.gateway.push_ticket_status(id, point, stage).await
    }

    /// Ticket history for a vehicle (or the whole session), newest first.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn tickets(
        &self,
        vehicle: Option<&VehicleId>,
        include_closed: bool,
    ) -> Result<Vec<Ticket>, ApiError> {
        self.tickets.tickets_for_vehicle(vehicle, include_closed).await
    }

    /// The technician's shifts and their assigned tickets for the window.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when either store query fails.
    pub async fn roster(
        &self,
        technician: &UserId,
        window: TimeWindow,
    ) -> Result<Vec<ShiftAssignment>, ApiError> {
        self.registry.roster(technician, window).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::model::{GeoPoint, Shift, ShiftId, Status, TicketId};
    use crate::ticket::SyncState;

    struct FakeTickets;

    #[async_trait]
    impl TicketStore for FakeTickets {
        async fn save(&self, _ticket: &Ticket) -> Result<(), ApiError> {
            Ok(())
        }

        async fn tickets_for_vehicle(
            &self,
            _vehicle: Option<&VehicleId>,
            _include_closed: bool,
        ) -> Result<Vec<Ticket>, ApiError> {
            Ok(Vec::new())
        }

        async fn tickets_for_shifts(
            &self,
            _shifts: &[ShiftId],
            _min_status: Status,
            _window: TimeWindow,
        ) -> Result<Vec<Ticket>, ApiError> {
            Ok(Vec::new())
        }
    }

    struct FakeShifts;

    #[async_trait]
    impl ShiftStore for FakeShifts {
        async fn active_shifts(
            &self,
            _technician: &UserId,
            _window: TimeWindow,
        ) -> Result<Vec<Shift>, ApiError> {
            Ok(Vec::new())
        }
    }

    struct FakeGateway {
        fail_submit: bool,
        submissions: Mutex<Vec<(String, String)>>,
        pushes: Mutex<Vec<i32>>,
    }

    impl FakeGateway {
        fn new(fail_submit: bool) -> Self {
            Self {
                fail_submit,
                submissions: Mutex::new(Vec::new()),
                pushes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SchedulingGateway for FakeGateway {
        async fn availability(&self, _ticket: &Ticket) -> Result<Availability, ApiError> {
            Err(ApiError::MalformedData)
        }

        async fn submit_schedule(
            &self,
            ticket: &TicketId,
            shift: &ShiftId,
        ) -> Result<bool, ApiError> {
            if self.fail_submit {
                return Err(ApiError::ServerUnavailable);
            }
            self.submissions
                .lock()
                .expect("submissions")
                .push((ticket.0.clone(), shift.0.clone()));
            Ok(true)
        }

        async fn push_ticket_status(
            &self,
            _ticket: &TicketId,
            _point: GeoPoint,
            stage: TechnicianStatus,
        ) -> Result<bool, ApiError> {
            self.pushes.lock().expect("pushes").push(stage.code());
            Ok(true)
        }
    }

    struct FakeGeolocator(Option<GeoPoint>);

    #[async_trait]
    impl Geolocator for FakeGeolocator {
        async fn last_known(&self) -> Option<GeoPoint> {
            self.0
        }
    }

    fn service_with(
        gateway: Arc<FakeGateway>,
        fix: Option<GeoPoint>,
    ) -> CurbsideService {
        CurbsideService::new(
            Arc::new(FakeTickets),
            Arc::new(FakeShifts),
            gateway,
            Arc::new(FakeGeolocator(fix)),
        )
    }

    fn scheduled_ticket() -> Ticket {
        let mut ticket = Ticket::restore(
            TicketId(String::from("t1")),
            Some(VehicleId(String::from("v1"))),
            Status::Draft,
            None,
            Some(ShiftId(String::from("s1"))),
        );
        ticket.set_id(TicketId(String::from("t1")));
        ticket
    }

    #[tokio::test]
    async fn finalize_submits_the_schedule_and_commits() {
        let gateway = Arc::new(FakeGateway::new(false));
        let service = service_with(Arc::clone(&gateway), None);

        let mut ticket = scheduled_ticket();
        service.finalize_draft(&mut ticket).await.expect("finalize");

        assert_eq!(ticket.status(), Status::Open);
        assert_eq!(ticket.sync_state(), SyncState::Committed);
        assert_eq!(
            gateway.submissions.lock().expect("submissions").as_slice(),
            &[(String::from("t1"), String::from("s1"))]
        );
    }

    #[tokio::test]
    async fn finalize_failure_keeps_local_state_and_marks_failed() {
        let gateway = Arc::new(FakeGateway::new(true));
        let service = service_with(gateway, None);

        let mut ticket = scheduled_ticket();
        let err = service.finalize_draft(&mut ticket).await.unwrap_err();

        assert!(matches!(err, ApiError::ServerUnavailable));
        // Optimistic local mutation: no rollback, divergence is flagged.
        assert_eq!(ticket.status(), Status::Open);
        assert_eq!(ticket.sync_state(), SyncState::Failed);
    }

    #[tokio::test]
    async fn finalize_without_a_shift_fails_fast() {
        let gateway = Arc::new(FakeGateway::new(false));
        let service = service_with(Arc::clone(&gateway), None);

        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        ticket.set_id(TicketId(String::from("t9")));
        let err = service.finalize_draft(&mut ticket).await.unwrap_err();

        assert!(matches!(err, ApiError::MalformedData));
        assert!(gateway.submissions.lock().expect("submissions").is_empty());
    }

    #[tokio::test]
    async fn push_progress_requires_a_position_fix() {
        let gateway = Arc::new(FakeGateway::new(false));
        let service = service_with(Arc::clone(&gateway), None);

        let ticket = scheduled_ticket();
        let err = service
            .push_progress(&ticket, TechnicianStatus::DrivingPickup)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::MalformedData));
        assert!(gateway.pushes.lock().expect("pushes").is_empty());
    }

    #[tokio::test]
    async fn push_progress_forwards_the_stage() {
        let gateway = Arc::new(FakeGateway::new(false));
        let service = service_with(
            Arc::clone(&gateway),
            Some(GeoPoint { lat: 41.59, lng: -93.62 }),
        );

        let ticket = scheduled_ticket();
        let delivered = service
            .push_progress(&ticket, TechnicianStatus::ArrivingDropoff)
            .await
            .expect("push");

        assert!(delivered, "gateway confirmed the push");
        assert_eq!(gateway.pushes.lock().expect("pushes").as_slice(), &[6]);
    }

    #[tokio::test]
    async fn save_draft_reports_withdrawn_bookings_through_the_store() {
        let gateway = Arc::new(FakeGateway::new(false));
        let service = service_with(gateway, None);

        let mut ticket = scheduled_ticket();
        service.finalize_draft(&mut ticket).await.expect("finalize");

        let was_open = service.save_draft(&mut ticket).await.expect("draft");
        assert!(was_open, "booking was active before the pull-back");
        assert_eq!(ticket.status(), Status::Draft);
        assert_eq!(ticket.sync_state(), SyncState::Committed);
    }
}
