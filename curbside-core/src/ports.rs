//! Error taxonomy and traits describing the remote collaborators.

use async_trait::async_trait;
use reqwest::Error as ReqwestError;

use crate::availability::Availability;
use crate::model::{
    GeoPoint, Shift, ShiftId, Status, TechnicianStatus, TicketId, TimeWindow, UserId, VehicleId,
};
use crate::ticket::Ticket;

#[derive(thiserror::Error, Debug)]
/// Errors surfaced by the gateway client and the persistence collaborators.
///
/// The status-code variants form a closed taxonomy: every gateway response is
/// classified by [`classify_status`] and nothing in this layer retries.
/// Local precondition failures (missing record id, missing geo-point) are
/// reported as [`ApiError::MalformedData`] before any network call is made,
/// so validation and network errors share one channel.
pub enum ApiError {
    /// 202: the request was understood but the work is deferred. Non-fatal,
    /// non-final; callers decide whether to poll or present it as pending.
    #[error("Request accepted, completion deferred")]
    Accepted,
    /// 400, or a local precondition failure that would produce one.
    #[error("Malformed request data")]
    MalformedData,
    /// 401: the session is not authorized for the operation.
    #[error("Unauthorized")]
    Unauthorized,
    /// 403: the API key was rejected.
    #[error("Invalid API key")]
    InvalidApiKey,
    /// 404: no such endpoint or resource path.
    #[error("Invalid API path")]
    InvalidApiPath,
    /// 405: verb not supported on the endpoint.
    #[error("Invalid HTTP method")]
    InvalidMethod,
    /// 500: the gateway failed internally.
    #[error("Internal gateway error")]
    Internal,
    /// 503: the gateway is temporarily unavailable.
    #[error("Server unavailable")]
    ServerUnavailable,
    /// 504: the gateway timed out talking to its upstream.
    #[error("Gateway timeout")]
    GatewayTimeout,
    /// Any status code outside the closed taxonomy.
    #[error("Unknown status code: {0}")]
    UnknownStatus(u16),
    /// Network layer failed before a status code was available.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// A field the operation contract requires was missing from the response.
    #[error("Response missing field: {0}")]
    MissingField(&'static str),
    /// The persistence collaborator failed.
    #[error("Store error: {0}")]
    Store(String),
    /// The requested status change is not permitted from the current state.
    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Status the ticket currently holds.
        from: Status,
        /// Status the caller asked for.
        to: Status,
    },
}

/// Classify a gateway status code against the closed taxonomy.
///
/// `200` and `201` are the only success codes. The mapping is total: every
/// other code yields exactly one [`ApiError`] kind.
///
/// # Errors
///
/// Returns the taxonomy error corresponding to the status code.
pub fn classify_status(code: u16) -> Result<(), ApiError> {
    match code {
        200 | 201 => Ok(()),
        202 => Err(ApiError::Accepted),
        400 => Err(ApiError::MalformedData),
        401 => Err(ApiError::Unauthorized),
        403 => Err(ApiError::InvalidApiKey),
        404 => Err(ApiError::InvalidApiPath),
        405 => Err(ApiError::InvalidMethod),
        500 => Err(ApiError::Internal),
        503 => Err(ApiError::ServerUnavailable),
        504 => Err(ApiError::GatewayTimeout),
        other => Err(ApiError::UnknownStatus(other)),
    }
}

/// Normalization over the call shapes accepted by the search operations:
/// a raw id, a parsed JSON record, or a typed domain object.
pub trait RecordId {
    /// The record's server-assigned id, if it has one.
    fn record_id(&self) -> Option<&str>;
}

impl RecordId for str {
    fn record_id(&self) -> Option<&str> {
        if self.is_empty() { None } else { Some(self) }
    }
}

impl RecordId for UserId {
    fn record_id(&self) -> Option<&str> {
        self.0.record_id()
    }
}

impl RecordId for VehicleId {
    fn record_id(&self) -> Option<&str> {
        self.0.record_id()
    }
}

impl RecordId for serde_json::Value {
    fn record_id(&self) -> Option<&str> {
        self.get("objectId").and_then(serde_json::Value::as_str)
    }
}

#[async_trait]
/// Persistence operations for tickets. The underlying object store is a
/// collaborator; its get/put/save/find semantics are consumed, not redesigned.
pub trait TicketStore: Send + Sync {
    /// Persist the ticket's current local state.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the store rejects the write.
    async fn save(&self, ticket: &Ticket) -> Result<(), ApiError>;

    /// Fetch tickets for a vehicle (or all of the session's tickets when no
    /// vehicle is given), newest start time first.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the query fails.
    async fn tickets_for_vehicle(
        &self,
        vehicle: Option<&VehicleId>,
        include_closed: bool,
    ) -> Result<Vec<Ticket>, ApiError>;

    /// Fetch tickets assigned to any of the given shifts, at or beyond
    /// `min_status`, whose start falls inside the window.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the query fails.
    async fn tickets_for_shifts(
        &self,
        shifts: &[ShiftId],
        min_status: Status,
        window: TimeWindow,
    ) -> Result<Vec<Ticket>, ApiError>;
}

#[async_trait]
/// Read-only access to technician shift projections.
pub trait ShiftStore: Send + Sync {
    /// Fetch the technician's active shifts whose start falls in the window.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the query fails.
    async fn active_shifts(
        &self,
        technician: &UserId,
        window: TimeWindow,
    ) -> Result<Vec<Shift>, ApiError>;
}

#[async_trait]
/// Scheduling operations against the remote gateway.
pub trait SchedulingGateway: Send + Sync {
    /// Query the day-by-day availability grid for the ticket.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedData`] when the ticket has no resolved
    /// geo-point, or a taxonomy error from the gateway.
    async fn availability(&self, ticket: &Ticket) -> Result<Availability, ApiError>;

    /// Submit the ticket against a shift. True iff the gateway confirmed.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error when the gateway rejects the submission.
    async fn submit_schedule(&self, ticket: &TicketId, shift: &ShiftId) -> Result<bool, ApiError>;

    /// Push a live technician-status update for the ticket. Advisory;
    /// delivery is not exactly-once.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error when the push fails.
    async fn push_ticket_status(
        &self,
        ticket: &TicketId,
        point: GeoPoint,
        stage: TechnicianStatus,
    ) -> Result<bool, ApiError>;
}

#[async_trait]
/// Provider of the device's last known position.
pub trait Geolocator: Send + Sync {
    /// The most recent fix, if any.
    async fn last_known(&self) -> Option<GeoPoint>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_codes_classify_clean() {
        assert!(classify_status(200).is_ok());
        assert!(classify_status(201).is_ok());
    }

    #[test]
    fn each_taxonomy_code_maps_to_its_kind() {
        assert!(matches!(classify_status(202), Err(ApiError::Accepted)));
        assert!(matches!(classify_status(400), Err(ApiError::MalformedData)));
        assert!(matches!(classify_status(401), Err(ApiError::Unauthorized)));
        assert!(matches!(classify_status(403), Err(ApiError::InvalidApiKey)));
        assert!(matches!(classify_status(404), Err(ApiError::InvalidApiPath)));
        assert!(matches!(classify_status(405), Err(ApiError::InvalidMethod)));
        assert!(matches!(classify_status(500), Err(ApiError::Internal)));
        assert!(matches!(
            classify_status(503),
            Err(ApiError::ServerUnavailable)
        ));
        assert!(matches!(
            classify_status(504),
            Err(ApiError::GatewayTimeout)
        ));
    }

    #[test]
    fn unlisted_codes_carry_their_value() {
        assert!(matches!(
            classify_status(418),
            Err(ApiError::UnknownStatus(418))
        ));
        assert!(matches!(
            classify_status(302),
            Err(ApiError::UnknownStatus(302))
        ));
    }

    #[test]
    fn record_id_shapes_normalize() {
        assert_eq!("abc".record_id(), Some("abc"));
        assert_eq!("".record_id(), None);

        let record = serde_json::json!({ "objectId": "u123", "name": "Sam" });
        assert_eq!(record.record_id(), Some("u123"));

        let missing = serde_json::json!({ "name": "Sam" });
        assert_eq!(missing.record_id(), None);

        assert_eq!(UserId(String::from("u9")).record_id(), Some("u9"));
    }
}
