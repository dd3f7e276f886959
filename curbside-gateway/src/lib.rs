//! Reqwest implementation of the Curbside gateway client.
//!
//! All input and output for the remote gateway is handled here; nothing
//! outside this crate builds requests or touches response JSON. Every call
//! is classified against the closed status-code taxonomy in
//! [`curbside_core::ports`], and no call is ever retried by this layer.

use std::env;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use curbside_core::{
    availability::{Availability, SchedulePayload, default_start},
    model::{GeoPoint, ShiftId, TechnicianStatus, TicketId, UserId, Verified},
    ports::{ApiError, RecordId, SchedulingGateway, classify_status},
    ticket::Ticket,
};

const VERIFY_PATH: &str = "v0/client/verify";
const PHONE_PATH: &str = "v0/client/phone";
const CLIENT_PATH: &str = "v0/client";
const VEHICLE_PATH: &str = "v0/vehicle";
const SERVICE_PATH: &str = "v0/service";
const SOURCE_CARD_PATH: &str = "v0/sources/card";
const SOURCE_BANK_PATH: &str = "v0/sources/bank";
const SCHEDULE_PATH: &str = "v1/schedule";
const PUSH_TICKET_PATH: &str = "v1/push/ticket";

const ENV_API_URL: &str = "CURBSIDE_API_URL";
const ENV_API_KEY: &str = "CURBSIDE_API_KEY";

#[derive(thiserror::Error, Debug)]
/// Errors while assembling the gateway configuration.
pub enum ConfigError {
    /// A required environment variable was absent or empty.
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
}

#[derive(Debug, Clone)]
/// Connection settings for the gateway.
pub struct GatewayConfig {
    /// Base URL of the gateway, without a trailing slash.
    pub base_url: String,
    /// API key attached to every request as `X-Api-Key`.
    pub api_key: String,
}

impl GatewayConfig {
    /// Build a configuration, normalizing away any trailing slash.
    #[must_use]
    pub fn new<U: Into<String>, K: Into<String>>(base_url: U, api_key: K) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Read the configuration from `CURBSIDE_API_URL` and
    /// `CURBSIDE_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] when either variable is unset or
    /// empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            env::var(ENV_API_URL).map_err(|_err| ConfigError::MissingVar(ENV_API_URL))?;
        let api_key = env::var(ENV_API_KEY).map_err(|_err| ConfigError::MissingVar(ENV_API_KEY))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::MissingVar(ENV_API_URL));
        }
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingVar(ENV_API_KEY));
        }
        Ok(Self::new(base_url, api_key))
    }
}

/// Flags reported by the verification endpoint.
#[derive(Debug, Deserialize)]
struct VerifyFlags {
    #[serde(rename = "emailVerified")]
    email: bool,
    #[serde(rename = "phoneVerified")]
    phone: bool,
}

/// Wrapper shape shared by the search endpoints.
#[derive(Debug, Deserialize)]
struct SearchResults {
    results: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
/// Result of exchanging a bank-link token for a payment source token.
pub struct BankExchange {
    /// The payment source token to attach.
    #[serde(rename = "stripe_bank_account_token")]
    pub token: String,
    /// Gateway-side request id, for support lookups.
    pub request_id: String,
}

/// Typed client for the Curbside gateway.
///
/// Operations are `async`; callback and blocking forms are available
/// uniformly through [`curbside_core::dispatch::Dispatcher`].
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    /// Create a client over the given HTTP client and configuration.
    #[must_use]
    pub fn new(client: Client, config: GatewayConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    /// Read request: API key plus JSON accept header.
    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(self.endpoint(path))
            .header("X-Api-Key", &self.config.api_key)
            .header(ACCEPT, "application/json")
    }

    /// Write request: API key plus JSON content type.
    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.endpoint(path))
            .header("X-Api-Key", &self.config.api_key)
            .header(CONTENT_TYPE, "application/json")
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.client
            .put(self.endpoint(path))
            .header("X-Api-Key", &self.config.api_key)
            .header(CONTENT_TYPE, "application/json")
    }

    /// Which of the user's contact points have been verified.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error from the gateway, or a network error.
    pub async fn verification_status(&self, user: &UserId) -> Result<Verified, ApiError> {
        let flags: VerifyFlags =
            fetch_json(self.get(VERIFY_PATH).query(&[("user", user.0.as_str())])).await?;
        Ok(Verified::from_flags(flags.email, flags.phone))
    }

    /// Request a one-time phone code (token given) or attempt verification
    /// (code given). Supplying both or neither is a caller error; this layer
    /// passes the fields through untouched and returns the raw response.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error from the gateway, or a network error.
    pub async fn phone_verification(
        &self,
        user: &UserId,
        token: Option<&str>,
        code: Option<&str>,
    ) -> Result<Value, ApiError> {
        let body = serde_json::json!({ "token": token, "code": code });
        fetch_json(
            self.post(PHONE_PATH)
                .query(&[("user", user.0.as_str())])
                .json(&body),
        )
        .await
    }

    /// Create the backing customer record for a new user. Advisory push:
    /// callers must not assume exactly-once delivery.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error from the gateway, or a network error.
    pub async fn create_customer_record(&self, user: &UserId) -> Result<bool, ApiError> {
        let response =
            send(self.post(CLIENT_PATH).query(&[("user", user.0.as_str())])).await?;
        Ok(response.status().as_u16() == 200)
    }

    /// Attach a tokenized card to the user's customer record. Returns the
    /// account's email-verified flag, which the endpoint reports back.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingField`] when the response lacks the flag,
    /// a taxonomy error, or a network error.
    pub async fn attach_payment_source(
        &self,
        user: &UserId,
        token: &str,
    ) -> Result<bool, ApiError> {
        let body = serde_json::json!({ "token": token });
        let response: Value = fetch_json(
            self.put(SOURCE_CARD_PATH)
                .query(&[("user", user.0.as_str())])
                .json(&body),
        )
        .await?;
        response
            .get("emailVerified")
            .and_then(Value::as_bool)
            .ok_or(ApiError::MissingField("emailVerified"))
    }

    /// Exchange a bank-link token for a payment source token.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error from the gateway, or a network error.
    pub async fn exchange_bank_token(
        &self,
        token: &str,
        account_id: &str,
        test: bool,
    ) -> Result<BankExchange, ApiError> {
        let body = serde_json::json!({
            "token": token,
            "account_id": account_id,
            "test": test,
        });
        fetch_json(self.post(SOURCE_BANK_PATH).json(&body)).await
    }

    /// Search user records matching the query. The query is also attempted
    /// as a numeric phone lookup through the secondary `p` parameter.
    /// Returns the raw result records and the moment the search completed.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error from the gateway, or a network error.
    pub async fn search_users(
        &self,
        query: &str,
        session: &str,
    ) -> Result<(Vec<Value>, DateTime<Utc>), ApiError> {
        let phone = phone_echo(query);
        let found: SearchResults = fetch_json(self.get(CLIENT_PATH).query(&[
            ("q", query),
            ("p", phone.as_str()),
            ("session", session),
        ]))
        .await?;
        Ok((found.results, Utc::now()))
    }

    /// Search vehicles for a user given by id, parsed record, or typed
    /// object. A record without an id fails fast with
    /// [`ApiError::MalformedData`] and never reaches the network.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedData`] for a missing id, a taxonomy
    /// error, or a network error.
    pub async fn search_vehicles<R: RecordId + ?Sized>(
        &self,
        user: &R,
        session: &str,
    ) -> Result<Vec<Value>, ApiError> {
        let Some(user_id) = user.record_id() else {
            return Err(ApiError::MalformedData);
        };
        let found: SearchResults = fetch_json(
            self.get(VEHICLE_PATH)
                .query(&[("client", user_id), ("session", session)]),
        )
        .await?;
        Ok(found.results)
    }

    /// Search the services applicable to a vehicle given by id, parsed
    /// record, or typed object. Same fail-fast id handling as
    /// [`GatewayClient::search_vehicles`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedData`] for a missing id, a taxonomy
    /// error, or a network error.
    pub async fn search_services<R: RecordId + ?Sized>(
        &self,
        vehicle: &R,
    ) -> Result<Vec<Value>, ApiError> {
        let Some(vehicle_id) = vehicle.record_id() else {
            return Err(ApiError::MalformedData);
        };
        let found: SearchResults =
            fetch_json(self.get(SERVICE_PATH).query(&[("vehicle", vehicle_id)])).await?;
        Ok(found.results)
    }

    /// Query the availability grid for the ticket, associating the response
    /// with day entries from `start` onward.
    ///
    /// Requires a resolved geo-point on the ticket's pickup location; its
    /// absence is a precondition failure, not a network error.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MalformedData`] without a geo-point, a taxonomy
    /// error, or a network error.
    pub async fn availability_from(
        &self,
        ticket: &Ticket,
        start: NaiveDate,
    ) -> Result<Availability, ApiError> {
        let Some(point) = ticket.pickup().and_then(|location| location.point) else {
            return Err(ApiError::MalformedData);
        };

        let lat_lng = format!("{},{}", point.lat, point.lng);
        let mut request = self.get(SCHEDULE_PATH).query(&[("lat_lng", lat_lng.as_str())]);
        if let Some(id) = ticket.id() {
            request = request.query(&[("ticket", id.0.as_str())]);
        }

        debug!(start = %start, "querying availability");
        let payload: SchedulePayload = fetch_json(request).await?;
        Ok(Availability::from_payload(start, payload))
    }

    /// Submit the ticket against a shift. True iff the gateway confirmed
    /// with a 200.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error from the gateway, or a network error.
    pub async fn submit_schedule(
        &self,
        ticket: &TicketId,
        shift: &ShiftId,
    ) -> Result<bool, ApiError> {
        debug!(ticket = %ticket.0, shift = %shift.0, "submitting schedule");
        let response = send(
            self.put(SCHEDULE_PATH)
                .query(&[("ticket", ticket.0.as_str()), ("shift", shift.0.as_str())]),
        )
        .await?;
        Ok(response.status().as_u16() == 200)
    }

    /// Push a live technician-status update for the ticket. Advisory;
    /// callers must not assume exactly-once delivery.
    ///
    /// # Errors
    ///
    /// Returns a taxonomy error from the gateway, or a network error.
    pub async fn push_ticket_status(
        &self,
        ticket: &TicketId,
        point: GeoPoint,
        stage: TechnicianStatus,
    ) -> Result<bool, ApiError> {
        let body = serde_json::json!({
            "ticket": ticket.0,
            "lat": point.lat,
            "lng": point.lng,
            "status": stage.code(),
        });
        let response = send(self.post(PUSH_TICKET_PATH).json(&body)).await?;
        Ok(response.status().as_u16() == 200)
    }
}

#[async_trait]
impl SchedulingGateway for GatewayClient {
    async fn availability(&self, ticket: &Ticket) -> Result<Availability, ApiError> {
        // Default query start: the next midnight boundary after now.
        self.availability_from(ticket, default_start(Utc::now())).await
    }

    async fn submit_schedule(&self, ticket: &TicketId, shift: &ShiftId) -> Result<bool, ApiError> {
        GatewayClient::submit_schedule(self, ticket, shift).await
    }

    async fn push_ticket_status(
        &self,
        ticket: &TicketId,
        point: GeoPoint,
        stage: TechnicianStatus,
    ) -> Result<bool, ApiError> {
        GatewayClient::push_ticket_status(self, ticket, point, stage).await
    }
}

/// Echo the query as a phone filter iff it parses as an integer.
fn phone_echo(query: &str) -> String {
    query
        .trim()
        .parse::<i64>()
        .map(|number| number.to_string())
        .unwrap_or_default()
}

// Small helpers to execute a request and classify the status code.
async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await.map_err(ApiError::from)?;
    classify_status(response.status().as_u16())?;
    Ok(response)
}

async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    send(request).await?.json().await.map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use curbside_core::model::{Location, LocationId, VehicleId};

    use super::*;

    fn client() -> GatewayClient {
        // Unroutable base URL: any test that reaches the network fails fast.
        GatewayClient::new(
            Client::new(),
            GatewayConfig::new("http://127.0.0.1:1/api/", "test-key"),
        )
    }

    #[test]
    fn config_normalizes_trailing_slashes() {
        let config = GatewayConfig::new("https://api.example.com/", "k");
        assert_eq!(config.base_url, "https://api.example.com");

        let plain = GatewayConfig::new("https://api.example.com", "k");
        assert_eq!(plain.base_url, "https://api.example.com");
    }

    #[test]
    fn endpoints_join_base_and_path() {
        let gateway = client();
        assert_eq!(
            gateway.endpoint(SCHEDULE_PATH),
            "http://127.0.0.1:1/api/v1/schedule"
        );
    }

    #[test]
    fn phone_echo_passes_integers_only() {
        assert_eq!(phone_echo("5150001234"), "5150001234");
        assert_eq!(phone_echo(" 42 "), "42");
        assert_eq!(phone_echo("sam smith"), "");
        assert_eq!(phone_echo("515-000-1234"), "");
    }

    #[test]
    fn bank_exchange_decodes_gateway_field_names() {
        let json = serde_json::json!({
            "stripe_bank_account_token": "btok_9",
            "request_id": "req_4",
        });
        let exchange: BankExchange = serde_json::from_value(json).expect("decodes");
        assert_eq!(exchange.token, "btok_9");
        assert_eq!(exchange.request_id, "req_4");
    }

    #[test]
    fn verify_flags_decode_camel_case() {
        let json = serde_json::json!({ "emailVerified": true, "phoneVerified": false });
        let flags: VerifyFlags = serde_json::from_value(json).expect("decodes");
        assert_eq!(Verified::from_flags(flags.email, flags.phone), Verified::Email);
    }

    #[tokio::test]
    async fn search_vehicles_without_an_id_never_touches_the_network() {
        let gateway = client();
        let record = serde_json::json!({ "name": "no id here" });
        let err = gateway.search_vehicles(&record, "session").await.unwrap_err();
        assert!(matches!(err, ApiError::MalformedData));
    }

    #[tokio::test]
    async fn search_services_accepts_all_three_call_shapes() {
        let gateway = client();

        // Missing id fails fast for both record-ish shapes.
        let empty = serde_json::json!({});
        assert!(matches!(
            gateway.search_services(&empty).await.unwrap_err(),
            ApiError::MalformedData
        ));
        assert!(matches!(
            gateway.search_services("").await.unwrap_err(),
            ApiError::MalformedData
        ));

        // A populated id normalizes to the id-based call and proceeds to the
        // network, which is unroutable here.
        let err = gateway
            .search_vehicles(&VehicleId(String::from("v1")), "session")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[tokio::test]
    async fn availability_requires_a_resolved_geo_point() {
        let gateway = client();

        let mut ticket = Ticket::new(VehicleId(String::from("v1")));
        ticket.set_pickup(Some(Location {
            id: LocationId(String::from("l1")),
            label: String::from("Home"),
            point: None,
        }));

        let start = NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date");
        let err = gateway.availability_from(&ticket, start).await.unwrap_err();
        assert!(matches!(err, ApiError::MalformedData));
    }
}
