//! Core types and service wiring for the Curbside mobile vehicle-service
//! client: ticket lifecycle, technician availability, and the ports the
//! gateway and persistence collaborators implement.

/// Day-grid availability engine and its wire payload.
pub mod availability;
/// Completion dispatcher bridging async calls to blocking/callback sites.
pub mod dispatch;
/// Domain models and identifiers.
pub mod model;
/// Error taxonomy and collaborator traits.
pub mod ports;
/// Shift roster resolution.
pub mod roster;
/// Service facade used by clients.
pub mod service;
/// Ticket state machine and change listeners.
pub mod ticket;

pub use availability::*;
pub use dispatch::*;
pub use model::*;
pub use ports::*;
pub use roster::*;
pub use service::*;
pub use ticket::*;
