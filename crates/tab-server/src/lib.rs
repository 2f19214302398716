//! HTTP server for TabSplit.
//!
//! Exposes the [`TabService`](tab_service::TabService) operations as a JSON
//! REST API. Caller identity is read from the `x-participant-id` header and
//! trusted verbatim; an identity layer in front of this server owns
//! authentication. Amounts travel as decimal strings.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod staging;

pub use auth::{Caller, DISPLAY_NAME_HEADER, PARTICIPANT_HEADER};
pub use config::{ServerConfig, TabConfig};
pub use error::{ServerError, ServerResult};
pub use server::{AppState, TabServer};
pub use staging::PhotoStaging;
