//! HTTP API for the front desk.
//!
//! Exposes the workflows as JSON endpoints under `/api/`. Every route except
//! `/api/health` requires a bearer token that resolves to a session.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_server, ApiServer};
pub use types::ApiContext;
