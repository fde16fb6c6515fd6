//! Session endpoint, called by the client right after sign-in.

use axum::extract::State;
use axum::{Extension, Json};

use crate::api::types::ApiContext;
use crate::session::Session;

/// `GET /api/session`: resolved user and role. Also refreshes the doctor
/// directory; a failed refresh keeps the previous list.
pub async fn current(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
) -> Json<Session> {
    if let Err(e) = ctx.directory.refresh(&ctx.store_for(&session)).await {
        tracing::warn!(error = %e, "Doctor directory refresh failed");
    }
    Json(session)
}
