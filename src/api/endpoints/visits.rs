//! `GET /api/visits/upcoming`: the next seven days on the server's calendar.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::VisitListing;
use crate::session::Session;
use crate::upcoming::{upcoming_visits, window};

#[derive(Serialize)]
pub struct UpcomingResponse {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub visits: Vec<VisitListing>,
}

pub async fn upcoming(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
) -> Result<Json<UpcomingResponse>, ApiError> {
    let now = chrono::Local::now();
    let (start, end) = window(&now)?;
    let visits = upcoming_visits(&ctx.store_for(&session), &now).await?;
    Ok(Json(UpcomingResponse { start, end, visits }))
}
