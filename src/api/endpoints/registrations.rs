//! `POST /api/registrations`: register a patient visit.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{PatientId, VisitId};
use crate::registration::{register_visit, RegistrationInput, RegistrationOutcome};
use crate::session::Session;

#[derive(Serialize)]
pub struct RegistrationResponse {
    pub patient_id: PatientId,
    pub visit_id: VisitId,
    pub patient_created: bool,
}

/// The acting user always comes from the session.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    body: Result<Json<RegistrationInput>, JsonRejection>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ApiError> {
    let Json(mut input) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    input.acting_user_id = Some(session.user_id.clone());

    match register_visit(&ctx.store_for(&session), input).await? {
        RegistrationOutcome::Registered {
            patient_id,
            visit_id,
            patient_created,
        } => Ok((
            StatusCode::CREATED,
            Json(RegistrationResponse {
                patient_id,
                visit_id,
                patient_created,
            }),
        )),
        RegistrationOutcome::PatientSavedVisitFailed {
            patient_id, reason, ..
        } => Err(ApiError::VisitNotScheduled {
            patient_id,
            message: reason.to_string(),
        }),
    }
}
