//! Patient endpoints.
//!
//! - `GET /api/patients?doctor_id=&date=&q=`: filtered list
//! - `GET /api/patients/by-file/:file_no`: one patient with visit history

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::endpoints::parse_date;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::filtering::list_patients;
use crate::lookup::{find_by_file_no, PatientRecord};
use crate::models::{DoctorId, PatientFilter, PatientListing};
use crate::session::Session;

/// Form selects send empty strings for "any".
#[derive(Deserialize)]
pub struct PatientListQuery {
    pub doctor_id: Option<String>,
    pub date: Option<String>,
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct PatientsResponse {
    pub patients: Vec<PatientListing>,
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Query(query): Query<PatientListQuery>,
) -> Result<Json<PatientsResponse>, ApiError> {
    let filter = PatientFilter {
        doctor_id: DoctorId::non_blank(query.doctor_id.map(DoctorId::new)),
        date: parse_date(query.date.as_deref(), "date")?,
        text_query: query.q,
    };
    let patients = list_patients(&ctx.store_for(&session), &filter).await?;
    Ok(Json(PatientsResponse { patients }))
}

pub async fn by_file(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(file_no): Path<String>,
) -> Result<Json<PatientRecord>, ApiError> {
    find_by_file_no(&ctx.store_for(&session), &file_no)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No patient with file number {}", file_no.trim())))
}
