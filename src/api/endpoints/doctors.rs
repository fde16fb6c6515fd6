//! Doctor directory endpoints.
//!
//! - `GET /api/doctors`: active doctors (`?all=true`: every doctor, admin only)
//! - `POST /api/doctors`: admin: add a doctor
//! - `PATCH /api/doctors/:id`: admin: activate or deactivate
//! - `GET /api/doctors/:id/schedule`: roster plus one day's agenda

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::endpoints::parse_date;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{Doctor, DoctorId};
use crate::schedule::{doctor_schedule, DoctorSchedule};
use crate::session::Session;

#[derive(Deserialize)]
pub struct DoctorListQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Serialize)]
pub struct DoctorsResponse {
    pub doctors: Vec<Doctor>,
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<DoctorsResponse>, ApiError> {
    let doctors = if query.all {
        if !session.is_admin() {
            return Err(ApiError::Forbidden);
        }
        ctx.directory.all()
    } else {
        ctx.directory.active_doctors()
    };
    Ok(Json(DoctorsResponse { doctors }))
}

#[derive(Deserialize)]
pub struct NewDoctorRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct DoctorCreated {
    pub id: DoctorId,
}

pub async fn add(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Json(body): Json<NewDoctorRequest>,
) -> Result<(StatusCode, Json<DoctorCreated>), ApiError> {
    let id = ctx
        .directory
        .add_doctor(&ctx.store_for(&session), &session, &body.name)
        .await?;
    Ok((StatusCode::CREATED, Json(DoctorCreated { id })))
}

#[derive(Deserialize)]
pub struct DoctorUpdateRequest {
    pub active: bool,
}

#[derive(Serialize)]
pub struct DoctorUpdated {
    pub id: DoctorId,
    pub active: bool,
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<DoctorUpdateRequest>,
) -> Result<Json<DoctorUpdated>, ApiError> {
    let id = DoctorId::new(id);
    ctx.directory
        .set_active(&ctx.store_for(&session), &session, &id, body.active)
        .await?;
    Ok(Json(DoctorUpdated {
        id,
        active: body.active,
    }))
}

#[derive(Deserialize)]
pub struct ScheduleQuery {
    pub date: Option<String>,
}

/// Date defaults to today on the server's calendar.
pub async fn schedule(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<DoctorSchedule>, ApiError> {
    let date = parse_date(query.date.as_deref(), "date")?
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let schedule = doctor_schedule(&ctx.store_for(&session), &DoctorId::new(id), date).await?;
    Ok(Json(schedule))
}
