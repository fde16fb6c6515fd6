use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::VisitStatus;
use super::{time_of_day, DoctorId, PatientId, UserId, VisitId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    pub patient_id: PatientId,
    pub doctor_id: Option<DoctorId>,
    pub visit_date: NaiveDate,
    #[serde(default, with = "time_of_day")]
    pub visit_time: Option<NaiveTime>,
    pub purpose: Option<String>,
    pub status: VisitStatus,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload. Visits are append-only: there is no update counterpart.
#[derive(Debug, Clone, Serialize)]
pub struct NewVisit {
    pub patient_id: PatientId,
    pub doctor_id: Option<DoctorId>,
    pub visit_date: NaiveDate,
    #[serde(with = "time_of_day")]
    pub visit_time: Option<NaiveTime>,
    pub purpose: Option<String>,
    pub status: VisitStatus,
    pub created_by: UserId,
}
