use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DoctorId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: DoctorId,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize)]
pub struct NewDoctor {
    pub name: String,
    pub active: bool,
}

/// Embedded `{ name }` projection of a referenced doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorName {
    pub name: String,
}
