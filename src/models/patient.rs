use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DoctorId, PatientId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub clinic_file_no: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub assigned_doctor_id: Option<DoctorId>,
    pub created_at: DateTime<Utc>,
}

/// Overwritable patient attributes.
///
/// Serialized in full on update: a `None` clears the stored value instead of
/// leaving it untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientAttributes {
    pub full_name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub assigned_doctor_id: Option<DoctorId>,
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize)]
pub struct NewPatient {
    pub clinic_file_no: String,
    #[serde(flatten)]
    pub attributes: PatientAttributes,
}

/// Embedded `{ full_name, clinic_file_no }` projection of a referenced patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientLabel {
    pub full_name: String,
    pub clinic_file_no: String,
}
