//! Rows as the front desk displays them: a base record plus the few
//! fields pulled in from the records it references.

use serde::{Deserialize, Serialize};

use super::{DoctorName, Patient, PatientLabel, Visit};
use crate::store::{decode_rows, Collection, Row, StoreError};

/// Shown wherever a referenced patient or doctor is absent.
pub const MISSING_LABEL: &str = "—";

/// Embed alias for a patient's assigned doctor.
pub const ASSIGNED_DOCTOR: &str = "assigned_doctor";
/// Embed alias for a visit's patient.
pub const VISIT_PATIENT: &str = "patient";
/// Embed alias for a visit's doctor.
pub const VISIT_DOCTOR: &str = "doctor";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientListing {
    #[serde(flatten)]
    pub patient: Patient,
    #[serde(default)]
    pub assigned_doctor: Option<DoctorName>,
}

impl PatientListing {
    pub fn assigned_doctor_label(&self) -> &str {
        self.assigned_doctor
            .as_ref()
            .map_or(MISSING_LABEL, |d| d.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitListing {
    #[serde(flatten)]
    pub visit: Visit,
    #[serde(default)]
    pub patient: Option<PatientLabel>,
    #[serde(default)]
    pub doctor: Option<DoctorName>,
    /// `"{file no} • {full name}"`, or the placeholder.
    #[serde(default, skip_deserializing)]
    pub patient_label: String,
    #[serde(default, skip_deserializing)]
    pub doctor_label: String,
}

impl VisitListing {
    fn labelled(mut self) -> Self {
        self.patient_label = match &self.patient {
            Some(p) => format!("{} • {}", p.clinic_file_no, p.full_name),
            None => MISSING_LABEL.to_string(),
        };
        self.doctor_label = self
            .doctor
            .as_ref()
            .map_or(MISSING_LABEL, |d| d.name.as_str())
            .to_string();
        self
    }
}

pub fn decode_patient_listings(rows: Vec<Row>) -> Result<Vec<PatientListing>, StoreError> {
    decode_rows(Collection::Patients, rows)
}

pub fn decode_visit_listings(rows: Vec<Row>) -> Result<Vec<VisitListing>, StoreError> {
    let listings: Vec<VisitListing> = decode_rows(Collection::Visits, rows)?;
    Ok(listings.into_iter().map(VisitListing::labelled).collect())
}
