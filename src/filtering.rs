//! Filtering engine for the patient list.
//!
//! Doctor and date restrictions go to the store; the free-text match runs
//! locally because it spans three columns with substring semantics.
//!
//! 1. Patients (optionally of one assigned doctor), newest first
//! 2. Case-insensitive substring over file number, name and phone
//! 3. Intersection with the patients holding a visit on the given date

use std::collections::HashSet;

use crate::models::{
    decode_patient_listings, PatientFilter, PatientListing, ASSIGNED_DOCTOR,
};
use crate::store::{Collection, DataStore, Query, StoreError};

pub(crate) const PATIENT_COLUMNS: &[&str] = &[
    "id",
    "clinic_file_no",
    "full_name",
    "phone",
    "notes",
    "assigned_doctor_id",
    "created_at",
];

/// Patients with their assigned doctor's name, newest registration first.
pub(crate) fn patient_query() -> Query {
    Query::new(Collection::Patients)
        .columns(PATIENT_COLUMNS)
        .embed(ASSIGNED_DOCTOR, Collection::Doctors, "assigned_doctor_id", &["name"])
        .order_desc("created_at")
}

pub async fn list_patients<S: DataStore>(
    store: &S,
    filter: &PatientFilter,
) -> Result<Vec<PatientListing>, StoreError> {
    let mut query = patient_query();
    if let Some(doctor) = filter.doctor() {
        query = query.eq("assigned_doctor_id", doctor);
    }
    let mut patients = decode_patient_listings(store.select(&query).await?)?;

    if let Some(needle) = filter.needle() {
        patients.retain(|p| matches_text(p, &needle));
    }

    if let Some(date) = filter.date {
        let on_date = patients_with_visit_on(store, &date.to_string()).await?;
        patients.retain(|p| on_date.contains(p.patient.id.as_str()));
    }

    tracing::debug!(
        count = patients.len(),
        by_doctor = filter.doctor().is_some(),
        by_date = filter.date.is_some(),
        by_text = filter.needle().is_some(),
        "Patient list filtered"
    );
    Ok(patients)
}

/// `needle` must already be lower-cased.
fn matches_text(listing: &PatientListing, needle: &str) -> bool {
    let patient = &listing.patient;
    [
        Some(patient.clinic_file_no.as_str()),
        Some(patient.full_name.as_str()),
        patient.phone.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(needle))
}

async fn patients_with_visit_on<S: DataStore>(
    store: &S,
    date: &str,
) -> Result<HashSet<String>, StoreError> {
    let query = Query::new(Collection::Visits)
        .columns(&["patient_id"])
        .eq("visit_date", date);
    let rows = store.select(&query).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match row.get("patient_id") {
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}
