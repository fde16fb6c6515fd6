//! Doctor schedule: assigned-patient roster plus one day's agenda.
//!
//! The two lists are independent views and are never intersected.

use chrono::NaiveDate;
use serde::Serialize;

use crate::filtering::patient_query;
use crate::models::{
    decode_patient_listings, decode_visit_listings, DoctorId, PatientListing, VisitListing,
};
use crate::store::{DataStore, StoreError};
use crate::upcoming::visit_listing_query;

#[derive(Debug, Clone, Serialize)]
pub struct DoctorSchedule {
    pub doctor_id: DoctorId,
    pub date: NaiveDate,
    /// Newest registration first.
    pub patients: Vec<PatientListing>,
    /// By time of day, time-less visits first.
    pub visits: Vec<VisitListing>,
}

pub async fn doctor_schedule<S: DataStore>(
    store: &S,
    doctor_id: &DoctorId,
    date: NaiveDate,
) -> Result<DoctorSchedule, StoreError> {
    let roster = patient_query().eq("assigned_doctor_id", doctor_id);
    let agenda = visit_listing_query()
        .eq("doctor_id", doctor_id)
        .eq("visit_date", date.to_string())
        .order_asc_nulls_first("visit_time");

    let (patient_rows, visit_rows) = tokio::try_join!(store.select(&roster), store.select(&agenda))?;

    let patients = decode_patient_listings(patient_rows)?;
    let mut visits = decode_visit_listings(visit_rows)?;
    visits.sort_by_key(|v| v.visit.visit_time);

    tracing::debug!(
        %doctor_id,
        %date,
        patients = patients.len(),
        visits = visits.len(),
        "Doctor schedule fetched"
    );
    Ok(DoctorSchedule {
        doctor_id: doctor_id.clone(),
        date,
        patients,
        visits,
    })
}
