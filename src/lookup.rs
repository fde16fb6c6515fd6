//! Search by clinic file number, with the patient's visit history.

use serde::Serialize;

use crate::filtering::patient_query;
use crate::models::{
    decode_patient_listings, decode_visit_listings, PatientListing, VisitListing,
};
use crate::store::{DataStore, StoreError};
use crate::upcoming::visit_listing_query;

#[derive(Debug, Clone, Serialize)]
pub struct PatientRecord {
    #[serde(flatten)]
    pub listing: PatientListing,
    /// Most recent visit date first.
    pub visits: Vec<VisitListing>,
}

/// `None` for a blank file number (no store call) or an unknown one.
pub async fn find_by_file_no<S: DataStore>(
    store: &S,
    file_no: &str,
) -> Result<Option<PatientRecord>, StoreError> {
    let file_no = file_no.trim();
    if file_no.is_empty() {
        return Ok(None);
    }

    let query = patient_query().eq("clinic_file_no", file_no);
    let Some(row) = store.select_optional(&query).await? else {
        tracing::debug!(clinic_file_no = %file_no, "No patient for file number");
        return Ok(None);
    };
    let Some(listing) = decode_patient_listings(vec![row])?.pop() else {
        return Ok(None);
    };

    let history = visit_listing_query()
        .eq("patient_id", &listing.patient.id)
        .order_desc("visit_date")
        .order_asc_nulls_first("visit_time");
    let visits = decode_visit_listings(store.select(&history).await?)?;

    Ok(Some(PatientRecord { listing, visits }))
}
