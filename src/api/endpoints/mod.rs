//! API endpoint handlers.
//!
//! Each module corresponds to one front-desk screen or feature.
//! Handlers stay thin and call the workflow modules.

pub mod doctors;
pub mod health;
pub mod patients;
pub mod registrations;
pub mod session;
pub mod visits;

use chrono::NaiveDate;

use crate::api::error::ApiError;

/// Optional `YYYY-MM-DD` query value; blank means absent.
pub(crate) fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid {field}: {s}"))),
    }
}
