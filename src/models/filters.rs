use chrono::NaiveDate;

use super::DoctorId;

/// Patient list filter. Every field is optional; an empty filter lists everyone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientFilter {
    pub doctor_id: Option<DoctorId>,
    pub date: Option<NaiveDate>,
    pub text_query: Option<String>,
}

impl PatientFilter {
    /// Lower-cased, trimmed free-text needle, `None` when there is nothing to match.
    pub fn needle(&self) -> Option<String> {
        self.text_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    pub fn doctor(&self) -> Option<&DoctorId> {
        self.doctor_id.as_ref().filter(|id| !id.as_str().trim().is_empty())
    }
}
