//! Registration workflow: resolve a patient by clinic file number
//! (create-or-update), then append one scheduled visit for them.
//!
//! Steps run strictly in order. There is no cross-collection transaction:
//! once the patient write has succeeded, a failed visit insert is reported as
//! [`RegistrationOutcome::PatientSavedVisitFailed`] and the patient stays saved.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{
    time_of_day, DoctorId, NewPatient, NewVisit, PatientAttributes, PatientId, UserId,
    VisitId, VisitStatus,
};
use crate::store::{to_row, Collection, DataStore, Filter, Query, StoreError};

/// Form input for one registration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegistrationInput {
    #[serde(default)]
    pub clinic_file_no: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub assigned_doctor_id: Option<DoctorId>,
    #[serde(default, deserialize_with = "blank_date")]
    pub visit_date: Option<NaiveDate>,
    #[serde(default, with = "time_of_day")]
    pub visit_time: Option<NaiveTime>,
    /// Doctor for this visit only; falls back to the assigned doctor.
    #[serde(default)]
    pub doctor_id: Option<DoctorId>,
    #[serde(default)]
    pub purpose: Option<String>,
    /// Set from the authenticated session, never from the form body.
    #[serde(skip_deserializing)]
    pub acting_user_id: Option<UserId>,
}

fn blank_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid date: {s}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    ClinicFileNo,
    FullName,
    VisitDate,
    ActingUserId,
}

impl RequiredField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClinicFileNo => "clinic_file_no",
            Self::FullName => "full_name",
            Self::VisitDate => "visit_date",
            Self::ActingUserId => "acting_user_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Missing required field(s): {}", field_list(.missing))]
pub struct ValidationError {
    pub missing: Vec<RequiredField>,
}

fn field_list(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(RequiredField::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Remote step a registration was executing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    LookupPatient,
    UpdatePatient,
    InsertPatient,
    ReresolvePatient,
}

impl RegistrationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LookupPatient => "lookup_patient",
            Self::UpdatePatient => "update_patient",
            Self::InsertPatient => "insert_patient",
            Self::ReresolvePatient => "reresolve_patient",
        }
    }
}

impl std::fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures before anything was written.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `source` is the store's own message, shown to the user as-is.
    #[error("{source}")]
    DataAccess {
        step: RegistrationStep,
        source: StoreError,
    },
}

impl RegistrationError {
    fn at(step: RegistrationStep) -> impl FnOnce(StoreError) -> Self {
        move |source| RegistrationError::DataAccess { step, source }
    }
}

#[must_use]
#[derive(Debug)]
pub enum RegistrationOutcome {
    Registered {
        patient_id: PatientId,
        visit_id: VisitId,
        patient_created: bool,
    },
    /// The patient row is durably saved; the visit was not scheduled.
    PatientSavedVisitFailed {
        patient_id: PatientId,
        patient_created: bool,
        reason: StoreError,
    },
}

impl RegistrationOutcome {
    pub fn patient_id(&self) -> &PatientId {
        match self {
            Self::Registered { patient_id, .. } | Self::PatientSavedVisitFailed { patient_id, .. } => {
                patient_id
            }
        }
    }
}

struct Normalized {
    acting_user_id: UserId,
    clinic_file_no: String,
    attributes: PatientAttributes,
    visit_date: NaiveDate,
    visit_time: Option<NaiveTime>,
    visit_doctor: Option<DoctorId>,
    purpose: Option<String>,
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trim every text field, drop blanks, and check the required fields.
fn normalize(input: RegistrationInput) -> Result<Normalized, ValidationError> {
    let clinic_file_no = input.clinic_file_no.trim().to_string();
    let full_name = input.full_name.trim().to_string();

    let mut missing = Vec::new();
    if clinic_file_no.is_empty() {
        missing.push(RequiredField::ClinicFileNo);
    }
    if full_name.is_empty() {
        missing.push(RequiredField::FullName);
    }
    if input.visit_date.is_none() {
        missing.push(RequiredField::VisitDate);
    }
    let acting_user_id = UserId::non_blank(input.acting_user_id);
    if acting_user_id.is_none() {
        missing.push(RequiredField::ActingUserId);
    }
    let (Some(visit_date), Some(acting_user_id)) = (input.visit_date, acting_user_id) else {
        return Err(ValidationError { missing });
    };
    if !missing.is_empty() {
        return Err(ValidationError { missing });
    }

    let assigned_doctor_id = DoctorId::non_blank(input.assigned_doctor_id);
    let visit_doctor =
        DoctorId::non_blank(input.doctor_id).or_else(|| assigned_doctor_id.clone());

    Ok(Normalized {
        acting_user_id,
        clinic_file_no,
        attributes: PatientAttributes {
            full_name,
            phone: optional(input.phone),
            notes: optional(input.notes),
            assigned_doctor_id,
        },
        visit_date,
        visit_time: input.visit_time,
        visit_doctor,
        purpose: optional(input.purpose),
    })
}

/// Register a visit, creating or updating the patient first.
pub async fn register_visit<S: DataStore>(
    store: &S,
    input: RegistrationInput,
) -> Result<RegistrationOutcome, RegistrationError> {
    let form = normalize(input)?;

    let (patient_id, patient_created) = resolve_patient(store, &form).await?;

    let visit = NewVisit {
        patient_id: patient_id.clone(),
        doctor_id: form.visit_doctor,
        visit_date: form.visit_date,
        visit_time: form.visit_time,
        purpose: form.purpose,
        status: VisitStatus::Scheduled,
        created_by: form.acting_user_id,
    };

    let inserted = match to_row(Collection::Visits, &visit) {
        Ok(row) => store.insert(Collection::Visits, row).await,
        Err(e) => Err(e),
    };

    match inserted {
        Ok(visit_id) => {
            let visit_id = VisitId::new(visit_id);
            tracing::info!(
                clinic_file_no = %form.clinic_file_no,
                %patient_id,
                %visit_id,
                patient_created,
                "Visit registered"
            );
            Ok(RegistrationOutcome::Registered {
                patient_id,
                visit_id,
                patient_created,
            })
        }
        Err(reason) => {
            tracing::warn!(
                clinic_file_no = %form.clinic_file_no,
                %patient_id,
                error = %reason,
                "Patient saved but visit not scheduled"
            );
            Ok(RegistrationOutcome::PatientSavedVisitFailed {
                patient_id,
                patient_created,
                reason,
            })
        }
    }
}

/// Returns the patient id and whether this call created the row.
async fn resolve_patient<S: DataStore>(
    store: &S,
    form: &Normalized,
) -> Result<(PatientId, bool), RegistrationError> {
    if let Some(existing) = find_patient_id(store, &form.clinic_file_no)
        .await
        .map_err(RegistrationError::at(RegistrationStep::LookupPatient))?
    {
        update_patient(store, &existing, &form.attributes).await?;
        return Ok((existing, false));
    }

    let new_patient = NewPatient {
        clinic_file_no: form.clinic_file_no.clone(),
        attributes: form.attributes.clone(),
    };
    let row = to_row(Collection::Patients, &new_patient)
        .map_err(RegistrationError::at(RegistrationStep::InsertPatient))?;

    match store.insert(Collection::Patients, row).await {
        Ok(id) => Ok((PatientId::new(id), true)),
        Err(conflict) if conflict.is_unique_violation() => {
            // Another registration created this file number after our lookup.
            tracing::warn!(
                clinic_file_no = %form.clinic_file_no,
                "File number claimed concurrently, switching to update"
            );
            let winner = find_patient_id(store, &form.clinic_file_no)
                .await
                .map_err(RegistrationError::at(RegistrationStep::ReresolvePatient))?
                .ok_or(RegistrationError::DataAccess {
                    step: RegistrationStep::InsertPatient,
                    source: conflict,
                })?;
            update_patient(store, &winner, &form.attributes).await?;
            Ok((winner, false))
        }
        Err(e) => Err(RegistrationError::at(RegistrationStep::InsertPatient)(e)),
    }
}

async fn find_patient_id<S: DataStore>(
    store: &S,
    clinic_file_no: &str,
) -> Result<Option<PatientId>, StoreError> {
    let query = Query::new(Collection::Patients)
        .columns(&["id"])
        .eq("clinic_file_no", clinic_file_no);
    let Some(row) = store.select_optional(&query).await? else {
        return Ok(None);
    };
    match row.get("id") {
        Some(serde_json::Value::String(id)) => Ok(Some(PatientId::new(id.clone()))),
        Some(serde_json::Value::Number(n)) => Ok(Some(PatientId::new(n.to_string()))),
        _ => Err(StoreError::Decode {
            collection: Collection::Patients,
            reason: "patient row without id".into(),
        }),
    }
}

/// Full overwrite: absent optional attributes are stored as null.
async fn update_patient<S: DataStore>(
    store: &S,
    patient_id: &PatientId,
    attributes: &PatientAttributes,
) -> Result<(), RegistrationError> {
    let step = RegistrationStep::UpdatePatient;
    let values = to_row(Collection::Patients, attributes).map_err(RegistrationError::at(step))?;
    let changed = store
        .update(Collection::Patients, &[Filter::eq("id", patient_id)], values)
        .await
        .map_err(RegistrationError::at(step))?;
    if changed == 0 {
        return Err(RegistrationError::DataAccess {
            step,
            source: StoreError::Rejected {
                status: None,
                message: format!("Patient {patient_id} could not be updated"),
            },
        });
    }
    Ok(())
}
