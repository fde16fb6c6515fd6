//! Test doubles and fixtures shared by the workflow tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;
use serde_json::{json, Value};

use super::{Collection, DataStore, Filter, Query, Row, SqliteStore, StoreError};
use crate::models::{DoctorId, PatientId};

/// Wraps a real store, counting every call and optionally misbehaving.
pub struct ScriptedStore<S> {
    inner: S,
    calls: AtomicUsize,
    fail_insert_into: Mutex<Option<Collection>>,
    fail_select_on: Mutex<Option<Collection>>,
    hidden_patient_lookups: AtomicUsize,
}

impl<S: DataStore> ScriptedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_insert_into: Mutex::new(None),
            fail_select_on: Mutex::new(None),
            hidden_patient_lookups: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every insert into `collection` fails with a rejected payload.
    pub fn fail_inserts_into(&self, collection: Collection) {
        *self.fail_insert_into.lock().unwrap() = Some(collection);
    }

    /// Every select on `collection` fails as if the store were unreachable.
    pub fn fail_selects_on(&self, collection: Collection) {
        *self.fail_select_on.lock().unwrap() = Some(collection);
    }

    /// The next `n` patient lookups by file number report no match, as if a
    /// concurrent registration had not committed yet.
    pub fn hide_patient_lookups(&self, n: usize) {
        self.hidden_patient_lookups.store(n, Ordering::SeqCst);
    }

    fn is_file_number_lookup(query: &Query) -> bool {
        query.collection == Collection::Patients
            && query.filters.iter().any(|f| f.field == "clinic_file_no")
    }
}

impl<S: DataStore> DataStore for ScriptedStore<S> {
    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = *self.fail_select_on.lock().unwrap();
        if failing == Some(query.collection) {
            return Err(StoreError::Transport(format!("{} unreachable", query.collection)));
        }
        if Self::is_file_number_lookup(query) {
            let hidden = self
                .hidden_patient_lookups
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if hidden.is_ok() {
                return Ok(Vec::new());
            }
        }
        self.inner.select(query).await
    }

    async fn insert(&self, collection: Collection, values: Row) -> Result<String, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = *self.fail_insert_into.lock().unwrap();
        if failing == Some(collection) {
            return Err(StoreError::Rejected {
                status: Some(503),
                message: format!("{collection} service unavailable"),
            });
        }
        self.inner.insert(collection, values).await
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        values: Row,
    ) -> Result<usize, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update(collection, filters, values).await
    }
}

pub fn memory_store() -> SqliteStore {
    SqliteStore::open_in_memory().unwrap()
}

fn object(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        other => panic!("fixture is not an object: {other}"),
    }
}

pub async fn seed_doctor<S: DataStore>(store: &S, name: &str, active: bool) -> DoctorId {
    let id = store
        .insert(Collection::Doctors, object(json!({"name": name, "active": active})))
        .await
        .unwrap();
    DoctorId::new(id)
}

pub async fn seed_patient<S: DataStore>(
    store: &S,
    file_no: &str,
    name: &str,
    phone: Option<&str>,
    doctor: Option<&DoctorId>,
) -> PatientId {
    let id = store
        .insert(
            Collection::Patients,
            object(json!({
                "clinic_file_no": file_no,
                "full_name": name,
                "phone": phone,
                "assigned_doctor_id": doctor.map(DoctorId::as_str),
            })),
        )
        .await
        .unwrap();
    PatientId::new(id)
}

pub async fn seed_visit<S: DataStore>(
    store: &S,
    patient: &PatientId,
    doctor: Option<&DoctorId>,
    date: NaiveDate,
    time: Option<&str>,
) -> String {
    store
        .insert(
            Collection::Visits,
            object(json!({
                "patient_id": patient.as_str(),
                "doctor_id": doctor.map(DoctorId::as_str),
                "visit_date": date.to_string(),
                "visit_time": time,
                "status": "scheduled",
                "created_by": "user-1",
            })),
        )
        .await
        .unwrap()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}
