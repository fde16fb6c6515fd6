//! Directory cache: the one shared list of doctors.
//!
//! Every doctor picker reads from the same [`DirectoryCache`] so they agree
//! after a refresh. A failed refresh leaves the previous list in place.
//! Refreshes run one at a time, so a slow fetch never overwrites the list a
//! later fetch already installed.

use std::sync::RwLock;

use serde_json::json;

use crate::models::{Doctor, DoctorId, NewDoctor};
use crate::session::Session;
use crate::store::{decode_rows, to_row, Collection, DataStore, Filter, Query, Row, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Only administrators can manage doctors")]
    Forbidden,
    #[error("Doctor name is required")]
    MissingName,
    #[error("Doctor {0} not found")]
    NotFound(DoctorId),
    #[error(transparent)]
    DataAccess(#[from] StoreError),
}

#[derive(Debug, Default)]
pub struct DirectoryCache {
    doctors: RwLock<Vec<Doctor>>,
    refreshing: tokio::sync::Mutex<()>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refetch every doctor ordered by name. Returns the number cached.
    pub async fn refresh<S: DataStore>(&self, store: &S) -> Result<usize, StoreError> {
        let _turn = self.refreshing.lock().await;
        let query = Query::new(Collection::Doctors)
            .columns(&["id", "name", "active", "created_at"])
            .order_asc("name");
        let rows = store.select(&query).await?;
        let doctors: Vec<Doctor> = decode_rows(Collection::Doctors, rows)?;
        let count = doctors.len();
        match self.doctors.write() {
            Ok(mut guard) => *guard = doctors,
            Err(poisoned) => *poisoned.into_inner() = doctors,
        }
        tracing::debug!(count, "Doctor directory refreshed");
        Ok(count)
    }

    /// Every cached doctor, active or not, in name order.
    pub fn all(&self) -> Vec<Doctor> {
        self.read(|doctors| doctors.to_vec())
    }

    /// Doctors offered for selection, in name order.
    pub fn active_doctors(&self) -> Vec<Doctor> {
        self.read(|doctors| doctors.iter().filter(|d| d.active).cloned().collect())
    }

    fn read<T>(&self, f: impl FnOnce(&[Doctor]) -> T) -> T {
        match self.doctors.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// Admin only. Inserts an active doctor and refreshes the cache.
    pub async fn add_doctor<S: DataStore>(
        &self,
        store: &S,
        session: &Session,
        name: &str,
    ) -> Result<DoctorId, DirectoryError> {
        if !session.is_admin() {
            return Err(DirectoryError::Forbidden);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(DirectoryError::MissingName);
        }

        let doctor = NewDoctor {
            name: name.to_string(),
            active: true,
        };
        let id = store
            .insert(Collection::Doctors, to_row(Collection::Doctors, &doctor)?)
            .await?;
        let id = DoctorId::new(id);
        tracing::info!(doctor_id = %id, user_id = %session.user_id, "Doctor added");

        self.refresh_after_write(store).await;
        Ok(id)
    }

    /// Admin only. Doctors are deactivated, never deleted.
    pub async fn set_active<S: DataStore>(
        &self,
        store: &S,
        session: &Session,
        id: &DoctorId,
        active: bool,
    ) -> Result<(), DirectoryError> {
        if !session.is_admin() {
            return Err(DirectoryError::Forbidden);
        }

        let mut values = Row::new();
        values.insert("active".into(), json!(active));
        let changed = store
            .update(Collection::Doctors, &[Filter::eq("id", id)], values)
            .await?;
        if changed == 0 {
            return Err(DirectoryError::NotFound(id.clone()));
        }
        tracing::info!(doctor_id = %id, active, user_id = %session.user_id, "Doctor availability changed");

        self.refresh_after_write(store).await;
        Ok(())
    }

    /// The write already succeeded; a stale list is logged, not reported.
    async fn refresh_after_write<S: DataStore>(&self, store: &S) {
        if let Err(e) = self.refresh(store).await {
            tracing::warn!(error = %e, "Doctor directory refresh after write failed");
        }
    }
}
