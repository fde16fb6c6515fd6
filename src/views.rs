//! View coordination for interactive callers.
//!
//! Library API for front ends that embed this crate and drive a search box
//! directly. The HTTP surface has no route for it: remote clients debounce on
//! their side and call `GET /api/patients`.
//!
//! - [`Debouncer`] drops inputs superseded within the quiet period
//! - [`ViewEpoch`] discards results for a view that was left or re-queried
//! - [`PatientSearch`] puts both in front of the filtering engine

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SEARCH_DEBOUNCE;
use crate::filtering::list_patients;
use crate::models::{PatientFilter, PatientListing};
use crate::store::{DataStore, StoreError};

/// Trailing-edge debounce: only the last call in a burst proceeds.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    generation: AtomicU64,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
        }
    }

    /// Wait out the quiet period. `false` if a newer call arrived meanwhile.
    pub async fn settle(&self) -> bool {
        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        self.generation.load(Ordering::SeqCst) == mine
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(SEARCH_DEBOUNCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTicket(u64);

/// Latest-wins guard for one view's asynchronous results.
#[derive(Debug, Default)]
pub struct ViewEpoch {
    current: AtomicU64,
}

impl ViewEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch. Invalidates every earlier ticket.
    pub fn issue(&self) -> ViewTicket {
        ViewTicket(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The view was navigated away from; pending results are stale.
    pub fn leave(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, ticket: ViewTicket) -> bool {
        self.current.load(Ordering::SeqCst) == ticket.0
    }

    /// `Some(result)` only if nothing superseded `ticket`.
    pub fn accept<T>(&self, ticket: ViewTicket, result: T) -> Option<T> {
        self.is_current(ticket).then_some(result)
    }
}

/// Patient list as an interactive view.
///
/// `Ok(None)` means the result was superseded and must not be shown.
pub struct PatientSearch<S> {
    store: Arc<S>,
    debouncer: Debouncer,
    epoch: ViewEpoch,
}

impl<S: DataStore> PatientSearch<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_debounce(store, SEARCH_DEBOUNCE)
    }

    pub fn with_debounce(store: Arc<S>, delay: Duration) -> Self {
        Self {
            store,
            debouncer: Debouncer::new(delay),
            epoch: ViewEpoch::new(),
        }
    }

    /// Free-text edits: runs only once typing has paused.
    pub async fn typed(
        &self,
        filter: PatientFilter,
    ) -> Result<Option<Vec<PatientListing>>, StoreError> {
        let ticket = self.epoch.issue();
        if !self.debouncer.settle().await {
            return Ok(None);
        }
        self.run(ticket, &filter).await
    }

    /// Doctor or date changes: runs immediately.
    pub async fn changed(
        &self,
        filter: PatientFilter,
    ) -> Result<Option<Vec<PatientListing>>, StoreError> {
        let ticket = self.epoch.issue();
        self.run(ticket, &filter).await
    }

    pub fn leave(&self) {
        self.epoch.leave();
    }

    async fn run(
        &self,
        ticket: ViewTicket,
        filter: &PatientFilter,
    ) -> Result<Option<Vec<PatientListing>>, StoreError> {
        let listed = list_patients(self.store.as_ref(), filter).await?;
        let accepted = self.epoch.accept(ticket, listed);
        if accepted.is_none() {
            tracing::debug!("Discarded stale patient list");
        }
        Ok(accepted)
    }
}
