//! Remote data access: row-level queries against the four named collections.
//!
//! Workflows never speak SQL or HTTP directly. They build a [`Query`] and hand
//! it to a [`DataStore`]; rows come back as JSON objects and are decoded into
//! the typed models with serde. Two backends exist:
//! - [`SqliteStore`]: a local relational store (also the test backend)
//! - [`RestStore`]: a hosted PostgREST-style service over HTTP

pub mod query;
pub mod rest;
pub mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use query::{Condition, Embed, Filter, Order, Query};
pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// One fetched record: column name → JSON value, embedded rows as nested objects.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Named record collections exposed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Doctors,
    Patients,
    Visits,
    Profiles,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doctors => "doctors",
            Self::Patients => "patients",
            Self::Visits => "visits",
            Self::Profiles => "profiles",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store unreachable: {0}")]
    Transport(String),

    /// The store answered with an error payload. `message` is shown to the user as-is.
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },

    #[error("Duplicate value in {collection}: {message}")]
    UniqueViolation { collection: Collection, message: String },

    #[error("Expected at most one {collection} row, found several")]
    MultipleRows { collection: Collection },

    #[error("Failed to decode {collection} row: {reason}")]
    Decode { collection: Collection, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

/// Row-level access to the named collections.
///
/// Futures are `Send` so workflows can run inside axum handlers and spawned tasks.
pub trait DataStore: Send + Sync {
    /// Fetch every row matching `query`, in the query's order.
    fn select(&self, query: &Query) -> impl Future<Output = Result<Vec<Row>, StoreError>> + Send;

    /// Insert one row and return the identifier the store assigned.
    fn insert(
        &self,
        collection: Collection,
        values: Row,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Overwrite the given columns on every row matching `filters`. Returns the
    /// number of rows changed. An empty filter list is refused.
    fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        values: Row,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// At-most-one fetch: `None` for no match, an explicit error for more than one.
    fn select_optional(
        &self,
        query: &Query,
    ) -> impl Future<Output = Result<Option<Row>, StoreError>> + Send {
        async move {
            let bounded = query.clone().limit(2);
            let mut rows = self.select(&bounded).await?;
            match rows.len() {
                0 => Ok(None),
                1 => Ok(rows.pop()),
                _ => Err(StoreError::MultipleRows {
                    collection: query.collection,
                }),
            }
        }
    }
}

/// Backend chosen at startup from configuration.
#[derive(Clone)]
pub enum AnyStore {
    Sqlite(SqliteStore),
    Rest(RestStore),
}

impl AnyStore {
    /// Handle that acts as the holder of `access_token`. The local store has
    /// no per-user policies and is shared as is.
    pub fn for_user(&self, access_token: &str) -> AnyStore {
        match self {
            AnyStore::Sqlite(store) => AnyStore::Sqlite(store.clone()),
            AnyStore::Rest(store) => AnyStore::Rest(store.for_user(access_token)),
        }
    }
}

impl DataStore for AnyStore {
    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        match self {
            AnyStore::Sqlite(store) => store.select(query).await,
            AnyStore::Rest(store) => store.select(query).await,
        }
    }

    async fn insert(&self, collection: Collection, values: Row) -> Result<String, StoreError> {
        match self {
            AnyStore::Sqlite(store) => store.insert(collection, values).await,
            AnyStore::Rest(store) => store.insert(collection, values).await,
        }
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        values: Row,
    ) -> Result<usize, StoreError> {
        match self {
            AnyStore::Sqlite(store) => store.update(collection, filters, values).await,
            AnyStore::Rest(store) => store.update(collection, filters, values).await,
        }
    }
}

/// Serialize an insert/update payload into a row.
pub fn to_row<T: Serialize>(collection: Collection, value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::InvalidQuery(format!(
            "{collection} payload must be an object, got {other}"
        ))),
        Err(e) => Err(StoreError::InvalidQuery(e.to_string())),
    }
}

pub fn decode_row<T: DeserializeOwned>(collection: Collection, row: Row) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| StoreError::Decode {
        collection,
        reason: e.to_string(),
    })
}

pub fn decode_rows<T: DeserializeOwned>(
    collection: Collection,
    rows: Vec<Row>,
) -> Result<Vec<T>, StoreError> {
    rows.into_iter().map(|row| decode_row(collection, row)).collect()
}
