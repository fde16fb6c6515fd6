//! Local relational backend.
//!
//! One connection behind a mutex; every statement runs on tokio's blocking
//! pool. The schema carries the `clinic_file_no` uniqueness constraint, so a
//! losing concurrent insert surfaces as [`StoreError::UniqueViolation`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use uuid::Uuid;

use super::query::is_identifier;
use super::{Collection, Condition, DataStore, Filter, Query, Row, StoreError};

/// Columns stored as INTEGER 0/1 that must come back as JSON booleans.
const BOOLEAN_COLUMNS: &[(&str, &str)] = &[("doctors", "active")];

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_clinic.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| StoreError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Transport(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Transport("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Transport(format!("store task failed: {e}")))?
    }
}

impl DataStore for SqliteStore {
    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let query = query.clone();
        self.with_conn(move |conn| select_rows(conn, &query)).await
    }

    async fn insert(&self, collection: Collection, values: Row) -> Result<String, StoreError> {
        self.with_conn(move |conn| insert_row(conn, collection, values))
            .await
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        values: Row,
    ) -> Result<usize, StoreError> {
        let filters = filters.to_vec();
        self.with_conn(move |conn| update_rows(conn, collection, &filters, values))
            .await
    }
}

// ─── Statement building ──────────────────────────────────────────────────────

fn ident(name: &str) -> Result<&str, StoreError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidQuery(format!("not an identifier: {name:?}")))
    }
}

/// Translate a query into SQL plus positional parameters.
///
/// Base columns keep their names; embedded columns are aliased
/// `"{alias}.{column}"` and folded back into nested objects when read.
pub(crate) fn build_select(query: &Query) -> Result<(String, Vec<SqlValue>), StoreError> {
    let table = query.collection.as_str();

    let mut columns = Vec::new();
    if query.columns.is_empty() {
        columns.push("t.*".to_string());
    } else {
        for col in &query.columns {
            columns.push(format!("t.\"{}\"", ident(col)?));
        }
    }

    let mut joins = String::new();
    for (i, embed) in query.embeds.iter().enumerate() {
        let alias = ident(embed.alias)?;
        for col in &embed.columns {
            columns.push(format!("e{i}.\"{}\" AS \"{alias}.{}\"", ident(col)?, col));
        }
        joins.push_str(&format!(
            " LEFT JOIN \"{}\" e{i} ON e{i}.id = t.\"{}\"",
            embed.collection.as_str(),
            ident(embed.foreign_key)?
        ));
    }

    let mut sql = format!("SELECT {} FROM \"{table}\" t{joins}", columns.join(", "));
    let (clause, params) = where_clause(&query.filters, "t.", 0)?;
    sql.push_str(&clause);

    if !query.orders.is_empty() {
        let mut keys = Vec::new();
        for order in &query.orders {
            keys.push(format!(
                "t.\"{}\" {} {}",
                ident(order.field)?,
                if order.ascending { "ASC" } else { "DESC" },
                if order.nulls_first { "NULLS FIRST" } else { "NULLS LAST" },
            ));
        }
        // Ties fall back to insertion order, in the direction of the primary key.
        let tie = if query.orders[0].ascending { "ASC" } else { "DESC" };
        keys.push(format!("t.rowid {tie}"));
        sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    Ok((sql, params))
}

/// Placeholders are numbered from `offset + 1`.
fn where_clause(
    filters: &[Filter],
    prefix: &str,
    offset: usize,
) -> Result<(String, Vec<SqlValue>), StoreError> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for filter in filters {
        let field = ident(filter.field)?;
        let part = match (filter.condition, &filter.value) {
            (Condition::Eq, Value::Null) => format!("{prefix}\"{field}\" IS NULL"),
            (condition, value) => {
                params.push(sql_value(value));
                let op = match condition {
                    Condition::Eq => "=",
                    Condition::Gte => ">=",
                    Condition::Lte => "<=",
                };
                format!("{prefix}\"{field}\" {op} ?{}", offset + params.len())
            }
        };
        parts.push(part);
    }
    Ok((format!(" WHERE {}", parts.join(" AND ")), params))
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn json_value(table: &str, column: &str, value: ValueRef<'_>) -> Result<Value, StoreError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if BOOLEAN_COLUMNS.contains(&(table, column)) => Value::Bool(i != 0),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => {
            return Err(StoreError::InvalidQuery(format!(
                "binary column {table}.{column} cannot be returned"
            )))
        }
    })
}

fn select_rows(conn: &Connection, query: &Query) -> Result<Vec<Row>, StoreError> {
    let (sql, params) = build_select(query)?;
    let mut stmt = conn.prepare(&sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let base_table = query.collection.as_str();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in names.iter().enumerate() {
            match name.split_once('.') {
                None => {
                    let value = json_value(base_table, name, row.get_ref(i)?)?;
                    record.insert(name.clone(), value);
                }
                Some((alias, column)) => {
                    let table = query
                        .embeds
                        .iter()
                        .find(|e| e.alias == alias)
                        .map(|e| e.collection.as_str())
                        .unwrap_or(base_table);
                    let value = json_value(table, column, row.get_ref(i)?)?;
                    let nested = record
                        .entry(alias.to_string())
                        .or_insert_with(|| Value::Object(Row::new()));
                    if let Value::Object(map) = nested {
                        map.insert(column.to_string(), value);
                    }
                }
            }
        }
        // A to-one embed with no referenced row is null, not an object of nulls.
        for embed in &query.embeds {
            let missing = matches!(
                record.get(embed.alias),
                Some(Value::Object(map)) if map.values().all(Value::is_null)
            );
            if missing {
                record.insert(embed.alias.to_string(), Value::Null);
            }
        }
        out.push(record);
    }
    Ok(out)
}

fn insert_row(conn: &Connection, collection: Collection, mut values: Row) -> Result<String, StoreError> {
    if !values.contains_key("id") {
        values.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    if !values.contains_key("created_at") {
        values.insert(
            "created_at".into(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
    }
    let id = match &values["id"] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut columns = Vec::new();
    let mut params = Vec::new();
    for (column, value) in &values {
        columns.push(format!("\"{}\"", ident(column)?));
        params.push(sql_value(value));
    }
    let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        collection.as_str(),
        columns.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, params_from_iter(params.iter()))
        .map_err(|e| classify(collection, e))?;
    Ok(id)
}

fn update_rows(
    conn: &Connection,
    collection: Collection,
    filters: &[Filter],
    values: Row,
) -> Result<usize, StoreError> {
    if filters.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "refusing unfiltered update of {collection}"
        )));
    }
    if values.is_empty() {
        return Err(StoreError::InvalidQuery("update without columns".into()));
    }

    let mut sets = Vec::new();
    let mut params = Vec::new();
    for (column, value) in &values {
        params.push(sql_value(value));
        sets.push(format!("\"{}\" = ?{}", ident(column)?, params.len()));
    }

    let (clause, filter_params) = where_clause(filters, "", params.len())?;
    params.extend(filter_params);

    let sql = format!(
        "UPDATE \"{}\" SET {}{}",
        collection.as_str(),
        sets.join(", "),
        clause
    );
    conn.execute(&sql, params_from_iter(params.iter()))
        .map_err(|e| classify(collection, e))
}

/// Split constraint failures out of generic SQLite errors.
fn classify(collection: Collection, err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(code, message) = &err {
        let message = message.clone().unwrap_or_else(|| err.to_string());
        if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return StoreError::UniqueViolation { collection, message };
        }
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::Rejected { status: None, message };
        }
    }
    StoreError::from(err)
}
