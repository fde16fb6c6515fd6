//! Hosted backend speaking the PostgREST dialect (`/rest/v1/{collection}`).
//!
//! Filters become `field=op.value` parameters, embeds become
//! `alias:collection!foreign_key(columns)` select items, and error payloads
//! (`{ code, message }`) are mapped onto [`StoreError`]. Postgres reports a
//! unique violation as code `23505` / HTTP 409.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::query::is_identifier;
use super::{Collection, Condition, DataStore, Filter, Query, Row, StoreError};

const UNIQUE_VIOLATION_CODE: &str = "23505";

/// The project `apikey` goes on every request. Row-level policies see the
/// signed-in user only when the handle is scoped with [`RestStore::for_user`];
/// an unscoped handle authenticates as the project key itself.
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    user_token: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

/// Error body returned by the hosted service.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            user_token: None,
            client,
            timeout_secs,
        })
    }

    /// Handle acting as the user holding `access_token`. Shares the HTTP client.
    pub fn for_user(&self, access_token: &str) -> Self {
        Self {
            user_token: Some(access_token.to_string()),
            ..self.clone()
        }
    }

    fn request(&self, method: Method, collection: Collection) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, collection.as_str());
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.user_token.as_deref().unwrap_or(self.api_key.as_str()))
    }

    fn transport(&self, e: reqwest::Error) -> StoreError {
        if e.is_connect() {
            StoreError::Transport(format!("cannot reach {}", self.base_url))
        } else if e.is_timeout() {
            StoreError::Transport(format!("request timed out after {}s", self.timeout_secs))
        } else {
            StoreError::Transport(e.to_string())
        }
    }

    async fn rows(&self, collection: Collection, response: Response) -> Result<Vec<Row>, StoreError> {
        if !response.status().is_success() {
            return Err(error_from_response(collection, response).await);
        }
        let body: Vec<Value> = response.json().await.map_err(|e| StoreError::Decode {
            collection,
            reason: e.to_string(),
        })?;
        body.into_iter()
            .map(|value| match value {
                Value::Object(row) => Ok(row),
                other => Err(StoreError::Decode {
                    collection,
                    reason: format!("expected an object, got {other}"),
                }),
            })
            .collect()
    }
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

impl DataStore for RestStore {
    async fn select(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let params = select_params(query)?;
        let response = self
            .request(Method::GET, query.collection)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.rows(query.collection, response).await
    }

    async fn insert(&self, collection: Collection, values: Row) -> Result<String, StoreError> {
        let response = self
            .request(Method::POST, collection)
            .headers(representation_headers())
            .query(&[("select", "id")])
            .json(&Value::Object(values))
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let mut rows = self.rows(collection, response).await?;
        let row = rows.pop().ok_or_else(|| StoreError::Decode {
            collection,
            reason: "insert returned no row".into(),
        })?;
        match row.get("id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(StoreError::Decode {
                collection,
                reason: "insert returned no id".into(),
            }),
        }
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        values: Row,
    ) -> Result<usize, StoreError> {
        if filters.is_empty() {
            return Err(StoreError::InvalidQuery(format!(
                "refusing unfiltered update of {collection}"
            )));
        }
        let mut params = filters
            .iter()
            .map(filter_param)
            .collect::<Result<Vec<_>, _>>()?;
        params.push(("select".into(), "id".into()));

        let response = self
            .request(Method::PATCH, collection)
            .headers(representation_headers())
            .query(&params)
            .json(&Value::Object(values))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        Ok(self.rows(collection, response).await?.len())
    }
}

// ─── Query encoding ──────────────────────────────────────────────────────────

fn checked(name: &'static str) -> Result<&'static str, StoreError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidQuery(format!("not an identifier: {name:?}")))
    }
}

pub(crate) fn select_clause(query: &Query) -> Result<String, StoreError> {
    let mut items: Vec<String> = if query.columns.is_empty() {
        vec!["*".into()]
    } else {
        query
            .columns
            .iter()
            .map(|c| checked(*c).map(String::from))
            .collect::<Result<_, _>>()?
    };
    for embed in &query.embeds {
        let columns = embed
            .columns
            .iter()
            .map(|c| checked(*c))
            .collect::<Result<Vec<_>, _>>()?;
        items.push(format!(
            "{}:{}!{}({})",
            checked(embed.alias)?,
            embed.collection.as_str(),
            checked(embed.foreign_key)?,
            columns.join(",")
        ));
    }
    Ok(items.join(","))
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn filter_param(filter: &Filter) -> Result<(String, String), StoreError> {
    let field = checked(filter.field)?.to_string();
    let expr = match (filter.condition, &filter.value) {
        (Condition::Eq, Value::Null) => "is.null".to_string(),
        (Condition::Eq, v) => format!("eq.{}", literal(v)),
        (Condition::Gte, v) => format!("gte.{}", literal(v)),
        (Condition::Lte, v) => format!("lte.{}", literal(v)),
    };
    Ok((field, expr))
}

pub(crate) fn select_params(query: &Query) -> Result<Vec<(String, String)>, StoreError> {
    let mut params = vec![("select".to_string(), select_clause(query)?)];
    for filter in &query.filters {
        params.push(filter_param(filter)?);
    }
    if !query.orders.is_empty() {
        let keys = query
            .orders
            .iter()
            .map(|o| {
                checked(o.field).map(|field| {
                    format!(
                        "{field}.{}.{}",
                        if o.ascending { "asc" } else { "desc" },
                        if o.nulls_first { "nullsfirst" } else { "nullslast" }
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        params.push(("order".into(), keys.join(",")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".into(), limit.to_string()));
    }
    Ok(params)
}

async fn error_from_response(collection: Collection, response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_from_payload(collection, status, &body)
}

pub(crate) fn error_from_payload(collection: Collection, status: StatusCode, body: &str) -> StoreError {
    let payload: Option<ErrorPayload> = serde_json::from_str(body).ok();
    let code = payload.as_ref().and_then(|p| p.code.clone());
    let message = payload
        .as_ref()
        .and_then(|p| p.message.clone().or_else(|| p.details.clone()))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("{collection} request failed with status {}", status.as_u16())
            } else {
                body.trim().to_string()
            }
        });

    if status == StatusCode::CONFLICT || code.as_deref() == Some(UNIQUE_VIOLATION_CODE) {
        return StoreError::UniqueViolation { collection, message };
    }
    StoreError::Rejected {
        status: Some(status.as_u16()),
        message,
    }
}
