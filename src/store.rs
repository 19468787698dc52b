// Remote table store access. `RestStore` talks to the hosted store over its
// REST interface; `MemoryStore` answers the same queries from rows loaded out
// of a seed file. Callers only ever see the `StoreHandle`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap, fs, path::Path, sync::Arc};
use thiserror::Error;

use crate::config::Settings;
use crate::query::{Direction, Predicate, Scalar, StoreQuery};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to the store failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected store response: {0}")]
    InvalidResponse(String),
    #[error("unknown table '{0}'")]
    UnknownTable(String),
}

// Rows of one select, with the exact total when it was asked for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub rows: Vec<Value>,
    pub total_count: Option<u64>,
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(&self, query: &StoreQuery) -> Result<Rows, StoreError>;
}

/// Either a usable store or the record that credentials were never given.
#[derive(Clone)]
pub enum StoreHandle {
    Configured(Arc<dyn TableStore>),
    Unconfigured,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreHandle::Configured(_) => f.write_str("StoreHandle::Configured"),
            StoreHandle::Unconfigured => f.write_str("StoreHandle::Unconfigured"),
        }
    }
}

impl StoreHandle {
    pub fn new(store: impl TableStore + 'static) -> Self {
        StoreHandle::Configured(Arc::new(store))
    }

    // Remote credentials win over a seed file. Neither means unconfigured,
    // which is not an error at startup: pages show a "cannot connect" banner.
    pub fn from_settings(settings: &Settings, http_client: Client) -> Result<Self> {
        let url = settings.supabase_url.as_deref().filter(|s| !s.trim().is_empty());
        let key = settings.supabase_anon_key.as_deref().filter(|s| !s.trim().is_empty());

        if let (Some(url), Some(key)) = (url, key) {
            tracing::info!("Using remote catalog store at {}", url);
            return Ok(Self::new(RestStore::new(http_client, url, key)));
        }

        if let Some(seed_file) = settings.seed_file.as_deref() {
            let store = MemoryStore::from_seed_file(Path::new(seed_file))?;
            tracing::info!("Using in-memory catalog store seeded from {}", seed_file);
            return Ok(Self::new(store));
        }

        tracing::error!("Store credentials are missing (APP_SUPABASE_URL / APP_SUPABASE_ANON_KEY). Catalog pages will report a connection error.");
        Ok(StoreHandle::Unconfigured)
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, StoreHandle::Configured(_))
    }
}

// --- REST store ---

pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        RestStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn headers(&self, exact_count: bool) -> Result<HeaderMap, StoreError> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| StoreError::InvalidResponse(format!("bad API key header: {}", e));
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.api_key).map_err(invalid)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(invalid)?,
        );
        if exact_count {
            headers.insert("Prefer", HeaderValue::from_static("count=exact"));
        }
        Ok(headers)
    }
}

#[async_trait]
impl TableStore for RestStore {
    async fn select(&self, query: &StoreQuery) -> Result<Rows, StoreError> {
        let url = format!("{}/rest/v1/{}", self.base_url, query.table);
        let params = query.to_params();
        tracing::debug!(table = %query.table, ?params, "Querying remote store");

        let response = self
            .client
            .get(&url)
            .headers(self.headers(query.exact_count)?)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let total_count = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        // An offset past the last row is answered with 416 and `*/total`
        if status == StatusCode::RANGE_NOT_SATISFIABLE && total_count.is_some() {
            tracing::debug!(table = %query.table, ?total_count, "Requested window is past the end");
            return Ok(Rows {
                rows: Vec::new(),
                total_count,
            });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "[Failed to read response body]".to_string());
            return Err(StoreError::Status { status, body });
        }

        let rows: Vec<Value> = response.json().await?;
        Ok(Rows { rows, total_count })
    }
}

// `0-8/20` → 20, `*/0` → 0, `0-8/*` → unknown
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

// --- In-memory store ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, rows: Vec<Value>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }

    /// Loads `{"cars": [...], "testimonials": [...]}`.
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let tables: HashMap<String, Vec<Value>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))?;
        for (table, rows) in &tables {
            tracing::debug!("Seeded table '{}' with {} rows", table, rows.len());
        }
        Ok(MemoryStore { tables })
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn select(&self, query: &StoreQuery) -> Result<Rows, StoreError> {
        let table = self
            .tables
            .get(&query.table)
            .ok_or_else(|| StoreError::UnknownTable(query.table.clone()))?;

        let mut matched: Vec<&Value> = table
            .iter()
            .filter(|row| query.predicates.iter().all(|p| matches(row, p)))
            .collect();

        if let Some(sort) = &query.order {
            matched.sort_by(|a, b| {
                let (a, b) = (a.get(&sort.field), b.get(&sort.field));
                // Nulls last in either direction
                match (a.filter(|v| !v.is_null()), b.filter(|v| !v.is_null())) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(a), Some(b)) => {
                        let ord = compare_values(a, b).unwrap_or(Ordering::Equal);
                        match sort.direction {
                            Direction::Asc => ord,
                            Direction::Desc => ord.reverse(),
                        }
                    }
                }
            });
        }

        let total = matched.len() as u64;
        let (skip, take) = match (query.range, query.limit) {
            (Some((from, to)), _) => (from, to.saturating_sub(from) + 1),
            (None, Some(limit)) => (0, limit),
            (None, None) => (0, total),
        };

        let rows = matched
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(take).unwrap_or(usize::MAX))
            .map(|row| project(row, &query.columns))
            .collect();

        Ok(Rows {
            rows,
            total_count: query.exact_count.then_some(total),
        })
    }
}

fn project(row: &Value, columns: &str) -> Value {
    if columns.trim() == "*" {
        return row.clone();
    }
    let Some(object) = row.as_object() else {
        return row.clone();
    };
    let picked = columns
        .split(',')
        .map(str::trim)
        .filter_map(|column| object.get(column).map(|v| (column.to_string(), v.clone())))
        .collect();
    Value::Object(picked)
}

fn matches(row: &Value, predicate: &Predicate) -> bool {
    let field = row.get(predicate.field()).filter(|v| !v.is_null());
    let Some(field) = field else {
        // SQL semantics: comparisons against NULL never match
        return false;
    };
    match predicate {
        Predicate::Eq(_, v) => compare_scalar(field, v) == Some(Ordering::Equal),
        Predicate::NotEq(_, v) => matches!(compare_scalar(field, v), Some(o) if o != Ordering::Equal),
        Predicate::Gte(_, v) => matches!(compare_scalar(field, v), Some(Ordering::Greater | Ordering::Equal)),
        Predicate::Lte(_, v) => matches!(compare_scalar(field, v), Some(Ordering::Less | Ordering::Equal)),
        Predicate::In(_, values) => values
            .iter()
            .any(|v| compare_scalar(field, v) == Some(Ordering::Equal)),
    }
}

fn compare_scalar(value: &Value, scalar: &Scalar) -> Option<Ordering> {
    match (value, scalar) {
        (Value::String(s), Scalar::Text(t)) => Some(s.as_str().cmp(t.as_str())),
        (Value::Number(n), Scalar::Int(i)) => n.as_f64()?.partial_cmp(&(*i as f64)),
        // Numeric columns filtered with text (e.g. a raw query parameter)
        (Value::Number(n), Scalar::Text(t)) => n.as_f64()?.partial_cmp(&t.trim().parse::<f64>().ok()?),
        (Value::String(s), Scalar::Int(i)) => s.parse::<f64>().ok()?.partial_cmp(&(*i as f64)),
        (Value::Bool(b), Scalar::Bool(c)) => Some(b.cmp(c)),
        (Value::Bool(b), Scalar::Text(t)) => Some(b.cmp(&t.parse::<bool>().ok()?)),
        _ => None,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
