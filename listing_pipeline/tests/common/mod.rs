#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use listing_pipeline::extractor::{ExtractorConfig, StructuredExtractor};
use listing_pipeline::ledger::{LedgerConfig, LedgerWriter};
use listing_pipeline::openai::{CompletionService, OutputSchema};
use listing_pipeline::session::{AuthenticatedSession, SessionProvider};
use listing_pipeline::sheets::{
    AppendResponse, BatchUpdateResponse, SheetsTransport, UpdateValuesResponse, ValueRange,
};
use listing_pipeline::source::ContentSource;
use listing_pipeline::{AuthError, ExtractError, FetchError, LedgerError, RawContent};
use serde_json::{json, Value};

/// Pages keyed by identifier. Unknown identifiers answer 404.
#[derive(Default)]
pub struct MapSource {
    pages: HashMap<String, String>,
}

impl MapSource {
    pub fn with_page(mut self, identifier: &str, body: &str) -> Self {
        self.pages.insert(identifier.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl ContentSource for MapSource {
    async fn fetch(&self, identifier: &str) -> Result<RawContent, FetchError> {
        match self.pages.get(identifier) {
            Some(body) => Ok(RawContent::new(identifier, body.clone())),
            None => Err(FetchError::Status {
                url: identifier.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            }),
        }
    }
}

struct Script {
    marker: String,
    listings: Result<Value, String>,
    name: String,
}

/// Answers completion calls by finding a scripted marker in the prompt.
#[derive(Default)]
pub struct FakeCompletion {
    scripts: Vec<Script>,
    pub calls: AtomicUsize,
}

impl FakeCompletion {
    pub fn page(mut self, marker: &str, name: &str, listings: Value) -> Self {
        self.scripts.push(Script {
            marker: marker.to_string(),
            listings: Ok(json!({ "apartment_info": listings })),
            name: name.to_string(),
        });
        self
    }

    /// The listing call for this page returns a refusal-style service error.
    pub fn failing(mut self, marker: &str) -> Self {
        self.scripts.push(Script {
            marker: marker.to_string(),
            listings: Err("quota exceeded".to_string()),
            name: String::new(),
        });
        self
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(
        &self,
        prompt: &str,
        schema: &OutputSchema,
        _temperature: f32,
    ) -> Result<Value, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .iter()
            .find(|s| prompt.contains(&s.marker))
            .ok_or_else(|| ExtractError::Service("unscripted prompt".into()))?;
        match schema.name {
            "apartment_name" => Ok(json!({ "name": script.name })),
            _ => script.listings.clone().map_err(ExtractError::Service),
        }
    }
}

/// In-memory spreadsheet: appended rows plus the number format of each column.
#[derive(Default)]
pub struct FakeSheets {
    pub rows: Mutex<Vec<Vec<Value>>>,
    pub formats: Mutex<HashMap<u64, Value>>,
    pub append_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    /// Access token presented with each append, in call order.
    pub append_tokens: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Each append waits this long, to widen any overlap between callers.
    pub append_delay: Option<std::time::Duration>,
    /// Appends whose values mention this text are rejected.
    pub reject_containing: Option<String>,
}

impl FakeSheets {
    pub fn with_rows(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> Vec<Vec<Value>> {
        self.rows.lock().unwrap().clone()
    }

    pub fn format_of(&self, column: u64) -> Option<Value> {
        self.formats.lock().unwrap().get(&column).cloned()
    }
}

#[async_trait]
impl SheetsTransport for FakeSheets {
    async fn append_values(
        &self,
        session: &AuthenticatedSession,
        _spreadsheet_id: &str,
        range: &str,
        values: Vec<Value>,
    ) -> Result<AppendResponse, LedgerError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        self.append_tokens
            .lock()
            .unwrap()
            .push(session.access_token().to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(needle) = &self.reject_containing {
            if values.iter().any(|v| v.to_string().contains(needle.as_str())) {
                return Err(LedgerError::Rejected {
                    status: reqwest::StatusCode::FORBIDDEN,
                    body: "The caller does not have permission".into(),
                });
            }
        }

        let mut cells = 0;
        let mut rows = self.rows.lock().unwrap();
        for value in values {
            let row = value.as_array().cloned().unwrap_or_default();
            cells += row.len() as u64;
            rows.push(row);
        }
        Ok(AppendResponse {
            spreadsheet_id: Some("sheet".into()),
            table_range: Some(range.to_string()),
            updates: UpdateValuesResponse {
                updated_cells: Some(cells),
                ..Default::default()
            },
        })
    }

    async fn get_values(
        &self,
        _session: &AuthenticatedSession,
        _spreadsheet_id: &str,
        range: &str,
    ) -> Result<ValueRange, LedgerError> {
        Ok(ValueRange {
            range: Some(range.to_string()),
            values: self.snapshot(),
        })
    }

    async fn batch_update(
        &self,
        _session: &AuthenticatedSession,
        _spreadsheet_id: &str,
        requests: Vec<Value>,
    ) -> Result<BatchUpdateResponse, LedgerError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut formats = self.formats.lock().unwrap();
        for request in &requests {
            let repeat = &request["repeatCell"];
            let column = repeat["range"]["startColumnIndex"]
                .as_u64()
                .ok_or_else(|| LedgerError::Malformed("repeatCell without column".into()))?;
            formats.insert(column, repeat["cell"]["userEnteredFormat"]["numberFormat"].clone());
        }
        Ok(BatchUpdateResponse {
            spreadsheet_id: Some("sheet".into()),
            replies: vec![json!({}); requests.len()],
        })
    }
}

/// Hands out `token-1`, `token-2`, ... and fails every call after `fail_after`.
pub struct FakeSessions {
    pub fail_after: Option<usize>,
    pub calls: AtomicUsize,
}

impl FakeSessions {
    pub fn ok() -> Self {
        Self {
            fail_after: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::failing_after(0)
    }

    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn get_session(&self) -> Result<AuthenticatedSession, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if matches!(self.fail_after, Some(limit) if call > limit) {
            return Err(AuthError::Endpoint {
                status: reqwest::StatusCode::BAD_REQUEST,
                body: "invalid_grant".into(),
            });
        }
        Ok(AuthenticatedSession::new(
            format!("token-{}", call),
            Utc::now() + Duration::hours(1),
        ))
    }
}

pub fn extractor(completions: Arc<FakeCompletion>) -> StructuredExtractor {
    StructuredExtractor::new(completions, ExtractorConfig::default())
}

pub fn writer(sheets: Arc<FakeSheets>) -> LedgerWriter {
    LedgerWriter::new(sheets, LedgerConfig::new("sheet", "Sheet1!A:H"))
}

pub fn session() -> AuthenticatedSession {
    AuthenticatedSession::new("ya29.test", Utc::now() + Duration::hours(1))
}
