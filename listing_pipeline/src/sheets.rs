use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::LedgerError;
use crate::session::AuthenticatedSession;

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    pub updated_range: Option<String>,
    pub updated_rows: Option<u64>,
    pub updated_columns: Option<u64>,
    pub updated_cells: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    pub spreadsheet_id: Option<String>,
    pub table_range: Option<String>,
    #[serde(default)]
    pub updates: UpdateValuesResponse,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResponse {
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub replies: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    pub range: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

/// The three spreadsheet calls the ledger needs.
#[async_trait]
pub trait SheetsTransport: Send + Sync {
    /// Appends `values` after the last row of `range`, inserting new rows.
    async fn append_values(
        &self,
        session: &AuthenticatedSession,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Value>,
    ) -> Result<AppendResponse, LedgerError>;

    async fn get_values(
        &self,
        session: &AuthenticatedSession,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<ValueRange, LedgerError>;

    async fn batch_update(
        &self,
        session: &AuthenticatedSession,
        spreadsheet_id: &str,
        requests: Vec<Value>,
    ) -> Result<BatchUpdateResponse, LedgerError>;
}

/// Google Sheets v4 REST client.
pub struct SheetsClient {
    client: Client,
    base_url: String,
}

impl SheetsClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url: base_url.into(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, LedgerError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| LedgerError::Malformed(format!("sheets base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| LedgerError::Malformed("sheets base url cannot hold a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn check(res: Response) -> Result<Response, LedgerError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(LedgerError::Rejected { status, body })
}

#[async_trait]
impl SheetsTransport for SheetsClient {
    async fn append_values(
        &self,
        session: &AuthenticatedSession,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Value>,
    ) -> Result<AppendResponse, LedgerError> {
        let target = format!("{}:append", range);
        let url = self.url(&[spreadsheet_id, "values", &target])?;
        let res = self
            .client
            .post(url)
            .bearer_auth(session.access_token())
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": values }))
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    async fn get_values(
        &self,
        session: &AuthenticatedSession,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<ValueRange, LedgerError> {
        let url = self.url(&[spreadsheet_id, "values", range])?;
        let res = self
            .client
            .get(url)
            .bearer_auth(session.access_token())
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    async fn batch_update(
        &self,
        session: &AuthenticatedSession,
        spreadsheet_id: &str,
        requests: Vec<Value>,
    ) -> Result<BatchUpdateResponse, LedgerError> {
        let target = format!("{}:batchUpdate", spreadsheet_id);
        let url = self.url(&[&target])?;
        let res = self
            .client
            .post(url)
            .bearer_auth(session.access_token())
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }
}
