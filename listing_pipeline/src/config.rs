use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;

use crate::error::ConfigError;
use crate::ledger::LedgerConfig;
use crate::openai;
use crate::source::{ContentSource, FileSource, HttpSource, ReaderSource, DEFAULT_READER_PREFIX};

pub const DEFAULT_RANGE: &str = "Sheet1!A:H";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Plain HTTP GET of the page.
    Http,
    /// Fetch through a reader proxy that renders the page to text.
    Reader,
    /// Identifiers are local file paths.
    File,
}

impl SourceKind {
    pub fn build(self, reader_prefix: &str) -> Result<Arc<dyn ContentSource>, reqwest::Error> {
        Ok(match self {
            SourceKind::Http => Arc::new(HttpSource::new()?),
            SourceKind::Reader => Arc::new(ReaderSource::new(reader_prefix)?),
            SourceKind::File => Arc::new(FileSource::new()),
        })
    }
}

/// Settings read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub reader_prefix: String,
    pub spreadsheet_id: Option<String>,
    pub range: String,
    pub sheet_id: i64,
    pub client_secrets: PathBuf,
    pub token_path: PathBuf,
}

impl PipelineSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| dotenv::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let sheet_id = match get("SHEET_ID") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "SHEET_ID",
                value: raw,
            })?,
            None => 0,
        };

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| openai::DEFAULT_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
            reader_prefix: get("READER_PREFIX").unwrap_or_else(|| DEFAULT_READER_PREFIX.to_string()),
            spreadsheet_id: get("SPREADSHEET_ID"),
            range: get("RANGE_NAME").unwrap_or_else(|| DEFAULT_RANGE.to_string()),
            sheet_id,
            client_secrets: get("GOOGLE_CLIENT_SECRETS")
                .unwrap_or_else(|| "credentials.json".to_string())
                .into(),
            token_path: get("GOOGLE_TOKEN_PATH")
                .unwrap_or_else(|| "token.json".to_string())
                .into(),
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    pub fn ledger_config(&self) -> Result<LedgerConfig, ConfigError> {
        let spreadsheet_id = self
            .spreadsheet_id
            .clone()
            .ok_or(ConfigError::Missing("SPREADSHEET_ID"))?;
        let mut config = LedgerConfig::new(spreadsheet_id, self.range.clone());
        config.sheet_id = self.sheet_id;
        Ok(config)
    }
}
