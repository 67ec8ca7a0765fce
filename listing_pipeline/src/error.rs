use std::path::PathBuf;

use reqwest::StatusCode;

/// A page could not be obtained from its content source.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("http error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("{url} returned a bot protection page ({reason})")]
    Blocked { url: String, reason: String },
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of the text-generation service call.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// The service did not produce output conforming to the declared schema.
    #[error("extraction schema error: {0}")]
    Schema(String),
    /// Transport, quota or authorization failure talking to the service.
    #[error("extraction service error: {0}")]
    Service(String),
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        ExtractError::Service(err.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("no stored credential and interactive authorization is disabled")]
    NoCredential,
    #[error("authorization flow failed: {0}")]
    Interactive(String),
    #[error("token endpoint rejected the request ({status}): {body}")]
    Endpoint { status: StatusCode, body: String },
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("credential file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed credential data: {0}")]
    Json(#[from] serde_json::Error),
}

/// The store rejected an append, read or formatting call.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("ledger rejected the request ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("ledger unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected ledger response: {0}")]
    Malformed(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
    #[error("invalid css selector {0:?}")]
    Selector(String),
}

/// Errors that abort a whole run rather than a single page.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("cannot establish a ledger session: {0}")]
    Auth(#[from] AuthError),
}
