use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::RawContent;

pub const DEFAULT_READER_PREFIX: &str = "https://r.jina.ai/";

const BOT_MARKERS: &[&str] = &["Attention Required!", "Checking your browser"];

/// Produces raw markup for a page identifier (URL or file path).
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, identifier: &str) -> Result<RawContent, FetchError>;
}

/// Plain GET of the page itself.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }
}

#[async_trait]
impl ContentSource for HttpSource {
    async fn fetch(&self, identifier: &str) -> Result<RawContent, FetchError> {
        let body = get_text(&self.client, identifier, identifier).await?;
        Ok(RawContent::new(identifier, body))
    }
}

/// Fetches through a URL-prefixing reader proxy that returns pre-rendered text.
pub struct ReaderSource {
    client: Client,
    prefix: String,
}

impl ReaderSource {
    pub fn new(prefix: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            prefix: prefix.into(),
        })
    }

    fn proxied(&self, identifier: &str) -> String {
        format!("{}{}", self.prefix, identifier)
    }
}

#[async_trait]
impl ContentSource for ReaderSource {
    async fn fetch(&self, identifier: &str) -> Result<RawContent, FetchError> {
        let body = get_text(&self.client, &self.proxied(identifier), identifier).await?;
        Ok(RawContent::new(identifier, body))
    }
}

/// Reads markup saved on disk, e.g. a DOM serialized by a headless browser.
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, identifier: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(identifier),
            None => PathBuf::from(identifier),
        }
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSource for FileSource {
    async fn fetch(&self, identifier: &str) -> Result<RawContent, FetchError> {
        let path = self.resolve(identifier);
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| FetchError::Io { path, source })?;
        Ok(RawContent::new(identifier, body))
    }
}

async fn get_text(client: &Client, request_url: &str, identifier: &str) -> Result<String, FetchError> {
    debug!(url = request_url, "fetching page");
    let transport = |source: reqwest::Error| FetchError::Transport {
        url: identifier.to_string(),
        source,
    };

    let res = client.get(request_url).send().await.map_err(transport)?;
    let status = res.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: identifier.to_string(),
            status,
        });
    }

    if let Some(server) = res.headers().get("server").and_then(|v| v.to_str().ok()) {
        if server.to_lowercase().contains("cloudflare") {
            warn!(url = identifier, "page is served behind cloudflare");
        }
    }

    let body = res.text().await.map_err(transport)?;
    if let Some(marker) = detect_bot_wall(&body) {
        return Err(FetchError::Blocked {
            url: identifier.to_string(),
            reason: marker.to_string(),
        });
    }
    Ok(body)
}

fn detect_bot_wall(body: &str) -> Option<&'static str> {
    BOT_MARKERS.iter().copied().find(|m| body.contains(m))
}
