mod handlers;
mod routes;
mod state;

use std::env;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use listing_pipeline::config::{PipelineSettings, SourceKind};
use listing_pipeline::extractor::{ExtractorConfig, StructuredExtractor};
use listing_pipeline::ledger::LedgerWriter;
use listing_pipeline::oauth::{GoogleOAuth, SHEETS_SCOPE};
use listing_pipeline::openai::OpenAiClient;
use listing_pipeline::pipeline::PipelineOptions;
use listing_pipeline::session::{OAuthSessionProvider, TokenStore};
use listing_pipeline::sheets::SheetsClient;
use listing_pipeline::{ConfigError, Pipeline};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use routes::runs::run_routes;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = PipelineSettings::from_env()?;
    let pipeline = build_pipeline(&settings).await?;
    let state = AppState::new(pipeline);

    let mut app = Router::new().nest("/api", run_routes(state));

    if let Ok(client_url) = env::var("CLIENT_URL") {
        let cors = CorsLayer::new()
            .allow_origin(
                client_url
                    .parse::<HeaderValue>()
                    .context("CLIENT_URL is not a valid origin")?,
            )
            .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
        app = app.layer(cors);
    }

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_pipeline(settings: &PipelineSettings) -> anyhow::Result<Pipeline> {
    let completions = OpenAiClient::new(
        settings.require_api_key()?.to_string(),
        settings.openai_model.clone(),
        settings.openai_base_url.clone(),
    )?;
    let extractor = StructuredExtractor::new(Arc::new(completions), ExtractorConfig::default());
    let source = SourceKind::Http.build(&settings.reader_prefix)?;
    let pipeline = Pipeline::new(source, extractor, PipelineOptions::default());

    let ledger = match settings.ledger_config() {
        Ok(ledger) => ledger,
        Err(ConfigError::Missing(name)) => {
            warn!("{} not set, runs will not write to the ledger", name);
            return Ok(pipeline);
        }
        Err(e) => return Err(e.into()),
    };

    // A server cannot open a browser; the credential must already be stored
    // (run `listing-pipeline authorize` once).
    let oauth = GoogleOAuth::from_secrets_file(&settings.client_secrets, vec![SHEETS_SCOPE.to_string()])
        .await
        .with_context(|| format!("loading {}", settings.client_secrets.display()))?;
    let sessions = OAuthSessionProvider::new(oauth, TokenStore::new(settings.token_path.clone()), false);
    let writer = LedgerWriter::new(Arc::new(SheetsClient::new()?), ledger);
    Ok(pipeline.with_ledger(writer, Arc::new(sessions)))
}
