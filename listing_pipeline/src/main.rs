use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use listing_pipeline::config::{PipelineSettings, SourceKind};
use listing_pipeline::extractor::{ExtractorConfig, StructuredExtractor, DEFAULT_FOCUS};
use listing_pipeline::ledger::LedgerWriter;
use listing_pipeline::normalize::COLUMNS;
use listing_pipeline::oauth::{GoogleOAuth, SHEETS_SCOPE};
use listing_pipeline::openai::OpenAiClient;
use listing_pipeline::pipeline::{Pipeline, PipelineOptions, DEFAULT_CONCURRENCY};
use listing_pipeline::reducer::{ReductionConfig, DEFAULT_TAGS};
use listing_pipeline::session::{OAuthSessionProvider, SessionProvider, TokenStore};
use listing_pipeline::sheets::SheetsClient;
use listing_pipeline::utils;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scrape apartment listing pages into a spreadsheet ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, extract and append listings for each page
    Run(RunArgs),
    /// Obtain and store a ledger credential
    Authorize,
    /// Re-apply the timestamp and date column formats
    Formats,
    /// Print the rows currently in the ledger
    Show {
        /// Only print the last N rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Page URLs (or file paths with --source file)
    urls: Vec<String>,

    /// File with one page identifier per line
    #[arg(short = 'f', long)]
    urls_file: Option<PathBuf>,

    /// How pages are fetched
    #[arg(short, long, value_enum, default_value_t = SourceKind::Http)]
    source: SourceKind,

    /// Tags whose direct text is kept
    #[arg(short, long, value_delimiter = ',')]
    tags: Vec<String>,

    /// CSS selector limiting reduction to one element, e.g. "#bedroom-type-2"
    #[arg(long)]
    scope: Option<String>,

    /// Which units to ask the model for
    #[arg(long, default_value = DEFAULT_FOCUS)]
    focus: String,

    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Number of pages prepared concurrently
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrent: usize,

    /// Save the raw markup of each page here before reduction
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Extract and normalize but do not touch the ledger
    #[arg(long)]
    dry_run: bool,

    /// Fail instead of opening the browser consent flow
    #[arg(long)]
    no_interactive: bool,

    /// Write the run summary as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = PipelineSettings::from_env()?;

    match cli.command {
        Commands::Run(args) => run(&settings, args).await,
        Commands::Authorize => {
            let sessions = build_sessions(&settings, true).await?;
            let session = sessions.get_session().await?;
            println!(
                "Credential stored at {} (access token valid until {}).",
                settings.token_path.display(),
                session.expires_at()
            );
            Ok(())
        }
        Commands::Formats => {
            let writer = build_writer(&settings)?;
            let session = build_sessions(&settings, false).await?.get_session().await?;
            writer
                .enforce_column_formats(&session, &writer.config().format_rules)
                .await?;
            println!("Column formats applied.");
            Ok(())
        }
        Commands::Show { limit } => {
            let writer = build_writer(&settings)?;
            let session = build_sessions(&settings, false).await?.get_session().await?;
            let rows = writer.read_rows(&session).await?;
            if rows.is_empty() {
                println!("No data found.");
                return Ok(());
            }
            let skip = limit.map(|n| rows.len().saturating_sub(n)).unwrap_or(0);
            println!("{}", COLUMNS.join(" | "));
            for row in rows.iter().skip(skip) {
                println!("{}", row.join(" | "));
            }
            Ok(())
        }
    }
}

async fn run(settings: &PipelineSettings, args: RunArgs) -> anyhow::Result<()> {
    let mut urls = args.urls.clone();
    if let Some(path) = &args.urls_file {
        urls.extend(read_identifiers(path).await?);
    }
    if urls.is_empty() {
        bail!("no pages given; pass URLs or --urls-file");
    }

    let mut reduction = if args.tags.is_empty() {
        ReductionConfig::new(DEFAULT_TAGS)
    } else {
        ReductionConfig::new(&args.tags)
    };
    if let Some(scope) = &args.scope {
        reduction = reduction.with_scope(scope)?;
    }

    let completions = OpenAiClient::new(
        settings.require_api_key()?.to_string(),
        settings.openai_model.clone(),
        settings.openai_base_url.clone(),
    )?;
    let extractor = StructuredExtractor::new(
        Arc::new(completions),
        ExtractorConfig {
            focus: args.focus.clone(),
            temperature: args.temperature,
        },
    );

    let source = args.source.build(&settings.reader_prefix)?;
    let options = PipelineOptions {
        reduction,
        concurrency: args.concurrent,
        snapshot_dir: args.snapshot_dir.clone(),
    };

    let mut pipeline = Pipeline::new(source, extractor, options);
    if !args.dry_run {
        let writer = build_writer(settings)?;
        let sessions = build_sessions(settings, !args.no_interactive).await?;
        pipeline = pipeline.with_ledger(writer, sessions);
    }

    let summary = pipeline.run(&urls).await?;

    for page in &summary.pages {
        println!("{:<10} {}  ({})", page.outcome.status(), page.identifier, page.outcome.describe());
    }
    if let Some(err) = &summary.format_error {
        eprintln!("Column formatting failed: {}", err);
    }
    println!(
        "Done: {} pages, {} rows written, {} failed.",
        summary.pages.len(),
        summary.rows_written(),
        summary.failures()
    );

    if let Some(path) = &args.output {
        utils::save_json(&summary.to_json(), path)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Summary saved to {}", path.display());
    }
    Ok(())
}

async fn read_identifiers(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

fn build_writer(settings: &PipelineSettings) -> anyhow::Result<LedgerWriter> {
    Ok(LedgerWriter::new(
        Arc::new(SheetsClient::new()?),
        settings.ledger_config()?,
    ))
}

async fn build_sessions(
    settings: &PipelineSettings,
    interactive: bool,
) -> anyhow::Result<Arc<dyn SessionProvider>> {
    let oauth = GoogleOAuth::from_secrets_file(&settings.client_secrets, vec![SHEETS_SCOPE.to_string()])
        .await
        .with_context(|| format!("loading {}", settings.client_secrets.display()))?;
    Ok(Arc::new(OAuthSessionProvider::new(
        oauth,
        TokenStore::new(settings.token_path.clone()),
        interactive,
    )))
}
