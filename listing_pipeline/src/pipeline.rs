use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use tokio::sync::Mutex;

use crate::error::{AuthError, ExtractError, FetchError, LedgerError, PipelineError};
use crate::extractor::StructuredExtractor;
use crate::ledger::LedgerWriter;
use crate::normalize::{normalize_all, LedgerRow, TIMESTAMP_FORMAT};
use crate::reducer::{reduce, ReductionConfig};
use crate::session::SessionProvider;
use crate::source::ContentSource;
use crate::utils;
use crate::ComplexName;

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub reduction: ReductionConfig,
    /// Pages prepared at the same time. Appends are always sequential.
    pub concurrency: usize,
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            reduction: ReductionConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            snapshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Nothing survived reduction.
    EmptyContent,
}

#[derive(Debug, thiserror::Error)]
pub enum PageFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The ledger session could not be renewed before this page's append.
    #[error(transparent)]
    Session(#[from] AuthError),
}

impl PageFailure {
    pub fn stage(&self) -> &'static str {
        match self {
            PageFailure::Fetch(_) => "fetch",
            PageFailure::Extraction(_) => "extraction",
            PageFailure::Ledger(_) => "ledger",
            PageFailure::Session(_) => "session",
        }
    }
}

#[derive(Debug)]
pub enum PageOutcome {
    Written {
        rows: usize,
        cells_written: u64,
        excluded: usize,
    },
    /// Rows were prepared but no ledger is attached.
    DryRun {
        rows: Vec<LedgerRow>,
        excluded: usize,
    },
    Skipped {
        reason: SkipReason,
    },
    NoListings {
        excluded: usize,
    },
    Failed(PageFailure),
}

impl PageOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            PageOutcome::Written { .. } => "written",
            PageOutcome::DryRun { .. } => "dry_run",
            PageOutcome::Skipped { .. } => "skipped",
            PageOutcome::NoListings { .. } => "no_listings",
            PageOutcome::Failed(_) => "failed",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PageOutcome::Written {
                rows,
                cells_written,
                excluded,
            } => format!("{} rows, {} cells written, {} excluded", rows, cells_written, excluded),
            PageOutcome::DryRun { rows, excluded } => {
                format!("{} rows prepared, {} excluded", rows.len(), excluded)
            }
            PageOutcome::Skipped { .. } => "no content left after reduction".to_string(),
            PageOutcome::NoListings { excluded } => {
                format!("no usable listings ({} excluded)", excluded)
            }
            PageOutcome::Failed(failure) => format!("{} failed: {}", failure.stage(), failure),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PageOutcome::Failed(_))
    }
}

#[derive(Debug)]
pub struct PageReport {
    pub identifier: String,
    pub outcome: PageOutcome,
}

#[derive(Debug)]
pub struct RunSummary {
    pub started_at: NaiveDateTime,
    pub pages: Vec<PageReport>,
    /// Set when the end-of-run column formatting call was rejected.
    pub format_error: Option<String>,
}

impl RunSummary {
    pub fn rows_written(&self) -> usize {
        self.pages
            .iter()
            .map(|p| match p.outcome {
                PageOutcome::Written { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.pages.iter().filter(|p| p.outcome.is_failure()).count()
    }

    pub fn to_json(&self) -> Value {
        let pages: Vec<Value> = self
            .pages
            .iter()
            .map(|p| {
                let mut page = json!({
                    "identifier": p.identifier,
                    "status": p.outcome.status(),
                    "detail": p.outcome.describe(),
                });
                if let PageOutcome::DryRun { rows, .. } = &p.outcome {
                    page["rows"] = json!(rows);
                }
                page
            })
            .collect();

        json!({
            "started_at": self.started_at.format(TIMESTAMP_FORMAT).to_string(),
            "rows_written": self.rows_written(),
            "failures": self.failures(),
            "format_error": self.format_error,
            "pages": pages,
        })
    }
}

struct LedgerSink {
    writer: LedgerWriter,
    sessions: Arc<dyn SessionProvider>,
    /// Held across a run's appends and format pass, so concurrent runs on
    /// one pipeline never interleave rows.
    write_lock: Mutex<()>,
}

enum PageStage {
    Ready {
        rows: Vec<LedgerRow>,
        excluded: usize,
    },
    Done(PageOutcome),
}

pub struct Pipeline {
    source: Arc<dyn ContentSource>,
    extractor: StructuredExtractor,
    sink: Option<LedgerSink>,
    options: PipelineOptions,
}

impl Pipeline {
    /// A pipeline without a ledger; every page ends as `DryRun` at best.
    pub fn new(
        source: Arc<dyn ContentSource>,
        extractor: StructuredExtractor,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            extractor,
            sink: None,
            options,
        }
    }

    pub fn with_ledger(mut self, writer: LedgerWriter, sessions: Arc<dyn SessionProvider>) -> Self {
        self.sink = Some(LedgerSink {
            writer,
            sessions,
            write_lock: Mutex::new(()),
        });
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.sink.is_none()
    }

    pub async fn run(&self, identifiers: &[String]) -> Result<RunSummary, PipelineError> {
        let started_at = Local::now().naive_local();

        // Acquired up front so a missing credential fails the run before any
        // page is fetched.
        if let Some(sink) = &self.sink {
            sink.sessions.get_session().await?;
        }

        info!(pages = identifiers.len(), dry_run = self.is_dry_run(), "starting run");
        let prepared: Vec<(String, PageStage)> = stream::iter(identifiers.iter().cloned())
            .map(|identifier| async move {
                let stage = self.prepare(&identifier).await;
                (identifier, stage)
            })
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut pages = Vec::with_capacity(prepared.len());
        let mut format_error = None;
        match &self.sink {
            Some(sink) => {
                let _guard = sink.write_lock.lock().await;
                let mut appended = false;
                for (identifier, stage) in prepared {
                    let outcome = match stage {
                        PageStage::Done(outcome) => outcome,
                        PageStage::Ready { rows, excluded } => {
                            appended = true;
                            match Self::write_page(sink, &rows).await {
                                Ok(cells_written) => PageOutcome::Written {
                                    rows: rows.len(),
                                    cells_written,
                                    excluded,
                                },
                                Err(failure) => {
                                    warn!(page = %identifier, error = %failure, "append failed");
                                    PageOutcome::Failed(failure)
                                }
                            }
                        }
                    };
                    info!(page = %identifier, status = outcome.status(), "{}", outcome.describe());
                    pages.push(PageReport { identifier, outcome });
                }

                if appended {
                    if let Err(e) = Self::enforce_formats(sink).await {
                        warn!(error = %e, "column formatting failed");
                        format_error = Some(e.to_string());
                    }
                }
            }
            None => {
                for (identifier, stage) in prepared {
                    let outcome = match stage {
                        PageStage::Done(outcome) => outcome,
                        PageStage::Ready { rows, excluded } => PageOutcome::DryRun { rows, excluded },
                    };
                    info!(page = %identifier, status = outcome.status(), "{}", outcome.describe());
                    pages.push(PageReport { identifier, outcome });
                }
            }
        }

        Ok(RunSummary {
            started_at,
            pages,
            format_error,
        })
    }

    /// Renews the session (cached unless near expiry) and appends one page.
    async fn write_page(sink: &LedgerSink, rows: &[LedgerRow]) -> Result<u64, PageFailure> {
        let session = sink.sessions.get_session().await?;
        let result = sink.writer.append(&session, rows).await?;
        Ok(result.cells_written)
    }

    async fn enforce_formats(sink: &LedgerSink) -> Result<(), PageFailure> {
        let session = sink.sessions.get_session().await?;
        let rules = &sink.writer.config().format_rules;
        sink.writer.enforce_column_formats(&session, rules).await?;
        Ok(())
    }

    async fn prepare(&self, identifier: &str) -> PageStage {
        let raw = match self.source.fetch(identifier).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(page = identifier, error = %e, "fetch failed");
                return PageStage::Done(PageOutcome::Failed(e.into()));
            }
        };

        if let Some(dir) = &self.options.snapshot_dir {
            if let Err(e) = utils::save_snapshot(dir, &raw).await {
                warn!(page = identifier, error = %e, "could not save snapshot");
            }
        }

        let reduced = reduce(&raw, &self.options.reduction);
        drop(raw);
        if reduced.is_empty() {
            return PageStage::Done(PageOutcome::Skipped {
                reason: SkipReason::EmptyContent,
            });
        }

        let captured_at = Local::now().naive_local();
        let (listings, name) = match self.extractor.extract(&reduced).await {
            Ok(out) => out,
            Err(e) => {
                warn!(page = identifier, error = %e, "extraction failed");
                return PageStage::Done(PageOutcome::Failed(e.into()));
            }
        };

        if listings.records.is_empty() {
            return PageStage::Done(PageOutcome::NoListings {
                excluded: listings.excluded,
            });
        }

        let name = if name.is_blank() {
            ComplexName::from_identifier(identifier)
        } else {
            name
        };
        PageStage::Ready {
            rows: normalize_all(&listings.records, &name, captured_at),
            excluded: listings.excluded,
        }
    }
}
