use axum::{extract::Path, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::{AppState, RunEntry, RunStatus};

#[derive(Deserialize)]
pub struct StartRunPayload {
    pub urls: Vec<String>,
}

#[derive(Serialize)]
pub struct RunCreated {
    pub run_id: Uuid,
}

/// POST /api/runs
pub async fn start_run(
    Extension(state): Extension<AppState>,
    Json(payload): Json<StartRunPayload>,
) -> impl IntoResponse {
    let urls: Vec<String> = payload
        .urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if urls.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "urls must not be empty" })),
        );
    }

    let pruned = state.prune_finished(Instant::now());
    if pruned > 0 {
        debug!(pruned, "expired finished runs");
    }

    let run_id = Uuid::new_v4();
    state.runs.insert(run_id, RunEntry::pending());
    info!(%run_id, pages = urls.len(), "run queued");

    let state_clone = state.clone();
    tokio::spawn(async move {
        let status = match state_clone.pipeline.run(&urls).await {
            Ok(summary) => RunStatus::Done {
                summary: summary.to_json(),
            },
            Err(e) => {
                warn!(%run_id, error = %e, "run aborted");
                RunStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        state_clone.runs.insert(run_id, RunEntry::finished(status));
    });

    (StatusCode::ACCEPTED, Json(json!(RunCreated { run_id })))
}

/// GET /api/runs/{id}
pub async fn poll_run(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.runs.get(&id) {
        Some(entry) => (StatusCode::OK, Json(json!(entry.status))),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Run not found" }))),
    }
}
