use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::handlers::run_handlers::{poll_run, start_run};
use crate::state::AppState;

pub fn run_routes(state: AppState) -> Router {
    Router::new()
        .route("/runs", post(start_run))
        .route("/runs/{id}", get(poll_run))
        .layer(Extension(state))
}
