//! HTTP trigger surface.
//!
//! | Route | Effect |
//! |-------|--------|
//! | `GET /scrape` | Run every source, return the posts |
//! | `POST /scrape` | Same, and persist each new post |
//! | `GET /health` | Liveness |
//!
//! A run that completes, even with some sources failing, answers `200` with
//! `{ "success": true, "message": "Scraping completed", "results": [...] }`.
//! Only a fatal run error answers `500` with
//! `{ "success": false, "message": "Scraping failed", "error": "..." }`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::error::{Result, ScrapeError};
use crate::models::ScrapedPost;
use crate::pipeline::{RunMode, SourcePipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SourcePipeline>,
}

#[derive(Debug, Serialize)]
struct ScrapeSuccess {
    success: bool,
    message: &'static str,
    results: Vec<ScrapedPost>,
}

#[derive(Debug, Serialize)]
struct ScrapeFailure {
    success: bool,
    message: &'static str,
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape", get(scrape_only).post(scrape_and_persist))
        .route("/health", get(health))
        .with_state(state)
}

async fn scrape_only(State(state): State<AppState>) -> Response {
    run(&state, RunMode::ScrapeOnly).await
}

async fn scrape_and_persist(State(state): State<AppState>) -> Response {
    run(&state, RunMode::ScrapeAndPersist).await
}

#[instrument(level = "info", skip(state))]
async fn run(state: &AppState, mode: RunMode) -> Response {
    info!("Scrape requested");
    match state.pipeline.run(mode).await {
        Ok(report) => Json(ScrapeSuccess {
            success: true,
            message: "Scraping completed",
            results: report.results,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Error in scraping process");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ScrapeFailure {
                    success: false,
                    message: "Scraping failed",
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Serve `state` on `bind` until `shutdown` resolves.
pub async fn serve<F>(state: AppState, bind: SocketAddr, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| ScrapeError::Config(format!("cannot bind {bind}: {e}")))?;
    info!(%bind, "Listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ScrapeError::Config(format!("server error: {e}")))?;
    info!("Server stopped");
    Ok(())
}
