// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for shopnav.
//!
//! Two read-only endpoints, one per pipeline, plus a health probe. Every
//! response is a JSON envelope: `{ "ok": true, "data": … }` on success and
//! `{ "ok": false, "error": "…" }` on failure.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shopnav::{ScrapeError, Scraper};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// State shared by all handlers.
pub struct AppState {
    pub scraper: Scraper,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(scraper: Scraper) -> Self {
        Self {
            scraper,
            started_at: Instant::now(),
        }
    }
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/scrape", get(handle_scrape))
        .route("/api/facets", get(handle_facets))
        .layer(cors)
        .with_state(state)
}

/// Serve the REST API on `addr` until `shutdown` resolves.
pub async fn start(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("REST API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[derive(Deserialize)]
struct UrlParams {
    url: Option<String>,
}

impl UrlParams {
    fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let shared_browser = state.scraper.pool().is_initialized().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_s": state.started_at.elapsed().as_secs(),
        "shared_browser": shared_browser,
    }))
}

async fn handle_scrape(
    Query(params): Query<UrlParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(url) = params.url() else {
        return failure(StatusCode::BAD_REQUEST, "Missing url param");
    };
    respond(state.scraper.categories(url).await)
}

async fn handle_facets(
    Query(params): Query<UrlParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(url) = params.url() else {
        return failure(StatusCode::BAD_REQUEST, "Missing url param");
    };
    respond(state.scraper.facets(url).await)
}

fn respond<T: Serialize>(result: Result<T, ScrapeError>) -> Response {
    match result {
        Ok(data) => Json(json!({ "ok": true, "data": data })).into_response(),
        Err(e) if e.is_client_error() => failure(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            warn!("request failed: {e:#}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "ok": false, "error": message }))).into_response()
}
