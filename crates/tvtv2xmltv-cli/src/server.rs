//! HTTP serving layer and periodic background refresh.
//!
//! The background task and the manual `/update` route share one update lock,
//! so at most one conversion run executes at a time. Handlers only read the
//! produced files from disk; no rendered document is cached in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock, watch};

use tvtv2xmltv_api::tvtv::TvtvApi;

use crate::config::AppConfig;
use crate::convert::Converter;

/// Bounded wait for the background updater after the server stops.
const UPDATER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of refresh progress.
///
/// Written only inside the update critical section; handlers take a
/// short-lived read lock and copy what they need.
#[derive(Debug, Default, Clone)]
struct UpdateStatus {
    /// Completion instant of the last successful refresh.
    last_update: Option<DateTime<Utc>>,
    /// Lineup id to written-file mapping from the last successful refresh.
    lineup_files: HashMap<String, PathBuf>,
}

/// Shared server state.
#[derive(Debug)]
struct ServerInner<A> {
    /// Application configuration.
    config: AppConfig,
    /// Conversion pipeline.
    converter: Converter,
    /// Listings API capability.
    api: A,
    /// Serializes update runs between the timer and manual triggers.
    update_lock: Mutex<()>,
    /// Refresh progress cell.
    status: RwLock<UpdateStatus>,
}

/// Cloneable handle used as axum state.
#[derive(Debug)]
struct AppState<A>(Arc<ServerInner<A>>);

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<A> AppState<A> {
    /// Creates fresh server state.
    fn new(config: AppConfig, api: A) -> Self {
        let converter = Converter::new(config.clone());
        Self(Arc::new(ServerInner {
            config,
            converter,
            api,
            update_lock: Mutex::new(()),
            status: RwLock::new(UpdateStatus::default()),
        }))
    }
}

impl<A> ServerInner<A> {
    /// Default on-disk location for a lineup's document, used until the
    /// first successful refresh records the written paths.
    fn default_lineup_file(&self, lineup_id: &str) -> PathBuf {
        if let [only] = self.config.lineups.as_slice()
            && only == lineup_id
        {
            return self.config.output_file.clone();
        }
        self.config
            .output_file
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!("{lineup_id}.xml"))
    }

    /// Resolves the on-disk document for a lineup.
    async fn lineup_file(&self, lineup_id: &str) -> PathBuf {
        let status = self.status.read().await;
        status
            .lineup_files
            .get(lineup_id)
            .cloned()
            .unwrap_or_else(|| self.default_lineup_file(lineup_id))
    }
}

impl<A: TvtvApi + Sync> ServerInner<A> {
    /// Runs one refresh. The update lock serializes the periodic timer and
    /// manual triggers; a failure logs and leaves the previous files and the
    /// recorded last-update time untouched.
    async fn run_update(&self) {
        let _guard = self.update_lock.lock().await;

        tracing::info!(lineups = ?self.config.lineups, "Updating XMLTV documents");
        match self.converter.save_to_file(&self.api, None).await {
            Ok(saved) => {
                let mut status = self.status.write().await;
                status.lineup_files = self
                    .config
                    .lineups
                    .iter()
                    .cloned()
                    .zip(saved)
                    .collect();
                status.last_update = Some(Utc::now());
                drop(status);
                tracing::info!("XMLTV update complete");
            }
            Err(e) => {
                tracing::error!(error = %e, "XMLTV update failed; keeping previous documents");
            }
        }
    }
}

/// Serves a lineup's document from disk, or 503 while it does not exist yet.
async fn lineup_response<A>(state: &AppState<A>, lineup_id: &str) -> Response {
    let path = state.0.lineup_file(lineup_id).await;
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("XMLTV file for lineup '{lineup_id}' not yet generated. Please wait..."),
        )
            .into_response(),
    }
}

/// `GET /` - the single lineup's document, or a link list in multi-lineup
/// configuration.
async fn index<A: TvtvApi + Sync>(State(state): State<AppState<A>>) -> Response {
    if let [only] = state.0.config.lineups.as_slice() {
        let lineup_id = only.clone();
        return lineup_response(&state, &lineup_id).await;
    }

    let items: String = state
        .0
        .config
        .lineups
        .iter()
        .map(|lid| format!("<li><a href=\"/{lid}.xml\">{lid}.xml</a></li>"))
        .collect();
    Html(format!(
        "<html>\
         <head><title>XMLTV Lineups</title></head>\
         <body><h1>Available XMLTV Lineups</h1><ul>{items}</ul></body>\
         </html>"
    ))
    .into_response()
}

/// `GET /{file}` - `xmltv.xml` aliases the index; `{lineupId}.xml` serves
/// that lineup's document.
async fn serve_file<A: TvtvApi + Sync>(
    State(state): State<AppState<A>>,
    UrlPath(file): UrlPath<String>,
) -> Response {
    if file == "xmltv.xml" {
        return index(State(state)).await;
    }

    let Some(lineup_id) = file.strip_suffix(".xml") else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !state.0.config.lineups.iter().any(|l| l == lineup_id) {
        return (
            StatusCode::NOT_FOUND,
            format!("Lineup '{lineup_id}' not configured"),
        )
            .into_response();
    }

    lineup_response(&state, lineup_id).await
}

/// `GET /health` - freshness report.
async fn health<A: TvtvApi + Sync>(State(state): State<AppState<A>>) -> Json<serde_json::Value> {
    let last_update = state.0.status.read().await.last_update;

    let mut files_exist = true;
    for lineup_id in &state.0.config.lineups {
        files_exist &= state.0.lineup_file(lineup_id).await.exists();
    }

    Json(serde_json::json!({
        "status": "healthy",
        "last_update": last_update.map(|t| t.to_rfc3339()),
        "lineups": &state.0.config.lineups,
        "files_exist": files_exist,
    }))
}

/// `GET /update` - synchronously runs one refresh and reports freshness.
///
/// A failed refresh still answers, with the unchanged last-update time.
async fn update<A: TvtvApi + Sync>(State(state): State<AppState<A>>) -> Json<serde_json::Value> {
    state.0.run_update().await;

    let last_update = state.0.status.read().await.last_update;
    Json(serde_json::json!({
        "status": "updated",
        "last_update": last_update.map(|t| t.to_rfc3339()),
        "lineups": &state.0.config.lineups,
    }))
}

/// Builds the route table.
fn router<A: TvtvApi + Sync + 'static>(state: AppState<A>) -> Router {
    Router::new()
        .route("/", get(index::<A>))
        .route("/health", get(health::<A>))
        .route("/update", get(update::<A>))
        .route("/{file}", get(serve_file::<A>))
        .with_state(state)
}

/// Background loop: one refresh at startup, then one per configured interval
/// until shutdown is signalled.
async fn refresh_loop<A: TvtvApi + Sync>(
    state: AppState<A>,
    mut shutdown: watch::Receiver<bool>,
) {
    state.0.run_update().await;

    let period = Duration::from_secs(state.0.config.update_interval.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a fresh interval completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => state.0.run_update().await,
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("Background updater stopped");
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Runs the serving layer with the periodic background refresh until a
/// shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run_server<A>(config: AppConfig, api: A) -> Result<()>
where
    A: TvtvApi + Sync + 'static,
{
    let state = AppState::new(config, api);
    let app = router(state.clone());

    let addr = format!("{}:{}", state.0.config.host, state.0.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        interval_secs = state.0.config.update_interval,
        "Serving XMLTV documents"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let updater = tokio::spawn(refresh_loop(state, shutdown_rx));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Server is down; stop the timer and give an in-flight update a bounded wait.
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(UPDATER_JOIN_TIMEOUT, updater).await.is_err() {
        tracing::warn!(
            timeout_secs = UPDATER_JOIN_TIMEOUT.as_secs(),
            "Background updater did not stop in time"
        );
    }

    Ok(())
}
