/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Trigger routes. Each job route acknowledges immediately and runs the job in
//! the background; at most one run per job is in flight.

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tiksync_core::sync::{RunSummary, SyncDriver, SyncJob};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span};

#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: SyncJob) -> anyhow::Result<RunSummary>;
}

#[async_trait]
impl JobRunner for SyncDriver {
    async fn run(&self, job: SyncJob) -> anyhow::Result<RunSummary> {
        SyncDriver::run(self, job).await
    }
}

#[derive(Clone)]
pub struct AppState {
    runner: Arc<dyn JobRunner>,
    profiles_running: Arc<AtomicBool>,
    media_running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            runner,
            profiles_running: Arc::new(AtomicBool::new(false)),
            media_running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn flag(&self, job: SyncJob) -> &Arc<AtomicBool> {
        match job {
            SyncJob::Profiles => &self.profiles_running,
            SyncJob::Media => &self.media_running,
        }
    }
}

/// Clears the in-flight flag even if the run panics.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/api/tiktok/user", get(trigger_profiles))
        .route("/api/tiktok/media", get(trigger_media))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("req");
                info_span!(
                    "http",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id
                )
            }),
        )
        .with_state(state)
}

async fn root() -> &'static str {
    "tiksync is running"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn trigger_profiles(State(state): State<AppState>) -> Response {
    start_job(&state, SyncJob::Profiles)
}

async fn trigger_media(State(state): State<AppState>) -> Response {
    start_job(&state, SyncJob::Media)
}

fn label(job: SyncJob) -> &'static str {
    match job {
        SyncJob::Profiles => "user",
        SyncJob::Media => "media",
    }
}

fn start_job(state: &AppState, job: SyncJob) -> Response {
    let flag = state.flag(job).clone();
    if flag
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        info!(%job, "trigger ignored, run already in progress");
        let msg = format!("TikTok {} update process already running.", label(job));
        return (StatusCode::ACCEPTED, Json(json!({ "msg": msg }))).into_response();
    }

    let runner = state.runner.clone();
    tokio::spawn(async move {
        let _running = RunningGuard(flag);
        info!(%job, "update process started");
        match runner.run(job).await {
            Ok(summary) => info!(
                %job,
                total = summary.total,
                updated = summary.updated,
                failed = summary.failed,
                "update process ended"
            ),
            Err(e) => error!(%job, "update process aborted: {e:#}"),
        }
    });

    let msg = format!("TikTok {} update process started.", label(job));
    (StatusCode::ACCEPTED, Json(json!({ "msg": msg }))).into_response()
}
