/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod routes;

use anyhow::Context;
use tiksync_core::config::ServiceConfig;
use tiksync_core::logging;
use tiksync_core::runtime::SyncRuntime;
use tracing::{error, info};

use crate::routes::{router, AppState};

const SERVICE_NAME: &str = "tiksync_server";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::init(SERVICE_NAME, false);
            error!("invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    logging::init(SERVICE_NAME, cfg.log_json);

    let rt = SyncRuntime::from_config(&cfg)?;
    rt.check_storage().await;
    info!(
        mode = ?cfg.sync.staleness_mode,
        concurrency = cfg.sync.concurrency,
        "sync runtime ready"
    );

    let app = router(AppState::new(rt.driver.clone()));
    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!("{SERVICE_NAME} listening on http://{}", cfg.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("ctrl-c handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
