/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Runs a single sync job to completion and prints the run summary as JSON.
//!
//! Usage: `sync_once <profiles|media>`

use anyhow::{Context, Result};
use tiksync_core::config::ServiceConfig;
use tiksync_core::runtime::SyncRuntime;
use tiksync_core::sync::SyncJob;

#[tokio::main]
async fn main() -> Result<()> {
    let job: SyncJob = std::env::args()
        .nth(1)
        .context("usage: sync_once <profiles|media>")?
        .parse()
        .map_err(anyhow::Error::msg)?;

    let cfg = ServiceConfig::from_env()?;
    tiksync_core::logging::init("sync_once", cfg.log_json);

    let rt = SyncRuntime::from_config(&cfg)?;
    let summary = rt.driver.run(job).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
