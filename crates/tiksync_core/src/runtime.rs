/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Builds the sync stack once from configuration. Every client is constructed
//! here and handed down explicitly.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::assets::{AssetMigrator, OwnedStorage};
use crate::config::{HttpConfig, ServiceConfig};
use crate::datastore::{DirectusDatastore, Records};
use crate::media_store::{build_object_store, ObjectStore};
use crate::sync::SyncDriver;
use crate::upstream::HttpUpstream;
use crate::writer::UpsertWriter;

pub struct SyncRuntime {
    pub driver: Arc<SyncDriver>,
    pub store: Arc<dyn ObjectStore>,
}

pub fn build_http_client(cfg: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(cfg.pool_idle_timeout_secs))
        .pool_max_idle_per_host(cfg.pool_max_idle_per_host)
        .user_agent(concat!("tiksync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("http client init")
}

impl SyncRuntime {
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let http = build_http_client(&cfg.http)?;
        let store: Arc<dyn ObjectStore> = Arc::from(
            build_object_store(&cfg.storage, &cfg.http).context("object store init")?,
        );
        let assets = Arc::new(AssetMigrator::new(
            http.clone(),
            store.clone(),
            OwnedStorage::from_config(&cfg.storage),
        ));
        let records = Records::new(Arc::new(DirectusDatastore::new(http.clone(), &cfg.datastore)));
        let upstream = Arc::new(HttpUpstream::new(http, &cfg.upstream));
        let writer = UpsertWriter::new(records.clone(), assets);
        let driver = SyncDriver::new(records, upstream, writer, cfg.sync.clone());
        Ok(Self {
            driver: Arc::new(driver),
            store,
        })
    }

    /// Best-effort storage check at startup; a failure is only logged because
    /// migrations already fall back to remote URLs.
    pub async fn check_storage(&self) {
        match self.store.health_check().await {
            Ok(()) => info!("object storage reachable"),
            Err(e) => warn!("object storage health check failed: {e:#}"),
        }
    }
}
