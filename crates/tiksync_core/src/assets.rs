/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Moves remote-hosted images onto owned storage.

use rand::{rngs::OsRng, RngCore};
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::media_store::ObjectStore;

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Avatar,
    Cover,
}

impl AssetKind {
    pub fn prefix(self) -> &'static str {
        match self {
            AssetKind::Avatar => "tiktok_avatars",
            AssetKind::Cover => "tiktok_video_covers",
        }
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("download {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download {url} returned {status}")]
    DownloadStatus { url: String, status: u16 },
    #[error("download {url} returned an empty body")]
    Empty { url: String },
    #[error("upload {key} failed: {source:#}")]
    Upload { key: String, source: anyhow::Error },
}

/// Recognises URLs that already point into owned storage, by custom-domain or
/// provider-domain substring.
#[derive(Debug, Clone, Default)]
pub struct OwnedStorage {
    domains: Vec<String>,
}

impl OwnedStorage {
    pub fn new(custom_domain: Option<&str>, provider_domain: Option<&str>) -> Self {
        let domains = [custom_domain, provider_domain]
            .into_iter()
            .flatten()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    pub fn from_config(cfg: &StorageConfig) -> Self {
        Self::new(cfg.custom_domain.as_deref(), cfg.provider_domain.as_deref())
    }

    pub fn is_owned(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        let lower = url.to_ascii_lowercase();
        self.domains.iter().any(|d| lower.contains(d.as_str()))
    }
}

pub struct AssetMigrator {
    http: reqwest::Client,
    store: Arc<dyn ObjectStore>,
    owned: OwnedStorage,
}

impl AssetMigrator {
    pub fn new(http: reqwest::Client, store: Arc<dyn ObjectStore>, owned: OwnedStorage) -> Self {
        Self { http, store, owned }
    }

    /// Picks the image reference to store.
    ///
    /// `existing` is the reference currently stored on the record (re-read just
    /// before the call, `None` for new records). When it already points at owned
    /// storage it is kept and nothing is transferred. Otherwise `remote` is
    /// migrated; a failed migration falls back to the remote URL so the record
    /// can still be written.
    pub async fn resolve(
        &self,
        existing: Option<&str>,
        remote: Option<&str>,
        kind: AssetKind,
    ) -> Option<String> {
        if let Some(current) = existing.filter(|c| self.owned.is_owned(c)) {
            debug!(kind = kind.prefix(), "image already on owned storage");
            return Some(current.to_string());
        }
        let remote = remote.map(str::trim).filter(|s| !s.is_empty())?;
        match self.migrate(remote, kind).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(kind = kind.prefix(), "asset migration failed, keeping remote url: {e}");
                Some(remote.to_string())
            }
        }
    }

    /// Downloads `source_url` and stores it under a fresh key in the prefix for
    /// `kind`. URLs already on owned storage are returned unchanged.
    pub async fn migrate(&self, source_url: &str, kind: AssetKind) -> Result<String, AssetError> {
        if self.owned.is_owned(source_url) {
            return Ok(source_url.to_string());
        }
        let resp = self
            .http
            .get(source_url)
            .send()
            .await
            .map_err(|source| AssetError::Download {
                url: source_url.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AssetError::DownloadStatus {
                url: source_url.to_string(),
                status: status.as_u16(),
            });
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let bytes = resp.bytes().await.map_err(|source| AssetError::Download {
            url: source_url.to_string(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(AssetError::Empty {
                url: source_url.to_string(),
            });
        }

        let key = object_key(kind, &content_type);
        let saved = self
            .store
            .put(&key, &content_type, bytes)
            .await
            .map_err(|source| AssetError::Upload {
                key: key.clone(),
                source,
            })?;
        debug!(key = %saved.key, size = saved.size, "asset migrated");
        Ok(saved.url)
    }
}

fn object_key(kind: AssetKind, content_type: &str) -> String {
    let mut b = [0u8; 16];
    OsRng.fill_bytes(&mut b);
    let id = b.iter().map(|v| format!("{v:02x}")).collect::<String>();
    format!("{}/{id}.{}", kind.prefix(), extension_for(content_type))
}

fn extension_for(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg".to_string(),
        "image/png" => "png".to_string(),
        "image/webp" => "webp".to_string(),
        "image/gif" => "gif".to_string(),
        "image/heic" => "heic".to_string(),
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "jpg".to_string()),
    }
}
