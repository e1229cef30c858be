/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Read-only client for the upstream profile/media API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tiksync_protocol::{MediaPage, MediaPageResponse, ProfileResponse, ProfileSnapshot};
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::http_retry::{send_with_retry, RetryPolicy};

pub const PROFILE_ENDPOINT: &str = "/user/by/username";
pub const MEDIA_ENDPOINT: &str = "/user/videos/by/username";
const ACCESS_KEY_HEADER: &str = "x-access-key";
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{endpoint}: account {username} no longer exists upstream")]
    NotFound {
        endpoint: &'static str,
        username: String,
    },
    #[error("{endpoint}: upstream returned {status} for {username}: {body}")]
    Status {
        endpoint: &'static str,
        username: String,
        status: u16,
        body: String,
    },
    #[error("{endpoint}: request for {username} failed: {source}")]
    Transport {
        endpoint: &'static str,
        username: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint}: malformed payload for {username}: {detail}")]
    Malformed {
        endpoint: &'static str,
        username: String,
        detail: String,
    },
}

/// Closed set of failure kinds the sync driver switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    Transient,
    Malformed,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::NotFound { .. } => FetchErrorKind::NotFound,
            FetchError::Status { .. } | FetchError::Transport { .. } => FetchErrorKind::Transient,
            FetchError::Malformed { .. } => FetchErrorKind::Malformed,
        }
    }

    /// HTTP status of the failed call, when there was an answer at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound { .. } => Some(404),
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            FetchError::Malformed { .. } => None,
        }
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch_profile(&self, username: &str) -> Result<ProfileSnapshot, FetchError>;

    async fn fetch_media_page(
        &self,
        username: &str,
        cursor: Option<&str>,
    ) -> Result<MediaPage, FetchError>;
}

pub struct HttpUpstream {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
    retry: RetryPolicy,
}

impl HttpUpstream {
    pub fn new(http: reqwest::Client, cfg: &UpstreamConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            access_key: cfg.access_key.clone(),
            retry: RetryPolicy::new(cfg.retry_attempts),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        username: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = send_with_retry(
            || {
                self.http
                    .get(&url)
                    .header(ACCESS_KEY_HEADER, &self.access_key)
                    .query(query)
            },
            &self.retry,
            endpoint,
        )
        .await
        .map_err(|source| FetchError::Transport {
            endpoint,
            username: username.to_string(),
            source,
        })?;

        let status = resp.status();
        debug!(endpoint, %username, %status, "upstream response");
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                endpoint,
                username: username.to_string(),
            });
        }
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            truncate(&mut body, MAX_ERROR_BODY);
            return Err(FetchError::Status {
                endpoint,
                username: username.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await.map_err(|source| FetchError::Transport {
            endpoint,
            username: username.to_string(),
            source,
        })?;
        serde_json::from_slice::<T>(&bytes).map_err(|e| FetchError::Malformed {
            endpoint,
            username: username.to_string(),
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch_profile(&self, username: &str) -> Result<ProfileSnapshot, FetchError> {
        let body: ProfileResponse = self
            .get_json(PROFILE_ENDPOINT, username, &[("username", username)])
            .await?;
        body.into_snapshot(username).ok_or_else(|| FetchError::Malformed {
            endpoint: PROFILE_ENDPOINT,
            username: username.to_string(),
            detail: "users/stats entry missing".to_string(),
        })
    }

    async fn fetch_media_page(
        &self,
        username: &str,
        cursor: Option<&str>,
    ) -> Result<MediaPage, FetchError> {
        let mut query = vec![("username", username)];
        if let Some(c) = cursor {
            query.push(("page_id", c));
        }
        let body: MediaPageResponse = self.get_json(MEDIA_ENDPOINT, username, &query).await?;
        body.into_page().ok_or_else(|| FetchError::Malformed {
            endpoint: MEDIA_ENDPOINT,
            username: username.to_string(),
            detail: "item list missing or not an array".to_string(),
        })
    }
}

fn truncate(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
