/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{timeout::TimeoutConfig, Credentials, Region},
    primitives::ByteStream,
    Client as S3Client, Config as S3Config,
};
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::config::{HttpConfig, StorageBackend, StorageConfig};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub size: u64,
    /// Public URL the object is served from.
    pub url: String,
}

/// Owned object storage. `put` returns the public URL of the stored object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<StoredObject>;
    async fn health_check(&self) -> Result<()>;
}

pub struct LocalObjectStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    pub fn new(dir: PathBuf, public_base: String) -> Self {
        Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<StoredObject> {
        let key = sanitize_key(key)?;
        let path = self.dir.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create media dir")?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("write media file {path:?}"))?;
        Ok(StoredObject {
            url: format!("{}/{}", self.public_base, key),
            key,
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
        })
    }

    async fn health_check(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .context("ensure media dir")?;
        Ok(())
    }
}

pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    public_base: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: String, public_base: String) -> Self {
        Self {
            client,
            bucket,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<StoredObject> {
        let key = sanitize_key(key)?;
        let size = bytes.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("s3 put {key}"))?;
        Ok(StoredObject {
            url: format!("{}/{}", self.public_base, key),
            key,
            content_type: content_type.to_string(),
            size,
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .context("s3 head_bucket")?;
        Ok(())
    }
}

pub fn build_object_store(cfg: &StorageConfig, http: &HttpConfig) -> Result<Box<dyn ObjectStore>> {
    match &cfg.backend {
        StorageBackend::Local {
            dir,
            public_base_url,
        } => {
            let base = match cfg.custom_domain.as_deref() {
                Some(domain) => format!("https://{domain}"),
                None => public_base_url.clone(),
            };
            Ok(Box::new(LocalObjectStore::new(dir.clone(), base)))
        }
        StorageBackend::S3 {
            endpoint,
            region,
            bucket,
            access_key,
            secret_key,
            path_style,
        } => {
            let credentials = Credentials::new(access_key, secret_key, None, None, "tiksync");
            let timeouts = TimeoutConfig::builder()
                .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
                .operation_timeout(Duration::from_secs(http.timeout_secs))
                .build();
            let mut builder = S3Config::builder()
                .region(Region::new(region.clone()))
                .credentials_provider(credentials)
                .force_path_style(*path_style)
                .timeout_config(timeouts);
            if let Some(endpoint) = endpoint.clone() {
                builder = builder.endpoint_url(endpoint);
            }
            let client = S3Client::from_conf(builder.build());
            let base = s3_public_base(
                cfg.custom_domain.as_deref(),
                endpoint.as_deref(),
                region,
                bucket,
                *path_style,
            );
            Ok(Box::new(S3ObjectStore::new(client, bucket.clone(), base)))
        }
    }
}

/// Public base for objects in `bucket`. A custom domain is served B2-style
/// (`https://<domain>/file/<bucket>`); otherwise the provider location is used.
pub fn s3_public_base(
    custom_domain: Option<&str>,
    endpoint: Option<&str>,
    region: &str,
    bucket: &str,
    path_style: bool,
) -> String {
    if let Some(domain) = custom_domain {
        return format!("https://{domain}/file/{bucket}");
    }
    match endpoint {
        Some(ep) if path_style => format!("{}/{bucket}", ep.trim_end_matches('/')),
        Some(ep) => {
            let ep = ep.trim_end_matches('/');
            match ep.split_once("://") {
                Some((scheme, host)) => format!("{scheme}://{bucket}.{host}"),
                None => format!("https://{bucket}.{ep}"),
            }
        }
        None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
    }
}

/// Normalises an object key and rejects keys that would escape the bucket prefix.
pub fn sanitize_key(key: &str) -> Result<String> {
    let trimmed = key.trim().trim_start_matches('/').replace('\\', "/");
    if trimmed.is_empty() {
        anyhow::bail!("empty object key");
    }
    let escapes = Path::new(&trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        anyhow::bail!("invalid object key: {key}");
    }
    Ok(trimmed)
}
