/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::staleness::StalenessMode;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub log_json: bool,
    pub upstream: UpstreamConfig,
    pub datastore: DatastoreConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub access_key: String,
    pub retry_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct DatastoreConfig {
    pub base_url: String,
    pub auth: DatastoreAuth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatastoreAuth {
    Login { email: String, password: String },
    StaticToken(String),
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Public domain objects are served from, e.g. `media.example.com`.
    pub custom_domain: Option<String>,
    /// Provider domain used to recognise objects already on owned storage.
    pub provider_domain: Option<String>,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    S3 {
        endpoint: Option<String>,
        region: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        path_style: bool,
    },
    Local {
        dir: PathBuf,
        public_base_url: String,
    },
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_idle_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub staleness_mode: StalenessMode,
    pub default_interval_hours: f64,
    pub concurrency: usize,
    pub max_media_pages: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 8,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_mode: StalenessMode::Elapsed,
            default_interval_hours: 24.0,
            concurrency: 1,
            max_media_pages: 50,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let bind = match env.opt("TIKSYNC_BIND") {
            Some(raw) => raw.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
                name: "TIKSYNC_BIND",
                value: raw,
            })?,
            None => {
                let port = env.parse::<u16>("PORT", 3002)?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };
        let log_json = env
            .opt("TIKSYNC_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let upstream = UpstreamConfig {
            base_url: env.required("TIKTOK_PAPI_URL")?.trim_end_matches('/').to_string(),
            access_key: env.required("TIKTOK_PAPI_KEY")?,
            retry_attempts: env.parse::<u32>("TIKSYNC_HTTP_RETRY_ATTEMPTS", 1)?.clamp(1, 5),
        };

        let auth = match env.opt("DIRECTUS_STATIC_TOKEN") {
            Some(token) => DatastoreAuth::StaticToken(token),
            None => DatastoreAuth::Login {
                email: env.required("DIRECTUS_ADMIN_EMAIL")?,
                password: env.required("DIRECTUS_ADMIN_PASSWORD")?,
            },
        };
        let datastore = DatastoreConfig {
            base_url: env.required("DIRECTUS_URL")?.trim_end_matches('/').to_string(),
            auth,
        };

        let backend_name = env
            .opt("TIKSYNC_STORAGE_BACKEND")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(|| "s3".to_string());
        let backend = match backend_name.as_str() {
            "s3" | "b2" => StorageBackend::S3 {
                endpoint: env.opt("B2_ENDPOINT").map(|s| with_scheme(&s)),
                region: env.opt("B2_REGION").unwrap_or_else(|| "us-west-004".to_string()),
                bucket: env.required("B2_BUCKET_NAME")?,
                access_key: env.required("B2_APPLICATION_KEY_ID")?,
                secret_key: env.required("B2_APPLICATION_KEY")?,
                path_style: env.flag("B2_PATH_STYLE", true),
            },
            "local" => StorageBackend::Local {
                dir: PathBuf::from(env.opt("TIKSYNC_LOCAL_MEDIA_DIR").unwrap_or_else(|| "media".to_string())),
                public_base_url: env
                    .required("TIKSYNC_LOCAL_PUBLIC_URL")?
                    .trim_end_matches('/')
                    .to_string(),
            },
            _ => {
                return Err(ConfigError::Invalid {
                    name: "TIKSYNC_STORAGE_BACKEND",
                    value: backend_name,
                })
            }
        };
        let custom_domain = env.opt("B2_CUSTOM_DOMAIN").map(|d| strip_scheme(&d));
        let provider_domain = env.opt("B2_DOMAIN").map(|d| strip_scheme(&d)).or_else(|| match &backend {
            StorageBackend::S3 { endpoint: Some(ep), .. } => host_of(ep),
            // Without an endpoint the AWS SDK targets the regional host.
            StorageBackend::S3 { endpoint: None, region, .. } => Some(format!("s3.{region}.amazonaws.com")),
            StorageBackend::Local { public_base_url, .. } => host_of(public_base_url),
        });
        let storage = StorageConfig {
            backend,
            custom_domain,
            provider_domain,
        };

        let http = HttpConfig {
            timeout_secs: env.parse::<u64>("TIKSYNC_HTTP_TIMEOUT_SECS", 30)?.clamp(5, 300),
            connect_timeout_secs: env.parse::<u64>("TIKSYNC_HTTP_CONNECT_TIMEOUT_SECS", 10)?.clamp(1, 60),
            ..HttpConfig::default()
        };

        let staleness_mode = match env.opt("TIKSYNC_STALENESS_MODE") {
            Some(raw) => raw.parse::<StalenessMode>().map_err(|_| ConfigError::Invalid {
                name: "TIKSYNC_STALENESS_MODE",
                value: raw,
            })?,
            None => StalenessMode::Elapsed,
        };
        let default_interval_hours = env.parse::<f64>("TIKSYNC_DEFAULT_INTERVAL_HOURS", 24.0)?;
        if !default_interval_hours.is_finite() || default_interval_hours < 0.0 {
            return Err(ConfigError::Invalid {
                name: "TIKSYNC_DEFAULT_INTERVAL_HOURS",
                value: default_interval_hours.to_string(),
            });
        }
        let sync = SyncConfig {
            staleness_mode,
            default_interval_hours,
            concurrency: env.parse::<usize>("TIKSYNC_CONCURRENCY", 1)?.clamp(1, 32),
            max_media_pages: env.parse::<u32>("TIKSYNC_MAX_MEDIA_PAGES", 50)?.max(1),
        };

        Ok(Self {
            bind,
            log_json,
            upstream,
            datastore,
            storage,
            http,
            sync,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn opt(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.opt(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.opt(name) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { name, value: raw }),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        self.opt(name)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }
}

fn with_scheme(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

fn strip_scheme(domain: &str) -> String {
    domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}
