/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{http::header, response::IntoResponse, routing::get, Router};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering as Cmp;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tiksync_core::assets::{AssetMigrator, OwnedStorage};
use tiksync_core::config::SyncConfig;
use tiksync_core::datastore::{Datastore, Records};
use tiksync_core::media_store::{ObjectStore, StoredObject};
use tiksync_core::sync::SyncDriver;
use tiksync_core::upstream::{FetchError, Upstream, MEDIA_ENDPOINT, PROFILE_ENDPOINT};
use tiksync_core::writer::UpsertWriter;
use tiksync_protocol::lenient::parse_timestamp;
use tiksync_protocol::{Filter, MediaPage, MediaPageResponse, ProfileResponse, ProfileSnapshot, RecordId};

pub const OWNED_DOMAIN: &str = "media.example.com";

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
}

/// In-memory datastore with Directus-like merge-on-update semantics.
#[derive(Default)]
pub struct MemoryDatastore {
    collections: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    next_id: AtomicI64,
    pub logins: AtomicU32,
    pub creates: Mutex<Vec<(String, Value)>>,
    pub updates: Mutex<Vec<(String, String, Value)>>,
    pub list_filters: Mutex<Vec<(String, Option<Filter>)>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Default::default()
        }
    }

    pub fn insert(&self, collection: &str, row: Value) {
        let row = row.as_object().cloned().expect("row must be an object");
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub fn row(&self, collection: &str, id: i64) -> Option<Value> {
        self.rows(collection)
            .into_iter()
            .find(|r| r.get("id") == Some(&Value::from(id)))
    }

    pub fn creates_in(&self, collection: &str) -> usize {
        self.creates
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .count()
    }

    pub fn updates_in(&self, collection: &str) -> Vec<Value> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| c == collection)
            .map(|(_, _, v)| v.clone())
            .collect()
    }
}

/// Evaluates `filter` the way Directus does for the operators the job uses.
pub fn filter_matches(filter: &Filter, row: &Map<String, Value>) -> bool {
    match filter {
        Filter::Eq(field, v) => row.get(field).and_then(|got| compare(got, v)) == Some(Cmp::Equal),
        Filter::IsNull(field) => row.get(field).map(Value::is_null).unwrap_or(true),
        Filter::Lt(field, v) => row.get(field).and_then(|got| compare(got, v)) == Some(Cmp::Less),
        Filter::Or(parts) => parts.iter().any(|f| filter_matches(f, row)),
        Filter::And(parts) => parts.iter().all(|f| filter_matches(f, row)),
    }
}

/// Timestamps compare as instants, numeric strings as numbers.
fn compare(a: &Value, b: &Value) -> Option<Cmp> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.trim().parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.trim().parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn login(&self) -> Result<()> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_items(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>> {
        self.list_filters
            .lock()
            .unwrap()
            .push((collection.to_string(), filter.cloned()));
        let rows = self.collections.lock().unwrap();
        let matching = rows
            .get(collection)
            .map(|rows| {
                rows.iter()
                    .filter(|r| filter.map(|f| filter_matches(f, r)).unwrap_or(true))
                    .cloned()
                    .map(Value::Object)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(match limit {
            Some(n) => matching.into_iter().take(n as usize).collect(),
            None => matching,
        })
    }

    async fn create_item(&self, collection: &str, item: &Value) -> Result<Value> {
        let mut row = item
            .as_object()
            .cloned()
            .ok_or_else(|| anyhow!("create {collection}: not an object"))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        row.insert("id".to_string(), Value::from(id));
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(row.clone());
        self.creates
            .lock()
            .unwrap()
            .push((collection.to_string(), item.clone()));
        Ok(Value::Object(row))
    }

    async fn update_item(&self, collection: &str, id: &RecordId, patch: &Value) -> Result<()> {
        let id_value = serde_json::to_value(id)?;
        let mut collections = self.collections.lock().unwrap();
        let row = collections
            .get_mut(collection)
            .and_then(|rows| rows.iter_mut().find(|r| r.get("id") == Some(&id_value)))
            .ok_or_else(|| anyhow!("update {collection}/{id}: 404"))?;
        if let Some(fields) = patch.as_object() {
            for (k, v) in fields {
                row.insert(k.clone(), v.clone());
            }
        }
        self.updates
            .lock()
            .unwrap()
            .push((collection.to_string(), id.to_string(), patch.clone()));
        Ok(())
    }
}

#[derive(Clone)]
pub enum Canned {
    Body(Value),
    Status(u16),
}

/// Upstream fake answering from canned JSON bodies, decoded the same way as
/// the HTTP client decodes them.
#[derive(Default)]
pub struct FakeUpstream {
    profiles: Mutex<HashMap<String, Canned>>,
    pages: Mutex<HashMap<(String, Option<String>), Canned>>,
    pub profile_calls: Mutex<Vec<String>>,
    pub page_calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeUpstream {
    pub fn profile(&self, username: &str, canned: Canned) {
        self.profiles
            .lock()
            .unwrap()
            .insert(username.to_string(), canned);
    }

    pub fn page(&self, username: &str, cursor: Option<&str>, canned: Canned) {
        self.pages
            .lock()
            .unwrap()
            .insert((username.to_string(), cursor.map(str::to_string)), canned);
    }
}

fn status_error(endpoint: &'static str, username: &str, status: u16) -> FetchError {
    if status == 404 {
        FetchError::NotFound {
            endpoint,
            username: username.to_string(),
        }
    } else {
        FetchError::Status {
            endpoint,
            username: username.to_string(),
            status,
            body: "canned failure".to_string(),
        }
    }
}

fn malformed(endpoint: &'static str, username: &str) -> FetchError {
    FetchError::Malformed {
        endpoint,
        username: username.to_string(),
        detail: "canned".to_string(),
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch_profile(&self, username: &str) -> Result<ProfileSnapshot, FetchError> {
        self.profile_calls.lock().unwrap().push(username.to_string());
        let canned = self.profiles.lock().unwrap().get(username).cloned();
        match canned {
            Some(Canned::Body(body)) => serde_json::from_value::<ProfileResponse>(body)
                .ok()
                .and_then(|r| r.into_snapshot(username))
                .ok_or_else(|| malformed(PROFILE_ENDPOINT, username)),
            Some(Canned::Status(status)) => Err(status_error(PROFILE_ENDPOINT, username, status)),
            None => Err(status_error(PROFILE_ENDPOINT, username, 500)),
        }
    }

    async fn fetch_media_page(
        &self,
        username: &str,
        cursor: Option<&str>,
    ) -> Result<MediaPage, FetchError> {
        self.page_calls
            .lock()
            .unwrap()
            .push((username.to_string(), cursor.map(str::to_string)));
        let canned = self
            .pages
            .lock()
            .unwrap()
            .get(&(username.to_string(), cursor.map(str::to_string)))
            .cloned();
        match canned {
            Some(Canned::Body(body)) => serde_json::from_value::<MediaPageResponse>(body)
                .ok()
                .and_then(MediaPageResponse::into_page)
                .ok_or_else(|| malformed(MEDIA_ENDPOINT, username)),
            Some(Canned::Status(status)) => Err(status_error(MEDIA_ENDPOINT, username, status)),
            None => Err(status_error(MEDIA_ENDPOINT, username, 500)),
        }
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    pub puts: Mutex<Vec<(String, String, usize)>>,
}

impl MemoryObjectStore {
    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<StoredObject> {
        self.puts
            .lock()
            .unwrap()
            .push((key.to_string(), content_type.to_string(), bytes.len()));
        Ok(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            url: format!("https://{OWNED_DOMAIN}/file/bkt/{key}"),
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Serves a tiny JPEG body for any path, standing in for the upstream CDN.
pub async fn image_origin() -> String {
    let app = Router::new().route(
        "/*path",
        get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xffu8, 0xd8, 0xff]).into_response() }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub struct Harness {
    pub datastore: Arc<MemoryDatastore>,
    pub upstream: Arc<FakeUpstream>,
    pub objects: Arc<MemoryObjectStore>,
    pub origin: String,
    pub driver: SyncDriver,
    pub writer: UpsertWriter,
}

pub async fn harness(cfg: SyncConfig) -> Harness {
    let datastore = Arc::new(MemoryDatastore::new());
    let upstream = Arc::new(FakeUpstream::default());
    let objects = Arc::new(MemoryObjectStore::default());
    let origin = image_origin().await;

    let http = reqwest::Client::new();
    let assets = Arc::new(AssetMigrator::new(
        http,
        objects.clone(),
        OwnedStorage::new(Some(OWNED_DOMAIN), Some("backblazeb2.com")),
    ));
    let records = Records::new(datastore.clone());
    let driver = SyncDriver::new(
        records.clone(),
        upstream.clone(),
        UpsertWriter::new(records.clone(), assets.clone()),
        cfg,
    )
    .with_clock(fixed_now);
    let writer = UpsertWriter::new(records, assets);

    Harness {
        datastore,
        upstream,
        objects,
        origin,
        driver,
        writer,
    }
}

pub fn profile_body(username: &str, id: &str, followers: u64, avatar: &str) -> Value {
    serde_json::json!({
        "users": { username: {
            "id": id,
            "uniqueId": username,
            "nickname": format!("{username} nick"),
            "signature": "bio",
            "avatarMedium": avatar,
            "createTime": 1500000000,
            "verified": false,
            "secUid": "MS4wLjABAAAA",
            "privateAccount": false
        }},
        "stats": { username: {
            "followerCount": followers,
            "followingCount": 10,
            "heartCount": 1000,
            "videoCount": 2,
            "friendCount": 1
        }}
    })
}

pub fn media_item(id: &str, create_time: i64, plays: u64, cover: &str) -> Value {
    serde_json::json!({
        "id": id,
        "createTime": create_time,
        "desc": format!("video {id}"),
        "statsV2": {
            "collectCount": "1",
            "commentCount": "2",
            "diggCount": "3",
            "playCount": plays.to_string(),
            "shareCount": "5"
        },
        "video": { "cover": cover, "dynamicCover": format!("{cover}.webp"), "duration": 15 }
    })
}

pub fn media_body(items: Vec<Value>, next: Option<&str>) -> Value {
    serde_json::json!({
        "response": { "itemList": items },
        "next_page_id": next
    })
}
