/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Headless-CMS datastore access: a generic item API plus the typed record
//! helpers the writer and driver use.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tiksync_protocol::{
    AccountRecord, Filter, MediaRecord, MediaWrite, ProfileWrite, RecordId, StatsSnapshotWrite,
    COLLECTION_ACCOUNTS, COLLECTION_MEDIA, COLLECTION_STATS,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{DatastoreAuth, DatastoreConfig};

/// Generic list/create/update operations against named collections.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn login(&self) -> Result<()>;

    async fn list_items(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>>;

    async fn create_item(&self, collection: &str, item: &Value) -> Result<Value>;

    async fn update_item(&self, collection: &str, id: &RecordId, patch: &Value) -> Result<()>;
}

pub struct DirectusDatastore {
    http: reqwest::Client,
    base_url: String,
    auth: DatastoreAuth,
    token: RwLock<Option<String>>,
}

impl DirectusDatastore {
    pub fn new(http: reqwest::Client, cfg: &DatastoreConfig) -> Self {
        let token = match &cfg.auth {
            DatastoreAuth::StaticToken(t) => Some(t.clone()),
            DatastoreAuth::Login { .. } => None,
        };
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth: cfg.auth.clone(),
            token: RwLock::new(token),
        }
    }

    fn req(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.http.request(method, url)
    }

    async fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_deref() {
            Some(tok) => builder.bearer_auth(tok),
            None => builder,
        }
    }

    /// Sends the request; on 401 with login credentials, logs in again and
    /// retries once.
    async fn send<F>(&self, what: &str, build: F) -> Result<Value>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let resp = self
            .authed(build())
            .await
            .send()
            .await
            .with_context(|| format!("datastore {what}"))?;
        let resp = if resp.status() == StatusCode::UNAUTHORIZED
            && matches!(self.auth, DatastoreAuth::Login { .. })
        {
            debug!(%what, "datastore token rejected, logging in again");
            self.login().await?;
            self.authed(build())
                .await
                .send()
                .await
                .with_context(|| format!("datastore {what}"))?
        } else {
            resp
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("datastore {what} failed: {status} {body}"));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let body = resp
            .json::<Value>()
            .await
            .with_context(|| format!("datastore {what}: decode body"))?;
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Datastore for DirectusDatastore {
    async fn login(&self) -> Result<()> {
        let (email, password) = match &self.auth {
            DatastoreAuth::StaticToken(_) => return Ok(()),
            DatastoreAuth::Login { email, password } => (email, password),
        };
        let resp = self
            .req(Method::POST, "/auth/login")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .context("datastore login")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("datastore login failed: {status} {body}"));
        }
        let body = resp.json::<Value>().await.context("datastore login: decode body")?;
        let token = body
            .pointer("/data/access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("datastore login: access_token missing"))?
            .to_string();
        *self.token.write().await = Some(token);
        info!("datastore login ok");
        Ok(())
    }

    async fn list_items(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>> {
        let mut query = vec![(
            "limit".to_string(),
            limit.map(|l| l.to_string()).unwrap_or_else(|| "-1".to_string()),
        )];
        if let Some(f) = filter {
            query.push(("filter".to_string(), f.to_json().to_string()));
        }
        let path = format!("/items/{collection}");
        let data = self
            .send(&format!("list {collection}"), || {
                self.req(Method::GET, &path).query(&query)
            })
            .await?;
        match data {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(anyhow!("datastore list {collection}: expected array, got {other}")),
        }
    }

    async fn create_item(&self, collection: &str, item: &Value) -> Result<Value> {
        let path = format!("/items/{collection}");
        self.send(&format!("create {collection}"), || {
            self.req(Method::POST, &path).json(item)
        })
        .await
    }

    async fn update_item(&self, collection: &str, id: &RecordId, patch: &Value) -> Result<()> {
        let path = format!("/items/{collection}/{id}");
        self.send(&format!("update {collection}/{id}"), || {
            self.req(Method::PATCH, &path).json(patch)
        })
        .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Roster {
    pub accounts: Vec<AccountRecord>,
    pub unreadable: Vec<UnreadableRow>,
}

#[derive(Debug)]
pub struct UnreadableRow {
    /// Raw `id` of the row, `null` when absent.
    pub id: Value,
    pub error: anyhow::Error,
}

/// Typed access to the three collections the job touches.
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn Datastore>,
}

impl Records {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    pub async fn login(&self) -> Result<()> {
        self.store.login().await
    }

    /// Lists the roster. Rows are decoded one by one; a row that cannot be
    /// decoded lands in [`Roster::unreadable`] instead of failing the listing.
    pub async fn list_accounts(&self, filter: Option<&Filter>) -> Result<Roster> {
        let rows = self.store.list_items(COLLECTION_ACCOUNTS, filter, None).await?;
        let mut roster = Roster::default();
        for row in rows {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            match decode::<AccountRecord>(row, COLLECTION_ACCOUNTS) {
                Ok(account) => roster.accounts.push(account),
                Err(error) => roster.unreadable.push(UnreadableRow { id, error }),
            }
        }
        Ok(roster)
    }

    /// Re-reads one account; used right before decisions that depend on its
    /// current stored state.
    pub async fn get_account(&self, id: &RecordId) -> Result<Option<AccountRecord>> {
        let filter = Filter::eq("id", serde_json::to_value(id)?);
        let mut rows = self
            .store
            .list_items(COLLECTION_ACCOUNTS, Some(&filter), Some(1))
            .await?;
        match rows.pop() {
            Some(row) => Ok(Some(decode(row, COLLECTION_ACCOUNTS)?)),
            None => Ok(None),
        }
    }

    pub async fn update_account(&self, id: &RecordId, patch: &Value) -> Result<()> {
        self.store.update_item(COLLECTION_ACCOUNTS, id, patch).await
    }

    pub async fn write_profile(&self, id: &RecordId, profile: &ProfileWrite) -> Result<()> {
        self.update_account(id, &encode(profile)?).await
    }

    pub async fn append_stats_snapshot(&self, snapshot: &StatsSnapshotWrite) -> Result<()> {
        self.store
            .create_item(COLLECTION_STATS, &encode(snapshot)?)
            .await
            .map(|_| ())
    }

    pub async fn find_media(&self, tiktok_id: &str) -> Result<Option<MediaRecord>> {
        let filter = Filter::eq("tiktok_id", tiktok_id);
        let mut rows = self
            .store
            .list_items(COLLECTION_MEDIA, Some(&filter), Some(1))
            .await?;
        match rows.pop() {
            Some(row) => Ok(Some(decode(row, COLLECTION_MEDIA)?)),
            None => Ok(None),
        }
    }

    pub async fn create_media(&self, media: &MediaWrite) -> Result<Option<RecordId>> {
        let created = self.store.create_item(COLLECTION_MEDIA, &encode(media)?).await?;
        Ok(created
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RecordId>(id).ok()))
    }

    pub async fn update_media(&self, id: &RecordId, media: &MediaWrite) -> Result<()> {
        self.store.update_item(COLLECTION_MEDIA, id, &encode(media)?).await
    }
}

fn decode<T: DeserializeOwned>(row: Value, collection: &str) -> Result<T> {
    serde_json::from_value(row).with_context(|| format!("decode {collection} row"))
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("encode datastore payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode as AxStatus},
        response::IntoResponse,
        routing::{get, patch, post},
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Cms {
        logins: Arc<AtomicU32>,
        last_query: Arc<Mutex<HashMap<String, String>>>,
        patches: Arc<Mutex<Vec<(String, Value)>>>,
    }

    fn authorized(cms: &Cms, headers: &HeaderMap) -> bool {
        let want = format!("Bearer tok-{}", cms.logins.load(Ordering::SeqCst));
        headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(want.as_str())
    }

    async fn login(State(cms): State<Cms>, Json(body): Json<Value>) -> impl IntoResponse {
        if body["password"] != "pw" {
            return AxStatus::UNAUTHORIZED.into_response();
        }
        let n = cms.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Json(json!({ "data": { "access_token": format!("tok-{n}") } })).into_response()
    }

    async fn list(
        State(cms): State<Cms>,
        headers: HeaderMap,
        Path(collection): Path<String>,
        Query(q): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        if !authorized(&cms, &headers) {
            return AxStatus::UNAUTHORIZED.into_response();
        }
        *cms.last_query.lock().unwrap() = q;
        match collection.as_str() {
            "tiktok_users" => Json(json!({ "data": [
                { "id": 1, "unique_id": "alpha", "interval": 24 },
                { "id": 2, "unique_id": "beta", "last_updated": "2026-10-15T08:00:00.000Z" }
            ]}))
            .into_response(),
            _ => Json(json!({ "data": [] })).into_response(),
        }
    }

    async fn create(Path(collection): Path<String>, Json(body): Json<Value>) -> impl IntoResponse {
        let mut data = body;
        data["id"] = json!(if collection == "tiktok_videos" { 77 } else { 1 });
        Json(json!({ "data": data }))
    }

    async fn update(
        State(cms): State<Cms>,
        Path((collection, id)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        cms.patches.lock().unwrap().push((format!("{collection}/{id}"), body.clone()));
        Json(json!({ "data": body }))
    }

    async fn serve(cms: Cms) -> String {
        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/items/:collection", get(list).post(create))
            .route("/items/:collection/:id", patch(update))
            .with_state(cms);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn directus(base_url: String, password: &str) -> DirectusDatastore {
        DirectusDatastore::new(
            reqwest::Client::new(),
            &DatastoreConfig {
                base_url,
                auth: DatastoreAuth::Login {
                    email: "admin@example.com".to_string(),
                    password: password.to_string(),
                },
            },
        )
    }

    #[tokio::test]
    async fn lists_accounts_with_filter() {
        let cms = Cms::default();
        let base = serve(cms.clone()).await;
        let store = Arc::new(directus(base, "pw"));
        store.login().await.unwrap();
        let records = Records::new(store);

        let due = Filter::Or(vec![
            Filter::is_null("last_updated"),
            Filter::lt("last_updated", "2026-10-16T00:00:00Z"),
        ]);
        let roster = records.list_accounts(Some(&due)).await.unwrap();
        assert!(roster.unreadable.is_empty());
        let accounts = roster.accounts;
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].unique_id, "alpha");
        assert_eq!(accounts[0].interval, Some(24.0));
        assert!(accounts[1].last_updated.is_some());

        let q = cms.last_query.lock().unwrap().clone();
        assert_eq!(q.get("limit").map(String::as_str), Some("-1"));
        let sent: Value = serde_json::from_str(q.get("filter").unwrap()).unwrap();
        assert_eq!(sent, due.to_json());
    }

    #[tokio::test]
    async fn expired_token_triggers_one_relogin() {
        let cms = Cms::default();
        let base = serve(cms.clone()).await;
        let store = directus(base, "pw");
        store.login().await.unwrap();
        // Another login elsewhere rotates the valid token.
        cms.logins.fetch_add(1, Ordering::SeqCst);
        let rows = store.list_items("tiktok_users", None, None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(cms.logins.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn bad_credentials_fail_login() {
        let base = serve(Cms::default()).await;
        let store = directus(base, "wrong");
        let err = store.login().await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn create_and_update_media() {
        let cms = Cms::default();
        let base = serve(cms.clone()).await;
        let store = Arc::new(directus(base, "pw"));
        store.login().await.unwrap();
        let records = Records::new(store);

        let media = MediaWrite {
            tiktok_id: "v1".to_string(),
            author: RecordId::Int(1),
            created: None,
            desc: "hello".to_string(),
            collected: 1,
            comments: 2,
            hearts: 3,
            plays: 4,
            shares: 5,
            cover: None,
            duration: Some(15),
            dynamic_cover: None,
        };
        let id = records.create_media(&media).await.unwrap();
        assert_eq!(id, Some(RecordId::Int(77)));
        assert!(records.find_media("v1").await.unwrap().is_none());

        records.update_media(&RecordId::Int(77), &media).await.unwrap();
        let patches = cms.patches.lock().unwrap();
        assert_eq!(patches[0].0, "tiktok_videos/77");
        assert_eq!(patches[0].1["plays"], 4);
    }
}
