/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lenient;

pub const COLLECTION_ACCOUNTS: &str = "tiktok_users";
pub const COLLECTION_MEDIA: &str = "tiktok_videos";
pub const COLLECTION_STATS: &str = "tiktok_user_stats";

/// Datastore primary key. Integer and string keys are kept as-is so they
/// round-trip unchanged into foreign-key fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(v) => write!(f, "{v}"),
            RecordId::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        RecordId::Int(v)
    }
}

impl From<&str> for RecordId {
    fn from(v: &str) -> Self {
        RecordId::Str(v.to_string())
    }
}

/// Row of the tracked-accounts collection. Rows are created by hand; the job
/// only ever updates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: RecordId,
    /// Empty when the row has no usable username.
    #[serde(default, deserialize_with = "lenient::id")]
    pub unique_id: String,
    #[serde(default)]
    pub tiktok_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub interval: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub last_media_updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub media_interval: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub last_video_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AccountRecord {
    pub fn new(id: impl Into<RecordId>, unique_id: &str) -> Self {
        Self {
            id: id.into(),
            unique_id: unique_id.to_string(),
            tiktok_id: None,
            nickname: None,
            avatar: None,
            last_updated: None,
            interval: None,
            last_media_updated: None,
            media_interval: None,
            last_video_activity: None,
            deleted: None,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}

/// Full-replace profile payload written on every profile sync.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileWrite {
    pub tiktok_id: String,
    pub nickname: Option<String>,
    pub signature: Option<String>,
    pub avatar: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub verified: bool,
    pub sec_uid: Option<String>,
    pub bio_link: Option<String>,
    pub private: bool,
    pub followers: u64,
    pub following: u64,
    pub hearts: u64,
    pub videos: u64,
    pub friends: u64,
}

/// Append-only counters snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshotWrite {
    pub user: RecordId,
    pub unique_id: String,
    pub tiktok_id: String,
    pub followers: u64,
    pub following: u64,
    pub hearts: u64,
    pub videos: u64,
    pub friends: u64,
    pub recorded_at: DateTime<Utc>,
}

/// The parts of a stored media row the writer needs before deciding what to do.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaRecord {
    pub id: RecordId,
    #[serde(default, deserialize_with = "lenient::id")]
    pub tiktok_id: String,
    #[serde(default)]
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaWrite {
    pub tiktok_id: String,
    pub author: RecordId,
    pub created: Option<DateTime<Utc>>,
    pub desc: String,
    pub collected: u64,
    pub comments: u64,
    pub hearts: u64,
    pub plays: u64,
    pub shares: u64,
    pub cover: Option<String>,
    pub duration: Option<u64>,
    pub dynamic_cover: Option<String>,
}
