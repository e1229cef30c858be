/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::lenient;

/// `GET /user/by/username` body. Both maps are keyed by the requested username.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub users: HashMap<String, UpstreamUser>,
    #[serde(default)]
    pub stats: HashMap<String, UpstreamStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamUser {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub nickname: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub signature: Option<String>,
    #[serde(default)]
    pub avatar_medium: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub create_time: i64,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub verified: bool,
    #[serde(default)]
    pub sec_uid: Option<String>,
    #[serde(default)]
    pub bio_link: Option<BioLink>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub private_account: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BioLink {
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStats {
    #[serde(default, deserialize_with = "lenient::count")]
    pub follower_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub following_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub heart_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub video_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub friend_count: u64,
}

/// Profile and counters of a single account, extracted from a [`ProfileResponse`].
#[derive(Debug, Clone)]
pub struct ProfileSnapshot {
    pub username: String,
    pub user: UpstreamUser,
    pub stats: UpstreamStats,
}

impl ProfileResponse {
    /// Pulls out the entry for `username`. Tries the exact key, then a
    /// case-insensitive match, then the only entry when the map has just one.
    pub fn into_snapshot(mut self, username: &str) -> Option<ProfileSnapshot> {
        let user_key = pick_key(&self.users, username)?;
        let stats_key = pick_key(&self.stats, username)?;
        let user = self.users.remove(&user_key)?;
        let stats = self.stats.remove(&stats_key)?;
        Some(ProfileSnapshot {
            username: username.to_string(),
            user,
            stats,
        })
    }
}

fn pick_key<T>(map: &HashMap<String, T>, username: &str) -> Option<String> {
    if map.contains_key(username) {
        return Some(username.to_string());
    }
    if let Some(k) = map.keys().find(|k| k.eq_ignore_ascii_case(username)) {
        return Some(k.clone());
    }
    if map.len() == 1 {
        return map.keys().next().cloned();
    }
    None
}

impl ProfileSnapshot {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        unix_seconds(self.user.create_time)
    }

    pub fn bio_link(&self) -> Option<String> {
        self.user
            .bio_link
            .as_ref()
            .and_then(|b| b.link.clone())
            .filter(|s| !s.trim().is_empty())
    }
}

/// `GET /user/videos/by/username` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaPageResponse {
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_cursor")]
    pub next_page_id: Option<String>,
}

/// One page of media items plus the cursor for the following page.
#[derive(Debug, Clone, Default)]
pub struct MediaPage {
    pub items: Vec<UpstreamMediaItem>,
    pub next_cursor: Option<String>,
    /// Entries of the list that could not be decoded as an item.
    pub skipped: u32,
}

impl MediaPageResponse {
    /// Returns `None` when the item list is absent or not an array. Entries
    /// are decoded one at a time; a bad entry is counted, not fatal.
    pub fn into_page(self) -> Option<MediaPage> {
        let mut response = self.response?;
        let key = ["itemList", "items"]
            .into_iter()
            .find(|k| response.get(*k).is_some_and(|v| !v.is_null()))?;
        let Value::Array(list) = response.get_mut(key)?.take() else {
            return None;
        };
        let mut page = MediaPage {
            next_cursor: self.next_page_id,
            ..MediaPage::default()
        };
        for entry in list {
            match serde_json::from_value::<UpstreamMediaItem>(entry) {
                Ok(item) => page.items.push(item),
                Err(_) => page.skipped += 1,
            }
        }
        Some(page)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamMediaItem {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::int")]
    pub create_time: i64,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub desc: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_pinned: bool,
    #[serde(default, rename = "statsV2")]
    pub stats_v2: Option<UpstreamMediaStats>,
    #[serde(default)]
    pub stats: Option<UpstreamMediaStats>,
    #[serde(default)]
    pub video: Option<UpstreamVideo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamMediaStats {
    #[serde(default, deserialize_with = "lenient::count")]
    pub collect_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub comment_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub digg_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub play_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub share_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamVideo {
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub dynamic_cover: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub duration: Option<u64>,
}

impl UpstreamMediaItem {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        unix_seconds(self.create_time)
    }

    /// `statsV2` is preferred; older payloads only carry `stats`.
    pub fn counters(&self) -> UpstreamMediaStats {
        self.stats_v2
            .clone()
            .or_else(|| self.stats.clone())
            .unwrap_or_default()
    }

    pub fn cover(&self) -> Option<&str> {
        self.video
            .as_ref()
            .and_then(|v| v.cover.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn dynamic_cover(&self) -> Option<&str> {
        self.video
            .as_ref()
            .and_then(|v| v.dynamic_cover.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn duration(&self) -> Option<u64> {
        self.video.as_ref().and_then(|v| v.duration)
    }
}

fn unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}
