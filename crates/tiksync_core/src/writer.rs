/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Maps upstream snapshots onto datastore rows and writes them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tiksync_protocol::{
    MediaWrite, ProfileSnapshot, ProfileWrite, RecordId, StatsSnapshotWrite, UpstreamMediaItem,
};
use tracing::{debug, info, warn};

use crate::assets::{AssetKind, AssetMigrator};
use crate::datastore::Records;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// Item carried no usable external id.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
}

pub struct UpsertWriter {
    records: Records,
    assets: Arc<AssetMigrator>,
}

impl UpsertWriter {
    pub fn new(records: Records, assets: Arc<AssetMigrator>) -> Self {
        Self { records, assets }
    }

    /// Replaces every profile field and counter of the account, then appends a
    /// stats snapshot.
    pub async fn upsert_account_profile(
        &self,
        snapshot: &ProfileSnapshot,
        account_id: &RecordId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let stored_avatar = self
            .records
            .get_account(account_id)
            .await?
            .and_then(|a| a.avatar);
        let avatar = self
            .assets
            .resolve(
                stored_avatar.as_deref(),
                snapshot.user.avatar_medium.as_deref(),
                AssetKind::Avatar,
            )
            .await;

        let profile = profile_write(snapshot, avatar);
        self.records.write_profile(account_id, &profile).await?;
        self.records
            .append_stats_snapshot(&stats_snapshot(snapshot, account_id, now))
            .await?;
        debug!(%account_id, username = %snapshot.username, followers = profile.followers, "profile written");
        Ok(())
    }

    /// Creates or updates the row for `item`, keyed by its external id.
    pub async fn upsert_media_item(
        &self,
        item: &UpstreamMediaItem,
        owner: &RecordId,
    ) -> Result<UpsertOutcome> {
        if item.id.is_empty() {
            warn!(%owner, "media item without id skipped");
            return Ok(UpsertOutcome::Skipped);
        }
        let existing = self.records.find_media(&item.id).await?;
        let cover = self
            .assets
            .resolve(
                existing.as_ref().and_then(|m| m.cover.as_deref()),
                item.cover(),
                AssetKind::Cover,
            )
            .await;
        let media = media_write(item, owner, cover);

        match existing {
            Some(row) => {
                self.records.update_media(&row.id, &media).await?;
                debug!(id = %row.id, tiktok_id = %media.tiktok_id, desc = %preview(&media.desc), "media updated");
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let id = self.records.create_media(&media).await?;
                debug!(id = ?id, tiktok_id = %media.tiktok_id, desc = %preview(&media.desc), "media created");
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Upserts every item of a page, then moves the owner's last-activity
    /// stamp forward if the page shows newer activity.
    pub async fn save_media_page(
        &self,
        items: &[UpstreamMediaItem],
        owner: &RecordId,
    ) -> Result<PageStats> {
        let mut stats = PageStats::default();
        for item in items {
            match self.upsert_media_item(item, owner).await? {
                UpsertOutcome::Created => stats.created += 1,
                UpsertOutcome::Updated => stats.updated += 1,
                UpsertOutcome::Skipped => stats.skipped += 1,
            }
        }
        self.record_last_activity(items, owner).await?;
        Ok(stats)
    }

    /// Never moves the stored stamp backwards.
    pub async fn record_last_activity(
        &self,
        items: &[UpstreamMediaItem],
        owner: &RecordId,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(candidate) = latest_activity(items) else {
            return Ok(None);
        };
        let stored = self
            .records
            .get_account(owner)
            .await?
            .and_then(|a| a.last_video_activity);
        if stored.is_some_and(|s| candidate <= s) {
            return Ok(None);
        }
        self.records
            .update_account(owner, &json!({ "last_video_activity": candidate }))
            .await?;
        info!(%owner, last_video_activity = %candidate.to_rfc3339(), "last video activity advanced");
        Ok(Some(candidate))
    }
}

pub fn profile_write(snapshot: &ProfileSnapshot, avatar: Option<String>) -> ProfileWrite {
    let user = &snapshot.user;
    let stats = &snapshot.stats;
    ProfileWrite {
        tiktok_id: user.id.clone(),
        nickname: user.nickname.clone(),
        signature: user.signature.clone(),
        avatar,
        created: snapshot.created_at(),
        verified: user.verified,
        sec_uid: user.sec_uid.clone(),
        bio_link: snapshot.bio_link(),
        private: user.private_account,
        followers: stats.follower_count,
        following: stats.following_count,
        hearts: stats.heart_count,
        videos: stats.video_count,
        friends: stats.friend_count,
    }
}

pub fn stats_snapshot(
    snapshot: &ProfileSnapshot,
    account_id: &RecordId,
    now: DateTime<Utc>,
) -> StatsSnapshotWrite {
    let stats = &snapshot.stats;
    StatsSnapshotWrite {
        user: account_id.clone(),
        unique_id: snapshot.username.clone(),
        tiktok_id: snapshot.user.id.clone(),
        followers: stats.follower_count,
        following: stats.following_count,
        hearts: stats.heart_count,
        videos: stats.video_count,
        friends: stats.friend_count,
        recorded_at: now,
    }
}

pub fn media_write(item: &UpstreamMediaItem, owner: &RecordId, cover: Option<String>) -> MediaWrite {
    let counters = item.counters();
    MediaWrite {
        tiktok_id: item.id.clone(),
        author: owner.clone(),
        created: item.created_at(),
        desc: item.desc.clone().unwrap_or_default(),
        collected: counters.collect_count,
        comments: counters.comment_count,
        hearts: counters.digg_count,
        plays: counters.play_count,
        shares: counters.share_count,
        cover,
        duration: item.duration(),
        dynamic_cover: item.dynamic_cover().map(str::to_string),
    }
}

/// Creation time of the first non-pinned item; pages come newest first.
pub fn latest_activity(items: &[UpstreamMediaItem]) -> Option<DateTime<Utc>> {
    items
        .iter()
        .filter(|i| !i.is_pinned)
        .find_map(UpstreamMediaItem::created_at)
}

fn preview(desc: &str) -> String {
    desc.chars().take(30).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiksync_protocol::ProfileResponse;

    fn item(v: serde_json::Value) -> UpstreamMediaItem {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn pinned_items_do_not_count_as_activity() {
        let items = vec![
            item(json!({ "id": "p", "createTime": 1800000000, "isPinned": true })),
            item(json!({ "id": "a", "createTime": 1700000100 })),
            item(json!({ "id": "b", "createTime": 1700000000 })),
        ];
        assert_eq!(latest_activity(&items).unwrap().timestamp(), 1700000100);
        assert!(latest_activity(&items[..1]).is_none());
        assert!(latest_activity(&[]).is_none());
    }

    #[test]
    fn media_mapping_defaults_missing_counters() {
        let it = item(json!({
            "id": "v9",
            "createTime": 1700000000,
            "statsV2": { "playCount": "42" },
            "video": { "cover": "https://cdn/c.jpg", "dynamicCover": "https://cdn/d.webp", "duration": 12 }
        }));
        let m = media_write(&it, &RecordId::Int(3), Some("https://owned/c.jpg".into()));
        assert_eq!(m.plays, 42);
        assert_eq!(m.hearts, 0);
        assert_eq!(m.collected, 0);
        assert_eq!(m.desc, "");
        assert_eq!(m.duration, Some(12));
        assert_eq!(m.cover.as_deref(), Some("https://owned/c.jpg"));
        assert_eq!(m.dynamic_cover.as_deref(), Some("https://cdn/d.webp"));
        assert_eq!(m.author, RecordId::Int(3));
    }

    #[test]
    fn profile_mapping_replaces_all_fields() {
        let resp: ProfileResponse = serde_json::from_value(json!({
            "users": { "someone": {
                "id": "123", "nickname": "Some One", "signature": "hi",
                "createTime": 1500000000, "verified": true, "secUid": "MS4",
                "bioLink": { "link": "example.com" }, "privateAccount": false
            }},
            "stats": { "someone": {
                "followerCount": 100, "followingCount": 5, "heartCount": 900,
                "videoCount": 12, "friendCount": 2
            }}
        }))
        .unwrap();
        let snap = resp.into_snapshot("someone").unwrap();
        let p = profile_write(&snap, None);
        assert_eq!(p.tiktok_id, "123");
        assert_eq!(p.bio_link.as_deref(), Some("example.com"));
        assert!(p.verified);
        assert_eq!((p.followers, p.following, p.hearts, p.videos, p.friends), (100, 5, 900, 12, 2));
        let encoded = serde_json::to_value(&p).unwrap();
        // Absent values are written as null rather than left untouched.
        assert!(encoded.get("avatar").unwrap().is_null());

        let now = Utc::now();
        let s = stats_snapshot(&snap, &RecordId::Int(8), now);
        assert_eq!(s.unique_id, "someone");
        assert_eq!(s.followers, 100);
        assert_eq!(s.recorded_at, now);
    }

    #[test]
    fn preview_is_char_safe() {
        assert_eq!(preview(&"é".repeat(40)).chars().count(), 30);
    }
}
