/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Wire types shared by the sync job: upstream profile/media payloads, datastore
//! records and the datastore filter expression.

pub mod filter;
pub mod lenient;
pub mod records;
pub mod upstream;

pub use filter::Filter;
pub use records::{
    AccountRecord, MediaRecord, MediaWrite, ProfileWrite, RecordId, StatsSnapshotWrite,
    COLLECTION_ACCOUNTS, COLLECTION_MEDIA, COLLECTION_STATS,
};
pub use upstream::{
    MediaPage, MediaPageResponse, ProfileResponse, ProfileSnapshot, UpstreamMediaItem,
    UpstreamMediaStats, UpstreamStats, UpstreamUser, UpstreamVideo,
};
