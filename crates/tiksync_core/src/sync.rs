/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Runs one sync job over the tracked-account roster.
//!
//! A run logs in, lists the accounts, and processes each due account in
//! isolation: a failure is logged and counted against that account only. A
//! 404 from upstream soft-deletes the account instead of counting as a
//! failure. Accounts are processed one at a time unless a worker pool size
//! above 1 is configured.

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tiksync_protocol::{AccountRecord, Filter, RecordId};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::datastore::Records;
use crate::staleness::{is_due, start_of_utc_day, StalenessMode};
use crate::upstream::{FetchError, FetchErrorKind, Upstream};
use crate::writer::{PageStats, UpsertWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJob {
    Profiles,
    Media,
}

impl SyncJob {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncJob::Profiles => "profiles",
            SyncJob::Media => "media",
        }
    }

    /// Datastore field holding this job's last successful sync.
    pub fn stamp_field(self) -> &'static str {
        match self {
            SyncJob::Profiles => "last_updated",
            SyncJob::Media => "last_media_updated",
        }
    }

    fn last_synced(self, account: &AccountRecord) -> Option<DateTime<Utc>> {
        match self {
            SyncJob::Profiles => account.last_updated,
            SyncJob::Media => account.last_media_updated,
        }
    }

    fn interval_hours(self, account: &AccountRecord) -> Option<f64> {
        match self {
            SyncJob::Profiles => account.interval,
            SyncJob::Media => account.media_interval,
        }
    }
}

impl fmt::Display for SyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncJob {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "profiles" | "profile" | "user" | "users" => Ok(SyncJob::Profiles),
            "media" | "videos" => Ok(SyncJob::Media),
            other => Err(format!("unknown job: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub job: SyncJob,
    pub total: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
    pub soft_deleted: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    fn new(job: SyncJob, started_at: DateTime<Utc>) -> Self {
        Self {
            job,
            total: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            soft_deleted: 0,
            started_at,
            finished_at: started_at,
        }
    }

    fn record(&mut self, outcome: AccountOutcome) {
        self.total += 1;
        match outcome {
            AccountOutcome::Updated => self.updated += 1,
            AccountOutcome::Skipped => self.skipped += 1,
            AccountOutcome::Failed => self.failed += 1,
            AccountOutcome::SoftDeleted => self.soft_deleted += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    Updated,
    Skipped,
    Failed,
    SoftDeleted,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SyncError {
    fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Fetch(e) if e.kind() == FetchErrorKind::NotFound)
    }
}

pub struct SyncDriver {
    records: Records,
    upstream: Arc<dyn Upstream>,
    writer: UpsertWriter,
    cfg: SyncConfig,
    clock: fn() -> DateTime<Utc>,
}

impl SyncDriver {
    pub fn new(
        records: Records,
        upstream: Arc<dyn Upstream>,
        writer: UpsertWriter,
        cfg: SyncConfig,
    ) -> Self {
        Self {
            records,
            upstream,
            writer,
            cfg,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    /// Runs `job` to completion. Only login and roster listing failures abort
    /// the run; everything per account is counted in the summary.
    pub async fn run(&self, job: SyncJob) -> anyhow::Result<RunSummary> {
        let now = (self.clock)();
        let mut summary = RunSummary::new(job, now);
        info!(%job, mode = ?self.cfg.staleness_mode, "sync run started");

        self.records.login().await?;

        let filter = due_filter(job, self.cfg.staleness_mode, now);
        let roster = self.records.list_accounts(filter.as_ref()).await?;
        debug!(%job, accounts = roster.accounts.len(), unreadable = roster.unreadable.len(), "roster loaded");
        for row in &roster.unreadable {
            error!(%job, account_id = %row.id, "unreadable roster row: {:#}", row.error);
            summary.record(AccountOutcome::Failed);
        }

        let pending: Vec<_> = roster
            .accounts
            .iter()
            .map(|account| self.process_account(job, account, now))
            .collect();
        let outcomes: Vec<AccountOutcome> = stream::iter(pending)
            .buffer_unordered(self.cfg.concurrency.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            summary.record(outcome);
        }

        summary.finished_at = (self.clock)();
        info!(
            %job,
            total = summary.total,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            soft_deleted = summary.soft_deleted,
            "sync run finished"
        );
        Ok(summary)
    }

    async fn process_account(
        &self,
        job: SyncJob,
        account: &AccountRecord,
        now: DateTime<Utc>,
    ) -> AccountOutcome {
        if account.unique_id.trim().is_empty() {
            error!(%job, account_id = %account.id, "account has no username");
            return AccountOutcome::Failed;
        }
        if account.is_deleted() {
            debug!(%job, account_id = %account.id, username = %account.unique_id, "soft-deleted, skipping");
            return AccountOutcome::Skipped;
        }
        let interval = job
            .interval_hours(account)
            .unwrap_or(self.cfg.default_interval_hours);
        if !is_due(job.last_synced(account), interval, self.cfg.staleness_mode, now) {
            debug!(%job, account_id = %account.id, username = %account.unique_id, "not due");
            return AccountOutcome::Skipped;
        }

        let result = match job {
            SyncJob::Profiles => self.sync_profile(account).await,
            SyncJob::Media => self.sync_media(account).await,
        };
        match result {
            Ok(()) => AccountOutcome::Updated,
            Err(e) if e.is_not_found() => match self.soft_delete(&account.id).await {
                Ok(()) => {
                    warn!(%job, account_id = %account.id, username = %account.unique_id, "account gone upstream, soft-deleted");
                    AccountOutcome::SoftDeleted
                }
                Err(write_err) => {
                    error!(%job, account_id = %account.id, username = %account.unique_id, "soft delete failed: {write_err:#}");
                    AccountOutcome::Failed
                }
            },
            Err(e) => {
                let status = match &e {
                    SyncError::Fetch(f) => f.status(),
                    SyncError::Store(_) => None,
                };
                error!(%job, account_id = %account.id, username = %account.unique_id, status = ?status, "account sync failed: {e:#}");
                AccountOutcome::Failed
            }
        }
    }

    async fn sync_profile(&self, account: &AccountRecord) -> Result<(), SyncError> {
        let snapshot = self.upstream.fetch_profile(&account.unique_id).await?;
        self.writer
            .upsert_account_profile(&snapshot, &account.id, (self.clock)())
            .await?;
        self.mark_synced(SyncJob::Profiles, &account.id).await?;
        info!(account_id = %account.id, username = %account.unique_id, "profile synced");
        Ok(())
    }

    /// Fetches one page per run; a never-synced account follows the cursor
    /// until it runs out, repeats, or the page cap is hit.
    async fn sync_media(&self, account: &AccountRecord) -> Result<(), SyncError> {
        let first_sync = account.last_media_updated.is_none();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        let mut pages = 0u32;
        let mut totals = PageStats::default();

        loop {
            pages += 1;
            let page = match self
                .upstream
                .fetch_media_page(&account.unique_id, cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) if e.kind() == FetchErrorKind::Malformed => {
                    warn!(account_id = %account.id, username = %account.unique_id, page = pages, "{e}");
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            if page.skipped > 0 {
                warn!(account_id = %account.id, username = %account.unique_id, page = pages, skipped = page.skipped, "undecodable media items dropped");
            }
            let stats = self.writer.save_media_page(&page.items, &account.id).await?;
            totals.created += stats.created;
            totals.updated += stats.updated;
            totals.skipped += stats.skipped + page.skipped;

            if !first_sync {
                break;
            }
            match page.next_cursor {
                Some(next) if pages < self.cfg.max_media_pages && seen.insert(next.clone()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        self.mark_synced(SyncJob::Media, &account.id).await?;
        info!(
            account_id = %account.id,
            username = %account.unique_id,
            pages,
            created = totals.created,
            updated = totals.updated,
            skipped = totals.skipped,
            "media synced"
        );
        Ok(())
    }

    async fn mark_synced(&self, job: SyncJob, id: &RecordId) -> anyhow::Result<()> {
        let now = (self.clock)();
        self.records
            .update_account(id, &json!({ job.stamp_field(): now }))
            .await
    }

    async fn soft_delete(&self, id: &RecordId) -> anyhow::Result<()> {
        let now = (self.clock)();
        self.records
            .update_account(id, &json!({ "deleted": true, "deleted_at": now }))
            .await
    }
}

/// Calendar-day mode pushes due selection down to the datastore.
pub fn due_filter(job: SyncJob, mode: StalenessMode, now: DateTime<Utc>) -> Option<Filter> {
    match mode {
        StalenessMode::Elapsed => None,
        StalenessMode::CalendarDay => {
            let field = job.stamp_field();
            Some(Filter::Or(vec![
                Filter::is_null(field),
                Filter::lt(field, start_of_utc_day(now).to_rfc3339()),
            ]))
        }
    }
}
