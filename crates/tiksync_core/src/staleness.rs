/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Decides whether an account is due for a refresh.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::str::FromStr;

/// One mode is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessMode {
    /// Due once strictly more than the interval has elapsed.
    Elapsed,
    /// Due once per UTC calendar day; the interval is ignored.
    CalendarDay,
}

impl FromStr for StalenessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elapsed" | "hours" | "interval" => Ok(StalenessMode::Elapsed),
            "calendar_day" | "calendar-day" | "daily" => Ok(StalenessMode::CalendarDay),
            other => Err(format!("unknown staleness mode: {other}")),
        }
    }
}

pub fn is_due(
    last_synced_at: Option<DateTime<Utc>>,
    interval_hours: f64,
    mode: StalenessMode,
    now: DateTime<Utc>,
) -> bool {
    let Some(last) = last_synced_at else {
        return true;
    };
    match mode {
        StalenessMode::Elapsed => now - last > interval_duration(interval_hours),
        StalenessMode::CalendarDay => last.date_naive() < now.date_naive(),
    }
}

/// Start of the current UTC day; rows stamped before it are due in calendar-day mode.
pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn interval_duration(hours: f64) -> Duration {
    if !hours.is_finite() || hours <= 0.0 {
        return Duration::zero();
    }
    // ~114k years; keeps the millisecond count inside chrono's range.
    let ms = (hours.min(1e9) * 3_600_000.0).round();
    Duration::milliseconds(ms as i64)
}
