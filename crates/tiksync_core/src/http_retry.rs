/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Bounded retry for upstream API calls.
//!
//! Only rate limiting, server errors and transport failures are retried. A
//! 404 means the account is gone and must reach the caller on the first try.

use rand::{thread_rng, Rng};
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_millis(200);
const MAX_DELAY: Duration = Duration::from_secs(5);
const MAX_JITTER_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    /// One attempt: upstream calls are not retried unless configured.
    fn default() -> Self {
        Self::new(1)
    }
}

impl RetryPolicy {
    /// `attempts` counts the first call; clamped to 1..=5.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.clamp(1, MAX_ATTEMPTS),
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait before retry number `retry` (1-based), jitter excluded. A
    /// `Retry-After` hint from the server wins but is capped like the backoff.
    pub fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Sends the request built by `build` under `policy`. The final answer is
/// returned untouched so the caller classifies the last status itself.
pub async fn send_with_retry<F>(
    mut build: F,
    policy: &RetryPolicy,
    endpoint: &str,
) -> Result<Response, reqwest::Error>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let last = attempt >= policy.attempts();
        match build().send().await {
            Ok(resp) if is_retryable(resp.status()) && !last => {
                let status = resp.status();
                let wait = policy.delay(attempt, retry_after(&resp));
                debug!(endpoint, %status, attempt, wait_ms = wait.as_millis() as u64, "upstream busy, retrying");
                pause(wait).await;
            }
            Ok(resp) => {
                if attempt > 1 && is_retryable(resp.status()) {
                    warn!(endpoint, status = %resp.status(), attempts = attempt, "upstream still failing after retries");
                }
                return Ok(resp);
            }
            Err(e) if !last => {
                let wait = policy.delay(attempt, None);
                debug!(endpoint, attempt, wait_ms = wait.as_millis() as u64, "transport error, retrying: {e}");
                pause(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Only the delta-seconds form is understood.
fn retry_after(resp: &Response) -> Option<Duration> {
    if resp.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn pause(wait: Duration) {
    let jitter = Duration::from_millis(thread_rng().gen_range(0..=MAX_JITTER_MS));
    tokio::time::sleep(wait + jitter).await;
}
