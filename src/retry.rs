/*
 * Multistore (C) 2024 - 2026 Multistore Contributors.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 */

//! Retry wrapper for storage provider operations (spec §4.7).
//!
//! Grounded on `original_source/tests/unit/test_retry.py`: a default of
//! 3 attempts, only [`StorageError::Retryable`] triggers a retry, and the
//! exact error/attempt count surfaces to the caller once attempts are
//! exhausted.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::types::Range;

/// Backoff parameters for [`retry`]. Defaults mirror the Python
/// implementation's `max_attempts=3`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(20),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.initial_backoff.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_backoff);
        if self.jitter {
            let mut rng = rand::thread_rng();
            let jittered_ms = rng.gen_range(0..=capped.as_millis().max(1) as u64);
            Duration::from_millis(jittered_ms)
        } else {
            capped
        }
    }
}

/// Runs `op` up to `policy.max_attempts` times, retrying only on
/// [`StorageError::Retryable`]. On exhaustion, returns the last error
/// observed.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StorageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let backoff = policy.backoff_for(attempt);
                warn!(attempt, ?backoff, "retrying after retryable storage error: {err}");
                tokio::time::sleep(backoff).await;
                continue;
            }
            Err(err) => {
                if attempt > 1 {
                    debug!(attempt, "retry exhausted: {err}");
                }
                return Err(err);
            }
        }
    }
}

/// Retries a ranged GET. `op` receives the range still outstanding and
/// returns the bytes it managed to read before failing (possibly empty)
/// alongside the error, or the final chunk on success. Each retry narrows
/// `range` by what was already read so a resumed attempt never re-reads
/// data (spec §4.1, §4.7: "a range GET retries by adjusting offset +=
/// bytes_read_so_far and size -= bytes_read_so_far").
pub async fn retry_ranged_get<F, Fut>(
    policy: &RetryPolicy,
    mut range: Range,
    mut op: F,
) -> Result<bytes::Bytes, StorageError>
where
    F: FnMut(Range) -> Fut,
    Fut: Future<Output = Result<bytes::Bytes, (StorageError, u64)>>,
{
    let mut collected = Vec::with_capacity(range.size as usize);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(range).await {
            Ok(chunk) => {
                collected.extend_from_slice(&chunk);
                return Ok(bytes::Bytes::from(collected));
            }
            Err((err, bytes_read)) if err.is_retryable() && attempt < policy.max_attempts => {
                range = range.advance(bytes_read);
                let backoff = policy.backoff_for(attempt);
                warn!(attempt, ?backoff, remaining = range.size, "retrying ranged get: {err}");
                tokio::time::sleep(backoff).await;
                continue;
            }
            Err((err, _)) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: false,
            ..Default::default()
        };
        let result = retry(&policy, |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err(StorageError::Retryable("boom".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: false,
        };
        let result: Result<(), StorageError> = retry(&policy, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(StorageError::Retryable("always fails".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<(), StorageError> = retry(&policy, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(StorageError::NotFound("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
