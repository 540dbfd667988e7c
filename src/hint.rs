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

//! Distributed hint (lease): a storage-object-backed mutual-exclusion
//! primitive (spec §4.4). Guarantees at most one holder at any instant
//! among participants whose clocks move forward, under skew up to
//! `buffer`. Lifecycle mirrors `parseable`'s alert `ScheduledTaskHandlers`
//! tuple (`src/alerts/mod.rs`): a `JoinHandle` is spawned on acquire and
//! aborted on release/drop.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::{ConfigError, Result, StorageError};
use crate::provider::{ConditionOutcome, PutBody, StorageProvider};
use crate::types::{PutCondition, PutOptions};

const LEASE_OBJECT_NAME: &str = "lease.json";

/// Serialized lease body (spec §3 "Hint").
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseBody {
    holder_id: Ulid,
    acquired_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
    lease_duration_secs: u64,
}

impl LeaseBody {
    fn is_live(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        let expiry = self.last_heartbeat
            + chrono::Duration::seconds(self.lease_duration_secs as i64)
            + chrono::Duration::from_std(buffer).unwrap_or_default();
        now < expiry
    }
}

/// Configuration for a [`DistributedHint`] (spec §4.4).
#[derive(Debug, Clone)]
pub struct HintConfig {
    pub hint_prefix: String,
    pub lease_duration: Duration,
    pub heartbeat_interval: Duration,
    pub buffer: Duration,
}

impl Default for HintConfig {
    fn default() -> Self {
        HintConfig {
            hint_prefix: "_msc_hints/cache".to_string(),
            lease_duration: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            buffer: Duration::from_secs(5),
        }
    }
}

/// Dropping this guard releases the lease (best-effort) and aborts the
/// heartbeat task, the way a lock guard releases on scope exit.
pub struct HintGuard {
    hint: Arc<DistributedHint>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for HintGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
        let hint = Arc::clone(&self.hint);
        tokio::spawn(async move {
            if let Err(err) = hint.release().await {
                debug!("best-effort hint release failed: {err}");
            }
        });
    }
}

/// A mutual-exclusion lease over `hint_prefix/lease.json` on a storage
/// provider. Constructing one over a provider that doesn't support
/// conditional writes is a configuration error raised eagerly (spec
/// §4.4 "Required provider capability").
pub struct DistributedHint {
    provider: Arc<dyn StorageProvider>,
    config: HintConfig,
    holder_id: Ulid,
    current_etag: parking_lot::Mutex<Option<String>>,
}

impl DistributedHint {
    pub fn new(provider: Arc<dyn StorageProvider>, config: HintConfig) -> Result<Arc<Self>> {
        let caps = provider.conditional_capabilities();
        if matches!(caps.if_none_match_star, ConditionOutcome::Unsupported)
            && matches!(caps.if_match, ConditionOutcome::Unsupported)
        {
            return Err(StorageError::Config(ConfigError::HintRequiresConditionalWrites));
        }
        Ok(Arc::new(DistributedHint {
            provider,
            config,
            holder_id: Ulid::new(),
            current_etag: parking_lot::Mutex::new(None),
        }))
    }

    fn lease_path(&self) -> String {
        crate::provider::full_path(&self.config.hint_prefix, LEASE_OBJECT_NAME)
    }

    /// Attempts to acquire the lease. Returns `Ok(Some(guard))` on
    /// success, `Ok(None)` if another holder currently has it live, and
    /// `Err` on a provider failure (spec §4.4 "Acquire").
    pub async fn try_acquire(self: &Arc<Self>) -> Result<Option<HintGuard>> {
        let path = self.lease_path();
        match self.provider.head(&path).await {
            Err(StorageError::NotFound(_)) => match self.write_lease(&path, PutCondition::IfAbsent).await {
                Ok(()) => Ok(Some(self.spawn_guard())),
                Err(StorageError::PreconditionFailed { .. }) => Ok(None),
                Err(err) => Err(err),
            },
            Ok(meta) => {
                let body = self.read_lease_body(&path).await?;
                if body.is_live(Utc::now(), self.config.buffer) {
                    return Ok(None);
                }
                let etag = meta.etag.unwrap_or_default();
                match self
                    .write_lease(&path, PutCondition::IfMatch(etag))
                    .await
                {
                    Ok(()) => Ok(Some(self.spawn_guard())),
                    Err(StorageError::PreconditionFailed { .. }) => Ok(None),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Blocks (via backoff-free polling) until the lease is acquired or
    /// `deadline` elapses.
    pub async fn acquire(self: &Arc<Self>, deadline: Duration) -> Result<HintGuard> {
        let started = tokio::time::Instant::now();
        loop {
            if let Some(guard) = self.try_acquire().await? {
                return Ok(guard);
            }
            if started.elapsed() >= deadline {
                return Err(StorageError::Retryable(format!(
                    "could not acquire hint {} within {:?}",
                    self.config.hint_prefix, deadline
                )));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    async fn read_lease_body(&self, path: &str) -> Result<LeaseBody> {
        let bytes = self.provider.get(path, None).await?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Other(Box::new(e)))
    }

    async fn write_lease(&self, path: &str, condition: PutCondition) -> Result<()> {
        let now = Utc::now();
        let body = LeaseBody {
            holder_id: self.holder_id,
            acquired_at: now,
            last_heartbeat: now,
            lease_duration_secs: self.config.lease_duration.as_secs(),
        };
        let bytes = Bytes::from(serde_json::to_vec(&body).map_err(|e| StorageError::Other(Box::new(e)))?);
        let etag = self
            .provider
            .put(
                path,
                PutBody::Bytes(bytes),
                PutOptions {
                    condition: Some(condition),
                },
            )
            .await?;
        *self.current_etag.lock() = Some(etag);
        Ok(())
    }

    fn spawn_guard(self: &Arc<Self>) -> HintGuard {
        let hint = Arc::clone(self);
        let interval = self.config.heartbeat_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(err) = hint.heartbeat().await {
                    warn!("hint heartbeat failed, lease considered lost: {err}");
                    break;
                }
            }
        });
        HintGuard {
            hint: Arc::clone(self),
            heartbeat: Some(handle),
        }
    }

    async fn heartbeat(&self) -> Result<()> {
        let path = self.lease_path();
        let etag = self.current_etag.lock().clone().ok_or_else(|| {
            StorageError::Retryable("heartbeat attempted without a held lease".to_string())
        })?;
        self.write_lease(&path, PutCondition::IfMatch(etag)).await
    }

    /// Best-effort release: clears the lease object only if we still
    /// appear to own it (spec §4.4 "Release"). The provider contract has
    /// no conditional `delete`, so ownership is checked with a `head`
    /// immediately before deleting rather than atomically — a lost race
    /// here just leaves a lease for its writer to find already gone.
    async fn release(&self) -> Result<()> {
        let Some(held_etag) = self.current_etag.lock().clone() else {
            return Ok(());
        };
        let path = self.lease_path();
        match self.provider.head(&path).await {
            Ok(meta) if meta.etag.as_deref() == Some(held_etag.as_str()) => self.provider.delete(&path).await,
            Ok(_) => Ok(()),
            Err(StorageError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::file::FileConfig;

    #[tokio::test]
    async fn file_backend_cannot_host_a_hint() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn StorageProvider> = Arc::new(
            FileConfig {
                base_path: dir.path().to_string_lossy().to_string(),
                multipart_threshold: crate::provider::DEFAULT_MULTIPART_THRESHOLD,
            }
            .build()
            .unwrap(),
        );
        // file never supports conditional writes, so it cannot host a
        // hint (spec §4.4 "Required provider capability").
        assert!(DistributedHint::new(provider, HintConfig::default()).is_err());
    }
}
