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

//! Shared cache for recently read object payloads (spec §4.3).
//!
//! A cache entry's payload lives either under a local directory (the
//! default) or, for a two-tier cache, on a second `StorageProvider`
//! profile (`storage_provider_profile`). Either way a single JSON sidecar
//! index per cache root tracks entry sizes and timestamps, guarded by an
//! advisory `flock(2)` the way low-level Rust storage engines in the
//! retrieval pack manage cross-process file locks (the teacher doesn't
//! carry a dedicated locking crate, so this goes straight to `libc`).

pub mod index;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Result, StorageError};
use crate::hint::DistributedHint;
use crate::provider::{PutBody, StorageProvider};
use crate::types::PutOptions;

use index::{CacheIndex, IndexEntry};

/// Eviction policy selector (spec §4.3 "Configuration").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    Fifo,
    Lru,
    Random,
    #[serde(rename = "no_eviction")]
    NoEviction,
}

/// Cache configuration (spec §4.3, §6 `cache`).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub size_limit_bytes: u64,
    pub use_etag: bool,
    pub eviction_policy: EvictionPolicy,
    pub refresh_interval: Duration,
    pub cache_path: PathBuf,
    /// When set, cached payloads live on this storage provider profile
    /// instead of `cache_path` (two-tier cache, spec §4.3).
    pub storage_provider_profile: Option<String>,
}

/// Either a local directory or a second storage provider backing cached
/// payloads (spec §4.3 "Configuration").
enum Backend {
    Local { root: PathBuf },
    Remote { provider: Arc<dyn StorageProvider> },
}

/// A process-local cache handle over one cache root. Safe for concurrent
/// use; cross-process coordination for eviction goes through
/// [`DistributedHint`].
pub struct Cache {
    config: CacheConfig,
    backend: Backend,
    index: CacheIndex,
    hint: Option<Arc<DistributedHint>>,
    profile: String,
}

impl Cache {
    pub fn new_local(profile: impl Into<String>, config: CacheConfig) -> Result<Self> {
        let root = config.cache_path.clone();
        std::fs::create_dir_all(&root)?;
        let index = CacheIndex::open(root.join("index.json"))?;
        Ok(Cache {
            config,
            backend: Backend::Local { root },
            index,
            hint: None,
            profile: profile.into(),
        })
    }

    pub fn new_remote(
        profile: impl Into<String>,
        config: CacheConfig,
        provider: Arc<dyn StorageProvider>,
    ) -> Result<Self> {
        let local_index_root = config.cache_path.clone();
        std::fs::create_dir_all(&local_index_root)?;
        let index = CacheIndex::open(local_index_root.join("index.json"))?;
        Ok(Cache {
            config,
            backend: Backend::Remote { provider },
            index,
            hint: None,
            profile: profile.into(),
        })
    }

    /// Attaches a distributed hint used to serialize `refresh_cache`
    /// across processes/hosts (spec §4.3 "Eviction").
    pub fn with_hint(mut self, hint: Arc<DistributedHint>) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Derives the cache key for `logical_name` (+ `etag` when
    /// `use_etag` is set), sharded into a directory path to avoid hot
    /// spots (spec §4.3 "Key derivation").
    pub fn cache_key(&self, logical_name: &str, etag: Option<&str>) -> String {
        let mut seed = format!("{}/{}", self.profile, logical_name);
        if self.config.use_etag {
            if let Some(etag) = etag {
                seed.push('@');
                seed.push_str(etag);
            }
        }
        let digest = xxh3_64(seed.as_bytes());
        let hex = format!("{digest:016x}");
        format!("{}/{}/{}", &hex[0..2], &hex[2..4], &hex[4..])
    }

    /// Reads the payload for `key`, or `None` on a cache MISS. Tolerates a
    /// concurrent renamer: on a not-found read, retries once after a
    /// short delay before declaring a miss (spec §4.3 "Cross-process
    /// concurrency").
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut attempt = 0;
        loop {
            match self.read_payload(key).await {
                Ok(bytes) => {
                    self.index.touch_access(key)?;
                    return Ok(Some(bytes));
                }
                Err(StorageError::NotFound(_)) if attempt == 0 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    continue;
                }
                Err(StorageError::NotFound(_)) => return Ok(None),
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Writes `bytes` under `key`, atomically (`.tmp.<uuid>` then rename,
    /// or the provider's own atomic `put`). Under `no_eviction`, a write
    /// that would exceed the size limit is silently dropped (spec §4.3
    /// "Eviction").
    pub async fn set(&self, key: &str, bytes: Bytes) -> Result<()> {
        if self.config.eviction_policy == EvictionPolicy::NoEviction
            && self.index.total_size() + bytes.len() as u64 > self.config.size_limit_bytes
        {
            debug!(key, "cache full under no_eviction, dropping write");
            return Ok(());
        }
        self.write_payload(key, bytes.clone()).await?;
        self.index.upsert(IndexEntry {
            logical_name: key.to_string(),
            size: bytes.len() as u64,
            created_at: now(),
            last_access: now(),
        })?;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.index.total_size()
    }

    /// Whether this cache validates hits against the remote etag (spec
    /// §4.3 "Etag validation").
    pub fn use_etag(&self) -> bool {
        self.config.use_etag
    }

    async fn read_payload(&self, key: &str) -> Result<Bytes> {
        match &self.backend {
            Backend::Local { root } => {
                let path = root.join(key);
                match tokio::fs::read(&path).await {
                    Ok(bytes) => Ok(Bytes::from(bytes)),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        Err(StorageError::NotFound(key.to_string()))
                    }
                    Err(err) => Err(StorageError::Io(err)),
                }
            }
            Backend::Remote { provider } => provider.get(key, None).await,
        }
    }

    async fn write_payload(&self, key: &str, bytes: Bytes) -> Result<()> {
        match &self.backend {
            Backend::Local { root } => {
                let path = root.join(key);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
                tokio::fs::write(&tmp_path, &bytes).await?;
                tokio::fs::rename(&tmp_path, &path).await?;
                Ok(())
            }
            Backend::Remote { provider } => {
                provider.put(key, PutBody::Bytes(bytes), PutOptions::default()).await?;
                Ok(())
            }
        }
    }

    async fn delete_payload(&self, key: &str) -> Result<()> {
        match &self.backend {
            Backend::Local { root } => {
                let path = root.join(key);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(_) if !path.exists() => Ok(()),
                    Err(err) => Err(StorageError::Io(err)),
                }
            }
            Backend::Remote { provider } => provider.delete(key).await,
        }
    }

    /// Sweeps the cache if its accumulated size exceeds the configured
    /// limit, evicting by the configured policy. Returns `true` only if
    /// this caller actually performed the sweep — callers losing the
    /// distributed-hint race return `false` without raising (spec §4.3,
    /// §7 "a dropped hint during cache refresh is logged and returns
    /// `false` without raising").
    pub async fn refresh_cache(&self) -> Result<bool> {
        let _guard = match &self.hint {
            Some(hint) => match hint.try_acquire().await {
                Ok(Some(guard)) => Some(guard),
                Ok(None) => return Ok(false),
                Err(err) => {
                    warn!("cache refresh hint acquisition failed: {err}");
                    return Ok(false);
                }
            },
            None => None,
        };

        if self.config.eviction_policy == EvictionPolicy::NoEviction {
            return Ok(true);
        }

        let mut total = self.index.total_size();
        if total <= self.config.size_limit_bytes {
            return Ok(true);
        }

        let mut candidates = self.index.entries();
        match self.config.eviction_policy {
            EvictionPolicy::Fifo => candidates.sort_by_key(|e| e.created_at),
            EvictionPolicy::Lru => candidates.sort_by_key(|e| e.last_access),
            EvictionPolicy::Random => candidates.shuffle(&mut rand::thread_rng()),
            EvictionPolicy::NoEviction => unreachable!(),
        }

        for entry in candidates {
            if total <= self.config.size_limit_bytes {
                break;
            }
            if self.delete_payload(&entry.logical_name).await.is_ok() {
                self.index.remove(&entry.logical_name)?;
                total = total.saturating_sub(entry.size);
            }
        }

        Ok(true)
    }
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path, limit: u64, policy: EvictionPolicy) -> CacheConfig {
        CacheConfig {
            size_limit_bytes: limit,
            use_etag: false,
            eviction_policy: policy,
            refresh_interval: Duration::from_secs(60),
            cache_path: dir.to_path_buf(),
            storage_provider_profile: None,
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new_local("p", config(dir.path(), 1024 * 1024, EvictionPolicy::Lru)).unwrap();
        let key = cache.cache_key("a/b.bin", None);
        cache.set(&key, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn no_eviction_silently_drops_over_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new_local("p", config(dir.path(), 4, EvictionPolicy::NoEviction)).unwrap();
        let key = cache.cache_key("a/b.bin", None);
        cache.set(&key, Bytes::from_static(b"hello")).await.unwrap();
        assert!(!cache.contains(&key).await);
    }

    #[tokio::test]
    async fn fifo_eviction_removes_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new_local("p", config(dir.path(), 6, EvictionPolicy::Fifo)).unwrap();
        let k1 = cache.cache_key("one", None);
        let k2 = cache.cache_key("two", None);
        cache.set(&k1, Bytes::from_static(b"12345")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set(&k2, Bytes::from_static(b"6789")).await.unwrap();
        cache.refresh_cache().await.unwrap();
        assert!(!cache.contains(&k1).await);
        assert!(cache.contains(&k2).await);
    }
}
