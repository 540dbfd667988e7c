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

//! Manifest metadata provider (spec §4.2, §3 "Manifest").
//!
//! A manifest is a versioned, immutable snapshot of `logical -> physical`
//! mappings plus `ObjectMetadata`, stored as a directory named by an
//! ISO-8601 second-precision UTC timestamp under `manifest_base`:
//!
//! ```text
//! <manifest_base>/<timestamp>/main.json
//! <manifest_base>/<timestamp>/parts/part_<0010d>.jsonl
//! ```
//!
//! Grounded on `original_source/tests/.../generators/test_manifest_metadata.py`
//! (constant names, second-precision timestamp round-trip, part filename
//! pattern, and the "logical key never contains the manifest base dir"
//! assertion) and `.../providers/test_metadata_rewrite.py` (rewrite/commit
//! behavior). Physical key minting and the writable/refcount rules follow
//! spec §4.2 and the Open Question resolutions recorded in DESIGN.md.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::glob;
use crate::metadata::{MetadataListStream, MetadataProvider};
use crate::provider::{full_path, PutBody, StorageProvider};
use crate::types::{ListOptions, ObjectMetadata, ObjectType, PutOptions};

/// Default manifest base directory, relative to a profile's `base_path`.
pub const DEFAULT_MANIFEST_BASE_DIR: &str = ".msc_manifests";
pub const MANIFEST_INDEX_FILENAME: &str = "main.json";
pub const MANIFEST_PARTS_CHILD_DIR: &str = "parts";
pub const MANIFEST_PART_PREFIX: &str = "part_";
pub const MANIFEST_PART_SUFFIX: &str = ".jsonl";
pub const SEQUENCE_PADDING: usize = 10;

/// Target entries per part (spec §4.2 "Commit algorithm" step 3);
/// whichever of this or `DEFAULT_PART_MAX_BYTES` is hit first ends a part.
const DEFAULT_PART_MAX_ENTRIES: usize = 50_000;
const DEFAULT_PART_MAX_BYTES: usize = 32 * 1024 * 1024;

/// `main.json` (spec §6 "Manifest layout").
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MainIndex {
    parts: Vec<String>,
    version: u32,
    created_at: DateTime<Utc>,
}

/// One line of a `parts/part_<seq>.jsonl` file (spec §6 "Manifest layout").
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PartRecord {
    key: String,
    physical_key: String,
    content_length: u64,
    last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(rename = "type")]
    object_type: ObjectType,
}

/// In-memory record: the caller-visible `ObjectMetadata` plus the
/// physical key it's actually stored under.
#[derive(Debug, Clone)]
struct ManifestEntry {
    metadata: ObjectMetadata,
    physical_key: String,
}

impl From<&PartRecord> for ManifestEntry {
    fn from(rec: &PartRecord) -> Self {
        ManifestEntry {
            metadata: ObjectMetadata {
                key: rec.key.clone(),
                content_length: rec.content_length,
                last_modified: rec.last_modified,
                etag: rec.etag.clone(),
                object_type: rec.object_type,
                storage_class: None,
                extra: None,
            },
            physical_key: rec.physical_key.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct PendingChanges {
    /// Staged adds, keyed by logical path, carrying the physical key the
    /// caller actually wrote the bytes to — never re-minted at commit.
    adds: BTreeMap<String, (ObjectMetadata, String)>,
    removes: std::collections::BTreeSet<String>,
}

/// The manifest metadata provider (spec §4.2).
pub struct ManifestMetadataProvider {
    provider: std::sync::Arc<dyn StorageProvider>,
    manifest_base: String,
    writable: bool,
    entries: parking_lot::RwLock<BTreeMap<String, ManifestEntry>>,
    pending: Mutex<PendingChanges>,
    current_timestamp: Mutex<Option<String>>,
}

impl ManifestMetadataProvider {
    /// Loads the provider: lists manifest timestamps under
    /// `manifest_base`, picks the lexicographically greatest one with a
    /// readable `main.json`, and streams its part files in sequence order
    /// (spec §4.2 "Loading"). A manifest directory that disappears
    /// mid-list (superseded by a newer writer) is skipped, not an error.
    pub async fn load(
        provider: std::sync::Arc<dyn StorageProvider>,
        manifest_base: impl Into<String>,
        writable: bool,
    ) -> Result<Self> {
        let manifest_base = manifest_base.into();
        let timestamps = Self::list_timestamps(&provider, &manifest_base).await?;

        let mut entries = BTreeMap::new();
        let mut loaded_timestamp = None;
        for ts in timestamps.into_iter().rev() {
            match Self::try_load_timestamp(&provider, &manifest_base, &ts).await {
                Ok(loaded) => {
                    entries = loaded;
                    loaded_timestamp = Some(ts);
                    break;
                }
                Err(StorageError::NotFound(_)) => {
                    debug!(timestamp = %ts, "manifest superseded mid-list, trying next candidate");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(ManifestMetadataProvider {
            provider,
            manifest_base,
            writable,
            entries: parking_lot::RwLock::new(entries),
            pending: Mutex::new(PendingChanges::default()),
            current_timestamp: Mutex::new(loaded_timestamp),
        })
    }

    async fn list_timestamps(provider: &std::sync::Arc<dyn StorageProvider>, manifest_base: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", manifest_base.trim_end_matches('/'));
        let mut stream = provider.list(
            &prefix,
            ListOptions {
                include_directories: true,
                ..Default::default()
            },
        );
        let mut timestamps = Vec::new();
        while let Some(item) = stream.next().await {
            let meta = item?;
            if meta.is_directory() {
                if let Some(name) = meta.key.trim_end_matches('/').rsplit('/').next() {
                    timestamps.push(name.to_string());
                }
            }
        }
        timestamps.sort();
        Ok(timestamps)
    }

    async fn try_load_timestamp(
        provider: &std::sync::Arc<dyn StorageProvider>,
        manifest_base: &str,
        timestamp: &str,
    ) -> Result<BTreeMap<String, ManifestEntry>> {
        let index_path = full_path(&format!("{manifest_base}/{timestamp}"), MANIFEST_INDEX_FILENAME);
        let index_bytes = provider.get(&index_path, None).await?;
        let index: MainIndex =
            serde_json::from_slice(&index_bytes).map_err(|e| StorageError::Other(Box::new(e)))?;

        let mut entries = BTreeMap::new();
        for part_path in &index.parts {
            let full = full_path(&format!("{manifest_base}/{timestamp}"), part_path);
            let bytes = provider.get(&full, None).await?;
            for line in bytes.split(|&b| b == b'\n') {
                if line.is_empty() {
                    continue;
                }
                let record: PartRecord =
                    serde_json::from_slice(line).map_err(|e| StorageError::Other(Box::new(e)))?;
                entries.insert(record.key.clone(), ManifestEntry::from(&record));
            }
        }
        Ok(entries)
    }

    /// Resolves `path` to its physical key, minting a fresh UUID-based
    /// one for paths with no live entry (spec §4.2 "realpath"). Physical
    /// keys never encode the logical path so a rename is a pure metadata
    /// operation.
    pub async fn realpath_inner(&self, path: &str) -> Result<(String, bool)> {
        if let Some(entry) = self.entries.read().get(path) {
            return Ok((entry.physical_key.clone(), true));
        }
        Ok((Uuid::new_v4().to_string(), false))
    }

    fn live_entries(&self) -> Vec<ObjectMetadata> {
        self.entries.read().values().map(|e| e.metadata.clone()).collect()
    }

    /// Builds the post-commit entry map by applying pending adds/removes
    /// over the currently loaded entries, without mutating `self.entries`.
    fn project_pending(&self, pending: &PendingChanges) -> BTreeMap<String, ManifestEntry> {
        let mut next = self.entries.read().clone();
        for key in &pending.removes {
            next.remove(key);
        }
        for (key, (metadata, physical_key)) in &pending.adds {
            // A path re-added after being staged for removal in the same
            // batch wins (matches "add after remove" last-writer intent).
            // The physical key is always the one the caller actually wrote
            // to — it came in with the add, never re-minted here.
            next.insert(
                key.clone(),
                ManifestEntry {
                    metadata: metadata.clone(),
                    physical_key: physical_key.clone(),
                },
            );
        }
        next
    }
}

#[async_trait]
impl MetadataProvider for ManifestMetadataProvider {
    fn list<'a>(&'a self, prefix: &str, options: ListOptions) -> MetadataListStream<'a> {
        let mut items: Vec<Result<ObjectMetadata>> = self
            .live_entries()
            .into_iter()
            .filter(|m| m.key.starts_with(prefix))
            .filter(|m| {
                let after_ok = options.start_after.as_ref().map(|s| m.key.as_str() > s.as_str()).unwrap_or(true);
                let before_ok = options.end_at.as_ref().map(|e| m.key.as_str() <= e.as_str()).unwrap_or(true);
                after_ok && before_ok
            })
            .map(Ok)
            .collect();

        if options.include_directories {
            // Synthesize directory entries at one level below `prefix`
            // using `/` as the separator (spec §9 open question).
            let mut dirs = std::collections::BTreeSet::new();
            for m in self.live_entries() {
                if let Some(rest) = m.key.strip_prefix(prefix) {
                    if let Some(slash) = rest.find('/') {
                        dirs.insert(format!("{prefix}{}", &rest[..=slash]));
                    }
                }
            }
            for dir in dirs {
                items.push(Ok(ObjectMetadata::directory(dir, Utc::now())));
            }
            items.sort_by(|a, b| match (a, b) {
                (Ok(a), Ok(b)) => a.key.cmp(&b.key),
                _ => std::cmp::Ordering::Equal,
            });
        }

        stream::iter(items).boxed()
    }

    async fn info(&self, path: &str) -> Result<ObjectMetadata> {
        self.entries
            .read()
            .get(path)
            .map(|e| e.metadata.clone())
            .ok_or_else(|| StorageError::not_found(path))
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let compiled = glob::compile(pattern).map_err(|e| StorageError::InvalidArgument(e.to_string()))?;
        Ok(self
            .live_entries()
            .into_iter()
            .map(|m| m.key)
            .filter(|key| compiled.is_match(key))
            .collect())
    }

    async fn realpath(&self, path: &str) -> Result<(String, bool)> {
        self.realpath_inner(path).await
    }

    async fn add_file(&self, path: &str, metadata: ObjectMetadata, physical_key: String) -> Result<()> {
        if !self.writable {
            return Err(StorageError::RuntimeError("manifest provider is read-only".into()));
        }
        let mut pending = self.pending.lock();
        pending.removes.remove(path);
        pending.adds.insert(path.to_string(), (metadata, physical_key));
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        if !self.writable {
            return Err(StorageError::RuntimeError("manifest provider is read-only".into()));
        }
        let mut pending = self.pending.lock();
        pending.adds.remove(path);
        pending.removes.insert(path.to_string());
        Ok(())
    }

    async fn commit_updates(&self) -> Result<()> {
        if !self.writable {
            return Err(StorageError::RuntimeError("manifest provider is read-only".into()));
        }

        let pending = {
            let mut guard = self.pending.lock();
            std::mem::take(&mut *guard)
        };
        if pending.adds.is_empty() && pending.removes.is_empty() {
            return Ok(());
        }

        let previous = self.entries.read().clone();
        let next = self.project_pending(&pending);

        // Physical keys referenced by the committed map (refcount >= 1
        // survive; any removed logical entry whose physical key hits zero
        // is actually deleted from the backend (spec §9 open question).
        let mut refcounts: BTreeMap<&str, u32> = BTreeMap::new();
        for entry in next.values() {
            *refcounts.entry(entry.physical_key.as_str()).or_insert(0) += 1;
        }
        for removed_key in &pending.removes {
            if let Some(entry) = previous.get(removed_key) {
                if !refcounts.contains_key(entry.physical_key.as_str()) {
                    if let Err(err) = self.provider.delete(&entry.physical_key).await {
                        warn!(physical_key = %entry.physical_key, "failed to delete orphaned physical object: {err}");
                    }
                }
            }
        }

        let timestamp = self.allocate_timestamp().await?;
        self.write_manifest(&timestamp, &next).await?;

        *self.entries.write() = next;
        *self.current_timestamp.lock() = Some(timestamp);
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

impl ManifestMetadataProvider {
    /// Computes a new second-precision UTC timestamp; bumps by one second
    /// if it collides with an existing manifest directory (spec §4.2
    /// "Commit algorithm" step 1).
    async fn allocate_timestamp(&self) -> Result<String> {
        let mut candidate = Utc::now();
        loop {
            let formatted = candidate.to_rfc3339_opts(SecondsFormat::Secs, true);
            let exists = self
                .provider
                .head(&full_path(&self.manifest_base, &format!("{formatted}/{MANIFEST_INDEX_FILENAME}")))
                .await;
            match exists {
                Err(StorageError::NotFound(_)) => return Ok(formatted),
                Ok(_) => {
                    candidate += chrono::Duration::seconds(1);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Writes `parts/part_<seq>.jsonl` objects, then `main.json` last so
    /// its presence defines commit completion (spec §4.2 "Commit
    /// algorithm" steps 3-5).
    async fn write_manifest(&self, timestamp: &str, entries: &BTreeMap<String, ManifestEntry>) -> Result<()> {
        let manifest_dir = format!("{}/{timestamp}", self.manifest_base);
        let mut part_paths = Vec::new();
        let mut seq = 0u32;
        let mut current = Vec::new();
        let mut current_bytes = 0usize;

        for (key, entry) in entries {
            let record = PartRecord {
                key: key.clone(),
                physical_key: entry.physical_key.clone(),
                content_length: entry.metadata.content_length,
                last_modified: entry.metadata.last_modified,
                etag: entry.metadata.etag.clone(),
                object_type: entry.metadata.object_type,
            };
            let mut line = serde_json::to_vec(&record).map_err(|e| StorageError::Other(Box::new(e)))?;
            line.push(b'\n');
            current_bytes += line.len();
            current.push(line);

            if current.len() >= DEFAULT_PART_MAX_ENTRIES || current_bytes >= DEFAULT_PART_MAX_BYTES {
                let part_path = self.flush_part(&manifest_dir, seq, &mut current).await?;
                part_paths.push(part_path);
                current_bytes = 0;
                seq += 1;
            }
        }
        if !current.is_empty() || part_paths.is_empty() {
            let part_path = self.flush_part(&manifest_dir, seq, &mut current).await?;
            part_paths.push(part_path);
        }

        let index = MainIndex {
            parts: part_paths,
            version: 1,
            created_at: Utc::now(),
        };
        let index_bytes = Bytes::from(serde_json::to_vec(&index).map_err(|e| StorageError::Other(Box::new(e)))?);
        self.provider
            .put(
                &full_path(&manifest_dir, MANIFEST_INDEX_FILENAME),
                PutBody::Bytes(index_bytes),
                PutOptions::default(),
            )
            .await?;
        Ok(())
    }

    async fn flush_part(&self, manifest_dir: &str, seq: u32, buf: &mut Vec<Vec<u8>>) -> Result<String> {
        let relative = format!("{MANIFEST_PARTS_CHILD_DIR}/{MANIFEST_PART_PREFIX}{:0width$}{MANIFEST_PART_SUFFIX}", seq, width = SEQUENCE_PADDING);
        let mut bytes = Vec::new();
        for line in buf.drain(..) {
            bytes.extend_from_slice(&line);
        }
        self.provider
            .put(
                &full_path(manifest_dir, &relative),
                PutBody::Bytes(Bytes::from(bytes)),
                PutOptions::default(),
            )
            .await?;
        Ok(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::file::FileConfig;
    use std::sync::Arc;

    fn file_provider(dir: &std::path::Path) -> Arc<dyn StorageProvider> {
        Arc::new(
            FileConfig {
                base_path: dir.to_string_lossy().to_string(),
                multipart_threshold: crate::provider::DEFAULT_MULTIPART_THRESHOLD,
            }
            .build()
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn add_commit_then_info_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let provider = file_provider(dir.path());
        let manifest = ManifestMetadataProvider::load(Arc::clone(&provider), DEFAULT_MANIFEST_BASE_DIR, true)
            .await
            .unwrap();

        let meta = ObjectMetadata::file("file1.txt", 10, Utc::now());
        let (physical_key, _) = manifest.realpath_inner("file1.txt").await.unwrap();
        manifest.add_file("file1.txt", meta.clone(), physical_key).await.unwrap();
        manifest.commit_updates().await.unwrap();

        let info = manifest.info("file1.txt").await.unwrap();
        assert_eq!(info.key, "file1.txt");
        assert_eq!(info.content_length, 10);
    }

    #[tokio::test]
    async fn a_new_provider_instance_reads_back_identical_listing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = file_provider(dir.path());
        let writer = ManifestMetadataProvider::load(Arc::clone(&provider), DEFAULT_MANIFEST_BASE_DIR, true)
            .await
            .unwrap();
        let (physical1, _) = writer.realpath_inner("file1.txt").await.unwrap();
        writer
            .add_file("file1.txt", ObjectMetadata::file("file1.txt", 10, Utc::now()), physical1)
            .await
            .unwrap();
        let (physical2, _) = writer.realpath_inner("dir1/file2.txt").await.unwrap();
        writer
            .add_file("dir1/file2.txt", ObjectMetadata::file("dir1/file2.txt", 20, Utc::now()), physical2)
            .await
            .unwrap();
        writer.commit_updates().await.unwrap();

        let reader = ManifestMetadataProvider::load(Arc::clone(&provider), DEFAULT_MANIFEST_BASE_DIR, false)
            .await
            .unwrap();
        let mut keys: Vec<String> = reader.live_entries().into_iter().map(|m| m.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["dir1/file2.txt".to_string(), "file1.txt".to_string()]);
    }

    #[tokio::test]
    async fn remove_then_commit_deletes_unreferenced_physical_object() {
        let dir = tempfile::tempdir().unwrap();
        let provider = file_provider(dir.path());
        let manifest = ManifestMetadataProvider::load(Arc::clone(&provider), DEFAULT_MANIFEST_BASE_DIR, true)
            .await
            .unwrap();

        let (physical_key, _) = manifest.realpath_inner("file1.txt").await.unwrap();
        provider
            .put(&physical_key, PutBody::Bytes(Bytes::from_static(b"hello")), PutOptions::default())
            .await
            .unwrap();
        manifest
            .add_file("file1.txt", ObjectMetadata::file("file1.txt", 5, Utc::now()), physical_key.clone())
            .await
            .unwrap();
        manifest.commit_updates().await.unwrap();

        manifest.remove_file("file1.txt").await.unwrap();
        manifest.commit_updates().await.unwrap();

        assert!(manifest.info("file1.txt").await.is_err());
        assert!(provider.head(&physical_key).await.is_err());
    }

    #[tokio::test]
    async fn glob_matches_live_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let provider = file_provider(dir.path());
        let manifest = ManifestMetadataProvider::load(Arc::clone(&provider), DEFAULT_MANIFEST_BASE_DIR, true)
            .await
            .unwrap();
        let (physical1, _) = manifest.realpath_inner("x/data-0.bin").await.unwrap();
        manifest
            .add_file("x/data-0.bin", ObjectMetadata::file("x/data-0.bin", 1, Utc::now()), physical1)
            .await
            .unwrap();
        let (physical2, _) = manifest.realpath_inner("x/readme.md").await.unwrap();
        manifest
            .add_file("x/readme.md", ObjectMetadata::file("x/readme.md", 1, Utc::now()), physical2)
            .await
            .unwrap();
        manifest.commit_updates().await.unwrap();

        let matches = manifest.glob("x/**/*.bin").await.unwrap();
        assert_eq!(matches, vec!["x/data-0.bin".to_string()]);
    }
}
