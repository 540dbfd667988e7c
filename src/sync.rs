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

//! Cross-profile sync engine (spec §4.5 "Sync").
//!
//! Mirrors a source prefix onto a target prefix, each possibly living on a
//! different profile (and therefore a different backend). Grounded on the
//! client facade's own `copy`/`read`/`write`/`delete` rather than a
//! dedicated teacher file — no file in the retrieval pack syncs across two
//! arbitrary backends, so this follows spec §4.5 "Sync" directly, reusing
//! the facade operations the way `client.rs`'s `copy` reuses `read`+`write`
//! when no server-side copy is available.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::stream::StreamExt;
use tracing::warn;

use crate::client::StorageClient;
use crate::config::StorageClientConfig;
use crate::error::{Result, StorageError};
use crate::resolver::resolve_storage_client;
use crate::types::ListOptions;

/// What a `sync` actually did, entry by entry (logical target keys).
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
    pub deleted: Vec<String>,
}

/// Per-entry failures collected during a sync (spec §4.5 "Failures per
/// entry are aggregated and re-raised at end unless `continue_on_error`
/// is set").
#[derive(Debug)]
pub struct SyncErrors(pub Vec<(String, StorageError)>);

impl fmt::Display for SyncErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} entries failed to sync", self.0.len())?;
        for (key, err) in &self.0 {
            write!(f, "\n  {key}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncErrors {}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Remove target entries that have no counterpart in the source
    /// listing (spec §4.5 "`delete_unmatched=true`").
    pub delete_unmatched: bool,
    /// When set, per-entry failures are logged and swallowed instead of
    /// being re-raised as an aggregate error at the end.
    pub continue_on_error: bool,
}

/// Syncs `source_uri` onto `target_uri`, resolving both through `config`
/// (spec §4.5 "Sync"). Copies entries whose target is missing, has a
/// different size, or (where an etag is available) a different etag;
/// deletions, when requested, always run last.
pub async fn sync(
    source_uri: &str,
    target_uri: &str,
    options: SyncOptions,
    config: &StorageClientConfig,
) -> Result<SyncStats> {
    let (src_client, src_path) = resolve_storage_client(source_uri, config).await?;
    let (tgt_client, tgt_path) = resolve_storage_client(target_uri, config).await?;

    check_no_overlap(&src_client, &src_path, &tgt_client, &tgt_path)?;

    let src_prefix = normalize_prefix(&src_path);
    let tgt_prefix = normalize_prefix(&tgt_path);
    let same_client = Arc::ptr_eq(&src_client, &tgt_client);

    let mut stats = SyncStats::default();
    let mut errors = Vec::new();
    let mut source_suffixes = BTreeSet::new();

    let mut listing = src_client.list(&src_prefix, ListOptions::default());
    while let Some(item) = listing.next().await {
        let meta = match item {
            Ok(meta) => meta,
            Err(err) => {
                errors.push((src_prefix.clone(), err));
                continue;
            }
        };
        if meta.is_directory() {
            continue;
        }

        let suffix = suffix_of(&meta.key, &src_prefix);
        source_suffixes.insert(suffix.clone());
        let target_key = crate::utils::join_paths(&tgt_prefix, &suffix);

        let needs_copy = match tgt_client.info(&target_key).await {
            Ok(existing) => {
                existing.content_length != meta.content_length
                    || (meta.etag.is_some() && existing.etag != meta.etag)
            }
            Err(StorageError::NotFound(_)) => true,
            Err(err) => {
                errors.push((target_key, err));
                continue;
            }
        };

        if !needs_copy {
            stats.skipped.push(target_key);
            continue;
        }

        let result = if same_client {
            src_client.copy(&meta.key, &target_key).await
        } else {
            match src_client.read(&meta.key).await {
                Ok(bytes) => tgt_client.write(&target_key, bytes).await.map(|_| ()),
                Err(err) => Err(err),
            }
        };

        match result {
            Ok(()) => stats.copied.push(target_key),
            Err(err) => errors.push((target_key, err)),
        }
    }

    if options.delete_unmatched {
        let mut to_delete = Vec::new();
        let mut listing = tgt_client.list(&tgt_prefix, ListOptions::default());
        while let Some(item) = listing.next().await {
            let meta = match item {
                Ok(meta) => meta,
                Err(err) => {
                    errors.push((tgt_prefix.clone(), err));
                    continue;
                }
            };
            if meta.is_directory() {
                continue;
            }
            let suffix = suffix_of(&meta.key, &tgt_prefix);
            if !source_suffixes.contains(&suffix) {
                to_delete.push(meta.key);
            }
        }

        for key in to_delete {
            match tgt_client.delete(&key).await {
                Ok(()) => stats.deleted.push(key),
                Err(err) => errors.push((key, err)),
            }
        }
    }

    if errors.is_empty() {
        return Ok(stats);
    }
    if options.continue_on_error {
        for (key, err) in &errors {
            warn!(key = %key, error = %err, "sync: continuing past entry failure");
        }
        return Ok(stats);
    }
    Err(StorageError::other(SyncErrors(errors)))
}

fn suffix_of(key: &str, prefix: &str) -> String {
    key.strip_prefix(prefix)
        .unwrap_or(key)
        .trim_start_matches('/')
        .to_string()
}

fn normalize_prefix(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Rejects a sync whose source and target are the same path, or one a
/// prefix of the other, within a single profile — before any I/O (spec
/// §4.5 "equal URIs or target prefix-of-source are rejected with
/// `ValueError`").
fn check_no_overlap(
    src_client: &Arc<StorageClient>,
    src_path: &str,
    tgt_client: &Arc<StorageClient>,
    tgt_path: &str,
) -> Result<()> {
    if !Arc::ptr_eq(src_client, tgt_client) {
        return Ok(());
    }
    let src = normalize_prefix(src_path);
    let tgt = normalize_prefix(tgt_path);
    if is_prefix_of(&src, &tgt) || is_prefix_of(&tgt, &src) {
        return Err(StorageError::InvalidArgument(format!(
            "sync source `{src}` and target `{tgt}` overlap within the same profile"
        )));
    }
    Ok(())
}

fn is_prefix_of(a: &str, b: &str) -> bool {
    a.is_empty() || b == a || b.starts_with(&format!("{a}/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    async fn config_with_two_profiles(src_dir: &std::path::Path, dst_dir: &std::path::Path) -> StorageClientConfig {
        StorageClientConfig::from_value(json!({
            "profiles": {
                "src": {"storage_provider": {"type": "file", "options": {"base_path": src_dir.to_string_lossy()}}},
                "dst": {"storage_provider": {"type": "file", "options": {"base_path": dst_dir.to_string_lossy()}}}
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn copies_missing_entries_and_skips_unchanged_on_rerun() {
        crate::resolver::reset_registry_for_test();
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let config = config_with_two_profiles(src_dir.path(), dst_dir.path()).await;

        let (src_client, _) = resolve_storage_client("msc://src/", &config).await.unwrap();
        src_client.write("a.bin", Bytes::from_static(b"hello")).await.unwrap();
        src_client.write("dir/b.bin", Bytes::from_static(b"world")).await.unwrap();

        let stats = sync("msc://src/", "msc://dst/", SyncOptions::default(), &config)
            .await
            .unwrap();
        assert_eq!(stats.copied.len(), 2);
        assert_eq!(stats.skipped.len(), 0);

        let stats = sync("msc://src/", "msc://dst/", SyncOptions::default(), &config)
            .await
            .unwrap();
        assert_eq!(stats.copied.len(), 0);
        assert_eq!(stats.skipped.len(), 2);
    }

    #[tokio::test]
    async fn re_copies_when_size_changes_even_if_etag_unavailable() {
        crate::resolver::reset_registry_for_test();
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let config = config_with_two_profiles(src_dir.path(), dst_dir.path()).await;

        let (src_client, _) = resolve_storage_client("msc://src/", &config).await.unwrap();
        src_client.write("a.bin", Bytes::from_static(b"hello")).await.unwrap();
        sync("msc://src/", "msc://dst/", SyncOptions::default(), &config)
            .await
            .unwrap();

        src_client.write("a.bin", Bytes::from_static(b"hello world")).await.unwrap();
        let stats = sync("msc://src/", "msc://dst/", SyncOptions::default(), &config)
            .await
            .unwrap();
        assert_eq!(stats.copied, vec!["a.bin".to_string()]);
    }

    #[tokio::test]
    async fn delete_unmatched_removes_targets_absent_from_source() {
        crate::resolver::reset_registry_for_test();
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let config = config_with_two_profiles(src_dir.path(), dst_dir.path()).await;

        let (src_client, _) = resolve_storage_client("msc://src/", &config).await.unwrap();
        let (dst_client, _) = resolve_storage_client("msc://dst/", &config).await.unwrap();
        src_client.write("keep.bin", Bytes::from_static(b"keep")).await.unwrap();
        dst_client.write("stale.bin", Bytes::from_static(b"stale")).await.unwrap();

        let options = SyncOptions { delete_unmatched: true, ..Default::default() };
        let stats = sync("msc://src/", "msc://dst/", options, &config).await.unwrap();
        assert_eq!(stats.deleted, vec!["stale.bin".to_string()]);
        assert!(dst_client.is_file("keep.bin").await.unwrap());
        assert!(!dst_client.is_file("stale.bin").await.unwrap());
    }

    #[tokio::test]
    async fn overlapping_prefixes_within_one_profile_are_rejected_before_any_io() {
        crate::resolver::reset_registry_for_test();
        let dir = tempfile::tempdir().unwrap();
        let config = StorageClientConfig::from_value(json!({
            "profiles": {
                "p": {"storage_provider": {"type": "file", "options": {"base_path": dir.path().to_string_lossy()}}}
            }
        }))
        .unwrap();

        let err = sync("msc://p/a", "msc://p/a/b", SyncOptions::default(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        let err = sync("msc://p/a", "msc://p/a", SyncOptions::default(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }
}
