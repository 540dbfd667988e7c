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

//! URI parsing and the process-global instance registry (spec §4.6).
//!
//! Grounded on `parseable`'s `ALERTS: Lazy<Alerts>` global in
//! `src/alerts/mod.rs` (a `once_cell::sync::Lazy` guarding shared state
//! behind a single lock): here a `Lazy<DashMap<...>>` gives read-mostly
//! concurrent lookups once a profile's client exists, and a separate
//! `Lazy<tokio::sync::Mutex<()>>` serializes first-use construction
//! across the whole map.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use relative_path::RelativePath;

use crate::client::StorageClient;
use crate::config::StorageClientConfig;
use crate::error::{Result, StorageError};

const DEFAULT_PROFILE: &str = "default";

/// Instances already built, keyed by profile name. Read-mostly: once a
/// profile's client exists, subsequent lookups never touch the creation
/// lock (spec §4.6 "concurrent callers for the same profile receive the
/// SAME instance").
static INSTANCES: Lazy<DashMap<String, Arc<StorageClient>>> = Lazy::new(DashMap::new);

/// Serializes first-use construction across the whole map (spec §4.6
/// "Instance creation is serialized by a single lock covering the map").
/// A `tokio::sync::Mutex` rather than `parking_lot`'s: the guard is held
/// across the `await` points in [`StorageClientConfig::assemble`].
static CREATION_LOCK: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Parses a `msc://<profile>/<path>` URI, a `file://` URI, or a bare
/// absolute path into `(profile_name, backend_path)` (spec §4.6, §6 "URI
/// form"). Relative paths and unrecognized schemes are a `ValueError`.
pub fn parse_uri(uri: &str) -> Result<(String, String)> {
    if let Some(rest) = uri.strip_prefix("msc://") {
        let (profile, path) = rest.split_once('/').unwrap_or((rest, ""));
        if profile.is_empty() {
            return Err(StorageError::InvalidArgument(format!("`{uri}` is missing a profile name")));
        }
        return Ok((profile.to_string(), normalize_path(path)));
    }

    if let Some(rest) = uri.strip_prefix("file://") {
        let path = rest.trim_start_matches('/');
        return Ok((DEFAULT_PROFILE.to_string(), normalize_path(path)));
    }

    if let Some(path) = uri.strip_prefix('/') {
        return Ok((DEFAULT_PROFILE.to_string(), normalize_path(path)));
    }

    Err(StorageError::InvalidArgument(format!(
        "`{uri}` is neither an `msc://` URI, a `file://` URI, nor an absolute path"
    )))
}

/// Resolves `.`/`..` segments in a logical path the same way a POSIX
/// shell would, without ever escaping above the profile root: leading
/// `..` components (nothing left to pop) are dropped rather than kept,
/// since a backend-relative key can't reach outside its profile.
fn normalize_path(path: &str) -> String {
    RelativePath::new(path)
        .normalize()
        .as_str()
        .trim_start_matches("../")
        .trim_start_matches("..")
        .to_string()
}

/// Resolves `uri` to `(client, backend_path)`, building and registering
/// the profile's client on first use (spec §4.6).
///
/// `config` supplies the profile definitions used to build a client the
/// first time a given profile is requested; it is ignored for profiles
/// already present in the registry.
pub async fn resolve_storage_client(
    uri: &str,
    config: &StorageClientConfig,
) -> Result<(Arc<StorageClient>, String)> {
    let (profile, path) = parse_uri(uri)?;

    if let Some(existing) = INSTANCES.get(&profile) {
        return Ok((Arc::clone(&existing), path));
    }

    let client = get_or_create(&profile, config).await?;
    Ok((client, path))
}

/// Returns the already-registered client for `profile`, or builds and
/// registers one via `config` under the creation lock.
pub async fn get_or_create(profile: &str, config: &StorageClientConfig) -> Result<Arc<StorageClient>> {
    if let Some(existing) = INSTANCES.get(profile) {
        return Ok(Arc::clone(&existing));
    }

    let _guard = CREATION_LOCK.lock().await;

    // Another caller may have built this profile's client while we were
    // waiting for the lock.
    if let Some(existing) = INSTANCES.get(profile) {
        return Ok(Arc::clone(&existing));
    }

    let assembled = config.assemble(profile).await?;
    let client = StorageClient::new(profile, assembled.provider, assembled.metadata_provider, assembled.cache);
    INSTANCES.insert(profile.to_string(), Arc::clone(&client));
    Ok(client)
}

/// Test-only: clears the registry so profile-identity tests don't leak
/// state across `#[tokio::test]` functions in the same process.
#[cfg(test)]
pub fn reset_registry_for_test() {
    INSTANCES.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_msc_uri() {
        let (profile, path) = parse_uri("msc://p/x/data-0.bin").unwrap();
        assert_eq!(profile, "p");
        assert_eq!(path, "x/data-0.bin");
    }

    #[test]
    fn parses_msc_uri_with_empty_path() {
        let (profile, path) = parse_uri("msc://p").unwrap();
        assert_eq!(profile, "p");
        assert_eq!(path, "");
    }

    #[test]
    fn bare_absolute_path_maps_to_default_profile() {
        let (profile, path) = parse_uri("/tmp/data.bin").unwrap();
        assert_eq!(profile, "default");
        assert_eq!(path, "tmp/data.bin");
    }

    #[test]
    fn relative_path_is_rejected() {
        assert!(parse_uri("relative/path").is_err());
    }

    #[test]
    fn dot_segments_are_normalized_out_of_the_backend_path() {
        let (_, path) = parse_uri("msc://p/a/./b/../c").unwrap();
        assert_eq!(path, "a/c");
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(parse_uri("s3://bucket/key").is_err());
    }

    #[tokio::test]
    async fn concurrent_resolution_returns_the_same_instance() {
        reset_registry_for_test();
        let dir = tempfile::tempdir().unwrap();
        let json = format!(
            r#"{{"profiles": {{"p": {{"storage_provider": {{"type": "file", "options": {{"base_path": "{}"}}}}}}}}}}"#,
            dir.path().to_string_lossy().replace('\\', "\\\\")
        );
        let config = Arc::new(StorageClientConfig::from_json(&json).unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let config = Arc::clone(&config);
            handles.push(tokio::spawn(async move {
                resolve_storage_client("msc://p/a.bin", &config).await.unwrap().0
            }));
        }
        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }
        for client in &clients[1..] {
            assert!(Arc::ptr_eq(&clients[0], client));
        }
    }
}
