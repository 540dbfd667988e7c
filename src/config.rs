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

//! Configuration loading and profile assembly (spec §6).
//!
//! Accepts an already-read YAML/JSON string or `serde_json::Value`; per
//! spec §1 Non-goals the crate never touches argv or a config file path
//! itself (that belongs to the external CLI collaborator).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{Cache, CacheConfig, EvictionPolicy};
use crate::credentials::{CredentialsProvider, StaticCredentialsProvider};
use crate::error::{ConfigError, Result, StorageError};
use crate::hint::{DistributedHint, HintConfig};
use crate::metadata::manifest::{ManifestMetadataProvider, DEFAULT_MANIFEST_BASE_DIR};
use crate::metadata::MetadataProvider;
use crate::provider::ais::AisConfig;
use crate::provider::azure::AzureConfig;
use crate::provider::file::FileConfig;
use crate::provider::ftp::FtpConfig;
use crate::provider::gcs::GcsConfig;
use crate::provider::oci::OciConfig;
use crate::provider::s3::S3Config;
use crate::provider::swiftstack::SwiftStackConfig;
use crate::provider::StorageProvider;
use crate::types::Credentials;

/// Raw `storage_provider: { type, options }` shape (spec §6).
#[derive(Debug, Deserialize)]
struct ProviderRef {
    #[serde(rename = "type")]
    backend: String,
    #[serde(default)]
    options: Value,
}

/// Raw `metadata_provider: { type, options }` shape (spec §6). Today the
/// only recognized `type` is `"manifest"`.
#[derive(Debug, Deserialize)]
struct MetadataProviderRef {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    options: Value,
}

/// Raw `credentials_provider: { type, options }` shape (spec §3). Today
/// the only recognized `type` is `"static"`, for a profile that embeds a
/// fixed access/secret pair rather than delegating to an external
/// collaborator (instance-metadata fetcher, STS assume-role flow, ...) —
/// those remain out of scope per spec §1 Non-goals.
#[derive(Debug, Deserialize)]
struct CredentialsProviderRef {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    options: Value,
}

#[derive(Debug, Deserialize)]
struct StaticCredentialsOptions {
    access_key_id: String,
    secret_key: String,
    #[serde(default)]
    session_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestOptions {
    #[serde(default = "default_manifest_path")]
    manifest_path: String,
}

fn default_manifest_path() -> String {
    DEFAULT_MANIFEST_BASE_DIR.to_string()
}

/// Raw `profiles.<name>` shape (spec §6).
#[derive(Debug, Deserialize)]
struct ProfileRef {
    storage_provider: Option<ProviderRef>,
    /// Reserved, not-yet-implemented alternate config shape (spec §6
    /// "provider_bundle"). Accepting one without `storage_provider` is
    /// always a config error.
    provider_bundle: Option<Value>,
    credentials_provider: Option<CredentialsProviderRef>,
    metadata_provider: Option<MetadataProviderRef>,
}

#[derive(Debug, Deserialize)]
struct EvictionPolicyRef {
    policy: EvictionPolicy,
    /// Accepts human-readable durations ("5m", "300s") the way the rest of
    /// the config document does, rather than a bare count of seconds.
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    refresh_interval: Duration,
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(300)
}

#[derive(Debug, Deserialize)]
struct CacheBackendRef {
    cache_path: PathBuf,
    #[serde(default)]
    storage_provider_profile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CacheRef {
    size: String,
    #[serde(default)]
    use_etag: bool,
    eviction_policy: EvictionPolicyRef,
    cache_backend: CacheBackendRef,
}

/// Root config document shape (spec §6). `opentelemetry` is accepted and
/// ignored — an external collaborator's concern per spec §1 Non-goals.
#[derive(Debug, Deserialize)]
struct ConfigDocument {
    profiles: HashMap<String, ProfileRef>,
    #[serde(default)]
    cache: Option<CacheRef>,
    #[serde(default)]
    #[allow(dead_code)]
    opentelemetry: Option<Value>,
}

/// One fully assembled profile: a live storage provider, optional
/// metadata provider, optional cache, and optional distributed hint used
/// to coordinate the cache's maintenance sweeps (spec §3 "Profile").
pub struct AssembledProfile {
    pub provider: Arc<dyn StorageProvider>,
    pub metadata_provider: Option<Arc<dyn MetadataProvider>>,
    pub cache: Option<Arc<Cache>>,
    pub credentials_provider: Option<Arc<dyn CredentialsProvider>>,
}

/// A parsed, validated configuration ready to assemble [`AssembledProfile`]s.
///
/// Validation happens entirely in [`StorageClientConfig::from_value`],
/// before any I/O (spec §6 "Validator MUST reject").
pub struct StorageClientConfig {
    document: ConfigDocument,
}

impl StorageClientConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(ConfigError::Json)?;
        Self::from_value(value)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text).map_err(ConfigError::Yaml)?;
        Self::from_value(value)
    }

    /// Validates and assembles a config from an already-parsed document
    /// (spec §6 "Validator MUST reject" list).
    pub fn from_value(value: Value) -> Result<Self> {
        let expanded = crate::utils::expand_env_vars(&value)?;

        let Some(profiles_value) = expanded.get("profiles") else {
            return Err(StorageError::Config(ConfigError::MissingProfiles));
        };
        if !profiles_value.is_object() || profiles_value.as_object().map(|m| m.is_empty()).unwrap_or(true) {
            return Err(StorageError::Config(ConfigError::MissingProfiles));
        }

        if let Some(cache) = expanded.get("cache") {
            if let Some(policy) = cache.get("eviction_policy") {
                if policy.is_string() {
                    return Err(StorageError::Config(ConfigError::BareEvictionPolicyString));
                }
            }
        }

        let document: ConfigDocument =
            serde_json::from_value(expanded).map_err(ConfigError::Json)?;

        for (name, profile) in &document.profiles {
            match (&profile.storage_provider, &profile.provider_bundle) {
                (Some(_), Some(_)) => {
                    return Err(StorageError::Config(ConfigError::ConflictingProviderKeys(name.clone())))
                }
                (None, Some(_)) => {
                    return Err(StorageError::Config(ConfigError::ProviderBundleUnsupported(name.clone())))
                }
                (None, None) => {
                    return Err(StorageError::Config(ConfigError::Invalid(format!(
                        "profile `{name}` has neither `storage_provider` nor `provider_bundle`"
                    ))))
                }
                (Some(_), None) => {}
            }
        }

        Ok(StorageClientConfig { document })
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.document.profiles.keys().map(String::as_str)
    }

    /// Builds the live provider/metadata-provider/cache trio for `profile`
    /// (spec §2 "Data flow", §3 "Profile").
    pub async fn assemble(&self, profile: &str) -> Result<AssembledProfile> {
        let profile_ref = self
            .document
            .profiles
            .get(profile)
            .ok_or_else(|| ConfigError::UnknownProfile(profile.to_string()))?;

        let provider_ref = profile_ref
            .storage_provider
            .as_ref()
            .expect("validated by from_value: storage_provider present when provider_bundle absent");

        let credentials_provider = match &profile_ref.credentials_provider {
            Some(cred_ref) if cred_ref.kind == "static" => {
                let options: StaticCredentialsOptions =
                    serde_json::from_value(cred_ref.options.clone()).map_err(ConfigError::Json)?;
                let provider: Arc<dyn CredentialsProvider> = Arc::new(StaticCredentialsProvider::new(Credentials {
                    access_key: options.access_key_id,
                    secret_key: options.secret_key,
                    token: options.session_token,
                    expiration: None,
                }));
                Some(provider)
            }
            Some(cred_ref) => {
                return Err(StorageError::Config(ConfigError::Invalid(format!(
                    "unknown credentials provider type `{}`",
                    cred_ref.kind
                ))))
            }
            None => None,
        };

        let mut provider_options = provider_ref.options.clone();
        if let Some(creds) = &credentials_provider {
            apply_credentials(&provider_ref.backend, &mut provider_options, &creds.credentials().await?);
        }
        let provider = build_provider(&provider_ref.backend, provider_options)?;

        let metadata_provider: Option<Arc<dyn MetadataProvider>> = match &profile_ref.metadata_provider {
            Some(meta_ref) if meta_ref.kind == "manifest" => {
                let options: ManifestOptions =
                    serde_json::from_value(meta_ref.options.clone()).map_err(ConfigError::Json)?;
                let manifest = ManifestMetadataProvider::load(Arc::clone(&provider), options.manifest_path, true).await?;
                Some(Arc::new(manifest))
            }
            Some(meta_ref) => {
                return Err(StorageError::Config(ConfigError::Invalid(format!(
                    "unknown metadata provider type `{}`",
                    meta_ref.kind
                ))))
            }
            None => None,
        };

        let cache = match &self.document.cache {
            Some(cache_ref) => Some(Arc::new(self.build_cache(profile, cache_ref).await?)),
            None => None,
        };

        Ok(AssembledProfile {
            provider,
            metadata_provider,
            cache,
            credentials_provider,
        })
    }

    async fn build_cache(&self, profile: &str, cache_ref: &CacheRef) -> Result<Cache> {
        let size_limit_bytes = parse_human_size(&cache_ref.size)?;
        let config = CacheConfig {
            size_limit_bytes,
            use_etag: cache_ref.use_etag,
            eviction_policy: cache_ref.eviction_policy.policy,
            refresh_interval: cache_ref.eviction_policy.refresh_interval,
            cache_path: cache_ref.cache_backend.cache_path.clone(),
            storage_provider_profile: cache_ref.cache_backend.storage_provider_profile.clone(),
        };

        let (cache, backing_provider) = match &cache_ref.cache_backend.storage_provider_profile {
            Some(cache_profile) => {
                let profile_ref = self
                    .document
                    .profiles
                    .get(cache_profile)
                    .ok_or_else(|| ConfigError::UnknownProfile(cache_profile.clone()))?;
                let provider_ref = profile_ref
                    .storage_provider
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid(format!("cache profile `{cache_profile}` has no storage_provider")))?;
                let provider = build_provider(&provider_ref.backend, provider_ref.options.clone())?;
                (Cache::new_remote(profile, config, Arc::clone(&provider))?, Some(provider))
            }
            None => (Cache::new_local(profile, config)?, None),
        };

        // A distributed hint over the cache root serializes `refresh_cache`
        // across processes (spec §4.3 "Eviction"); only attach one when the
        // cache's own backing provider supports conditional writes.
        match backing_provider {
            Some(provider) if provider_supports_hints(&provider) => {
                let hint = build_hint(provider, HintConfig::default())?;
                Ok(cache.with_hint(hint))
            }
            _ => Ok(cache),
        }
    }
}

/// The backend registry (spec §9 "Dynamic dispatch": "a table keyed by
/// the `type` string", not reflection on names at runtime).
fn build_provider(backend: &str, options: Value) -> Result<Arc<dyn StorageProvider>> {
    let provider: Arc<dyn StorageProvider> = match backend {
        "file" => {
            let cfg: FileConfig = serde_json::from_value(options).map_err(ConfigError::Json)?;
            Arc::new(cfg.build()?)
        }
        "s3" => {
            let cfg: S3Config = serde_json::from_value(options).map_err(ConfigError::Json)?;
            Arc::new(cfg.build()?)
        }
        "azure" => {
            let cfg: AzureConfig = serde_json::from_value(options).map_err(ConfigError::Json)?;
            Arc::new(cfg.build()?)
        }
        "gcs" => {
            let cfg: GcsConfig = serde_json::from_value(options).map_err(ConfigError::Json)?;
            Arc::new(cfg.build()?)
        }
        "oci" => {
            let cfg: OciConfig = serde_json::from_value(options).map_err(ConfigError::Json)?;
            Arc::new(cfg.build()?)
        }
        "ais" => {
            let cfg: AisConfig = serde_json::from_value(options).map_err(ConfigError::Json)?;
            Arc::new(cfg.build()?)
        }
        "swiftstack" => {
            let cfg: SwiftStackConfig = serde_json::from_value(options).map_err(ConfigError::Json)?;
            Arc::new(cfg.build()?)
        }
        "ftp" => {
            let cfg: FtpConfig = serde_json::from_value(options).map_err(ConfigError::Json)?;
            Arc::new(cfg.build()?)
        }
        other => return Err(StorageError::Config(ConfigError::UnknownBackend(other.to_string()))),
    };
    Ok(provider)
}

/// Fills in a backend's access/secret/token options from a resolved
/// [`Credentials`] wherever the config document left them unset. Only the
/// S3-compatible backends (`s3`, `oci`, `ais`, `swiftstack`) share the
/// `access_key_id`/`secret_key`/`session_token` option shape
/// [`Credentials`] models; `azure`'s SAS/account-key and `gcs`'s
/// service-account-key auth have no equivalent here and are left alone.
fn apply_credentials(backend: &str, options: &mut Value, credentials: &Credentials) {
    if !matches!(backend, "s3" | "oci" | "ais" | "swiftstack") {
        return;
    }
    if options.is_null() {
        *options = Value::Object(serde_json::Map::new());
    }
    let Some(map) = options.as_object_mut() else {
        return;
    };
    map.entry("access_key_id")
        .or_insert_with(|| Value::String(credentials.access_key.clone()));
    map.entry("secret_key")
        .or_insert_with(|| Value::String(credentials.secret_key.clone()));
    if let Some(token) = &credentials.token {
        map.entry("session_token").or_insert_with(|| Value::String(token.clone()));
    }
}

fn provider_supports_hints(provider: &Arc<dyn StorageProvider>) -> bool {
    let caps = provider.conditional_capabilities();
    !matches!(caps.if_none_match_star, crate::provider::ConditionOutcome::Unsupported)
        || !matches!(caps.if_match, crate::provider::ConditionOutcome::Unsupported)
}

/// Also exposed for constructing a hint directly over an assembled
/// provider (used by `StorageClient` when a caller wants cache-refresh
/// coordination without going through full config assembly).
pub fn build_hint(provider: Arc<dyn StorageProvider>, config: HintConfig) -> Result<Arc<DistributedHint>> {
    DistributedHint::new(provider, config)
}

/// Parses a human-readable size (`"50M"`, `"1.5 GiB"`, ...) into bytes
/// (spec §6 `cache.size`), via the `human_size` crate.
fn parse_human_size(text: &str) -> Result<u64> {
    let size: human_size::Size = text
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid human-readable size `{text}`")))?;
    Ok(size.to_bytes() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_profiles_is_rejected() {
        let err = StorageClientConfig::from_value(json!({})).unwrap_err();
        assert!(matches!(err, StorageError::Config(ConfigError::MissingProfiles)));
    }

    #[test]
    fn conflicting_provider_keys_are_rejected() {
        let err = StorageClientConfig::from_value(json!({
            "profiles": {
                "p": {
                    "storage_provider": {"type": "file", "options": {"base_path": "/tmp"}},
                    "provider_bundle": {}
                }
            }
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Config(ConfigError::ConflictingProviderKeys(_))
        ));
    }

    #[test]
    fn bare_eviction_policy_string_is_rejected() {
        let err = StorageClientConfig::from_value(json!({
            "profiles": {
                "p": {"storage_provider": {"type": "file", "options": {"base_path": "/tmp"}}}
            },
            "cache": {
                "size": "10M",
                "eviction_policy": "LRU",
                "cache_backend": {"cache_path": "/tmp/cache"}
            }
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Config(ConfigError::BareEvictionPolicyString)
        ));
    }

    #[tokio::test]
    async fn assembles_a_file_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageClientConfig::from_value(json!({
            "profiles": {
                "default": {
                    "storage_provider": {"type": "file", "options": {"base_path": dir.path().to_string_lossy()}}
                }
            }
        }))
        .unwrap();
        let assembled = config.assemble("default").await.unwrap();
        assert_eq!(assembled.provider.backend_name(), "file");
    }

    #[tokio::test]
    async fn static_credentials_provider_fills_unset_s3_options() {
        let config = StorageClientConfig::from_value(json!({
            "profiles": {
                "default": {
                    "storage_provider": {
                        "type": "s3",
                        "options": {"region": "us-east-1", "bucket_name": "bucket"}
                    },
                    "credentials_provider": {
                        "type": "static",
                        "options": {"access_key_id": "AKIDEXAMPLE", "secret_key": "secret"}
                    }
                }
            }
        }))
        .unwrap();
        let assembled = config.assemble("default").await.unwrap();
        assert_eq!(assembled.provider.backend_name(), "s3");
        let creds = assembled
            .credentials_provider
            .expect("credentials_provider should be wired")
            .credentials()
            .await
            .unwrap();
        assert_eq!(creds.access_key, "AKIDEXAMPLE");
        assert_eq!(creds.secret_key, "secret");
    }

    #[tokio::test]
    async fn explicit_s3_options_win_over_credentials_provider() {
        let config = StorageClientConfig::from_value(json!({
            "profiles": {
                "default": {
                    "storage_provider": {
                        "type": "s3",
                        "options": {
                            "region": "us-east-1",
                            "bucket_name": "bucket",
                            "access_key_id": "explicit-key"
                        }
                    },
                    "credentials_provider": {
                        "type": "static",
                        "options": {"access_key_id": "AKIDEXAMPLE", "secret_key": "secret"}
                    }
                }
            }
        }))
        .unwrap();
        // Doesn't panic/override: the explicit `access_key_id` in
        // `storage_provider.options` is left alone by `apply_credentials`.
        config.assemble("default").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_credentials_provider_type_is_rejected() {
        let config = StorageClientConfig::from_value(json!({
            "profiles": {
                "default": {
                    "storage_provider": {"type": "file", "options": {"base_path": "/tmp"}},
                    "credentials_provider": {"type": "instance-metadata", "options": {}}
                }
            }
        }))
        .unwrap();
        let err = config.assemble("default").await.unwrap_err();
        assert!(matches!(err, StorageError::Config(ConfigError::Invalid(_))));
    }
}
