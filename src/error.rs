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

//! Error taxonomy shared by every storage provider, the cache, the
//! metadata provider and the client facade.
//!
//! The classification in [`StorageError`] is normative: the retry wrapper
//! in [`crate::retry`] only re-issues an operation when it sees
//! [`StorageError::Retryable`].

use std::io;

/// The normative error taxonomy (spec §7).
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// Transient failure: network timeout, connection reset, TLS handshake
    /// failure, HTTP 429/500/502/503/504, or a provider-specific throttling
    /// marker. Safe to retry.
    #[error("retryable error: {0}")]
    Retryable(String),

    /// A conditional write (`if_match` / `if_none_match`) was rejected by
    /// the backend because the precondition did not hold.
    #[error("precondition failed for {path}")]
    PreconditionFailed { path: String },

    /// GCS-style `if_none_match=<etag>` match: the object already has the
    /// requested etag, so there is nothing new to write/read.
    #[error("not modified: {path}")]
    NotModified { path: String },

    /// Object or prefix not present.
    #[error("no such key: {0}")]
    NotFound(String),

    /// Authentication or ACL failure.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Bad argument from the caller: malformed URI, bad sync pairing, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unsupported operation or capability — the backend's API has no
    /// primitive for what was asked (e.g. a conditional-write variant its
    /// matrix row declares it can never honor, or an operation disabled
    /// by configuration such as a read-only metadata provider).
    #[error("runtime error: {0}")]
    RuntimeError(String),

    /// Recognized but not implemented by this particular backend today —
    /// distinct from [`StorageError::RuntimeError`], which signals "by
    /// design, never will be," this signals "could exist, just doesn't
    /// yet" (spec §6 capability matrix, e.g. S3's
    /// `if_none_match=<etag>` row).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Configuration is invalid independent of any I/O.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An I/O error not otherwise classified.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A terminal, provider-specific error with no finer classification.
    #[error("storage error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StorageError {
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Other(Box::new(err))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Retryable(_))
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        StorageError::NotFound(path.into())
    }

    pub fn precondition_failed(path: impl Into<String>) -> Self {
        StorageError::PreconditionFailed { path: path.into() }
    }
}

/// Errors raised while assembling a [`crate::config::StorageClientConfig`]
/// from a parsed document, before any provider I/O happens.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config is missing required key `profiles`")]
    MissingProfiles,

    #[error("profile `{0}` specifies both `storage_provider` and `provider_bundle`")]
    ConflictingProviderKeys(String),

    #[error("profile `{0}` uses `provider_bundle`, which is not yet supported")]
    ProviderBundleUnsupported(String),

    #[error("unknown eviction policy `{0}`")]
    UnknownEvictionPolicy(String),

    #[error("eviction policy must be an object with a `policy` field, not a bare string")]
    BareEvictionPolicyString,

    #[error("unknown storage provider backend `{0}`")]
    UnknownBackend(String),

    #[error("unresolved environment variable reference: {0}")]
    UnresolvedEnvVar(String),

    #[error("profile `{0}` not found in configuration")]
    UnknownProfile(String),

    #[error("a distributed hint requires a provider that supports conditional writes")]
    HintRequiresConditionalWrites,

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors from glob/prefix utilities (`crate::glob`).
#[derive(thiserror::Error, Debug)]
pub enum GlobError {
    #[error("invalid glob pattern `{0}`: {1}")]
    InvalidPattern(String, String),
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            object_store::Error::AlreadyExists { path, .. } => {
                StorageError::PreconditionFailed { path }
            }
            object_store::Error::Precondition { path, .. } => {
                StorageError::PreconditionFailed { path }
            }
            object_store::Error::NotModified { path, .. } => StorageError::NotModified { path },
            object_store::Error::NotSupported { source, .. } => {
                StorageError::RuntimeError(source.to_string())
            }
            object_store::Error::PermissionDenied { path, source } => {
                StorageError::PermissionDenied(format!("{path}: {source}"))
            }
            object_store::Error::Unauthenticated { path, source } => {
                StorageError::PermissionDenied(format!("{path}: {source}"))
            }
            object_store::Error::Generic { store, source } => {
                if is_retryable_message(&source.to_string()) {
                    StorageError::Retryable(format!("{store}: {source}"))
                } else {
                    StorageError::Other(source)
                }
            }
            other => StorageError::Other(Box::new(other)),
        }
    }
}

/// Substring classification for errors `object_store` reports generically
/// (timeouts, resets, throttling) that don't get their own variant.
pub(crate) fn is_retryable_message(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        "timed out",
        "timeout",
        "connection reset",
        "connection refused",
        "broken pipe",
        "tls handshake",
        "429",
        "500",
        "502",
        "503",
        "504",
        "slow down",
        "throttl",
        "too many requests",
    ];
    let lower = message.to_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

pub type Result<T> = std::result::Result<T, StorageError>;
