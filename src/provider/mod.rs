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

//! The backend-agnostic storage provider contract (spec §4.1).
//!
//! Every provider wraps an `object_store` client (or, for `ftp`, a raw
//! control/data connection) behind the same async trait, the way
//! `parseable`'s `storage/s3.rs` wraps `AmazonS3` behind `ObjectStorage`.
//! A backend declares which conditional-write variants it supports; the
//! client never guesses at behavior a backend's capability row doesn't
//! define (spec §4.1 "Conditional writes").

pub mod ais;
pub mod azure;
pub mod file;
pub mod ftp;
pub mod gcs;
pub mod object_store_adapter;
pub mod oci;
pub mod s3;
pub mod swiftstack;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::{Result, StorageError};
use crate::types::{ListOptions, ObjectMetadata, PutCondition, PutOptions, Range};

/// Multipart uploads apply once an object crosses this size (spec §4.1:
/// "Objects larger than a provider threshold MUST use multipart upload
/// with >= 5 MiB parts except last").
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024 * 20; // 100 MiB, mirrors parseable::storage::s3::MULTIPART_UPLOAD_SIZE
pub const MIN_MULTIPART_PART_SIZE: u64 = 5 * 1024 * 1024;

/// How a backend's `put` reacts to one conditional-write precondition,
/// per the capability matrix in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    /// The backend rejects a failed precondition with
    /// [`StorageError::PreconditionFailed`].
    PreconditionFailed,
    /// The backend reports a matched `if_none_match=<etag>` as
    /// [`StorageError::NotModified`] (GCS-specific).
    NotModified,
    /// The backend's API has no primitive for this precondition class and
    /// never will; a caller specifying it MUST fail fast, never be
    /// silently dropped.
    Unsupported,
    /// The backend could honor this precondition class but this provider
    /// doesn't implement it yet (spec §6, e.g. S3's `if_none_match=<etag>`
    /// row) — distinct from [`ConditionOutcome::Unsupported`].
    NotImplemented,
}

/// The three precondition classes a backend may or may not support,
/// matching the rows of spec §6's conditional-write capability matrix.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalCapabilities {
    pub if_none_match_star: ConditionOutcome,
    pub if_none_match_etag: ConditionOutcome,
    pub if_match: ConditionOutcome,
}

impl ConditionalCapabilities {
    /// Looks up the outcome for a specific [`PutCondition`], or `None` if
    /// the condition class itself is not recognized (never happens today,
    /// but keeps the match exhaustive as new condition kinds are added).
    pub fn outcome_for(&self, condition: &PutCondition) -> ConditionOutcome {
        match condition {
            PutCondition::IfAbsent => self.if_none_match_star,
            PutCondition::IfNoneMatch(_) => self.if_none_match_etag,
            PutCondition::IfMatch(_) => self.if_match,
        }
    }
}

/// A streamable request body: either fully-buffered bytes or a chunked
/// stream with a known size hint (used to decide multipart vs single-shot
/// puts without buffering the whole object in memory).
pub enum PutBody {
    Bytes(Bytes),
    Stream {
        stream: BoxStream<'static, std::io::Result<Bytes>>,
        size_hint: u64,
    },
}

impl PutBody {
    pub fn len_hint(&self) -> u64 {
        match self {
            PutBody::Bytes(b) => b.len() as u64,
            PutBody::Stream { size_hint, .. } => *size_hint,
        }
    }
}

impl std::fmt::Debug for PutBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PutBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            PutBody::Stream { size_hint, .. } => {
                f.debug_struct("Stream").field("size_hint", size_hint).finish()
            }
        }
    }
}

/// A stream of object metadata produced by [`StorageProvider::list`],
/// ordered lexicographically on key (spec §4.1 "list").
pub type ListStream<'a> = BoxStream<'a, Result<ObjectMetadata>>;

/// The storage provider contract (spec §4.1). All paths passed to a
/// provider are backend-relative: the provider itself prepends its
/// configured `base_path`.
#[async_trait]
pub trait StorageProvider: Send + Sync + std::fmt::Debug {
    /// A short, human-readable backend tag (`"file"`, `"s3"`, ...), used
    /// in log lines and error messages.
    fn backend_name(&self) -> &'static str;

    /// Which conditional-write preconditions this backend honors, and how
    /// it reports a failed precondition (spec §6 matrix).
    fn conditional_capabilities(&self) -> ConditionalCapabilities;

    /// Writes `body` at `path`, returning the new object's etag. Atomic at
    /// object granularity; multipart when `body` crosses
    /// [`DEFAULT_MULTIPART_THRESHOLD`].
    async fn put(&self, path: &str, body: PutBody, options: PutOptions) -> Result<String>;

    /// Reads `path`, optionally restricted to `range`. A short read is
    /// only valid at EOF.
    async fn get(&self, path: &str, range: Option<Range>) -> Result<Bytes>;

    /// Returns metadata for `path`, or [`StorageError::NotFound`] if
    /// absent.
    async fn head(&self, path: &str) -> Result<ObjectMetadata>;

    /// Deletes `path`. Idempotent: deleting an absent object is success.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects under `prefix`, in lexicographic key order,
    /// transparently paginating server-side.
    fn list<'a>(&'a self, prefix: &str, options: ListOptions) -> ListStream<'a>;

    /// Copies `src` to `dest`, server-side where the backend supports it.
    async fn copy(&self, src: &str, dest: &str) -> Result<()>;

    /// Streams `local` to `remote`, using multipart when large.
    async fn upload_file(&self, remote: &str, local: &Path) -> Result<()>;

    /// Downloads `remote` to `local`, atomically (write to a `.tmp.<uuid>`
    /// sibling, then rename).
    async fn download_file(&self, remote: &str, local: &Path) -> Result<()>;

    /// The multipart threshold for this provider; overridable per profile
    /// through `StorageOptions` (spec §9 `MEMORY_LOAD_LIMIT`).
    fn multipart_threshold(&self) -> u64 {
        DEFAULT_MULTIPART_THRESHOLD
    }
}

/// Validates a condition against a backend's capability row before any
/// I/O is attempted, so unsupported preconditions fail fast rather than
/// being silently dropped (spec §4.1 "Conditional writes").
pub fn check_condition_supported(
    caps: &ConditionalCapabilities,
    condition: &PutCondition,
    backend: &str,
) -> Result<()> {
    match caps.outcome_for(condition) {
        ConditionOutcome::Unsupported => Err(StorageError::RuntimeError(format!(
            "{backend} does not support condition {condition:?}"
        ))),
        ConditionOutcome::NotImplemented => Err(StorageError::NotImplemented(format!(
            "{backend} does not yet implement condition {condition:?}"
        ))),
        _ => Ok(()),
    }
}

/// Joins a provider's `base_path` with a caller-supplied backend-relative
/// path, the way `parseable`'s `storage/s3.rs` composes its root prefix
/// with a `RelativePath`.
pub fn full_path(base_path: &str, path: &str) -> String {
    crate::utils::join_paths(base_path, path)
}
