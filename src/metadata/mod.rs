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

//! Metadata provider contract (spec §4.2): maps logical paths to
//! physically stored keys and metadata, decoupling a caller's namespace
//! from how objects are actually stored.

pub mod manifest;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{ListOptions, ObjectMetadata};

/// A stream of logical [`ObjectMetadata`], ordered lexicographically.
pub type MetadataListStream<'a> = BoxStream<'a, Result<ObjectMetadata>>;

/// Implemented by providers that maintain a logical -> physical mapping
/// (today: only [`manifest::ManifestMetadataProvider`]).
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn list<'a>(&'a self, prefix: &str, options: ListOptions) -> MetadataListStream<'a>;

    async fn info(&self, path: &str) -> Result<ObjectMetadata>;

    /// Matches `pattern` against every live logical key (fnmatch
    /// semantics, `**` across segments) and returns the matches.
    async fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    /// Resolves `path` to its physical key. For a path with no existing
    /// entry, mints a fresh physical key (spec §4.2 "realpath") — used by
    /// writers to place a new object before the logical entry exists.
    async fn realpath(&self, path: &str) -> Result<(String, bool)>;

    /// Stages an add of `path` -> `metadata`, recorded against the
    /// physical key the caller actually wrote the bytes to (typically the
    /// one returned by a prior [`MetadataProvider::realpath`] call for the
    /// same path). Visible only after [`MetadataProvider::commit_updates`].
    async fn add_file(&self, path: &str, metadata: ObjectMetadata, physical_key: String) -> Result<()>;

    /// Stages a removal of `path`. A no-op at commit time if `path` was
    /// never present.
    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Atomically publishes a new manifest version reflecting all staged
    /// adds/removes since the last commit, then clears pending state.
    async fn commit_updates(&self) -> Result<()>;

    fn is_writable(&self) -> bool;
}
