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

//! A unified, backend-agnostic object storage client.
//!
//! Presents one file-like API — read, write, list, glob, copy, sync — over
//! POSIX filesystems, S3-compatible services, Azure Blob, Google Cloud
//! Storage, Oracle Cloud Infrastructure, AIStore, SwiftStack, and FTP,
//! addressed through `msc://<profile>/<path>` URIs resolved against a
//! process-global registry (see [`resolver::resolve_storage_client`]).
//!
//! A profile assembles a [`provider::StorageProvider`] with an optional
//! [`metadata::MetadataProvider`] (for immutable, versioned manifests) and
//! an optional [`cache::Cache`], all wired together by
//! [`client::StorageClient`]. [`config::StorageClientConfig`] parses the
//! YAML/JSON configuration document that describes a set of profiles.

pub mod cache;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod glob;
pub mod hint;
pub mod metadata;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod sync;
pub mod types;
pub mod utils;

pub use client::{FileHandle, ReadHandle, StorageClient, WriteHandle};
pub use config::StorageClientConfig;
pub use error::{ConfigError, Result, StorageError};
pub use resolver::{parse_uri, resolve_storage_client};
pub use sync::{sync, SyncErrors, SyncOptions, SyncStats};
pub use types::{Credentials, ListOptions, ObjectMetadata, ObjectType, PutCondition, PutOptions, Range};
