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

//! Core data types shared by every layer of the crate (spec §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an [`ObjectMetadata`] describes a regular object or a synthetic
/// directory entry produced by `list(include_directories = true)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    File,
    Directory,
}

/// Metadata describing one object, logical or physical (spec §3).
///
/// Invariant: `type == ObjectType::Directory` implies `content_length == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, serde_json::Value>>,
}

impl ObjectMetadata {
    pub fn file(key: impl Into<String>, content_length: u64, last_modified: DateTime<Utc>) -> Self {
        ObjectMetadata {
            key: key.into(),
            content_length,
            last_modified,
            etag: None,
            object_type: ObjectType::File,
            storage_class: None,
            extra: None,
        }
    }

    pub fn directory(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        ObjectMetadata {
            key: key.into(),
            content_length: 0,
            last_modified,
            etag: None,
            object_type: ObjectType::Directory,
            storage_class: None,
            extra: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.object_type, ObjectType::Directory)
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }
}

/// A half-open byte range `[offset, offset + size)` used for ranged reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub size: u64,
}

impl Range {
    pub fn new(offset: u64, size: u64) -> Self {
        Range { offset, size }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Returns the range that remains after `consumed` bytes have already
    /// been read, for resuming a retried ranged GET mid-stream (spec §4.1).
    pub fn advance(&self, consumed: u64) -> Range {
        let consumed = consumed.min(self.size);
        Range {
            offset: self.offset + consumed,
            size: self.size - consumed,
        }
    }
}

/// Refreshable backend credentials (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration, Some(exp) if now >= exp)
    }
}

/// The two conditional-write preconditions a `put` may specify (spec §4.1,
/// §6's conditional-write capability matrix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// `if_none_match="*"`: succeed only if no object currently exists at
    /// this path.
    IfAbsent,
    /// `if_none_match=<etag>`: succeed only if the current object's etag
    /// does not match (used by GCS read-modify-write style flows).
    IfNoneMatch(String),
    /// `if_match=<etag>`: succeed only if the current object's etag
    /// matches exactly.
    IfMatch(String),
}

/// Options accepted by [`crate::providers::StorageProvider::put`].
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub condition: Option<PutCondition>,
}

/// Options accepted by [`crate::providers::StorageProvider::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub start_after: Option<String>,
    pub end_at: Option<String>,
    pub include_directories: bool,
}
