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

//! POSIX filesystem backend (spec §4.1 `file`).
//!
//! Built on `object_store::local::LocalFileSystem`. No platform exposes a
//! uniform atomic rename-if-absent primitive, so conditional writes are
//! declared fully unsupported: a caller asking for `if_match`/
//! `if_none_match` gets [`crate::error::StorageError::RuntimeError`]
//! before any I/O happens.

use std::path::PathBuf;

use object_store::local::LocalFileSystem;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provider::object_store_adapter::ObjectStoreProvider;
use crate::provider::{ConditionOutcome, ConditionalCapabilities, DEFAULT_MULTIPART_THRESHOLD};

/// Configuration for the `file` backend (spec §6 `storage_provider.options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Root directory every backend-relative path is resolved under.
    pub base_path: String,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

const NO_CONDITIONAL_WRITES: ConditionalCapabilities = ConditionalCapabilities {
    if_none_match_star: ConditionOutcome::Unsupported,
    if_none_match_etag: ConditionOutcome::Unsupported,
    if_match: ConditionOutcome::Unsupported,
};

/// `file` provider: a thin, path-rooted wrapper over `LocalFileSystem`.
pub type File = ObjectStoreProvider<LocalFileSystem>;

impl FileConfig {
    pub fn build(&self) -> Result<File> {
        // Config-supplied roots sometimes carry `.`/`..`/doubled separators
        // (e.g. assembled from joined env vars); clean before it becomes
        // the filesystem prefix every relative key is resolved under.
        let root = PathBuf::from(&self.base_path).clean();
        std::fs::create_dir_all(&root)?;
        let store = LocalFileSystem::new_with_prefix(&root).map_err(crate::error::StorageError::from)?;
        Ok(ObjectStoreProvider::new(
            store,
            "",
            "file",
            NO_CONDITIONAL_WRITES,
            self.multipart_threshold,
        ))
    }
}
