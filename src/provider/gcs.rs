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

//! Google Cloud Storage backend (spec §4.1 `gcs`).

use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::provider::object_store_adapter::ObjectStoreProvider;
use crate::provider::{ConditionOutcome, ConditionalCapabilities, DEFAULT_MULTIPART_THRESHOLD};

/// Configuration for the `gcs` backend (spec §6 `storage_provider.options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    pub bucket_name: String,
    #[serde(default)]
    pub base_path: String,
    /// Path to a service-account JSON key file, or an inline JSON blob.
    pub service_account_key: Option<String>,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

/// GCS's row of the spec §6 capability matrix: `if_none_match="*"` has no
/// native primitive; `if_none_match=<etag>` reports a match as
/// `NotModifiedError`; `if_match` raises `PreconditionFailedError`.
pub const GCS_CAPABILITIES: ConditionalCapabilities = ConditionalCapabilities {
    if_none_match_star: ConditionOutcome::Unsupported,
    if_none_match_etag: ConditionOutcome::NotModified,
    if_match: ConditionOutcome::PreconditionFailed,
};

pub type Gcs = ObjectStoreProvider<GoogleCloudStorage>;

impl GcsConfig {
    pub fn build(&self) -> Result<Gcs> {
        let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(&self.bucket_name);
        if let Some(key) = &self.service_account_key {
            builder = builder.with_service_account_key(key);
        }

        let store = builder.build().map_err(StorageError::from)?;
        Ok(ObjectStoreProvider::new(
            store,
            self.base_path.clone(),
            "gcs",
            GCS_CAPABILITIES,
            self.multipart_threshold,
        ))
    }
}
