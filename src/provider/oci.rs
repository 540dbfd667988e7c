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

//! Oracle Cloud Infrastructure Object Storage backend (spec §4.1 `oci`).
//!
//! OCI's S3 Compatibility API is SigV4-compatible, so this reuses
//! `AmazonS3Builder` with OCI's endpoint form, but keeps its own
//! `OciConfig`/`Oci` pair (not a type alias for `s3::S3`) because its row
//! of the capability matrix differs from S3's.

use object_store::aws::{AmazonS3, AmazonS3Builder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::provider::object_store_adapter::ObjectStoreProvider;
use crate::provider::{ConditionOutcome, ConditionalCapabilities, DEFAULT_MULTIPART_THRESHOLD};

/// Configuration for the `oci` backend (spec §6 `storage_provider.options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciConfig {
    pub namespace: String,
    pub region: String,
    pub bucket_name: String,
    #[serde(default)]
    pub base_path: String,
    pub access_key_id: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

/// OCI's row of the spec §6 capability matrix: `if_none_match="*"` and
/// `if_match` both raise `PreconditionFailedError`; `if_none_match=<etag>`
/// has no native primitive.
pub const OCI_CAPABILITIES: ConditionalCapabilities = ConditionalCapabilities {
    if_none_match_star: ConditionOutcome::PreconditionFailed,
    if_none_match_etag: ConditionOutcome::Unsupported,
    if_match: ConditionOutcome::PreconditionFailed,
};

pub type Oci = ObjectStoreProvider<AmazonS3>;

impl OciConfig {
    pub fn build(&self) -> Result<Oci> {
        let endpoint = format!(
            "https://{}.compat.objectstorage.{}.oraclecloud.com",
            self.namespace, self.region
        );
        let mut builder = AmazonS3Builder::new()
            .with_region(&self.region)
            .with_bucket_name(&self.bucket_name)
            .with_endpoint(&endpoint)
            .with_virtual_hosted_style_request(false);

        if let Some(key) = &self.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &self.secret_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store = builder.build().map_err(StorageError::from)?;
        Ok(ObjectStoreProvider::new(
            store,
            self.base_path.clone(),
            "oci",
            OCI_CAPABILITIES,
            self.multipart_threshold,
        ))
    }
}
