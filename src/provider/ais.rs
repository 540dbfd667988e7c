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

//! AIStore backend (spec §4.1 `ais`).
//!
//! AIStore exposes an S3-compatible gateway, so this reuses
//! `AmazonS3Builder` the same way `oci` does. Conditional writes are
//! absent from the spec's normative capability matrix, so `ais` declares
//! none supported rather than guessing: a conditional `put` fails fast
//! with `StorageError::RuntimeError`.

use object_store::aws::{AmazonS3, AmazonS3Builder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::provider::object_store_adapter::ObjectStoreProvider;
use crate::provider::{ConditionOutcome, ConditionalCapabilities, DEFAULT_MULTIPART_THRESHOLD};

/// Configuration for the `ais` backend (spec §6 `storage_provider.options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisConfig {
    pub endpoint_url: String,
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

pub const AIS_CAPABILITIES: ConditionalCapabilities = ConditionalCapabilities {
    if_none_match_star: ConditionOutcome::Unsupported,
    if_none_match_etag: ConditionOutcome::Unsupported,
    if_match: ConditionOutcome::Unsupported,
};

pub type Ais = ObjectStoreProvider<AmazonS3>;

impl AisConfig {
    pub fn build(&self) -> Result<Ais> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&self.bucket_name)
            .with_endpoint(&self.endpoint_url)
            .with_virtual_hosted_style_request(false)
            .with_allow_http(self.endpoint_url.starts_with("http://"));

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
            "ais",
            AIS_CAPABILITIES,
            self.multipart_threshold,
        ))
    }
}
