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

//! AWS S3 (and S3-compatible) backend (spec §4.1 `s3`).
//!
//! Grounded on `parseable`'s `storage/s3.rs` `S3Config`/`S3` split: a
//! `clap`-free, serde-only config struct carrying endpoint, region,
//! bucket, credentials, path-style, checksum and TLS-skip knobs, built
//! into a live `AmazonS3` client via `AmazonS3Builder`.

use object_store::aws::{AmazonS3, AmazonS3Builder, Checksum};
use object_store::ClientOptions;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::provider::object_store_adapter::ObjectStoreProvider;
use crate::provider::{ConditionOutcome, ConditionalCapabilities, DEFAULT_MULTIPART_THRESHOLD};

/// Configuration for the `s3` backend (spec §6 `storage_provider.options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint_url: Option<String>,
    pub region: String,
    pub bucket_name: String,
    #[serde(default)]
    pub base_path: String,
    pub access_key_id: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    #[serde(default = "default_true")]
    pub use_path_style: bool,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub set_checksum: bool,
    #[serde(default)]
    pub imds_v1_fallback: bool,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
}

fn default_true() -> bool {
    true
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

/// S3's row of the spec §6 capability matrix: `if_none_match="*"` and
/// `if_match` both raise `PreconditionFailedError`; `if_none_match=<etag>`
/// has no native primitive.
pub const S3_CAPABILITIES: ConditionalCapabilities = ConditionalCapabilities {
    if_none_match_star: ConditionOutcome::PreconditionFailed,
    if_none_match_etag: ConditionOutcome::NotImplemented,
    if_match: ConditionOutcome::PreconditionFailed,
};

pub type S3 = ObjectStoreProvider<AmazonS3>;

impl S3Config {
    pub fn build(&self) -> Result<S3> {
        let mut client_options = ClientOptions::default();
        if self.skip_tls_verify {
            client_options = client_options.with_allow_invalid_certificates(true);
        }

        let mut builder = AmazonS3Builder::new()
            .with_region(&self.region)
            .with_bucket_name(&self.bucket_name)
            .with_virtual_hosted_style_request(!self.use_path_style)
            .with_skip_signature(false);

        if self.set_checksum {
            builder = builder.with_checksum_algorithm(Checksum::SHA256);
        }
        if let Some(endpoint) = &self.endpoint_url {
            builder = builder.with_endpoint(endpoint).with_allow_http(endpoint.starts_with("http://"));
            client_options = client_options.with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(key) = &self.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &self.secret_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(token) = &self.session_token {
            builder = builder.with_token(token);
        }
        if self.imds_v1_fallback {
            builder = builder.with_imdsv1_fallback();
        }
        builder = builder.with_client_options(client_options);

        let store = builder.build().map_err(StorageError::from)?;
        Ok(ObjectStoreProvider::new(
            store,
            self.base_path.clone(),
            "s3",
            S3_CAPABILITIES,
            self.multipart_threshold,
        ))
    }
}
