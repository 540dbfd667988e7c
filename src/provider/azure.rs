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

//! Azure Blob Storage backend (spec §4.1 `azure`).

use object_store::azure::{MicrosoftAzure, MicrosoftAzureBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::provider::object_store_adapter::ObjectStoreProvider;
use crate::provider::{ConditionOutcome, ConditionalCapabilities, DEFAULT_MULTIPART_THRESHOLD};

/// Configuration for the `azure` backend (spec §6 `storage_provider.options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    pub account_name: String,
    pub container_name: String,
    #[serde(default)]
    pub base_path: String,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

/// Azure's row of the spec §6 capability matrix: `if_none_match="*"` has
/// no native primitive; `if_none_match=<etag>` and `if_match` both raise
/// `PreconditionFailedError`.
pub const AZURE_CAPABILITIES: ConditionalCapabilities = ConditionalCapabilities {
    if_none_match_star: ConditionOutcome::Unsupported,
    if_none_match_etag: ConditionOutcome::PreconditionFailed,
    if_match: ConditionOutcome::PreconditionFailed,
};

pub type Azure = ObjectStoreProvider<MicrosoftAzure>;

impl AzureConfig {
    pub fn build(&self) -> Result<Azure> {
        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(&self.account_name)
            .with_container_name(&self.container_name);

        if let Some(key) = &self.account_key {
            builder = builder.with_access_key(key);
        }
        if let Some(sas) = &self.sas_token {
            builder = builder.with_config(object_store::azure::AzureConfigKey::SasKey, sas);
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        let store = builder.build().map_err(StorageError::from)?;
        Ok(ObjectStoreProvider::new(
            store,
            self.base_path.clone(),
            "azure",
            AZURE_CAPABILITIES,
            self.multipart_threshold,
        ))
    }
}
