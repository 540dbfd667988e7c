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

//! Credentials provider interface (spec §3 "Credentials").
//!
//! Per spec §1 Non-goals, concrete credential-provider implementations
//! (instance-metadata fetchers, STS assume-role flows, SSO token caches)
//! are external collaborators and out of scope; this module defines only
//! the interface a profile attaches, plus a trivial static provider for
//! profiles that carry a fixed access/secret pair inline.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Credentials;

/// Supplies (and refreshes) the credentials a storage provider signs
/// requests with.
#[async_trait]
pub trait CredentialsProvider: Send + Sync + std::fmt::Debug {
    /// Returns the current credentials, refreshing first if expired.
    async fn credentials(&self) -> Result<Credentials>;
}

/// A provider that always returns the same, never-expiring credentials.
/// Used when a profile embeds a static access/secret pair directly in
/// its config rather than delegating to an external collaborator.
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    credentials: Credentials,
}

impl StaticCredentialsProvider {
    pub fn new(credentials: Credentials) -> Self {
        StaticCredentialsProvider { credentials }
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentialsProvider {
    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}
