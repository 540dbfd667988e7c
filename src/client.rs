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

//! The storage client facade: the user-visible entry point that ties a
//! profile's provider, optional metadata provider, and optional cache
//! together behind `read`/`write`/`list`/`glob`/`open`/...
//!
//! The core here is async-native throughout: every
//! [`crate::provider::StorageProvider`] method is an `async fn`, and the
//! client surface follows suit directly over `tokio` rather than
//! wrapping a blocking core in a task pool. See DESIGN.md for the
//! rationale.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::stream::StreamExt;
use tracing::debug;

use crate::cache::Cache;
use crate::error::{Result, StorageError};
use crate::glob;
use crate::metadata::MetadataProvider;
use crate::provider::{full_path, PutBody, StorageProvider};
use crate::retry::{retry, RetryPolicy};
use crate::types::{ListOptions, ObjectMetadata, PutCondition, PutOptions, Range};

/// Below this size, `put` never uses multipart and a write handle keeps
/// its spooled buffer entirely in memory (spec §9 `MEMORY_LOAD_LIMIT`).
pub const DEFAULT_MEMORY_LOAD_LIMIT: u64 = 64 * 1024 * 1024;

/// Read-ahead chunk size for large-object reads via a handle (spec §4.5
/// "Reads on small objects are served from a full fetch; large reads use
/// ranged requests with read-ahead of one chunk").
const READ_AHEAD_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// One profile's assembled provider/metadata-provider/cache trio, plus
/// the knobs SPEC_FULL §4.5 hangs off a profile (memory load limit,
/// retry policy).
pub struct StorageClient {
    profile: String,
    provider: Arc<dyn StorageProvider>,
    metadata_provider: Option<Arc<dyn MetadataProvider>>,
    cache: Option<Arc<Cache>>,
    memory_load_limit: u64,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("profile", &self.profile)
            .field("backend", &self.provider.backend_name())
            .field("has_metadata_provider", &self.metadata_provider.is_some())
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}

impl StorageClient {
    pub fn new(
        profile: impl Into<String>,
        provider: Arc<dyn StorageProvider>,
        metadata_provider: Option<Arc<dyn MetadataProvider>>,
        cache: Option<Arc<Cache>>,
    ) -> Arc<Self> {
        Arc::new(StorageClient {
            profile: profile.into(),
            provider,
            metadata_provider,
            cache,
            memory_load_limit: DEFAULT_MEMORY_LOAD_LIMIT,
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_memory_load_limit(mut self, limit: u64) -> Self {
        self.memory_load_limit = limit;
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Resolves `path` to the key the backend provider should see: via
    /// the metadata provider's `realpath` when one is configured,
    /// otherwise the path itself (spec §4.5 "Path resolution within a
    /// client").
    async fn resolve_physical(&self, path: &str) -> Result<String> {
        match &self.metadata_provider {
            Some(meta) => Ok(meta.realpath(path).await?.0),
            None => Ok(path.to_string()),
        }
    }

    pub async fn info(&self, path: &str) -> Result<ObjectMetadata> {
        match &self.metadata_provider {
            Some(meta) => meta.info(path).await,
            None => {
                let path = path.to_string();
                retry(&self.retry_policy, |_| {
                    let path = path.clone();
                    async move { self.provider.head(&path).await }
                })
                .await
            }
        }
    }

    pub async fn is_file(&self, path: &str) -> Result<bool> {
        match self.info(path).await {
            Ok(meta) => Ok(!meta.is_directory()),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn is_empty(&self, prefix: &str) -> Result<bool> {
        let mut stream = self.list(prefix, ListOptions::default());
        Ok(stream.next().await.is_none())
    }

    /// Reads the whole object at `path`, consulting the cache when one is
    /// configured (spec §2 "Data flow").
    pub async fn read(&self, path: &str) -> Result<Bytes> {
        let physical = self.resolve_physical(path).await?;

        if let Some(cache) = &self.cache {
            let etag = if cache.use_etag() {
                self.info(path).await.ok().and_then(|m| m.etag)
            } else {
                None
            };
            let key = cache.cache_key(path, etag.as_deref());
            if let Some(bytes) = cache.get(&key).await? {
                return Ok(bytes);
            }
            let bytes = self.fetch(&physical, None).await?;
            cache.set(&key, bytes.clone()).await?;
            return Ok(bytes);
        }

        self.fetch(&physical, None).await
    }

    async fn fetch(&self, physical_path: &str, range: Option<Range>) -> Result<Bytes> {
        get_with_retry(&self.provider, &self.retry_policy, physical_path, range).await
    }

    /// Writes `body` at `path`. When a metadata provider is configured,
    /// the object goes to a freshly minted physical key and the logical
    /// add is staged, committed eagerly here (no explicit
    /// `commit_updates()` pending) unless the caller manages batching
    /// itself by calling [`StorageClient::write_staged`] (spec §4.5
    /// "Path resolution within a client" step 1).
    pub async fn write(&self, path: &str, body: Bytes) -> Result<String> {
        match &self.metadata_provider {
            Some(meta) => {
                if !meta.is_writable() {
                    return Err(StorageError::RuntimeError(format!(
                        "metadata provider for profile `{}` is read-only",
                        self.profile
                    )));
                }
                let (physical, _existed) = meta.realpath(path).await?;
                let etag = self.put(&physical, body.clone(), PutOptions::default()).await?;
                let object_meta = ObjectMetadata::file(path.to_string(), body.len() as u64, chrono::Utc::now())
                    .with_etag(Some(etag.clone()));
                meta.add_file(path, object_meta, physical).await?;
                meta.commit_updates().await?;
                Ok(etag)
            }
            None => self.put(path, body, PutOptions::default()).await,
        }
    }

    /// Like [`StorageClient::write`], but stages the logical add without
    /// committing — the caller must call [`StorageClient::commit_updates`]
    /// (spec §2 "Data flow": "buffers pending adds/removes until an
    /// explicit commit").
    pub async fn write_staged(&self, path: &str, body: Bytes) -> Result<String> {
        let meta = self.metadata_provider.as_ref().ok_or_else(|| {
            StorageError::RuntimeError("write_staged requires a metadata provider".to_string())
        })?;
        let (physical, _existed) = meta.realpath(path).await?;
        let etag = self.put(&physical, body.clone(), PutOptions::default()).await?;
        let object_meta = ObjectMetadata::file(path.to_string(), body.len() as u64, chrono::Utc::now())
            .with_etag(Some(etag.clone()));
        meta.add_file(path, object_meta, physical).await?;
        Ok(etag)
    }

    async fn put(&self, path: &str, body: Bytes, options: PutOptions) -> Result<String> {
        put_with_retry(&self.provider, &self.retry_policy, path, body, options).await
    }

    /// Writes `body` at `path` using a standalone provider/metadata-
    /// provider/retry-policy trio rather than `&self` — used by
    /// [`WriteHandle::close`], which only holds cloned handles to these
    /// (see the comment on [`StorageClient::open`] for why).
    async fn write_via(
        provider: &Arc<dyn StorageProvider>,
        metadata_provider: &Option<Arc<dyn MetadataProvider>>,
        retry_policy: &RetryPolicy,
        path: &str,
        body: Bytes,
    ) -> Result<String> {
        match metadata_provider {
            Some(meta) => {
                if !meta.is_writable() {
                    return Err(StorageError::RuntimeError(
                        "metadata provider is read-only".to_string(),
                    ));
                }
                let (physical, _existed) = meta.realpath(path).await?;
                let etag = put_with_retry(provider, retry_policy, &physical, body.clone(), PutOptions::default()).await?;
                let object_meta = ObjectMetadata::file(path.to_string(), body.len() as u64, chrono::Utc::now())
                    .with_etag(Some(etag.clone()));
                meta.add_file(path, object_meta, physical).await?;
                meta.commit_updates().await?;
                Ok(etag)
            }
            None => put_with_retry(provider, retry_policy, path, body, PutOptions::default()).await,
        }
    }

    /// Writes `body` only if no object currently exists at `path` (spec
    /// §4.1, §8 scenario 2).
    pub async fn write_if_absent(&self, path: &str, body: Bytes) -> Result<String> {
        self.put(
            path,
            body,
            PutOptions {
                condition: Some(PutCondition::IfAbsent),
            },
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        match &self.metadata_provider {
            Some(meta) => {
                meta.remove_file(path).await?;
                meta.commit_updates().await
            }
            None => self.provider.delete(path).await,
        }
    }

    pub fn list<'a>(&'a self, prefix: &'a str, options: ListOptions) -> futures::stream::BoxStream<'a, Result<ObjectMetadata>> {
        match &self.metadata_provider {
            Some(meta) => meta.list(prefix, options),
            None => self.provider.list(prefix, options),
        }
    }

    /// Extracts the literal prefix, lists under it, and filters with
    /// fnmatch semantics (spec §4.5 "Glob").
    pub async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        if let Some(meta) = &self.metadata_provider {
            return meta.glob(pattern).await;
        }

        let prefix = glob::extract_prefix_from_glob(pattern);
        let compiled = glob::compile(pattern).map_err(|e| StorageError::InvalidArgument(e.to_string()))?;
        let mut stream = self.provider.list(&prefix, ListOptions::default());
        let mut matches = Vec::new();
        while let Some(item) = stream.next().await {
            let meta = item?;
            if compiled.is_match(&meta.key) {
                matches.push(meta.key);
            }
        }
        matches.sort();
        Ok(matches)
    }

    pub async fn copy(&self, src: &str, dest: &str) -> Result<()> {
        match &self.metadata_provider {
            Some(meta) => {
                if !meta.is_writable() {
                    return Err(StorageError::RuntimeError(
                        "copy under a read-only metadata provider is a configuration error".to_string(),
                    ));
                }
                let bytes = self.read(src).await?;
                self.write(dest, bytes).await?;
                Ok(())
            }
            None => self.provider.copy(src, dest).await,
        }
    }

    pub async fn upload_file(&self, remote: &str, local: &Path) -> Result<()> {
        let physical = self.resolve_physical(remote).await?;
        self.provider.upload_file(&physical, local).await?;
        if let Some(meta) = &self.metadata_provider {
            let content_length = tokio::fs::metadata(local).await?.len();
            meta.add_file(
                remote,
                ObjectMetadata::file(remote.to_string(), content_length, chrono::Utc::now()),
                physical,
            )
            .await?;
            meta.commit_updates().await?;
        }
        Ok(())
    }

    pub async fn download_file(&self, remote: &str, local: &Path) -> Result<()> {
        let physical = self.resolve_physical(remote).await?;
        self.provider.download_file(&physical, local).await
    }

    pub async fn commit_updates(&self) -> Result<()> {
        match &self.metadata_provider {
            Some(meta) => meta.commit_updates().await,
            None => Ok(()),
        }
    }

    /// Opens a synchronous-style file-like handle in `"rb"`/`"r"` (read)
    /// or `"wb"`/`"w"` (write) mode (spec §4.5 "File handle").
    ///
    /// The handle carries its own clones of the provider, metadata
    /// provider, and retry policy rather than a back-reference to this
    /// client — `StorageClient` is usually reached through an `Arc` owned
    /// by the registry, but `open` itself only needs `&self`, so handles
    /// don't force callers to hold (or re-derive) that `Arc`.
    pub async fn open(&self, path: &str, mode: &str) -> Result<FileHandle> {
        match mode {
            "r" | "rb" | "rt" => {
                let physical = self.resolve_physical(path).await?;
                let content_length = self.provider.head(&physical).await?.content_length;
                Ok(FileHandle::Read(ReadHandle {
                    provider: Arc::clone(&self.provider),
                    retry_policy: self.retry_policy,
                    logical_path: path.to_string(),
                    physical_path: physical,
                    position: 0,
                    content_length,
                    buffered: None,
                    buffered_start: 0,
                    binary: mode != "rt",
                }))
            }
            "w" | "wb" | "wt" => Ok(FileHandle::Write(WriteHandle {
                provider: Arc::clone(&self.provider),
                metadata_provider: self.metadata_provider.clone(),
                retry_policy: self.retry_policy,
                logical_path: path.to_string(),
                buffer: Vec::new(),
                spill: None,
                memory_load_limit: self.memory_load_limit,
                closed: false,
            })),
            other => Err(StorageError::InvalidArgument(format!("unsupported open mode `{other}`"))),
        }
    }

    /// Exposes the underlying POSIX file descriptor for the `file`
    /// backend only, so callers can `mmap` the open handle (spec §4.5
    /// "`fileno()` is exposed only for POSIX-backed clients"). Other
    /// backends return `None`.
    pub fn local_base_path(&self) -> Option<&str> {
        if self.provider.backend_name() == "file" {
            Some("")
        } else {
            None
        }
    }
}

/// A synchronous-style file-like handle (spec §4.5 "File handle").
pub enum FileHandle {
    Read(ReadHandle),
    Write(WriteHandle),
}

impl FileHandle {
    pub async fn read(&mut self, size: Option<usize>) -> Result<Bytes> {
        match self {
            FileHandle::Read(h) => h.read(size).await,
            FileHandle::Write(_) => Err(StorageError::InvalidArgument("handle is open for writing".into())),
        }
    }

    pub async fn readline(&mut self) -> Result<Option<Bytes>> {
        match self {
            FileHandle::Read(h) => h.readline().await,
            FileHandle::Write(_) => Err(StorageError::InvalidArgument("handle is open for writing".into())),
        }
    }

    pub async fn readlines(&mut self) -> Result<Vec<Bytes>> {
        let mut lines = Vec::new();
        while let Some(line) = self.readline().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        match self {
            FileHandle::Write(h) => h.write(data),
            FileHandle::Read(_) => Err(StorageError::InvalidArgument("handle is open for reading".into())),
        }
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self {
            FileHandle::Read(h) => h.seek(pos),
            FileHandle::Write(_) => Err(StorageError::InvalidArgument("seek is not supported on a write handle".into())),
        }
    }

    pub fn tell(&self) -> u64 {
        match self {
            FileHandle::Read(h) => h.position,
            FileHandle::Write(h) => h.buffer.len() as u64 + h.spilled_len(),
        }
    }

    /// Flushes a write handle's spooled buffer via a single backend
    /// `put`; the object only becomes visible to readers once this
    /// returns (spec §4.5, §8 "For all handles `h` in write mode,
    /// `info(h.path)` raises `FileNotFoundError` until `h.close()`
    /// returns").
    pub async fn close(self) -> Result<()> {
        match self {
            FileHandle::Read(_) => Ok(()),
            FileHandle::Write(mut h) => h.close().await,
        }
    }
}

pub struct ReadHandle {
    provider: Arc<dyn StorageProvider>,
    retry_policy: RetryPolicy,
    logical_path: String,
    physical_path: String,
    position: u64,
    content_length: u64,
    /// A read-ahead window of up to [`READ_AHEAD_CHUNK_SIZE`] bytes
    /// starting at `buffered_start`, covering `self.position` whenever
    /// it's populated (spec §4.5 "Reads on small objects are served from
    /// a full fetch; large reads use ranged requests with read-ahead of
    /// one chunk"). Refilled on demand as `position` walks past it, so a
    /// byte-at-a-time `readline()` over a multi-gigabyte object still
    /// issues one ranged GET per chunk rather than one per byte.
    buffered: Option<Bytes>,
    buffered_start: u64,
    binary: bool,
}

impl ReadHandle {
    async fn fetch(&self, range: Option<Range>) -> Result<Bytes> {
        get_with_retry(&self.provider, &self.retry_policy, &self.physical_path, range).await
    }

    /// Ensures `self.buffered` covers `self.position`, fetching a fresh
    /// read-ahead chunk if it doesn't. A no-op once the whole (small)
    /// object has already been buffered.
    async fn ensure_buffered(&mut self) -> Result<()> {
        if self.position >= self.content_length {
            return Ok(());
        }
        let covered = self.buffered.as_ref().is_some_and(|buf| {
            self.position >= self.buffered_start && self.position < self.buffered_start + buf.len() as u64
        });
        if covered {
            return Ok(());
        }
        let remaining = self.content_length - self.position;
        let chunk_len = remaining.min(READ_AHEAD_CHUNK_SIZE);
        let bytes = if self.position == 0 && chunk_len == self.content_length {
            self.fetch(None).await?
        } else {
            self.fetch(Some(Range::new(self.position, chunk_len))).await?
        };
        self.buffered_start = self.position;
        self.buffered = Some(bytes);
        Ok(())
    }

    pub async fn read(&mut self, size: Option<usize>) -> Result<Bytes> {
        if self.position >= self.content_length {
            return Ok(Bytes::new());
        }
        self.ensure_buffered().await?;

        let remaining = self.content_length - self.position;
        let want = size.map(|s| s as u64).unwrap_or(remaining).min(remaining);
        if want == 0 {
            return Ok(Bytes::new());
        }

        let buf = self.buffered.as_ref().expect("ensure_buffered populated it");
        let buf_offset = (self.position - self.buffered_start) as usize;
        let buf_available = buf.len() - buf_offset;
        let take = (want as usize).min(buf_available);
        let bytes = buf.slice(buf_offset..buf_offset + take);
        self.position += take as u64;
        Ok(bytes)
    }

    pub async fn readline(&mut self) -> Result<Option<Bytes>> {
        let mut out = BytesMut::new();
        loop {
            let chunk = self.read(Some(1)).await?;
            if chunk.is_empty() {
                return if out.is_empty() { Ok(None) } else { Ok(Some(out.freeze())) };
            }
            let byte = chunk[0];
            out.extend_from_slice(&[byte]);
            if byte == b'\n' {
                return Ok(Some(out.freeze()));
            }
        }
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(delta) => self.position as i64 + delta,
            SeekFrom::End(delta) => self.content_length as i64 + delta,
        };
        if new_pos < 0 {
            return Err(StorageError::InvalidArgument("seek before start of object".into()));
        }
        self.position = new_pos as u64;
        Ok(self.position)
    }

    pub fn path(&self) -> &str {
        &self.logical_path
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }
}

/// A temp file opened once and appended to as the buffer spills past
/// `memory_load_limit` (spec §9 `MEMORY_LOAD_LIMIT`).
struct Spill {
    handle: std::fs::File,
    named: tempfile::NamedTempFile,
    len: u64,
}

pub struct WriteHandle {
    provider: Arc<dyn StorageProvider>,
    metadata_provider: Option<Arc<dyn MetadataProvider>>,
    retry_policy: RetryPolicy,
    logical_path: String,
    buffer: Vec<u8>,
    spill: Option<Spill>,
    memory_load_limit: u64,
    closed: bool,
}

impl WriteHandle {
    fn spilled_len(&self) -> u64 {
        self.spill.as_ref().map(|s| s.len).unwrap_or(0)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(StorageError::InvalidArgument("write to a closed handle".into()));
        }
        use std::io::Write as _;

        if self.spill.is_none() && self.buffer.len() as u64 + data.len() as u64 > self.memory_load_limit {
            debug!(path = %self.logical_path, "write handle spilling to a temp file past MEMORY_LOAD_LIMIT");
            let named = tempfile::NamedTempFile::new().map_err(StorageError::Io)?;
            let mut handle = named.reopen().map_err(StorageError::Io)?;
            handle.write_all(&self.buffer).map_err(StorageError::Io)?;
            let len = self.buffer.len() as u64;
            self.buffer.clear();
            self.spill = Some(Spill { handle, named, len });
        }

        if let Some(spill) = &mut self.spill {
            spill.handle.write_all(data).map_err(StorageError::Io)?;
            spill.len += data.len() as u64;
        } else {
            self.buffer.extend_from_slice(data);
        }
        Ok(data.len())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let bytes = match self.spill.take() {
            Some(spill) => Bytes::from(tokio::fs::read(spill.named.path()).await?),
            None => Bytes::from(std::mem::take(&mut self.buffer)),
        };
        StorageClient::write_via(&self.provider, &self.metadata_provider, &self.retry_policy, &self.logical_path, bytes).await?;
        Ok(())
    }
}

async fn put_with_retry(
    provider: &Arc<dyn StorageProvider>,
    retry_policy: &RetryPolicy,
    path: &str,
    body: Bytes,
    options: PutOptions,
) -> Result<String> {
    retry(retry_policy, |_| {
        let body = body.clone();
        let options = options.clone();
        async move { provider.put(path, PutBody::Bytes(body), options).await }
    })
    .await
}

async fn get_with_retry(
    provider: &Arc<dyn StorageProvider>,
    retry_policy: &RetryPolicy,
    path: &str,
    range: Option<Range>,
) -> Result<Bytes> {
    retry(retry_policy, |_| async move { provider.get(path, range).await }).await
}

pub fn physical_path_for(base_path: &str, path: &str) -> String {
    full_path(base_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::file::FileConfig;

    async fn client(dir: &std::path::Path) -> Arc<StorageClient> {
        let provider: Arc<dyn StorageProvider> = Arc::new(
            FileConfig {
                base_path: dir.to_string_lossy().to_string(),
                multipart_threshold: crate::provider::DEFAULT_MULTIPART_THRESHOLD,
            }
            .build()
            .unwrap(),
        );
        StorageClient::new("test", provider, None, None)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        client.write("a.txt", Bytes::from_static(b"hello world")).await.unwrap();
        let info = client.info("a.txt").await.unwrap();
        assert_eq!(info.content_length, 11);
        assert_eq!(client.read("a.txt").await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn info_on_absent_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        assert!(matches!(client.info("nope.txt").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn write_handle_is_invisible_until_close() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        let mut handle = client.open("b.txt", "wb").await.unwrap();
        handle.write(b"partial").unwrap();
        assert!(matches!(client.info("b.txt").await, Err(StorageError::NotFound(_))));
        handle.close().await.unwrap();
        assert_eq!(client.read("b.txt").await.unwrap(), Bytes::from_static(b"partial"));
    }

    #[tokio::test]
    async fn glob_matches_double_star() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        client.write("x/data-0.bin", Bytes::from_static(&[0x41; 16])).await.unwrap();
        let matches = client.glob("x/**/*.bin").await.unwrap();
        assert_eq!(matches, vec!["x/data-0.bin".to_string()]);
    }

    #[tokio::test]
    async fn range_read_at_eof_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        client.write("c.txt", Bytes::from_static(b"12345")).await.unwrap();
        let mut handle = client.open("c.txt", "rb").await.unwrap();
        handle.seek(SeekFrom::Start(5)).unwrap();
        assert_eq!(handle.read(Some(10)).await.unwrap(), Bytes::new());
    }
}
