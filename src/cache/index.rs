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

//! The cache's sidecar index: one JSON file per cache root tracking entry
//! sizes and timestamps, mutated under an advisory `flock(2)` (spec §4.3,
//! §5 "Cache sidecar index: guarded by advisory file lock (cross-process)
//! plus in-process lock").

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One tracked cache entry (spec §3 "Cache entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub logical_name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    entries: BTreeMap<String, IndexEntry>,
}

/// Cross-process-safe handle to the sidecar index file. In-process
/// callers also serialize through `lock_path`'s `parking_lot::Mutex` so a
/// single process never interleaves two concurrent rewrites.
pub struct CacheIndex {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CacheIndex {
    pub fn open(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            write_document(&path, &IndexDocument::default())?;
        }
        Ok(CacheIndex {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        let _guard = self.lock.lock();
        read_document(&self.path).map(|doc| doc.entries.contains_key(key)).unwrap_or(false)
    }

    pub fn total_size(&self) -> u64 {
        let _guard = self.lock.lock();
        read_document(&self.path)
            .map(|doc| doc.entries.values().map(|e| e.size).sum())
            .unwrap_or(0)
    }

    pub fn entries(&self) -> Vec<IndexEntry> {
        let _guard = self.lock.lock();
        read_document(&self.path)
            .map(|doc| doc.entries.into_values().collect())
            .unwrap_or_default()
    }

    pub fn upsert(&self, entry: IndexEntry) -> Result<()> {
        let _guard = self.lock.lock();
        with_locked_document(&self.path, |doc| {
            doc.entries.insert(entry.logical_name.clone(), entry);
        })
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        with_locked_document(&self.path, |doc| {
            doc.entries.remove(key);
        })
    }

    pub fn touch_access(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        with_locked_document(&self.path, |doc| {
            if let Some(entry) = doc.entries.get_mut(key) {
                entry.last_access = Utc::now();
            }
        })
    }
}

fn read_document(path: &PathBuf) -> Result<IndexDocument> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    if contents.trim().is_empty() {
        return Ok(IndexDocument::default());
    }
    Ok(serde_json::from_str(&contents)?)
}

fn write_document(path: &PathBuf, doc: &IndexDocument) -> Result<()> {
    let contents = serde_json::to_vec_pretty(doc)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Opens the index file, takes an exclusive `flock(2)`, reads-modifies-
/// writes it under the lock, then releases. Scoped to a single call so
/// the lock is never held across an `.await` point (all of this module's
/// I/O is synchronous `std::fs`).
fn with_locked_document(path: &PathBuf, mutate: impl FnOnce(&mut IndexDocument)) -> Result<()> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let fd = file.as_raw_fd();
    lock_exclusive(fd)?;
    let result = (|| {
        let mut contents = String::new();
        let mut file_ref = &file;
        file_ref.seek(SeekFrom::Start(0))?;
        file_ref.read_to_string(&mut contents)?;
        let mut doc: IndexDocument = if contents.trim().is_empty() {
            IndexDocument::default()
        } else {
            serde_json::from_str(&contents)?
        };
        mutate(&mut doc);
        let serialized = serde_json::to_vec_pretty(&doc)?;
        file_ref.seek(SeekFrom::Start(0))?;
        file_ref.set_len(0)?;
        file_ref.write_all(&serialized)?;
        Ok(())
    })();
    unlock(fd);
    result
}

fn lock_exclusive(fd: i32) -> Result<()> {
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

fn unlock(fd: i32) {
    unsafe {
        libc::flock(fd, libc::LOCK_UN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_total_size_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index = CacheIndex::open(dir.path().join("index.json")).unwrap();
        index
            .upsert(IndexEntry {
                logical_name: "a".into(),
                size: 10,
                created_at: Utc::now(),
                last_access: Utc::now(),
            })
            .unwrap();
        index
            .upsert(IndexEntry {
                logical_name: "b".into(),
                size: 20,
                created_at: Utc::now(),
                last_access: Utc::now(),
            })
            .unwrap();
        assert_eq!(index.total_size(), 30);
        index.remove("a").unwrap();
        assert_eq!(index.total_size(), 20);
    }
}
