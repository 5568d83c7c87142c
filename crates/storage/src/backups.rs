// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed blob store.
//!
//! Blobs are named by the first 16 hex chars of their SHA-256 digest, so
//! identical content is stored exactly once. Blobs are never mutated.

use crate::StoreError;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Length of the digest prefix used as a blob name.
pub const HASH_LEN: usize = 16;

/// The on-disk blob store.
#[derive(Debug)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Open (creating if needed) a blob store at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|_| StoreError::BadRoot(dir.clone()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hash of a byte slice, as used for blob names.
    pub fn content_hash(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(HASH_LEN);
        for byte in digest.iter().take(HASH_LEN / 2) {
            use std::fmt::Write;
            let _ = write!(hex, "{:02x}", byte);
        }
        hex
    }

    /// Store the given bytes, returning their hash. Existing blobs with the
    /// same hash are left untouched.
    pub fn store_bytes(&self, bytes: &[u8]) -> Result<String, StoreError> {
        let hash = Self::content_hash(bytes);
        let blob = self.dir.join(&hash);
        if !blob.exists() {
            fs::write(&blob, bytes)?;
        }
        Ok(hash)
    }

    /// Read a file and store its contents.
    ///
    /// Returns `None` if the file cannot be read (permissions, races with
    /// deletion): recording is observability, not correctness.
    pub fn store_file(&self, path: &Path) -> Option<String> {
        let bytes = fs::read(path).ok()?;
        self.store_bytes(&bytes).ok()
    }

    /// True if a blob with this hash exists.
    pub fn contains(&self, hash: &str) -> bool {
        self.dir.join(hash).exists()
    }

    /// Copy a blob's bytes back to `dest`, creating parent directories.
    pub fn restore(&self, hash: &str, dest: &Path) -> Result<(), StoreError> {
        let blob = self.dir.join(hash);
        if !blob.exists() {
            return Err(StoreError::MissingBlob(hash.to_string()));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::read(&blob)?;
        fs::write(dest, bytes)?;
        Ok(())
    }

    /// Delete every blob whose hash is not in `live`. Returns the number of
    /// blobs removed.
    pub fn retain(&self, live: &HashSet<String>) -> Result<usize, StoreError> {
        let mut removed = 0;
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if !live.contains(&name) {
                if fs::remove_file(dir_entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "backups_tests.rs"]
mod tests;
