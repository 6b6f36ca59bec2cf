//! Content-addressed local store for working-tree snapshots and the
//! on-disk layout (`repositories/`, `checkouts/`).
//!
//! Two-char prefix sharding, idempotent stores (skip the write if the
//! destination already exists), hard-link-first file placement with a copy
//! fallback.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to create cache directory: {0}")]
    CreateDirError(io::Error),
    #[error("failed to read cached file: {0}")]
    ReadError(io::Error),
    #[error("failed to write cached file: {0}")]
    WriteError(io::Error),
    #[error("failed to link cached file: {0}")]
    LinkError(io::Error),
    #[error("no cache directory available for this platform")]
    NoCacheDir,
}

/// Root of the on-disk cache: bare repository clones, a content-addressed
/// object store for working-tree file hashing, and the user-facing
/// checkouts directory.
pub struct RepositoryCache {
    root: PathBuf,
}

impl RepositoryCache {
    pub fn open_default() -> Result<Self, CacheError> {
        let root = directories::ProjectDirs::from("dev", "quay", "quay")
            .map(|d| d.cache_dir().to_path_buf())
            .ok_or(CacheError::NoCacheDir)?;
        Self::open_at(root)
    }

    pub fn open_at(root: PathBuf) -> Result<Self, CacheError> {
        let cache = Self { root };
        cache.ensure_dirs()?;
        Ok(cache)
    }

    fn ensure_dirs(&self) -> Result<(), CacheError> {
        for dir in [self.repositories_dir(), self.checkouts_dir(), self.objects_dir()] {
            fs::create_dir_all(dir).map_err(CacheError::CreateDirError)?;
        }
        Ok(())
    }

    /// Bare clones live here, one subdirectory per repository, keyed by
    /// identity plus an 8-hex-char suffix derived from the location (see
    /// `repository_dir_name`).
    pub fn repositories_dir(&self) -> PathBuf {
        self.root.join("repositories")
    }

    /// Mutable, user-facing checkouts of resolved dependencies.
    pub fn checkouts_dir(&self) -> PathBuf {
        self.root.join("checkouts")
    }

    /// Content-addressed store for working-tree file hashing.
    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    pub fn content_path(&self, hash_hex: &str) -> PathBuf {
        let (prefix, rest) = hash_hex.split_at(2.min(hash_hex.len()));
        self.objects_dir().join(prefix).join(rest)
    }

    /// Idempotently store `bytes` under its content hash, returning the path.
    pub fn store_bytes(&self, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let hash = quay_types::checksum_hex(bytes);
        let dest = self.content_path(&hash);
        if dest.exists() {
            return Ok(dest);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(CacheError::CreateDirError)?;
        }
        fs::write(&dest, bytes).map_err(CacheError::WriteError)?;
        Ok(dest)
    }

    /// Hard-link `dest` to the cached content at `src`, falling back to a
    /// copy if hard-linking fails (e.g. across filesystems).
    pub fn link_file(&self, src: &Path, dest: &Path) -> Result<(), CacheError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(CacheError::CreateDirError)?;
        }
        if fs::hard_link(src, dest).is_err() {
            fs::copy(src, dest).map_err(CacheError::LinkError)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_bytes_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RepositoryCache::open_at(dir.path().to_path_buf()).unwrap();
        let path1 = cache.store_bytes(b"hello").unwrap();
        let path2 = cache.store_bytes(b"hello").unwrap();
        assert_eq!(path1, path2);
        assert!(path1.exists());
    }

    #[test]
    fn content_path_shards_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RepositoryCache::open_at(dir.path().to_path_buf()).unwrap();
        let path = cache.content_path("abcdef1234");
        assert!(path.starts_with(cache.objects_dir().join("ab")));
    }
}
