//! Manifest parse caching, keyed by the content hash of `Package.toml`.
//!
//! Parsing itself is cheap here (no external toolchain is shelled out to),
//! but the cache still pays for itself when the same manifest is parsed
//! repeatedly during a single resolve (once per dependent that requests it).

use quay_types::checksum_hex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub struct ManifestCache {
    cache_dir: PathBuf,
}

impl ManifestCache {
    pub fn open() -> io::Result<Self> {
        let cache_dir = directories::ProjectDirs::from("dev", "quay", "quay")
            .map(|d| d.cache_dir().join("manifests"))
            .unwrap_or_else(|| PathBuf::from("/tmp/quay-manifest-cache"));

        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_key(path: &Path) -> io::Result<String> {
        let content = fs::read(path)?;
        Ok(checksum_hex(&content))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let cache_path = self.cache_dir.join(format!("{key}.json"));
        fs::read_to_string(cache_path).ok()
    }

    pub fn put(&self, key: &str, json: &str) -> io::Result<()> {
        let cache_path = self.cache_dir.join(format!("{key}.json"));
        fs::write(cache_path, json)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache_dir.join(format!("{key}.json")).exists()
    }

    pub fn clear(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> io::Result<CacheStats> {
        let mut count = 0;
        let mut size = 0;

        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.path().extension().map(|e| e == "json").unwrap_or(false) {
                count += 1;
                size += entry.metadata()?.len();
            }
        }

        Ok(CacheStats { count, size })
    }
}

#[derive(Debug)]
pub struct CacheStats {
    pub count: usize,
    pub size: u64,
}
