//! Mirror table: rewrites a dependency's declared location to an
//! alternate one before identity derivation and fetching.
//!
//! Persisted as a small TOML file under the user's cache directory, the
//! same `ProjectDirs` root every other `quay-*` crate uses. The path can be
//! overridden with the `MIRROR_CONFIG` environment variable, primarily for
//! tests and CI.

use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorsError {
    #[error("no cache directory available for this platform")]
    NoCacheDir,
    #[error("failed to read mirrors file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse mirrors file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("failed to serialize mirrors file: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct RawMirrors {
    #[serde(default)]
    mirrors: BTreeMap<String, String>,
}

/// A loaded, mutable mirror table.
#[derive(Debug, Clone, Default)]
pub struct Mirrors {
    path: PathBuf,
    table: BTreeMap<String, String>,
}

impl Mirrors {
    /// Default location: `MIRROR_CONFIG` env var if set, else
    /// `<cache dir>/mirrors.toml`.
    pub fn default_path() -> Result<PathBuf, MirrorsError> {
        if let Ok(path) = std::env::var("MIRROR_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let dirs = ProjectDirs::from("dev", "quay", "quay").ok_or(MirrorsError::NoCacheDir)?;
        Ok(dirs.cache_dir().join("mirrors.toml"))
    }

    /// Load the mirror table from `path`, or return an empty table if the
    /// file doesn't exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MirrorsError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                table: BTreeMap::new(),
            });
        }
        let content = std::fs::read_to_string(&path)?;
        let raw: RawMirrors = toml::from_str(&content)?;
        Ok(Self {
            path,
            table: raw.mirrors,
        })
    }

    pub fn load_default() -> Result<Self, MirrorsError> {
        Self::load(Self::default_path()?)
    }

    /// Rewrite `location` if a mirror is registered for it, otherwise
    /// return it unchanged.
    pub fn apply(&self, location: &str) -> String {
        self.table
            .get(location)
            .cloned()
            .unwrap_or_else(|| location.to_string())
    }

    pub fn set(&mut self, original_url: impl Into<String>, mirror_url: impl Into<String>) {
        self.table.insert(original_url.into(), mirror_url.into());
    }

    pub fn unset(&mut self, original_url: &str) -> bool {
        self.table.remove(original_url).is_some()
    }

    pub fn get(&self, original_url: &str) -> Option<&str> {
        self.table.get(original_url).map(String::as_str)
    }

    pub fn save(&self) -> Result<(), MirrorsError> {
        save_atomic(&self.path, &self.table)
    }
}

fn save_atomic(path: &Path, table: &BTreeMap<String, String>) -> Result<(), MirrorsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = RawMirrors {
        mirrors: table.clone(),
    };
    let content = toml::to_string_pretty(&raw)?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    tracing::debug!("wrote mirrors file to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_rewrites_registered_location() {
        let mut mirrors = Mirrors {
            path: PathBuf::from("/tmp/unused-mirrors.toml"),
            table: BTreeMap::new(),
        };
        mirrors.set("https://github.com/org/repo", "https://mirror.example.com/repo");
        assert_eq!(
            mirrors.apply("https://github.com/org/repo"),
            "https://mirror.example.com/repo"
        );
    }

    #[test]
    fn apply_passes_through_unknown_location() {
        let mirrors = Mirrors::default();
        assert_eq!(mirrors.apply("https://github.com/org/repo"), "https://github.com/org/repo");
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirrors.toml");
        let mut mirrors = Mirrors::load(&path).unwrap();
        mirrors.set("a", "b");
        mirrors.save().unwrap();

        let reloaded = Mirrors::load(&path).unwrap();
        assert_eq!(reloaded.get("a"), Some("b"));
    }

    #[test]
    fn unset_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut mirrors = Mirrors::load(dir.path().join("mirrors.toml")).unwrap();
        mirrors.set("a", "b");
        assert!(mirrors.unset("a"));
        assert!(mirrors.get("a").is_none());
    }
}
