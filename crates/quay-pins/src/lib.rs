//! The pins store (`Package.pins`): the persisted record of exactly which
//! revision each dependency was last resolved to.
//!
//! Pins are hints the resolver prefers, not hard constraints — see
//! `quay-resolver`'s use of `PinsStore::preferred` when choosing a version.
//! Writes go through a temp-file-then-rename so a crash mid-save never
//! leaves a truncated pins file on disk.

use quay_types::{CheckoutState, PackageIdentity, Pin, Version};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PinsError {
    #[error("failed to read pins file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse pins file: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("unsupported pins file version: {0}")]
    UnsupportedVersion(u32),
}

const PINS_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PinEntry {
    identity: String,
    #[serde(rename = "repositoryURL")]
    repository_url: String,
    state: PinState,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PinState {
    revision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PinsFile {
    version: u32,
    pins: Vec<PinEntry>,
}

/// The set of pins currently on disk, keyed by package identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinsStore {
    pins: BTreeMap<PackageIdentity, Pin>,
}

impl PinsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Load from `path`. A missing file is an empty store, not an error
    /// (a fresh checkout has no pins yet).
    pub fn load(path: &Path) -> Result<Self, PinsError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let file: PinsFile = serde_json::from_str(&content)?;
        if file.version != PINS_FILE_VERSION {
            return Err(PinsError::UnsupportedVersion(file.version));
        }

        let mut pins = BTreeMap::new();
        for entry in file.pins {
            let identity = PackageIdentity::from_location(&entry.identity)
                .unwrap_or_else(|_| PackageIdentity::from_location(&entry.repository_url).unwrap());
            let state = if let Some(version) = entry.state.version {
                CheckoutState::Version {
                    version: Version::parse(&version).unwrap_or_else(|_| Version::new(0, 0, 0)),
                    revision: entry.state.revision.clone(),
                }
            } else if let Some(branch) = entry.state.branch {
                CheckoutState::Branch {
                    branch,
                    revision: entry.state.revision.clone(),
                }
            } else {
                CheckoutState::Revision {
                    revision: entry.state.revision.clone(),
                }
            };

            pins.insert(
                identity.clone(),
                Pin {
                    identity,
                    repository_url: entry.repository_url,
                    state,
                },
            );
        }

        Ok(Self { pins })
    }

    /// Atomically persist the store: readers either see the file from
    /// before this call or the file from after it, never a partial write.
    /// Implemented as write-to-temp-then-rename, since rename is atomic on
    /// the same filesystem.
    pub fn save(&self, path: &Path) -> Result<(), PinsError> {
        let mut entries: Vec<PinEntry> = self
            .pins
            .values()
            .map(|pin| {
                let (revision, version, branch) = match &pin.state {
                    CheckoutState::Version { version, revision } => {
                        (revision.clone(), Some(version.to_string()), None)
                    }
                    CheckoutState::Revision { revision } => (revision.clone(), None, None),
                    CheckoutState::Branch { branch, revision } => {
                        (revision.clone(), None, Some(branch.clone()))
                    }
                };
                PinEntry {
                    identity: pin.identity.to_string(),
                    repository_url: pin.repository_url.clone(),
                    state: PinState {
                        revision,
                        version,
                        branch,
                    },
                }
            })
            .collect();
        // sorted by identity, per the schema
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));

        let file = PinsFile {
            version: PINS_FILE_VERSION,
            pins: entries,
        };
        let content = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = temp_path_for(path);
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!("wrote {} pins to {}", self.pins.len(), path.display());
        Ok(())
    }

    pub fn pin(&mut self, pin: Pin) {
        self.pins.insert(pin.identity.clone(), pin);
    }

    pub fn remove(&mut self, identity: &PackageIdentity) -> Option<Pin> {
        self.pins.remove(identity)
    }

    pub fn get(&self, identity: &PackageIdentity) -> Option<&Pin> {
        self.pins.get(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pin> {
        self.pins.values()
    }

    /// Preferred version for `identity`, if a version pin exists. Used by
    /// the resolver as a hint, never a hard constraint.
    pub fn preferred_version(&self, identity: &PackageIdentity) -> Option<&Version> {
        match self.pins.get(identity).map(|p| &p.state) {
            Some(CheckoutState::Version { version, .. }) => Some(version),
            _ => None,
        }
    }

    pub fn preferred_revision(&self, identity: &PackageIdentity) -> Option<&str> {
        self.pins.get(identity).map(|p| p.state.revision())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = tmp
        .file_name()
        .map(|n| format!("{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| "pins.tmp".to_string());
    tmp.set_file_name(file_name);
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pin() -> Pin {
        Pin {
            identity: PackageIdentity::from_location("https://example.com/swift-log").unwrap(),
            repository_url: "https://example.com/swift-log".to_string(),
            state: CheckoutState::Version {
                version: Version::new(1, 5, 4),
                revision: "deadbeef".to_string(),
            },
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Package.pins");

        let mut store = PinsStore::new();
        store.pin(sample_pin());
        store.save(&path).unwrap();

        let reloaded = PinsStore::load(&path).unwrap();
        assert_eq!(reloaded, store);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PinsStore::load(&dir.path().join("nope.pins")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn preferred_version_is_hint_only() {
        let mut store = PinsStore::new();
        let pin = sample_pin();
        let identity = pin.identity.clone();
        store.pin(pin);
        assert_eq!(store.preferred_version(&identity), Some(&Version::new(1, 5, 4)));
    }

    #[test]
    fn save_is_sorted_by_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Package.pins");
        let mut store = PinsStore::new();
        store.pin(Pin {
            identity: PackageIdentity::from_location("https://example.com/zeta").unwrap(),
            repository_url: "https://example.com/zeta".to_string(),
            state: CheckoutState::Revision {
                revision: "1".to_string(),
            },
        });
        store.pin(Pin {
            identity: PackageIdentity::from_location("https://example.com/alpha").unwrap(),
            repository_url: "https://example.com/alpha".to_string(),
            state: CheckoutState::Revision {
                revision: "2".to_string(),
            },
        });
        store.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let alpha_pos = content.find("alpha").unwrap();
        let zeta_pos = content.find("zeta").unwrap();
        assert!(alpha_pos < zeta_pos);
    }
}
