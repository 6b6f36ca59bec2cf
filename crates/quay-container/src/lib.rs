//! Package containers: the thing a manifest loader and the resolver query
//! for "what versions exist" and "what does version X depend on", backed
//! either by a local directory or by a git repository.
//!
//! One type with two backing variants rather than a trait-object subclass
//! hierarchy, wrapping `quay-repository` for fetch/tags/checkout and
//! `quay-manifest` for parsing, with a dependency-query cache keyed by
//! `(identity, revision)` so repeated lookups during search don't re-fetch
//! or re-parse.

use quay_manifest::ManifestError;
use quay_mirrors::Mirrors;
use quay_repository::{RepositoryError, RepositoryManager};
use quay_resolver::provider::PackageProvider;
use quay_resolver::{QuayVersion, ResolveError};
use quay_types::{Manifest, PackageIdentity, PackageReference, ProductFilter, Requirement};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("local package at {0} has no manifest")]
    MissingLocalManifest(PathBuf),
}

impl From<ContainerError> for ResolveError {
    fn from(err: ContainerError) -> Self {
        ResolveError::ProviderError(err.to_string())
    }
}

/// One package's backing: either a path on disk (no versioning, always
/// "current") or a git repository (versioned by tag/branch/revision).
enum Backing {
    Local { path: PathBuf },
    Repository { url: String },
}

struct PackageEntry {
    identity: PackageIdentity,
    backing: Backing,
}

/// Caches manifests already loaded at a given `(identity, revision)` so
/// repeated `get_dependencies` calls during search don't re-fetch or
/// re-parse.
pub struct PackageContainer {
    manager: RepositoryManager,
    mirrors: Mirrors,
    packages: Mutex<HashMap<PackageIdentity, PackageEntry>>,
    manifest_cache: Mutex<HashMap<(PackageIdentity, String), Manifest>>,
}

impl PackageContainer {
    pub fn new(manager: RepositoryManager, mirrors: Mirrors) -> Self {
        Self {
            manager,
            mirrors,
            packages: Mutex::new(HashMap::new()),
            manifest_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a package's backing, rewriting a remote URL through the
    /// mirror table first. This is the only place a user-provided location
    /// becomes a stored backing, so it's the one place mirrors need to be
    /// applied — every other lookup (`available_versions`, `manifest_at`,
    /// workspace materialization) reads the already-rewritten URL back out.
    pub fn register(&self, reference: &PackageReference) {
        let backing = match &reference.kind {
            quay_types::PackageKind::Local { path } => Backing::Local { path: path.clone() },
            quay_types::PackageKind::Remote { url } => {
                Backing::Repository { url: self.mirrors.apply(url) }
            }
        };

        let mut packages = self.packages.lock().unwrap();
        if let Some(existing) = packages.get(&reference.identity) {
            let same_kind = matches!(
                (&existing.backing, &backing),
                (Backing::Local { .. }, Backing::Local { .. }) | (Backing::Repository { .. }, Backing::Repository { .. })
            );
            if !same_kind {
                // A path-vs-URL identity conflict has no defined winner; surface it
                // instead of silently picking one.
                tracing::warn!(
                    "package '{}' was already registered with a different source kind; keeping the first registration",
                    reference.identity
                );
                return;
            }
        }

        packages.insert(
            reference.identity.clone(),
            PackageEntry { identity: reference.identity.clone(), backing },
        );
    }

    fn entry_url(&self, identity: &PackageIdentity) -> Option<String> {
        let packages = self.packages.lock().unwrap();
        match &packages.get(identity)?.backing {
            Backing::Repository { url } => Some(url.clone()),
            Backing::Local { .. } => None,
        }
    }

    /// The repository URL backing `identity`, if it isn't a local package.
    pub fn url_for(&self, identity: &PackageIdentity) -> Option<String> {
        self.entry_url(identity)
    }

    /// The local path backing `identity`, if it isn't repository-backed.
    pub fn local_path_for(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        let packages = self.packages.lock().unwrap();
        match &packages.get(identity)?.backing {
            Backing::Local { path } => Some(path.clone()),
            Backing::Repository { .. } => None,
        }
    }

    pub fn is_local(&self, identity: &PackageIdentity) -> bool {
        matches!(
            self.packages.lock().unwrap().get(identity).map(|e| &e.backing),
            Some(Backing::Local { .. })
        )
    }

    /// The repository manager backing this container's fetch/checkout work.
    pub fn manager(&self) -> &RepositoryManager {
        &self.manager
    }

    /// Candidate versions for a package: every semver-parseable tag for a
    /// repository backing, or a single `Ref("local")` for a local backing.
    pub async fn available_versions(&self, identity: &PackageIdentity) -> Result<Vec<QuayVersion>, ContainerError> {
        let backing_is_local = matches!(
            self.packages.lock().unwrap().get(identity).map(|e| &e.backing),
            Some(Backing::Local { .. })
        );
        if backing_is_local {
            return Ok(vec![QuayVersion::Ref("local".to_string())]);
        }

        let url = self.entry_url(identity).ok_or_else(|| {
            ContainerError::Manifest(ManifestError::ValidationError(format!("unknown package {identity}")))
        })?;
        let repo_path = self.manager.ensure_fetched(identity, &url).await?;
        let tags = self.manager.tags(repo_path).await?;
        Ok(tags.into_iter().filter_map(|t| t.version).map(QuayVersion::Semver).collect())
    }

    /// Load (and cache) the manifest for `identity` at `version`.
    pub async fn manifest_at(&self, identity: &PackageIdentity, version: &QuayVersion) -> Result<Manifest, ContainerError> {
        let revision_key = version.to_string();
        {
            let cache = self.manifest_cache.lock().unwrap();
            if let Some(manifest) = cache.get(&(identity.clone(), revision_key.clone())) {
                return Ok(manifest.clone());
            }
        }

        let backing_path = {
            let packages = self.packages.lock().unwrap();
            packages.get(identity).map(|e| match &e.backing {
                Backing::Local { path } => Some(path.clone()),
                Backing::Repository { .. } => None,
            })
        };

        let manifest = match backing_path.flatten() {
            Some(path) => {
                let manifest_path = quay_manifest::find_manifest(&path)
                    .map_err(|_| ContainerError::MissingLocalManifest(path.clone()))?;
                quay_manifest::load(&manifest_path)?
            }
            None => {
                let url = self.entry_url(identity).ok_or_else(|| {
                    ContainerError::Manifest(ManifestError::ValidationError(format!("unknown package {identity}")))
                })?;
                let repo_path = self.manager.ensure_fetched(identity, &url).await?;
                let tags = self.manager.tags(repo_path.clone()).await?;
                let revision = match version {
                    QuayVersion::Semver(v) => tags
                        .into_iter()
                        .find(|t| t.version.as_ref() == Some(v))
                        .map(|t| t.revision)
                        .ok_or_else(|| RepositoryError::RevisionNotFound(v.to_string()))?,
                    QuayVersion::Ref(r) => {
                        let rev = r.strip_prefix("branch:").or_else(|| r.strip_prefix("revision:")).unwrap_or(r);
                        self.manager.resolve_revision(repo_path.clone(), rev.to_string()).await?
                    }
                };
                let provider = self.manager.provider();
                let bytes = provider.read_file_at_revision(&repo_path, &revision, quay_manifest::MANIFEST_FILE_NAME)?;
                let content = String::from_utf8_lossy(&bytes).to_string();
                quay_manifest::parse_manifest(&content)?
            }
        };

        self.manifest_cache
            .lock()
            .unwrap()
            .insert((identity.clone(), revision_key), manifest.clone());
        Ok(manifest)
    }
}

/// A thin `quay_resolver::PackageProvider` adapter that runs the async
/// container methods on a handed-in tokio runtime handle (PubGrub's
/// `DependencyProvider` trait is synchronous).
pub struct BlockingPackageProvider<'a> {
    container: &'a PackageContainer,
    runtime: tokio::runtime::Handle,
}

impl<'a> BlockingPackageProvider<'a> {
    pub fn new(container: &'a PackageContainer, runtime: tokio::runtime::Handle) -> Self {
        Self { container, runtime }
    }
}

impl<'a> PackageProvider for BlockingPackageProvider<'a> {
    fn available_versions(&self, identity: &PackageIdentity) -> Result<Vec<QuayVersion>, ResolveError> {
        self.runtime
            .block_on(self.container.available_versions(identity))
            .map_err(Into::into)
    }

    fn dependencies(
        &self,
        identity: &PackageIdentity,
        version: &QuayVersion,
        filter: &ProductFilter,
    ) -> Result<Vec<(PackageIdentity, Requirement, ProductFilter)>, ResolveError> {
        let manifest = self
            .runtime
            .block_on(self.container.manifest_at(identity, version))
            .map_err(ResolveError::from)?;

        Ok(manifest
            .dependencies
            .into_iter()
            .filter(|dep| dep.products.is_empty() || dep.products.iter().any(|p| filter.contains(p)))
            .map(|dep| {
                // The resolver only ever sees identities; this is the one place a
                // dependency's backing (URL or local path) becomes known, so register
                // it here rather than requiring callers to pre-walk every manifest.
                self.container.register(&dep.reference);
                let dep_filter = if dep.products.is_empty() {
                    ProductFilter::Everything
                } else {
                    ProductFilter::specific(dep.products.clone())
                };
                (dep.reference.identity.clone(), dep.requirement, dep_filter)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_repository::RepositoryCache;

    #[test]
    fn local_backing_reports_single_ref_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Package.toml"),
            "[package]\nname = \"local-lib\"\n",
        )
        .unwrap();

        let cache = RepositoryCache::open_at(tempfile::tempdir().unwrap().path().to_path_buf()).unwrap();
        let manager = RepositoryManager::new(cache);
        let container = PackageContainer::new(manager, Mirrors::default());

        let reference = PackageReference::local(dir.path().to_string_lossy().to_string()).unwrap();
        container.register(&reference);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let versions = runtime.block_on(container.available_versions(&reference.identity)).unwrap();
        assert_eq!(versions, vec![QuayVersion::Ref("local".to_string())]);
    }

    #[test]
    fn register_rewrites_a_remote_url_through_the_mirror_table() {
        let cache = RepositoryCache::open_at(tempfile::tempdir().unwrap().path().to_path_buf()).unwrap();
        let manager = RepositoryManager::new(cache);

        let mut mirrors = Mirrors::default();
        mirrors.set("https://github.com/org/repo", "https://mirror.example.com/org/repo");
        let container = PackageContainer::new(manager, mirrors);

        let reference = PackageReference::remote("https://github.com/org/repo").unwrap();
        container.register(&reference);

        assert_eq!(container.url_for(&reference.identity).as_deref(), Some("https://mirror.example.com/org/repo"));
    }
}
