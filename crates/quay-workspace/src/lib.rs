//! The workspace: the orchestrator that drives the resolver, materializes
//! checkouts on disk, reconciles the pins store, and owns edit-mode
//! overrides.
//!
//! Single-root, not a multi-package monorepo: one on-disk sandbox
//! (`checkouts/`, `edits/`, `artifacts/`, `.build/`) rooted at the project
//! directory, built on `quay-repository`/`quay-container`/`quay-pins` for
//! the actual mechanics.

pub mod edit;

use quay_container::{BlockingPackageProvider, PackageContainer};
use quay_pins::{PinsError, PinsStore};
use quay_repository::RepositoryError;
use quay_resolver::{ResolveError, Resolution, Resolver};
use quay_types::{
    CheckoutState, ManagedDependency, ManagedState, PackageIdentity, Pin, ProductFilter,
    Requirement, ResolutionOptions, ResolutionStrategy, Version, VersionOverride,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use edit::EditMode;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Pins(#[from] PinsError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("'{0}' is already being edited")]
    AlreadyEdited(PackageIdentity),
    #[error("edited checkout of '{0}' has uncommitted changes")]
    DirtyWorkTree(PackageIdentity),
    #[error("edited checkout of '{0}' has commits not pushed upstream")]
    UnpushedCommits(PackageIdentity),
    #[error("'{0}' is not currently being edited")]
    NotEdited(PackageIdentity),
    #[error("local dependency '{0}' cannot be edited")]
    LocalDependencyCannotBeEdited(PackageIdentity),
    #[error("the edited checkout for '{0}' is missing; falling back to its prior checkout")]
    MissingEditedCheckout(PackageIdentity),
    #[error("'{0}' depends on a local package while locked to a revision or branch")]
    RevisionDependsOnLocal(PackageIdentity),
    #[error("unknown package '{0}'")]
    UnknownPackage(PackageIdentity),
    #[error("reset refused: packages are being edited: {0:?}")]
    ResetBlockedByEdits(Vec<PackageIdentity>),
}

/// The on-disk sandbox layout rooted at the project directory.
struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    fn checkouts(&self) -> PathBuf {
        self.root.join("checkouts")
    }
    fn edits(&self) -> PathBuf {
        self.root.join("edits")
    }
    fn artifacts(&self) -> PathBuf {
        self.root.join("artifacts")
    }
    fn build(&self) -> PathBuf {
        self.root.join(".build")
    }
    fn pins_file(&self) -> PathBuf {
        self.root.join("Package.pins")
    }
}

/// Drives resolution, checkout materialization, pins reconciliation, and
/// edit-mode overrides for one package's dependency tree.
pub struct Workspace {
    sandbox: Sandbox,
    container: Arc<PackageContainer>,
    pins: PinsStore,
    managed: BTreeMap<PackageIdentity, ManagedDependency>,
}

impl Workspace {
    /// Open (or create) a workspace sandbox rooted at `root`, loading any
    /// existing pins and reconstructing managed-dependency state from them
    /// plus whatever `edits/` currently holds.
    pub fn open(root: impl Into<PathBuf>, container: Arc<PackageContainer>) -> Result<Self, WorkspaceError> {
        let sandbox = Sandbox { root: root.into() };
        let pins = PinsStore::load(&sandbox.pins_file())?;
        let managed = reconcile_managed(&pins, &sandbox, &container);
        Ok(Self { sandbox, container, pins, managed })
    }

    pub fn pins(&self) -> &PinsStore {
        &self.pins
    }

    pub fn managed_dependencies(&self) -> &BTreeMap<PackageIdentity, ManagedDependency> {
        &self.managed
    }

    fn save_pins(&self) -> Result<(), WorkspaceError> {
        self.pins.save(&self.sandbox.pins_file())?;
        Ok(())
    }

    /// Run the resolver against `root_dependencies`, bridging PubGrub's
    /// synchronous `DependencyProvider` onto a blocking task so the async
    /// container fetches it needs stay off the caller's executor thread.
    async fn run_resolver(
        &self,
        root_dependencies: Vec<(PackageIdentity, Requirement, ProductFilter)>,
        options: ResolutionOptions,
    ) -> Result<Resolution, WorkspaceError> {
        let container = Arc::clone(&self.container);
        let pins = self.pins.clone();
        let handle = tokio::runtime::Handle::current();
        let resolution = tokio::task::spawn_blocking(move || {
            let provider = BlockingPackageProvider::new(&container, handle);
            Resolver::new(&provider).resolve(root_dependencies, &options, Some(&pins))
        })
        .await
        .map_err(|e| WorkspaceError::Io(std::io::Error::other(e.to_string())))??;
        Ok(resolution)
    }

    /// Resolve `root_dependencies` and write the result to disk: checkouts
    /// materialized, pins saved, managed-dependency state updated. Packages
    /// currently in edit mode are left untouched on disk (their managed
    /// state stays `Edited`) but still get a fresh pin recorded underneath.
    pub async fn resolve(
        &mut self,
        root_dependencies: Vec<(PackageIdentity, Requirement, ProductFilter)>,
        options: ResolutionOptions,
    ) -> Result<Resolution, WorkspaceError> {
        let resolution = self.run_resolver(root_dependencies, options).await?;
        self.materialize(&resolution).await?;
        Ok(resolution)
    }

    /// `update`: re-resolve, but hold every package not named in `packages`
    /// to its current pin by overriding its requirement to an exact match.
    /// `packages.is_empty()` means "update everything".
    pub async fn update(
        &mut self,
        root_dependencies: Vec<(PackageIdentity, Requirement, ProductFilter)>,
        packages: &[PackageIdentity],
        dry_run: bool,
    ) -> Result<Resolution, WorkspaceError> {
        let mut options = ResolutionOptions { strategy: ResolutionStrategy::Highest, ..Default::default() };
        if !packages.is_empty() {
            for (identity, pin) in self.pins.iter().map(|p| (p.identity.clone(), p)) {
                if packages.contains(&identity) {
                    continue;
                }
                if let CheckoutState::Version { version, .. } = &pin.state {
                    options.overrides.push(VersionOverride {
                        package: identity.to_string(),
                        requirement: exact_requirement(version),
                    });
                }
            }
        }

        let resolution = self.run_resolver(root_dependencies, options).await?;
        if !dry_run {
            self.materialize(&resolution).await?;
        }
        Ok(resolution)
    }

    /// Ensure every non-local, non-edited resolved package has a checkout
    /// at `checkouts/<identity>-<hex>` matching its resolved revision, and
    /// persist the resulting pins.
    async fn materialize(&mut self, resolution: &Resolution) -> Result<(), WorkspaceError> {
        for dep in resolution.packages.values() {
            if self.container.is_local(&dep.identity) {
                self.managed.insert(dep.identity.clone(), ManagedDependency {
                    reference: local_reference(&self.container, &dep.identity),
                    subpath: PathBuf::new(),
                    state: ManagedState::Local,
                });
                continue;
            }

            let Some(url) = self.container.url_for(&dep.identity) else {
                continue;
            };
            let manager = self.container.manager();
            let repo_path = manager.ensure_fetched(&dep.identity, &url).await?;
            let tags = manager.tags(repo_path.clone()).await?;

            let (checkout_state, revision) = match &dep.version {
                quay_resolver::QuayVersion::Semver(v) => {
                    let revision = tags
                        .iter()
                        .find(|t| t.version.as_ref() == Some(v))
                        .map(|t| t.revision.clone())
                        .ok_or_else(|| RepositoryError::RevisionNotFound(v.to_string()))?;
                    (CheckoutState::Version { version: v.clone(), revision: revision.clone() }, revision)
                }
                quay_resolver::QuayVersion::Ref(r) => {
                    if let Some(branch) = r.strip_prefix("branch:") {
                        let revision = manager.resolve_revision(repo_path.clone(), branch.to_string()).await?;
                        (CheckoutState::Branch { branch: branch.to_string(), revision: revision.clone() }, revision)
                    } else {
                        let raw = r.strip_prefix("revision:").unwrap_or(r);
                        let revision = manager.resolve_revision(repo_path.clone(), raw.to_string()).await?;
                        (CheckoutState::Revision { revision: revision.clone() }, revision)
                    }
                }
            };

            let pin = Pin { identity: dep.identity.clone(), repository_url: url.clone(), state: checkout_state.clone() };
            self.pins.pin(pin);

            let already_edited = matches!(
                self.managed.get(&dep.identity).map(|m| &m.state),
                Some(ManagedState::Edited { .. })
            );
            if !already_edited {
                let dest = self.sandbox.checkouts().join(repo_checkout_name(&dep.identity, &repo_path));
                manager.checkout(&dep.identity, &url, repo_path, revision, dest.clone()).await?;
                self.managed.insert(dep.identity.clone(), ManagedDependency {
                    reference: quay_types::PackageReference::remote(&self.pins.get(&dep.identity).unwrap().repository_url)
                        .map_err(|e| WorkspaceError::Io(std::io::Error::other(e.to_string())))?,
                    subpath: dest,
                    state: ManagedState::Checkout { state: checkout_state },
                });
            }
        }

        self.save_pins()?;
        Ok(())
    }

    /// `reset`: drop all resolver-derived on-disk state (checkouts, pins,
    /// managed state) so the next `resolve` starts clean. Refuses when
    /// anything is being edited — the edit working tree is user data.
    pub fn reset(&mut self) -> Result<(), WorkspaceError> {
        let edited: Vec<PackageIdentity> = self
            .managed
            .iter()
            .filter(|(_, m)| matches!(m.state, ManagedState::Edited { .. }))
            .map(|(id, _)| id.clone())
            .collect();
        if !edited.is_empty() {
            return Err(WorkspaceError::ResetBlockedByEdits(edited));
        }

        if self.sandbox.checkouts().exists() {
            std::fs::remove_dir_all(self.sandbox.checkouts())?;
        }
        let pins_path = self.sandbox.pins_file();
        if pins_path.exists() {
            std::fs::remove_file(pins_path)?;
        }
        self.pins = PinsStore::new();
        self.managed.clear();
        Ok(())
    }

    /// `clean`: remove ephemeral build outputs only; checkouts and pins
    /// are untouched.
    pub fn clean(&self) -> Result<(), WorkspaceError> {
        if self.sandbox.build().exists() {
            std::fs::remove_dir_all(self.sandbox.build())?;
        }
        Ok(())
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox.root
    }

    pub fn edits_dir(&self) -> PathBuf {
        self.sandbox.edits()
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.sandbox.artifacts()
    }

    pub fn container(&self) -> &Arc<PackageContainer> {
        &self.container
    }

    pub(crate) fn managed_mut(&mut self) -> &mut BTreeMap<PackageIdentity, ManagedDependency> {
        &mut self.managed
    }

    pub(crate) fn pins_mut(&mut self) -> &mut PinsStore {
        &mut self.pins
    }
}

fn exact_requirement(version: &Version) -> semver::VersionReq {
    semver::VersionReq::parse(&format!("={version}")).unwrap_or_else(|_| semver::VersionReq::STAR)
}

fn repo_checkout_name(identity: &PackageIdentity, bare_repo: &Path) -> String {
    bare_repo
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| identity.to_string())
}

fn local_reference(container: &PackageContainer, identity: &PackageIdentity) -> quay_types::PackageReference {
    let path = container.local_path_for(identity).unwrap_or_default();
    quay_types::PackageReference { identity: identity.clone(), kind: quay_types::PackageKind::Local { path } }
}

/// Rebuild in-memory managed-dependency state at open time: anything pinned
/// is a `Checkout`, unless `edits/<identity>` exists on disk, in which case
/// it's `Edited`. Local packages aren't represented in pins at all; callers
/// learn about those the first time `resolve` runs.
fn reconcile_managed(
    pins: &PinsStore,
    sandbox: &Sandbox,
    container: &PackageContainer,
) -> BTreeMap<PackageIdentity, ManagedDependency> {
    let mut managed = BTreeMap::new();
    for pin in pins.iter() {
        let edit_path = sandbox.edits().join(pin.identity.to_string());
        let reference = quay_types::PackageReference::remote(&pin.repository_url)
            .unwrap_or_else(|_| local_reference(container, &pin.identity));
        let state = if edit_path.exists() {
            ManagedState::Edited { path: edit_path.clone(), based_on: Some(pin.state.clone()) }
        } else {
            ManagedState::Checkout { state: pin.state.clone() }
        };
        managed.insert(pin.identity.clone(), ManagedDependency { reference, subpath: edit_path, state });
    }
    managed
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_repository::{RepositoryCache, RepositoryManager};

    fn new_container(tmp: &Path) -> Arc<PackageContainer> {
        let cache = RepositoryCache::open_at(tmp.join("cache")).unwrap();
        Arc::new(PackageContainer::new(RepositoryManager::new(cache), quay_mirrors::Mirrors::default()))
    }

    #[test]
    fn opening_an_empty_sandbox_has_no_managed_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        let container = new_container(tmp.path());
        let ws = Workspace::open(tmp.path().join("ws"), container).unwrap();
        assert!(ws.managed_dependencies().is_empty());
        assert!(ws.pins().is_empty());
    }

    #[test]
    fn reset_is_refused_while_a_package_is_edited() {
        let tmp = tempfile::tempdir().unwrap();
        let container = new_container(tmp.path());
        let mut ws = Workspace::open(tmp.path().join("ws"), container).unwrap();
        let identity = PackageIdentity::from_location("https://example.com/swift-log").unwrap();
        ws.managed_mut().insert(identity.clone(), ManagedDependency {
            reference: quay_types::PackageReference::remote("https://example.com/swift-log").unwrap(),
            subpath: PathBuf::from("edits/swift-log"),
            state: ManagedState::Edited { path: PathBuf::from("edits/swift-log"), based_on: None },
        });

        let err = ws.reset().unwrap_err();
        assert!(matches!(err, WorkspaceError::ResetBlockedByEdits(ids) if ids == vec![identity]));
    }
}
