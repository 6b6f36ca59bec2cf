//! Edit mode: swapping a managed dependency's read-only `checkouts/<id>`
//! working tree for a mutable one the user can commit into directly.
//!
//! A missing edit working tree falls back to the prior managed checkout
//! with a warning, rather than failing the load.

use crate::{Workspace, WorkspaceError};
use quay_types::{ManagedDependency, ManagedState, PackageIdentity, PackageKind, PackageReference};
use std::path::PathBuf;

/// How the user wants the edit checkout to track source.
#[derive(Debug, Clone)]
pub enum EditMode {
    Branch(String),
    Revision(String),
    /// Use an existing directory as-is; never cloned or removed by us.
    Path(PathBuf),
}

impl Workspace {
    /// Switch `identity` into edit mode.
    pub async fn edit(&mut self, identity: &PackageIdentity, mode: EditMode) -> Result<(), WorkspaceError> {
        if self.container().is_local(identity) {
            return Err(WorkspaceError::LocalDependencyCannotBeEdited(identity.clone()));
        }
        if matches!(self.managed_dependencies().get(identity).map(|m| &m.state), Some(ManagedState::Edited { .. })) {
            return Err(WorkspaceError::AlreadyEdited(identity.clone()));
        }

        let based_on = self.pins().get(identity).map(|p| p.state.clone());

        let (edit_path, reference) = match mode {
            EditMode::Path(path) => {
                let reference = local_style_reference(identity, &path, self.pins().get(identity).map(|p| p.repository_url.clone()));
                (path, reference)
            }
            EditMode::Branch(branch) => {
                let url = self.pins().get(identity).map(|p| p.repository_url.clone()).ok_or_else(|| WorkspaceError::UnknownPackage(identity.clone()))?;
                let manager = self.container().manager();
                let repo_path = manager.ensure_fetched(identity, &url).await?;
                let revision = manager.resolve_revision(repo_path.clone(), branch.clone()).await?;
                let dest = self.edits_dir().join(identity.to_string());
                manager.checkout(identity, &url, repo_path, revision, dest.clone()).await?;
                (dest, PackageReference::remote(&url).map_err(|e| WorkspaceError::Io(std::io::Error::other(e.to_string())))?)
            }
            EditMode::Revision(revision) => {
                let url = self.pins().get(identity).map(|p| p.repository_url.clone()).ok_or_else(|| WorkspaceError::UnknownPackage(identity.clone()))?;
                let manager = self.container().manager();
                let repo_path = manager.ensure_fetched(identity, &url).await?;
                let resolved = manager.resolve_revision(repo_path.clone(), revision).await?;
                let dest = self.edits_dir().join(identity.to_string());
                manager.checkout(identity, &url, repo_path, resolved, dest.clone()).await?;
                (dest, PackageReference::remote(&url).map_err(|e| WorkspaceError::Io(std::io::Error::other(e.to_string())))?)
            }
        };

        self.managed_mut().insert(
            identity.clone(),
            ManagedDependency {
                reference,
                subpath: edit_path.clone(),
                state: ManagedState::Edited { path: edit_path, based_on },
            },
        );
        Ok(())
    }

    /// Leave edit mode, restoring the dependency to its prior checkout
    /// state. Refuses if the edit working tree has uncommitted changes or
    /// unpushed commits — the caller must clean those up first.
    pub async fn unedit(&mut self, identity: &PackageIdentity) -> Result<(), WorkspaceError> {
        let Some(entry) = self.managed_dependencies().get(identity).cloned() else {
            return Err(WorkspaceError::NotEdited(identity.clone()));
        };
        let ManagedState::Edited { path, based_on } = entry.state else {
            return Err(WorkspaceError::NotEdited(identity.clone()));
        };

        if path.exists() {
            let provider = self.container().manager().provider();
            if provider.worktree_is_dirty(&path).unwrap_or(false) {
                return Err(WorkspaceError::DirtyWorkTree(identity.clone()));
            }
            if provider.has_unpushed_commits(&path).unwrap_or(false) {
                return Err(WorkspaceError::UnpushedCommits(identity.clone()));
            }
        }

        match based_on {
            Some(state) => {
                if let Some(url) = self.pins().get(identity).map(|p| p.repository_url.clone()) {
                    let manager = self.container().manager();
                    let repo_path = manager.ensure_fetched(identity, &url).await?;
                    let dest = self.sandbox_root().join("checkouts").join(identity.to_string());
                    manager.checkout(identity, &url, repo_path, state.revision().to_string(), dest.clone()).await?;
                    self.managed_mut().insert(identity.clone(), ManagedDependency {
                        reference: PackageReference::remote(&url).map_err(|e| WorkspaceError::Io(std::io::Error::other(e.to_string())))?,
                        subpath: dest,
                        state: ManagedState::Checkout { state },
                    });
                }
            }
            None => {
                self.managed_mut().remove(identity);
                self.pins_mut().remove(identity);
            }
        }

        if path.exists() && path.starts_with(self.edits_dir()) {
            std::fs::remove_dir_all(&path)?;
        }
        Ok(())
    }

    /// Validate a missing edited checkout: if `identity` is `Edited` but its
    /// working tree is gone, fall back to `based_on` with a warning rather
    /// than failing outright.
    pub fn recover_missing_edits(&mut self) -> Vec<PackageIdentity> {
        let missing: Vec<PackageIdentity> = self
            .managed_dependencies()
            .iter()
            .filter_map(|(id, dep)| match &dep.state {
                ManagedState::Edited { path, .. } if !path.exists() => Some(id.clone()),
                _ => None,
            })
            .collect();

        for identity in &missing {
            let dep = self.managed_dependencies().get(identity).cloned().unwrap();
            if let ManagedState::Edited { based_on: Some(state), .. } = dep.state {
                tracing::warn!(
                    "dependency '{identity}' was being edited but is missing; falling back to original checkout"
                );
                self.managed_mut().insert(identity.clone(), ManagedDependency {
                    reference: dep.reference,
                    subpath: PathBuf::new(),
                    state: ManagedState::Checkout { state },
                });
            }
        }
        missing
    }
}

fn local_style_reference(identity: &PackageIdentity, path: &std::path::Path, fallback_url: Option<String>) -> PackageReference {
    match fallback_url {
        Some(url) => PackageReference::remote(&url).unwrap_or_else(|_| PackageReference {
            identity: identity.clone(),
            kind: PackageKind::Local { path: path.to_path_buf() },
        }),
        None => PackageReference { identity: identity.clone(), kind: PackageKind::Local { path: path.to_path_buf() } },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_container::PackageContainer;
    use quay_repository::{RepositoryCache, RepositoryManager};
    use quay_types::CheckoutState;
    use std::sync::Arc;

    fn new_workspace(tmp: &std::path::Path) -> Workspace {
        let cache = RepositoryCache::open_at(tmp.join("cache")).unwrap();
        let container = Arc::new(PackageContainer::new(RepositoryManager::new(cache), quay_mirrors::Mirrors::default()));
        Workspace::open(tmp.join("ws"), container).unwrap()
    }

    #[tokio::test]
    async fn editing_a_local_package_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = new_workspace(tmp.path());
        let reference = PackageReference::local(tmp.path().join("local-pkg")).unwrap();
        ws.container().register(&reference);

        let err = ws.edit(&reference.identity, EditMode::Branch("main".to_string())).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::LocalDependencyCannotBeEdited(_)));
    }

    #[tokio::test]
    async fn unediting_a_non_edited_package_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = new_workspace(tmp.path());
        let identity = PackageIdentity::from_location("https://example.com/swift-log").unwrap();
        let err = ws.unedit(&identity).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotEdited(_)));
    }

    #[test]
    fn recovering_missing_edits_falls_back_to_prior_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ws = new_workspace(tmp.path());
        let identity = PackageIdentity::from_location("https://example.com/swift-log").unwrap();
        let based_on = CheckoutState::Revision { revision: "deadbeef".to_string() };
        ws.managed_mut().insert(identity.clone(), ManagedDependency {
            reference: PackageReference::remote("https://example.com/swift-log").unwrap(),
            subpath: PathBuf::from("edits/swift-log"),
            state: ManagedState::Edited { path: tmp.path().join("edits/swift-log"), based_on: Some(based_on.clone()) },
        });

        let missing = ws.recover_missing_edits();
        assert_eq!(missing, vec![identity.clone()]);
        assert_eq!(
            ws.managed_dependencies().get(&identity).unwrap().state,
            ManagedState::Checkout { state: based_on }
        );
    }
}
