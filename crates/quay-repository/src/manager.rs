//! The repository manager: pools bare clones keyed by identity, coalesces
//! concurrent fetches of the same repository, and enforces a one-writer
//! rule (readers may proceed against a stable bare clone while at most one
//! fetch is in flight for it at a time).

use crate::cache::RepositoryCache;
use crate::provider::{GitRepositoryProvider, RepositoryError, RepositoryTag};
use quay_types::PackageIdentity;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;

/// The on-disk directory name for a repository: `<identity>-<8 hex chars
/// of sha256(url)>`, so two different URLs that happen to share an
/// identity (e.g. two forks both named `swift-log`) never collide.
pub fn repository_dir_name(identity: &PackageIdentity, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let suffix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("{identity}-{suffix}")
}

struct RepoLock {
    path: PathBuf,
    writer_barrier: AsyncMutex<()>,
}

/// Pools per-repository locks and bare-clone paths; provides coalesced,
/// ordered access to `GitRepositoryProvider` operations.
pub struct RepositoryManager {
    cache: RepositoryCache,
    provider: GitRepositoryProvider,
    locks: StdMutex<HashMap<String, Arc<RepoLock>>>,
}

impl RepositoryManager {
    pub fn new(cache: RepositoryCache) -> Self {
        Self {
            cache,
            provider: GitRepositoryProvider::new(),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, identity: &PackageIdentity, url: &str) -> Arc<RepoLock> {
        let key = repository_dir_name(identity, url);
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(RepoLock {
                    path: self.cache.repositories_dir().join(&key),
                    writer_barrier: AsyncMutex::new(()),
                })
            })
            .clone()
    }

    /// Ensure a bare clone exists and is up to date, fetching if needed.
    /// Concurrent calls for the same repository coalesce on the one
    /// writer-barrier mutex; calls for different repositories proceed in
    /// parallel.
    pub async fn ensure_fetched(
        &self,
        identity: &PackageIdentity,
        url: &str,
    ) -> Result<PathBuf, RepositoryError> {
        let lock = self.lock_for(identity, url);
        let _guard = lock.writer_barrier.lock().await;

        let path = lock.path.clone();
        let url = url.to_string();
        let provider_clone_path = path.clone();
        let exists = path.join("HEAD").exists();

        tokio::task::spawn_blocking(move || {
            let provider = GitRepositoryProvider::new();
            if exists {
                provider.fetch(&provider_clone_path)
            } else {
                provider.clone_bare(&url, &provider_clone_path)
            }
        })
        .await
        .expect("blocking git task panicked")?;

        Ok(path)
    }

    pub async fn tags(&self, bare_repo: PathBuf) -> Result<Vec<RepositoryTag>, RepositoryError> {
        tokio::task::spawn_blocking(move || GitRepositoryProvider::new().tags(&bare_repo))
            .await
            .expect("blocking git task panicked")
    }

    pub async fn resolve_revision(
        &self,
        bare_repo: PathBuf,
        rev: String,
    ) -> Result<String, RepositoryError> {
        tokio::task::spawn_blocking(move || {
            GitRepositoryProvider::new().resolve_revision(&bare_repo, &rev)
        })
        .await
        .expect("blocking git task panicked")
    }

    /// Check out `revision` of `identity`'s bare repo into `dest`. Takes the
    /// same per-repository writer barrier as `ensure_fetched` so a checkout
    /// can never race a concurrent fetch of the same repository.
    pub async fn checkout(
        &self,
        identity: &PackageIdentity,
        url: &str,
        bare_repo: PathBuf,
        revision: String,
        dest: PathBuf,
    ) -> Result<(), RepositoryError> {
        let lock = self.lock_for(identity, url);
        let _guard = lock.writer_barrier.lock().await;

        tokio::task::spawn_blocking(move || {
            GitRepositoryProvider::new().checkout_worktree(&bare_repo, &revision, &dest)
        })
        .await
        .expect("blocking git task panicked")
    }

    pub fn checkouts_dir(&self) -> PathBuf {
        self.cache.checkouts_dir()
    }

    pub fn cache(&self) -> &RepositoryCache {
        &self.cache
    }

    pub fn provider(&self) -> &GitRepositoryProvider {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_name_differs_for_different_urls_same_identity() {
        let identity = PackageIdentity::from_location("https://a.example.com/repo").unwrap();
        let name_a = repository_dir_name(&identity, "https://a.example.com/repo");
        let name_b = repository_dir_name(&identity, "https://b.example.com/repo");
        assert_ne!(name_a, name_b);
        assert!(name_a.starts_with("repo-"));
    }

    #[test]
    fn dir_name_is_deterministic() {
        let identity = PackageIdentity::from_location("https://a.example.com/repo").unwrap();
        let a = repository_dir_name(&identity, "https://a.example.com/repo");
        let b = repository_dir_name(&identity, "https://a.example.com/repo");
        assert_eq!(a, b);
    }
}
