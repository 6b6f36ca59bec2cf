//! The repository provider: shells out to the system `git` binary to
//! clone, fetch, list tags, and resolve revisions, plus read a file at a
//! given revision without checking the whole tree out.

use quay_types::checksum_hex;
use rayon::prelude::*;
use semver::Version;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("git command failed: {0}")]
    GitFailed(String),
    #[error("revision '{0}' not found")]
    RevisionNotFound(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A tag discovered on a remote, with its parsed semver version if the tag
/// name looks like one (optionally `v`-prefixed).
#[derive(Debug, Clone)]
pub struct RepositoryTag {
    pub name: String,
    pub version: Option<Version>,
    pub revision: String,
}

/// Thin wrapper over the system `git` binary. Every method is blocking;
/// callers run it inside `tokio::task::spawn_blocking` (see
/// `quay-workspace`, which owns the async fan-out).
pub struct GitRepositoryProvider;

impl GitRepositoryProvider {
    pub fn new() -> Self {
        Self
    }

    /// Clone `url` into `dest` as a bare repository (no working tree);
    /// bare clones are what the repository manager pools and fetches into.
    pub fn clone_bare(&self, url: &str, dest: &Path) -> Result<(), RepositoryError> {
        run_git(&["clone", "--bare", "--filter=blob:none", url, &dest.to_string_lossy()])?;
        Ok(())
    }

    /// Fetch all refs into an existing bare clone.
    pub fn fetch(&self, bare_repo: &Path) -> Result<(), RepositoryError> {
        run_git_in(bare_repo, &["fetch", "--prune", "origin", "+refs/*:refs/*"])?;
        Ok(())
    }

    /// List tags, newest-first by semver when the tag name parses as one
    /// (optionally `v`-prefixed); non-semver tags sort after semver ones.
    pub fn tags(&self, bare_repo: &Path) -> Result<Vec<RepositoryTag>, RepositoryError> {
        let output = run_git_in(bare_repo, &["tag", "--format=%(objectname) %(refname:short)"])?;

        let mut tags: Vec<RepositoryTag> = output
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(2, ' ');
                let sha = parts.next()?.to_string();
                let name = parts.next()?.to_string();
                let stripped = name.strip_prefix('v').unwrap_or(&name);
                let version = Version::parse(stripped).ok();
                Some(RepositoryTag {
                    name,
                    version,
                    revision: sha,
                })
            })
            .collect();

        tags.sort_by(|a, b| match (&b.version, &a.version) {
            (Some(v1), Some(v2)) => v1.cmp(v2),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });

        Ok(tags)
    }

    /// Resolve a branch/tag/short-sha into a full commit sha.
    pub fn resolve_revision(&self, bare_repo: &Path, rev: &str) -> Result<String, RepositoryError> {
        let full = format!("{rev}^{{commit}}");
        run_git_in(bare_repo, &["rev-parse", "--verify", &full])
            .map(|s| s.trim().to_string())
            .map_err(|_| RepositoryError::RevisionNotFound(rev.to_string()))
    }

    /// An immutable view of a single file at `revision`, without checking
    /// out a working tree.
    pub fn read_file_at_revision(
        &self,
        bare_repo: &Path,
        revision: &str,
        relative_path: &str,
    ) -> Result<Vec<u8>, RepositoryError> {
        let spec = format!("{revision}:{relative_path}");
        let output = Command::new("git")
            .arg("-C")
            .arg(bare_repo)
            .arg("show")
            .arg(&spec)
            .output()?;
        if !output.status.success() {
            return Err(RepositoryError::GitFailed(format!(
                "git show {spec} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(output.stdout)
    }

    /// Whether a worktree has uncommitted changes (tracked or untracked).
    pub fn worktree_is_dirty(&self, worktree: &Path) -> Result<bool, RepositoryError> {
        let output = run_git_in(worktree, &["status", "--porcelain"])?;
        Ok(!output.trim().is_empty())
    }

    /// Whether `worktree`'s current branch has commits its upstream
    /// doesn't. No upstream configured is reported as no unpushed commits.
    pub fn has_unpushed_commits(&self, worktree: &Path) -> Result<bool, RepositoryError> {
        match run_git_in(worktree, &["rev-list", "@{u}..HEAD", "--count"]) {
            Ok(output) => Ok(output.trim().parse::<u32>().unwrap_or(0) > 0),
            Err(_) => Ok(false),
        }
    }

    /// Materialize a working tree for `revision` at `dest` (used to create
    /// or refresh a managed checkout).
    pub fn checkout_worktree(
        &self,
        bare_repo: &Path,
        revision: &str,
        dest: &Path,
    ) -> Result<(), RepositoryError> {
        if dest.exists() {
            std::fs::remove_dir_all(dest)?;
        }
        run_git_in(
            bare_repo,
            &[
                "worktree",
                "add",
                "--force",
                "--detach",
                &dest.to_string_lossy(),
                revision,
            ],
        )?;
        Ok(())
    }
}

impl Default for GitRepositoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn run_git(args: &[&str]) -> Result<String, RepositoryError> {
    let output = Command::new("git").args(args).output()?;
    if !output.status.success() {
        return Err(RepositoryError::GitFailed(format!(
            "git {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn run_git_in(dir: &Path, args: &[&str]) -> Result<String, RepositoryError> {
    let output = Command::new("git").arg("-C").arg(dir).args(args).output()?;
    if !output.status.success() {
        return Err(RepositoryError::GitFailed(format!(
            "git -C {} {}: {}",
            dir.display(),
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// BLAKE3 digest of a working tree's content (path -> file hash, then a
/// hash of that sorted map), used for the local-package and edit-mode
/// checksum paths. Hashes files in parallel with `rayon`, memory-mapping
/// anything larger than 4096 bytes.
pub fn hash_working_tree(root: &Path) -> Result<String, RepositoryError> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && !entry.path().components().any(|c| c.as_os_str() == ".git") {
            files.push(entry.path().to_path_buf());
        }
    }

    let hashes: Vec<(String, String)> = files
        .par_iter()
        .filter_map(|path| {
            let rel = path.strip_prefix(root).ok()?.to_string_lossy().to_string();
            let hash = hash_file(path).ok()?;
            Some((rel, hash))
        })
        .collect();

    let sorted: BTreeMap<String, String> = hashes.into_iter().collect();
    let combined: String = sorted
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();
    Ok(checksum_hex(combined.as_bytes()))
}

fn hash_file(path: &Path) -> Result<String, RepositoryError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > 4096 {
        let file = std::fs::File::open(path)?;
        // SAFETY: the file is not modified concurrently by this process;
        // worst case on external modification is a torn read, not UB.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(checksum_hex(&mmap))
    } else {
        let bytes = std::fs::read(path)?;
        Ok(checksum_hex(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_working_tree_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let h1 = hash_working_tree(dir.path()).unwrap();
        let h2 = hash_working_tree(dir.path()).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_working_tree_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let h1 = hash_working_tree(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"world").unwrap();
        let h2 = hash_working_tree(dir.path()).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn tags_sort_semver_before_non_semver() {
        // v-prefixed and bare both parse; a non-semver tag always sorts last.
        // No explicit v-vs-non-v tie-break exists when both sides parse as
        // semver (see DESIGN.md, Open Question (a)).
        let mut tags = vec![
            RepositoryTag { name: "latest".into(), version: None, revision: "1".into() },
            RepositoryTag { name: "v1.2.0".into(), version: Version::parse("1.2.0").ok(), revision: "2".into() },
        ];
        tags.sort_by(|a, b| match (&b.version, &a.version) {
            (Some(v1), Some(v2)) => v1.cmp(v2),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });
        assert_eq!(tags[0].name, "v1.2.0");
    }
}
