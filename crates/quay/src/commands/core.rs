//! Implementations for each `quay` subcommand.

use super::ui;
use miette::IntoDiagnostic;
use quay_container::PackageContainer;
use quay_repository::{hash_working_tree, RepositoryCache, RepositoryManager};
use quay_resolver::Resolver;
use quay_types::{
    Dependency, Manifest, PackageIdentity, ProductFilter, Requirement, ResolutionOptions,
};
use quay_workspace::{EditMode, Workspace};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Copy)]
pub enum DependencyFormat {
    Text,
    Dot,
    Json,
    Flatlist,
}

fn open_container() -> miette::Result<Arc<PackageContainer>> {
    let cache = RepositoryCache::open_default().into_diagnostic()?;
    let mirrors = quay_mirrors::Mirrors::load_default().into_diagnostic()?;
    Ok(Arc::new(PackageContainer::new(RepositoryManager::new(cache), mirrors)))
}

fn load_manifest(root: &Path) -> miette::Result<Manifest> {
    let manifest_path = quay_manifest::find_manifest(root).into_diagnostic()?;
    quay_manifest::load(&manifest_path).into_diagnostic()
}

/// Register every declared dependency's backing with `container` and shape
/// the manifest's `[dependencies]` into the tuples `Resolver::resolve`
/// wants as its root dependency set.
fn root_dependencies(
    manifest: &Manifest,
    container: &PackageContainer,
) -> Vec<(PackageIdentity, Requirement, ProductFilter)> {
    manifest
        .dependencies
        .iter()
        .map(|dep: &Dependency| {
            container.register(&dep.reference);
            let filter = if dep.products.is_empty() {
                ProductFilter::Everything
            } else {
                ProductFilter::specific(dep.products.clone())
            };
            (dep.reference.identity.clone(), dep.requirement.clone(), filter)
        })
        .collect()
}

pub async fn resolve(root: &Path) -> miette::Result<i32> {
    let manifest = load_manifest(root)?;
    let container = open_container()?;
    let deps = root_dependencies(&manifest, &container);

    let mut workspace = Workspace::open(root, container).into_diagnostic()?;
    let resolution = workspace.resolve(deps, ResolutionOptions::default()).await.into_diagnostic()?;

    ui::header("Resolved dependencies");
    let mut entries: Vec<_> = resolution.packages.values().collect();
    entries.sort_by(|a, b| a.identity.as_str().cmp(b.identity.as_str()));
    for dep in entries {
        ui::success(format!("{} {} ({})", ui::pkg(&dep.identity), ui::num(&dep.version), dep.reason));
    }
    Ok(0)
}

pub async fn update(root: &Path, packages: &[String], dry_run: bool) -> miette::Result<i32> {
    let manifest = load_manifest(root)?;
    let container = open_container()?;
    let deps = root_dependencies(&manifest, &container);

    let identities: Vec<PackageIdentity> = packages
        .iter()
        .map(|p| PackageIdentity::from_location(p).into_diagnostic())
        .collect::<miette::Result<_>>()?;

    let mut workspace = Workspace::open(root, container).into_diagnostic()?;
    let resolution = workspace.update(deps, &identities, dry_run).await.into_diagnostic()?;

    if dry_run {
        ui::header("Would resolve to");
    } else {
        ui::header("Updated dependencies");
    }
    let mut entries: Vec<_> = resolution.packages.values().collect();
    entries.sort_by(|a, b| a.identity.as_str().cmp(b.identity.as_str()));
    for dep in entries {
        ui::info(format!("{} {}", ui::pkg(&dep.identity), ui::num(&dep.version)));
    }
    Ok(0)
}

pub async fn edit(
    root: &Path,
    package: &str,
    branch: Option<String>,
    revision: Option<String>,
    path: Option<PathBuf>,
) -> miette::Result<i32> {
    let container = open_container()?;
    let identity = PackageIdentity::from_location(package).into_diagnostic()?;
    let mut workspace = Workspace::open(root, container).into_diagnostic()?;

    let mode = match (branch, revision, path) {
        (Some(b), None, None) => EditMode::Branch(b),
        (None, Some(r), None) => EditMode::Revision(r),
        (None, None, Some(p)) => EditMode::Path(p),
        _ => {
            ui::warn("pass exactly one of --branch, --revision, or --path");
            return Ok(1);
        }
    };

    workspace.edit(&identity, mode).await.into_diagnostic()?;
    ui::success(format!("editing {}", ui::pkg(&identity)));
    Ok(0)
}

pub async fn unedit(root: &Path, package: &str) -> miette::Result<i32> {
    let container = open_container()?;
    let identity = PackageIdentity::from_location(package).into_diagnostic()?;
    let mut workspace = Workspace::open(root, container).into_diagnostic()?;
    workspace.unedit(&identity).await.into_diagnostic()?;
    ui::success(format!("stopped editing {}", ui::pkg(&identity)));
    Ok(0)
}

pub fn reset(root: &Path) -> miette::Result<i32> {
    let container = open_container()?;
    let mut workspace = Workspace::open(root, container).into_diagnostic()?;
    workspace.reset().into_diagnostic()?;
    ui::success("reset workspace state");
    Ok(0)
}

pub fn clean(root: &Path) -> miette::Result<i32> {
    let container = open_container()?;
    let workspace = Workspace::open(root, container).into_diagnostic()?;
    workspace.clean().into_diagnostic()?;
    ui::success("removed .build");
    Ok(0)
}

pub async fn show_dependencies(root: &Path, format: DependencyFormat) -> miette::Result<i32> {
    let manifest = load_manifest(root)?;
    let container = open_container()?;
    let deps = root_dependencies(&manifest, &container);

    let workspace = Workspace::open(root, Arc::clone(&container)).into_diagnostic()?;
    let pins = workspace.pins().clone();
    let handle = tokio::runtime::Handle::current();
    let resolution = tokio::task::spawn_blocking(move || {
        let provider = quay_container::BlockingPackageProvider::new(&container, handle);
        Resolver::new(&provider).resolve(deps, &ResolutionOptions::default(), Some(&pins))
    })
    .await
    .into_diagnostic()?
    .into_diagnostic()?;

    let mut entries: Vec<_> = resolution.packages.values().collect();
    entries.sort_by(|a, b| a.identity.as_str().cmp(b.identity.as_str()));

    match format {
        DependencyFormat::Text => {
            for dep in &entries {
                let via = if dep.required_by.is_empty() {
                    "root".to_string()
                } else {
                    dep.required_by.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
                };
                println!("{} {}  (via {via})", dep.identity, dep.version);
            }
        }
        DependencyFormat::Flatlist => {
            for dep in &entries {
                println!("{}@{}", dep.identity, dep.version);
            }
        }
        DependencyFormat::Dot => {
            println!("digraph dependencies {{");
            for dep in &entries {
                for parent in &dep.required_by {
                    println!("  \"{parent}\" -> \"{}\";", dep.identity);
                }
            }
            println!("}}");
        }
        DependencyFormat::Json => {
            let json: Vec<serde_json::Value> = entries
                .iter()
                .map(|dep| {
                    serde_json::json!({
                        "identity": dep.identity.to_string(),
                        "version": dep.version.to_string(),
                        "requiredBy": dep.required_by.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
    }
    Ok(0)
}

pub fn compute_checksum(path: &Path) -> miette::Result<i32> {
    let hash = if path.is_dir() {
        hash_working_tree(path).into_diagnostic()?
    } else {
        let bytes = std::fs::read(path).into_diagnostic()?;
        quay_types::checksum_hex(&bytes)
    };
    println!("{hash}");
    Ok(0)
}

pub fn config_set_mirror(original_url: &str, mirror_url: &str) -> miette::Result<i32> {
    let mut mirrors = quay_mirrors::Mirrors::load_default().into_diagnostic()?;
    mirrors.set(original_url, mirror_url);
    mirrors.save().into_diagnostic()?;
    ui::success(format!("{original_url} -> {mirror_url}"));
    Ok(0)
}

pub fn config_unset_mirror(original_url: &str) -> miette::Result<i32> {
    let mut mirrors = quay_mirrors::Mirrors::load_default().into_diagnostic()?;
    let removed = mirrors.unset(original_url);
    mirrors.save().into_diagnostic()?;
    if removed {
        ui::success(format!("removed mirror for {original_url}"));
        Ok(0)
    } else {
        ui::warn(format!("no mirror registered for {original_url}"));
        Ok(1)
    }
}

pub fn config_get_mirror(original_url: &str) -> miette::Result<i32> {
    let mirrors = quay_mirrors::Mirrors::load_default().into_diagnostic()?;
    match mirrors.get(original_url) {
        Some(mirror) => {
            println!("{mirror}");
            Ok(0)
        }
        None => {
            println!("not found");
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `Mirrors::load_default` reads `MIRROR_CONFIG`, which is process-wide
    // state; serialize the tests that touch it so they don't race.
    static MIRROR_CONFIG_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn set_then_get_then_unset_mirror_round_trips_through_the_config_file() {
        let _guard = MIRROR_CONFIG_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MIRROR_CONFIG", dir.path().join("mirrors.toml"));

        let set_status = config_set_mirror("https://example.com/swift-log", "https://mirror.example.com/swift-log").unwrap();
        assert_eq!(set_status, 0);

        let get_status = config_get_mirror("https://example.com/swift-log").unwrap();
        assert_eq!(get_status, 0);

        let unset_status = config_unset_mirror("https://example.com/swift-log").unwrap();
        assert_eq!(unset_status, 0);

        // Second unset of the same URL has nothing left to remove.
        let unset_again_status = config_unset_mirror("https://example.com/swift-log").unwrap();
        assert_eq!(unset_again_status, 1);

        let missing_status = config_get_mirror("https://example.com/swift-log").unwrap();
        assert_eq!(missing_status, 1);

        std::env::remove_var("MIRROR_CONFIG");
    }
}
