//! Manifest loading: parses `Package.toml` into `quay_types::Manifest` and
//! checks the declared tools-version against what this implementation
//! understands.
//!
//! A two-stage raw/typed deserialization (`RawManifest` -> `Manifest`); no
//! external toolchain is invoked to produce or validate the manifest.

mod cache;
pub use cache::{CacheStats, ManifestCache};

use futures::stream::{self, StreamExt};
use quay_platform::ToolsVersion;
use quay_types::{
    Dependency, Manifest, PackageReference, PackageSection, Platform, Product, ProductFilter,
    Requirement, Target, TargetType,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const MANIFEST_FILE_NAME: &str = "Package.toml";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest not found in {0}")]
    NotFound(PathBuf),
    #[error("failed to read manifest: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("manifest declares tools-version {required} but this build understands up to {current}")]
    ToolsVersionIncompatible { required: String, current: String },
    #[error("invalid manifest: {0}")]
    ValidationError(String),
}

#[derive(Debug, serde::Deserialize)]
struct RawManifest {
    package: RawPackage,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    target: Vec<RawTarget>,
    #[serde(default)]
    product: Vec<RawProduct>,
    #[serde(default)]
    overrides: HashMap<String, String>,
    #[serde(default)]
    constraints: HashMap<String, String>,
}

#[derive(Debug, serde::Deserialize)]
struct RawPackage {
    name: String,
    #[serde(default = "default_tools_version", rename = "tools-version")]
    tools_version: String,
    #[serde(default)]
    platforms: Vec<RawPlatform>,
}

fn default_tools_version() -> String {
    "5.9".to_string()
}

#[derive(Debug, serde::Deserialize)]
struct RawPlatform {
    name: String,
    version: String,
}

#[derive(Debug, serde::Deserialize)]
struct RawDependency {
    name: String,
    #[serde(default)]
    git: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    products: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct RawTarget {
    name: String,
    #[serde(rename = "type", default = "default_target_type")]
    target_type: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    unsafe_flags: Vec<String>,
}

fn default_target_type() -> String {
    "library".to_string()
}

#[derive(Debug, serde::Deserialize)]
struct RawProduct {
    name: String,
    targets: Vec<String>,
}

/// Find `Package.toml` under `dir`.
pub fn find_manifest(dir: &Path) -> Result<PathBuf, ManifestError> {
    let path = dir.join(MANIFEST_FILE_NAME);
    if path.exists() {
        Ok(path)
    } else {
        Err(ManifestError::NotFound(dir.to_path_buf()))
    }
}

/// Load and validate the manifest at `path`.
pub fn load(path: &Path) -> Result<Manifest, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    parse_manifest(&content)
}

pub fn parse_manifest(content: &str) -> Result<Manifest, ManifestError> {
    let raw: RawManifest = toml::from_str(content)?;

    let tools_version = ToolsVersion::parse(&raw.package.tools_version)
        .map_err(|e| ManifestError::ValidationError(e.to_string()))?;
    if let Err((required, current)) = tools_version.check_compatible() {
        return Err(ManifestError::ToolsVersionIncompatible {
            required: required.to_string(),
            current: current.to_string(),
        });
    }

    let platforms = raw
        .package
        .platforms
        .into_iter()
        .map(|p| Platform {
            name: p.name,
            version: p.version,
        })
        .collect();

    let dependencies = raw
        .dependencies
        .into_iter()
        .map(parse_raw_dependency)
        .collect::<Result<Vec<_>, _>>()?;

    let targets = raw
        .target
        .into_iter()
        .map(parse_raw_target)
        .collect::<Result<Vec<_>, _>>()?;

    let products = raw
        .product
        .into_iter()
        .map(|p| Product {
            name: p.name,
            targets: p.targets,
        })
        .collect();

    Ok(Manifest {
        package: PackageSection {
            name: raw.package.name,
            tools_version: raw.package.tools_version,
            platforms,
        },
        dependencies,
        targets,
        products,
        overrides: raw.overrides,
        constraints: raw.constraints,
    })
}

fn parse_raw_dependency(raw: RawDependency) -> Result<Dependency, ManifestError> {
    let reference = if let Some(path) = raw.path {
        PackageReference::local(path)
            .map_err(|e| ManifestError::ValidationError(e.to_string()))?
    } else if let Some(git) = &raw.git {
        PackageReference::remote(git.clone())
            .map_err(|e| ManifestError::ValidationError(e.to_string()))?
    } else {
        return Err(ManifestError::ValidationError(format!(
            "dependency '{}' must have a 'git' or 'path'",
            raw.name
        )));
    };

    let requirement = if matches!(reference.kind, quay_types::PackageKind::Local { .. }) {
        Requirement::LocalPackage
    } else if let Some(revision) = raw.revision {
        Requirement::Revision(revision)
    } else if let Some(branch) = raw.branch {
        Requirement::Branch(branch)
    } else if let Some(version) = raw.version {
        Requirement::Range(
            quay_types::VersionReq::parse(&version)
                .map_err(|e| ManifestError::ValidationError(e.to_string()))?,
        )
    } else {
        return Err(ManifestError::ValidationError(format!(
            "dependency '{}' must specify version, branch, or revision",
            raw.name
        )));
    };

    Ok(Dependency {
        reference,
        requirement,
        products: raw.products,
    })
}

fn parse_raw_target(raw: RawTarget) -> Result<Target, ManifestError> {
    let target_type = match raw.target_type.as_str() {
        "executable" => TargetType::Executable,
        "library" => TargetType::Library,
        "test" => TargetType::Test,
        "system-library" => TargetType::SystemLibrary,
        "binary" => TargetType::Binary,
        other => {
            return Err(ManifestError::ValidationError(format!(
                "unknown target type '{other}' for target '{}'",
                raw.name
            )))
        }
    };

    Ok(Target {
        name: raw.name,
        target_type,
        path: raw.path.map(PathBuf::from),
        dependencies: raw.dependencies,
        unsafe_flags: raw.unsafe_flags,
    })
}

/// The default product filter for a root manifest load: everything it
/// declares, since nothing upstream has narrowed it yet.
pub fn default_product_filter() -> ProductFilter {
    ProductFilter::Everything
}

/// Load manifests for several package directories concurrently, preserving
/// the directory each result came from.
pub async fn load_many_parallel(
    dirs: Vec<PathBuf>,
    concurrency: usize,
) -> Vec<(PathBuf, Result<Manifest, ManifestError>)> {
    stream::iter(dirs)
        .map(|dir| async move {
            let dir_for_blocking = dir.clone();
            let result = tokio::task::spawn_blocking(move || {
                let path = find_manifest(&dir_for_blocking)?;
                load(&path)
            })
            .await
            .unwrap_or_else(|e| {
                Err(ManifestError::ValidationError(format!(
                    "manifest load task panicked: {e}"
                )))
            });
            (dir, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"
        [package]
        name = "example"
        tools-version = "5.9"

        [[dependencies]]
        name = "swift-log"
        git = "https://github.com/apple/swift-log.git"
        version = "^1.4.0"

        [[target]]
        name = "Example"
        type = "executable"
    "#;

    #[test]
    fn parses_simple_manifest() {
        let manifest = parse_manifest(SIMPLE).unwrap();
        assert_eq!(manifest.package.name, "example");
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(manifest.targets.len(), 1);
    }

    #[test]
    fn rejects_newer_tools_version() {
        let content = r#"
            [package]
            name = "example"
            tools-version = "9.0"
        "#;
        let err = parse_manifest(content).unwrap_err();
        assert!(matches!(err, ManifestError::ToolsVersionIncompatible { .. }));
    }

    #[test]
    fn local_dependency_requires_no_version() {
        let content = r#"
            [package]
            name = "example"

            [[dependencies]]
            name = "local-lib"
            path = "../local-lib"
        "#;
        let manifest = parse_manifest(content).unwrap();
        assert_eq!(manifest.dependencies[0].requirement, Requirement::LocalPackage);
    }

    #[test]
    fn dependency_without_version_or_path_is_an_error() {
        let content = r#"
            [package]
            name = "example"

            [[dependencies]]
            name = "broken"
            git = "https://example.com/broken.git"
        "#;
        assert!(parse_manifest(content).is_err());
    }
}
