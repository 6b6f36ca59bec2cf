//! Core data model for the Quay package manager core.
//!
//! Defines package identity, manifests, requirements, pins and the resolved
//! and build-plan graphs that the other `quay-*` crates operate over. Kept
//! free of I/O and async so every other crate can depend on it without
//! pulling in tokio.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

pub use semver::{Version, VersionReq};

mod checksum;
pub use checksum::checksum_hex;

/// The canonical, case-insensitive identity of a package, derived from its
/// location (last path component, `.git` suffix stripped, lowercased).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    /// Derive an identity from a location string (a URL or filesystem path).
    ///
    /// Returns `Err` if the location has no usable final path component.
    pub fn from_location(location: &str) -> Result<Self, IdentityError> {
        let trimmed = location.trim_end_matches('/');
        let last = trimmed
            .rsplit('/')
            .next()
            .unwrap_or("")
            .trim_end_matches(".git");

        if last.is_empty() {
            return Err(IdentityError::EmptyIdentity(location.to_string()));
        }

        Ok(Self(last.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("location '{0}' has no usable path component to derive an identity from")]
    EmptyIdentity(String),
    #[error("location '{0}' is not a valid package location")]
    InvalidLocation(String),
}

/// Where a package's source lives.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PackageKind {
    /// A remote git repository, addressed by URL.
    Remote { url: String },
    /// A package rooted at a local filesystem path (unversioned, tracks the
    /// working tree directly).
    Local { path: PathBuf },
}

/// A reference to a package: its identity plus where to find its source.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PackageReference {
    pub identity: PackageIdentity,
    pub kind: PackageKind,
}

impl PackageReference {
    pub fn remote(url: impl Into<String>) -> Result<Self, IdentityError> {
        let url = url.into();
        let identity = PackageIdentity::from_location(&url)?;
        Ok(Self {
            identity,
            kind: PackageKind::Remote { url },
        })
    }

    pub fn local(path: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let path = path.into();
        let location = path.to_string_lossy().to_string();
        let identity = PackageIdentity::from_location(&location)?;
        Ok(Self {
            identity,
            kind: PackageKind::Local { path },
        })
    }

    pub fn location(&self) -> String {
        match &self.kind {
            PackageKind::Remote { url } => url.clone(),
            PackageKind::Local { path } => path.to_string_lossy().to_string(),
        }
    }
}

/// How a dependency's acceptable source commit is constrained.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Requirement {
    /// A semver range, e.g. `^1.2.0`.
    Range(#[serde(with = "version_req_serde")] VersionReq),
    /// An exact version.
    Exact(Version),
    /// Track the tip of a named branch.
    Branch(String),
    /// Pin to an exact revision (commit sha).
    Revision(String),
    /// A local, unversioned package: whatever is on disk is used as-is.
    LocalPackage,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Range(r) => write!(f, "{r}"),
            Requirement::Exact(v) => write!(f, "=={v}"),
            Requirement::Branch(b) => write!(f, "branch:{b}"),
            Requirement::Revision(r) => write!(f, "revision:{r}"),
            Requirement::LocalPackage => write!(f, "local"),
        }
    }
}

mod version_req_serde {
    use semver::VersionReq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &VersionReq, s: S) -> Result<S::Ok, S::Error> {
        v.to_string().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<VersionReq, D::Error> {
        let s = String::deserialize(d)?;
        VersionReq::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A dependency declaration inside a manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Dependency {
    pub reference: PackageReference,
    pub requirement: Requirement,
    /// Products requested from this dependency (empty means "the default
    /// product set", resolved later against the dependency's manifest).
    pub products: Vec<String>,
}

/// The set of products a consumer needs from a dependency; a commutative
/// monoid under union so that merging two loading paths is cheap and
/// order-independent.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProductFilter {
    Everything,
    Specific(std::collections::BTreeSet<String>),
}

impl ProductFilter {
    pub fn specific(names: impl IntoIterator<Item = String>) -> Self {
        ProductFilter::Specific(names.into_iter().collect())
    }

    pub fn union(&self, other: &ProductFilter) -> ProductFilter {
        match (self, other) {
            (ProductFilter::Everything, _) | (_, ProductFilter::Everything) => {
                ProductFilter::Everything
            }
            (ProductFilter::Specific(a), ProductFilter::Specific(b)) => {
                ProductFilter::Specific(a.union(b).cloned().collect())
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            ProductFilter::Everything => true,
            ProductFilter::Specific(names) => names.contains(name),
        }
    }
}

impl Default for ProductFilter {
    fn default() -> Self {
        ProductFilter::Specific(Default::default())
    }
}

/// Build configuration selector, mirrors `swift build -c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BuildConfiguration {
    Debug,
    Release,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        BuildConfiguration::Debug
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildConfiguration::Debug => write!(f, "debug"),
            BuildConfiguration::Release => write!(f, "release"),
        }
    }
}

/// A target platform constraint declared by a manifest (e.g. `.macOS(.v12)`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Platform {
    pub name: String,
    pub version: String,
}

/// Kind of build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TargetType {
    Executable,
    Library,
    Test,
    SystemLibrary,
    Binary,
}

/// A single named compilation unit in a manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Target {
    pub name: String,
    pub target_type: TargetType,
    pub path: Option<PathBuf>,
    /// Names of targets or `package:product` pairs this target depends on.
    pub dependencies: Vec<String>,
    pub unsafe_flags: Vec<String>,
}

impl Target {
    pub fn executable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: TargetType::Executable,
            path: None,
            dependencies: Vec::new(),
            unsafe_flags: Vec::new(),
        }
    }

    pub fn library(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_type: TargetType::Library,
            path: None,
            dependencies: Vec::new(),
            unsafe_flags: Vec::new(),
        }
    }
}

/// A named, externally-consumable grouping of targets.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Product {
    pub name: String,
    pub targets: Vec<String>,
}

/// The package section of a manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PackageSection {
    pub name: String,
    pub tools_version: String,
    pub platforms: Vec<Platform>,
}

impl Default for PackageSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            tools_version: "5.9".to_string(),
            platforms: Vec::new(),
        }
    }
}

/// A fully parsed manifest (`Package.toml`).
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    pub package: PackageSection,
    pub dependencies: Vec<Dependency>,
    pub targets: Vec<Target>,
    pub products: Vec<Product>,
    /// Version/requirement overrides keyed by package identity string.
    pub overrides: HashMap<String, String>,
    pub constraints: HashMap<String, String>,
}

/// How a managed dependency's checkout is pinned.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CheckoutState {
    Version { version: Version, revision: String },
    Revision { revision: String },
    Branch { branch: String, revision: String },
}

impl CheckoutState {
    pub fn revision(&self) -> &str {
        match self {
            CheckoutState::Version { revision, .. } => revision,
            CheckoutState::Revision { revision } => revision,
            CheckoutState::Branch { revision, .. } => revision,
        }
    }
}

/// The mode a managed dependency's on-disk checkout is in.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ManagedState {
    /// A read-only checkout at `checkouts/<identity>`, at `state`.
    Checkout { state: CheckoutState },
    /// Switched into edit mode: a mutable checkout at a user-chosen path,
    /// remembering what it was checked out from so `unedit` can restore it.
    Edited {
        path: PathBuf,
        based_on: Option<CheckoutState>,
    },
    /// A local, unversioned package used as-is.
    Local,
}

/// A dependency the workspace is actively tracking on disk.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ManagedDependency {
    pub reference: PackageReference,
    pub subpath: PathBuf,
    pub state: ManagedState,
}

/// One entry in the persisted pins file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pin {
    pub identity: PackageIdentity,
    pub repository_url: String,
    pub state: CheckoutState,
}

/// Resolution strategy when multiple versions satisfy a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResolutionStrategy {
    Highest,
    Lowest,
    /// Only use versions already present in the pins store; error otherwise.
    Locked,
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        ResolutionStrategy::Highest
    }
}

/// A single override supplied on the command line or in `[overrides]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VersionOverride {
    pub package: String,
    pub requirement: VersionReq,
}

#[derive(Debug, Clone, Default)]
pub struct ResolutionOptions {
    pub overrides: Vec<VersionOverride>,
    pub strategy: ResolutionStrategy,
    pub prefer_prerelease: bool,
}

/// Why a particular version was chosen during resolution, surfaced for
/// diagnostics and for `show-dependencies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceReason {
    LockedHint,
    HighestCompatible,
    LowestCompatible,
    Override,
    OnlyOption,
}

impl fmt::Display for ChoiceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChoiceReason::LockedHint => "pinned in Package.pins",
            ChoiceReason::HighestCompatible => "highest compatible version",
            ChoiceReason::LowestCompatible => "lowest compatible version",
            ChoiceReason::Override => "overridden",
            ChoiceReason::OnlyOption => "only option available",
        };
        write!(f, "{s}")
    }
}

/// A node produced while the graph loader walks dependency declarations
/// before the graph has been fully validated and wired.
#[derive(Debug, Clone)]
pub struct GraphLoadingNode {
    pub identity: PackageIdentity,
    pub manifest: Manifest,
    pub product_filter: ProductFilter,
}

/// A resolved, graph-wired target: its own targets/dependencies have been
/// validated against the rest of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub name: String,
    pub target_type: TargetType,
    /// Other resolved target names, within the same package, this depends on.
    pub target_dependencies: Vec<String>,
    /// `(package identity, product name)` pairs this target depends on.
    pub product_dependencies: Vec<(PackageIdentity, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProduct {
    pub name: String,
    pub targets: Vec<String>,
    /// Set when any target in this product's recursive target closure
    /// declares `unsafe_flags` and the owning package isn't allow-listed.
    pub is_unsafe: bool,
}

/// A package after the graph loader has validated and wired it in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPackage {
    pub identity: PackageIdentity,
    pub manifest: Manifest,
    pub targets: Vec<ResolvedTarget>,
    pub products: Vec<ResolvedProduct>,
}

/// The fully wired dependency graph, ready for the build plan.
#[derive(Debug, Clone, Default)]
pub struct PackageGraph {
    pub root_identities: Vec<PackageIdentity>,
    pub packages: HashMap<PackageIdentity, ResolvedPackage>,
}

/// Kind of a node in the build command DAG.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BuildNodeKind {
    File,
    Directory,
    DirectoryStructure,
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BuildNode {
    pub kind: BuildNodeKind,
    pub path: String,
}

/// Kind of a command in the build command DAG.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BuildCommandKind {
    SwiftCompile,
    SwiftFrontend,
    ClangCompile,
    Shell,
    Phony,
    Archive,
    Copy,
    PackageStructure,
    TestDiscovery,
    ModuleWrap,
}

/// One node of the build manifest's command DAG: named inputs/outputs plus
/// the shape of the tool invocation an external build engine would run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BuildCommand {
    pub name: String,
    pub kind: BuildCommandKind,
    pub inputs: Vec<BuildNode>,
    pub outputs: Vec<BuildNode>,
    pub args: Vec<String>,
}

/// The full build manifest: the command DAG plus named top-level targets
/// (`main`, `test`) an engine can ask to build.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BuildManifest {
    pub commands: Vec<BuildCommand>,
    /// Named virtual target -> command names it depends on transitively.
    pub targets: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_strips_dotgit_and_lowercases() {
        let id = PackageIdentity::from_location("https://example.com/Org/Repo.git").unwrap();
        assert_eq!(id.as_str(), "repo");
    }

    #[test]
    fn identity_rejects_trailing_slash_only() {
        assert!(PackageIdentity::from_location("https://example.com/").is_err());
    }

    #[test]
    fn product_filter_union_absorbs_everything() {
        let a = ProductFilter::specific(["Foo".to_string()]);
        let b = ProductFilter::Everything;
        assert_eq!(a.union(&b), ProductFilter::Everything);
    }

    #[test]
    fn product_filter_union_is_commutative_set_union() {
        let a = ProductFilter::specific(["Foo".to_string()]);
        let b = ProductFilter::specific(["Bar".to_string()]);
        let u = a.union(&b);
        assert!(u.contains("Foo"));
        assert!(u.contains("Bar"));
        assert!(!u.contains("Baz"));
    }

    #[test]
    fn pin_round_trips_through_json() {
        let pin = Pin {
            identity: PackageIdentity::from_location("https://example.com/swift-log").unwrap(),
            repository_url: "https://example.com/swift-log".to_string(),
            state: CheckoutState::Version {
                version: Version::new(1, 5, 4),
                revision: "abc123".to_string(),
            },
        };
        let json = serde_json::to_string(&pin).unwrap();
        let back: Pin = serde_json::from_str(&json).unwrap();
        assert_eq!(pin, back);
    }
}
