//! PubGrub-based dependency resolution for Quay.
//!
//! `Resolver::resolve` drives `pubgrub::resolve` through
//! `QuayDependencyProvider`, then reshapes PubGrub's flat version
//! assignment into the `ManagedDependency`/`Pin`-shaped `Resolution` the
//! rest of the crate (quay-graph, quay-workspace) consumes.

pub mod conflict;
pub mod error;
pub mod package;
pub mod provider;
pub mod version;
pub mod version_set;

pub use error::{ConflictDerivation, ConflictingRequirement, DerivationStep, ResolutionSuggestion, ResolveError};
pub use package::QuayPackage;
pub use provider::{MemoryProvider, PackageProvider, QuayDependencyProvider, ResolutionTrace};
pub use version::QuayVersion;
pub use version_set::QuayVersionSet;

use quay_pins::PinsStore;
use quay_types::{ChoiceReason, PackageIdentity, ProductFilter, Requirement, ResolutionOptions};
use std::collections::HashMap;

/// A single resolved dependency, ready to be turned into a `Pin` or a
/// `ManagedDependency`.
#[derive(Debug, Clone)]
pub struct ResolvedDep {
    pub identity: PackageIdentity,
    pub version: QuayVersion,
    pub reason: ChoiceReason,
    pub required_by: Vec<PackageIdentity>,
}

/// The full resolved dependency set for one resolution run.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub packages: HashMap<PackageIdentity, ResolvedDep>,
}

/// Drives PubGrub against a `PackageProvider`, honoring overrides, pins,
/// and resolution strategy.
pub struct Resolver<'a, P: PackageProvider> {
    provider: &'a P,
}

impl<'a, P: PackageProvider> Resolver<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    pub fn resolve(
        &self,
        root_dependencies: Vec<(PackageIdentity, Requirement, ProductFilter)>,
        options: &ResolutionOptions,
        pins: Option<&PinsStore>,
    ) -> Result<Resolution, ResolveError> {
        let overrides: HashMap<PackageIdentity, semver::VersionReq> = options
            .overrides
            .iter()
            .filter_map(|o| {
                PackageIdentity::from_location(&o.package)
                    .ok()
                    .map(|identity| (identity, o.requirement.clone()))
            })
            .collect();

        let mut dep_provider =
            QuayDependencyProvider::new(self.provider, root_dependencies).with_overrides(overrides);
        dep_provider = dep_provider.with_strategy(options.strategy);
        if let Some(pins) = pins {
            dep_provider = dep_provider.with_pins(pins);
        }

        let solution = pubgrub::resolve(&dep_provider, QuayPackage::Root, QuayVersion::root())
            .map_err(|err| ResolveError::NoSolution {
                message: err.to_string(),
                derivation: ConflictDerivation::new(err.to_string()),
                suggestions: Vec::new(),
            })?;

        let trace = dep_provider.trace();
        let mut packages = HashMap::new();
        for (package, version) in solution {
            let QuayPackage::Named(identity) = package else {
                continue;
            };
            let reason = trace.get_choice(&identity).map(|(_, r)| r).unwrap_or(ChoiceReason::OnlyOption);
            let required_by = trace.get_required_by(&identity).to_vec();
            packages.insert(
                identity.clone(),
                ResolvedDep { identity, version, reason, required_by },
            );
        }

        Ok(Resolution { packages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_types::ResolutionOptions;
    use semver::{Version, VersionReq};

    fn identity(name: &str) -> PackageIdentity {
        PackageIdentity::from_location(&format!("https://example.com/{name}")).unwrap()
    }

    #[test]
    fn resolves_a_simple_manifest() {
        let mut provider = MemoryProvider::new();
        provider.add_package(&identity("swift-log"), Version::new(1, 5, 4), vec![]);
        provider.add_package(&identity("swift-log"), Version::new(1, 4, 0), vec![]);

        let root_deps = vec![(
            identity("swift-log"),
            Requirement::Range(VersionReq::parse("^1.4").unwrap()),
            ProductFilter::Everything,
        )];

        let resolver = Resolver::new(&provider);
        let resolution = resolver
            .resolve(root_deps, &ResolutionOptions::default(), None)
            .unwrap();

        let resolved = resolution.packages.get(&identity("swift-log")).unwrap();
        assert_eq!(resolved.version, QuayVersion::Semver(Version::new(1, 5, 4)));
    }

    #[test]
    fn transitive_dependencies_are_resolved() {
        let mut provider = MemoryProvider::new();
        provider.add_package(
            &identity("app-dep"),
            Version::new(1, 0, 0),
            vec![(identity("swift-log"), Requirement::Range(VersionReq::parse("^1.0").unwrap()))],
        );
        provider.add_package(&identity("swift-log"), Version::new(1, 2, 0), vec![]);

        let root_deps = vec![(
            identity("app-dep"),
            Requirement::Range(VersionReq::parse("^1.0").unwrap()),
            ProductFilter::Everything,
        )];

        let resolver = Resolver::new(&provider);
        let resolution = resolver
            .resolve(root_deps, &ResolutionOptions::default(), None)
            .unwrap();

        assert!(resolution.packages.contains_key(&identity("swift-log")));
        let swift_log = &resolution.packages[&identity("swift-log")];
        assert!(swift_log.required_by.contains(&identity("app-dep")));
    }

    #[test]
    fn a_diamond_dependency_resolves_to_a_single_shared_version() {
        // app depends on both "networking" and "logging-adapter"; both of
        // those depend on "swift-log". Only one version of swift-log should
        // survive resolution, shared by both dependents.
        let mut provider = MemoryProvider::new();
        provider.add_package(
            &identity("networking"),
            Version::new(2, 0, 0),
            vec![(identity("swift-log"), Requirement::Range(VersionReq::parse("^1.0").unwrap()))],
        );
        provider.add_package(
            &identity("logging-adapter"),
            Version::new(1, 0, 0),
            vec![(identity("swift-log"), Requirement::Range(VersionReq::parse(">=1.2").unwrap()))],
        );
        provider.add_package(&identity("swift-log"), Version::new(1, 5, 4), vec![]);
        provider.add_package(&identity("swift-log"), Version::new(1, 2, 0), vec![]);

        let root_deps = vec![
            (identity("networking"), Requirement::Range(VersionReq::parse("^2.0").unwrap()), ProductFilter::Everything),
            (
                identity("logging-adapter"),
                Requirement::Range(VersionReq::parse("^1.0").unwrap()),
                ProductFilter::Everything,
            ),
        ];

        let resolver = Resolver::new(&provider);
        let resolution = resolver
            .resolve(root_deps, &ResolutionOptions::default(), None)
            .unwrap();

        assert_eq!(resolution.packages.len(), 3);
        let swift_log = &resolution.packages[&identity("swift-log")];
        assert_eq!(swift_log.version, QuayVersion::Semver(Version::new(1, 5, 4)));
        let mut required_by = swift_log.required_by.clone();
        required_by.sort_by_key(|id| id.to_string());
        let mut expected = vec![identity("networking"), identity("logging-adapter")];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(required_by, expected);
    }

    #[test]
    fn a_pin_compatible_with_requirements_is_preferred_over_a_newer_release() {
        use quay_pins::PinsStore;
        use quay_types::{CheckoutState, Pin};

        let mut provider = MemoryProvider::new();
        provider.add_package(&identity("swift-log"), Version::new(1, 5, 4), vec![]);
        provider.add_package(&identity("swift-log"), Version::new(1, 4, 0), vec![]);
        provider.add_package(&identity("swift-log"), Version::new(1, 2, 0), vec![]);

        let mut pins = PinsStore::new();
        pins.pin(Pin {
            identity: identity("swift-log"),
            repository_url: "https://example.com/swift-log".to_string(),
            state: CheckoutState::Version {
                version: Version::new(1, 4, 0),
                revision: "deadbeef".to_string(),
            },
        });

        let root_deps = vec![(
            identity("swift-log"),
            Requirement::Range(VersionReq::parse("^1.0").unwrap()),
            ProductFilter::Everything,
        )];

        let resolver = Resolver::new(&provider);
        let resolution = resolver
            .resolve(root_deps, &ResolutionOptions::default(), Some(&pins))
            .unwrap();

        let resolved = resolution.packages.get(&identity("swift-log")).unwrap();
        assert_eq!(resolved.version, QuayVersion::Semver(Version::new(1, 4, 0)));
        assert_eq!(resolved.reason, ChoiceReason::LockedHint);
    }

    #[test]
    fn a_pin_incompatible_with_requirements_is_ignored() {
        use quay_pins::PinsStore;
        use quay_types::{CheckoutState, Pin};

        let mut provider = MemoryProvider::new();
        provider.add_package(&identity("swift-log"), Version::new(1, 5, 4), vec![]);
        provider.add_package(&identity("swift-log"), Version::new(1, 2, 0), vec![]);

        let mut pins = PinsStore::new();
        pins.pin(Pin {
            identity: identity("swift-log"),
            repository_url: "https://example.com/swift-log".to_string(),
            state: CheckoutState::Version {
                version: Version::new(1, 2, 0),
                revision: "deadbeef".to_string(),
            },
        });

        // ^1.4 excludes the pinned 1.2.0, so the pin must be ignored and the
        // highest matching version picked instead.
        let root_deps = vec![(
            identity("swift-log"),
            Requirement::Range(VersionReq::parse("^1.4").unwrap()),
            ProductFilter::Everything,
        )];

        let resolver = Resolver::new(&provider);
        let resolution = resolver
            .resolve(root_deps, &ResolutionOptions::default(), Some(&pins))
            .unwrap();

        let resolved = resolution.packages.get(&identity("swift-log")).unwrap();
        assert_eq!(resolved.version, QuayVersion::Semver(Version::new(1, 5, 4)));
        assert_ne!(resolved.reason, ChoiceReason::LockedHint);
    }

    #[test]
    fn missing_package_fails_with_no_solution() {
        let provider = MemoryProvider::new();
        let root_deps = vec![(
            identity("nonexistent"),
            Requirement::Range(VersionReq::parse("^1.0").unwrap()),
            ProductFilter::Everything,
        )];

        let resolver = Resolver::new(&provider);
        let result = resolver.resolve(root_deps, &ResolutionOptions::default(), None);
        assert!(result.is_err());
    }
}
