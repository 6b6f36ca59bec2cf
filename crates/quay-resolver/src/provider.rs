//! PubGrub `DependencyProvider` implementation for Quay.
//!
//! The usual prioritize/choose_version/get_dependencies shape, with pin
//! preference coming straight from `quay_pins::PinsStore` and dependency
//! identities flowing through `ProductFilter` so the resolver can union
//! filters across multiple dependents of the same package.

use crate::error::ResolveError;
use crate::package::QuayPackage;
use crate::version::QuayVersion;
use crate::version_set::QuayVersionSet;
use pubgrub::{Dependencies, DependencyProvider, Map, PackageResolutionStatistics, VersionSet};
use quay_pins::PinsStore;
use quay_types::{ChoiceReason, PackageIdentity, ProductFilter, Requirement};
use semver::{Version, VersionReq};
use std::cell::RefCell;
use std::collections::HashMap;

/// Supplies candidate versions and dependency sets to the resolver. Backed
/// in production by `quay-container`'s repository-aware package container;
/// `MemoryProvider` below stands in for tests.
pub trait PackageProvider: Send + Sync {
    fn available_versions(&self, identity: &PackageIdentity) -> Result<Vec<QuayVersion>, ResolveError>;

    fn dependencies(
        &self,
        identity: &PackageIdentity,
        version: &QuayVersion,
        filter: &ProductFilter,
    ) -> Result<Vec<(PackageIdentity, Requirement, ProductFilter)>, ResolveError>;
}

/// Records why each package version was chosen, for diagnostics and for
/// `show-dependencies`.
#[derive(Debug, Clone, Default)]
pub struct ResolutionTrace {
    choices: HashMap<PackageIdentity, (QuayVersion, ChoiceReason)>,
    required_by: HashMap<PackageIdentity, Vec<PackageIdentity>>,
}

impl ResolutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_choice(&mut self, identity: &PackageIdentity, version: &QuayVersion, reason: ChoiceReason) {
        self.choices.insert(identity.clone(), (version.clone(), reason));
    }

    pub fn record_requirement(&mut self, identity: &PackageIdentity, required_by: &PackageIdentity) {
        self.required_by
            .entry(identity.clone())
            .or_default()
            .push(required_by.clone());
    }

    pub fn get_choice(&self, identity: &PackageIdentity) -> Option<(&QuayVersion, ChoiceReason)> {
        self.choices.get(identity).map(|(v, r)| (v, *r))
    }

    pub fn get_required_by(&self, identity: &PackageIdentity) -> &[PackageIdentity] {
        self.required_by.get(identity).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Quay's `DependencyProvider` implementation for PubGrub.
pub struct QuayDependencyProvider<'a, P: PackageProvider> {
    provider: &'a P,
    root_dependencies: Vec<(PackageIdentity, Requirement, ProductFilter)>,
    overrides: HashMap<PackageIdentity, VersionReq>,
    pins: Option<&'a PinsStore>,
    strategy: quay_types::ResolutionStrategy,
    trace: RefCell<ResolutionTrace>,
    version_cache: RefCell<HashMap<PackageIdentity, Vec<QuayVersion>>>,
    filters: RefCell<HashMap<PackageIdentity, ProductFilter>>,
}

impl<'a, P: PackageProvider> QuayDependencyProvider<'a, P> {
    pub fn new(provider: &'a P, root_dependencies: Vec<(PackageIdentity, Requirement, ProductFilter)>) -> Self {
        Self {
            provider,
            root_dependencies,
            overrides: HashMap::new(),
            pins: None,
            strategy: quay_types::ResolutionStrategy::Highest,
            trace: RefCell::new(ResolutionTrace::new()),
            version_cache: RefCell::new(HashMap::new()),
            filters: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<PackageIdentity, VersionReq>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_pins(mut self, pins: &'a PinsStore) -> Self {
        self.pins = Some(pins);
        self
    }

    pub fn with_strategy(mut self, strategy: quay_types::ResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn trace(&self) -> std::cell::Ref<'_, ResolutionTrace> {
        self.trace.borrow()
    }

    fn get_versions(&self, identity: &PackageIdentity) -> Result<Vec<QuayVersion>, ResolveError> {
        {
            let cache = self.version_cache.borrow();
            if let Some(versions) = cache.get(identity) {
                return Ok(versions.clone());
            }
        }

        let versions = self.provider.available_versions(identity)?;
        self.version_cache.borrow_mut().insert(identity.clone(), versions.clone());
        Ok(versions)
    }

    fn accumulate_filter(&self, identity: &PackageIdentity, filter: &ProductFilter) -> ProductFilter {
        let mut filters = self.filters.borrow_mut();
        let merged = filters
            .get(identity)
            .map(|existing| existing.union(filter))
            .unwrap_or_else(|| filter.clone());
        filters.insert(identity.clone(), merged.clone());
        merged
    }

    fn requirement_to_version_set(&self, requirement: &Requirement) -> QuayVersionSet {
        match requirement {
            Requirement::Range(req) => QuayVersionSet::from_range(req.clone()),
            Requirement::Exact(v) => QuayVersionSet::singleton(QuayVersion::Semver(v.clone())),
            Requirement::Branch(b) => QuayVersionSet::singleton(QuayVersion::Ref(format!("branch:{b}"))),
            Requirement::Revision(r) => QuayVersionSet::singleton(QuayVersion::Ref(format!("revision:{r}"))),
            Requirement::LocalPackage => QuayVersionSet::singleton(QuayVersion::Ref("local".to_string())),
        }
    }
}

impl<'a, P: PackageProvider> DependencyProvider for QuayDependencyProvider<'a, P> {
    type P = QuayPackage;
    type V = QuayVersion;
    type VS = QuayVersionSet;
    type M = String;
    type Err = ResolveError;
    type Priority = u32;

    fn prioritize(
        &self,
        package: &Self::P,
        _range: &Self::VS,
        _stats: &PackageResolutionStatistics,
    ) -> Self::Priority {
        match package {
            QuayPackage::Root => 0,
            QuayPackage::Named(identity) => {
                if self.overrides.contains_key(identity) {
                    1
                } else {
                    match self.get_versions(identity) {
                        Ok(versions) => (100 + versions.len()) as u32,
                        Err(_) => 1000,
                    }
                }
            }
        }
    }

    fn choose_version(&self, package: &Self::P, range: &Self::VS) -> Result<Option<Self::V>, Self::Err> {
        match package {
            QuayPackage::Root => Ok(Some(QuayVersion::root())),
            QuayPackage::Named(identity) => {
                if let Some(override_req) = self.overrides.get(identity) {
                    let versions = self.get_versions(identity)?;
                    let matching: Vec<_> = versions
                        .into_iter()
                        .filter(|v| matches!(v, QuayVersion::Semver(sv) if override_req.matches(sv)))
                        .collect();

                    if let Some(version) = matching.into_iter().max() {
                        self.trace.borrow_mut().record_choice(identity, &version, ChoiceReason::Override);
                        return Ok(Some(version));
                    }
                }

                let versions = self.get_versions(identity)?;
                let matching: Vec<_> = versions.into_iter().filter(|v| range.contains(v)).collect();

                if let Some(pins) = self.pins {
                    if let Some(preferred) = pins.preferred_version(identity) {
                        let preferred_version = QuayVersion::Semver(preferred.clone());
                        if matching.contains(&preferred_version) {
                            self.trace.borrow_mut().record_choice(
                                identity,
                                &preferred_version,
                                ChoiceReason::LockedHint,
                            );
                            return Ok(Some(preferred_version));
                        }
                    }
                }

                let chosen = match self.strategy {
                    quay_types::ResolutionStrategy::Highest => matching.into_iter().max(),
                    quay_types::ResolutionStrategy::Lowest => matching.into_iter().min(),
                    quay_types::ResolutionStrategy::Locked => matching.into_iter().max(),
                };

                if let Some(ref version) = chosen {
                    let reason = match self.strategy {
                        quay_types::ResolutionStrategy::Highest => ChoiceReason::HighestCompatible,
                        quay_types::ResolutionStrategy::Lowest => ChoiceReason::LowestCompatible,
                        quay_types::ResolutionStrategy::Locked => ChoiceReason::HighestCompatible,
                    };
                    self.trace.borrow_mut().record_choice(identity, version, reason);
                }

                Ok(chosen)
            }
        }
    }

    fn get_dependencies(
        &self,
        package: &Self::P,
        version: &Self::V,
    ) -> Result<Dependencies<Self::P, Self::VS, Self::M>, Self::Err> {
        let deps: Vec<(PackageIdentity, Requirement, ProductFilter)> = match package {
            QuayPackage::Root => self.root_dependencies.clone(),
            QuayPackage::Named(identity) => {
                let filter = self.filters.borrow().get(identity).cloned().unwrap_or_default();
                self.provider.dependencies(identity, version, &filter)?
            }
        };

        let mut pubgrub_deps = Map::default();

        for (dep_identity, requirement, filter) in deps {
            if let QuayPackage::Named(from) = package {
                self.trace.borrow_mut().record_requirement(&dep_identity, from);
            }
            self.accumulate_filter(&dep_identity, &filter);

            let range = if let Some(over) = self.overrides.get(&dep_identity) {
                QuayVersionSet::from_range(over.clone())
            } else {
                self.requirement_to_version_set(&requirement)
            };

            pubgrub_deps.insert(QuayPackage::named(dep_identity), range);
        }

        Ok(Dependencies::Available(pubgrub_deps))
    }
}

/// A simple in-memory provider for testing.
#[derive(Default)]
pub struct MemoryProvider {
    packages: HashMap<PackageIdentity, Vec<(Version, Vec<(PackageIdentity, Requirement)>)>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_package(
        &mut self,
        identity: &PackageIdentity,
        version: Version,
        deps: Vec<(PackageIdentity, Requirement)>,
    ) {
        self.packages.entry(identity.clone()).or_default().push((version, deps));
    }
}

impl PackageProvider for MemoryProvider {
    fn available_versions(&self, identity: &PackageIdentity) -> Result<Vec<QuayVersion>, ResolveError> {
        self.packages
            .get(identity)
            .map(|versions| versions.iter().map(|(v, _)| QuayVersion::Semver(v.clone())).collect())
            .ok_or_else(|| ResolveError::PackageNotFound {
                identity: identity.clone(),
                suggestions: vec![],
            })
    }

    fn dependencies(
        &self,
        identity: &PackageIdentity,
        version: &QuayVersion,
        _filter: &ProductFilter,
    ) -> Result<Vec<(PackageIdentity, Requirement, ProductFilter)>, ResolveError> {
        let QuayVersion::Semver(version) = version else {
            return Ok(Vec::new());
        };
        self.packages
            .get(identity)
            .and_then(|versions| versions.iter().find(|(v, _)| v == version))
            .map(|(_, deps)| {
                deps.iter()
                    .map(|(id, req)| (id.clone(), req.clone(), ProductFilter::Everything))
                    .collect()
            })
            .ok_or_else(|| ResolveError::PackageNotFound {
                identity: identity.clone(),
                suggestions: vec![],
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> PackageIdentity {
        PackageIdentity::from_location(&format!("https://example.com/{name}")).unwrap()
    }

    #[test]
    fn memory_provider_lists_all_added_versions() {
        let mut provider = MemoryProvider::new();
        provider.add_package(&identity("swift-log"), Version::new(1, 5, 4), vec![]);
        provider.add_package(&identity("swift-log"), Version::new(1, 4, 0), vec![]);

        let versions = provider.available_versions(&identity("swift-log")).unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[test]
    fn version_set_from_range_matches_semver_only() {
        let set = QuayVersionSet::from_range(VersionReq::parse("^1.4").unwrap());
        assert!(set.contains(&QuayVersion::Semver(Version::new(1, 5, 0))));
        assert!(set.contains(&QuayVersion::Semver(Version::new(1, 4, 0))));
        assert!(!set.contains(&QuayVersion::Semver(Version::new(2, 0, 0))));
    }
}
