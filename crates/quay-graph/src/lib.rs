//! The package graph loader: turns a flat set of resolved
//! `(identity, manifest)` pairs plus the root's own manifest into a
//! `PackageGraph` with targets and products wired to each other.
//!
//! Orders packages with a DFS and an insertion-ordered `path` tracking the
//! current recursion stack. On a cycle, the back edge that closes it is
//! dropped and the walk continues rather than aborting — a cyclic
//! dependency graph still produces a usable (if partial) build plan, with
//! the cycle itself reported as a non-fatal `GraphDiagnostic`.

use quay_platform::EXPLICIT_PRODUCT_DEPENDENCY_TOOLS_VERSION;
use quay_types::{
    GraphLoadingNode, Manifest, PackageIdentity, ProductFilter, ResolvedPackage, ResolvedProduct,
    ResolvedTarget, Target, TargetType,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("duplicate package identity in graph: {0}")]
    DuplicateIdentity(PackageIdentity),
    #[error("target '{target}' in package {package} depends on unknown target or product '{dependency}'")]
    UnknownDependency {
        package: PackageIdentity,
        target: String,
        dependency: String,
    },
    #[error(
        "target '{target}' in package {package} references product '{product}' of {dependency} \
         without the 'package:product' form required at tools-version >= {required}"
    )]
    ImplicitProductDependencyTooNew {
        package: PackageIdentity,
        target: String,
        product: String,
        dependency: PackageIdentity,
        required: String,
    },
}

/// A non-fatal condition found while loading the graph: recorded rather
/// than aborting, so loading can continue with a partial or degraded
/// graph in every one of these cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphDiagnostic {
    /// `cycle[0]` reappears immediately after `path ++ cycle` — e.g. a
    /// `path` of `[]` and `cycle` of `[A, B]` describes the cycle "A -> B -> A".
    CycleDetected { path: Vec<PackageIdentity>, cycle: Vec<PackageIdentity> },
    /// The same product name is exported by more than one package; both
    /// (all) of the offending products are dropped from the graph.
    DuplicateProduct { name: String, packages: Vec<PackageIdentity> },
    /// The same target name appears in more than one reachable package.
    DuplicateTarget { name: String, packages: Vec<PackageIdentity> },
    /// A target outside the allow-list declares `unsafeFlags`, reached
    /// through a product's recursive target closure.
    UnsafeFlagsNotAllowed { package: PackageIdentity, product: String, target: String },
}

impl fmt::Display for GraphDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphDiagnostic::CycleDetected { path, cycle } => {
                let mut full: Vec<&str> = path.iter().map(|i| i.as_str()).collect();
                full.extend(cycle.iter().map(|i| i.as_str()));
                if let Some(first) = cycle.first() {
                    full.push(first.as_str());
                }
                write!(f, "dependency cycle detected: {}", full.join(" -> "))
            }
            GraphDiagnostic::DuplicateProduct { name, packages } => {
                let names: Vec<_> = packages.iter().map(|p| p.as_str()).collect();
                write!(f, "duplicate product '{name}' exported by {}", names.join(", "))
            }
            GraphDiagnostic::DuplicateTarget { name, packages } => {
                let names: Vec<_> = packages.iter().map(|p| p.as_str()).collect();
                write!(f, "duplicate target '{name}' declared by {}", names.join(", "))
            }
            GraphDiagnostic::UnsafeFlagsNotAllowed { package, product, target } => {
                write!(
                    f,
                    "target '{target}' in product '{product}' of package {package} declares unsafe \
                     build flags without being allow-listed"
                )
            }
        }
    }
}

/// Loads a package graph from the root's manifest plus every dependency's
/// `GraphLoadingNode` the resolver/container layer produced.
pub struct GraphLoader {
    nodes: HashMap<PackageIdentity, GraphLoadingNode>,
    root_identities: Vec<PackageIdentity>,
    allowed_unsafe: HashSet<PackageIdentity>,
}

impl GraphLoader {
    pub fn new() -> Self {
        Self { nodes: HashMap::new(), root_identities: Vec::new(), allowed_unsafe: HashSet::new() }
    }

    /// Register a root package (one the user is directly building).
    pub fn add_root(&mut self, identity: PackageIdentity, manifest: Manifest) {
        self.root_identities.push(identity.clone());
        self.nodes.insert(
            identity.clone(),
            GraphLoadingNode { identity, manifest, product_filter: ProductFilter::Everything },
        );
    }

    /// Register a resolved dependency with the product filter accumulated
    /// for it during resolution (unioned across every dependent that pulls it in).
    pub fn add_dependency(&mut self, identity: PackageIdentity, manifest: Manifest, product_filter: ProductFilter) {
        self.nodes
            .entry(identity.clone())
            .and_modify(|existing| existing.product_filter = existing.product_filter.union(&product_filter))
            .or_insert(GraphLoadingNode { identity, manifest, product_filter });
    }

    /// Allow-list a package to vend unsafe-flagged products to its
    /// dependents without a diagnostic. Root packages are always allowed,
    /// since an unsafe flag on the package being built directly isn't a
    /// third-party boundary crossing.
    pub fn allow_unsafe_flags(&mut self, identity: PackageIdentity) {
        self.allowed_unsafe.insert(identity);
    }

    /// Topologically order identities by their manifest-declared
    /// dependencies, breaking any cycle by dropping the back edge that
    /// closes it and continuing. Returns the order plus one
    /// `GraphDiagnostic::CycleDetected` per back edge dropped.
    fn topo_order(&self) -> (Vec<PackageIdentity>, Vec<GraphDiagnostic>) {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();
        let mut path = Vec::new();
        let mut cycles = Vec::new();

        fn visit(
            identity: &PackageIdentity,
            nodes: &HashMap<PackageIdentity, GraphLoadingNode>,
            visited: &mut HashSet<PackageIdentity>,
            in_stack: &mut HashSet<PackageIdentity>,
            path: &mut Vec<PackageIdentity>,
            order: &mut Vec<PackageIdentity>,
            cycles: &mut Vec<GraphDiagnostic>,
        ) {
            if visited.contains(identity) {
                return;
            }
            if in_stack.contains(identity) {
                let start = path.iter().position(|p| p == identity).unwrap_or(0);
                let diagnostic = GraphDiagnostic::CycleDetected {
                    path: path[..start].to_vec(),
                    cycle: path[start..].to_vec(),
                };
                tracing::warn!(%diagnostic, "dependency cycle detected; dropping back edge");
                cycles.push(diagnostic);
                return;
            }
            in_stack.insert(identity.clone());
            path.push(identity.clone());

            if let Some(node) = nodes.get(identity) {
                for dep in &node.manifest.dependencies {
                    visit(&dep.reference.identity, nodes, visited, in_stack, path, order, cycles);
                }
            }

            path.pop();
            in_stack.remove(identity);
            visited.insert(identity.clone());
            order.push(identity.clone());
        }

        for identity in self.nodes.keys() {
            visit(identity, &self.nodes, &mut visited, &mut in_stack, &mut path, &mut order, &mut cycles);
        }

        (order, cycles)
    }

    /// Wire every node's targets and products, in dependency order, into a
    /// `PackageGraph`, alongside every non-fatal `GraphDiagnostic` found
    /// along the way (cycles, duplicate products/targets, disallowed
    /// unsafe flags).
    pub fn load(self) -> Result<(quay_types::PackageGraph, Vec<GraphDiagnostic>), GraphError> {
        let (order, mut diagnostics) = self.topo_order();
        let root_set: HashSet<&PackageIdentity> = self.root_identities.iter().collect();
        let mut packages = HashMap::new();

        for identity in &order {
            let node = &self.nodes[identity];
            let resolved = wire_package(identity, node, &self.nodes, &packages, &root_set, &self.allowed_unsafe, &mut diagnostics)?;
            packages.insert(identity.clone(), resolved);
        }

        detect_duplicates(&mut packages, &mut diagnostics);

        Ok((quay_types::PackageGraph { root_identities: self.root_identities, packages }, diagnostics))
    }
}

impl Default for GraphLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan the fully-wired graph for products or targets sharing a name
/// across more than one package. Offending products are removed from the
/// graph outright; offending target names are only reported, since target
/// names are otherwise scoped to their owning package.
fn detect_duplicates(packages: &mut HashMap<PackageIdentity, ResolvedPackage>, diagnostics: &mut Vec<GraphDiagnostic>) {
    let mut product_owners: HashMap<String, Vec<PackageIdentity>> = HashMap::new();
    let mut target_owners: HashMap<String, Vec<PackageIdentity>> = HashMap::new();
    for package in packages.values() {
        for product in &package.products {
            product_owners.entry(product.name.clone()).or_default().push(package.identity.clone());
        }
        for target in &package.targets {
            target_owners.entry(target.name.clone()).or_default().push(package.identity.clone());
        }
    }

    let mut duplicate_products: Vec<(String, Vec<PackageIdentity>)> =
        product_owners.into_iter().filter(|(_, owners)| owners.len() > 1).collect();
    duplicate_products.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, mut owners) in duplicate_products {
        owners.sort();
        diagnostics.push(GraphDiagnostic::DuplicateProduct { name: name.clone(), packages: owners.clone() });
        for owner in &owners {
            if let Some(pkg) = packages.get_mut(owner) {
                pkg.products.retain(|p| p.name != name);
            }
        }
    }

    let mut duplicate_targets: Vec<(String, Vec<PackageIdentity>)> =
        target_owners.into_iter().filter(|(_, owners)| owners.len() > 1).collect();
    duplicate_targets.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, mut owners) in duplicate_targets {
        owners.sort();
        diagnostics.push(GraphDiagnostic::DuplicateTarget { name, packages: owners });
    }
}

fn wire_package(
    identity: &PackageIdentity,
    node: &GraphLoadingNode,
    nodes: &HashMap<PackageIdentity, GraphLoadingNode>,
    packages: &HashMap<PackageIdentity, ResolvedPackage>,
    root_set: &HashSet<&PackageIdentity>,
    allowed_unsafe: &HashSet<PackageIdentity>,
    diagnostics: &mut Vec<GraphDiagnostic>,
) -> Result<ResolvedPackage, GraphError> {
    let tools_version = quay_platform::ToolsVersion::parse(&node.manifest.package.tools_version)
        .unwrap_or(quay_platform::CURRENT_TOOLS_VERSION);
    let requires_explicit_product_deps = tools_version >= EXPLICIT_PRODUCT_DEPENDENCY_TOOLS_VERSION;

    let local_target_names: HashSet<&str> =
        node.manifest.targets.iter().map(|t| t.name.as_str()).collect();

    // Map each declared dependency's identity to the products it exposes,
    // for implicit (bare product name) resolution at tools-version < 5.2.
    let dependency_products: HashMap<&PackageIdentity, Vec<&str>> = node
        .manifest
        .dependencies
        .iter()
        .filter_map(|dep| {
            nodes.get(&dep.reference.identity).map(|n| {
                (&dep.reference.identity, n.manifest.products.iter().map(|p| p.name.as_str()).collect())
            })
        })
        .collect();

    let mut targets = Vec::with_capacity(node.manifest.targets.len());
    let mut used_dependencies: HashSet<PackageIdentity> = HashSet::new();

    for target in &node.manifest.targets {
        let mut target_deps = Vec::new();
        let mut product_deps = Vec::new();

        for dependency_name in &target.dependencies {
            if let Some((package_part, product_part)) = dependency_name.split_once(':') {
                let Ok(dep_identity) = PackageIdentity::from_location(package_part) else {
                    return Err(GraphError::UnknownDependency {
                        package: identity.clone(),
                        target: target.name.clone(),
                        dependency: dependency_name.clone(),
                    });
                };
                if !dependency_products.keys().any(|id| id.as_str() == dep_identity.as_str()) {
                    return Err(GraphError::UnknownDependency {
                        package: identity.clone(),
                        target: target.name.clone(),
                        dependency: dependency_name.clone(),
                    });
                }
                used_dependencies.insert(dep_identity.clone());
                product_deps.push((dep_identity, product_part.to_string()));
                continue;
            }

            if local_target_names.contains(dependency_name.as_str()) {
                target_deps.push(dependency_name.clone());
                continue;
            }

            let matches: Vec<&PackageIdentity> = dependency_products
                .iter()
                .filter(|(_, products)| products.contains(&dependency_name.as_str()))
                .map(|(id, _)| *id)
                .collect();

            match matches.as_slice() {
                [] => {
                    return Err(GraphError::UnknownDependency {
                        package: identity.clone(),
                        target: target.name.clone(),
                        dependency: dependency_name.clone(),
                    });
                }
                [only] => {
                    if requires_explicit_product_deps {
                        return Err(GraphError::ImplicitProductDependencyTooNew {
                            package: identity.clone(),
                            target: target.name.clone(),
                            product: dependency_name.clone(),
                            dependency: (*only).clone(),
                            required: EXPLICIT_PRODUCT_DEPENDENCY_TOOLS_VERSION.to_string(),
                        });
                    }
                    used_dependencies.insert((*only).clone());
                    product_deps.push(((*only).clone(), dependency_name.clone()));
                }
                _ => {
                    return Err(GraphError::UnknownDependency {
                        package: identity.clone(),
                        target: target.name.clone(),
                        dependency: format!("{dependency_name} (ambiguous across multiple dependencies)"),
                    });
                }
            }
        }

        targets.push(ResolvedTarget {
            name: target.name.clone(),
            target_type: target.target_type,
            target_dependencies: target_deps,
            product_dependencies: product_deps,
        });
    }

    for dep in &node.manifest.dependencies {
        if !used_dependencies.contains(&dep.reference.identity) {
            tracing::debug!(
                package = %identity,
                dependency = %dep.reference.identity,
                "dependency declared but unused by any target",
            );
        }
    }

    // A dependency's system-library targets have no sources or compiled
    // output; they model something like a system header search path or a
    // platform library, and are implicitly visible to every target of every
    // package that depends on that dependency — not just targets that name
    // it explicitly.
    for dep in &node.manifest.dependencies {
        let Some(dep_package) = packages.get(&dep.reference.identity) else { continue };
        let system_targets: Vec<&str> = dep_package
            .targets
            .iter()
            .filter(|t| t.target_type == TargetType::SystemLibrary)
            .map(|t| t.name.as_str())
            .collect();
        for target in &mut targets {
            for sys_name in &system_targets {
                let already_present = target
                    .product_dependencies
                    .iter()
                    .any(|(id, name)| id == &dep.reference.identity && name == sys_name);
                if !already_present {
                    target.product_dependencies.push((dep.reference.identity.clone(), sys_name.to_string()));
                }
            }
        }
    }

    // System-library targets have no sources of their own; the build plan
    // still needs a node representing them, so synthesize the identity
    // product if the manifest didn't declare one explicitly.
    let mut products: Vec<ResolvedProduct> = node
        .manifest
        .products
        .iter()
        .map(|p| ResolvedProduct { name: p.name.clone(), targets: p.targets.clone(), is_unsafe: false })
        .collect();

    for target in &node.manifest.targets {
        if target.target_type == TargetType::SystemLibrary
            && !products.iter().any(|p| p.targets.contains(&target.name))
        {
            products.push(ResolvedProduct { name: target.name.clone(), targets: vec![target.name.clone()], is_unsafe: false });
        }
    }

    let manifest_targets: HashMap<&str, &Target> =
        node.manifest.targets.iter().map(|t| (t.name.as_str(), t)).collect();
    let is_allowed = root_set.contains(identity) || allowed_unsafe.contains(identity);
    for product in &mut products {
        let offending = unsafe_targets_in_closure(identity, &product.targets, &manifest_targets, &targets, packages);
        if !offending.is_empty() {
            product.is_unsafe = true;
            if !is_allowed {
                for (owner, target_name) in offending {
                    diagnostics.push(GraphDiagnostic::UnsafeFlagsNotAllowed {
                        package: owner,
                        product: product.name.clone(),
                        target: target_name,
                    });
                }
            }
        }
    }

    Ok(ResolvedPackage { identity: identity.clone(), manifest: node.manifest.clone(), targets, products })
}

/// Walk a product's recursive target closure (same-package target
/// dependencies, cross-package product dependencies) and return every
/// `(owning package, target name)` pair that declares `unsafeFlags`.
fn unsafe_targets_in_closure(
    owner: &PackageIdentity,
    target_names: &[String],
    manifest_targets: &HashMap<&str, &Target>,
    own_targets: &[ResolvedTarget],
    packages: &HashMap<PackageIdentity, ResolvedPackage>,
) -> Vec<(PackageIdentity, String)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<(PackageIdentity, String)> =
        target_names.iter().map(|n| (owner.clone(), n.clone())).collect();

    while let Some((package_identity, target_name)) = stack.pop() {
        if !seen.insert((package_identity.clone(), target_name.clone())) {
            continue;
        }

        if package_identity == *owner {
            if let Some(t) = manifest_targets.get(target_name.as_str()) {
                if !t.unsafe_flags.is_empty() {
                    out.push((package_identity.clone(), target_name.clone()));
                }
            }
            if let Some(resolved) = own_targets.iter().find(|t| t.name == target_name) {
                stack.extend(resolved.target_dependencies.iter().map(|d| (owner.clone(), d.clone())));
                stack.extend(resolved.product_dependencies.iter().cloned());
            }
            continue;
        }

        let Some(dep_package) = packages.get(&package_identity) else { continue };
        if let Some(product) = dep_package.products.iter().find(|p| p.name == target_name) {
            stack.extend(product.targets.iter().map(|t| (package_identity.clone(), t.clone())));
            continue;
        }
        if let Some(t) = dep_package.targets.iter().find(|t| t.name == target_name) {
            let dep_manifest_target = dep_package.manifest.targets.iter().find(|mt| mt.name == target_name);
            if dep_manifest_target.map(|mt| !mt.unsafe_flags.is_empty()).unwrap_or(false) {
                out.push((package_identity.clone(), target_name.clone()));
            }
            stack.extend(t.target_dependencies.iter().map(|d| (package_identity.clone(), d.clone())));
            stack.extend(t.product_dependencies.iter().cloned());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_types::{Dependency, PackageReference, PackageSection, Product, Requirement, Target};

    fn identity(name: &str) -> PackageIdentity {
        PackageIdentity::from_location(&format!("https://example.com/{name}")).unwrap()
    }

    fn manifest(name: &str, tools_version: &str) -> Manifest {
        Manifest {
            package: PackageSection { name: name.to_string(), tools_version: tools_version.to_string(), platforms: vec![] },
            dependencies: vec![],
            targets: vec![],
            products: vec![],
            overrides: Default::default(),
            constraints: Default::default(),
        }
    }

    #[test]
    fn wires_same_package_target_dependencies() {
        let mut root = manifest("app", "5.9");
        root.targets.push(Target { dependencies: vec!["Core".to_string()], ..Target::executable("App") });
        root.targets.push(Target::library("Core"));

        let mut loader = GraphLoader::new();
        loader.add_root(identity("app"), root);
        let (graph, diagnostics) = loader.load().unwrap();
        assert!(diagnostics.is_empty());

        let app = &graph.packages[&identity("app")];
        let app_target = app.targets.iter().find(|t| t.name == "App").unwrap();
        assert_eq!(app_target.target_dependencies, vec!["Core".to_string()]);
    }

    #[test]
    fn explicit_product_dependency_resolves_across_packages() {
        let mut dep = manifest("core-lib", "5.9");
        dep.targets.push(Target::library("CoreLib"));
        dep.products.push(Product { name: "CoreLib".to_string(), targets: vec!["CoreLib".to_string()] });

        let mut root = manifest("app", "5.9");
        root.dependencies.push(Dependency {
            reference: PackageReference::remote("https://example.com/core-lib").unwrap(),
            requirement: Requirement::Range(semver::VersionReq::parse("^1.0").unwrap()),
            products: vec!["CoreLib".to_string()],
        });
        root.targets.push(Target {
            dependencies: vec!["core-lib:CoreLib".to_string()],
            ..Target::executable("App")
        });

        let mut loader = GraphLoader::new();
        loader.add_dependency(identity("core-lib"), dep, ProductFilter::Everything);
        loader.add_root(identity("app"), root);
        let (graph, _) = loader.load().unwrap();

        let app = &graph.packages[&identity("app")];
        let app_target = app.targets.iter().find(|t| t.name == "App").unwrap();
        assert_eq!(app_target.product_dependencies, vec![(identity("core-lib"), "CoreLib".to_string())]);
    }

    #[test]
    fn implicit_product_dependency_rejected_at_new_tools_version() {
        let mut dep = manifest("core-lib", "5.9");
        dep.targets.push(Target::library("CoreLib"));
        dep.products.push(Product { name: "CoreLib".to_string(), targets: vec!["CoreLib".to_string()] });

        let mut root = manifest("app", "5.9");
        root.dependencies.push(Dependency {
            reference: PackageReference::remote("https://example.com/core-lib").unwrap(),
            requirement: Requirement::Range(semver::VersionReq::parse("^1.0").unwrap()),
            products: vec!["CoreLib".to_string()],
        });
        root.targets.push(Target { dependencies: vec!["CoreLib".to_string()], ..Target::executable("App") });

        let mut loader = GraphLoader::new();
        loader.add_dependency(identity("core-lib"), dep, ProductFilter::Everything);
        loader.add_root(identity("app"), root);
        let err = loader.load().unwrap_err();
        assert!(matches!(err, GraphError::ImplicitProductDependencyTooNew { .. }));
    }

    #[test]
    fn cycle_is_broken_not_fatal_and_reports_a_diagnostic() {
        let mut a = manifest("a", "5.9");
        a.dependencies.push(Dependency {
            reference: PackageReference::remote("https://example.com/b").unwrap(),
            requirement: Requirement::Range(semver::VersionReq::parse("^1.0").unwrap()),
            products: vec![],
        });
        let mut b = manifest("b", "5.9");
        b.dependencies.push(Dependency {
            reference: PackageReference::remote("https://example.com/a").unwrap(),
            requirement: Requirement::Range(semver::VersionReq::parse("^1.0").unwrap()),
            products: vec![],
        });

        let mut loader = GraphLoader::new();
        loader.add_root(identity("a"), a);
        loader.add_dependency(identity("b"), b, ProductFilter::Everything);
        let (graph, diagnostics) = loader.load().unwrap();
        assert_eq!(graph.packages.len(), 2);

        let cycle = diagnostics.iter().find_map(|d| match d {
            GraphDiagnostic::CycleDetected { path, cycle } => Some((path.clone(), cycle.clone())),
            _ => None,
        });
        let (path, cycle) = cycle.expect("expected a cycle diagnostic");
        let mut full = path;
        full.extend(cycle.iter().cloned());
        full.push(cycle[0].clone());
        // Order within the cycle depends on which node the DFS starts from, but
        // it must revisit both identities and close back on the first one.
        assert_eq!(full.len(), 3);
        assert_eq!(full.first(), full.last());
        assert_eq!(full[0..2].iter().collect::<HashSet<_>>(), [identity("a"), identity("b")].iter().collect::<HashSet<_>>());
    }

    #[test]
    fn duplicate_product_across_packages_is_removed_and_diagnosed() {
        let mut one = manifest("one", "5.9");
        one.targets.push(Target::library("OneLib"));
        one.products.push(Product { name: "Foo".to_string(), targets: vec!["OneLib".to_string()] });

        let mut two = manifest("two", "5.9");
        two.targets.push(Target::library("TwoLib"));
        two.products.push(Product { name: "Foo".to_string(), targets: vec!["TwoLib".to_string()] });

        let mut loader = GraphLoader::new();
        loader.add_root(identity("one"), one);
        loader.add_root(identity("two"), two);
        let (graph, diagnostics) = loader.load().unwrap();

        assert!(graph.packages[&identity("one")].products.is_empty());
        assert!(graph.packages[&identity("two")].products.is_empty());
        assert!(diagnostics.iter().any(|d| matches!(d, GraphDiagnostic::DuplicateProduct { name, .. } if name == "Foo")));
    }

    #[test]
    fn implicit_system_library_target_is_visible_to_every_dependent_target() {
        let mut dep = manifest("czlib", "5.9");
        dep.targets.push(Target {
            name: "CZlib".to_string(),
            target_type: TargetType::SystemLibrary,
            path: None,
            dependencies: vec![],
            unsafe_flags: vec![],
        });

        let mut root = manifest("app", "5.9");
        root.dependencies.push(Dependency {
            reference: PackageReference::remote("https://example.com/czlib").unwrap(),
            requirement: Requirement::Range(semver::VersionReq::parse("^1.0").unwrap()),
            products: vec![],
        });
        root.targets.push(Target::executable("App"));
        root.targets.push(Target::library("Core"));

        let mut loader = GraphLoader::new();
        loader.add_dependency(identity("czlib"), dep, ProductFilter::Everything);
        loader.add_root(identity("app"), root);
        let (graph, _) = loader.load().unwrap();

        let app = &graph.packages[&identity("app")];
        for target in &app.targets {
            assert!(target.product_dependencies.contains(&(identity("czlib"), "CZlib".to_string())));
        }
    }

    #[test]
    fn unsafe_flags_on_a_non_root_package_are_diagnosed() {
        let mut dep = manifest("native", "5.9");
        dep.targets.push(Target { unsafe_flags: vec!["-Ounchecked".to_string()], ..Target::library("Native") });
        dep.products.push(Product { name: "Native".to_string(), targets: vec!["Native".to_string()] });

        let mut root = manifest("app", "5.9");
        root.dependencies.push(Dependency {
            reference: PackageReference::remote("https://example.com/native").unwrap(),
            requirement: Requirement::Range(semver::VersionReq::parse("^1.0").unwrap()),
            products: vec!["Native".to_string()],
        });
        root.targets.push(Target {
            dependencies: vec!["native:Native".to_string()],
            ..Target::executable("App")
        });

        let mut loader = GraphLoader::new();
        loader.add_dependency(identity("native"), dep, ProductFilter::Everything);
        loader.add_root(identity("app"), root);
        let (graph, diagnostics) = loader.load().unwrap();

        let native = &graph.packages[&identity("native")];
        assert!(native.products.iter().find(|p| p.name == "Native").unwrap().is_unsafe);
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            GraphDiagnostic::UnsafeFlagsNotAllowed { target, .. } if target == "Native"
        )));
    }

    #[test]
    fn unsafe_flags_allow_listed_package_raises_no_diagnostic() {
        let mut dep = manifest("native", "5.9");
        dep.targets.push(Target { unsafe_flags: vec!["-Ounchecked".to_string()], ..Target::library("Native") });
        dep.products.push(Product { name: "Native".to_string(), targets: vec!["Native".to_string()] });

        let mut root = manifest("app", "5.9");
        root.dependencies.push(Dependency {
            reference: PackageReference::remote("https://example.com/native").unwrap(),
            requirement: Requirement::Range(semver::VersionReq::parse("^1.0").unwrap()),
            products: vec!["Native".to_string()],
        });
        root.targets.push(Target {
            dependencies: vec!["native:Native".to_string()],
            ..Target::executable("App")
        });

        let mut loader = GraphLoader::new();
        loader.add_dependency(identity("native"), dep, ProductFilter::Everything);
        loader.add_root(identity("app"), root);
        loader.allow_unsafe_flags(identity("native"));
        let (graph, diagnostics) = loader.load().unwrap();

        let native = &graph.packages[&identity("native")];
        assert!(native.products.iter().find(|p| p.name == "Native").unwrap().is_unsafe);
        assert!(!diagnostics.iter().any(|d| matches!(d, GraphDiagnostic::UnsafeFlagsNotAllowed { .. })));
    }
}
