//! Build plan and build manifest generation for Quay.
//!
//! No Swift or C toolchain is invoked anywhere in this crate — the output
//! is a textual command DAG (`BuildManifest`) for an external build engine
//! to execute. No subprocess invocation and no binary artifact cache (see
//! DESIGN.md).

use quay_types::{
    BuildCommand, BuildCommandKind, BuildConfiguration, BuildManifest, BuildNode, BuildNodeKind,
    PackageGraph, PackageIdentity, ResolvedPackage, ResolvedProduct, ResolvedTarget, TargetType,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("target '{0}' not found in the resolved graph")]
    TargetNotFound(String),
    #[error("product '{0}' not found in the resolved graph")]
    ProductNotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build parameters: configuration plus target platform, the environment
/// that build settings condition on.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub configuration: BuildConfiguration,
    pub platform: String,
    pub jobs: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { configuration: BuildConfiguration::Debug, platform: host_platform(), jobs: None }
    }
}

fn host_platform() -> String {
    let os = if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else {
        "unknown"
    };
    let arch = if cfg!(target_arch = "aarch64") { "arm64" } else { "x86_64" };
    format!("{os}-{arch}")
}

/// One target's computed build description: module name, source list,
/// output paths, and the transitively-reachable binary artifacts it needs
/// copied alongside it.
#[derive(Debug, Clone)]
pub struct TargetBuildDescription {
    pub identity: PackageIdentity,
    pub target_name: String,
    pub module_name: String,
    pub target_type: TargetType,
    pub sources: Vec<PathBuf>,
    pub object_dir: PathBuf,
    pub temps_dir: PathBuf,
    pub library_binary_paths: Vec<PathBuf>,
    pub unsafe_flags: Vec<String>,
}

/// One product's computed build description: the targets it bundles and
/// the single binary output it produces.
#[derive(Debug, Clone)]
pub struct ProductBuildDescription {
    pub identity: PackageIdentity,
    pub product_name: String,
    pub target_names: Vec<String>,
    pub kind: ProductKind,
    pub output: PathBuf,
    /// Carried over from `ResolvedProduct::is_unsafe` — the graph loader
    /// already decided whether this is allowed; the build plan just needs
    /// to know so it can flag it in `show-dependencies`-style output.
    pub is_unsafe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    Executable,
    StaticLibrary,
    Test,
}

/// Every ResolvedTarget mapped to a TargetBuildDescription, every
/// ResolvedProduct mapped to a ProductBuildDescription.
pub struct BuildPlan {
    pub options: BuildOptions,
    pub targets: Vec<TargetBuildDescription>,
    pub products: Vec<ProductBuildDescription>,
}

impl BuildPlan {
    /// Compute a build plan for every package reachable in `graph`.
    /// `package_root` resolves a package's on-disk source directory (its
    /// managed checkout or local path) given its identity.
    pub fn compute(
        graph: &PackageGraph,
        options: BuildOptions,
        package_root: impl Fn(&PackageIdentity) -> PathBuf,
    ) -> Result<Self, BuildError> {
        let config_dir = options.configuration.to_string();
        tracing::debug!(packages = graph.packages.len(), configuration = %config_dir, "computing build plan");
        let mut targets = Vec::new();

        for package in graph.packages.values() {
            let root = package_root(&package.identity);
            for manifest_target in &package.manifest.targets {
                if manifest_target.target_type == TargetType::SystemLibrary {
                    continue;
                }
                let Some(resolved) = package.targets.iter().find(|t| t.name == manifest_target.name) else {
                    continue;
                };
                let module_name = mangle_module_name(&manifest_target.name);
                let sources = discover_sources(&root, manifest_target);
                let object_dir = PathBuf::from(".build").join(&config_dir).join(format!("{module_name}.build"));
                let temps_dir = object_dir.join("temps");
                let library_binary_paths = reachable_binary_paths(package, resolved, graph, &package_root);
                targets.push(TargetBuildDescription {
                    identity: package.identity.clone(),
                    target_name: manifest_target.name.clone(),
                    module_name,
                    target_type: manifest_target.target_type,
                    sources,
                    object_dir,
                    temps_dir,
                    library_binary_paths,
                    unsafe_flags: manifest_target.unsafe_flags.clone(),
                });
            }
        }

        let mut products = Vec::new();
        for package in graph.packages.values() {
            for product in &package.products {
                let kind = product_kind(package, product);
                let ext = match kind {
                    ProductKind::Executable => "",
                    ProductKind::StaticLibrary => ".a",
                    ProductKind::Test => ".test",
                };
                let lib_prefix = if kind == ProductKind::StaticLibrary { "lib" } else { "" };
                let output = PathBuf::from(".build")
                    .join(&config_dir)
                    .join(format!("{lib_prefix}{}{ext}", product.name));
                products.push(ProductBuildDescription {
                    identity: package.identity.clone(),
                    product_name: product.name.clone(),
                    target_names: product.targets.clone(),
                    kind,
                    output,
                    is_unsafe: product.is_unsafe,
                });
            }
        }

        Ok(Self { options, targets, products })
    }
}

fn product_kind(package: &ResolvedPackage, product: &ResolvedProduct) -> ProductKind {
    let has_executable = product.targets.iter().any(|name| {
        package.targets.iter().any(|t| &t.name == name && t.target_type == TargetType::Executable)
    });
    let has_test = product.targets.iter().any(|name| {
        package.targets.iter().any(|t| &t.name == name && t.target_type == TargetType::Test)
    });
    if has_test {
        ProductKind::Test
    } else if has_executable {
        ProductKind::Executable
    } else {
        ProductKind::StaticLibrary
    }
}

/// A C99-valid mangling of a target name: non-identifier characters become
/// underscores, and a leading digit gets an underscore prefix.
pub fn mangle_module_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
        if i == 0 && c.is_ascii_digit() {
            out.insert(0, '_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

fn discover_sources(package_root: &Path, target: &quay_types::Target) -> Vec<PathBuf> {
    let relative = target.path.clone().unwrap_or_else(|| PathBuf::from("Sources").join(&target.name));
    let dir = package_root.join(relative);
    let mut sources = Vec::new();
    collect_swift_files(&dir, &mut sources);
    sources.sort();
    sources
}

fn collect_swift_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_swift_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("swift") {
            out.push(path);
        }
    }
}

/// Binary artifact paths of every target transitively reachable from
/// `target`, via target-dependencies and product-dependencies, whose type
/// is `Binary`.
fn reachable_binary_paths(
    package: &ResolvedPackage,
    target: &ResolvedTarget,
    graph: &PackageGraph,
    package_root: &impl Fn(&PackageIdentity) -> PathBuf,
) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut stack: Vec<(PackageIdentity, String)> =
        target.target_dependencies.iter().map(|d| (package.identity.clone(), d.clone())).collect();
    stack.extend(target.product_dependencies.iter().map(|(id, name)| (id.clone(), name.clone())));

    while let Some((identity, name)) = stack.pop() {
        if !seen.insert((identity.clone(), name.clone())) {
            continue;
        }
        let Some(pkg) = graph.packages.get(&identity) else { continue };
        if let Some(t) = pkg.targets.iter().find(|t| t.name == name) {
            if t.target_type == TargetType::Binary {
                out.push(package_root(&identity).join("artifacts").join(format!("{name}.xcframework")));
            }
            stack.extend(t.target_dependencies.iter().map(|d| (identity.clone(), d.clone())));
            stack.extend(t.product_dependencies.iter().map(|(id, n)| (id.clone(), n.clone())));
        } else if let Some(p) = pkg.products.iter().find(|p| p.name == name) {
            stack.extend(p.targets.iter().map(|t| (identity.clone(), t.clone())));
        }
    }
    out.sort();
    out
}

/// Translates a `BuildPlan` into a command DAG an external build engine
/// can execute.
pub struct BuildManifestGenerator;

impl BuildManifestGenerator {
    pub fn generate(plan: &BuildPlan) -> BuildManifest {
        let config = plan.options.configuration.to_string();
        let mut commands = Vec::new();
        let mut targets: HashMap<String, Vec<String>> = HashMap::new();
        let mut main_deps = Vec::new();
        let mut test_deps = Vec::new();

        for target in &plan.targets {
            let object = target.object_dir.join(format!("{}.o", target.module_name));
            let swiftmodule = target.object_dir.join(format!("{}.swiftmodule", target.module_name));

            let compile_name = format!("{}-{}.compile", target.module_name, config);
            let mut args = vec!["-module-name".to_string(), target.module_name.clone()];
            args.extend(target.unsafe_flags.clone());
            commands.push(BuildCommand {
                name: compile_name.clone(),
                kind: BuildCommandKind::SwiftCompile,
                inputs: target.sources.iter().map(|s| file_node(s)).collect(),
                outputs: vec![file_node(&object), file_node(&swiftmodule)],
                args,
            });

            let mut copy_names = Vec::new();
            for (i, lib) in target.library_binary_paths.iter().enumerate() {
                let copy_name = format!("{}-{}.copy-lib-{i}", target.module_name, config);
                let dest = target.object_dir.join(lib.file_name().unwrap_or_default());
                commands.push(BuildCommand {
                    name: copy_name.clone(),
                    kind: BuildCommandKind::Copy,
                    inputs: vec![file_node(lib)],
                    outputs: vec![file_node(&dest)],
                    args: vec![],
                });
                copy_names.push(copy_name);
            }

            let module_phony = format!("{}-{}.module", target.module_name, config);
            let mut module_inputs = vec![file_node(&object), file_node(&swiftmodule)];
            module_inputs.extend(target.library_binary_paths.iter().map(|p| file_node(p)));
            commands.push(BuildCommand {
                name: module_phony.clone(),
                kind: BuildCommandKind::Phony,
                inputs: module_inputs,
                outputs: vec![virtual_node(&module_phony)],
                args: vec![],
            });

            let mut deps = vec![compile_name];
            deps.extend(copy_names);
            deps.push(module_phony.clone());
            targets.insert(module_phony.clone(), deps);

            if target.target_type == TargetType::Test {
                test_deps.push(module_phony);
            } else {
                main_deps.push(module_phony);
            }
        }

        let module_output_of = |target_name: &str| -> Option<BuildNode> {
            plan.targets
                .iter()
                .find(|t| t.target_name == target_name)
                .map(|t| file_node(&t.object_dir.join(format!("{}.o", t.module_name))))
        };

        for product in &plan.products {
            let inputs: Vec<BuildNode> = product.target_names.iter().filter_map(|n| module_output_of(n)).collect();
            let link_name = format!("{}-{}.link", product.product_name, config);
            let kind = match product.kind {
                ProductKind::StaticLibrary => BuildCommandKind::Archive,
                _ => BuildCommandKind::Shell,
            };
            let args = if product.is_unsafe { vec!["--unsafe".to_string()] } else { vec![] };
            commands.push(BuildCommand {
                name: link_name.clone(),
                kind,
                inputs,
                outputs: vec![file_node(&product.output)],
                args,
            });

            let product_phony = format!(
                "{}-{}.{}",
                product.product_name,
                config,
                match product.kind {
                    ProductKind::Executable => "exe",
                    ProductKind::StaticLibrary => "a",
                    ProductKind::Test => "test",
                }
            );
            commands.push(BuildCommand {
                name: product_phony.clone(),
                kind: BuildCommandKind::Phony,
                inputs: vec![file_node(&product.output)],
                outputs: vec![virtual_node(&product_phony)],
                args: vec![],
            });
            targets.insert(product_phony.clone(), vec![link_name, product_phony.clone()]);

            if product.kind == ProductKind::Test {
                test_deps.push(product_phony);
            } else {
                main_deps.push(product_phony);
            }
        }

        let package_structure_inputs: Vec<BuildNode> = plan
            .targets
            .iter()
            .map(|t| &t.identity)
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|id| BuildNode { kind: BuildNodeKind::DirectoryStructure, path: id.to_string() })
            .collect();
        commands.push(BuildCommand {
            name: "PackageStructure".to_string(),
            kind: BuildCommandKind::PackageStructure,
            inputs: package_structure_inputs,
            outputs: vec![virtual_node("PackageStructureWatcher")],
            args: vec![],
        });

        if test_deps.iter().any(|d| !main_deps.contains(d)) {
            let test_object_inputs: Vec<BuildNode> = plan
                .targets
                .iter()
                .filter(|t| t.target_type == TargetType::Test)
                .map(|t| file_node(&t.object_dir.join(format!("{}.o", t.module_name))))
                .collect();
            if !test_object_inputs.is_empty() {
                let discovery_output = plan
                    .targets
                    .iter()
                    .find(|t| t.target_type == TargetType::Test)
                    .and_then(|t| t.sources.first())
                    .map(|s| s.parent().unwrap_or(Path::new(".")).join("main.swift"))
                    .unwrap_or_else(|| PathBuf::from("main.swift"));
                commands.push(BuildCommand {
                    name: "TestDiscovery".to_string(),
                    kind: BuildCommandKind::TestDiscovery,
                    inputs: test_object_inputs,
                    outputs: vec![file_node(&discovery_output)],
                    args: vec![],
                });
            }
        }

        let mut all = main_deps.clone();
        all.extend(test_deps.iter().cloned());
        all.sort();
        all.dedup();
        targets.insert("main".to_string(), main_deps);
        targets.insert("test".to_string(), all);

        BuildManifest { commands, targets }
    }
}

fn file_node(path: &Path) -> BuildNode {
    BuildNode { kind: BuildNodeKind::File, path: path.to_string_lossy().to_string() }
}

fn virtual_node(name: &str) -> BuildNode {
    BuildNode { kind: BuildNodeKind::Virtual, path: format!("<virtual:{name}>") }
}

/// Render a build manifest as a human-readable command listing. A hand-
/// written writer rather than a `serde` dump: each command kind carries
/// its own interesting fields (a `Copy` command's single input/output pair
/// reads better as `src -> dst` than as parallel arrays), so one fixed
/// struct shape wouldn't read naturally for all of them.
pub fn render_text(manifest: &BuildManifest) -> String {
    let mut out = String::new();
    for command in &manifest.commands {
        let inputs: Vec<&str> = command.inputs.iter().map(|n| n.path.as_str()).collect();
        let outputs: Vec<&str> = command.outputs.iter().map(|n| n.path.as_str()).collect();
        out.push_str(&format!("{:?} {}\n", command.kind, command.name));
        out.push_str(&format!("  in:  {}\n", inputs.join(", ")));
        out.push_str(&format!("  out: {}\n", outputs.join(", ")));
        if !command.args.is_empty() {
            out.push_str(&format!("  args: {}\n", command.args.join(" ")));
        }
    }
    let mut target_names: Vec<&String> = manifest.targets.keys().collect();
    target_names.sort();
    for name in target_names {
        out.push_str(&format!("target {name}: {}\n", manifest.targets[name].join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_types::{Manifest, PackageSection, Product, ResolvedProduct, ResolvedTarget, Target};

    fn graph_with_single_library() -> PackageGraph {
        let identity = PackageIdentity::from_location("https://example.com/swift-log").unwrap();
        let resolved_target = ResolvedTarget {
            name: "SwiftLog".to_string(),
            target_type: TargetType::Library,
            target_dependencies: vec![],
            product_dependencies: vec![],
        };
        let package = ResolvedPackage {
            identity: identity.clone(),
            manifest: Manifest {
                package: PackageSection::default(),
                dependencies: vec![],
                targets: vec![Target::library("SwiftLog")],
                products: vec![Product { name: "SwiftLog".to_string(), targets: vec!["SwiftLog".to_string()] }],
                overrides: Default::default(),
                constraints: Default::default(),
            },
            targets: vec![resolved_target],
            products: vec![ResolvedProduct { name: "SwiftLog".to_string(), targets: vec!["SwiftLog".to_string()], is_unsafe: false }],
        };
        let mut packages = HashMap::new();
        packages.insert(identity.clone(), package);
        PackageGraph { root_identities: vec![identity], packages }
    }

    #[test]
    fn mangles_module_names_starting_with_a_digit() {
        assert_eq!(mangle_module_name("2Fast"), "_2Fast");
        assert_eq!(mangle_module_name("swift-log"), "swift_log");
    }

    #[test]
    fn generates_a_compile_and_archive_command_per_library() {
        let graph = graph_with_single_library();
        let plan = BuildPlan::compute(&graph, BuildOptions::default(), |_| PathBuf::from("/tmp/nonexistent")).unwrap();
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.products.len(), 1);

        let manifest = BuildManifestGenerator::generate(&plan);
        assert!(manifest.commands.iter().any(|c| c.kind == BuildCommandKind::SwiftCompile));
        assert!(manifest.commands.iter().any(|c| c.kind == BuildCommandKind::Archive));
        assert!(manifest.commands.iter().any(|c| c.kind == BuildCommandKind::PackageStructure));
        assert!(manifest.targets.contains_key("main"));

        let text = render_text(&manifest);
        assert!(text.contains("SwiftCompile"));
        assert!(text.contains("target main:"));
    }
}
