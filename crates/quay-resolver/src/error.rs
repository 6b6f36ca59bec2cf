//! Error types for dependency resolution.

use quay_types::PackageIdentity;
use semver::Version;
use std::fmt;
use thiserror::Error;

/// Errors that can occur during dependency resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No version of a package satisfies the given requirement.
    #[error("no version of {package} satisfies {requirement}")]
    NoMatchingVersion {
        package: PackageIdentity,
        requirement: String,
        available: Vec<Version>,
    },

    /// Package not found in any source.
    #[error("package not found: {identity}")]
    PackageNotFound {
        identity: PackageIdentity,
        /// Similar package identities for suggestions
        suggestions: Vec<PackageIdentity>,
    },

    /// Resolution was cancelled (e.g., timeout or user interrupt).
    #[error("resolution cancelled")]
    Cancelled,

    /// No solution exists for the given constraints (PubGrub exhausted the
    /// search space).
    #[error("no solution found: {message}")]
    NoSolution {
        message: String,
        derivation: ConflictDerivation,
        suggestions: Vec<ResolutionSuggestion>,
    },

    /// Provider error surfaced from the package container layer (e.g.
    /// repository fetch failure, manifest parse failure).
    #[error("failed to fetch package info: {0}")]
    ProviderError(String),
}

/// A conflicting requirement in the dependency graph.
#[derive(Debug, Clone)]
pub struct ConflictingRequirement {
    /// The package that imposed this requirement
    pub from: PackageIdentity,
    /// The version requirement string
    pub requirement: String,
    /// Path from root to this requirement
    pub dependency_chain: Vec<PackageIdentity>,
}

impl fmt::Display for ConflictingRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.from, self.requirement)?;
        if !self.dependency_chain.is_empty() {
            let chain: Vec<_> = self.dependency_chain.iter().map(|i| i.as_str()).collect();
            write!(f, " (via {})", chain.join(" -> "))?;
        }
        Ok(())
    }
}

/// Derivation tree explaining how a conflict arose.
#[derive(Debug, Clone, Default)]
pub struct ConflictDerivation {
    /// Root cause description
    pub root_cause: String,
    /// Steps showing how the conflict was derived
    pub steps: Vec<DerivationStep>,
    /// Formatted tree for display
    pub formatted: String,
}

impl ConflictDerivation {
    pub fn new(root_cause: impl Into<String>) -> Self {
        Self {
            root_cause: root_cause.into(),
            steps: Vec::new(),
            formatted: String::new(),
        }
    }

    pub fn add_step(&mut self, step: DerivationStep) {
        self.steps.push(step);
    }

    pub fn format(&mut self) {
        let mut output = String::new();
        output.push_str(&format!("Root cause: {}\n", self.root_cause));
        output.push('\n');

        for (i, step) in self.steps.iter().enumerate() {
            output.push_str(&format!("{}. {}\n", i + 1, step.description));
            for pkg in &step.packages_involved {
                output.push_str(&format!("   - {pkg}\n"));
            }
        }

        self.formatted = output;
    }
}

impl fmt::Display for ConflictDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.formatted.is_empty() {
            write!(f, "{}", self.root_cause)
        } else {
            write!(f, "{}", self.formatted)
        }
    }
}

/// A single step in the derivation of a conflict.
#[derive(Debug, Clone)]
pub struct DerivationStep {
    pub description: String,
    pub packages_involved: Vec<String>,
}

impl DerivationStep {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            packages_involved: Vec::new(),
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.packages_involved.push(package.into());
        self
    }
}

/// Suggested fixes for resolution failures.
#[derive(Debug, Clone)]
pub enum ResolutionSuggestion {
    Upgrade {
        package: PackageIdentity,
        from: Version,
        to: Version,
    },
    Downgrade {
        package: PackageIdentity,
        from: Version,
        to: Version,
    },
    AddOverride {
        package: PackageIdentity,
        version: String,
    },
    RemoveConstraint {
        package: PackageIdentity,
        from: PackageIdentity,
    },
    ChangeBranch {
        package: PackageIdentity,
        current: String,
        suggested: String,
    },
}

impl fmt::Display for ResolutionSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upgrade { package, from, to } => write!(f, "Upgrade {package} from {from} to {to}"),
            Self::Downgrade { package, from, to } => write!(f, "Downgrade {package} from {from} to {to}"),
            Self::AddOverride { package, version } => {
                write!(f, "Add override: [overrides]\n{package} = \"{version}\"")
            }
            Self::RemoveConstraint { package, from } => {
                write!(f, "Remove {package} constraint from {from}")
            }
            Self::ChangeBranch { package, current, suggested } => {
                write!(f, "Change {package} branch from '{current}' to '{suggested}'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> PackageIdentity {
        PackageIdentity::from_location(&format!("https://example.com/{name}")).unwrap()
    }

    #[test]
    fn conflicting_requirement_displays_source_and_chain() {
        let req = ConflictingRequirement {
            from: identity("swift-nio"),
            requirement: ">=1.5.0".to_string(),
            dependency_chain: vec![identity("my-app")],
        };
        assert!(req.to_string().contains("requires >=1.5.0"));
    }

    #[test]
    fn derivation_formatting_includes_steps() {
        let mut derivation = ConflictDerivation::new("Incompatible version requirements");
        derivation.add_step(
            DerivationStep::new("swift-nio requires swift-log >=1.5").with_package("swift-log"),
        );
        derivation.format();
        assert!(derivation.formatted.contains("swift-nio requires"));
    }
}
