//! Conflict formatting and suggestion generation.

use crate::error::{ConflictDerivation, DerivationStep, ResolutionSuggestion};
use quay_types::PackageIdentity;
use semver::Version;

/// Formats PubGrub derivation trees into human-readable conflict messages.
pub struct ConflictFormatter;

impl ConflictFormatter {
    pub fn format_incompatibility(
        package: &PackageIdentity,
        requirements: &[(PackageIdentity, String)], // (requirer, requirement)
    ) -> ConflictDerivation {
        let mut derivation =
            ConflictDerivation::new(format!("Incompatible version requirements for {package}"));

        for (from, requirement) in requirements {
            let step = DerivationStep::new(format!("{from} requires {package} {requirement}"))
                .with_package(from.as_str());
            derivation.add_step(step);
        }

        derivation.format();
        derivation
    }

    /// Generate suggestions for resolving a version conflict.
    pub fn suggest_fixes(
        package: &PackageIdentity,
        requirements: &[(PackageIdentity, String)],
        available_versions: &[Version],
    ) -> Vec<ResolutionSuggestion> {
        let mut suggestions = Vec::new();

        if let Some(latest) = available_versions.iter().max() {
            suggestions.push(ResolutionSuggestion::AddOverride {
                package: package.clone(),
                version: latest.to_string(),
            });
        }

        for (from, _requirement) in requirements {
            suggestions.push(ResolutionSuggestion::RemoveConstraint {
                package: package.clone(),
                from: from.clone(),
            });
        }

        suggestions
    }

    pub fn format_no_matching_version(
        package: &PackageIdentity,
        requirement: &str,
        available: &[Version],
    ) -> String {
        let mut output =
            format!("No version of '{package}' satisfies the requirement '{requirement}'.\n\n");

        if available.is_empty() {
            output.push_str("No versions are available for this package.");
        } else {
            output.push_str("Available versions:\n");
            let mut versions: Vec<_> = available.iter().collect();
            versions.sort();
            versions.reverse();
            for (i, version) in versions.iter().take(10).enumerate() {
                output.push_str(&format!("  {}. {version}\n", i + 1));
            }
            if versions.len() > 10 {
                output.push_str(&format!("  ... and {} more\n", versions.len() - 10));
            }
        }

        output
    }

    pub fn format_cycle(cycle: &[PackageIdentity]) -> String {
        let mut output = String::from("Dependency cycle detected:\n\n");

        for (i, pkg) in cycle.iter().enumerate() {
            if i > 0 {
                output.push_str("  \u{2193}\n");
            }
            output.push_str(&format!("  {pkg}\n"));
        }

        if !cycle.is_empty() {
            output.push_str("  \u{2193}\n");
            output.push_str(&format!("  {} (cycle)\n", cycle[0]));
        }

        output
    }
}

/// Helper for building resolution error messages.
pub struct ErrorMessageBuilder {
    sections: Vec<String>,
}

impl ErrorMessageBuilder {
    pub fn new() -> Self {
        Self { sections: Vec::new() }
    }

    pub fn add_header(mut self, header: &str) -> Self {
        self.sections.push(format!("{header}\n"));
        self
    }

    pub fn add_section(mut self, title: &str, content: &str) -> Self {
        self.sections.push(format!("{title}:\n{content}\n"));
        self
    }

    pub fn add_list(mut self, title: &str, items: &[String]) -> Self {
        let mut section = format!("{title}:\n");
        for item in items {
            section.push_str(&format!("  \u{2022} {item}\n"));
        }
        self.sections.push(section);
        self
    }

    pub fn add_suggestions(mut self, suggestions: &[ResolutionSuggestion]) -> Self {
        if suggestions.is_empty() {
            return self;
        }

        let mut section = String::from("Suggestions:\n");
        for (i, suggestion) in suggestions.iter().enumerate() {
            section.push_str(&format!("  {}. {suggestion}\n", i + 1));
        }
        self.sections.push(section);
        self
    }

    pub fn build(self) -> String {
        self.sections.join("\n")
    }
}

impl Default for ErrorMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> PackageIdentity {
        PackageIdentity::from_location(&format!("https://example.com/{name}")).unwrap()
    }

    #[test]
    fn format_incompatibility_names_all_requirers() {
        let requirements = vec![
            (identity("my-app"), "^1.4".to_string()),
            (identity("swift-nio"), ">=1.5.0".to_string()),
        ];

        let derivation = ConflictFormatter::format_incompatibility(&identity("swift-log"), &requirements);

        assert!(derivation.formatted.contains("swift-log"));
        assert!(derivation.formatted.contains("my-app"));
    }

    #[test]
    fn format_cycle_marks_the_closing_edge() {
        let cycle = vec![identity("package-a"), identity("package-b"), identity("package-c")];

        let output = ConflictFormatter::format_cycle(&cycle);
        assert!(output.contains("package-a"));
        assert!(output.contains("cycle"));
    }

    #[test]
    fn error_message_builder_joins_sections() {
        let message = ErrorMessageBuilder::new()
            .add_header("Resolution failed")
            .add_section("Problem", "Version conflict for swift-log")
            .add_list("Conflicting requirements", &["my-app requires ^1.4".to_string()])
            .build();

        assert!(message.contains("Resolution failed"));
        assert!(message.contains("Version conflict"));
    }
}
