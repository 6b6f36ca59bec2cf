//! Aggregated, user-facing error diagnostics for Quay.
//!
//! Every other crate keeps its own `thiserror` error enum; this crate
//! collects them into one `QuayError` with `miette::Diagnostic` derives so
//! the CLI can render a single, consistently formatted report.

#![allow(unused_assignments)]

pub use miette::{Diagnostic, Report, Result};
use thiserror::Error;

/// A Quay error with rich diagnostics.
#[derive(Error, Diagnostic, Debug)]
pub enum QuayError {
    #[error("manifest not found")]
    #[diagnostic(
        code(quay::manifest::not_found),
        help("create a Package.toml in your project root")
    )]
    ManifestNotFound,

    #[error("failed to parse manifest: {message}")]
    #[diagnostic(code(quay::manifest::parse_error))]
    ManifestParseError {
        message: String,
        #[source_code]
        src: Option<String>,
        #[label("error here")]
        span: Option<miette::SourceSpan>,
    },

    #[error("manifest declares tools-version {required} but this build understands up to {current}")]
    #[diagnostic(
        code(quay::manifest::tools_version_incompatible),
        help("upgrade quay, or lower the manifest's tools-version")
    )]
    ToolsVersionIncompatible { required: String, current: String },

    #[error("package not found: {name}")]
    #[diagnostic(code(quay::resolve::package_not_found), help("{help}"))]
    PackageNotFound { name: String, help: String },

    #[error("no solution satisfies the dependency constraints")]
    #[diagnostic(
        code(quay::resolve::unresolvable_conflict),
        help("try relaxing a version requirement or adding an override")
    )]
    UnresolvableConflict {
        /// Human-readable list of the incompatibilities PubGrub derived.
        incompatibilities: Vec<String>,
    },

    #[error("no version of '{package}' satisfies '{requirement}'")]
    #[diagnostic(
        code(quay::resolve::no_matching_version),
        help("available versions: {available}")
    )]
    NoMatchingVersion {
        package: String,
        requirement: String,
        available: String,
    },

    #[error("dependency cycle detected")]
    #[diagnostic(code(quay::resolve::cycle))]
    DependencyCycle { cycle: Vec<String> },

    #[error("revision not found: {revision}")]
    #[diagnostic(code(quay::repository::revision_not_found), help("{help}"))]
    RevisionNotFound { revision: String, help: String },

    #[error("package at '{location}' has two different declared identities: '{path_identity}' (local) and '{url_identity}' (remote)")]
    #[diagnostic(
        code(quay::identity::conflict),
        help("use distinct checkout paths, or drop one of the two references")
    )]
    IdentityConflict {
        location: String,
        path_identity: String,
        url_identity: String,
    },

    #[error("resolution was cancelled")]
    #[diagnostic(code(quay::resolve::cancelled))]
    ResolutionCancelled,

    #[error("cache error: {message}")]
    #[diagnostic(code(quay::cache::error))]
    CacheError { message: String },

    #[error("network error: {message}")]
    #[diagnostic(
        code(quay::network::error),
        help("check your internet connection and try again")
    )]
    NetworkError { message: String },

    #[error("{0}")]
    #[diagnostic(code(quay::generic))]
    Generic(String),
}

impl QuayError {
    pub fn manifest_parse(message: impl Into<String>) -> Self {
        Self::ManifestParseError {
            message: message.into(),
            src: None,
            span: None,
        }
    }

    pub fn package_not_found(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::PackageNotFound {
            name: name.into(),
            help: help.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::CacheError {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn unresolvable_conflict(incompatibilities: Vec<String>) -> Self {
        Self::UnresolvableConflict { incompatibilities }
    }

    pub fn no_matching_version(
        package: impl Into<String>,
        requirement: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Self::NoMatchingVersion {
            package: package.into(),
            requirement: requirement.into(),
            available: if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            },
        }
    }

    pub fn dependency_cycle(cycle: Vec<String>) -> Self {
        Self::DependencyCycle { cycle }
    }

    pub fn revision_not_found(revision: impl Into<String>, help: impl Into<String>) -> Self {
        Self::RevisionNotFound {
            revision: revision.into(),
            help: help.into(),
        }
    }
}

/// Install the pretty terminal handler for `miette::Report`s.
pub fn setup() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_matching_version_lists_none_when_empty() {
        let err = QuayError::no_matching_version("swift-log", "^2.0.0", vec![]);
        match err {
            QuayError::NoMatchingVersion { available, .. } => assert_eq!(available, "none"),
            _ => panic!("wrong variant"),
        }
    }
}
