//! The package type PubGrub resolves over: a synthetic root plus every
//! named package identity reachable from it.

use quay_types::PackageIdentity;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuayPackage {
    Root,
    Named(PackageIdentity),
}

impl QuayPackage {
    pub fn named(identity: PackageIdentity) -> Self {
        QuayPackage::Named(identity)
    }

    pub fn is_root(&self) -> bool {
        matches!(self, QuayPackage::Root)
    }

    pub fn identity(&self) -> Option<&PackageIdentity> {
        match self {
            QuayPackage::Root => None,
            QuayPackage::Named(id) => Some(id),
        }
    }
}

impl fmt::Display for QuayPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuayPackage::Root => write!(f, "<root>"),
            QuayPackage::Named(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_displays_as_root_marker() {
        assert_eq!(QuayPackage::Root.to_string(), "<root>");
    }

    #[test]
    fn named_equality_is_by_identity() {
        let a = PackageIdentity::from_location("https://example.com/a").unwrap();
        let b = PackageIdentity::from_location("https://example.com/a").unwrap();
        assert_eq!(QuayPackage::named(a), QuayPackage::named(b));
    }
}
