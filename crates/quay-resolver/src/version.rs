//! The version type PubGrub orders over. Most dependencies resolve over
//! real semver versions, but branch/revision/local requirements need a
//! place in the same ordered space — they resolve to a single candidate
//! identified by a ref string instead of a version number.

use semver::Version;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuayVersion {
    Semver(Version),
    /// A pinned ref (branch tip revision, exact revision, or the sentinel
    /// used for local packages), ordered after all semver versions.
    Ref(String),
}

impl QuayVersion {
    pub fn root() -> Self {
        QuayVersion::Semver(Version::new(0, 0, 0))
    }
}

impl From<Version> for QuayVersion {
    fn from(v: Version) -> Self {
        QuayVersion::Semver(v)
    }
}

impl PartialOrd for QuayVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QuayVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (QuayVersion::Semver(a), QuayVersion::Semver(b)) => a.cmp(b),
            (QuayVersion::Ref(a), QuayVersion::Ref(b)) => a.cmp(b),
            (QuayVersion::Semver(_), QuayVersion::Ref(_)) => Ordering::Less,
            (QuayVersion::Ref(_), QuayVersion::Semver(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for QuayVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuayVersion::Semver(v) => write!(f, "{v}"),
            QuayVersion::Ref(r) => write!(f, "{r}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_orders_before_ref() {
        let a = QuayVersion::Semver(Version::new(1, 0, 0));
        let b = QuayVersion::Ref("branch:main".to_string());
        assert!(a < b);
    }

    #[test]
    fn semver_versions_order_numerically() {
        let a = QuayVersion::Semver(Version::new(1, 0, 0));
        let b = QuayVersion::Semver(Version::new(2, 0, 0));
        assert!(a < b);
    }
}
