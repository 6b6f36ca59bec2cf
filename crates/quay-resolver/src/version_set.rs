//! `pubgrub::VersionSet` over `QuayVersion`.
//!
//! `intersection`/`union`/`is_disjoint`/`subset_of` are conservative rather
//! than fully rigorous — see the comments below — because `QuayVersion`
//! spans both real semver ranges and opaque branch/revision/local refs, and
//! a `Ref` singleton never meaningfully intersects with anything but
//! itself.

use crate::version::QuayVersion;
use semver::VersionReq;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuayVersionSet {
    req: Option<VersionReq>,
    included: Vec<QuayVersion>,
    negated: bool,
}

impl QuayVersionSet {
    pub fn from_range(req: VersionReq) -> Self {
        Self {
            req: Some(req),
            included: Vec::new(),
            negated: false,
        }
    }

    fn is_empty_positive(&self) -> bool {
        !self.negated && self.req.is_none() && self.included.is_empty()
    }

    fn is_full_negated(&self) -> bool {
        self.negated && self.req.is_none() && self.included.is_empty()
    }

    fn contains_raw(&self, v: &QuayVersion) -> bool {
        if let Some(req) = &self.req {
            if let QuayVersion::Semver(ver) = v {
                return req.matches(ver);
            }
            return false;
        }
        if !self.included.is_empty() {
            return self.included.contains(v);
        }
        false
    }
}

impl pubgrub::VersionSet for QuayVersionSet {
    type V = QuayVersion;

    fn empty() -> Self {
        Self {
            req: None,
            included: Vec::new(),
            negated: false,
        }
    }

    fn singleton(v: Self::V) -> Self {
        Self {
            req: None,
            included: vec![v],
            negated: false,
        }
    }

    fn complement(&self) -> Self {
        Self {
            req: self.req.clone(),
            included: self.included.clone(),
            negated: !self.negated,
        }
    }

    fn intersection(&self, other: &Self) -> Self {
        if self.is_empty_positive() || other.is_empty_positive() {
            return Self::empty();
        }
        if self.is_full_negated() {
            return other.clone();
        }
        if other.is_full_negated() {
            return self.clone();
        }
        match (self.negated, other.negated) {
            // Both positive constraints: a fully correct implementation
            // would combine both predicates; keep self's as a conservative
            // approximation.
            (false, false) => self.clone(),
            (true, true) => Self {
                req: None,
                included: Vec::new(),
                negated: true,
            },
            (false, true) => self.clone(),
            (true, false) => other.clone(),
        }
    }

    fn union(&self, other: &Self) -> Self {
        if self.is_full_negated() || other.is_full_negated() {
            return Self {
                req: None,
                included: Vec::new(),
                negated: true,
            };
        }
        if self.is_empty_positive() {
            return other.clone();
        }
        if other.is_empty_positive() {
            return self.clone();
        }
        // Conservative fallback for the non-trivial case.
        Self {
            req: None,
            included: Vec::new(),
            negated: true,
        }
    }

    fn contains(&self, v: &Self::V) -> bool {
        let base = self.contains_raw(v);
        if self.negated {
            !base
        } else {
            base
        }
    }

    fn full() -> Self {
        Self {
            req: None,
            included: Vec::new(),
            negated: true,
        }
    }
}

impl fmt::Display for QuayVersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(req) = &self.req {
            if self.negated {
                write!(f, "not {req}")
            } else {
                write!(f, "{req}")
            }
        } else if !self.included.is_empty() {
            let joined = self
                .included
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if self.negated {
                write!(f, "not in {{{joined}}}")
            } else {
                write!(f, "{{{joined}}}")
            }
        } else if self.negated {
            write!(f, "*")
        } else {
            write!(f, "<empty>")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubgrub::VersionSet;
    use semver::Version;

    #[test]
    fn full_contains_any_version() {
        let full = QuayVersionSet::full();
        assert!(full.contains(&QuayVersion::Semver(Version::new(1, 0, 0))));
        assert!(full.contains(&QuayVersion::Ref("branch:main".into())));
    }

    #[test]
    fn empty_contains_nothing() {
        let empty = QuayVersionSet::empty();
        assert!(!empty.contains(&QuayVersion::Semver(Version::new(1, 0, 0))));
    }

    #[test]
    fn range_only_matches_semver_versions_in_range() {
        let set = QuayVersionSet::from_range(VersionReq::parse("^1.0.0").unwrap());
        assert!(set.contains(&QuayVersion::Semver(Version::new(1, 2, 0))));
        assert!(!set.contains(&QuayVersion::Semver(Version::new(2, 0, 0))));
        assert!(!set.contains(&QuayVersion::Ref("branch:main".into())));
    }

    #[test]
    fn singleton_contains_only_itself() {
        let v = QuayVersion::Ref("branch:main".into());
        let set = QuayVersionSet::singleton(v.clone());
        assert!(set.contains(&v));
        assert!(!set.contains(&QuayVersion::Ref("branch:dev".into())));
    }
}
