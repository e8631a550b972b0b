//! Contiguous version sets and their algebra.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Version;

/// A set of versions a requirement may select from.
///
/// The representation is closed under intersection but not under union or
/// difference: those operations return `None` when the result would not be
/// one contiguous set (two disjoint ranges, a range with a hole, the
/// complement of `Any`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionSetSpecifier {
    /// No version is acceptable.
    Empty,
    /// Every version is acceptable.
    Any,
    /// Exactly one version is acceptable.
    Exact(Version),
    /// The half-open range `lower <= v < upper`.
    Range { lower: Version, upper: Version },
}

impl VersionSetSpecifier {
    /// The half-open range `lower <= v < upper`. An inverted or hollow pair
    /// normalizes to `Empty`.
    pub fn range(lower: Version, upper: Version) -> VersionSetSpecifier {
        if lower < upper {
            VersionSetSpecifier::Range { lower, upper }
        } else {
            VersionSetSpecifier::Empty
        }
    }

    /// Whether the set contains no versions.
    pub fn is_empty(&self) -> bool {
        matches!(self, VersionSetSpecifier::Empty)
    }

    /// Whether `version` is a member of this set.
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            VersionSetSpecifier::Empty => false,
            VersionSetSpecifier::Any => true,
            VersionSetSpecifier::Exact(v) => v == version,
            VersionSetSpecifier::Range { lower, upper } => lower <= version && version < upper,
        }
    }

    /// The set of versions in both `self` and `other`.
    ///
    /// Total: the representation is closed under intersection. Commutative,
    /// associative, idempotent; `Empty` is the zero and `Any` the identity.
    pub fn intersection(&self, other: &VersionSetSpecifier) -> VersionSetSpecifier {
        use VersionSetSpecifier::*;
        match (self, other) {
            (Empty, _) | (_, Empty) => Empty,
            (Any, s) | (s, Any) => s.clone(),
            (Exact(a), Exact(b)) => {
                if a == b {
                    Exact(a.clone())
                } else {
                    Empty
                }
            }
            (Exact(a), r @ Range { .. }) | (r @ Range { .. }, Exact(a)) => {
                if r.contains(a) {
                    Exact(a.clone())
                } else {
                    Empty
                }
            }
            (
                Range {
                    lower: l1,
                    upper: u1,
                },
                Range {
                    lower: l2,
                    upper: u2,
                },
            ) => VersionSetSpecifier::range(l1.max(l2).clone(), u1.min(u2).clone()),
        }
    }

    /// The set of versions in either `self` or `other`, or `None` when that
    /// union is not one contiguous set.
    pub fn union(&self, other: &VersionSetSpecifier) -> Option<VersionSetSpecifier> {
        use VersionSetSpecifier::*;
        match (self, other) {
            (Empty, s) | (s, Empty) => Some(s.clone()),
            (Any, _) | (_, Any) => Some(Any),
            (Exact(a), Exact(b)) => {
                if a == b {
                    Some(Exact(a.clone()))
                } else {
                    None
                }
            }
            (Exact(a), r @ Range { .. }) | (r @ Range { .. }, Exact(a)) => {
                if r.contains(a) {
                    Some(r.clone())
                } else {
                    None
                }
            }
            (
                Range {
                    lower: l1,
                    upper: u1,
                },
                Range {
                    lower: l2,
                    upper: u2,
                },
            ) => {
                // Overlapping or adjacent ranges fuse into one.
                if l2 <= u1 && l1 <= u2 {
                    Some(VersionSetSpecifier::range(
                        l1.min(l2).clone(),
                        u1.max(u2).clone(),
                    ))
                } else {
                    None
                }
            }
        }
    }

    /// The set of versions in `self` but not in `other`, or `None` when the
    /// remainder is not one contiguous set.
    pub fn difference(&self, other: &VersionSetSpecifier) -> Option<VersionSetSpecifier> {
        use VersionSetSpecifier::*;
        match (self, other) {
            (_, Any) => Some(Empty),
            (Empty, _) => Some(Empty),
            (s, Empty) => Some(s.clone()),
            // The complement of a proper subset of `Any` has a hole.
            (Any, _) => None,
            (Exact(a), Exact(b)) => {
                if a == b {
                    Some(Empty)
                } else {
                    Some(Exact(a.clone()))
                }
            }
            (Exact(a), r @ Range { .. }) => {
                if r.contains(a) {
                    Some(Empty)
                } else {
                    Some(Exact(a.clone()))
                }
            }
            (r @ Range { .. }, Exact(a)) => {
                // Removing an interior point (or the closed lower bound)
                // leaves a non-contiguous or half-unbounded remainder.
                if r.contains(a) {
                    None
                } else {
                    Some(r.clone())
                }
            }
            (
                Range {
                    lower: l1,
                    upper: u1,
                },
                Range {
                    lower: l2,
                    upper: u2,
                },
            ) => {
                if u2 <= l1 || l2 >= u1 {
                    return Some(self.clone());
                }
                if l2 <= l1 && u2 >= u1 {
                    return Some(Empty);
                }
                if l2 <= l1 {
                    // Overlap at the low end; the remainder starts where the
                    // subtrahend stops.
                    return Some(VersionSetSpecifier::range(u2.clone(), u1.clone()));
                }
                if u2 >= u1 {
                    return Some(VersionSetSpecifier::range(l1.clone(), l2.clone()));
                }
                // Interior subtraction splits the range in two.
                None
            }
        }
    }
}

impl fmt::Display for VersionSetSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSetSpecifier::Empty => f.write_str("empty"),
            VersionSetSpecifier::Any => f.write_str("any"),
            VersionSetSpecifier::Exact(v) => write!(f, "{v}"),
            VersionSetSpecifier::Range { lower, upper } => write!(f, "[{lower}, {upper})"),
        }
    }
}
