//! Persistent sets of active constraints.

use std::collections::BTreeMap;
use std::fmt;

use crate::package::{Constraint, PackageId, Requirement};

/// Merge two requirements on the same package.
///
/// `None` means the pair is contradictory and the branch holding it must be
/// abandoned. Unversioned dominates everything; a revision merges only with
/// an identical revision or a fully unconstrained version set; version sets
/// intersect.
fn merge_requirements(current: &Requirement, new: &Requirement) -> Option<Requirement> {
    use Requirement::*;
    match (current, new) {
        (Unversioned, _) => Some(Unversioned),
        (_, Unversioned) => Some(Unversioned),
        (VersionSet(a), VersionSet(b)) => {
            let merged = a.intersection(b);
            if merged.is_empty() {
                None
            } else {
                Some(VersionSet(merged))
            }
        }
        (VersionSet(set), Revision(revision)) => {
            if matches!(set, keel_semver::VersionSetSpecifier::Any) {
                Some(Revision(revision.clone()))
            } else {
                None
            }
        }
        (Revision(_), VersionSet(_)) => None,
        (Revision(a), Revision(b)) => {
            if a == b {
                Some(Revision(a.clone()))
            } else {
                None
            }
        }
    }
}

/// A mapping from package to the requirement currently placed on it.
///
/// Packages not in the set are implicitly unconstrained. The set is
/// persistent in the copy-on-merge sense: merging produces a new set and
/// leaves the original untouched, so lazily forked search branches can share
/// one instance. No key ever maps to an empty version set; a merge that
/// would produce one fails instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConstraintSet {
    terms: BTreeMap<PackageId, Requirement>,
}

impl ConstraintSet {
    pub fn new() -> ConstraintSet {
        ConstraintSet::default()
    }

    /// The active requirement for `id`; unconstrained when unmentioned.
    pub fn requirement_for(&self, id: &PackageId) -> Requirement {
        self.terms.get(id).cloned().unwrap_or_else(Requirement::any)
    }

    /// Whether `id` carries an explicit requirement.
    pub fn contains(&self, id: &PackageId) -> bool {
        self.terms.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterate entries in package-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageId, &Requirement)> {
        self.terms.iter()
    }

    /// This set with `constraint` merged in, or `None` if the result would
    /// be contradictory.
    pub fn merging(&self, constraint: &Constraint) -> Option<ConstraintSet> {
        let current = self.requirement_for(&constraint.id);
        let merged = merge_requirements(&current, &constraint.requirement)?;
        let mut terms = self.terms.clone();
        terms.insert(constraint.id.clone(), merged);
        Some(ConstraintSet { terms })
    }

    /// This set with every constraint in `constraints` merged in.
    pub fn merging_constraints(&self, constraints: &[Constraint]) -> Option<ConstraintSet> {
        let mut merged = self.clone();
        for constraint in constraints {
            merged = merged.merging(constraint)?;
        }
        Some(merged)
    }

    /// Pointwise merge of two whole sets.
    pub fn merging_set(&self, other: &ConstraintSet) -> Option<ConstraintSet> {
        let mut merged = self.clone();
        for (id, requirement) in other.iter() {
            let current = merged.requirement_for(id);
            let combined = merge_requirements(&current, requirement)?;
            merged.terms.insert(id.clone(), combined);
        }
        Some(merged)
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (id, requirement)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}: {requirement}")?;
        }
        f.write_str("}")
    }
}
