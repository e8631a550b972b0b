//! Insertion-ordered assignments of packages to bindings.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::container::Container;
use crate::error::ProviderError;
use crate::package::{BoundVersion, PackageId};
use crate::solver::constraint_set::ConstraintSet;

#[derive(Clone)]
struct Assignment {
    container: Arc<dyn Container>,
    binding: BoundVersion,
}

/// A partial or complete solution: each package the search has touched,
/// bound to its outcome.
///
/// Iteration order preserves the order in which bindings were added
/// (critical for deterministic output), hence the `IndexMap`.
#[derive(Clone, Default)]
pub struct AssignmentSet {
    assignments: IndexMap<PackageId, Assignment>,
}

impl AssignmentSet {
    pub fn new() -> AssignmentSet {
        AssignmentSet::default()
    }

    /// Bind `container`'s package to `binding`, replacing any previous
    /// binding for it.
    pub fn bind(&mut self, container: Arc<dyn Container>, binding: BoundVersion) {
        let id = container.package_id().clone();
        self.assignments.insert(id, Assignment { container, binding });
    }

    /// The binding for `id`, if assigned.
    pub fn binding(&self, id: &PackageId) -> Option<&BoundVersion> {
        self.assignments.get(id).map(|a| &a.binding)
    }

    /// The container `id` was bound through, if assigned.
    pub fn container(&self, id: &PackageId) -> Option<&Arc<dyn Container>> {
        self.assignments.get(id).map(|a| &a.container)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageId, &Arc<dyn Container>, &BoundVersion)> {
        self.assignments
            .iter()
            .map(|(id, a)| (id, &a.container, &a.binding))
    }

    /// Union with `other`. The sets must agree on every shared package;
    /// `None` otherwise. Entries from `other` keep their relative order
    /// after the entries of `self`.
    pub fn merging(&self, other: &AssignmentSet) -> Option<AssignmentSet> {
        let mut merged = self.clone();
        for (id, assignment) in &other.assignments {
            match merged.assignments.get(id) {
                Some(existing) => {
                    if existing.binding != assignment.binding {
                        return None;
                    }
                }
                None => {
                    merged.assignments.insert(id.clone(), assignment.clone());
                }
            }
        }
        Some(merged)
    }

    /// The constraints this assignment imposes: the pointwise merge of the
    /// dependencies declared by every bound version and revision.
    ///
    /// Excluded and unversioned entries contribute nothing here; an
    /// unversioned package's dependencies are walked during its own subtree
    /// search instead.
    ///
    /// `Ok(None)` means the contributions do not merge. Assignments built by
    /// the solver never produce that (each binding was validated against the
    /// active set as it was added); it indicates an inconsistent
    /// caller-built set.
    pub fn induced_constraints(
        &self,
    ) -> std::result::Result<Option<ConstraintSet>, ProviderError> {
        let mut induced = ConstraintSet::new();
        for (id, assignment) in &self.assignments {
            let contributed = match &assignment.binding {
                BoundVersion::Excluded | BoundVersion::Unversioned => continue,
                BoundVersion::Version(version) => {
                    assignment.container.dependencies_at_version(version)?
                }
                BoundVersion::Revision(revision) => {
                    assignment.container.dependencies_at_revision(revision)?
                }
            };
            match induced.merging_constraints(&contributed) {
                Some(merged) => induced = merged,
                None => {
                    debug_assert!(
                        false,
                        "assignment for {id} induced an unsatisfiable constraint set"
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some(induced))
    }

    /// Whether every entry satisfies the constraints induced by the whole
    /// set, and every package those constraints mention is bound to
    /// something other than `Excluded`.
    pub fn check_valid_and_complete(&self) -> std::result::Result<bool, ProviderError> {
        let induced = match self.induced_constraints()? {
            Some(induced) => induced,
            None => return Ok(false),
        };
        for (id, assignment) in &self.assignments {
            if !assignment.binding.satisfies(&induced.requirement_for(id)) {
                return Ok(false);
            }
        }
        for (id, _) in induced.iter() {
            match self.binding(id) {
                Some(BoundVersion::Excluded) | None => return Ok(false),
                Some(_) => {}
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for AssignmentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (id, assignment) in &self.assignments {
            map.entry(&id.to_string(), &assignment.binding.to_string());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_semver::{Version, VersionSetSpecifier};

    use crate::package::Requirement;
    use crate::solver::tests::{pkg, MockContainer};

    fn ver(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn range(lower: &str, upper: &str) -> VersionSetSpecifier {
        VersionSetSpecifier::range(ver(lower), ver(upper))
    }

    #[test]
    fn test_iteration_preserves_insertion_order() {
        let mut set = AssignmentSet::new();
        set.bind(
            Arc::new(MockContainer::new(pkg("b")).version("1.0.0", vec![])),
            BoundVersion::Version(ver("1.0.0")),
        );
        set.bind(
            Arc::new(MockContainer::new(pkg("a")).version("2.0.0", vec![])),
            BoundVersion::Version(ver("2.0.0")),
        );

        let names: Vec<&str> = set.iter().map(|(id, _, _)| id.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_merging_requires_agreement() {
        let container = Arc::new(MockContainer::new(pkg("a")).version("1.0.0", vec![]));

        let mut left = AssignmentSet::new();
        left.bind(container.clone(), BoundVersion::Version(ver("1.0.0")));

        let mut agreeing = AssignmentSet::new();
        agreeing.bind(container.clone(), BoundVersion::Version(ver("1.0.0")));
        assert!(left.merging(&agreeing).is_some());

        let mut disagreeing = AssignmentSet::new();
        disagreeing.bind(container, BoundVersion::Version(ver("1.1.0")));
        assert!(left.merging(&disagreeing).is_none());
    }

    #[test]
    fn test_induced_constraints() {
        let dep = crate::package::Constraint::versioned(pkg("b"), range("1.0.0", "2.0.0"));
        let container =
            Arc::new(MockContainer::new(pkg("a")).version("1.0.0", vec![dep.clone()]));

        let mut set = AssignmentSet::new();
        set.bind(container, BoundVersion::Version(ver("1.0.0")));

        let induced = set.induced_constraints().unwrap().unwrap();
        assert_eq!(
            induced.requirement_for(&pkg("b")),
            Requirement::VersionSet(range("1.0.0", "2.0.0"))
        );
        // Excluded and unversioned entries contribute nothing.
        let mut with_extras = set.clone();
        with_extras.bind(
            Arc::new(MockContainer::new(pkg("c")).version("1.0.0", vec![dep])),
            BoundVersion::Excluded,
        );
        assert_eq!(
            with_extras.induced_constraints().unwrap().unwrap(),
            induced
        );
    }

    #[test]
    fn test_validity_and_completeness() {
        let dep = crate::package::Constraint::versioned(pkg("b"), range("1.0.0", "2.0.0"));
        let a = Arc::new(MockContainer::new(pkg("a")).version("1.0.0", vec![dep]));
        let b = Arc::new(MockContainer::new(pkg("b")).version("1.5.0", vec![]));

        // Missing entry for b: incomplete.
        let mut partial = AssignmentSet::new();
        partial.bind(a.clone(), BoundVersion::Version(ver("1.0.0")));
        assert!(!partial.check_valid_and_complete().unwrap());

        // Valid binding for b completes the set.
        let mut complete = partial.clone();
        complete.bind(b.clone(), BoundVersion::Version(ver("1.5.0")));
        assert!(complete.check_valid_and_complete().unwrap());

        // A binding outside the induced range is invalid.
        let mut invalid = partial.clone();
        invalid.bind(
            Arc::new(MockContainer::new(pkg("b")).version("2.5.0", vec![])),
            BoundVersion::Version(ver("2.5.0")),
        );
        assert!(!invalid.check_valid_and_complete().unwrap());

        // An excluded entry under an active requirement is both invalid and
        // incomplete; excluding an unrequested package is fine.
        let mut excluded = partial.clone();
        excluded.bind(b, BoundVersion::Excluded);
        assert!(!excluded.check_valid_and_complete().unwrap());

        let mut stray = AssignmentSet::new();
        stray.bind(
            Arc::new(MockContainer::new(pkg("c")).version("1.0.0", vec![])),
            BoundVersion::Excluded,
        );
        assert!(stray.check_valid_and_complete().unwrap());
    }

    #[test]
    fn test_unversioned_entries_are_always_valid() {
        let container = Arc::new(MockContainer::new(pkg("a")).version("1.0.0", vec![]));
        let mut set = AssignmentSet::new();
        set.bind(container, BoundVersion::Unversioned);
        assert!(set.check_valid_and_complete().unwrap());
    }
}
