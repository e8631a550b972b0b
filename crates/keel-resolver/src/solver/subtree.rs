//! The search core: subtree resolution and the merging fold.
//!
//! `resolve_subtree` turns one container plus an active constraint set into
//! a lazy sequence of assignments rooted at that container; `merge` folds a
//! dependency list into the cross product of such sequences. Nothing here
//! returns errors directly: failures inside the lazy pipeline are written to
//! the shared [`ErrorLatch`] and the sequences simply end.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::iter;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use keel_semver::{Version, VersionSetSpecifier};

use crate::cache::ContainerCache;
use crate::container::Container;
use crate::error::{ProviderError, ResolverError};
use crate::package::{BoundVersion, Constraint, PackageId, Requirement};
use crate::solver::assignment::AssignmentSet;
use crate::solver::constraint_set::ConstraintSet;
use crate::solver::sequence::CachedSequence;

/// Versions that must not be selected, per package.
pub(crate) type Exclusions = HashMap<PackageId, HashSet<Version>>;

pub(crate) type AssignmentIter = Box<dyn Iterator<Item = AssignmentSet>>;
pub(crate) type PairIter = Box<dyn Iterator<Item = (AssignmentSet, ConstraintSet)>>;

/// First-error-wins latch shared between the search thread and `cancel()`.
///
/// The latch is the sole channel by which failures leave lazy contexts: a
/// step that fails records here and yields an empty sequence, and every
/// subsequent step observes the latch and ends as well.
#[derive(Default)]
pub(crate) struct ErrorLatch {
    slot: Mutex<Option<ResolverError>>,
}

impl ErrorLatch {
    pub fn record(&self, error: ResolverError) {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_none() {
            log::debug!("latched resolver error: {error}");
            *slot = Some(error);
        }
    }

    pub fn get(&self) -> Option<ResolverError> {
        self.slot.lock().unwrap().clone()
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

/// Shared state of one `resolve` invocation.
pub(crate) struct SolveContext {
    pub cache: Arc<ContainerCache>,
    pub latch: Arc<ErrorLatch>,
    /// In incomplete mode no new containers are fetched: dependencies whose
    /// container is not already cached are dropped from the search.
    pub incomplete: bool,
    pub prefetch: bool,
    memo: RefCell<HashMap<(PackageId, ConstraintSet), CachedSequence<AssignmentSet>>>,
}

impl SolveContext {
    pub fn new(
        cache: Arc<ContainerCache>,
        latch: Arc<ErrorLatch>,
        incomplete: bool,
        prefetch: bool,
    ) -> Rc<SolveContext> {
        Rc::new(SolveContext {
            cache,
            latch,
            incomplete,
            prefetch,
            memo: RefCell::new(HashMap::new()),
        })
    }

    /// Drop every memoized sequence. The generators capture an `Rc` of this
    /// context, so the facade drains the memo when a resolution ends to
    /// break the reference cycle.
    pub fn drain_memo(&self) {
        self.memo.borrow_mut().clear();
    }
}

fn no_assignments() -> AssignmentIter {
    Box::new(iter::empty())
}

/// The lazy sequence of valid assignments rooted at `container` under
/// `constraints`.
///
/// Results are memoized per (package, constraint set) whenever no exclusions
/// are active; memoized sequences replay without re-entering the search.
pub(crate) fn resolve_subtree(
    ctx: &Rc<SolveContext>,
    container: Arc<dyn Container>,
    constraints: &ConstraintSet,
    exclusions: &Rc<Exclusions>,
) -> AssignmentIter {
    if ctx.latch.is_set() {
        return no_assignments();
    }

    let memoizable = exclusions.is_empty();
    let key = (container.package_id().clone(), constraints.clone());
    if memoizable {
        if let Some(sequence) = ctx.memo.borrow().get(&key) {
            return Box::new(sequence.replay());
        }
    }

    let body = subtree_candidates(ctx, container, constraints, exclusions);
    if memoizable {
        let sequence = CachedSequence::new(body);
        ctx.memo.borrow_mut().insert(key, sequence.clone());
        Box::new(sequence.replay())
    } else {
        body
    }
}

/// Dispatch on the active requirement for the container's package.
fn subtree_candidates(
    ctx: &Rc<SolveContext>,
    container: Arc<dyn Container>,
    constraints: &ConstraintSet,
    exclusions: &Rc<Exclusions>,
) -> AssignmentIter {
    let id = container.package_id().clone();
    match constraints.requirement_for(&id) {
        Requirement::Unversioned => {
            let dependencies = match container.unversioned_dependencies() {
                Ok(dependencies) => dependencies,
                Err(error) => {
                    ctx.latch.record(error.into());
                    return no_assignments();
                }
            };
            if names_itself(&dependencies, &id) {
                ctx.latch.record(ResolverError::Cycle { package: id });
                return no_assignments();
            }
            bind_and_merge(
                ctx,
                container,
                dependencies,
                BoundVersion::Unversioned,
                constraints,
                exclusions,
            )
        }

        Requirement::Revision(revision) => {
            let dependencies = match container.dependencies_at_revision(&revision) {
                Ok(dependencies) => dependencies,
                Err(error) => {
                    ctx.latch.record(error.into());
                    return no_assignments();
                }
            };
            if names_itself(&dependencies, &id) {
                ctx.latch.record(ResolverError::Cycle { package: id });
                return no_assignments();
            }
            // A revision checkout may not reach into anyone's working copy.
            if let Some(local) = dependencies
                .iter()
                .find(|d| matches!(d.requirement, Requirement::Unversioned))
            {
                ctx.latch
                    .record(ResolverError::RevisionDependencyContainsLocalPackage {
                        package: id,
                        revision: revision.clone(),
                        dependency: local.id.clone(),
                    });
                return no_assignments();
            }
            bind_and_merge(
                ctx,
                container,
                dependencies,
                BoundVersion::Revision(revision),
                constraints,
                exclusions,
            )
        }

        Requirement::VersionSet(set) => {
            let versions = match valid_versions(container.as_ref(), &set, exclusions) {
                Ok(versions) => versions,
                Err(error) => {
                    ctx.latch.record(error.into());
                    return no_assignments();
                }
            };
            let ctx = Rc::clone(ctx);
            let constraints = constraints.clone();
            let exclusions = Rc::clone(exclusions);
            Box::new(
                versions
                    .into_iter()
                    .flat_map(move |version| -> AssignmentIter {
                        if ctx.latch.is_set() {
                            return no_assignments();
                        }
                        let dependencies = match container.dependencies_at_version(&version) {
                            Ok(dependencies) => dependencies,
                            Err(error) => {
                                ctx.latch.record(error.into());
                                return no_assignments();
                            }
                        };
                        if names_itself(&dependencies, container.package_id()) {
                            ctx.latch.record(ResolverError::Cycle {
                                package: container.package_id().clone(),
                            });
                            return no_assignments();
                        }
                        let dependencies: Vec<Constraint> = if ctx.incomplete {
                            dependencies
                                .into_iter()
                                .filter(|d| ctx.cache.contains(&d.id))
                                .collect()
                        } else {
                            dependencies
                        };
                        // A versioned package may not depend on revisions or
                        // working copies.
                        let incompatible: Vec<Constraint> = dependencies
                            .iter()
                            .filter(|d| !matches!(d.requirement, Requirement::VersionSet(_)))
                            .cloned()
                            .collect();
                        if !incompatible.is_empty() {
                            ctx.latch.record(ResolverError::IncompatibleConstraints {
                                package: container.package_id().clone(),
                                dependencies: incompatible,
                            });
                            return no_assignments();
                        }
                        bind_and_merge(
                            &ctx,
                            Arc::clone(&container),
                            dependencies,
                            BoundVersion::Version(version),
                            &constraints,
                            &exclusions,
                        )
                    }),
            )
        }
    }
}

/// Candidate versions for `container`: members of `set`, not excluded, and
/// tools-compatible, preserving the provider's latest-first order.
fn valid_versions(
    container: &dyn Container,
    set: &VersionSetSpecifier,
    exclusions: &Exclusions,
) -> std::result::Result<Vec<Version>, ProviderError> {
    let excluded = exclusions.get(container.package_id());
    let all = container.versions()?;

    let mut previous: Option<&Version> = None;
    let mut valid = Vec::new();
    for version in &all {
        if let Some(previous) = previous {
            debug_assert!(
                previous > version,
                "container versions are not strictly decreasing"
            );
        }
        previous = Some(version);

        if !set.contains(version) {
            continue;
        }
        if excluded.is_some_and(|versions| versions.contains(version)) {
            continue;
        }
        if !container.is_tools_compatible(version) {
            continue;
        }
        valid.push(version.clone());
    }
    Ok(valid)
}

fn names_itself(dependencies: &[Constraint], id: &PackageId) -> bool {
    dependencies.iter().any(|d| d.id == *id)
}

/// Seed an assignment binding `container` to `binding` and merge its
/// dependencies into it.
fn bind_and_merge(
    ctx: &Rc<SolveContext>,
    container: Arc<dyn Container>,
    dependencies: Vec<Constraint>,
    binding: BoundVersion,
    constraints: &ConstraintSet,
    exclusions: &Rc<Exclusions>,
) -> AssignmentIter {
    let mut assignment = AssignmentSet::new();
    assignment.bind(container, binding);
    Box::new(
        merge(ctx, dependencies, assignment, constraints.clone(), exclusions)
            .map(|(assignment, _)| assignment),
    )
}

/// Fold `dependencies` into every assignment of the incoming sequence.
///
/// The fold itself is eager (it constructs the generator pipeline and
/// obtains each container up front); the per-dependency composition is lazy,
/// so no subtree is materialized until pulled. Products come out in
/// lexicographic order over (dependency order × latest-first), which is what
/// gives the maximality guarantee.
pub(crate) fn merge(
    ctx: &Rc<SolveContext>,
    dependencies: Vec<Constraint>,
    assignment: AssignmentSet,
    constraints: ConstraintSet,
    exclusions: &Rc<Exclusions>,
) -> PairIter {
    // Every sibling constraint joins the active set before any descent.
    let all_constraints = match constraints.merging_constraints(&dependencies) {
        Some(merged) => merged,
        None => return Box::new(iter::empty()),
    };

    // Overlap container fetching with the search. Never in incomplete mode:
    // it must not clone anything new.
    if ctx.prefetch && !ctx.incomplete {
        let ids: Vec<PackageId> = dependencies.iter().map(|d| d.id.clone()).collect();
        ctx.cache.prefetch(&ids);
    }

    let mut sequence: PairIter = Box::new(iter::once((assignment, all_constraints)));
    for dependency in dependencies {
        if ctx.latch.is_set() {
            return Box::new(iter::empty());
        }
        if ctx.incomplete && !ctx.cache.contains(&dependency.id) {
            continue;
        }
        let container = match ctx.cache.get(&dependency.id) {
            Ok(container) => container,
            Err(error) => {
                ctx.latch.record(error.into());
                return Box::new(iter::empty());
            }
        };

        let fold_ctx = Rc::clone(ctx);
        let fold_exclusions = Rc::clone(exclusions);
        sequence = Box::new(sequence.flat_map(move |(assignment, constraints)| -> PairIter {
            if fold_ctx.latch.is_set() {
                return Box::new(iter::empty());
            }
            let subtree = resolve_subtree(
                &fold_ctx,
                Arc::clone(&container),
                &constraints,
                &fold_exclusions,
            );
            let latch_ctx = Rc::clone(&fold_ctx);
            Box::new(subtree.filter_map(move |candidate| {
                // The merged solution must agree with the subtree on every
                // shared package, and the subtree's induced constraints must
                // still fit the working set.
                let merged_assignment = assignment.merging(&candidate)?;
                let induced = match candidate.induced_constraints() {
                    Ok(Some(induced)) => induced,
                    Ok(None) => return None,
                    Err(error) => {
                        latch_ctx.latch.record(error.into());
                        return None;
                    }
                };
                let merged_constraints = constraints.merging_set(&induced)?;
                Some((merged_assignment, merged_constraints))
            }))
        }));
    }
    sequence
}
