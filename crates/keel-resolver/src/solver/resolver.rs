//! The resolver facade.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::ContainerCache;
use crate::container::{Container, ContainerProvider, ResolverDelegate};
use crate::error::ResolverError;
use crate::package::{BoundVersion, Constraint, PackageId, Requirement};
use crate::solver::assignment::AssignmentSet;
use crate::solver::constraint_set::ConstraintSet;
use crate::solver::debug::debug_unsatisfiable;
use crate::solver::subtree::{merge, ErrorLatch, Exclusions, SolveContext};

/// Outcome of one resolution.
#[derive(Debug)]
pub enum Resolution {
    /// A complete, valid, maximal assignment, in the order packages were
    /// fixed along the search.
    Success(Vec<(PackageId, BoundVersion)>),
    /// No assignment exists. The carried inputs are the minimal failing
    /// subset when the debugger finished in time, the raw inputs otherwise.
    Unsatisfiable {
        dependencies: Vec<Constraint>,
        pins: Vec<Constraint>,
    },
    /// The search stopped on a structural or environmental failure.
    Error(ResolverError),
}

/// Resolves input constraints to concrete package bindings.
///
/// The search is depth-first and single-threaded; container fetches may
/// overlap with it when prefetching is enabled. One resolver keeps its
/// container cache for its whole lifetime; nothing else persists between
/// `resolve` calls.
pub struct DependencyResolver {
    cache: Arc<ContainerCache>,
    latch: Arc<ErrorLatch>,
    prefetch: bool,
    incomplete: bool,
}

impl DependencyResolver {
    pub fn new(
        provider: Arc<dyn ContainerProvider>,
        delegate: Option<Arc<dyn ResolverDelegate>>,
        prefetch: bool,
        skip_update: bool,
    ) -> DependencyResolver {
        DependencyResolver {
            cache: Arc::new(ContainerCache::new(provider, delegate, skip_update)),
            latch: Arc::new(ErrorLatch::default()),
            prefetch,
            incomplete: false,
        }
    }

    /// A resolver sharing an existing cache that refuses to fetch anything
    /// new. Used for debugger trials and diagnosis passes.
    pub(crate) fn new_incomplete(cache: Arc<ContainerCache>) -> DependencyResolver {
        DependencyResolver {
            cache,
            latch: Arc::new(ErrorLatch::default()),
            prefetch: false,
            incomplete: true,
        }
    }

    /// Resolve `dependencies` under `pins` to concrete bindings.
    pub fn resolve(&self, dependencies: &[Constraint], pins: &[Constraint]) -> Resolution {
        let started = Instant::now();
        if let Some(error) = self.latch.get() {
            return Resolution::Error(error);
        }
        log::debug!(
            "resolving {} constraints under {} pins",
            dependencies.len(),
            pins.len()
        );

        let ctx = SolveContext::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.latch),
            self.incomplete,
            self.prefetch,
        );
        let assignment = solve(&ctx, dependencies, pins);
        // Memoized generators capture the context; drain them to break the
        // reference cycle now that the search is over.
        ctx.drain_memo();

        match assignment {
            Some(assignment) => {
                // Completeness cannot hold in incomplete mode, where uncached
                // dependencies are dropped from the search.
                debug_assert!(
                    self.incomplete
                        || matches!(assignment.check_valid_and_complete(), Ok(true))
                );
                let mut bindings = Vec::with_capacity(assignment.len());
                for (_, container, binding) in assignment.iter() {
                    // Identities are late bound: the checkout decides what
                    // the package calls itself.
                    match container.updated_identifier(binding) {
                        Ok(id) => bindings.push((id, binding.clone())),
                        Err(error) => return Resolution::Error(error.into()),
                    }
                }
                log::info!(
                    "resolved {} packages in {:.3} seconds",
                    bindings.len(),
                    started.elapsed().as_secs_f64()
                );
                Resolution::Success(bindings)
            }
            None => self.explain_failure(dependencies, pins, started),
        }
    }

    /// Thread-safe cancellation: latches an error that every inner search
    /// step observes on its next iteration.
    pub fn cancel(&self) {
        self.latch.record(ResolverError::Cancelled);
    }

    /// Read-only snapshot of every container fetched so far.
    pub fn containers(&self) -> Vec<Arc<dyn Container>> {
        self.cache.containers()
    }

    pub(crate) fn cache(&self) -> &Arc<ContainerCache> {
        &self.cache
    }

    fn explain_failure(
        &self,
        dependencies: &[Constraint],
        pins: &[Constraint],
        started: Instant,
    ) -> Resolution {
        if let Some(error) = self.latch.get() {
            log::debug!(
                "resolution failed in {:.3} seconds: {error}",
                started.elapsed().as_secs_f64()
            );
            return Resolution::Error(error);
        }
        if let Some(missing) = self.missing_versions(dependencies) {
            return Resolution::Error(ResolverError::MissingVersions(missing));
        }
        log::debug!(
            "no assignment exists; searched for {:.3} seconds",
            started.elapsed().as_secs_f64()
        );
        if self.incomplete {
            // Debugger trials report raw; only the outer resolver minimizes.
            return Resolution::Unsatisfiable {
                dependencies: dependencies.to_vec(),
                pins: pins.to_vec(),
            };
        }
        let (dependencies, pins) = debug_unsatisfiable(&self.cache, dependencies, pins);
        Resolution::Unsatisfiable { dependencies, pins }
    }

    /// Input constraints whose containers offer no acceptable version at
    /// all. Best effort: constraints whose container cannot be inspected
    /// (or is uncached in incomplete mode) are passed over.
    fn missing_versions(&self, dependencies: &[Constraint]) -> Option<Vec<Constraint>> {
        let mut missing = Vec::new();
        for constraint in dependencies {
            let Requirement::VersionSet(set) = &constraint.requirement else {
                continue;
            };
            if self.incomplete && !self.cache.contains(&constraint.id) {
                continue;
            }
            let Ok(container) = self.cache.get(&constraint.id) else {
                continue;
            };
            let Ok(versions) = container.versions() else {
                continue;
            };
            let satisfiable = versions
                .iter()
                .any(|v| set.contains(v) && container.is_tools_compatible(v));
            if !satisfiable {
                missing.push(constraint.clone());
            }
        }
        if missing.is_empty() {
            None
        } else {
            Some(missing)
        }
    }
}

/// Run the actual search: seed the constraint set with the pins, fold the
/// input dependencies, and take the first complete assignment.
fn solve(
    ctx: &Rc<SolveContext>,
    dependencies: &[Constraint],
    pins: &[Constraint],
) -> Option<AssignmentSet> {
    let mut constraints = ConstraintSet::new();
    for pin in pins {
        match constraints.merging(pin) {
            Some(merged) => constraints = merged,
            // The first-merged pin wins; a disagreeing later pin is dropped.
            None => log::debug!("ignoring conflicting pin {pin}"),
        }
    }

    merge(
        ctx,
        dependencies.to_vec(),
        AssignmentSet::new(),
        constraints,
        &Rc::new(Exclusions::new()),
    )
    .map(|(assignment, _)| assignment)
    .next()
}
