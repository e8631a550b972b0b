//! Delta-debugging minimization of unsatisfiable inputs.
//!
//! After a failed resolution the facade hands the raw inputs here; the
//! minimizer searches for the smallest subset of them that still fails,
//! using the classic ddmin recursion over "allow this input" changes. Every
//! trial runs a fresh incomplete-mode resolver over the already-populated
//! container cache, so minimization never clones anything new.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::ContainerCache;
use crate::package::{Constraint, PackageId};
use crate::solver::resolver::{DependencyResolver, Resolution};

/// One element of the failing input the minimizer may keep or drop.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum ResolverChange {
    /// Keep this input dependency.
    AllowPackage(PackageId),
    /// Keep this input pin.
    AllowPin(PackageId),
}

/// How long the minimizer may run before the facade falls back to the
/// untrimmed failure.
const MINIMIZE_BUDGET: Duration = Duration::from_secs(10);

/// Minimize a failing `(dependencies, pins)` pair. Returns the inputs
/// unchanged if they cannot be reproduced as failing or the time budget
/// runs out.
pub(crate) fn debug_unsatisfiable(
    cache: &Arc<ContainerCache>,
    dependencies: &[Constraint],
    pins: &[Constraint],
) -> (Vec<Constraint>, Vec<Constraint>) {
    let changes: BTreeSet<ResolverChange> = dependencies
        .iter()
        .map(|d| ResolverChange::AllowPackage(d.id.clone()))
        .chain(pins.iter().map(|p| ResolverChange::AllowPin(p.id.clone())))
        .collect();

    let cache = Arc::clone(cache);
    let trial_dependencies = dependencies.to_vec();
    let trial_pins = pins.to_vec();
    let mut algorithm = DeltaAlgorithm::new(
        move |kept: &BTreeSet<ResolverChange>| {
            run_trial(&cache, &trial_dependencies, &trial_pins, kept)
        },
        Instant::now() + MINIMIZE_BUDGET,
    );

    match algorithm.run(changes) {
        Ok(kept) => {
            let dependencies = dependencies
                .iter()
                .filter(|d| kept.contains(&ResolverChange::AllowPackage(d.id.clone())))
                .cloned()
                .collect();
            let pins = pins
                .iter()
                .filter(|p| kept.contains(&ResolverChange::AllowPin(p.id.clone())))
                .cloned()
                .collect();
            (dependencies, pins)
        }
        Err(DeadlineExceeded) => {
            log::debug!("input minimization timed out; reporting untrimmed failure");
            (dependencies.to_vec(), pins.to_vec())
        }
    }
}

/// One minimization trial: does this subset of the inputs still fail?
fn run_trial(
    cache: &Arc<ContainerCache>,
    dependencies: &[Constraint],
    pins: &[Constraint],
    kept: &BTreeSet<ResolverChange>,
) -> bool {
    // Allowed dependencies stay; disallowed ones become explicit unversioned
    // constraints so the search cannot pick them back up through versions.
    let mut disallowed: BTreeSet<&PackageId> = BTreeSet::new();
    let mut trial_dependencies = Vec::with_capacity(dependencies.len());
    for dependency in dependencies {
        if kept.contains(&ResolverChange::AllowPackage(dependency.id.clone())) {
            trial_dependencies.push(dependency.clone());
        } else {
            disallowed.insert(&dependency.id);
        }
    }
    for id in &disallowed {
        trial_dependencies.push(Constraint::unversioned((*id).clone()));
    }

    let mut trial_pins = Vec::with_capacity(pins.len());
    for pin in pins {
        if !kept.contains(&ResolverChange::AllowPin(pin.id.clone())) {
            continue;
        }
        // An allowed pin on a package this trial forces out is meaningless.
        if disallowed.contains(&pin.id) {
            return false;
        }
        trial_pins.push(pin.clone());
    }

    let resolver = DependencyResolver::new_incomplete(Arc::clone(cache));
    matches!(
        resolver.resolve(&trial_dependencies, &trial_pins),
        Resolution::Unsatisfiable { .. }
    )
}

pub(crate) struct DeadlineExceeded;

/// The ddmin recursion: find a minimal change set for which the predicate
/// holds, under a wall-clock deadline. Trial outcomes are cached since the
/// recursion revisits subsets.
pub(crate) struct DeltaAlgorithm<C, F> {
    predicate: F,
    deadline: Instant,
    seen: HashMap<BTreeSet<C>, bool>,
}

impl<C, F> DeltaAlgorithm<C, F>
where
    C: Ord + Clone + Hash,
    F: FnMut(&BTreeSet<C>) -> bool,
{
    pub fn new(predicate: F, deadline: Instant) -> DeltaAlgorithm<C, F> {
        DeltaAlgorithm {
            predicate,
            deadline,
            seen: HashMap::new(),
        }
    }

    pub fn run(
        &mut self,
        changes: BTreeSet<C>,
    ) -> std::result::Result<BTreeSet<C>, DeadlineExceeded> {
        // If the whole input does not reproduce the failure there is nothing
        // to minimize.
        if !self.test(&changes)? {
            return Ok(changes);
        }
        self.ddmin(changes, 2)
    }

    fn test(&mut self, changes: &BTreeSet<C>) -> std::result::Result<bool, DeadlineExceeded> {
        if Instant::now() >= self.deadline {
            return Err(DeadlineExceeded);
        }
        if let Some(&outcome) = self.seen.get(changes) {
            return Ok(outcome);
        }
        let outcome = (self.predicate)(changes);
        self.seen.insert(changes.clone(), outcome);
        Ok(outcome)
    }

    fn ddmin(
        &mut self,
        changes: BTreeSet<C>,
        granularity: usize,
    ) -> std::result::Result<BTreeSet<C>, DeadlineExceeded> {
        if changes.len() <= 1 {
            return Ok(changes);
        }

        let subsets = partition(&changes, granularity);

        // Reduce to a failing subset.
        for subset in &subsets {
            if self.test(subset)? {
                return self.ddmin(subset.clone(), 2);
            }
        }

        // Reduce to a failing complement.
        for subset in &subsets {
            let complement: BTreeSet<C> = changes.difference(subset).cloned().collect();
            if complement.is_empty() || complement.len() == changes.len() {
                continue;
            }
            if self.test(&complement)? {
                let granularity = granularity.saturating_sub(1).max(2);
                return self.ddmin(complement, granularity);
            }
        }

        // Increase granularity.
        if granularity < changes.len() {
            let granularity = (granularity * 2).min(changes.len());
            return self.ddmin(changes, granularity);
        }

        Ok(changes)
    }
}

/// Split `changes` into `count` contiguous, roughly equal subsets.
fn partition<C: Ord + Clone>(changes: &BTreeSet<C>, count: usize) -> Vec<BTreeSet<C>> {
    let len = changes.len();
    let count = count.min(len).max(1);
    let per_chunk = len / count;
    let mut remainder = len % count;

    let mut subsets = Vec::with_capacity(count);
    let mut iter = changes.iter();
    for _ in 0..count {
        let mut take = per_chunk;
        if remainder > 0 {
            take += 1;
            remainder -= 1;
        }
        subsets.push(iter.by_ref().take(take).cloned().collect());
    }
    subsets
}
