//! Backtracking package dependency resolver.
//!
//! Given a set of input constraints and a [`ContainerProvider`] that can
//! enumerate the versions of a package and report the constraints each
//! version declares, the resolver binds every transitively referenced
//! package to one concrete version, revision, or unversioned checkout. The
//! search is depth-first and lazy: sibling constraints merge into the active
//! set before any descent, candidate versions are tried latest-first, and
//! the first complete assignment found is the answer (which makes it the
//! maximal one). When no assignment exists the resolver minimizes the
//! failing inputs with a delta-debugging pass before reporting them.

pub mod cache;
pub mod container;
pub mod error;
pub mod package;
pub mod solver;

pub use cache::ContainerCache;
pub use container::{Container, ContainerProvider, ResolverDelegate};
pub use error::{ProviderError, ResolverError, Result};
pub use package::{BoundVersion, Constraint, PackageId, Requirement};
pub use solver::{AssignmentSet, ConstraintSet, DependencyResolver, Resolution};
