//! Resolver error taxonomy.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::package::{Constraint, PackageId};

/// Failure inside a container operation or the provider that fetches
/// containers.
///
/// Cloneable so one failed fetch can be replayed to every later lookup of
/// the same package.
#[derive(Debug, Clone, Error)]
#[error("{inner}")]
pub struct ProviderError {
    #[source]
    inner: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl ProviderError {
    /// Wrap an arbitrary error raised by a provider implementation.
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> ProviderError {
        ProviderError {
            inner: Arc::new(error),
        }
    }

    /// A provider error carrying only a message.
    pub fn msg(message: impl fmt::Display) -> ProviderError {
        ProviderError {
            inner: Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(
                message.to_string(),
            )),
        }
    }
}

/// Errors surfaced by [`Resolution::Error`](crate::Resolution::Error).
///
/// Cloneable because failures inside lazy iterator contexts are written to a
/// shared latch instead of being threaded through the generator pipeline.
#[derive(Debug, Clone, Error)]
pub enum ResolverError {
    /// A container's dependency list names the container itself.
    #[error("the package {package} depends on itself")]
    Cycle { package: PackageId },

    /// A versioned package declared dependencies on revisioned or
    /// unversioned packages.
    #[error("the package {package} has incompatible dependencies: {}", join_constraints(.dependencies))]
    IncompatibleConstraints {
        package: PackageId,
        dependencies: Vec<Constraint>,
    },

    /// A revision-bound package transitively requires an unversioned
    /// package.
    #[error("the package {package} at revision {revision} depends on local package {dependency}")]
    RevisionDependencyContainsLocalPackage {
        package: PackageId,
        revision: String,
        dependency: PackageId,
    },

    /// Constraints whose containers have no acceptable versions at all.
    #[error("no available version matches: {}", join_constraints(.0))]
    MissingVersions(Vec<Constraint>),

    /// `cancel()` was observed.
    #[error("dependency resolution was cancelled")]
    Cancelled,

    /// A container operation failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

fn join_constraints(constraints: &[Constraint]) -> String {
    constraints
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ResolverError>;
