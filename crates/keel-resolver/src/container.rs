//! Capability traits through which the resolver reaches package sources.
//!
//! The resolver never touches repositories, manifests, or the file system
//! directly; everything it learns about the outside world arrives through
//! [`Container`] handles fetched from a [`ContainerProvider`].

use std::sync::Arc;

use keel_semver::Version;

use crate::error::ProviderError;
use crate::package::{BoundVersion, Constraint, PackageId};

/// One package source: enumerates the versions available for a package and
/// the constraints each version (or revision, or the working copy) declares.
pub trait Container: Send + Sync + std::fmt::Debug {
    /// The identity this container was fetched for.
    fn package_id(&self) -> &PackageId;

    /// All available versions, latest first.
    fn versions(&self) -> std::result::Result<Vec<Version>, ProviderError>;

    /// Whether `version` can be built by the running toolchain. Versions
    /// that cannot are silently skipped during candidate enumeration.
    fn is_tools_compatible(&self, _version: &Version) -> bool {
        true
    }

    /// The constraints declared by `version`.
    fn dependencies_at_version(
        &self,
        version: &Version,
    ) -> std::result::Result<Vec<Constraint>, ProviderError>;

    /// The constraints declared at `revision`.
    fn dependencies_at_revision(
        &self,
        revision: &str,
    ) -> std::result::Result<Vec<Constraint>, ProviderError>;

    /// The constraints declared by the local working copy.
    fn unversioned_dependencies(&self) -> std::result::Result<Vec<Constraint>, ProviderError>;

    /// The identity the package declares for itself once `binding` is
    /// checked out. Identities are late bound: the name in a manifest can
    /// differ from the name the package was requested under.
    fn updated_identifier(
        &self,
        binding: &BoundVersion,
    ) -> std::result::Result<PackageId, ProviderError>;
}

/// Fetches containers on behalf of the resolver.
///
/// Called from the search thread for on-demand fetches and from prefetch
/// worker threads for speculative ones; implementations must tolerate both.
pub trait ContainerProvider: Send + Sync {
    /// Fetch the container for `id`. With `skip_update` set, an existing
    /// local clone is used as-is instead of being refreshed first.
    fn fetch_container(
        &self,
        id: &PackageId,
        skip_update: bool,
    ) -> std::result::Result<Arc<dyn Container>, ProviderError>;
}

/// Observer of container-fetch lifecycle events. Purely informational; a
/// delegate has no influence over the search.
pub trait ResolverDelegate: Send + Sync {
    /// A fetch for `id` is about to start.
    fn will_fetch(&self, _id: &PackageId) {}

    /// A fetch for `id` finished.
    fn did_fetch(&self, _id: &PackageId, _success: bool) {}
}
