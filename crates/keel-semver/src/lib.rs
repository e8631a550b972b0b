//! Semantic versions and version set algebra for the keel resolver.
//!
//! This crate provides the version values the resolver assigns and the
//! contiguous version sets it intersects while searching. Prereleases sort
//! below their release; version sets are half-open ranges with `any` and
//! `empty` sentinels.

mod set;
mod version;

pub use set::VersionSetSpecifier;
pub use version::{Identifier, Version, VersionError};
