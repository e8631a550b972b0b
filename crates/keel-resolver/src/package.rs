//! Package identities, requirements, and bindings.

use std::fmt;

use serde::{Deserialize, Serialize};

use keel_semver::{Version, VersionSetSpecifier};

/// Stable identity of a package: its name plus the location it is fetched
/// from. Two packages with the same name at different locations are
/// different packages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub location: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> PackageId {
        PackageId {
            name: name.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// What a constraint demands of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requirement {
    /// Any version in the given set.
    VersionSet(VersionSetSpecifier),
    /// One specific revision (commit hash, branch name).
    Revision(String),
    /// The local working copy, used directly.
    Unversioned,
}

impl Requirement {
    /// The unconstrained requirement, implied for unmentioned packages.
    pub fn any() -> Requirement {
        Requirement::VersionSet(VersionSetSpecifier::Any)
    }

    /// Whether this requirement accepts every version.
    pub fn is_any(&self) -> bool {
        matches!(self, Requirement::VersionSet(VersionSetSpecifier::Any))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::VersionSet(set) => write!(f, "{set}"),
            Requirement::Revision(revision) => write!(f, "revision {revision}"),
            Requirement::Unversioned => f.write_str("unversioned"),
        }
    }
}

/// A single input or declared dependency: a package and the requirement
/// placed on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub id: PackageId,
    pub requirement: Requirement,
}

impl Constraint {
    pub fn new(id: PackageId, requirement: Requirement) -> Constraint {
        Constraint { id, requirement }
    }

    /// Constrain `id` to the versions in `set`.
    pub fn versioned(id: PackageId, set: VersionSetSpecifier) -> Constraint {
        Constraint::new(id, Requirement::VersionSet(set))
    }

    /// Pin `id` to one revision.
    pub fn revision(id: PackageId, revision: impl Into<String>) -> Constraint {
        Constraint::new(id, Requirement::Revision(revision.into()))
    }

    /// Use the working copy of `id` directly.
    pub fn unversioned(id: PackageId) -> Constraint {
        Constraint::new(id, Requirement::Unversioned)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.requirement)
    }
}

/// The concrete outcome for one package in an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundVersion {
    /// The package is not included in the assignment.
    Excluded,
    /// The package is pinned to this version.
    Version(Version),
    /// The package is pinned to this revision.
    Revision(String),
    /// The local working copy is used.
    Unversioned,
}

impl BoundVersion {
    /// Whether this binding is acceptable under `requirement`.
    ///
    /// Unversioned checkouts satisfy anything; an exclusion is acceptable
    /// only when nothing asked for the package; a version must be a member
    /// of the required set; a revision must match the required revision or
    /// face no requirement at all.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        match (self, requirement) {
            (BoundVersion::Unversioned, _) => true,
            (BoundVersion::Excluded, requirement) => requirement.is_any(),
            (BoundVersion::Version(version), Requirement::VersionSet(set)) => set.contains(version),
            (BoundVersion::Version(_), _) => false,
            (BoundVersion::Revision(revision), Requirement::Revision(required)) => {
                revision == required
            }
            (BoundVersion::Revision(_), requirement) => requirement.is_any(),
        }
    }
}

impl fmt::Display for BoundVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundVersion::Excluded => f.write_str("excluded"),
            BoundVersion::Version(version) => write!(f, "{version}"),
            BoundVersion::Revision(revision) => write!(f, "revision {revision}"),
            BoundVersion::Unversioned => f.write_str("unversioned"),
        }
    }
}
