//! Types for representing individual resource assertions.
//!
//! A resource is a single declarative statement about desired system state. Converging a
//! resource is a three-step protocol: [probe](Resource::probe) inspects live state without
//! mutating anything, [diff](Resource::diff) compares it against the desired state and
//! describes the minimal change, and [apply](Resource::apply) performs that change. Running
//! the protocol twice against unmodified backing state yields a non-empty delta at most once.

pub mod file;
pub mod package;

use crate::system::pkg::PackageError;
use crate::system::template::RenderError;
use crate::system::Host;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// The kinds of resources that can be asserted on a machine.
///
/// Two resources with identical attributes are interchangeable; a resource has no identity
/// beyond what it declares. New kinds are added by introducing new variants here; the
/// convergence engine never matches on specific variants.
///
/// # (De)serialization
///
/// As of this writing, I am not aware of a way to prevent [serde_yaml] from using YAML tag
/// notation for enums when using them directly. [Role] overrides this by applying
/// `#[serde(with = "serde_yaml::with::singleton_map_recursive")]` to [Role::resources]. If you
/// use [Resource] directly, you will run into this limitation.
///
/// [Role]: crate::core::Role
/// [Role::resources]: crate::core::Role#structfield.resources
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// A package is installed, by name.
    Package { name: String },

    /// A regular file exists with the desired content, and optionally the desired mode.
    File {
        path: String,

        #[serde(flatten)]
        content: ContentSpec,

        /// Unix permission bits, e.g. `0o600`. When omitted, the file's mode is left alone.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        mode: Option<u32>,
    },

    /// A directory exists.
    Directory { path: String },

    /// A symlink at `path` points at `target`.
    Symlink { path: String, target: String },

    /// Nothing exists at `path`; a file, symlink, or directory tree found there is removed.
    Absent { path: String },
}

/// A file resource's desired-content strategy.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSpec {
    /// The file's full content, compared for equality.
    Content(String),

    /// The file's full content given as lines, joined with `\n` and a trailing newline.
    Lines(Vec<String>),

    /// These lines are present somewhere in the file, in any position, among possibly other
    /// content. The diff is the set of missing lines; applying appends only those, preserving
    /// existing content.
    HasLines(Vec<String>),

    /// The file's full content is the named template, rendered with the role's variables.
    Template(String),
}

/// The live state of the entity a resource asserts over, as observed by a probe.
#[derive(Clone, Debug, PartialEq)]
pub enum ActualState {
    /// Nothing exists at the probed location.
    Missing,

    /// A package's installation status.
    Package { installed: bool },

    /// A regular file and its current content.
    File {
        content: String,
        mode: Option<u32>,
    },

    /// A directory.
    Directory,

    /// A symlink and its current target.
    Symlink { target: PathBuf },
}

/// The gap between actual and desired state, as computed by a diff.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta {
    /// The desired state already holds; there is nothing to apply.
    Unchanged,

    /// Nothing existed at the asserted location; applying will create it.
    Create { change: Change, summary: String },

    /// Something existed but differs from the desired state; applying will modify it.
    Modify { change: Change, summary: String },
}

impl Delta {
    /// Returns whether this delta is empty, i.e. there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        matches!(self, Delta::Unchanged)
    }

    /// A short, human-readable description of what applying this delta changes, if anything.
    pub fn summary(&self) -> Option<&str> {
        match self {
            Delta::Unchanged => None,
            Delta::Create { summary, .. } | Delta::Modify { summary, .. } => Some(summary),
        }
    }

    fn change(&self) -> Option<&Change> {
        match self {
            Delta::Unchanged => None,
            Delta::Create { change, .. } | Delta::Modify { change, .. } => Some(change),
        }
    }
}

/// The concrete mutation a non-empty [Delta] implies.
///
/// A change carries everything `apply` needs; applying never re-derives desired state.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    /// Install a package.
    InstallPackage { name: String },

    /// Write a file's full content, replacing whatever is at `path`. Parent directories are
    /// created by the filesystem capability.
    WriteFile {
        path: String,
        content: String,
        mode: Option<u32>,
    },

    /// Append lines to the end of an existing file, preserving its current content. When `mode`
    /// is set, the file's permission bits are corrected in the same pass.
    AppendLines {
        path: String,
        lines: Vec<String>,
        mode: Option<u32>,
    },

    /// Set a file's permission bits; content is already as desired.
    SetMode { path: String, mode: u32 },

    /// Create a directory, replacing any non-directory entry at `path`.
    CreateDirectory { path: String },

    /// Create or replace a symlink at `path` pointing at `target`.
    LinkTo { path: String, target: String },

    /// Remove whatever exists at `path`.
    Remove { path: String },
}

impl Change {
    fn execute(&self, host: &Host) -> Result<(), ApplyError> {
        match self {
            Change::InstallPackage { name } => package::install(name, host),
            change => file::execute(change, host),
        }
    }
}

impl Resource {
    /// Generates a one-line identifier for this resource, suitable for use as its title in
    /// reports and logs.
    pub fn describe(&self) -> String {
        use Resource::*;
        match self {
            Package { name } => format!("package {name}"),
            File { path, .. } => format!("file {path}"),
            Directory { path } => format!("directory {path}"),
            Symlink { path, target } => format!("symlink {path} -> {target}"),
            Absent { path } => format!("absent {path}"),
        }
    }

    /// Inspects the live state this resource asserts over, without mutating anything.
    pub fn probe(&self, host: &Host) -> Result<ActualState, ProbeError> {
        use Resource::*;
        match self {
            Package { name } => package::probe(name, host),
            File { path, .. } => file::probe_file(path, host),
            Directory { path } | Symlink { path, .. } | Absent { path } => {
                file::probe_entry(path, host)
            }
        }
    }

    /// Compares `actual` against this resource's desired state.
    ///
    /// `vars` is the owning role's variable context, used when a file template must be
    /// rendered to obtain the desired content; rendering is the only fallible part of a diff.
    pub fn diff(
        &self,
        actual: &ActualState,
        vars: &IndexMap<String, String>,
        host: &Host,
    ) -> Result<Delta, DiffError> {
        use Resource::*;
        match self {
            Package { name } => Ok(package::diff(name, actual)),
            File {
                path,
                content,
                mode,
            } => file::diff_file(path, content, *mode, actual, vars, host),
            Directory { path } => Ok(file::diff_directory(path, actual)),
            Symlink { path, target } => Ok(file::diff_symlink(path, target, actual)),
            Absent { path } => Ok(file::diff_absent(path, actual)),
        }
    }

    /// Performs the mutation implied by a non-empty `delta`.
    ///
    /// # Panics
    ///
    /// Panics if `delta` is empty. The convergence engine records an empty delta as
    /// `Unchanged` and never calls `apply`; doing so is clearly a bug in the calling code.
    pub fn apply(&self, delta: &Delta, host: &Host) -> Result<(), ApplyError> {
        let change = delta.change().unwrap_or_else(|| {
            panic!(
                "cannot apply an empty delta to resource \"{}\"",
                self.describe(),
            )
        });
        change.execute(host)
    }
}

/// An error encountered while probing live state. Per-resource and non-fatal: the convergence
/// engine records it and moves on to the next resource.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to inspect '{path}'")]
    Fs {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to query package '{name}'")]
    Package {
        name: String,
        #[source]
        source: PackageError,
    },
}

/// An error encountered while computing a diff. Per-resource and non-fatal.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("failed to render template '{template}'")]
    Render {
        template: String,
        #[source]
        source: RenderError,
    },
}

/// An error encountered while applying a change. Per-resource and non-fatal.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("failed to apply change to '{path}'")]
    Fs {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to install package '{name}'")]
    Package {
        name: String,
        #[source]
        source: PackageError,
    },
}
