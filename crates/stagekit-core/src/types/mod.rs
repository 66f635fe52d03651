//! # Core Type Definitions
//!
//! This module contains the shared types of the staging engine:
//! - Graph identifiers (`TargetId`, `ActionId`)
//! - Edge classification (`EdgeKind`)
//! - The artifact a target produced when it was built (`Artifact`)
//! - Error types (`StageError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and are assigned in declaration order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable identifier of a target inside one build graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Identifier of a copy action inside one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

// =============================================================================
// EDGES
// =============================================================================

/// Classification of a dependency edge.
///
/// `UsageOnly` edges come from `<use>` and only propagate usage requirements
/// (include paths and the like). Staging never follows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// A real build dependency: the dependent consumes the dependency's output.
    Dependency,
    /// A usage-requirement-only link.
    UsageOnly,
}

impl EdgeKind {
    /// Whether staging traversal may follow this edge.
    #[must_use]
    pub const fn is_traversable(self) -> bool {
        matches!(self, Self::Dependency)
    }
}

// =============================================================================
// ARTIFACT
// =============================================================================

/// The output a target produced when it was built.
///
/// Fixed once the target exists; staging reads it and never recomputes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path of the generated (or source) file.
    pub output: PathBuf,
    /// File name without suffix.
    pub stem: String,
    /// Suffix assigned at build time, without the leading dot.
    pub suffix: Option<String>,
}

impl Artifact {
    /// Create an artifact from its parts. An empty suffix means "no suffix".
    #[must_use]
    pub fn new(output: impl Into<PathBuf>, stem: impl Into<String>, suffix: Option<String>) -> Self {
        Self {
            output: output.into(),
            stem: stem.into(),
            suffix: suffix.filter(|s| !s.is_empty()),
        }
    }

    /// Describe an existing file: stem and suffix come from its own name.
    #[must_use]
    pub fn for_file(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned());
        Self::new(path, stem, suffix)
    }

    /// The file name this artifact is staged under.
    #[must_use]
    pub fn file_name(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}.{}", self.stem, suffix),
            None => self.stem.clone(),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while building the graph, planning or staging.
///
/// - No silent failures
/// - Use `Result<T, StageError>` for fallible operations
/// - The core never panics; all errors are reported to the invoking build
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
    /// A property string could not be parsed or carries an invalid value.
    #[error("Invalid property '{0}'")]
    InvalidProperty(String),

    /// A single-valued feature was given two different values.
    #[error("Duplicate value for single-valued feature <{feature}>: '{first}' and '{second}'")]
    DuplicateFeature {
        feature: String,
        first: String,
        second: String,
    },

    /// A source reference could not be resolved.
    #[error("'{owner}': cannot resolve source '{source_ref}'")]
    SourceNotFound { owner: String, source_ref: String },

    /// A requested or referenced name is not a stage, alias or target.
    #[error("Unknown target '{0}'")]
    UnknownTarget(String),

    /// A target id does not exist in the graph.
    #[error("Target not found: {0}")]
    TargetNotFound(TargetId),

    /// Two main targets with the same name in one project.
    #[error("Duplicate target name '{name}' in project {project}")]
    DuplicateTarget { name: String, project: String },

    /// A type name is not registered.
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    /// A type was registered twice.
    #[error("Type '{0}' is already registered")]
    DuplicateType(String),

    /// A `$(NAME)` path constant is not defined.
    #[error("Unknown path constant '$({0})'")]
    UnknownConstant(String),

    /// `<traverse-dependencies>on` without any `<include-type>`.
    #[error("Stage '{stage}': <traverse-dependencies>on requires at least one <include-type>")]
    MissingIncludeType { stage: String },

    /// A destination resolved outside the permitted tree.
    #[error("Stage '{stage}': location {path} is outside the project tree")]
    LocationOutsideProject { stage: String, path: String },

    /// Two different sources would be copied to the same destination.
    #[error("Destination {destination} is claimed by both {first} and {second}")]
    DestinationConflict {
        destination: String,
        first: TargetId,
        second: TargetId,
    },

    /// Stages depend on each other in a cycle.
    #[error("Dependency cycle through '{0}'")]
    DependencyCycle(String),

    /// A manifest could not be parsed.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================
