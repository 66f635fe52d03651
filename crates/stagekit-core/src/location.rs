//! # Location / Suffix Resolver
//!
//! Computes where a stage puts its copies and under which file name.
//!
//! - Destination: first matching `<location>` conditional, else the plain
//!   `<location>`, else `<project>/<stage-name>`.
//! - `$(NAME)` path constants expand to absolute directories.
//! - Relative locations are anchored at the stage's own project, so
//!   `<location>.` is the project directory itself.
//! - File name: the target's stem and build-time suffix. Staging never
//!   recomputes the suffix.

use crate::graph::Target;
use crate::primitives::LOCATION;
use crate::{PropertySet, Requirements, StageError};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

// =============================================================================
// PATH CONSTANTS
// =============================================================================

/// Named absolute directories usable as `$(NAME)` in locations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathConstants {
    values: BTreeMap<String, PathBuf>,
}

impl PathConstants {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a constant relative to the project declaring it.
    pub fn define(&mut self, name: &str, project: &Path, value: &str) {
        self.values
            .insert(name.to_string(), normalize(&project.join(value)));
    }

    /// Value of a constant.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.values.get(name).map(PathBuf::as_path)
    }

    /// Replace every `$(NAME)` in `raw`.
    pub fn expand(&self, raw: &str) -> Result<String, StageError> {
        let mut expanded = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find("$(") {
            expanded.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find(')')
                .ok_or_else(|| StageError::InvalidProperty(raw.to_string()))?;
            let name = &after[..end];
            let value = self
                .get(name)
                .ok_or_else(|| StageError::UnknownConstant(name.to_string()))?;
            expanded.push_str(&value.to_string_lossy());
            rest = &after[end + 1..];
        }
        expanded.push_str(rest);
        Ok(expanded)
    }

    /// Number of constants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no constant is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// Where stage destinations may point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LocationPolicy {
    /// Any directory, including absolute paths outside the workspace.
    #[default]
    Unrestricted,
    /// Destinations must stay inside the given root.
    WithinRoot(PathBuf),
}

/// Lexically normalize a path: drop `.` and resolve `..` against the
/// preceding component. Does not touch the file system.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if last_is_normal {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Resolves destination directories and staged file names.
#[derive(Debug, Clone, Copy)]
pub struct LocationResolver<'a> {
    pub constants: &'a PathConstants,
    pub policy: &'a LocationPolicy,
}

impl LocationResolver<'_> {
    /// Destination directory of a stage under `active`.
    pub fn destination_dir(
        &self,
        stage: &str,
        project: &Path,
        requirements: &Requirements,
        active: &PropertySet,
    ) -> Result<PathBuf, StageError> {
        let directory = match requirements.resolve(LOCATION, active) {
            Some(raw) => {
                let expanded = self.constants.expand(raw)?;
                let path = Path::new(&expanded);
                if path.is_absolute() {
                    normalize(path)
                } else {
                    normalize(&project.join(path))
                }
            }
            None => normalize(&project.join(stage)),
        };

        if let LocationPolicy::WithinRoot(root) = self.policy {
            if !directory.starts_with(normalize(root)) {
                return Err(StageError::LocationOutsideProject {
                    stage: stage.to_string(),
                    path: directory.display().to_string(),
                });
            }
        }
        Ok(directory)
    }

    /// File name a target is staged under.
    ///
    /// `rename` is the stage's explicit `<name>` override, the only way the
    /// built name can change.
    #[must_use]
    pub fn file_name(target: &Target, rename: Option<&str>) -> String {
        rename
            .map(str::to_string)
            .unwrap_or_else(|| target.artifact.file_name())
    }
}

// =============================================================================
// TESTS
// =============================================================================
