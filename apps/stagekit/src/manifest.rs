//! # Manifest Loader
//!
//! Reads `stagekit.toml` from the workspace root and, recursively, from every
//! directory listed in `build-projects`, producing the [`ProjectModel`] and
//! [`TypeRegistry`] the core plans against.
//!
//! ```toml
//! build-projects = ["d"]
//! requirements = ["<hardcode-dll-paths>true"]
//!
//! [constants]
//! DIST = "dist"
//!
//! [[target]]
//! rule = "lib"
//! name = "a"
//! sources = ["a.cpp"]
//!
//! [[stage]]
//! name = "dist"
//! sources = ["a", "a.h"]
//! requirements = ["<location>$(DIST)"]
//! ```

use serde::Deserialize;
use stagekit_core::location::normalize;
use stagekit_core::{
    AliasDecl, MainTargetDecl, ProjectDecl, ProjectModel, Property, SourceLocator, StageDecl,
    StageError, TypeRegistry,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of a project manifest.
pub const MANIFEST_FILE: &str = "stagekit.toml";

// =============================================================================
// MANIFEST SCHEMA
// =============================================================================

/// One `stagekit.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub build_projects: Vec<PathBuf>,
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Path constants, relative to this project.
    #[serde(default)]
    pub constants: BTreeMap<String, String>,
    #[serde(default, rename = "type")]
    pub types: Vec<TypeEntry>,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageEntry>,
    #[serde(default, rename = "alias")]
    pub aliases: Vec<AliasEntry>,
}

/// `[[type]]`: a user type deriving from a registered one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TypeEntry {
    pub name: String,
    pub base: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub suffix: Vec<SuffixEntry>,
}

/// Conditional generated suffix of a `[[type]]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SuffixEntry {
    #[serde(default)]
    pub condition: Vec<String>,
    pub value: String,
}

/// `[[target]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TargetEntry {
    pub rule: String,
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// `[[stage]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StageEntry {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// `[[alias]]`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AliasEntry {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl Manifest {
    /// Parse manifest text; `origin` only labels errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, StageError> {
        toml::from_str(text)
            .map_err(|e| StageError::Manifest(format!("{}: {}", origin.display(), e)))
    }

    /// Read the manifest of a project directory.
    pub fn read(dir: &Path) -> Result<Self, StageError> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| StageError::Io(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text, &path)
    }
}

// =============================================================================
// WORKSPACE
// =============================================================================

/// Everything the core needs to plan a build.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub model: ProjectModel,
    pub types: TypeRegistry,
}

impl Workspace {
    /// Load the root manifest and every build project below it.
    pub fn load(root: &Path) -> Result<Self, StageError> {
        let root = normalize(root);
        let mut workspace = Self {
            model: ProjectModel::new(&root),
            types: TypeRegistry::new(),
        };

        let mut seen = BTreeSet::new();
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            if !seen.insert(dir.clone()) {
                continue;
            }
            let manifest = Manifest::read(&dir)?;
            let project = workspace.apply(&dir, manifest)?;
            pending.extend(project.build_projects.iter().rev().cloned());
            debug!(
                project = %dir.display(),
                targets = project.targets.len(),
                stages = project.stages.len(),
                "manifest loaded"
            );
            workspace.model.add_project(project);
        }
        Ok(workspace)
    }

    /// Fold one manifest into the workspace, returning its project.
    pub fn apply(&mut self, dir: &Path, manifest: Manifest) -> Result<ProjectDecl, StageError> {
        for (name, value) in &manifest.constants {
            self.model.constants.define(name, dir, value);
        }

        for entry in &manifest.types {
            let extensions: Vec<&str> = entry.extensions.iter().map(String::as_str).collect();
            self.types
                .register(&entry.name, entry.base.as_deref(), &extensions)?;
            for suffix in &entry.suffix {
                let condition = suffix
                    .condition
                    .iter()
                    .map(|raw| Property::parse(raw))
                    .collect::<Result<Vec<_>, _>>()?;
                self.types
                    .set_generated_suffix(&entry.name, condition, &suffix.value)?;
            }
        }

        Ok(ProjectDecl {
            dir: dir.to_path_buf(),
            requirements: manifest.requirements,
            build_projects: manifest
                .build_projects
                .iter()
                .map(|p| normalize(&dir.join(p)))
                .collect(),
            targets: manifest
                .targets
                .into_iter()
                .map(|t| MainTargetDecl {
                    rule: t.rule,
                    name: t.name,
                    sources: t.sources,
                    requirements: t.requirements,
                })
                .collect(),
            stages: manifest
                .stages
                .into_iter()
                .map(|s| StageDecl {
                    name: s.name,
                    sources: s.sources,
                    requirements: s.requirements,
                })
                .collect(),
            aliases: manifest
                .aliases
                .into_iter()
                .map(|a| AliasDecl {
                    name: a.name,
                    sources: a.sources,
                    requirements: a.requirements,
                })
                .collect(),
        })
    }
}

/// Source existence backed by the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLocator;

impl SourceLocator for FsLocator {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

// =============================================================================
// TESTS
// =============================================================================
