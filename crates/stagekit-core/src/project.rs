//! # Project Model
//!
//! Declarations of main targets, stages and aliases, grouped by project
//! directory, and the [`GraphBuilder`] that turns them into a
//! [`TargetGraph`] of built targets.
//!
//! A main target's build properties are the build request refined by the
//! requirements of every enclosing project (root first) and then by the
//! target's own requirements. Its type, suffix and output path are fixed
//! from those properties here and never change afterwards.
//!
//! Which targets exist, and their ids, depend only on the declarations, so
//! graphs built for different requests agree on ids.

use crate::features;
use crate::graph::TargetGraph;
use crate::location::{PathConstants, normalize};
use crate::primitives::{BUILD_DIR, DEPENDENCY, LIBRARY, USE, VARIANT};
use crate::typesys::TypeRegistry;
use crate::{Artifact, EdgeKind, PropertySet, Requirements, StageError, TargetId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

// =============================================================================
// DECLARATIONS
// =============================================================================

/// `rule name : sources : requirements`, e.g. `exe a : a.cpp l`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainTargetDecl {
    pub rule: String,
    pub name: String,
    pub sources: Vec<String>,
    pub requirements: Vec<String>,
}

/// `stage name : sources : requirements`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDecl {
    pub name: String,
    pub sources: Vec<String>,
    pub requirements: Vec<String>,
}

/// `alias name : sources : requirements`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDecl {
    pub name: String,
    pub sources: Vec<String>,
    pub requirements: Vec<String>,
}

/// Everything one project directory declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDecl {
    pub dir: PathBuf,
    pub requirements: Vec<String>,
    /// Sub-projects built along with this one (absolute directories).
    pub build_projects: Vec<PathBuf>,
    pub targets: Vec<MainTargetDecl>,
    pub stages: Vec<StageDecl>,
    pub aliases: Vec<AliasDecl>,
}

impl ProjectDecl {
    /// Create an empty project.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Find a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageDecl> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Find an alias by name.
    #[must_use]
    pub fn alias(&self, name: &str) -> Option<&AliasDecl> {
        self.aliases.iter().find(|a| a.name == name)
    }

    /// Names must be unique across targets, stages and aliases.
    fn check_unique_names(&self) -> Result<(), StageError> {
        let mut seen = BTreeSet::new();
        let names = self
            .targets
            .iter()
            .map(|t| t.name.as_str())
            .chain(self.stages.iter().map(|s| s.name.as_str()))
            .chain(self.aliases.iter().map(|a| a.name.as_str()));
        for name in names {
            if !seen.insert(name) {
                return Err(StageError::DuplicateTarget {
                    name: name.to_string(),
                    project: self.dir.display().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// All projects of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectModel {
    pub root: PathBuf,
    pub projects: BTreeMap<PathBuf, ProjectDecl>,
    pub constants: PathConstants,
}

impl ProjectModel {
    /// Create a model with an empty root project.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut projects = BTreeMap::new();
        projects.insert(root.clone(), ProjectDecl::new(root.clone()));
        Self {
            root,
            projects,
            constants: PathConstants::new(),
        }
    }

    /// Add or replace a project.
    pub fn add_project(&mut self, project: ProjectDecl) {
        self.projects.insert(project.dir.clone(), project);
    }

    /// Project declared at `dir`.
    #[must_use]
    pub fn project(&self, dir: &Path) -> Option<&ProjectDecl> {
        self.projects.get(dir)
    }

    /// Mutable access to a project.
    pub fn project_mut(&mut self, dir: &Path) -> Option<&mut ProjectDecl> {
        self.projects.get_mut(dir)
    }

    /// Requirements of `dir` and every enclosing project, root first.
    pub fn inherited_requirements(&self, dir: &Path) -> Result<Vec<Requirements>, StageError> {
        let mut chain: Vec<&ProjectDecl> = self
            .projects
            .values()
            .filter(|p| dir.starts_with(&p.dir))
            .collect();
        chain.sort_by_key(|p| p.dir.components().count());
        chain
            .iter()
            .map(|p| Requirements::parse(&p.requirements))
            .collect()
    }

    /// Raw build properties of `dir`: the request refined by inherited
    /// project requirements.
    pub fn project_properties(
        &self,
        dir: &Path,
        request: &PropertySet,
    ) -> Result<PropertySet, StageError> {
        let mut properties = request.clone();
        for requirements in self.inherited_requirements(dir)? {
            properties = refine_with(&properties, &requirements)?;
        }
        Ok(properties)
    }

    /// Projects built when `dir` is built: itself and its `build_projects`,
    /// recursively, each once, in discovery order.
    #[must_use]
    pub fn build_closure(&self, dir: &Path) -> Vec<&ProjectDecl> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(project) = self.projects.get(&current) {
                order.push(project);
                stack.extend(project.build_projects.iter().rev().cloned());
            }
        }
        order
    }
}

/// Refine raw properties by requirements evaluated against their expansion.
pub fn refine_with(
    raw: &PropertySet,
    requirements: &Requirements,
) -> Result<PropertySet, StageError> {
    let active = features::expand(raw)?;
    Ok(raw.refine(&requirements.evaluate(&active)))
}

// =============================================================================
// REFERENCES
// =============================================================================

/// Answers whether a source file exists. The core itself does no I/O.
pub trait SourceLocator {
    /// Whether a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}

impl SourceLocator for BTreeSet<PathBuf> {
    fn exists(&self, path: &Path) -> bool {
        self.contains(path)
    }
}

/// Split `dir//name` into an absolute project directory and a name.
#[must_use]
pub fn split_reference(project: &Path, reference: &str) -> (PathBuf, String) {
    match reference.split_once("//") {
        Some((dir, name)) => (normalize(&project.join(dir)), name.to_string()),
        None => (project.to_path_buf(), reference.to_string()),
    }
}

/// Name a file target is registered under: its normalized relative path.
fn file_target_name(reference: &str) -> String {
    normalize(Path::new(reference)).to_string_lossy().into_owned()
}

/// Resolve a reference written in `project` to a target of the graph.
#[must_use]
pub fn resolve_reference(graph: &TargetGraph, project: &Path, reference: &str) -> Option<TargetId> {
    let (dir, name) = split_reference(project, reference);
    graph
        .find(&dir, &name)
        .or_else(|| graph.find(&dir, &file_target_name(&name)))
}

// =============================================================================
// GRAPH BUILDER
// =============================================================================

/// Builds the target graph for one build request.
pub struct GraphBuilder<'a> {
    pub model: &'a ProjectModel,
    pub types: &'a TypeRegistry,
    pub locator: &'a dyn SourceLocator,
}

impl GraphBuilder<'_> {
    /// Build every main target of every project, then wire edges.
    pub fn build(&self, request: &PropertySet) -> Result<TargetGraph, StageError> {
        let mut graph = TargetGraph::new();

        for project in self.model.projects.values() {
            project.check_unique_names()?;
            let base = self.model.project_properties(&project.dir, request)?;
            for decl in &project.targets {
                self.build_main_target(&mut graph, project, decl, &base)?;
            }
        }

        for project in self.model.projects.values() {
            for decl in &project.targets {
                self.wire_main_target(&mut graph, project, decl)?;
            }
            for stage in &project.stages {
                for source in &stage.sources {
                    self.file_target(&mut graph, &project.dir, source)?;
                }
            }
        }

        debug!(
            targets = graph.len(),
            edges = graph.edge_count(),
            "graph built"
        );
        Ok(graph)
    }

    fn build_main_target(
        &self,
        graph: &mut TargetGraph,
        project: &ProjectDecl,
        decl: &MainTargetDecl,
        base: &PropertySet,
    ) -> Result<TargetId, StageError> {
        let requirements = Requirements::parse(&decl.requirements)?;
        let properties = features::expand(&refine_with(base, &requirements)?)?;
        let target_type = self.types.main_target_type(&decl.rule, &properties)?;
        let suffix = self.types.generated_suffix(&target_type, &properties);
        let variant = properties.get(VARIANT).unwrap_or("debug").to_string();

        let file_name = Artifact::new(PathBuf::new(), decl.name.as_str(), suffix.clone()).file_name();
        let output = project
            .dir
            .join(BUILD_DIR)
            .join(&variant)
            .join(file_name);

        graph.insert(
            &decl.name,
            &project.dir,
            &target_type,
            properties,
            Artifact::new(output, decl.name.as_str(), suffix),
        )
    }

    fn wire_main_target(
        &self,
        graph: &mut TargetGraph,
        project: &ProjectDecl,
        decl: &MainTargetDecl,
    ) -> Result<(), StageError> {
        let owner = graph
            .find(&project.dir, &decl.name)
            .ok_or_else(|| StageError::UnknownTarget(decl.name.clone()))?;
        // conditional edges are resolved against the target's build properties
        let requirements = Requirements::parse(&decl.requirements)?
            .evaluate(&graph.target(owner)?.properties);
        let not_found = |reference: &str| StageError::SourceNotFound {
            owner: decl.name.clone(),
            source_ref: reference.to_string(),
        };

        for source in &decl.sources {
            let dependency = match resolve_reference(graph, &project.dir, source) {
                Some(id) => id,
                None => self
                    .file_target(graph, &project.dir, source)?
                    .ok_or_else(|| not_found(source))?,
            };
            graph.add_edge(owner, dependency, EdgeKind::Dependency)?;
        }

        let edges = [
            (DEPENDENCY, EdgeKind::Dependency),
            (LIBRARY, EdgeKind::Dependency),
            (USE, EdgeKind::UsageOnly),
        ];
        for (feature, kind) in edges {
            for reference in requirements.get_all(feature) {
                let dependency = resolve_reference(graph, &project.dir, reference)
                    .ok_or_else(|| not_found(reference))?;
                graph.add_edge(owner, dependency, kind)?;
            }
        }
        Ok(())
    }

    /// Find or create the target for a source file. `None` if the reference
    /// names neither a target nor an existing file.
    fn file_target(
        &self,
        graph: &mut TargetGraph,
        project: &Path,
        reference: &str,
    ) -> Result<Option<TargetId>, StageError> {
        if let Some(id) = resolve_reference(graph, project, reference) {
            return Ok(Some(id));
        }
        if reference.contains("//") {
            return Ok(None);
        }
        let path = normalize(&project.join(reference));
        if !self.locator.exists(&path) {
            return Ok(None);
        }
        // one file, one target, whichever project names it
        if let Some(id) = graph.find_output(&path) {
            graph.add_name(project, &file_target_name(reference), id)?;
            return Ok(Some(id));
        }
        let file_type = self.types.type_for_file(&path);
        let id = graph.insert(
            &file_target_name(reference),
            project,
            &file_type,
            PropertySet::new(),
            Artifact::for_file(&path),
        )?;
        Ok(Some(id))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Property;

    fn decl(rule: &str, name: &str, sources: &[&str], requirements: &[&str]) -> MainTargetDecl {
        MainTargetDecl {
            rule: rule.to_string(),
            name: name.to_string(),
            sources: sources.iter().map(|s| (*s).to_string()).collect(),
            requirements: requirements.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn files(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    fn windows() -> PropertySet {
        PropertySet::parse(["<target-os>windows"]).expect("parse")
    }

    #[test]
    fn lib_output_uses_build_time_suffix() {
        let mut model = ProjectModel::new("/ws");
        if let Some(root) = model.project_mut(Path::new("/ws")) {
            root.targets.push(decl("lib", "a", &["a.cpp"], &[]));
        }
        let types = TypeRegistry::new();
        let locator = files(&["/ws/a.cpp"]);
        let builder = GraphBuilder {
            model: &model,
            types: &types,
            locator: &locator,
        };

        let graph = builder.build(&windows()).expect("build");
        let a = graph.find(Path::new("/ws"), "a").expect("a");
        let target = graph.target(a).expect("target");
        assert_eq!(target.target_type, "SHARED_LIB");
        assert_eq!(target.artifact.output, PathBuf::from("/ws/bin/debug/a.dll"));

        let cpp = graph.find(Path::new("/ws"), "a.cpp").expect("a.cpp");
        assert_eq!(graph.target(cpp).expect("cpp").target_type, "CPP");
        assert_eq!(
            graph.dependencies(a).expect("deps"),
            vec![(cpp, EdgeKind::Dependency)]
        );
    }

    #[test]
    fn use_and_dependency_edges() {
        let mut model = ProjectModel::new("/ws");
        if let Some(root) = model.project_mut(Path::new("/ws")) {
            root.targets.push(decl("lib", "l2", &[], &[]));
            root.targets.push(decl("lib", "l3", &[], &[]));
            root.targets
                .push(decl("lib", "l", &[], &["<use>l2", "<dependency>l3"]));
        }
        let types = TypeRegistry::new();
        let locator = files(&[]);
        let builder = GraphBuilder {
            model: &model,
            types: &types,
            locator: &locator,
        };
        let graph = builder.build(&windows()).expect("build");
        let l = graph.find(Path::new("/ws"), "l").expect("l");
        let l2 = graph.find(Path::new("/ws"), "l2").expect("l2");
        let l3 = graph.find(Path::new("/ws"), "l3").expect("l3");
        assert_eq!(
            graph.dependencies(l).expect("deps"),
            vec![(l3, EdgeKind::Dependency), (l2, EdgeKind::UsageOnly)]
        );
    }

    #[test]
    fn conditional_library_follows_variant() {
        let mut model = ProjectModel::new("/ws");
        if let Some(root) = model.project_mut(Path::new("/ws")) {
            root.targets.push(decl("lib", "l", &[], &[]));
            root.targets.push(decl("lib", "r", &[], &[]));
            root.targets.push(decl(
                "exe",
                "a",
                &[],
                &["<variant>debug:<library>l", "<variant>release:<use>r"],
            ));
        }
        let types = TypeRegistry::new();
        let locator = files(&[]);
        let builder = GraphBuilder {
            model: &model,
            types: &types,
            locator: &locator,
        };

        let graph = builder.build(&windows()).expect("debug");
        let a = graph.find(Path::new("/ws"), "a").expect("a");
        let l = graph.find(Path::new("/ws"), "l").expect("l");
        assert_eq!(
            graph.dependencies(a).expect("deps"),
            vec![(l, EdgeKind::Dependency)]
        );

        let release = PropertySet::parse(["<variant>release", "<target-os>windows"]).expect("parse");
        let graph = builder.build(&release).expect("release");
        let r = graph.find(Path::new("/ws"), "r").expect("r");
        assert_eq!(
            graph.dependencies(a).expect("deps"),
            vec![(r, EdgeKind::UsageOnly)]
        );
    }

    #[test]
    fn missing_source_file_is_an_error() {
        let mut model = ProjectModel::new("/ws");
        if let Some(root) = model.project_mut(Path::new("/ws")) {
            root.targets.push(decl("exe", "a", &["missing.cpp"], &[]));
        }
        let types = TypeRegistry::new();
        let locator = files(&[]);
        let builder = GraphBuilder {
            model: &model,
            types: &types,
            locator: &locator,
        };
        let result = builder.build(&windows());
        assert_eq!(
            result.err(),
            Some(StageError::SourceNotFound {
                owner: "a".to_string(),
                source_ref: "missing.cpp".to_string(),
            })
        );
    }

    #[test]
    fn target_requirements_beat_request() {
        let mut model = ProjectModel::new("/ws");
        if let Some(root) = model.project_mut(Path::new("/ws")) {
            root.targets
                .push(decl("exe", "a", &[], &["<optimization>off"]));
        }
        let types = TypeRegistry::new();
        let locator = files(&[]);
        let builder = GraphBuilder {
            model: &model,
            types: &types,
            locator: &locator,
        };
        let request = PropertySet::parse(["<variant>release", "<target-os>windows"]).expect("parse");
        let graph = builder.build(&request).expect("build");
        let a = graph.find(Path::new("/ws"), "a").expect("a");
        let target = graph.target(a).expect("target");
        assert!(target.properties.contains(&Property::new("optimization", "off")));
        assert!(target.properties.contains(&Property::new("variant", "release")));
        assert_eq!(target.artifact.output, PathBuf::from("/ws/bin/release/a.exe"));
    }

    #[test]
    fn subproject_inherits_root_requirements() {
        let mut model = ProjectModel::new("/ws");
        if let Some(root) = model.project_mut(Path::new("/ws")) {
            root.requirements.push("<hardcode-dll-paths>true".to_string());
            root.build_projects.push(PathBuf::from("/ws/d"));
        }
        let mut sub = ProjectDecl::new("/ws/d");
        sub.requirements.push("<link>static".to_string());
        model.add_project(sub);

        let properties = model
            .project_properties(Path::new("/ws/d"), &PropertySet::new())
            .expect("properties");
        assert_eq!(properties.get("hardcode-dll-paths"), Some("true"));
        assert_eq!(properties.get("link"), Some("static"));

        let closure: Vec<_> = model
            .build_closure(Path::new("/ws"))
            .iter()
            .map(|p| p.dir.clone())
            .collect();
        assert_eq!(closure, vec![PathBuf::from("/ws"), PathBuf::from("/ws/d")]);
    }

    #[test]
    fn duplicate_names_across_kinds_rejected() {
        let mut model = ProjectModel::new("/ws");
        if let Some(root) = model.project_mut(Path::new("/ws")) {
            root.targets.push(decl("exe", "dist", &[], &[]));
            root.stages.push(StageDecl {
                name: "dist".to_string(),
                ..StageDecl::default()
            });
        }
        let types = TypeRegistry::new();
        let locator = files(&[]);
        let builder = GraphBuilder {
            model: &model,
            types: &types,
            locator: &locator,
        };
        assert!(matches!(
            builder.build(&PropertySet::new()),
            Err(StageError::DuplicateTarget { .. })
        ));
    }

    #[test]
    fn file_named_from_two_projects_is_one_target() {
        let mut model = ProjectModel::new("/ws");
        if let Some(root) = model.project_mut(Path::new("/ws")) {
            root.stages.push(StageDecl {
                name: "x".to_string(),
                sources: vec!["d/f.txt".to_string()],
                requirements: Vec::new(),
            });
        }
        let mut sub = ProjectDecl::new("/ws/d");
        sub.stages.push(StageDecl {
            name: "y".to_string(),
            sources: vec!["f.txt".to_string()],
            requirements: Vec::new(),
        });
        model.add_project(sub);

        let types = TypeRegistry::new();
        let locator = files(&["/ws/d/f.txt"]);
        let builder = GraphBuilder {
            model: &model,
            types: &types,
            locator: &locator,
        };
        let graph = builder.build(&PropertySet::new()).expect("build");
        assert_eq!(graph.len(), 1);
        assert_eq!(
            resolve_reference(&graph, Path::new("/ws"), "d/f.txt"),
            resolve_reference(&graph, Path::new("/ws/d"), "f.txt")
        );
    }

    #[test]
    fn cross_project_reference() {
        assert_eq!(
            split_reference(Path::new("/ws"), "d//a"),
            (PathBuf::from("/ws/d"), "a".to_string())
        );
        assert_eq!(
            split_reference(Path::new("/ws/d"), "a"),
            (PathBuf::from("/ws/d"), "a".to_string())
        );
    }
}
