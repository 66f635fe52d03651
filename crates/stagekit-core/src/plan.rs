//! # Build Planner
//!
//! Resolves requested names into a [`BuildPlan`]: every stage reached
//! (directly, through aliases, or as a `<dependency>` of another stage) is
//! staged exactly once per distinct set of build properties, all into one
//! build-wide registry.
//!
//! Alias requirements refine the build request of everything the alias
//! reaches, so targets are rebuilt under the refined request. Each distinct
//! request gets its own [`TargetGraph`]; target ids agree across them.
//!
//! A plan is only returned when resolution succeeded as a whole. Nothing
//! from a failed resolution is ever executed.

use crate::graph::TargetGraph;
use crate::location::{LocationPolicy, LocationResolver};
use crate::primitives::MAX_EXPANSION_DEPTH;
use crate::project::{GraphBuilder, ProjectModel, SourceLocator, StageDecl, resolve_reference, split_reference};
use crate::registry::{CopyAction, VirtualTargetRegistry};
use crate::stage::{AggregateHandle, HandleId, StageSpec, Stager};
use crate::typesys::TypeRegistry;
use crate::{ActionId, Property, PropertySet, Requirements, StageError, TargetId, features};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// =============================================================================
// BUILD
// =============================================================================

/// One build invocation: a request, the graph built for it, and the
/// location policy in force.
pub struct Build<'a> {
    model: &'a ProjectModel,
    types: &'a TypeRegistry,
    locator: &'a dyn SourceLocator,
    request: PropertySet,
    policy: LocationPolicy,
    graph: TargetGraph,
}

impl<'a> Build<'a> {
    /// Build the target graph for `request`.
    pub fn new(
        model: &'a ProjectModel,
        types: &'a TypeRegistry,
        request: PropertySet,
        locator: &'a dyn SourceLocator,
        policy: LocationPolicy,
    ) -> Result<Self, StageError> {
        let graph = GraphBuilder {
            model,
            types,
            locator,
        }
        .build(&request)?;
        Ok(Self {
            model,
            types,
            locator,
            request,
            policy,
            graph,
        })
    }

    /// The target graph.
    #[must_use]
    pub fn graph(&self) -> &TargetGraph {
        &self.graph
    }

    /// The raw build request.
    #[must_use]
    pub fn request(&self) -> &PropertySet {
        &self.request
    }

    /// The request refined by alias `overrides`.
    #[must_use]
    pub fn refined_request(&self, overrides: &PropertySet) -> PropertySet {
        self.request.refine(overrides)
    }

    /// Expanded build properties for stages of `project`.
    pub fn active(&self, project: &Path, overrides: &PropertySet) -> Result<PropertySet, StageError> {
        let raw = self
            .model
            .project_properties(project, &self.refined_request(overrides))?;
        features::expand(&raw)
    }

    /// Plan `names` as requested from `invoking`.
    ///
    /// With no names, every stage, alias and main target of `invoking`
    /// and its build projects is planned.
    pub fn plan<S: AsRef<str>>(&self, names: &[S], invoking: &Path) -> Result<BuildPlan, StageError> {
        if self.model.project(invoking).is_none() {
            return Err(StageError::UnknownTarget(invoking.display().to_string()));
        }
        let mut planner = Planner::new(self);
        let none = PropertySet::new();

        if names.is_empty() {
            for project in self.model.build_closure(invoking) {
                let declared = project
                    .stages
                    .iter()
                    .map(|s| s.name.as_str())
                    .chain(project.aliases.iter().map(|a| a.name.as_str()))
                    .chain(project.targets.iter().map(|t| t.name.as_str()));
                for name in declared {
                    planner.request(&project.dir, name, &none, 0)?;
                }
            }
        } else {
            for name in names {
                planner.request(invoking, name.as_ref(), &none, 0)?;
            }
        }

        let plan = planner.finish();
        info!(
            stages = plan.handles.len(),
            copies = plan.registry.len(),
            "build planned"
        );
        Ok(plan)
    }
}

// =============================================================================
// PLANNER
// =============================================================================

type MemoKey = (PathBuf, String, Vec<Property>);

struct Planner<'b, 'a> {
    build: &'b Build<'a>,
    registry: VirtualTargetRegistry,
    handles: Vec<AggregateHandle>,
    memo: BTreeMap<MemoKey, HandleId>,
    /// Aliases already expanded, keyed like stages but by their overrides.
    expanded: BTreeSet<MemoKey>,
    /// Stages and aliases being resolved; names are unique across both.
    in_progress: Vec<(PathBuf, String)>,
    /// Graphs for refined requests, keyed by canonical request.
    graphs: BTreeMap<Vec<Property>, TargetGraph>,
    roots: Vec<HandleId>,
    requested: Vec<TargetId>,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Graph for a key returned by [`Planner::graph_key`].
fn select<'g>(
    base: &'g TargetGraph,
    graphs: &'g BTreeMap<Vec<Property>, TargetGraph>,
    key: &[Property],
) -> &'g TargetGraph {
    graphs.get(key).unwrap_or(base)
}

impl<'b, 'a> Planner<'b, 'a> {
    fn new(build: &'b Build<'a>) -> Self {
        Self {
            build,
            registry: VirtualTargetRegistry::new(),
            handles: Vec::new(),
            memo: BTreeMap::new(),
            expanded: BTreeSet::new(),
            in_progress: Vec::new(),
            graphs: BTreeMap::new(),
            roots: Vec::new(),
            requested: Vec::new(),
        }
    }

    /// Build the graph for `overrides` unless the base graph serves.
    fn graph_key(&mut self, overrides: &PropertySet) -> Result<Vec<Property>, StageError> {
        let build = self.build;
        let request = build.refined_request(overrides);
        let key = request.canonical();
        if key != build.request.canonical() && !self.graphs.contains_key(&key) {
            debug!(request = %request, "plan: building graph for refined request");
            let graph = GraphBuilder {
                model: build.model,
                types: build.types,
                locator: build.locator,
            }
            .build(&request)?;
            self.graphs.insert(key.clone(), graph);
        }
        Ok(key)
    }

    /// Resolve a requested name: stage, alias or main target.
    fn request(
        &mut self,
        project: &Path,
        name: &str,
        overrides: &PropertySet,
        depth: usize,
    ) -> Result<(), StageError> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(StageError::DependencyCycle(name.to_string()));
        }
        let build = self.build;
        let (dir, local) = split_reference(project, name);
        let declared = build.model.project(&dir);

        if let Some(stage) = declared.and_then(|p| p.stage(&local)) {
            let id = self.stage(&dir, stage, overrides, depth)?;
            push_unique(&mut self.roots, id);
            return Ok(());
        }

        if let Some(alias) = declared.and_then(|p| p.alias(&local)) {
            let marker = (dir.clone(), alias.name.clone());
            if self.in_progress.contains(&marker) {
                return Err(StageError::DependencyCycle(alias.name.clone()));
            }
            let key = (dir.clone(), alias.name.clone(), overrides.canonical());
            if self.expanded.contains(&key) {
                debug!(alias = %alias.name, "plan: alias already expanded");
                return Ok(());
            }

            let active = build.active(&dir, overrides)?;
            let requirements = Requirements::parse(&alias.requirements)?;
            let refined = overrides.refine(&requirements.evaluate(&active));
            debug!(alias = %alias.name, sources = alias.sources.len(), "plan: expanding alias");
            self.in_progress.push(marker);
            for source in &alias.sources {
                self.request(&dir, source, &refined, depth + 1)?;
            }
            self.in_progress.pop();
            self.expanded.insert(key);
            return Ok(());
        }

        let key = self.graph_key(overrides)?;
        let graph = select(&build.graph, &self.graphs, &key);
        if let Some(id) = resolve_reference(graph, project, name) {
            push_unique(&mut self.requested, id);
            return Ok(());
        }

        Err(StageError::UnknownTarget(name.to_string()))
    }

    /// Stage one declaration, its stage dependencies first.
    fn stage(
        &mut self,
        dir: &Path,
        decl: &StageDecl,
        overrides: &PropertySet,
        depth: usize,
    ) -> Result<HandleId, StageError> {
        let build = self.build;
        let spec = StageSpec::from_decl(dir, decl)?;
        let active = build.active(dir, overrides)?;

        let key = (dir.to_path_buf(), decl.name.clone(), active.canonical());
        if let Some(id) = self.memo.get(&key) {
            debug!(stage = %decl.name, handle = %id, "plan: stage already planned");
            return Ok(*id);
        }

        let marker = (dir.to_path_buf(), decl.name.clone());
        if depth > MAX_EXPANSION_DEPTH || self.in_progress.contains(&marker) {
            return Err(StageError::DependencyCycle(decl.name.clone()));
        }
        self.in_progress.push(marker);
        let graph_key = self.graph_key(overrides)?;

        let mut depends_on = Vec::new();
        let mut prerequisites = Vec::new();
        for dependency in &spec.dependencies {
            let (dep_dir, dep_name) = split_reference(dir, dependency);
            if let Some(dep_decl) = build.model.project(&dep_dir).and_then(|p| p.stage(&dep_name)) {
                let id = self.stage(&dep_dir, dep_decl, overrides, depth + 1)?;
                push_unique(&mut depends_on, id);
            } else if let Some(id) =
                resolve_reference(select(&build.graph, &self.graphs, &graph_key), dir, dependency)
            {
                push_unique(&mut prerequisites, id);
            } else {
                return Err(StageError::UnknownTarget(dependency.clone()));
            }
        }

        let stager = Stager {
            graph: select(&build.graph, &self.graphs, &graph_key),
            types: build.types,
            resolver: LocationResolver {
                constants: &build.model.constants,
                policy: &build.policy,
            },
        };
        let mut handle = stager.stage(&spec, &active, &mut self.registry)?;
        handle.depends_on = depends_on;
        handle.prerequisites = prerequisites;
        self.in_progress.pop();

        let id = HandleId(self.handles.len());
        self.handles.push(handle);
        self.memo.insert(key, id);
        Ok(id)
    }

    fn finish(self) -> BuildPlan {
        BuildPlan {
            registry: self.registry,
            handles: self.handles,
            roots: self.roots,
            requested: self.requested,
        }
    }
}

// =============================================================================
// BUILD PLAN
// =============================================================================

/// The outcome of planning: the registry and a handle per staged stage.
///
/// Handles are stored dependencies first, so a handle's `depends_on` ids
/// are always lower than its own.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    registry: VirtualTargetRegistry,
    handles: Vec<AggregateHandle>,
    roots: Vec<HandleId>,
    requested: Vec<TargetId>,
}

impl BuildPlan {
    /// The build-wide registry.
    #[must_use]
    pub fn registry(&self) -> &VirtualTargetRegistry {
        &self.registry
    }

    /// All copy actions.
    pub fn actions(&self) -> impl Iterator<Item = &CopyAction> {
        self.registry.actions()
    }

    /// Copy action by id.
    #[must_use]
    pub fn action(&self, id: ActionId) -> Option<&CopyAction> {
        self.registry.get(id)
    }

    /// All handles, dependencies first.
    #[must_use]
    pub fn handles(&self) -> &[AggregateHandle] {
        &self.handles
    }

    /// Handle by id.
    #[must_use]
    pub fn handle(&self, id: HandleId) -> Option<&AggregateHandle> {
        self.handles.get(id.0)
    }

    /// First handle of a stage, whatever its properties.
    #[must_use]
    pub fn find_handle(&self, project: &Path, stage: &str) -> Option<&AggregateHandle> {
        self.handles
            .iter()
            .find(|h| h.project == project && h.stage == stage)
    }

    /// Handles of the stages that were requested.
    #[must_use]
    pub fn roots(&self) -> &[HandleId] {
        &self.roots
    }

    /// Main targets that were requested by name.
    #[must_use]
    pub fn requested_targets(&self) -> &[TargetId] {
        &self.requested
    }

    /// Whether the plan copies nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Copy actions grouped into waves that may run in parallel.
    ///
    /// A stage's wave comes after every stage it depends on. An action
    /// shared by several stages runs in the latest of their waves, so it
    /// still follows every prerequisite of each stage that shares it.
    #[must_use]
    pub fn waves(&self) -> Vec<Vec<ActionId>> {
        let mut levels: Vec<usize> = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            let level = handle
                .depends_on
                .iter()
                .filter_map(|d| levels.get(d.0))
                .map(|l| l.saturating_add(1))
                .max()
                .unwrap_or(0);
            levels.push(level);
        }

        let mut latest: BTreeMap<ActionId, usize> = BTreeMap::new();
        for (handle, level) in self.handles.iter().zip(levels) {
            for action in &handle.actions {
                latest
                    .entry(*action)
                    .and_modify(|l| *l = (*l).max(level))
                    .or_insert(level);
            }
        }

        let mut waves: BTreeMap<usize, Vec<ActionId>> = BTreeMap::new();
        for (action, level) in latest {
            waves.entry(level).or_default().push(action);
        }
        waves.into_values().collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{AliasDecl, MainTargetDecl, ProjectDecl};
    use std::collections::BTreeSet;

    fn stage(name: &str, sources: &[&str], requirements: &[&str]) -> StageDecl {
        StageDecl {
            name: name.to_string(),
            sources: sources.iter().map(|s| (*s).to_string()).collect(),
            requirements: requirements.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn model(stages: Vec<StageDecl>, aliases: Vec<AliasDecl>) -> ProjectModel {
        let mut model = ProjectModel::new("/ws");
        let mut root = ProjectDecl::new("/ws");
        root.targets.push(MainTargetDecl {
            rule: "lib".to_string(),
            name: "l".to_string(),
            ..MainTargetDecl::default()
        });
        root.stages = stages;
        root.aliases = aliases;
        model.add_project(root);
        model
    }

    fn request() -> PropertySet {
        PropertySet::parse(["<target-os>windows"]).expect("parse")
    }

    fn plan(model: &ProjectModel, names: &[&str]) -> Result<BuildPlan, StageError> {
        let types = TypeRegistry::new();
        let locator = BTreeSet::new();
        let build = Build::new(model, &types, request(), &locator, LocationPolicy::default())?;
        build.plan(names, Path::new("/ws"))
    }

    #[test]
    fn alias_and_direct_request_share_copies() {
        let model = model(
            vec![stage("dist", &["l"], &[])],
            vec![AliasDecl {
                name: "all".to_string(),
                sources: vec!["dist".to_string()],
                requirements: Vec::new(),
            }],
        );
        let plan = plan(&model, &["dist", "all"]).expect("plan");
        assert_eq!(plan.handles().len(), 1);
        assert_eq!(plan.registry().len(), 1);
    }

    #[test]
    fn stage_dependency_runs_in_earlier_wave() {
        let model = model(
            vec![
                stage("first", &["l"], &[]),
                stage("second", &["l"], &["<location>out", "<dependency>first"]),
            ],
            Vec::new(),
        );
        let plan = plan(&model, &["second"]).expect("plan");
        assert_eq!(plan.handles().len(), 2);
        let first = plan.find_handle(Path::new("/ws"), "first").expect("first");
        let second = plan.find_handle(Path::new("/ws"), "second").expect("second");
        assert_eq!(plan.waves(), vec![first.actions.clone(), second.actions.clone()]);
    }

    #[test]
    fn dependency_cycle_detected() {
        let model = model(
            vec![
                stage("x", &["l"], &["<dependency>y"]),
                stage("y", &["l"], &["<location>o", "<dependency>x"]),
            ],
            Vec::new(),
        );
        assert!(matches!(
            plan(&model, &["x"]),
            Err(StageError::DependencyCycle(_))
        ));
    }

    #[test]
    fn alias_cycle_detected() {
        let alias = |name: &str, to: &str| AliasDecl {
            name: name.to_string(),
            sources: vec![to.to_string()],
            requirements: Vec::new(),
        };
        let model = model(Vec::new(), vec![alias("p", "q"), alias("q", "p")]);
        assert!(matches!(
            plan(&model, &["p"]),
            Err(StageError::DependencyCycle(_))
        ));
    }

    #[test]
    fn alias_requirements_rebuild_sources() {
        let dist = stage(
            "dist",
            &["l"],
            &["<variant>debug:<location>ds", "<variant>release:<location>rs"],
        );
        let model = model(
            vec![dist],
            vec![AliasDecl {
                name: "rel".to_string(),
                sources: vec!["dist".to_string()],
                requirements: vec!["<variant>release".to_string()],
            }],
        );

        let release_only = plan(&model, &["rel"]).expect("plan");
        let copies: Vec<_> = release_only
            .actions()
            .map(|a| (a.source_path.clone(), a.destination()))
            .collect();
        assert_eq!(
            copies,
            vec![(
                PathBuf::from("/ws/bin/release/l.dll"),
                PathBuf::from("/ws/rs/l.dll")
            )]
        );

        // both variants in one build, one handle each
        let both = plan(&model, &["dist", "rel"]).expect("plan");
        assert_eq!(both.handles().len(), 2);
        let sources: Vec<_> = both.actions().map(|a| a.source_path.clone()).collect();
        assert_eq!(
            sources,
            vec![
                PathBuf::from("/ws/bin/debug/l.dll"),
                PathBuf::from("/ws/bin/release/l.dll")
            ]
        );
    }

    #[test]
    fn shared_aliases_expand_once() {
        let depth = 40;
        let aliases = (0..depth)
            .map(|i| {
                let next = if i + 1 == depth {
                    "dist".to_string()
                } else {
                    format!("x{}", i + 1)
                };
                AliasDecl {
                    name: format!("x{i}"),
                    sources: vec![next.clone(), next],
                    requirements: Vec::new(),
                }
            })
            .collect();
        let model = model(vec![stage("dist", &["l"], &[])], aliases);
        let plan = plan(&model, &["x0"]).expect("plan");
        assert_eq!(plan.handles().len(), 1);
        assert_eq!(plan.registry().len(), 1);
    }

    #[test]
    fn shared_action_waits_for_every_prerequisite() {
        let model = model(
            vec![
                stage("pre", &["l"], &["<location>pre"]),
                stage("plain", &["l"], &["<location>out"]),
                stage("after", &["l"], &["<location>out", "<dependency>pre"]),
            ],
            Vec::new(),
        );
        let plan = plan(&model, &["plain", "after"]).expect("plan");
        let pre = plan.find_handle(Path::new("/ws"), "pre").expect("pre");
        let plain = plan.find_handle(Path::new("/ws"), "plain").expect("plain");
        let after = plan.find_handle(Path::new("/ws"), "after").expect("after");
        assert_eq!(plain.actions, after.actions);
        assert_eq!(plan.waves(), vec![pre.actions.clone(), after.actions.clone()]);
    }

    #[test]
    fn invoking_directory_must_be_a_project() {
        let model = model(vec![stage("dist", &["l"], &[])], Vec::new());
        let types = TypeRegistry::new();
        let locator = BTreeSet::new();
        let build =
            Build::new(&model, &types, request(), &locator, LocationPolicy::default()).expect("build");
        assert_eq!(
            build.plan::<&str>(&[], Path::new("/ws/nowhere")).err(),
            Some(StageError::UnknownTarget("/ws/nowhere".to_string()))
        );
    }

    #[test]
    fn unknown_name_fails_whole_plan() {
        let model = model(vec![stage("dist", &["l"], &[])], Vec::new());
        assert_eq!(
            plan(&model, &["dist", "nope"]).err(),
            Some(StageError::UnknownTarget("nope".to_string()))
        );
    }

    #[test]
    fn no_names_plans_everything() {
        let model = model(vec![stage("dist", &["l"], &[])], Vec::new());
        let plan = plan(&model, &[]).expect("plan");
        assert_eq!(plan.roots().len(), 1);
        assert_eq!(plan.requested_targets().len(), 1);
    }
}
