//! # Target Graph
//!
//! Arena of built targets indexed by [`TargetId`], with adjacency lists
//! tagged by [`EdgeKind`]. Ids are handed out in insertion order and all
//! indexes are `BTreeMap`s, so iteration order is deterministic.

use crate::{Artifact, EdgeKind, PropertySet, StageError, TargetId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// TARGET
// =============================================================================

/// A built target. Immutable once inserted, apart from its outgoing edges
/// which are added while the graph is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    /// Directory of the project that declared the target.
    pub project: PathBuf,
    pub target_type: String,
    /// Properties the target was built with.
    pub properties: PropertySet,
    pub artifact: Artifact,
    /// Outgoing edges in declaration order.
    edges: Vec<(TargetId, EdgeKind)>,
}

impl Target {
    /// Outgoing edges in declaration order.
    #[must_use]
    pub fn edges(&self) -> &[(TargetId, EdgeKind)] {
        &self.edges
    }

    /// Human-readable `project//name` reference.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}//{}", self.project.display(), self.name)
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// The target arena.
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    targets: BTreeMap<TargetId, Target>,
    /// (project, name) -> id
    index: BTreeMap<(PathBuf, String), TargetId>,
    next_id: u64,
}

impl TargetGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a target. Names are unique per project.
    pub fn insert(
        &mut self,
        name: &str,
        project: &Path,
        target_type: &str,
        properties: PropertySet,
        artifact: Artifact,
    ) -> Result<TargetId, StageError> {
        let key = (project.to_path_buf(), name.to_string());
        if self.index.contains_key(&key) {
            return Err(StageError::DuplicateTarget {
                name: name.to_string(),
                project: project.display().to_string(),
            });
        }

        let id = TargetId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.targets.insert(
            id,
            Target {
                id,
                name: name.to_string(),
                project: project.to_path_buf(),
                target_type: target_type.to_string(),
                properties,
                artifact,
                edges: Vec::new(),
            },
        );
        self.index.insert(key, id);
        Ok(id)
    }

    /// Add an edge. Adding the same (target, kind) twice is a no-op.
    ///
    /// If `to` is already linked with the other kind, both edges are kept:
    /// a `Dependency` edge anywhere makes the link traversable.
    pub fn add_edge(
        &mut self,
        from: TargetId,
        to: TargetId,
        kind: EdgeKind,
    ) -> Result<(), StageError> {
        if !self.targets.contains_key(&to) {
            return Err(StageError::TargetNotFound(to));
        }
        let source = self
            .targets
            .get_mut(&from)
            .ok_or(StageError::TargetNotFound(from))?;
        if !source.edges.contains(&(to, kind)) {
            source.edges.push((to, kind));
        }
        Ok(())
    }

    /// Direct dependencies of a target with their edge kinds.
    pub fn dependencies(&self, id: TargetId) -> Result<Vec<(TargetId, EdgeKind)>, StageError> {
        self.targets
            .get(&id)
            .map(|t| t.edges.clone())
            .ok_or(StageError::TargetNotFound(id))
    }

    /// Traversable neighbours, without allocating.
    pub fn build_dependencies(&self, id: TargetId) -> impl Iterator<Item = TargetId> + '_ {
        self.targets
            .get(&id)
            .into_iter()
            .flat_map(|t| t.edges.iter())
            .filter(|(_, kind)| kind.is_traversable())
            .map(|(to, _)| *to)
    }

    /// Look up a target by id.
    #[must_use]
    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    /// Look up a target by id, failing if absent.
    pub fn target(&self, id: TargetId) -> Result<&Target, StageError> {
        self.get(id).ok_or(StageError::TargetNotFound(id))
    }

    /// Find a target by project and name.
    #[must_use]
    pub fn find(&self, project: &Path, name: &str) -> Option<TargetId> {
        self.index
            .get(&(project.to_path_buf(), name.to_string()))
            .copied()
    }

    /// Make an existing target also reachable as `name` in `project`.
    pub fn add_name(&mut self, project: &Path, name: &str, id: TargetId) -> Result<(), StageError> {
        self.target(id)?;
        let key = (project.to_path_buf(), name.to_string());
        match self.index.get(&key) {
            Some(existing) if *existing != id => Err(StageError::DuplicateTarget {
                name: name.to_string(),
                project: project.display().to_string(),
            }),
            _ => {
                self.index.insert(key, id);
                Ok(())
            }
        }
    }

    /// Target whose artifact is `output`.
    #[must_use]
    pub fn find_output(&self, output: &Path) -> Option<TargetId> {
        self.targets
            .values()
            .find(|t| t.artifact.output == output)
            .map(|t| t.id)
    }

    /// All targets in id order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of edges of both kinds.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.targets.values().map(|t| t.edges.len()).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn add(graph: &mut TargetGraph, name: &str, target_type: &str) -> TargetId {
        graph
            .insert(
                name,
                Path::new("/ws"),
                target_type,
                PropertySet::new(),
                Artifact::new(format!("/ws/bin/{name}"), name, None),
            )
            .expect("insert")
    }

    #[test]
    fn ids_follow_insertion_order() {
        let mut graph = TargetGraph::new();
        let a = add(&mut graph, "a", "EXE");
        let b = add(&mut graph, "b", "SHARED_LIB");
        assert_eq!(a, TargetId(0));
        assert_eq!(b, TargetId(1));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn duplicate_name_in_project_rejected() {
        let mut graph = TargetGraph::new();
        add(&mut graph, "a", "EXE");
        let result = graph.insert(
            "a",
            Path::new("/ws"),
            "EXE",
            PropertySet::new(),
            Artifact::new("/ws/bin/a", "a", None),
        );
        assert!(matches!(result, Err(StageError::DuplicateTarget { .. })));

        // Same name in another project is fine
        let other = graph.insert(
            "a",
            Path::new("/ws/d"),
            "EXE",
            PropertySet::new(),
            Artifact::new("/ws/d/bin/a", "a", None),
        );
        assert!(other.is_ok());
    }

    #[test]
    fn dependencies_keep_edge_kinds() {
        let mut graph = TargetGraph::new();
        let l = add(&mut graph, "l", "SHARED_LIB");
        let l2 = add(&mut graph, "l2", "SHARED_LIB");
        let l3 = add(&mut graph, "l3", "SHARED_LIB");

        graph.add_edge(l, l2, EdgeKind::UsageOnly).expect("edge");
        graph.add_edge(l, l3, EdgeKind::Dependency).expect("edge");
        graph.add_edge(l, l3, EdgeKind::Dependency).expect("edge");

        let deps = graph.dependencies(l).expect("deps");
        assert_eq!(
            deps,
            vec![(l2, EdgeKind::UsageOnly), (l3, EdgeKind::Dependency)]
        );
        assert_eq!(graph.build_dependencies(l).collect::<Vec<_>>(), vec![l3]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn edge_to_missing_target_fails() {
        let mut graph = TargetGraph::new();
        let a = add(&mut graph, "a", "EXE");
        let result = graph.add_edge(a, TargetId(99), EdgeKind::Dependency);
        assert_eq!(result, Err(StageError::TargetNotFound(TargetId(99))));
        assert!(graph.dependencies(TargetId(42)).is_err());
    }

    #[test]
    fn extra_name_resolves_to_same_target() {
        let mut graph = TargetGraph::new();
        let a = add(&mut graph, "a", "FILE");
        let b = add(&mut graph, "b", "FILE");
        graph.add_name(Path::new("/ws/d"), "../a", a).expect("name");
        assert_eq!(graph.find(Path::new("/ws/d"), "../a"), Some(a));
        assert_eq!(graph.find_output(Path::new("/ws/bin/a")), Some(a));
        assert!(graph.add_name(Path::new("/ws"), "a", b).is_err());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn find_by_project_and_name() {
        let mut graph = TargetGraph::new();
        let a = add(&mut graph, "a", "EXE");
        assert_eq!(graph.find(Path::new("/ws"), "a"), Some(a));
        assert_eq!(graph.find(Path::new("/ws/d"), "a"), None);
        assert_eq!(
            graph.target(a).expect("target").qualified_name(),
            "/ws//a"
        );
    }
}
