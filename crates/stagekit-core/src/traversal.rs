//! # Traversal Engine
//!
//! Expands a stage's direct sources into the set of targets to copy.
//!
//! With traversal off the result is the sources themselves. With traversal
//! on, a breadth-first walk follows `Dependency` edges only and keeps every
//! visited target whose type passes the filter. Roots that fail the filter
//! are still walked through.

use crate::filter::TypeFilter;
use crate::graph::TargetGraph;
use crate::typesys::TypeRegistry;
use crate::{StageError, TargetId};
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

/// Traversal options taken from a stage.
#[derive(Debug, Clone, Copy)]
pub struct Traversal<'a> {
    pub enabled: bool,
    pub filter: &'a TypeFilter,
}

impl Traversal<'_> {
    /// Collect the targets to stage from `roots`.
    ///
    /// Order: roots first (in the given order), then targets in
    /// breadth-first discovery order. Each target appears once.
    pub fn collect(
        &self,
        graph: &TargetGraph,
        types: &TypeRegistry,
        roots: &[TargetId],
    ) -> Result<Vec<TargetId>, StageError> {
        for root in roots {
            graph.target(*root)?;
        }

        if !self.enabled {
            let mut seen = BTreeSet::new();
            return Ok(roots.iter().copied().filter(|r| seen.insert(*r)).collect());
        }

        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        let mut collected = Vec::new();

        for root in roots {
            if visited.insert(*root) {
                queue.push_back(*root);
            }
        }

        while let Some(current) = queue.pop_front() {
            let target = graph.target(current)?;
            if self.filter.matches(target, types) {
                collected.push(current);
            } else {
                debug!(
                    target_name = %target.name,
                    target_type = %target.target_type,
                    "traversal: type filtered out"
                );
            }

            for next in graph.build_dependencies(current) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        Ok(collected)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Artifact, EdgeKind, PropertySet};
    use std::path::Path;

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

    /// exe a -> lib l (dependency), l -> l2 (use), l -> l3 (dependency),
    /// a -> a.cpp (source)
    fn sample() -> (TargetGraph, [TargetId; 5]) {
        let mut graph = TargetGraph::new();
        let l2 = add(&mut graph, "l2", "SHARED_LIB");
        let l3 = add(&mut graph, "l3", "SHARED_LIB");
        let l = add(&mut graph, "l", "SHARED_LIB");
        let cpp = add(&mut graph, "a.cpp", "CPP");
        let a = add(&mut graph, "a", "EXE");
        graph.add_edge(a, cpp, EdgeKind::Dependency).expect("edge");
        graph.add_edge(a, l, EdgeKind::Dependency).expect("edge");
        graph.add_edge(l, l2, EdgeKind::UsageOnly).expect("edge");
        graph.add_edge(l, l3, EdgeKind::Dependency).expect("edge");
        (graph, [a, l, l2, l3, cpp])
    }

    #[test]
    fn traversal_off_returns_roots_unfiltered() {
        let (graph, [a, _, _, _, cpp]) = sample();
        let types = TypeRegistry::new();
        let filter = TypeFilter::new(["LIB"]);
        let traversal = Traversal {
            enabled: false,
            filter: &filter,
        };
        let result = traversal
            .collect(&graph, &types, &[a, cpp, a])
            .expect("collect");
        assert_eq!(result, vec![a, cpp]);
    }

    #[test]
    fn traversal_skips_usage_only_edges() {
        let (graph, [a, l, l2, l3, _]) = sample();
        let types = TypeRegistry::new();
        let filter = TypeFilter::new(["EXE", "LIB"]);
        let traversal = Traversal {
            enabled: true,
            filter: &filter,
        };
        let result = traversal.collect(&graph, &types, &[a]).expect("collect");
        assert_eq!(result, vec![a, l, l3]);
        assert!(!result.contains(&l2));
    }

    #[test]
    fn filtered_root_is_walked_through() {
        let (graph, [a, l, _, l3, _]) = sample();
        let types = TypeRegistry::new();
        let filter = TypeFilter::new(["LIB"]);
        let traversal = Traversal {
            enabled: true,
            filter: &filter,
        };
        let result = traversal.collect(&graph, &types, &[a]).expect("collect");
        assert_eq!(result, vec![l, l3]);
    }

    #[test]
    fn traversal_is_cycle_safe() {
        let mut graph = TargetGraph::new();
        let x = add(&mut graph, "x", "SHARED_LIB");
        let y = add(&mut graph, "y", "SHARED_LIB");
        graph.add_edge(x, y, EdgeKind::Dependency).expect("edge");
        graph.add_edge(y, x, EdgeKind::Dependency).expect("edge");

        let types = TypeRegistry::new();
        let filter = TypeFilter::new(["LIB"]);
        let traversal = Traversal {
            enabled: true,
            filter: &filter,
        };
        let result = traversal.collect(&graph, &types, &[x]).expect("collect");
        assert_eq!(result, vec![x, y]);
    }

    #[test]
    fn unknown_root_fails() {
        let graph = TargetGraph::new();
        let types = TypeRegistry::new();
        let filter = TypeFilter::new(["LIB"]);
        let traversal = Traversal {
            enabled: true,
            filter: &filter,
        };
        assert!(traversal.collect(&graph, &types, &[TargetId(5)]).is_err());
    }
}
