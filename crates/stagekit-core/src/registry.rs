//! # Virtual Target Registry
//!
//! One registry per build invocation. Every copy a stage wants is keyed by
//! (source target, destination path); a key registered twice yields the
//! existing action, so overlapping stages (or a stage reached through an
//! alias) never produce two build targets for one file.

use crate::{ActionId, StageError, TargetId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

// =============================================================================
// KEYS AND ACTIONS
// =============================================================================

/// Deduplication identity of a staged copy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VirtualTargetKey {
    pub source: TargetId,
    /// Full destination path, directory and file name.
    pub destination: PathBuf,
}

/// A copy a stage asks for, before registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyRequest {
    pub source: TargetId,
    pub source_path: PathBuf,
    pub destination_dir: PathBuf,
    pub file_name: String,
}

impl CopyRequest {
    /// Full destination path.
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        self.destination_dir.join(&self.file_name)
    }

    /// Registry key of this request.
    #[must_use]
    pub fn key(&self) -> VirtualTargetKey {
        VirtualTargetKey {
            source: self.source,
            destination: self.destination(),
        }
    }
}

/// A registered copy. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyAction {
    pub id: ActionId,
    pub source: TargetId,
    pub source_path: PathBuf,
    pub destination_dir: PathBuf,
    pub file_name: String,
}

impl CopyAction {
    /// Full destination path.
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        self.destination_dir.join(&self.file_name)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Build-wide registry of copy actions.
#[derive(Debug, Clone, Default)]
pub struct VirtualTargetRegistry {
    actions: BTreeMap<ActionId, CopyAction>,
    by_key: BTreeMap<VirtualTargetKey, ActionId>,
    /// destination -> source target and artifact that own it
    by_destination: BTreeMap<PathBuf, (TargetId, PathBuf)>,
    next_id: u64,
}

impl VirtualTargetRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a request without storing it.
    ///
    /// Fails only when another source already owns the destination path.
    /// One target built under two property sets has two artifacts, and
    /// those count as different sources.
    pub fn check(&self, request: &CopyRequest) -> Result<(), StageError> {
        let destination = request.destination();
        match self.by_destination.get(&destination) {
            Some((owner, artifact))
                if *owner != request.source || *artifact != request.source_path =>
            {
                Err(StageError::DestinationConflict {
                    destination: destination.display().to_string(),
                    first: *owner,
                    second: request.source,
                })
            }
            _ => Ok(()),
        }
    }

    /// Register a copy, returning the existing action for a known key.
    pub fn register(&mut self, request: CopyRequest) -> Result<ActionId, StageError> {
        self.check(&request)?;
        let key = request.key();
        if let Some(existing) = self.by_key.get(&key) {
            debug!(
                action = %existing,
                destination = %key.destination.display(),
                "registry: duplicate copy collapsed"
            );
            return Ok(*existing);
        }

        let id = ActionId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.by_destination.insert(
            key.destination.clone(),
            (request.source, request.source_path.clone()),
        );
        self.by_key.insert(key, id);
        self.actions.insert(
            id,
            CopyAction {
                id,
                source: request.source,
                source_path: request.source_path,
                destination_dir: request.destination_dir,
                file_name: request.file_name,
            },
        );
        Ok(id)
    }

    /// Action registered under a key.
    #[must_use]
    pub fn lookup(&self, source: TargetId, destination: &Path) -> Option<ActionId> {
        self.by_key
            .get(&VirtualTargetKey {
                source,
                destination: destination.to_path_buf(),
            })
            .copied()
    }

    /// Action by id.
    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<&CopyAction> {
        self.actions.get(&id)
    }

    /// All actions in registration order.
    pub fn actions(&self) -> impl Iterator<Item = &CopyAction> {
        self.actions.values()
    }

    /// Number of distinct actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Forget everything, for a new independent invocation.
    pub fn clear(&mut self) {
        self.actions.clear();
        self.by_key.clear();
        self.by_destination.clear();
        self.next_id = 0;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: u64, dir: &str, file: &str) -> CopyRequest {
        CopyRequest {
            source: TargetId(source),
            source_path: PathBuf::from(format!("/ws/bin/debug/{file}")),
            destination_dir: PathBuf::from(dir),
            file_name: file.to_string(),
        }
    }

    #[test]
    fn same_key_collapses_to_one_action() {
        let mut registry = VirtualTargetRegistry::new();
        let first = registry.register(request(1, "/ws/dist", "a.dll")).expect("first");
        let second = registry.register(request(1, "/ws/dist", "a.dll")).expect("second");
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_destination_is_new_action() {
        let mut registry = VirtualTargetRegistry::new();
        let first = registry.register(request(1, "/ws/dist", "a.dll")).expect("first");
        let second = registry.register(request(1, "/ws/other", "a.dll")).expect("second");
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup(TargetId(1), Path::new("/ws/other/a.dll")),
            Some(second)
        );
    }

    #[test]
    fn two_sources_one_destination_conflict() {
        let mut registry = VirtualTargetRegistry::new();
        registry.register(request(1, "/ws/dist", "a.dll")).expect("first");
        let result = registry.register(request(2, "/ws/dist", "a.dll"));
        assert!(matches!(result, Err(StageError::DestinationConflict { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn one_target_two_artifacts_conflict() {
        let mut registry = VirtualTargetRegistry::new();
        registry.register(request(1, "/ws/dist", "a.dll")).expect("debug");
        let release = CopyRequest {
            source_path: PathBuf::from("/ws/bin/release/a.dll"),
            ..request(1, "/ws/dist", "a.dll")
        };
        assert!(matches!(
            registry.register(release),
            Err(StageError::DestinationConflict { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clear_resets_ids() {
        let mut registry = VirtualTargetRegistry::new();
        registry.register(request(1, "/ws/dist", "a.dll")).expect("first");
        registry.clear();
        assert!(registry.is_empty());
        let id = registry.register(request(3, "/ws/dist", "b.dll")).expect("again");
        assert_eq!(id, ActionId(0));
    }

    #[test]
    fn actions_keep_registration_order() {
        let mut registry = VirtualTargetRegistry::new();
        registry.register(request(5, "/ws/dist", "z.dll")).expect("z");
        registry.register(request(4, "/ws/dist", "a.dll")).expect("a");
        let names: Vec<_> = registry.actions().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["z.dll", "a.dll"]);
        let first = registry.get(ActionId(0)).expect("action");
        assert_eq!(first.destination(), PathBuf::from("/ws/dist/z.dll"));
    }
}
