//! # Copy Executor
//!
//! Runs a [`BuildPlan`] wave by wave. Copies within a wave run concurrently
//! on tokio's blocking pool; a wave starts only after the previous one
//! finished without error.

use serde::Serialize;
use stagekit_core::{ActionId, BuildPlan, CopyAction, StageError};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// How copies are materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Hard-link instead of copying when possible.
    pub hardlink: bool,
    /// Report what would be copied without touching the file system.
    pub dry_run: bool,
}

/// What happened to one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyOutcome {
    Copied,
    Linked,
    /// Source and destination are the same file.
    InPlace,
    /// Dry run.
    Planned,
}

/// One executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutedCopy {
    pub action: ActionId,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub wave: usize,
    pub outcome: CopyOutcome,
}

/// Result of running a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub waves: usize,
    pub copies: Vec<ExecutedCopy>,
}

impl ExecutionReport {
    /// Number of actions with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: CopyOutcome) -> usize {
        self.copies.iter().filter(|c| c.outcome == outcome).count()
    }
}

fn io_error(what: &str, path: &Path, error: &std::io::Error) -> StageError {
    StageError::Io(format!("{} {}: {}", what, path.display(), error))
}

/// Materialize one copy action.
fn copy_one(action: &CopyAction, hardlink: bool) -> Result<CopyOutcome, StageError> {
    let source = &action.source_path;
    let destination = action.destination();

    if !source.is_file() {
        return Err(StageError::Io(format!(
            "Source artifact {} does not exist",
            source.display()
        )));
    }
    if *source == destination {
        return Ok(CopyOutcome::InPlace);
    }

    // concurrent actions may race to create the same directory
    std::fs::create_dir_all(&action.destination_dir)
        .map_err(|e| io_error("Cannot create", &action.destination_dir, &e))?;

    // unlink first: a previous hard-link build leaves the destination
    // sharing the source's inode, and copying onto it would truncate both
    if std::fs::symlink_metadata(&destination).is_ok() {
        std::fs::remove_file(&destination)
            .map_err(|e| io_error("Cannot replace", &destination, &e))?;
    }

    if hardlink {
        match std::fs::hard_link(source, &destination) {
            Ok(()) => return Ok(CopyOutcome::Linked),
            Err(e) => warn!(
                source = %source.display(),
                destination = %destination.display(),
                error = %e,
                "hard link failed, copying instead"
            ),
        }
    }

    std::fs::copy(source, &destination).map_err(|e| io_error("Cannot copy to", &destination, &e))?;
    Ok(CopyOutcome::Copied)
}

/// Run every wave of `plan` in order.
pub async fn execute(plan: &BuildPlan, config: ExecutorConfig) -> Result<ExecutionReport, StageError> {
    let waves = plan.waves();
    let mut report = ExecutionReport {
        waves: waves.len(),
        copies: Vec::new(),
    };

    for (wave, actions) in waves.iter().enumerate() {
        let mut tasks = JoinSet::new();
        for id in actions {
            let action = plan
                .action(*id)
                .ok_or_else(|| StageError::Io(format!("Unknown copy action {id}")))?
                .clone();
            if config.dry_run {
                report.copies.push(ExecutedCopy {
                    action: action.id,
                    destination: action.destination(),
                    source: action.source_path,
                    wave,
                    outcome: CopyOutcome::Planned,
                });
                continue;
            }
            let hardlink = config.hardlink;
            tasks.spawn_blocking(move || {
                copy_one(&action, hardlink).map(|outcome| ExecutedCopy {
                    action: action.id,
                    destination: action.destination(),
                    source: action.source_path.clone(),
                    wave,
                    outcome,
                })
            });
        }

        let mut finished = Vec::with_capacity(actions.len());
        while let Some(joined) = tasks.join_next().await {
            let copy = joined.map_err(|e| StageError::Io(format!("Copy task failed: {e}")))??;
            info!(
                source = %copy.source.display(),
                destination = %copy.destination.display(),
                outcome = ?copy.outcome,
                "staged"
            );
            finished.push(copy);
        }
        // completion order is not deterministic; report in action order
        finished.sort_by_key(|c| c.action);
        report.copies.extend(finished);
    }

    Ok(report)
}

// =============================================================================
// TESTS
// =============================================================================
