//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::executor::{self, CopyOutcome, ExecutorConfig};
use crate::manifest::{FsLocator, Workspace};
use stagekit_core::location::normalize;
use stagekit_core::{
    Build, BuildPlan, LocationPolicy, Property, PropertySet, StageError, features,
};
use std::path::PathBuf;

// =============================================================================
// OPTIONS
// =============================================================================

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub root: PathBuf,
    pub dir: Option<PathBuf>,
    pub sandbox: bool,
    pub json_mode: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Options {
    /// Absolute workspace root.
    pub fn workspace_root(&self) -> Result<PathBuf, StageError> {
        self.root.canonicalize().map_err(|e| {
            StageError::Io(format!("Invalid workspace root '{}': {}", self.root.display(), e))
        })
    }

    /// Location policy selected by `--sandbox`.
    #[must_use]
    pub fn policy(&self, root: &std::path::Path) -> LocationPolicy {
        if self.sandbox {
            LocationPolicy::WithinRoot(root.to_path_buf())
        } else {
            LocationPolicy::Unrestricted
        }
    }
}

// =============================================================================
// REQUEST PARSING
// =============================================================================

/// A parsed build request: names to build and properties to build them with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub names: Vec<String>,
    pub properties: PropertySet,
}

/// Split request items into names and properties.
///
/// Accepts `<feature>value`, `feature=value`, implicit values such as
/// `release`, and anything else as a target name.
pub fn parse_request(items: &[String]) -> Result<Request, StageError> {
    let mut request = Request::default();
    for item in items {
        let property = if item.starts_with('<') {
            Some(Property::parse(item)?)
        } else if let Some((feature, value)) = item.split_once('=') {
            if feature.is_empty() || value.is_empty() {
                return Err(StageError::InvalidProperty(item.clone()));
            }
            Some(Property::new(feature, value))
        } else {
            features::implicit_feature(item).map(|feature| Property::new(feature, item.as_str()))
        };

        match property {
            Some(property) => request.properties.insert(property)?,
            None => request.names.push(item.clone()),
        }
    }
    Ok(request)
}

/// Load the workspace and plan `items` from the invoking project.
pub fn plan_request(options: &Options, items: &[String]) -> Result<BuildPlan, StageError> {
    let root = options.workspace_root()?;
    let invoking = options
        .dir
        .as_ref()
        .map(|dir| normalize(&root.join(dir)))
        .unwrap_or_else(|| root.clone());
    let request = parse_request(items)?;

    tracing::info!(
        root = %root.display(),
        project = %invoking.display(),
        request = %request.properties,
        "planning"
    );

    let workspace = Workspace::load(&root)?;
    let build = Build::new(
        &workspace.model,
        &workspace.types,
        request.properties,
        &FsLocator,
        options.policy(&root),
    )?;
    build.plan(request.names.as_slice(), &invoking)
}

// =============================================================================
// BUILD COMMAND
// =============================================================================

/// Plan and execute a build.
pub async fn cmd_build(
    options: &Options,
    items: &[String],
    hardlink: bool,
    dry_run: bool,
) -> Result<(), StageError> {
    let plan = plan_request(options, items)?;
    let report = executor::execute(&plan, ExecutorConfig { hardlink, dry_run }).await?;

    if options.json_mode {
        let output = serde_json::json!({
            "dry_run": dry_run,
            "waves": report.waves,
            "copies": report.copies,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if options.verbose || dry_run {
        for copy in &report.copies {
            println!(
                "  [{}] {} -> {}",
                copy.wave,
                copy.source.display(),
                copy.destination.display()
            );
        }
    }

    if dry_run {
        println!("Would stage {} file(s) in {} wave(s)", report.copies.len(), report.waves);
    } else {
        println!(
            "Staged {} file(s) in {} wave(s): {} copied, {} linked, {} in place",
            report.copies.len(),
            report.waves,
            report.count(CopyOutcome::Copied),
            report.count(CopyOutcome::Linked),
            report.count(CopyOutcome::InPlace)
        );
    }

    Ok(())
}

// =============================================================================
// PLAN COMMAND
// =============================================================================

/// Show the plan without executing it.
pub fn cmd_plan(options: &Options, items: &[String]) -> Result<(), StageError> {
    let plan = plan_request(options, items)?;
    let actions: Vec<_> = plan.actions().collect();
    let waves = plan.waves();

    if options.json_mode {
        let output = serde_json::json!({
            "actions": actions,
            "waves": waves,
            "stages": plan.handles(),
            "targets": plan.requested_targets(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Stagekit Build Plan");
    println!("===================");
    println!();
    for handle in plan.handles() {
        println!("Stage {} ({})", handle.stage, handle.project.display());
        if !handle.passthrough.is_empty() {
            println!("  Properties: {}", handle.passthrough);
        }
        for id in &handle.actions {
            if let Some(action) = plan.action(*id) {
                println!(
                    "  {} {} -> {}",
                    action.id,
                    action.source_path.display(),
                    action.destination().display()
                );
            }
        }
    }
    println!();
    for (index, wave) in waves.iter().enumerate() {
        let ids: Vec<String> = wave.iter().map(ToString::to_string).collect();
        println!("Wave {}: {}", index, ids.join(" "));
    }

    Ok(())
}

// =============================================================================
// TYPES COMMAND
// =============================================================================

/// List registered types.
pub fn cmd_types(options: &Options) -> Result<(), StageError> {
    let root = options.workspace_root()?;
    let workspace = Workspace::load(&root)?;

    if options.json_mode {
        let types: Vec<_> = workspace
            .types
            .iter()
            .map(|t| serde_json::json!({ "name": t.name, "base": t.base }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&types).unwrap_or_default()
        );
        return Ok(());
    }

    for def in workspace.types.iter() {
        match &def.base {
            Some(base) => println!("{:<12} <- {}", def.name, base),
            None => println!("{}", def.name),
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
