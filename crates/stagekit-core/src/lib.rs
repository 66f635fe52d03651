//! # stagekit-core
//!
//! The deterministic staging engine for stagekit.
//!
//! A stage copies built artifacts (executables, libraries, arbitrary files)
//! into a destination directory. This crate turns stage declarations into
//! deduplicated copy actions; it never touches the file system itself.
//!
//! ## Pipeline
//!
//! 1. `project` builds the target graph from declarations: each main target
//!    gets its type, suffix and output path from its build properties.
//! 2. `plan` resolves requested names (stages, aliases, targets) and stages
//!    each stage once per distinct property set.
//! 3. `stage` expands sources through `traversal`, resolves the destination
//!    through `location`, and registers copies in the build-wide `registry`.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no I/O (source existence goes through a trait)
//! - Deterministic: `BTreeMap`/`BTreeSet` only, ids in declaration order
//! - Targets are immutable once the graph is built; staging reads the
//!   suffix a target was built with and never recomputes it

// =============================================================================
// MODULES
// =============================================================================

pub mod features;
pub mod filter;
pub mod graph;
pub mod location;
pub mod plan;
pub mod primitives;
pub mod project;
pub mod properties;
pub mod registry;
pub mod stage;
pub mod traversal;
pub mod types;
pub mod typesys;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ActionId, Artifact, EdgeKind, StageError, TargetId};

// =============================================================================
// RE-EXPORTS: Properties
// =============================================================================

pub use properties::{ConditionalProperty, Property, PropertySet, Requirements};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use filter::TypeFilter;
pub use graph::{Target, TargetGraph};
pub use location::{LocationPolicy, LocationResolver, PathConstants};
pub use plan::{Build, BuildPlan};
pub use project::{
    AliasDecl, GraphBuilder, MainTargetDecl, ProjectDecl, ProjectModel, SourceLocator, StageDecl,
};
pub use registry::{CopyAction, CopyRequest, VirtualTargetKey, VirtualTargetRegistry};
pub use stage::{AggregateHandle, HandleId, StageSpec, Stager};
pub use traversal::Traversal;
pub use typesys::{TypeDef, TypeRegistry};
