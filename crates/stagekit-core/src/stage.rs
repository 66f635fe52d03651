//! # Stage Target
//!
//! A stage copies its sources (and, with traversal on, their filtered
//! dependency closure) into one destination directory. Staging produces an
//! [`AggregateHandle`]: the copy actions plus the stage's pass-through
//! properties and the names it must be built after.
//!
//! A stage is atomic: every copy request is validated before the first one
//! is registered, so a failed stage leaves the registry untouched.

use crate::filter::TypeFilter;
use crate::graph::TargetGraph;
use crate::location::LocationResolver;
use crate::primitives::{
    DEPENDENCY, HARDCODE_DLL_PATHS, INCLUDE_TYPE, LOCATION, NAME, TRAVERSE_DEPENDENCIES,
};
use crate::project::{StageDecl, resolve_reference};
use crate::registry::{CopyRequest, VirtualTargetRegistry};
use crate::traversal::Traversal;
use crate::typesys::TypeRegistry;
use crate::{ActionId, Property, PropertySet, Requirements, StageError, TargetId, features};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// =============================================================================
// STAGE SPEC
// =============================================================================

/// A stage declaration with its options parsed and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub name: String,
    pub project: PathBuf,
    pub sources: Vec<String>,
    pub requirements: Requirements,
    pub traverse: bool,
    pub include_types: TypeFilter,
    /// Names this stage must be built after (`<dependency>`).
    pub dependencies: Vec<String>,
    pub hardcode_dll_paths: Option<bool>,
    /// Explicit `<name>` for a single staged file.
    pub rename: Option<String>,
}

impl StageSpec {
    /// Parse a stage declared in `project`.
    pub fn from_decl(project: &Path, decl: &StageDecl) -> Result<Self, StageError> {
        Self::new(&decl.name, project, decl.sources.clone(), decl.requirements.as_slice())
    }

    /// Parse and validate stage options.
    pub fn new<S: AsRef<str>>(
        name: &str,
        project: &Path,
        sources: Vec<String>,
        requirements: &[S],
    ) -> Result<Self, StageError> {
        let requirements = Requirements::parse(requirements)?;
        features::validate(&requirements.plain)?;
        // only the destination may vary with the build properties
        if let Some(conditional) = requirements
            .conditionals
            .iter()
            .find(|c| c.result.feature != LOCATION)
        {
            return Err(StageError::InvalidProperty(format!(
                "{conditional} (stage '{name}' accepts conditionals on <{LOCATION}> only)"
            )));
        }
        let plain = &requirements.plain;

        let traverse = match plain.get(TRAVERSE_DEPENDENCIES) {
            None | Some("off") => false,
            Some("on") => true,
            Some(other) => {
                return Err(StageError::InvalidProperty(
                    Property::new(TRAVERSE_DEPENDENCIES, other).to_string(),
                ));
            }
        };

        let include = plain.get_all(INCLUDE_TYPE);
        if traverse && include.is_empty() {
            return Err(StageError::MissingIncludeType {
                stage: name.to_string(),
            });
        }

        let hardcode_dll_paths = match plain.get(HARDCODE_DLL_PATHS) {
            None => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(other) => {
                return Err(StageError::InvalidProperty(
                    Property::new(HARDCODE_DLL_PATHS, other).to_string(),
                ));
            }
        };

        let rename = plain.get(NAME).map(str::to_string);
        if let Some(rename) = &rename {
            if sources.len() != 1 || traverse {
                return Err(StageError::InvalidProperty(format!(
                    "{} (stage '{name}' must have exactly one source and no traversal)",
                    Property::new(NAME, rename.as_str())
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            project: project.to_path_buf(),
            sources,
            include_types: TypeFilter::new(include),
            dependencies: plain.get_all(DEPENDENCY).into_iter().map(str::to_string).collect(),
            traverse,
            hardcode_dll_paths,
            rename,
            requirements,
        })
    }
}

// =============================================================================
// AGGREGATE HANDLE
// =============================================================================

/// Index of a handle inside a build plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HandleId(pub usize);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// What a stage hands back to the build: its copies and its edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateHandle {
    pub stage: String,
    pub project: PathBuf,
    pub actions: Vec<ActionId>,
    /// Stages that must be built first.
    pub depends_on: Vec<HandleId>,
    /// Main targets that must be built first.
    pub prerequisites: Vec<TargetId>,
    /// Properties the stage forwards to whoever consumes it.
    pub passthrough: PropertySet,
}

// =============================================================================
// STAGER
// =============================================================================

/// Turns stage specs into registered copy actions.
#[derive(Debug, Clone, Copy)]
pub struct Stager<'a> {
    pub graph: &'a TargetGraph,
    pub types: &'a TypeRegistry,
    pub resolver: LocationResolver<'a>,
}

impl Stager<'_> {
    /// Resolve one source reference of a stage.
    pub fn resolve_source(&self, spec: &StageSpec, reference: &str) -> Result<TargetId, StageError> {
        resolve_reference(self.graph, &spec.project, reference).ok_or_else(|| {
            StageError::SourceNotFound {
                owner: spec.name.clone(),
                source_ref: reference.to_string(),
            }
        })
    }

    /// Stage `spec` under the build properties `active`.
    ///
    /// The returned handle has no dependencies; the planner fills them in.
    pub fn stage(
        &self,
        spec: &StageSpec,
        active: &PropertySet,
        registry: &mut VirtualTargetRegistry,
    ) -> Result<AggregateHandle, StageError> {
        let roots = spec
            .sources
            .iter()
            .map(|s| self.resolve_source(spec, s))
            .collect::<Result<Vec<_>, _>>()?;

        let traversal = Traversal {
            enabled: spec.traverse,
            filter: &spec.include_types,
        };
        let collected = traversal.collect(self.graph, self.types, &roots)?;

        let directory =
            self.resolver
                .destination_dir(&spec.name, &spec.project, &spec.requirements, active)?;

        let mut requests = Vec::with_capacity(collected.len());
        let mut claimed: BTreeMap<PathBuf, TargetId> = BTreeMap::new();
        for id in collected {
            let target = self.graph.target(id)?;
            let request = CopyRequest {
                source: id,
                source_path: target.artifact.output.clone(),
                destination_dir: directory.clone(),
                file_name: LocationResolver::file_name(target, spec.rename.as_deref()),
            };
            let destination = request.destination();
            if let Some(first) = claimed.get(&destination) {
                if *first != id {
                    return Err(StageError::DestinationConflict {
                        destination: destination.display().to_string(),
                        first: *first,
                        second: id,
                    });
                }
            }
            registry.check(&request)?;
            claimed.insert(destination, id);
            requests.push(request);
        }

        let mut actions = Vec::with_capacity(requests.len());
        for request in requests {
            debug!(
                stage = %spec.name,
                source = %request.source_path.display(),
                destination = %request.destination().display(),
                "stage: copy"
            );
            let action = registry.register(request)?;
            if !actions.contains(&action) {
                actions.push(action);
            }
        }

        let mut passthrough = PropertySet::new();
        if let Some(hardcode) = spec.hardcode_dll_paths {
            passthrough.set(Property::new(HARDCODE_DLL_PATHS, hardcode.to_string()));
        }

        info!(
            stage = %spec.name,
            location = %directory.display(),
            copies = actions.len(),
            "stage resolved"
        );

        Ok(AggregateHandle {
            stage: spec.name.clone(),
            project: spec.project.clone(),
            actions,
            depends_on: Vec::new(),
            prerequisites: Vec::new(),
            passthrough,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
