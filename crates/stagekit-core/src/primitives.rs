//! # Primitives
//!
//! Fixed names and constants shared by the staging engine.

/// Feature holding the destination directory of a stage.
pub const LOCATION: &str = "location";

/// Feature switching transitive collection on or off.
pub const TRAVERSE_DEPENDENCIES: &str = "traverse-dependencies";

/// Multi-valued type filter applied to traversal results.
pub const INCLUDE_TYPE: &str = "include-type";

/// Multi-valued ordering/inclusion edge.
pub const DEPENDENCY: &str = "dependency";

/// Multi-valued usage-requirement-only edge.
pub const USE: &str = "use";

/// Multi-valued library edge (a build dependency).
pub const LIBRARY: &str = "library";

/// Passed through to the link step; staging does not interpret it.
pub const HARDCODE_DLL_PATHS: &str = "hardcode-dll-paths";

/// Filename override for a single-source stage.
pub const NAME: &str = "name";

/// Build variant (composite feature).
pub const VARIANT: &str = "variant";

/// Shared or static linking, selects the type produced by `lib`.
pub const LINK: &str = "link";

/// Operating system the artifacts are built for.
pub const TARGET_OS: &str = "target-os";

/// Directory, relative to a project, holding generated outputs.
pub const BUILD_DIR: &str = "bin";

/// Type given to source files whose extension is not registered.
pub const FILE_TYPE: &str = "FILE";

/// Maximum nesting of aliases and stage dependencies followed by a plan.
///
/// All expansions must be computationally bounded.
pub const MAX_EXPANSION_DEPTH: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_dir_is_relative() {
        assert!(!std::path::Path::new(BUILD_DIR).is_absolute());
    }
}
