//! # Type Filter
//!
//! Decides whether a target's type, or one of its registered ancestors,
//! appears in an `<include-type>` list.

use crate::graph::Target;
use crate::typesys::TypeRegistry;
use std::collections::BTreeSet;

/// An include-list of type names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeFilter {
    include: BTreeSet<String>,
}

impl TypeFilter {
    /// Build a filter from type names.
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: types.into_iter().map(Into::into).collect(),
        }
    }

    /// An empty filter matches nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    /// Whether `target` is of an included type.
    #[must_use]
    pub fn matches(&self, target: &Target, types: &TypeRegistry) -> bool {
        self.matches_type(&target.target_type, types)
    }

    /// Whether a type name, or any ancestor, is included.
    #[must_use]
    pub fn matches_type(&self, type_name: &str, types: &TypeRegistry) -> bool {
        types
            .ancestors(type_name)
            .iter()
            .any(|t| self.include.contains(*t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lib_includes_shared_and_static() {
        let types = TypeRegistry::new();
        let filter = TypeFilter::new(["EXE", "LIB"]);
        assert!(filter.matches_type("SHARED_LIB", &types));
        assert!(filter.matches_type("STATIC_LIB", &types));
        assert!(filter.matches_type("EXE", &types));
        assert!(!filter.matches_type("CPP", &types));
        assert!(!filter.matches_type("H", &types));
    }

    #[test]
    fn derived_user_type_matches_base() {
        let mut types = TypeRegistry::new();
        types.register("MYEXE", Some("EXE"), &[]).expect("register");
        assert!(TypeFilter::new(["EXE"]).matches_type("MYEXE", &types));
        assert!(!TypeFilter::new(["MYEXE"]).matches_type("EXE", &types));
    }

    #[test]
    fn empty_filter_matches_nothing() {
        let types = TypeRegistry::new();
        let filter = TypeFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.matches_type("EXE", &types));
    }
}
