//! # Type Registry
//!
//! Target types form a hierarchy (`SHARED_LIB` derives from `LIB`, a
//! user-registered `MYEXE` may derive from `EXE`). Each type can carry
//! conditional generated-suffix rules evaluated against the properties a
//! target is built with.
//!
//! Suffix lookup walks the type and its ancestors: user rules first (in
//! registration order, first match), then the built-in platform defaults.

use crate::primitives::{FILE_TYPE, LINK};
use crate::{Property, PropertySet, StageError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// A registered type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDef {
    pub name: String,
    pub base: Option<String>,
    pub extensions: Vec<String>,
}

/// `<condition>... : suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuffixRule {
    pub condition: Vec<Property>,
    pub suffix: String,
}

impl SuffixRule {
    fn new(condition: &[(&str, &str)], suffix: &str) -> Self {
        Self {
            condition: condition
                .iter()
                .map(|(f, v)| Property::new(*f, *v))
                .collect(),
            suffix: suffix.to_string(),
        }
    }
}

/// Registry of target types and their generated suffixes.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeDef>,
    suffix_rules: BTreeMap<String, Vec<SuffixRule>>,
    default_suffixes: BTreeMap<String, Vec<SuffixRule>>,
    extensions: BTreeMap<String, String>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// A registry holding the built-in types.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.install_builtins();
        registry
    }

    /// A registry without any type.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
            suffix_rules: BTreeMap::new(),
            default_suffixes: BTreeMap::new(),
            extensions: BTreeMap::new(),
        }
    }

    fn install_builtins(&mut self) {
        let builtins: [(&str, Option<&str>, &[&str]); 9] = [
            (FILE_TYPE, None, &[]),
            ("CPP", None, &["cpp", "cxx", "cc"]),
            ("C", None, &["c"]),
            ("H", None, &["h", "hpp", "hxx"]),
            ("OBJ", None, &[]),
            ("EXE", None, &[]),
            ("LIB", None, &[]),
            ("SHARED_LIB", Some("LIB"), &[]),
            ("STATIC_LIB", Some("LIB"), &[]),
        ];
        for (name, base, extensions) in builtins {
            self.insert_type(name, base, extensions);
        }

        let windows = [("target-os", "windows")];
        let darwin = [("target-os", "darwin")];
        self.default_suffixes.insert(
            "EXE".to_string(),
            vec![SuffixRule::new(&windows, "exe"), SuffixRule::new(&[], "")],
        );
        self.default_suffixes.insert(
            "OBJ".to_string(),
            vec![SuffixRule::new(&windows, "obj"), SuffixRule::new(&[], "o")],
        );
        self.default_suffixes.insert(
            "SHARED_LIB".to_string(),
            vec![
                SuffixRule::new(&windows, "dll"),
                SuffixRule::new(&darwin, "dylib"),
                SuffixRule::new(&[], "so"),
            ],
        );
        self.default_suffixes.insert(
            "STATIC_LIB".to_string(),
            vec![SuffixRule::new(&windows, "lib"), SuffixRule::new(&[], "a")],
        );
    }

    fn insert_type(&mut self, name: &str, base: Option<&str>, extensions: &[&str]) {
        for ext in extensions {
            self.extensions.insert((*ext).to_string(), name.to_string());
        }
        self.types.insert(
            name.to_string(),
            TypeDef {
                name: name.to_string(),
                base: base.map(str::to_string),
                extensions: extensions.iter().map(|e| (*e).to_string()).collect(),
            },
        );
    }

    /// Register a new type, optionally deriving from an existing one.
    ///
    /// The base must already be registered, so the hierarchy cannot contain
    /// cycles.
    pub fn register(
        &mut self,
        name: &str,
        base: Option<&str>,
        extensions: &[&str],
    ) -> Result<(), StageError> {
        if self.types.contains_key(name) {
            return Err(StageError::DuplicateType(name.to_string()));
        }
        if let Some(base) = base {
            if !self.types.contains_key(base) {
                return Err(StageError::UnknownType(base.to_string()));
            }
        }
        self.insert_type(name, base, extensions);
        Ok(())
    }

    /// Add a conditional generated-suffix rule for a type.
    pub fn set_generated_suffix(
        &mut self,
        type_name: &str,
        condition: Vec<Property>,
        suffix: &str,
    ) -> Result<(), StageError> {
        if !self.types.contains_key(type_name) {
            return Err(StageError::UnknownType(type_name.to_string()));
        }
        self.suffix_rules
            .entry(type_name.to_string())
            .or_default()
            .push(SuffixRule {
                condition,
                suffix: suffix.to_string(),
            });
        Ok(())
    }

    /// Whether a type is registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Look up a type definition.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&TypeDef> {
        self.types.get(type_name)
    }

    /// All types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    /// The type followed by its ancestors, nearest first.
    #[must_use]
    pub fn ancestors<'a>(&'a self, type_name: &'a str) -> Vec<&'a str> {
        let mut chain = vec![type_name];
        let mut current = type_name;
        while let Some(base) = self.types.get(current).and_then(|t| t.base.as_deref()) {
            if chain.contains(&base) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain
    }

    /// Whether `type_name` is `base` or derives from it.
    #[must_use]
    pub fn is_derived(&self, type_name: &str, base: &str) -> bool {
        self.ancestors(type_name).contains(&base)
    }

    /// Suffix generated for a type built with `properties`.
    ///
    /// `None` when the matching rule gives an empty suffix or no rule matches.
    #[must_use]
    pub fn generated_suffix(&self, type_name: &str, properties: &PropertySet) -> Option<String> {
        let chain = self.ancestors(type_name);
        let rule_sets = [&self.suffix_rules, &self.default_suffixes];
        rule_sets
            .iter()
            .flat_map(|rules| chain.iter().filter_map(move |t| rules.get(*t)))
            .flatten()
            .find(|rule| properties.contains_all(&rule.condition))
            .map(|rule| rule.suffix.clone())
            .filter(|suffix| !suffix.is_empty())
    }

    /// Type of a source file, from its extension.
    #[must_use]
    pub fn type_for_file(&self, path: &Path) -> String {
        let Some(ext) = path.extension() else {
            return FILE_TYPE.to_string();
        };
        let ext = ext.to_string_lossy();
        self.extensions
            .get(&*ext)
            .cloned()
            .unwrap_or_else(|| FILE_TYPE.to_string())
    }

    /// Type produced by a main-target rule.
    ///
    /// `lib` follows `<link>`; any other rule names a registered type.
    pub fn main_target_type(
        &self,
        rule: &str,
        properties: &PropertySet,
    ) -> Result<String, StageError> {
        let type_name = match rule {
            "lib" => match properties.get(LINK) {
                Some("static") => "STATIC_LIB".to_string(),
                _ => "SHARED_LIB".to_string(),
            },
            other => other.to_uppercase(),
        };
        if self.contains(&type_name) {
            Ok(type_name)
        } else {
            Err(StageError::UnknownType(rule.to_string()))
        }
    }
}
