//! # Feature Table
//!
//! Built-in features: arity, allowed values, defaults and the composite
//! expansion of `<variant>`.

use crate::primitives::{
    DEPENDENCY, HARDCODE_DLL_PATHS, INCLUDE_TYPE, LIBRARY, LINK, LOCATION, NAME, TARGET_OS,
    TRAVERSE_DEPENDENCIES, USE, VARIANT,
};
use crate::{Property, PropertySet, StageError};

/// Static description of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDef {
    pub name: &'static str,
    /// Allowed values. Empty means any value is accepted.
    pub values: &'static [&'static str],
    pub default: Option<&'static str>,
    pub multi_valued: bool,
    /// Values may be given on the command line without the feature name.
    pub implicit: bool,
}

impl FeatureDef {
    const fn single(name: &'static str) -> Self {
        Self {
            name,
            values: &[],
            default: None,
            multi_valued: false,
            implicit: false,
        }
    }

    const fn multi(name: &'static str) -> Self {
        Self {
            multi_valued: true,
            ..Self::single(name)
        }
    }

    const fn closed(
        name: &'static str,
        values: &'static [&'static str],
        default: Option<&'static str>,
        implicit: bool,
    ) -> Self {
        Self {
            name,
            values,
            default,
            multi_valued: false,
            implicit,
        }
    }

    /// Whether `value` is acceptable for this feature.
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        self.values.is_empty() || self.values.contains(&value)
    }
}

/// Every feature known to the engine.
pub const BUILTIN_FEATURES: &[FeatureDef] = &[
    FeatureDef::closed(
        VARIANT,
        &["debug", "release", "profile"],
        Some("debug"),
        true,
    ),
    FeatureDef::closed("optimization", &["off", "speed", "space"], Some("off"), false),
    FeatureDef::closed("debug-symbols", &["on", "off"], Some("on"), false),
    FeatureDef::closed("inlining", &["off", "on", "full"], Some("off"), false),
    FeatureDef::closed("profiling", &["off", "on"], Some("off"), false),
    FeatureDef::closed(LINK, &["shared", "static"], Some("shared"), true),
    FeatureDef::single(TARGET_OS),
    FeatureDef::closed(HARDCODE_DLL_PATHS, &["true", "false"], None, false),
    FeatureDef::closed(TRAVERSE_DEPENDENCIES, &["on", "off"], None, false),
    FeatureDef::single(LOCATION),
    FeatureDef::single(NAME),
    FeatureDef::multi(INCLUDE_TYPE),
    FeatureDef::multi(DEPENDENCY),
    FeatureDef::multi(USE),
    FeatureDef::multi(LIBRARY),
    FeatureDef::multi("define"),
    FeatureDef::multi("include"),
    FeatureDef::multi("source"),
];

/// Look up a built-in feature.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static FeatureDef> {
    BUILTIN_FEATURES.iter().find(|f| f.name == name)
}

/// Whether a feature may carry several values. Unknown features are single.
#[must_use]
pub fn is_multi_valued(name: &str) -> bool {
    lookup(name).is_some_and(|f| f.multi_valued)
}

/// Feature owning an implicit value such as `release` or `static`.
#[must_use]
pub fn implicit_feature(value: &str) -> Option<&'static str> {
    BUILTIN_FEATURES
        .iter()
        .find(|f| f.implicit && f.values.contains(&value))
        .map(|f| f.name)
}

/// Components implied by a variant.
#[must_use]
pub fn variant_components(variant: &str) -> &'static [(&'static str, &'static str)] {
    match variant {
        "release" => &[
            ("optimization", "speed"),
            ("debug-symbols", "off"),
            ("inlining", "full"),
            ("define", "NDEBUG"),
        ],
        "profile" => &[
            ("optimization", "speed"),
            ("debug-symbols", "on"),
            ("inlining", "full"),
            ("profiling", "on"),
            ("define", "NDEBUG"),
        ],
        _ => &[
            ("optimization", "off"),
            ("debug-symbols", "on"),
            ("inlining", "off"),
        ],
    }
}

/// Operating system of the host, in `<target-os>` spelling.
#[must_use]
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Check every value of a closed feature.
pub fn validate(set: &PropertySet) -> Result<(), StageError> {
    for property in set.iter() {
        if let Some(def) = lookup(&property.feature) {
            if !def.accepts(&property.value) {
                return Err(StageError::InvalidProperty(property.to_string()));
            }
        }
    }
    Ok(())
}

/// Expand a raw property set into a full build property set.
///
/// Explicit values always win. The variant's components fill features that
/// were not given, then defaults fill the rest.
pub fn expand(raw: &PropertySet) -> Result<PropertySet, StageError> {
    validate(raw)?;
    let mut expanded = raw.clone();

    let variant = raw
        .get(VARIANT)
        .map(str::to_string)
        .or_else(|| lookup(VARIANT).and_then(|f| f.default).map(str::to_string))
        .unwrap_or_default();
    expanded.set(Property::new(VARIANT, variant.as_str()));

    for (feature, value) in variant_components(&variant) {
        if is_multi_valued(feature) || raw.get(feature).is_none() {
            expanded.set(Property::new(*feature, *value));
        }
    }

    for def in BUILTIN_FEATURES {
        if let Some(default) = def.default {
            if expanded.get(def.name).is_none() {
                expanded.set(Property::new(def.name, default));
            }
        }
    }

    if expanded.get(TARGET_OS).is_none() {
        expanded.set(Property::new(TARGET_OS, host_os()));
    }

    Ok(expanded)
}
