//! # Property Set Model
//!
//! Ordered `<feature>value` collections and conditional rules of the form
//! `<condition-feature>condition-value[,...]:<feature>value`.
//!
//! Conditionals are a restricted option map: an ordered list of
//! (condition set, result) pairs evaluated by first match.

use crate::StageError;
use crate::features;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// PROPERTY
// =============================================================================

/// A single `<feature>value` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Property {
    pub feature: String,
    pub value: String,
}

impl Property {
    /// Create a property from a feature name and a value.
    #[must_use]
    pub fn new(feature: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            value: value.into(),
        }
    }

    /// Parse `<feature>value`.
    ///
    /// Both the feature name and the value must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, StageError> {
        let invalid = || StageError::InvalidProperty(raw.to_string());
        let rest = raw.trim().strip_prefix('<').ok_or_else(invalid)?;
        let (feature, value) = rest.split_once('>').ok_or_else(invalid)?;
        if feature.is_empty() || value.is_empty() || feature.contains('<') {
            return Err(invalid());
        }
        Ok(Self::new(feature, value))
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>{}", self.feature, self.value)
    }
}

impl FromStr for Property {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// PROPERTY SET
// =============================================================================

/// Ordered collection of properties.
///
/// A single-valued feature appears at most once; multi-valued features
/// (see [`features::is_multi_valued`]) may repeat with distinct values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PropertySet {
    items: Vec<Property>,
}

impl PropertySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from properties, rejecting conflicting single values.
    pub fn from_properties<I>(properties: I) -> Result<Self, StageError>
    where
        I: IntoIterator<Item = Property>,
    {
        let mut set = Self::new();
        for property in properties {
            set.insert(property)?;
        }
        Ok(set)
    }

    /// Parse a list of `<feature>value` strings.
    pub fn parse<I, S>(raw: I) -> Result<Self, StageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for item in raw {
            set.insert(Property::parse(item.as_ref())?)?;
        }
        Ok(set)
    }

    /// Insert a property.
    ///
    /// Identical duplicates are ignored. A second, different value for a
    /// single-valued feature is a `DuplicateFeature` error.
    pub fn insert(&mut self, property: Property) -> Result<(), StageError> {
        if self.contains(&property) {
            return Ok(());
        }
        if !features::is_multi_valued(&property.feature) {
            if let Some(existing) = self.get(&property.feature) {
                return Err(StageError::DuplicateFeature {
                    feature: property.feature.clone(),
                    first: existing.to_string(),
                    second: property.value,
                });
            }
        }
        self.items.push(property);
        Ok(())
    }

    /// Insert a property, replacing the value of a single-valued feature
    /// in place.
    pub fn set(&mut self, property: Property) {
        if self.contains(&property) {
            return;
        }
        if !features::is_multi_valued(&property.feature) {
            if let Some(slot) = self
                .items
                .iter_mut()
                .find(|p| p.feature == property.feature)
            {
                slot.value = property.value;
                return;
            }
        }
        self.items.push(property);
    }

    /// First value of a feature.
    #[must_use]
    pub fn get(&self, feature: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|p| p.feature == feature)
            .map(|p| p.value.as_str())
    }

    /// All values of a feature, in declaration order.
    #[must_use]
    pub fn get_all(&self, feature: &str) -> Vec<&str> {
        self.items
            .iter()
            .filter(|p| p.feature == feature)
            .map(|p| p.value.as_str())
            .collect()
    }

    /// Whether exactly this feature:value pair is present.
    #[must_use]
    pub fn contains(&self, property: &Property) -> bool {
        self.items.iter().any(|p| p == property)
    }

    /// Whether every property of `other` is present in `self`.
    #[must_use]
    pub fn contains_all(&self, other: &[Property]) -> bool {
        other.iter().all(|p| self.contains(p))
    }

    /// Copy of this set without any value of `feature`.
    #[must_use]
    pub fn without(&self, feature: &str) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|p| p.feature != feature)
                .cloned()
                .collect(),
        }
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.items.iter()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Order-independent form, used to key memoized stage instances.
    #[must_use]
    pub fn canonical(&self) -> Vec<Property> {
        let mut items = self.items.clone();
        items.sort();
        items
    }

    /// Concatenate two sets preserving first-declared order.
    ///
    /// Fails when both sets give different values to a single-valued feature.
    pub fn merge(a: &Self, b: &Self) -> Result<Self, StageError> {
        Self::from_properties(a.iter().chain(b.iter()).cloned())
    }

    /// Apply `overrides` on top of `self`.
    ///
    /// Single-valued features take the overriding value; multi-valued
    /// features accumulate.
    #[must_use]
    pub fn refine(&self, overrides: &Self) -> Self {
        let mut refined = self.clone();
        for property in overrides.iter() {
            refined.set(property.clone());
        }
        refined
    }
}

impl fmt::Display for PropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.items.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(" "))
    }
}

// =============================================================================
// CONDITIONALS
// =============================================================================

/// `<condition>...:<feature>value`: `result` applies only when every
/// condition property is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalProperty {
    pub condition: Vec<Property>,
    pub result: Property,
}

impl ConditionalProperty {
    /// Whether a raw requirement string is written in conditional form.
    #[must_use]
    pub fn is_conditional(raw: &str) -> bool {
        raw.trim_start().starts_with('<') && raw.contains(":<")
    }

    /// Parse `<a>x,<b>y:<feature>value`.
    ///
    /// The split happens at the first `:<`, so result values may themselves
    /// contain colons (e.g. `C:/dist`).
    pub fn parse(raw: &str) -> Result<Self, StageError> {
        let invalid = || StageError::InvalidProperty(raw.to_string());
        let split = raw.find(":<").ok_or_else(invalid)?;
        let (condition, result) = (&raw[..split], &raw[split + 1..]);
        let condition = condition
            .split(',')
            .map(Property::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if condition.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            condition,
            result: Property::parse(result)?,
        })
    }

    /// Whether every condition pair is present in `active`.
    #[must_use]
    pub fn matches(&self, active: &PropertySet) -> bool {
        active.contains_all(&self.condition)
    }
}

impl fmt::Display for ConditionalProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let condition: Vec<String> = self.condition.iter().map(ToString::to_string).collect();
        write!(f, "{}:{}", condition.join(","), self.result)
    }
}

/// Resolve a conditional rule against an active set.
///
/// Returns the result value of the first alternative, in declaration order,
/// whose condition is satisfied. First match, not most specific.
pub fn resolve<'a, I>(alternatives: I, active: &PropertySet) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a ConditionalProperty>,
{
    alternatives
        .into_iter()
        .find(|alt| alt.matches(active))
        .map(|alt| alt.result.value.as_str())
}

// =============================================================================
// REQUIREMENTS
// =============================================================================

/// Requirements attached to a declaration: plain properties plus ordered
/// conditionals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Requirements {
    pub plain: PropertySet,
    pub conditionals: Vec<ConditionalProperty>,
}

impl Requirements {
    /// Split raw requirement strings into plain and conditional parts.
    pub fn parse<I, S>(raw: I) -> Result<Self, StageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requirements = Self::default();
        for item in raw {
            let item = item.as_ref();
            if ConditionalProperty::is_conditional(item) {
                requirements
                    .conditionals
                    .push(ConditionalProperty::parse(item)?);
            } else {
                requirements.plain.insert(Property::parse(item)?)?;
            }
        }
        Ok(requirements)
    }

    /// Value of a single-valued feature under `active`.
    ///
    /// The first matching conditional for `feature` wins; the unconditional
    /// value is the fallback.
    #[must_use]
    pub fn resolve(&self, feature: &str, active: &PropertySet) -> Option<&str> {
        resolve(
            self.conditionals
                .iter()
                .filter(|c| c.result.feature == feature),
            active,
        )
        .or_else(|| self.plain.get(feature))
    }

    /// Plain properties refined by every matching conditional.
    #[must_use]
    pub fn evaluate(&self, active: &PropertySet) -> PropertySet {
        let mut evaluated = self.plain.clone();
        let mut decided: Vec<&str> = Vec::new();
        for conditional in self.conditionals.iter().filter(|c| c.matches(active)) {
            let feature = conditional.result.feature.as_str();
            if features::is_multi_valued(feature) {
                evaluated.set(conditional.result.clone());
            } else if !decided.contains(&feature) {
                // first match wins for single-valued features
                decided.push(feature);
                evaluated.set(conditional.result.clone());
            }
        }
        evaluated
    }

    /// Whether there are no requirements at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plain.is_empty() && self.conditionals.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
