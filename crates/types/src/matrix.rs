//! Matrix axes and variant fan-out types
//!
//! A stage may declare matrix axes (architecture, build profile, interpreter
//! flavor). Each axis value carries a short suffix used to name the per-variant
//! stage instances and artifacts, e.g. `amd64`, `d`, or `t`. A `Variant` is one
//! concrete assignment of values to axes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One selectable value on a matrix axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisValue {
    /// Value exported to stage commands (e.g. `amd64`, `debug`)
    pub value: String,
    /// Name fragment contributed to instance and artifact names; may be empty
    pub suffix: String,
}

impl AxisValue {
    pub fn new(value: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            suffix: suffix.into(),
        }
    }
}

/// A named matrix axis with its values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAxis {
    pub name: String,
    pub values: Vec<AxisValue>,
}

impl MatrixAxis {
    pub fn new(name: impl Into<String>, values: Vec<AxisValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// One assignment of values to a stage's axes, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Variant {
    pairs: Vec<(String, AxisValue)>,
}

impl Variant {
    /// The empty variant of a stage with no matrix
    #[must_use]
    pub fn empty() -> Self {
        Self { pairs: Vec::new() }
    }

    #[must_use]
    pub fn new(pairs: Vec<(String, AxisValue)>) -> Self {
        Self { pairs }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Look up the value assigned to an axis
    #[must_use]
    pub fn get(&self, axis: &str) -> Option<&AxisValue> {
        self.pairs
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, v)| v)
    }

    /// `(axis, value)` pairs in declaration order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &AxisValue)> {
        self.pairs.iter().map(|(name, v)| (name.as_str(), v))
    }

    /// Joined suffix of all axis values, `_`-separated, empty parts dropped
    ///
    /// `{arch: amd64, profile: d}` yields `amd64_d`; an all-empty assignment
    /// yields the empty string.
    #[must_use]
    pub fn suffix(&self) -> String {
        let parts: Vec<&str> = self
            .pairs
            .iter()
            .map(|(_, v)| v.suffix.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        parts.join("_")
    }

    /// Append this variant's suffix to a base name
    ///
    /// `decorate("unsigned_bin")` with suffix `amd64_d` gives
    /// `unsigned_bin_amd64_d`; with an empty suffix the base is unchanged.
    #[must_use]
    pub fn decorate(&self, base: &str) -> String {
        let suffix = self.suffix();
        if suffix.is_empty() {
            base.to_string()
        } else {
            format!("{base}_{suffix}")
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pairs.is_empty() {
            return write!(f, "(default)");
        }
        let parts: Vec<String> = self
            .pairs
            .iter()
            .map(|(name, v)| format!("{name}={}", v.value))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}
