//! Pipeline declaration model
//!
//! A pipeline is declared once in TOML and expanded per run. Stage tables
//! map a stage name to its ordering edges, artifact templates, matrix axes,
//! and either a command list or a signing directive:
//!
//! ```toml
//! name = "cpython"
//!
//! [axes]
//! arch = ["amd64", "arm64"]
//! profile = [
//!     { value = "release", suffix = "" },
//!     { value = "debug", suffix = "d" },
//! ]
//!
//! [stages.build]
//! matrix = ["arch", "profile"]
//! produces = ["unsigned_bin"]
//! commands = [["make", "ARCH=${arch}", "PROFILE=${profile}"]]
//!
//! [stages.sign]
//! matrix = ["arch", "profile"]
//! consumes = ["unsigned_bin"]
//! produces = ["bin"]
//! sign = true
//! ```

use serde::{Deserialize, Serialize};
use shipwright_errors::{Error, GraphError};
use shipwright_types::AxisValue;
use std::collections::BTreeMap;
use std::path::Path;

/// One axis value as written in the pipeline file
///
/// A bare string doubles as its own suffix; the table form selects the
/// suffix explicitly, including the empty suffix for the default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValueSpec {
    Plain(String),
    Full {
        value: String,
        #[serde(default)]
        suffix: String,
    },
}

impl AxisValueSpec {
    #[must_use]
    pub fn to_axis_value(&self) -> AxisValue {
        match self {
            Self::Plain(value) => AxisValue::new(value.clone(), value.clone()),
            Self::Full { value, suffix } => AxisValue::new(value.clone(), suffix.clone()),
        }
    }
}

/// Release-channel condition as written in the pipeline file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    /// `condition = "always"` or `condition = "stable-only"`
    Named(String),
    /// `condition = { min-series = "3.13" }`
    MinSeries {
        #[serde(rename = "min-series")]
        min_series: String,
    },
}

/// One declared stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpec {
    /// Ordering edges to other stages, on top of artifact flow
    #[serde(default)]
    pub needs: Vec<String>,
    /// Artifact name templates consumed from upstream stages
    #[serde(default)]
    pub consumes: Vec<String>,
    /// Artifact name templates published on success
    #[serde(default)]
    pub produces: Vec<String>,
    /// Axis names to fan out over, in suffix order
    #[serde(default)]
    pub matrix: Vec<String>,
    /// Ordered argv lists; run stages only
    #[serde(default)]
    pub commands: Vec<Vec<String>>,
    /// Route consumed artifacts through the signing gate instead of commands
    #[serde(default)]
    pub sign: bool,
    #[serde(default)]
    pub condition: Option<ConditionSpec>,
    /// Informational pool label carried into events and the run ledger
    #[serde(default)]
    pub pool: Option<String>,
    /// Credential group override for sign stages; the run default applies
    /// when unset
    #[serde(default)]
    pub signing_group: Option<String>,
}

/// A parsed pipeline declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default)]
    pub axes: BTreeMap<String, Vec<AxisValueSpec>>,
    #[serde(default)]
    pub stages: BTreeMap<String, StageSpec>,
}

impl PipelineSpec {
    /// Parse a pipeline declaration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid TOML for this model.
    pub fn from_toml_str(input: &str) -> Result<Self, Error> {
        let spec: Self = toml::from_str(input).map_err(|e| GraphError::ParseError {
            message: e.to_string(),
        })?;
        Ok(spec)
    }

    /// Load a pipeline declaration from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipeline() {
        let toml = r#"
name = "demo"

[axes]
arch = ["amd64", "arm64"]
profile = [
    { value = "release", suffix = "" },
    { value = "debug", suffix = "d" },
]

[stages.build]
matrix = ["arch", "profile"]
produces = ["unsigned_bin"]
commands = [["make", "ARCH=${arch}"]]
pool = "builders"

[stages.sign]
matrix = ["arch", "profile"]
consumes = ["unsigned_bin"]
produces = ["bin"]
sign = true
condition = "stable-only"
"#;
        let spec = PipelineSpec::from_toml_str(toml).unwrap();
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.axes["arch"].len(), 2);

        let build = &spec.stages["build"];
        assert_eq!(build.matrix, vec!["arch", "profile"]);
        assert_eq!(build.commands.len(), 1);
        assert_eq!(build.pool.as_deref(), Some("builders"));
        assert!(!build.sign);
        assert!(build.condition.is_none());

        let sign = &spec.stages["sign"];
        assert!(sign.sign);
        assert!(sign.commands.is_empty());
        assert!(matches!(
            sign.condition,
            Some(ConditionSpec::Named(ref name)) if name == "stable-only"
        ));
    }

    #[test]
    fn test_axis_value_forms() {
        let plain = AxisValueSpec::Plain("amd64".to_string());
        let value = plain.to_axis_value();
        assert_eq!(value.value, "amd64");
        assert_eq!(value.suffix, "amd64");

        let full = AxisValueSpec::Full {
            value: "release".to_string(),
            suffix: String::new(),
        };
        let value = full.to_axis_value();
        assert_eq!(value.value, "release");
        assert_eq!(value.suffix, "");
    }

    #[test]
    fn test_min_series_condition_form() {
        let toml = r#"
name = "demo"

[stages.docs]
commands = [["mkdocs", "build"]]
condition = { min-series = "3.13" }
"#;
        let spec = PipelineSpec::from_toml_str(toml).unwrap();
        assert!(matches!(
            spec.stages["docs"].condition,
            Some(ConditionSpec::MinSeries { ref min_series }) if min_series == "3.13"
        ));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = PipelineSpec::from_toml_str("name = [not toml").unwrap_err();
        assert!(err.to_string().contains("failed to parse pipeline"));
    }
}
