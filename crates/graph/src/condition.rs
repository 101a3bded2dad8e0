//! Release-channel gating
//!
//! A stage restricted by a condition is still expanded for every run, but
//! its instances are planned as skipped rather than dropped, so the run
//! ledger accounts for them.

use shipwright_errors::GraphError;
use shipwright_types::ReleaseTag;

use crate::spec::ConditionSpec;

/// A validated stage condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageCondition {
    /// Run on every channel
    Always,
    /// Run for release candidates and final releases only
    StableOnly,
    /// Run for releases at or above a `major.minor` series
    MinSeries { major: u32, minor: u32 },
}

impl StageCondition {
    pub(crate) fn from_spec(stage: &str, spec: Option<&ConditionSpec>) -> Result<Self, GraphError> {
        let Some(spec) = spec else {
            return Ok(Self::Always);
        };
        match spec {
            ConditionSpec::Named(name) => match name.as_str() {
                "always" => Ok(Self::Always),
                "stable-only" => Ok(Self::StableOnly),
                other => Err(GraphError::InvalidCondition {
                    stage: stage.to_string(),
                    message: format!("unknown condition: {other}"),
                }),
            },
            ConditionSpec::MinSeries { min_series } => {
                let (major, minor) =
                    parse_series(min_series).ok_or_else(|| GraphError::InvalidCondition {
                        stage: stage.to_string(),
                        message: format!("min-series must be MAJOR.MINOR, got: {min_series}"),
                    })?;
                Ok(Self::MinSeries { major, minor })
            }
        }
    }

    /// Whether a release tag passes this condition
    #[must_use]
    pub fn allows(&self, tag: &ReleaseTag) -> bool {
        match self {
            Self::Always => true,
            Self::StableOnly => tag.is_final() || tag.is_candidate(),
            Self::MinSeries { major, minor } => (tag.major, tag.minor) >= (*major, *minor),
        }
    }
}

fn parse_series(input: &str) -> Option<(u32, u32)> {
    let (major, minor) = input.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &str) -> ReleaseTag {
        s.parse().unwrap()
    }

    #[test]
    fn test_missing_condition_means_always() {
        let condition = StageCondition::from_spec("build", None).unwrap();
        assert_eq!(condition, StageCondition::Always);
        assert!(condition.allows(&tag("3.13.0a1")));
    }

    #[test]
    fn test_stable_only() {
        let spec = ConditionSpec::Named("stable-only".to_string());
        let condition = StageCondition::from_spec("publish", Some(&spec)).unwrap();

        assert!(!condition.allows(&tag("3.13.0a2")));
        assert!(!condition.allows(&tag("3.13.0b1")));
        assert!(condition.allows(&tag("3.13.0rc1")));
        assert!(condition.allows(&tag("3.13.0")));
    }

    #[test]
    fn test_min_series() {
        let spec = ConditionSpec::MinSeries {
            min_series: "3.13".to_string(),
        };
        let condition = StageCondition::from_spec("docs", Some(&spec)).unwrap();

        assert!(!condition.allows(&tag("3.12.9")));
        assert!(condition.allows(&tag("3.13.0a1")));
        assert!(condition.allows(&tag("3.14.0")));
        assert!(condition.allows(&tag("4.0.0")));
    }

    #[test]
    fn test_invalid_conditions_are_rejected() {
        let unknown = ConditionSpec::Named("weekends-only".to_string());
        let err = StageCondition::from_spec("build", Some(&unknown)).unwrap_err();
        assert!(err.to_string().contains("unknown condition"));

        let malformed = ConditionSpec::MinSeries {
            min_series: "3".to_string(),
        };
        let err = StageCondition::from_spec("build", Some(&malformed)).unwrap_err();
        assert!(err.to_string().contains("MAJOR.MINOR"));
    }
}
