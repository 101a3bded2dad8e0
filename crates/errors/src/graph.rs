//! Pipeline graph validation error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum GraphError {
    #[error("pipeline defines no stages")]
    Empty,

    #[error("duplicate stage instance name: {name}")]
    DuplicateInstance { name: String },

    #[error("stage {stage} consumes {artifact}, which no stage produces")]
    UnknownProducer { stage: String, artifact: String },

    #[error("stage {stage} consumes {artifact}, but its producer {producer} is gated off for this release")]
    GatedDependency {
        stage: String,
        artifact: String,
        producer: String,
    },

    #[error("stage {stage} needs unknown stage: {needs}")]
    UnknownNeeds { stage: String, needs: String },

    #[error("artifact {artifact} is produced by both {first} and {second}")]
    DuplicateArtifact {
        artifact: String,
        first: String,
        second: String,
    },

    #[error("dependency cycle involving stages: {stages}")]
    Cycle { stages: String },

    #[error("stage {stage} references unknown matrix axis: {axis}")]
    UnknownAxis { stage: String, axis: String },

    #[error("matrix axis {axis} has no values")]
    EmptyAxis { axis: String },

    #[error("invalid artifact template in stage {stage}: {template} ({message})")]
    InvalidTemplate {
        stage: String,
        template: String,
        message: String,
    },

    #[error("invalid condition on stage {stage}: {message}")]
    InvalidCondition { stage: String, message: String },

    #[error("invalid stage {stage}: {message}")]
    InvalidStage { stage: String, message: String },

    #[error("failed to parse pipeline: {message}")]
    ParseError { message: String },
}

impl UserFacingError for GraphError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownProducer { .. } => {
                Some("Every consumed artifact must be listed in some stage's `produces`.")
            }
            Self::GatedDependency { .. } => {
                Some("Gate the consumer under the same condition as its producer.")
            }
            Self::DuplicateArtifact { .. } => {
                Some("Give the colliding outputs distinct names, or vary them per matrix axis.")
            }
            Self::Cycle { .. } => Some("Break the cycle by removing one of the listed inputs."),
            Self::InvalidTemplate { .. } => {
                Some("Artifact templates may reference declared axes and `${variant}` only.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Empty => "graph.empty",
            Self::DuplicateInstance { .. } => "graph.duplicate_instance",
            Self::UnknownProducer { .. } => "graph.unknown_producer",
            Self::GatedDependency { .. } => "graph.gated_dependency",
            Self::UnknownNeeds { .. } => "graph.unknown_needs",
            Self::DuplicateArtifact { .. } => "graph.duplicate_artifact",
            Self::Cycle { .. } => "graph.cycle",
            Self::UnknownAxis { .. } => "graph.unknown_axis",
            Self::EmptyAxis { .. } => "graph.empty_axis",
            Self::InvalidTemplate { .. } => "graph.invalid_template",
            Self::InvalidCondition { .. } => "graph.invalid_condition",
            Self::InvalidStage { .. } => "graph.invalid_stage",
            Self::ParseError { .. } => "graph.parse_error",
        };
        Some(code)
    }
}
