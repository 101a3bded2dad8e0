use serde::{Deserialize, Serialize};

use crate::EventSource;
use shipwright_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Optional stable error code once taxonomy lands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

// Declare all domain modules
pub mod general;
pub mod pipeline;
pub mod publish;
pub mod signing;
pub mod stage;
pub mod store;

// Re-export all domain events
pub use general::*;
pub use pipeline::*;
pub use publish::*;
pub use signing::*;
pub use stage::*;
pub use store::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Pipeline planning and run lifecycle events
    Pipeline(PipelineEvent),

    /// Stage instance execution events
    Stage(StageEvent),

    /// Artifact store events (publication, materialization, verification)
    Store(StoreEvent),

    /// Signing gate events
    Signing(SigningEvent),

    /// Upload, index merge, and CDN purge events
    Publish(PublishEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Pipeline(_) => EventSource::PIPELINE,
            Self::Stage(_) => EventSource::STAGE,
            Self::Store(_) => EventSource::STORE,
            Self::Signing(_) => EventSource::SIGNING,
            Self::Publish(_) => EventSource::PUBLISH,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            // Error-level events
            Self::General(GeneralEvent::Error { .. })
            | Self::Pipeline(PipelineEvent::PlanInvalid { .. } | PipelineEvent::ToolMissing { .. })
            | Self::Stage(StageEvent::Failed { .. })
            | Self::Signing(SigningEvent::Failed { .. }) => Level::ERROR,

            // Warning-level events
            Self::General(GeneralEvent::Warning { .. })
            | Self::Publish(PublishEvent::DuplicateEntry { .. })
            | Self::Signing(SigningEvent::RetryScheduled { .. })
            | Self::Store(StoreEvent::VerificationCompleted { .. }) => Level::WARN,

            // Debug-level events (command chatter, internal state)
            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Stage(
                StageEvent::CommandOutput { .. } | StageEvent::InputsMaterialized { .. },
            )
            | Self::Store(StoreEvent::ArtifactFetched { .. })
            | Self::Signing(SigningEvent::Submitted { .. }) => Level::DEBUG,

            // Default to INFO for most events
            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "shipwright::events::general",
            Self::Pipeline(_) => "shipwright::events::pipeline",
            Self::Stage(_) => "shipwright::events::stage",
            Self::Store(_) => "shipwright::events::store",
            Self::Signing(_) => "shipwright::events::signing",
            Self::Publish(_) => "shipwright::events::publish",
        }
    }

    /// Get structured fields for logging (simplified for now)
    #[must_use]
    pub fn log_fields(&self) -> String {
        format!("{self:?}")
    }
}
