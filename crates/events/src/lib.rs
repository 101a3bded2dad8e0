#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in shipwright
//!
//! This crate provides a domain-driven event system with tracing integration
//! and clean separation of concerns. All output goes through events - no
//! direct logging or printing is allowed outside the CLI.
//!
//! ## Architecture
//!
//! - **Domain-driven events**: Events grouped by functional domain (Pipeline, Stage, ...)
//! - **Unified `EventEmitter` trait**: Single, consistent API for all event emissions
//! - **Tracing integration**: Built-in structured logging with intelligent log levels

pub mod meta;
pub use meta::EventSource;

// Import the domain-driven event system
pub mod events;
pub use events::{
    // Domain event types
    AppEvent,
    FailureContext,
    GeneralEvent,
    PipelineEvent,
    PublishEvent,
    SigningEvent,
    StageEvent,
    StoreEvent,
};

use tokio::sync::mpsc::UnboundedSender;

/// Type alias for event sender using the `AppEvent` system
pub type EventSender = UnboundedSender<AppEvent>;

/// Type alias for event receiver using the `AppEvent` system
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AppEvent>;

/// Create a new event channel with the `AppEvent` system
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events throughout the shipwright system
///
/// This trait provides a single, consistent API for emitting events regardless of
/// whether you have a raw `EventSender` or a struct that contains one.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(event);
        }
    }

    /// Emit a debug log event
    fn emit_debug(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::debug(message)));
    }

    /// Emit a debug log event with context
    fn emit_debug_with_context(
        &self,
        message: impl Into<String>,
        context: std::collections::HashMap<String, String>,
    ) {
        self.emit(AppEvent::General(GeneralEvent::debug_with_context(
            message, context,
        )));
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message)));
    }

    /// Emit a warning event with context
    fn emit_warning_with_context(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning_with_context(
            message, context,
        )));
    }

    /// Emit an error event
    fn emit_error(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error(message)));
    }

    /// Emit an error event with details
    fn emit_error_with_details(&self, message: impl Into<String>, details: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error_with_details(
            message, details,
        )));
    }

    /// Emit an operation started event
    fn emit_operation_started(&self, operation: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::OperationStarted {
            operation: operation.into(),
        }));
    }

    /// Emit an operation completed event
    fn emit_operation_completed(&self, operation: impl Into<String>, success: bool) {
        self.emit(AppEvent::General(GeneralEvent::OperationCompleted {
            operation: operation.into(),
            success,
        }));
    }

    /// Emit an operation failed event
    fn emit_operation_failed(&self, operation: impl Into<String>, error: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::OperationFailed {
            operation: operation.into(),
            error: error.into(),
        }));
    }

    /// Emit a stage instance started event
    fn emit_stage_started(
        &self,
        instance: impl Into<String>,
        stage: impl Into<String>,
        variant: impl Into<String>,
        work_dir: std::path::PathBuf,
    ) {
        self.emit(AppEvent::Stage(StageEvent::Started {
            instance: instance.into(),
            stage: stage.into(),
            variant: variant.into(),
            work_dir,
        }));
    }

    /// Emit a stage instance completed event
    fn emit_stage_completed(
        &self,
        instance: impl Into<String>,
        artifacts: Vec<String>,
        duration: std::time::Duration,
    ) {
        self.emit(AppEvent::Stage(StageEvent::Completed {
            instance: instance.into(),
            artifacts,
            duration,
        }));
    }

    /// Emit a stage instance failed event
    fn emit_stage_failed(&self, instance: impl Into<String>, failure: FailureContext) {
        self.emit(AppEvent::Stage(StageEvent::Failed {
            instance: instance.into(),
            failure,
        }));
    }

    /// Emit a stage instance skipped event
    fn emit_stage_skipped(&self, instance: impl Into<String>, reason: impl Into<String>) {
        self.emit(AppEvent::Stage(StageEvent::Skipped {
            instance: instance.into(),
            reason: reason.into(),
        }));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
/// This allows `EventSender` to be used directly where `EventEmitter` is expected
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}
