//! Integration tests for events

#[cfg(test)]
mod tests {
    use shipwright_events::*;

    #[tokio::test]
    async fn test_event_emitter_helpers() {
        let (tx, mut rx) = channel();

        tx.emit_error("test error");
        tx.emit_debug("test debug");

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(
            event1,
            AppEvent::General(GeneralEvent::Error { .. })
        ));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[test]
    fn test_event_serialization_tags_domain() {
        let event = AppEvent::Signing(SigningEvent::SigningSkipped {
            instance: "sign_bin_amd64".to_string(),
            group: "unsigned".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "signing");
        assert_eq!(json["event"]["type"], "SigningSkipped");
    }

    #[test]
    fn test_failure_context_from_error() {
        use shipwright_errors::{StageError, UserFacingError};

        let err = StageError::CommandFailed {
            stage: "build".to_string(),
            code: 2,
        };
        let failure = FailureContext::from_error(&err);

        assert_eq!(failure.code.as_deref(), Some("stage.command_failed"));
        assert!(!failure.retryable);
        assert_eq!(failure.message, err.user_message());
    }

    #[test]
    fn test_log_levels() {
        let failed = AppEvent::Stage(StageEvent::Skipped {
            instance: "pack".to_string(),
            reason: "upstream build failed".to_string(),
        });
        assert_eq!(failed.log_level(), tracing::Level::INFO);

        let error = AppEvent::General(GeneralEvent::error("boom"));
        assert_eq!(error.log_level(), tracing::Level::ERROR);
    }
}
