//! Error types for tz-intake
//!
//! Every remote call and every state-machine request resolves to one of
//! these variants. Polling treats `Transport` and `MalformedResponse` as
//! transient; everything else is surfaced to the caller.

use crate::models::IntakeState;
use thiserror::Error;

/// Intake error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    /// Rejected before any network call (e.g. no file chosen)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connectivity failure or non-2xx response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered but reported a failure
    #[error("Server error: {0}")]
    ServerReported(String),

    /// Response body could not be understood
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Request not allowed in the session's current state
    #[error("Cannot {event} while session is {state}")]
    InvalidTransition {
        state: IntakeState,
        event: &'static str,
    },
}

impl IntakeError {
    /// Human-readable message without the category prefix
    pub fn message(&self) -> String {
        match self {
            IntakeError::Validation(msg)
            | IntakeError::Transport(msg)
            | IntakeError::ServerReported(msg)
            | IntakeError::MalformedResponse(msg) => msg.clone(),
            IntakeError::InvalidTransition { .. } => self.to_string(),
        }
    }

    /// Whether a failed poll with this error should simply be retried next tick
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IntakeError::Transport(_) | IntakeError::MalformedResponse(_)
        )
    }
}

/// Result type for intake operations
pub type IntakeResult<T> = Result<T, IntakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_strips_category() {
        let err = IntakeError::ServerReported("Aucun fichier".to_string());
        assert_eq!(err.message(), "Aucun fichier");
        assert_eq!(err.to_string(), "Server error: Aucun fichier");
    }

    #[test]
    fn test_transient_classification() {
        assert!(IntakeError::Transport("timeout".into()).is_transient());
        assert!(IntakeError::MalformedResponse("x".into()).is_transient());
        assert!(!IntakeError::ServerReported("x".into()).is_transient());
        assert!(!IntakeError::Validation("x".into()).is_transient());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = IntakeError::InvalidTransition {
            state: IntakeState::Idle,
            event: "request analysis",
        };
        assert_eq!(err.message(), "Cannot request analysis while session is idle");
    }
}
