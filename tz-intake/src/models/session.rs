//! Intake session state
//!
//! Session progresses through: IDLE → UPLOADING → UPLOADED → ANALYZING → DONE | FAILED
//!
//! Fields are only writable from inside the crate; the state machine is the
//! single mutator and keeps `result` tied to `Done` and `error` tied to
//! `Failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::remote::ReceiptResult;
use crate::error::{IntakeError, IntakeResult};

/// Opaque session identifier handed out by the server (the PIN shown under the QR code)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token; blank tokens are rejected
    pub fn new(raw: impl Into<String>) -> IntakeResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IntakeError::Validation(
                "session token must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeState {
    /// Waiting for a file
    Idle,
    /// Upload request in flight
    Uploading,
    /// Server holds the file
    Uploaded,
    /// Analysis requested, waiting for the server to converge
    Analyzing,
    /// Result available
    Done,
    /// Server reported a failed analysis
    Failed,
}

impl IntakeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, IntakeState::Done | IntakeState::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            IntakeState::Idle => "idle",
            IntakeState::Uploading => "uploading",
            IntakeState::Uploaded => "uploaded",
            IntakeState::Analyzing => "analyzing",
            IntakeState::Done => "done",
            IntakeState::Failed => "failed",
        }
    }
}

impl fmt::Display for IntakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State transition record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: IntakeState,
    pub to: IntakeState,
    pub at: DateTime<Utc>,
}

/// One user's attempt to process a single receipt (in-memory only)
#[derive(Debug, Clone)]
pub struct IntakeSession {
    pub(crate) token: SessionToken,
    pub(crate) state: IntakeState,
    pub(crate) result: Option<ReceiptResult>,
    pub(crate) error: Option<String>,
    /// Last stage name reported by the server
    pub(crate) remote_stage: Option<String>,
    /// Last progress percentage reported by the server
    pub(crate) progress: Option<u8>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl IntakeSession {
    pub(crate) fn new(token: SessionToken) -> Self {
        let now = Utc::now();
        Self {
            token,
            state: IntakeState::Idle,
            result: None,
            error: None,
            remote_stage: None,
            progress: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn state(&self) -> IntakeState {
        self.state
    }

    pub fn result(&self) -> Option<&ReceiptResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn remote_stage(&self) -> Option<&str> {
        self.remote_stage.as_deref()
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// `result` iff Done, `error` iff Failed
    pub fn invariants_hold(&self) -> bool {
        self.result.is_some() == (self.state == IntakeState::Done)
            && self.error.is_some() == (self.state == IntakeState::Failed)
    }

    pub fn snapshot(&self) -> IntakeSnapshot {
        IntakeSnapshot {
            token: self.token.to_string(),
            state: self.state,
            remote_stage: self.remote_stage.clone(),
            progress: self.progress,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Fully-formed view of a session handed to presenters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeSnapshot {
    pub token: String,
    pub state: IntakeState,
    pub remote_stage: Option<String>,
    pub progress: Option<u8>,
    pub result: Option<ReceiptResult>,
    pub error: Option<String>,
}

impl IntakeSnapshot {
    /// Label for in-progress display: the server's stage when known
    pub fn status_label(&self) -> &str {
        match (&self.remote_stage, self.state.is_terminal()) {
            (Some(stage), false) => stage.as_str(),
            _ => self.state.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_rejects_blank() {
        assert!(SessionToken::new("   ").is_err());
        assert_eq!(SessionToken::new(" 042917 ").unwrap().as_str(), "042917");
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = IntakeSession::new(SessionToken::new("042917").unwrap());
        assert_eq!(session.state(), IntakeState::Idle);
        assert!(session.invariants_hold());
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_invariant_detects_stray_result() {
        let mut session = IntakeSession::new(SessionToken::new("042917").unwrap());
        session.result = Some(ReceiptResult::default());
        assert!(!session.invariants_hold());
    }

    #[test]
    fn test_status_label_prefers_remote_stage() {
        let mut session = IntakeSession::new(SessionToken::new("042917").unwrap());
        session.state = IntakeState::Uploaded;
        assert_eq!(session.snapshot().status_label(), "uploaded");

        session.remote_stage = Some("analyzing".to_string());
        assert_eq!(session.snapshot().status_label(), "analyzing");
    }
}
