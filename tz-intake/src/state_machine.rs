//! Intake workflow state machine
//!
//! IDLE → UPLOADING → UPLOADED → ANALYZING → DONE | FAILED
//!
//! The machine is the only writer of [`IntakeSession`]. It is permissive
//! about intermediate server stages and strict about convergence: once a
//! terminal state is reached every further event is ignored.
//!
//! Failed upload/analyze requests return the session to where it was
//! before the request so the caller can retry; only the server's own
//! status report can fail a session.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{AnalyzeOutcome, StatusOutcome, UploadFile, UploadOutcome, MALFORMED_STATUS};
use crate::error::{IntakeError, IntakeResult};
use crate::models::{
    IntakeSession, IntakeSnapshot, IntakeState, RemoteState, SessionToken, StateTransition,
    StatusReport,
};
use crate::presenter::SnapshotSink;

/// Error recorded when the server reports `error` without a reason
pub const ANALYSIS_FAILED: &str = "analysis failed";

/// State machine shared between the workflow controller and the poll task
pub type SharedMachine = Arc<Mutex<IntakeStateMachine>>;

/// Sequence number assigned to a status poll when it is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollTicket {
    seq: u64,
}

impl PollTicket {
    pub fn seq(self) -> u64 {
        self.seq
    }
}

/// What applying a poll outcome did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEffect {
    /// Session reached a terminal state
    Transitioned(StateTransition),
    /// Remote stage or progress changed, local state did not
    Updated,
    /// Nothing observable changed
    Unchanged,
    /// Poll request failed; retried on the next tick
    TransientFailure,
    /// A newer poll was already applied
    Stale,
    /// Session already terminal
    Ignored,
}

pub struct IntakeStateMachine {
    session: IntakeSession,
    sink: Arc<dyn SnapshotSink>,
    last_published: IntakeSnapshot,
    transitions: Vec<StateTransition>,
    /// State to restore if the in-flight analyze request fails
    analysis_rollback: Option<IntakeState>,
    next_poll_seq: u64,
    last_applied_seq: u64,
}

impl IntakeStateMachine {
    /// Create a session in `Idle` and publish its first snapshot
    pub fn new(token: SessionToken, sink: Arc<dyn SnapshotSink>) -> Self {
        let session = IntakeSession::new(token);
        let last_published = session.snapshot();
        sink.publish(&last_published);

        Self {
            session,
            sink,
            last_published,
            transitions: Vec::new(),
            analysis_rollback: None,
            next_poll_seq: 1,
            last_applied_seq: 0,
        }
    }

    pub fn into_shared(self) -> SharedMachine {
        Arc::new(Mutex::new(self))
    }

    pub fn session(&self) -> &IntakeSession {
        &self.session
    }

    pub fn state(&self) -> IntakeState {
        self.session.state
    }

    pub fn snapshot(&self) -> IntakeSnapshot {
        self.session.snapshot()
    }

    /// Every applied transition, oldest first
    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Idle → Uploading
    ///
    /// An empty file is a validation error and leaves the session in `Idle`.
    pub fn begin_upload(&mut self, file: &UploadFile) -> IntakeResult<()> {
        self.require(IntakeState::Idle, "upload a receipt")?;
        if file.is_empty() {
            return Err(IntakeError::Validation("no file selected".to_string()));
        }

        self.transition_to(IntakeState::Uploading);
        self.publish_if_changed();
        Ok(())
    }

    /// Uploading → Uploaded on success, back to Idle on failure
    ///
    /// The outcome is handed back unchanged so the caller can surface it.
    pub fn finish_upload(&mut self, outcome: UploadOutcome) -> UploadOutcome {
        if self.session.is_terminal() {
            debug!(token = %self.session.token, "Upload settled after terminal state, ignoring");
            return outcome;
        }
        self.require(IntakeState::Uploading, "complete an upload")?;

        match &outcome {
            Ok(()) => {
                self.transition_to(IntakeState::Uploaded);
            }
            Err(e) => {
                warn!(token = %self.session.token, error = %e, "Upload failed, session back to idle");
                self.transition_to(IntakeState::Idle);
            }
        }
        self.publish_if_changed();
        outcome
    }

    /// Uploaded | Analyzing → Analyzing
    pub fn begin_analysis(&mut self) -> IntakeResult<()> {
        let state = self.session.state;
        if !matches!(state, IntakeState::Uploaded | IntakeState::Analyzing) {
            return Err(IntakeError::InvalidTransition {
                state,
                event: "request analysis",
            });
        }
        if self.analysis_rollback.is_some() {
            return Err(IntakeError::InvalidTransition {
                state,
                event: "request analysis twice",
            });
        }

        self.analysis_rollback = Some(state);
        if state != IntakeState::Analyzing {
            self.transition_to(IntakeState::Analyzing);
            self.publish_if_changed();
        }
        Ok(())
    }

    /// Keeps `Analyzing` on success, restores the previous state on failure
    pub fn finish_analysis(&mut self, outcome: AnalyzeOutcome) -> AnalyzeOutcome {
        let rollback = self.analysis_rollback.take();
        if self.session.is_terminal() {
            debug!(token = %self.session.token, "Analyze settled after terminal state, ignoring");
            return outcome;
        }
        let Some(previous) = rollback else {
            return Err(IntakeError::InvalidTransition {
                state: self.session.state,
                event: "complete an analysis request",
            });
        };

        if let Err(e) = &outcome {
            warn!(
                token = %self.session.token,
                error = %e,
                restored = %previous,
                "Analysis request failed, restoring previous state"
            );
            if self.session.state != previous {
                self.transition_to(previous);
                self.publish_if_changed();
            }
        }
        outcome
    }

    /// Rotation is only meaningful once the file is on the server and
    /// before analysis starts
    pub fn ensure_rotatable(&self) -> IntakeResult<()> {
        self.require(IntakeState::Uploaded, "rotate the receipt")
    }

    /// Reserve a sequence number for a new poll; `None` once terminal
    pub fn issue_poll(&mut self) -> Option<PollTicket> {
        if self.session.is_terminal() {
            return None;
        }
        let ticket = PollTicket {
            seq: self.next_poll_seq,
        };
        self.next_poll_seq += 1;
        Some(ticket)
    }

    /// Apply the outcome of the poll identified by `ticket`
    pub fn apply_poll(&mut self, ticket: PollTicket, outcome: &StatusOutcome) -> PollEffect {
        if self.session.is_terminal() {
            return PollEffect::Ignored;
        }
        if ticket.seq <= self.last_applied_seq {
            debug!(
                token = %self.session.token,
                seq = ticket.seq,
                last_applied = self.last_applied_seq,
                "Discarding stale status response"
            );
            return PollEffect::Stale;
        }

        let report = match outcome {
            Ok(report) => report,
            Err(_) => return PollEffect::TransientFailure,
        };
        self.last_applied_seq = ticket.seq;

        let effect = self.apply_report(report);
        self.publish_if_changed();
        effect
    }

    fn apply_report(&mut self, report: &StatusReport) -> PollEffect {
        let stage = report.state.as_str().to_string();
        let changed = self.session.remote_stage.as_deref() != Some(stage.as_str())
            || (report.progress.is_some() && report.progress != self.session.progress);
        self.session.remote_stage = Some(stage);
        if report.progress.is_some() {
            self.session.progress = report.progress;
        }

        match (&report.state, &report.result) {
            (RemoteState::Done, Some(result)) => {
                self.session.result = Some(result.clone());
                PollEffect::Transitioned(self.transition_to(IntakeState::Done))
            }
            (RemoteState::Done, None) => {
                warn!(token = %self.session.token, "Server reported done without a result");
                self.session.error = Some(MALFORMED_STATUS.to_string());
                PollEffect::Transitioned(self.transition_to(IntakeState::Failed))
            }
            (RemoteState::Error, _) => {
                let message = report
                    .error
                    .clone()
                    .unwrap_or_else(|| ANALYSIS_FAILED.to_string());
                self.session.error = Some(message);
                PollEffect::Transitioned(self.transition_to(IntakeState::Failed))
            }
            _ if changed => PollEffect::Updated,
            _ => PollEffect::Unchanged,
        }
    }

    fn require(&self, expected: IntakeState, event: &'static str) -> IntakeResult<()> {
        if self.session.state == expected {
            Ok(())
        } else {
            Err(IntakeError::InvalidTransition {
                state: self.session.state,
                event,
            })
        }
    }

    fn transition_to(&mut self, next: IntakeState) -> StateTransition {
        let transition = StateTransition {
            from: self.session.state,
            to: next,
            at: Utc::now(),
        };
        self.session.state = next;
        self.session.updated_at = transition.at;
        if next != IntakeState::Done {
            self.session.result = None;
        }
        if next != IntakeState::Failed {
            self.session.error = None;
        }
        debug_assert!(self.session.invariants_hold());

        info!(
            token = %self.session.token,
            from = %transition.from,
            to = %transition.to,
            "Intake state transition"
        );
        self.transitions.push(transition.clone());
        transition
    }

    fn publish_if_changed(&mut self) {
        let snapshot = self.session.snapshot();
        if snapshot != self.last_published {
            self.sink.publish(&snapshot);
            self.last_published = snapshot;
        }
    }
}
