//! Result presentation
//!
//! The state machine hands a complete [`IntakeSnapshot`] to a
//! [`SnapshotSink`] on creation and on every observable change. Rendering
//! rules:
//! - Done: one line per receipt field, `n/a` when a field is missing
//! - Failed: the error message
//! - otherwise: PIN and current stage

use std::io::Write;
use std::sync::Mutex;

use crate::models::{IntakeSnapshot, IntakeState};

/// Placeholder shown for missing receipt fields
pub const MISSING_FIELD: &str = "n/a";

/// Receives session snapshots
pub trait SnapshotSink: Send + Sync {
    fn publish(&self, snapshot: &IntakeSnapshot);
}

/// Render a snapshot as display text
pub fn render_snapshot(snapshot: &IntakeSnapshot) -> String {
    match snapshot.state {
        IntakeState::Done => {
            let result = snapshot.result.clone().unwrap_or_default();
            let total = result
                .total
                .map(|t| format!("{:.2}", t))
                .unwrap_or_else(|| MISSING_FIELD.to_string());
            format!(
                "Marchand: {}\nDate: {}\nTotal: {}\nCatégorie: {}",
                result.merchant.as_deref().unwrap_or(MISSING_FIELD),
                result.date.as_deref().unwrap_or(MISSING_FIELD),
                total,
                result.category.as_deref().unwrap_or(MISSING_FIELD),
            )
        }
        IntakeState::Failed => format!(
            "Erreur: {}",
            snapshot.error.as_deref().unwrap_or("analysis failed")
        ),
        _ => match snapshot.progress {
            Some(progress) => format!(
                "PIN: {} · {} ({}%)",
                snapshot.token,
                snapshot.status_label(),
                progress
            ),
            None => format!("PIN: {} · {}", snapshot.token, snapshot.status_label()),
        },
    }
}

/// Writes each rendered snapshot to a writer (stdout in the CLI)
pub struct TextPresenter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> TextPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> SnapshotSink for TextPresenter<W> {
    fn publish(&self, snapshot: &IntakeSnapshot) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "{}", render_snapshot(snapshot)).and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "Failed to write intake snapshot");
        }
    }
}

/// Logs each snapshot at `info`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SnapshotSink for TracingSink {
    fn publish(&self, snapshot: &IntakeSnapshot) {
        tracing::info!(
            token = %snapshot.token,
            state = %snapshot.state,
            stage = snapshot.remote_stage.as_deref().unwrap_or("-"),
            progress = ?snapshot.progress,
            error = snapshot.error.as_deref().unwrap_or(""),
            "Intake snapshot"
        );
    }
}

/// Keeps every published snapshot in order
#[derive(Default)]
pub struct CollectingSink {
    snapshots: Mutex<Vec<IntakeSnapshot>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<IntakeSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<IntakeSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }

    /// States in publication order, consecutive duplicates collapsed
    pub fn states(&self) -> Vec<IntakeState> {
        let mut states: Vec<IntakeState> = self.snapshots().iter().map(|s| s.state).collect();
        states.dedup();
        states
    }
}

impl SnapshotSink for CollectingSink {
    fn publish(&self, snapshot: &IntakeSnapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(snapshot.clone());
    }
}
