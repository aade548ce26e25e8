//! Shared fixtures for unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::client::{
    AnalyzeOutcome, IntakeApi, RotateOutcome, StatusOutcome, UploadFile, UploadOutcome,
};
use crate::error::IntakeError;
use crate::models::{ReceiptResult, RemoteState, Rotation, SessionToken, StatusReport};
use crate::presenter::SnapshotSink;
use crate::state_machine::{IntakeStateMachine, SharedMachine};

pub(crate) const TOKEN: &str = "042917";

pub(crate) fn netto() -> ReceiptResult {
    ReceiptResult {
        merchant: Some("Netto".to_string()),
        date: Some("2024-05-01".to_string()),
        total: Some(9.42),
        category: Some("supermarché".to_string()),
    }
}

pub(crate) fn photo() -> UploadFile {
    UploadFile::new(b"\xff\xd8jpeg".to_vec(), "ticket.jpg")
}

/// Let spawned tasks on the current-thread runtime run until they park
pub(crate) async fn settle_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Machine that has been uploaded and analysed, waiting for status polls
pub(crate) async fn analyzing_machine(sink: Arc<dyn SnapshotSink>) -> SharedMachine {
    let mut machine = IntakeStateMachine::new(SessionToken::new(TOKEN).unwrap(), sink);
    machine.begin_upload(&photo()).unwrap();
    machine.finish_upload(Ok(())).unwrap();
    machine.begin_analysis().unwrap();
    machine.finish_analysis(Ok(())).unwrap();
    machine.into_shared()
}

/// `IntakeApi` answering from pre-recorded outcomes
///
/// Once the status script runs out every poll reports `analyzing`.
pub(crate) struct ScriptedApi {
    token: SessionToken,
    statuses: Mutex<VecDeque<StatusOutcome>>,
    uploads: Mutex<VecDeque<UploadOutcome>>,
    analyses: Mutex<VecDeque<AnalyzeOutcome>>,
    rotations: Mutex<Vec<Rotation>>,
    status_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
    status_gate: Option<Arc<Semaphore>>,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self {
            token: SessionToken::new(TOKEN).unwrap(),
            statuses: Mutex::new(VecDeque::new()),
            uploads: Mutex::new(VecDeque::new()),
            analyses: Mutex::new(VecDeque::new()),
            rotations: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            status_gate: None,
        }
    }

    pub(crate) fn with_statuses(self, statuses: Vec<StatusOutcome>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub(crate) fn with_uploads(self, uploads: Vec<UploadOutcome>) -> Self {
        *self.uploads.lock().unwrap() = uploads.into();
        self
    }

    pub(crate) fn with_analyses(self, analyses: Vec<AnalyzeOutcome>) -> Self {
        *self.analyses.lock().unwrap() = analyses.into();
        self
    }

    /// Status polls block until a permit is added to the returned gate
    pub(crate) fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.status_gate = Some(gate.clone());
        (self, gate)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn rotations(&self) -> Vec<Rotation> {
        self.rotations.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntakeApi for ScriptedApi {
    fn token(&self) -> &SessionToken {
        &self.token
    }

    async fn upload(&self, file: &UploadFile) -> UploadOutcome {
        if file.is_empty() {
            return Err(IntakeError::Validation("no file selected".to_string()));
        }
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.uploads.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn trigger_analysis(&self) -> AnalyzeOutcome {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        self.analyses.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn fetch_status(&self) -> StatusOutcome {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.status_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatusReport::stage(RemoteState::Analyzing)))
    }

    async fn rotate(&self, rotation: Rotation) -> RotateOutcome {
        self.rotations.lock().unwrap().push(rotation);
        Ok(())
    }
}
