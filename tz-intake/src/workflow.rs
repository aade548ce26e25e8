//! Session controller
//!
//! Wires the API client, the state machine and the poll task together:
//! every user action goes through the machine first, then the network,
//! then back through the machine with the outcome.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::client::{IntakeApi, UploadFile};
use crate::error::IntakeResult;
use crate::models::{IntakeSnapshot, Rotation};
use crate::presenter::SnapshotSink;
use crate::scheduler::{IntervalTicks, PollHandle, PollingScheduler, TickSource};
use crate::state_machine::{IntakeStateMachine, SharedMachine};

pub struct IntakeWorkflow {
    api: Arc<dyn IntakeApi>,
    machine: SharedMachine,
    scheduler: PollingScheduler,
    /// Taken when polling starts; a session polls at most once
    ticks: Option<Box<dyn TickSource>>,
    poller: Option<PollHandle>,
}

impl IntakeWorkflow {
    pub fn new(
        api: Arc<dyn IntakeApi>,
        sink: Arc<dyn SnapshotSink>,
        ticks: Box<dyn TickSource>,
    ) -> Self {
        let machine = IntakeStateMachine::new(api.token().clone(), sink).into_shared();
        let scheduler = PollingScheduler::new(Arc::clone(&api), Arc::clone(&machine));

        Self {
            api,
            machine,
            scheduler,
            ticks: Some(ticks),
            poller: None,
        }
    }

    /// Poll on a wall-clock cadence
    pub fn with_interval(
        api: Arc<dyn IntakeApi>,
        sink: Arc<dyn SnapshotSink>,
        period: Duration,
    ) -> Self {
        Self::new(api, sink, Box::new(IntervalTicks::new(period)))
    }

    pub fn machine(&self) -> SharedMachine {
        Arc::clone(&self.machine)
    }

    pub async fn snapshot(&self) -> IntakeSnapshot {
        self.machine.lock().await.snapshot()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().map_or(false, PollHandle::is_running)
    }

    /// Send the receipt photo, then start watching the session
    pub async fn upload(&mut self, file: &UploadFile) -> IntakeResult<()> {
        self.machine.lock().await.begin_upload(file)?;
        let outcome = self.api.upload(file).await;
        self.machine.lock().await.finish_upload(outcome)?;

        info!(
            token = %self.api.token(),
            file = file.file_name(),
            bytes = file.bytes().len(),
            "Receipt uploaded"
        );
        self.ensure_polling();
        Ok(())
    }

    /// Ask the server to analyse the uploaded receipt
    pub async fn trigger_analysis(&mut self) -> IntakeResult<()> {
        self.machine.lock().await.begin_analysis()?;
        let outcome = self.api.trigger_analysis().await;
        self.machine.lock().await.finish_analysis(outcome)?;

        info!(token = %self.api.token(), "Analysis requested");
        if let Some(poller) = self.poller.as_ref().filter(|p| p.is_running()) {
            poller.poll_now();
        } else {
            self.ensure_polling();
        }
        Ok(())
    }

    /// Rotate the stored image; only before analysis starts
    pub async fn rotate(&mut self, rotation: Rotation) -> IntakeResult<()> {
        self.machine.lock().await.ensure_rotatable()?;
        self.api.rotate(rotation).await?;
        info!(token = %self.api.token(), rotation = ?rotation, "Receipt rotated");
        Ok(())
    }

    /// Watch a session without uploading anything
    pub fn resume(&mut self) {
        self.ensure_polling();
    }

    /// Wait for polling to end and return the final snapshot
    ///
    /// Returns immediately with the current snapshot if polling never
    /// started.
    pub async fn wait_for_terminal(&mut self) -> IntakeSnapshot {
        if let Some(poller) = self.poller.as_mut() {
            if let Some(summary) = poller.join().await {
                info!(
                    token = %self.api.token(),
                    polls = summary.polls_issued,
                    transient_failures = summary.transient_failures,
                    "Session settled"
                );
            }
        }
        self.snapshot().await
    }

    /// Stop polling for good
    ///
    /// Once this returns no poll response can change the session.
    pub async fn shutdown(&mut self) {
        self.ticks = None;
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
            poller.join().await;
        }
    }

    fn ensure_polling(&mut self) {
        if self.poller.is_some() {
            return;
        }
        if let Some(ticks) = self.ticks.take() {
            self.poller = Some(self.scheduler.start(ticks));
        }
    }
}
