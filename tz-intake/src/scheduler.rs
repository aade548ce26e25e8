//! Status polling
//!
//! One cooperative task per session. It polls once immediately, then once
//! per tick, never with more than one `fetch_status` outstanding. Ticks that
//! arrive while a poll is in flight are dropped rather than queued. The task
//! cancels itself when the session reaches a terminal state.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{IntakeApi, StatusOutcome};
use crate::models::IntakeState;
use crate::state_machine::{PollEffect, PollTicket, SharedMachine};

/// Source of poll ticks
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick; `None` once the source is exhausted
    async fn tick(&mut self) -> Option<()>;
}

#[async_trait]
impl TickSource for Box<dyn TickSource> {
    async fn tick(&mut self) -> Option<()> {
        (**self).tick().await
    }
}

/// Wall-clock cadence; the first tick fires one period after the first
/// call to `tick`, so the clock starts when polling starts
pub struct IntervalTicks {
    period: Duration,
    interval: Option<Interval>,
}

impl IntervalTicks {
    /// Does not touch the timer driver; safe outside a runtime
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl TickSource for IntervalTicks {
    async fn tick(&mut self) -> Option<()> {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
        Some(())
    }
}

/// Ticks fired by hand through a [`TickTrigger`]
pub struct ManualTicks {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Clone)]
pub struct TickTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicks {
    pub fn new() -> (TickTrigger, ManualTicks) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TickTrigger { tx }, ManualTicks { rx })
    }
}

impl TickTrigger {
    /// Returns false once the poll task has gone away
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

#[async_trait]
impl TickSource for ManualTicks {
    async fn tick(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// Why the poll task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Terminal(IntakeState),
    Cancelled,
}

/// Counters reported when the poll task ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub polls_issued: u64,
    pub ticks_skipped: u64,
    pub transient_failures: u64,
    pub stop_reason: StopReason,
}

/// Control handle of a running poll task
///
/// Dropping the handle cancels the task.
pub struct PollHandle {
    cancel: CancellationToken,
    nudge: Arc<Notify>,
    task: Option<JoinHandle<PollSummary>>,
}

impl PollHandle {
    /// Cancel polling; safe to call any number of times
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Ask for a poll outside the regular cadence
    pub fn poll_now(&self) {
        self.nudge.notify_one();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Wait for the task to end; `None` if it was already joined
    pub async fn join(&mut self) -> Option<PollSummary> {
        let task = self.task.take()?;
        match task.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "Poll task ended abnormally");
                None
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct PollingScheduler {
    api: Arc<dyn IntakeApi>,
    machine: SharedMachine,
}

impl PollingScheduler {
    pub fn new(api: Arc<dyn IntakeApi>, machine: SharedMachine) -> Self {
        Self { api, machine }
    }

    /// Spawn the poll task
    pub fn start<T: TickSource + 'static>(&self, ticks: T) -> PollHandle {
        let cancel = CancellationToken::new();
        let nudge = Arc::new(Notify::new());

        let poll_loop = PollLoop {
            api: Arc::clone(&self.api),
            machine: Arc::clone(&self.machine),
            cancel: cancel.clone(),
            nudge: Arc::clone(&nudge),
            polls_issued: 0,
            ticks_skipped: 0,
            transient_failures: 0,
            consecutive_failures: 0,
        };
        let task = tokio::spawn(poll_loop.run(ticks));

        PollHandle {
            cancel,
            nudge,
            task: Some(task),
        }
    }
}

type InFlightPoll = BoxFuture<'static, (PollTicket, StatusOutcome)>;

struct PollLoop {
    api: Arc<dyn IntakeApi>,
    machine: SharedMachine,
    cancel: CancellationToken,
    nudge: Arc<Notify>,
    polls_issued: u64,
    ticks_skipped: u64,
    transient_failures: u64,
    consecutive_failures: u32,
}

impl PollLoop {
    async fn run<T: TickSource>(mut self, mut ticks: T) -> PollSummary {
        let token = self.api.token().clone();
        info!(token = %token, "Status polling started");

        let mut in_flight = self.issue().await;
        let mut ticks_open = true;

        let stop_reason = loop {
            if in_flight.is_none() {
                if let Some(state) = self.terminal_state().await {
                    break StopReason::Terminal(state);
                }
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break StopReason::Cancelled,

                (ticket, outcome) = settle(&mut in_flight) => {
                    in_flight = None;
                    if let Some(reason) = self.apply(ticket, outcome).await {
                        break reason;
                    }
                }

                tick = ticks.tick(), if ticks_open => match tick {
                    Some(()) => self.on_tick(&mut in_flight).await,
                    None => {
                        debug!(token = %token, "Tick source exhausted");
                        ticks_open = false;
                    }
                },

                _ = self.nudge.notified() => self.on_tick(&mut in_flight).await,
            }
        };

        // Also covers self-termination so handles observe a stopped poller
        self.cancel.cancel();
        info!(
            token = %token,
            reason = ?stop_reason,
            polls = self.polls_issued,
            skipped = self.ticks_skipped,
            "Status polling stopped"
        );

        PollSummary {
            polls_issued: self.polls_issued,
            ticks_skipped: self.ticks_skipped,
            transient_failures: self.transient_failures,
            stop_reason,
        }
    }

    async fn on_tick(&mut self, in_flight: &mut Option<InFlightPoll>) {
        if in_flight.is_some() {
            self.ticks_skipped += 1;
            debug!(token = %self.api.token(), "Poll still in flight, skipping tick");
            return;
        }
        *in_flight = self.issue().await;
    }

    async fn issue(&mut self) -> Option<InFlightPoll> {
        let ticket = self.machine.lock().await.issue_poll()?;
        self.polls_issued += 1;
        debug!(token = %self.api.token(), seq = ticket.seq(), "Polling status");

        let api = Arc::clone(&self.api);
        Some(async move { (ticket, api.fetch_status().await) }.boxed())
    }

    /// Returns the stop reason when polling must end
    async fn apply(&mut self, ticket: PollTicket, outcome: StatusOutcome) -> Option<StopReason> {
        if self.cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        let mut machine = self.machine.lock().await;
        // Cancellation may have raced with lock acquisition
        if self.cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }

        match machine.apply_poll(ticket, &outcome) {
            PollEffect::TransientFailure => {
                self.transient_failures += 1;
                self.consecutive_failures += 1;
                if let Err(e) = &outcome {
                    warn!(
                        token = %self.api.token(),
                        error = %e,
                        consecutive_failures = self.consecutive_failures,
                        "Status poll failed, retrying on next tick"
                    );
                }
            }
            PollEffect::Stale | PollEffect::Ignored => {}
            _ => self.consecutive_failures = 0,
        }

        let state = machine.state();
        state.is_terminal().then_some(StopReason::Terminal(state))
    }

    async fn terminal_state(&self) -> Option<IntakeState> {
        let state = self.machine.lock().await.state();
        state.is_terminal().then_some(state)
    }
}

/// Resolves with the in-flight poll's outcome, or never when idle
async fn settle(in_flight: &mut Option<InFlightPoll>) -> (PollTicket, StatusOutcome) {
    match in_flight {
        Some(poll) => poll.await,
        None => std::future::pending().await,
    }
}
