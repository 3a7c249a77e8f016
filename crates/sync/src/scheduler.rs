//! Periodic fetch → reconcile → propagate loop.
//!
//! ```text
//!   Idle ──run──► Running ──tick done──► Sleeping ──interval──► Running ...
//!                    │                       │
//!                    └──────── cancel ───────┴──► Stopped
//! ```
//!
//! Cancellation is observed while sleeping, so shutdown never waits for the
//! interval to elapse; a tick already in progress is allowed to finish.
//! Timer ticks and manual [`Scheduler::run_now`] calls share one code path
//! and one single-flight lock, so two ticks never overlap.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use newswire_core::config::SchedulerConfig;
use newswire_core::{Candidate, TaskSummary};

use crate::fetcher::Fetcher;
use crate::propagator::Propagator;
use crate::reconciler::{Reconciler, Reconciliation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    Stopped,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::Stopped => "stopped",
        }
    }
}

pub struct Scheduler {
    fetcher: Arc<dyn Fetcher>,
    reconciler: Reconciler,
    propagator: Arc<Propagator>,
    interval: Duration,
    fetch_limit: usize,
    state: watch::Sender<SchedulerState>,
    in_flight: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        reconciler: Reconciler,
        propagator: Arc<Propagator>,
        config: &SchedulerConfig,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            fetcher,
            reconciler,
            propagator,
            interval: config.interval(),
            fetch_limit: config.fetch_limit,
            state,
            in_flight: Mutex::new(()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Tick immediately, then every interval, until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!("scheduler started (interval: {}s)", self.interval.as_secs());

        while !token.is_cancelled() {
            self.state.send_replace(SchedulerState::Running);
            let summary = self.tick().await;
            info!(count = summary.count, "scheduled tick completed");

            self.state.send_replace(SchedulerState::Sleeping);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.state.send_replace(SchedulerState::Stopped);
        info!("scheduler stopped");
    }

    /// Manual out-of-band tick. Waits for any tick already in progress.
    pub async fn run_now(&self) -> TaskSummary {
        info!("manual tick requested");
        self.tick().await
    }

    async fn tick(&self) -> TaskSummary {
        let _guard = self.in_flight.lock().await;

        let candidates = self.fetch().await;
        let reconciliation = match self.reconciler.reconcile(&candidates).await {
            Ok(reconciliation) => reconciliation,
            Err(e) => {
                warn!(error = %e, candidates = candidates.len(), "reconciliation failed, will retry next tick");
                Reconciliation::empty()
            }
        };

        self.propagator.propagate_all(&reconciliation.events()).await;
        reconciliation.summary
    }

    /// Run the fetcher on its own task so a panic inside it becomes an
    /// empty batch instead of taking the scheduler down.
    async fn fetch(&self) -> Vec<Candidate> {
        let fetcher = Arc::clone(&self.fetcher);
        let limit = self.fetch_limit;
        match tokio::spawn(async move { fetcher.fetch(limit).await }).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "fetch task failed");
                Vec::new()
            }
        }
    }
}
