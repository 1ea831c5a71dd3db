//! Periodic, single-flight driver of [`SyncCycle`]s.

use core::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::pipeline::{CycleError, CycleReport, SyncCycle, TrackerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A cycle is running; no other cycle starts until it returns.
    Syncing,
}

pub struct Scheduler {
    cycle: SyncCycle,
    interval: Duration,
    tracker: TrackerState,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(cycle: SyncCycle, interval: Duration) -> Self {
        Self {
            cycle,
            interval,
            tracker: TrackerState::default(),
            state: SchedulerState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub const fn tracker(&self) -> TrackerState {
        self.tracker
    }

    /// Runs a single cycle now.
    pub async fn run_once(&mut self) -> Result<CycleReport, CycleError> {
        self.state = SchedulerState::Syncing;
        let result = self.cycle.run(&mut self.tracker).await;
        self.state = SchedulerState::Idle;
        result
    }

    /// Runs a cycle immediately and then once per interval until `shutdown`
    /// is cancelled.
    ///
    /// A cycle still running at shutdown is dropped; an uncommitted
    /// leaderboard transaction rolls back and partial downloads are never
    /// renamed into place.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.interval, "Sync scheduler started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, abandoning running sync cycle");
                    break;
                }
                result = self.run_once() => log_cycle(&result),
            }
        }

        self.state = SchedulerState::Idle;
        info!("Sync scheduler stopped");
    }
}

fn log_cycle(result: &Result<CycleReport, CycleError>) {
    match result {
        Ok(CycleReport::Unchanged { sync }) => {
            debug!(skipped = sync.skipped, "No new metric records");
        }
        Ok(CycleReport::NoData { .. }) => debug!("No metric records to rank"),
        Ok(CycleReport::Published {
            sync,
            contributors,
            best,
            pointer_advanced,
        }) => info!(
            fetched = sync.fetched,
            failed = sync.failed,
            contributors,
            best = %best,
            pointer_advanced,
            "Sync cycle complete"
        ),
        Err(error) => error!("Sync cycle failed, retrying next interval: {error}"),
    }
}
