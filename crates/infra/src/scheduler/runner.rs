use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::store::Store;

use super::ContractScheduler;

/// Counters published after every scheduler pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunnerStats {
    pub passes: u64,
    pub processed: u64,
    pub failed: u64,
    /// Passes that could not even list their candidates.
    pub errors: u64,
}

/// Periodic driver for [`ContractScheduler::run_due_contracts`].
#[derive(Debug, Clone)]
pub struct ContractSchedulerRunner {
    pub interval: Duration,
}

impl Default for ContractSchedulerRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Handle to a running scheduler task. Dropping it stops the task after the
/// pass in flight.
#[derive(Debug)]
pub struct SchedulerHandle {
    trigger: mpsc::Sender<()>,
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
    stats: watch::Receiver<RunnerStats>,
}

impl SchedulerHandle {
    /// Ask for a pass now. Triggers coalesce: one already pending absorbs this one.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    pub fn stats(&self) -> RunnerStats {
        self.stats.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunnerStats> {
        self.stats.clone()
    }

    /// Stop after the pass in flight and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.join.await {
            warn!(error = %err, "contract scheduler task ended abnormally");
        }
    }
}

impl ContractSchedulerRunner {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn the runner on the current tokio runtime.
    ///
    /// Runs once on startup, then every `interval` and on every trigger.
    /// Pass failures are logged and never stop the loop.
    pub fn spawn<S>(&self, scheduler: Arc<ContractScheduler<S>>) -> SchedulerHandle
    where
        S: Store + 'static,
    {
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (stats_tx, stats_rx) = watch::channel(RunnerStats::default());

        let join = tokio::spawn(runner_loop(
            scheduler,
            self.interval,
            trigger_rx,
            shutdown_rx,
            stats_tx,
        ));

        SchedulerHandle {
            trigger: trigger_tx,
            shutdown: shutdown_tx,
            join,
            stats: stats_rx,
        }
    }
}

async fn runner_loop<S: Store + 'static>(
    scheduler: Arc<ContractScheduler<S>>,
    interval: Duration,
    mut trigger_rx: mpsc::Receiver<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
    stats: watch::Sender<RunnerStats>,
) {
    info!(interval_secs = interval.as_secs(), "contract scheduler runner started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Shutdown has priority.
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
            Some(()) = trigger_rx.recv() => debug!("contract scheduler triggered"),
        }

        match scheduler.run_due_contracts(Utc::now()).await {
            Ok(written) => {
                let processed = written.iter().filter(|e| e.order_id.is_some()).count() as u64;
                let failed = written.len() as u64 - processed;
                stats.send_modify(|s| {
                    s.passes += 1;
                    s.processed += processed;
                    s.failed += failed;
                });
            }
            Err(err) => {
                error!(error = %err, "contract scheduler pass failed");
                stats.send_modify(|s| {
                    s.passes += 1;
                    s.errors += 1;
                });
            }
        }
    }

    info!("contract scheduler runner stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::test_support::{active_contract, nine, request};
    use crate::ledger::test_support::seed;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use tradeflow_contracts::Recurrence;

    #[tokio::test]
    async fn runs_on_startup_and_on_trigger() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 100, 10).await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        active_contract(&store, request(&[(p, 1, 10)], start, Some(Recurrence::daily(nine())))).await;

        let handle = ContractSchedulerRunner::new(Duration::from_secs(3600))
            .spawn(Arc::new(ContractScheduler::new(store.clone())));
        let mut stats = handle.subscribe();
        stats.wait_for(|s| s.passes >= 1).await.unwrap();
        assert_eq!(handle.stats().processed, 1);

        handle.trigger();
        stats.wait_for(|s| s.passes >= 2).await.unwrap();
        let after = handle.stats();
        assert_eq!(after.processed, 1);
        assert_eq!(after.failed, 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_runner() {
        let handle = ContractSchedulerRunner::default()
            .spawn(Arc::new(ContractScheduler::new(InMemoryStore::new())));
        handle.subscribe().wait_for(|s| s.passes >= 1).await.unwrap();
        handle.shutdown().await;
    }
}
