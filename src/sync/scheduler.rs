use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::{BatchReport, Syncer};
use crate::notify::Notifier;
use crate::storage::Vault;

/// What happened to a trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(BatchReport),
    /// Another run held the syncer; this trigger was dropped.
    AlreadyRunning,
}

/// Timer-driven and manual batch runs through one non-reentrant entry point.
pub struct Scheduler<V, N> {
    syncer: Arc<Mutex<Syncer<V, N>>>,
    /// Reachable while the syncer is locked by a running batch.
    notifier: N,
}

impl<V, N: Clone> Clone for Scheduler<V, N> {
    fn clone(&self) -> Self {
        Self {
            syncer: Arc::clone(&self.syncer),
            notifier: self.notifier.clone(),
        }
    }
}

impl<V, N> Scheduler<V, N>
where
    V: Vault + 'static,
    N: Notifier + Clone + 'static,
{
    pub fn new(syncer: Syncer<V, N>) -> Self {
        let notifier = syncer.notifier().clone();
        Self {
            syncer: Arc::new(Mutex::new(syncer)),
            notifier,
        }
    }

    pub fn syncer(&self) -> &Arc<Mutex<Syncer<V, N>>> {
        &self.syncer
    }

    /// Runs one batch fetch unless one is already in flight.
    ///
    /// Never waits for a running batch: an overlapping trigger is rejected.
    pub async fn trigger(&self) -> TriggerOutcome {
        let Ok(mut syncer) = self.syncer.try_lock() else {
            tracing::info!("Fetch already in progress, ignoring trigger");
            self.notifier.notify("Fetch already in progress");
            return TriggerOutcome::AlreadyRunning;
        };
        TriggerOutcome::Completed(syncer.fetch_all().await)
    }

    /// Serves timer ticks and manual triggers until `shutdown` resolves.
    ///
    /// The first timer tick fires one full `period` after start; `None`
    /// disables the timer. Each trigger runs on its own task so a trigger that
    /// arrives mid-run is rejected rather than queued. On shutdown, waits for
    /// the in-flight run to finish.
    pub async fn run(
        &self,
        period: Option<Duration>,
        mut manual: mpsc::Receiver<()>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = period.map(|p| {
            let mut interval = tokio::time::interval_at(Instant::now() + p, p);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        let mut manual_open = true;
        tokio::pin!(shutdown);

        tracing::info!(period_secs = period.map(|p| p.as_secs()), "Scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = next_tick(&mut ticker) => {
                    tracing::debug!("Timer fetch");
                    self.spawn_trigger();
                }
                msg = manual.recv(), if manual_open => match msg {
                    Some(()) => {
                        tracing::debug!("Manual fetch");
                        self.spawn_trigger();
                    }
                    None => manual_open = false,
                },
            }
        }

        let _in_flight = self.syncer.lock().await;
        tracing::info!("Scheduler stopped");
    }

    fn spawn_trigger(&self) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.trigger().await;
        });
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
