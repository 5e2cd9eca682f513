//! Background expiry and reconciliation loop.

use std::future::pending;
use std::sync::Arc;

use chrono::Utc;
use store::InventoryStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};

use crate::config::SweeperConfig;
use crate::ledger::{InventoryLedger, ReconcileReport, SweepReport};

/// Periodically expires overdue reservations and, when configured, checks the
/// counters against the reservation records.
pub struct ExpirySweeper<S> {
    ledger: Arc<InventoryLedger<S>>,
    config: SweeperConfig,
}

/// Handle for a spawned sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the loop and waits for the pass in progress to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "expiry sweeper task ended abnormally");
        }
    }
}

impl<S: InventoryStore + 'static> ExpirySweeper<S> {
    pub fn new(ledger: Arc<InventoryLedger<S>>, config: SweeperConfig) -> Self {
        Self { ledger, config }
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger<S>> {
        &self.ledger
    }

    /// Runs one expiry pass. Failures are logged; the next tick retries.
    pub async fn sweep_once(&self) -> SweepReport {
        match self.ledger.expire_reservations(Utc::now()).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "expiry sweep failed");
                SweepReport::default()
            }
        }
    }

    /// Runs one reconciliation pass.
    pub async fn reconcile_once(&self) -> ReconcileReport {
        match self.ledger.reconcile(self.config.repair).await {
            Ok(report) => {
                if !report.drifted.is_empty() {
                    tracing::info!(
                        checked = report.checked,
                        drifted = report.drifted.len(),
                        repair = self.config.repair,
                        "reconciliation pass found drift"
                    );
                }
                report
            }
            Err(e) => {
                tracing::warn!(error = %e, "reconciliation pass failed");
                ReconcileReport::default()
            }
        }
    }

    /// Starts the loop on the current runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle {
            shutdown: shutdown_tx,
            join,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut reconcile = self.config.reconcile_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tracing::info!(
            sweep_interval_ms = self.config.sweep_interval.as_millis() as u64,
            reconcile = reconcile.is_some(),
            "expiry sweeper started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_once().await;
                }
                _ = async {
                    match reconcile.as_mut() {
                        Some(ticker) => {
                            ticker.tick().await;
                        }
                        None => pending::<()>().await,
                    }
                } => {
                    self.reconcile_once().await;
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    }
}
