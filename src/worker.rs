use crate::orchestrator::BacktestOrchestrator;
use crate::status::RunnerStatus;
use crate::store::ResultStore;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct DrainReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Consumes queued backtests from the store and runs them concurrently.
/// Each run owns its portfolio, so runs only share the store connection and
/// the read-side market-data cache; the pool bound caps how many simulate
/// at once.
pub struct WorkerPool {
    orchestrator: Arc<BacktestOrchestrator>,
    store: Arc<dyn ResultStore>,
    status: RunnerStatus,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(
        orchestrator: Arc<BacktestOrchestrator>,
        store: Arc<dyn ResultStore>,
        max_workers: Option<usize>,
    ) -> Self {
        let max_workers = max_workers
            .unwrap_or_else(num_cpus::get)
            .max(1);
        Self {
            orchestrator,
            store,
            status: RunnerStatus::new(),
            max_workers,
        }
    }

    pub fn status_handle(&self) -> RunnerStatus {
        self.status.clone()
    }

    /// Run every backtest currently in status `pending` and report the tally.
    /// One failed run does not stop the rest of the batch.
    pub async fn drain_pending(&self) -> Result<DrainReport> {
        let pending = self.store.list_pending_backtests().await?;
        if pending.is_empty() {
            info!("No pending backtests to run");
            self.status.set_phase("Idle");
            return Ok(DrainReport::default());
        }

        let total = pending.len();
        let workers = self.max_workers.min(total);
        info!(
            "Running {} pending backtest{} with {} worker{}",
            total,
            if total == 1 { "" } else { "s" },
            workers,
            if workers == 1 { "" } else { "s" }
        );
        self.status
            .set_phase(format!("Backtesting {} queued runs", total));
        self.status.set_progress(total, 0, 0, None);

        let outcomes = stream::iter(pending.into_iter().map(|backtest| {
            let orchestrator = self.orchestrator.clone();
            async move {
                let started = Instant::now();
                let outcome = orchestrator.run(&backtest.id, &[]).await;
                (backtest.id, outcome, started.elapsed())
            }
        }))
        .buffer_unordered(workers)
        .collect::<Vec<_>>()
        .await;

        let mut report = DrainReport {
            total,
            ..Default::default()
        };
        for (backtest_id, outcome, elapsed) in outcomes {
            match outcome {
                Ok(summary) => {
                    report.completed += 1;
                    info!(
                        "Completed backtest {} in {:.1}s ({} trades, return {:.2}%)",
                        backtest_id,
                        elapsed.as_secs_f64(),
                        summary.total_trades,
                        summary.statistics.total_return
                    );
                }
                Err(run_error) => {
                    report.failed += 1;
                    warn!("Backtest {} failed: {:#}", backtest_id, run_error);
                }
            }
            self.status.set_progress(
                total,
                report.completed,
                report.failed,
                Some(backtest_id),
            );
        }

        self.status.set_phase(if report.failed == 0 {
            "Batch completed".to_string()
        } else {
            format!("Batch completed with {} failure(s)", report.failed)
        });

        Ok(report)
    }
}
