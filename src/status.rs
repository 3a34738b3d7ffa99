use std::sync::{Arc, Mutex};

/// Shared progress handle for a batch of worker runs. Clones observe the
/// same underlying state, so a supervisor can poll while runs execute.
#[derive(Clone, Default)]
pub struct RunnerStatus {
    inner: Arc<Mutex<RunnerStatusData>>,
}

#[derive(Default)]
struct RunnerStatusData {
    phase: String,
    total_runs: usize,
    completed_runs: usize,
    failed_runs: usize,
    last_backtest_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RunnerStatusSnapshot {
    pub phase: String,
    pub total_runs: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    pub last_backtest_id: Option<String>,
}

impl RunnerStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunnerStatusData {
                phase: "Idle".to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn set_phase<S: Into<String>>(&self, phase: S) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase.into();
        }
    }

    pub fn set_progress(
        &self,
        total_runs: usize,
        completed_runs: usize,
        failed_runs: usize,
        last_backtest_id: Option<String>,
    ) {
        if let Ok(mut data) = self.inner.lock() {
            data.total_runs = total_runs;
            data.completed_runs = completed_runs;
            data.failed_runs = failed_runs;
            if last_backtest_id.is_some() {
                data.last_backtest_id = last_backtest_id;
            }
        }
    }

    pub fn snapshot(&self) -> RunnerStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            RunnerStatusSnapshot {
                phase: data.phase.clone(),
                total_runs: data.total_runs,
                completed_runs: data.completed_runs,
                failed_runs: data.failed_runs,
                last_backtest_id: data.last_backtest_id.clone(),
            }
        } else {
            RunnerStatusSnapshot {
                phase: "Status unavailable".to_string(),
                total_runs: 0,
                completed_runs: 0,
                failed_runs: 0,
                last_backtest_id: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_progress_state() {
        let status = RunnerStatus::new();
        let observer = status.clone();

        status.set_phase("Backtesting 3 queued runs");
        status.set_progress(3, 1, 0, Some("b1".to_string()));

        let snapshot = observer.snapshot();
        assert_eq!(snapshot.phase, "Backtesting 3 queued runs");
        assert_eq!(snapshot.total_runs, 3);
        assert_eq!(snapshot.completed_runs, 1);
        assert_eq!(snapshot.last_backtest_id.as_deref(), Some("b1"));
    }
}
