use crate::models::{
    Backtest, BacktestRequest, BacktestStatistics, BacktestStatus, EquityPoint, StrategyConfig,
    Trade,
};
use anyhow::Result;
use async_trait::async_trait;

/// Persistence seam for backtest runs. Writes are single-attempt: a failed
/// write is fatal to the run, consistent with the simulator's fail-fast
/// policy, and partial history written before a failure is left in place.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn create_backtest(
        &self,
        request: &BacktestRequest,
        status: BacktestStatus,
    ) -> Result<String>;
    async fn get_backtest(&self, id: &str) -> Result<Option<Backtest>>;
    async fn get_strategy(&self, id: &str) -> Result<Option<StrategyConfig>>;
    async fn update_status(&self, id: &str, status: BacktestStatus) -> Result<()>;
    async fn append_trade(&self, trade: &Trade) -> Result<()>;
    async fn update_trade(&self, trade: &Trade) -> Result<()>;
    async fn append_equity_point(&self, point: &EquityPoint) -> Result<()>;
    /// All statistics land in one atomic update on the backtest row.
    async fn write_statistics(&self, id: &str, statistics: &BacktestStatistics) -> Result<()>;
    async fn list_trades(&self, backtest_id: &str) -> Result<Vec<Trade>>;
    async fn list_equity_curve(&self, backtest_id: &str) -> Result<Vec<EquityPoint>>;
    /// Queued runs awaiting a worker, oldest first.
    async fn list_pending_backtests(&self) -> Result<Vec<Backtest>>;
}
