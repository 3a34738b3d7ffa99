use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

/// Topic the terminal's notification pipeline subscribes to.
pub const BACKTEST_COMPLETED_TOPIC: &str = "backtest-completed";

/// Completion notification seam. Only successful runs publish; a failed run
/// is visible through its status alone.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<()>;
}

pub fn completion_payload(backtest_id: &str, total_trades: usize) -> Value {
    json!({
        "backtestId": backtest_id,
        "status": "completed",
        "totalTrades": total_trades,
        "timestamp": Utc::now().to_rfc3339(),
    })
}
