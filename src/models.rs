use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Simulation-domain failures surfaced by validation and strategy dispatch.
/// Infrastructure errors (database, connection) stay on `anyhow`.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid backtest configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown strategy kind '{0}'")]
    UnknownStrategy(String),
    #[error("backtest {0} not found")]
    BacktestNotFound(String),
    #[error("strategy {0} not found")]
    StrategyNotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// One day's precomputed indicator row for a symbol. Values are optional
/// because the warmup window of each indicator leaves leading gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Hold => "hold",
        }
    }
}

impl FromStr for SignalAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(SignalAction::Buy),
            "sell" => Ok(SignalAction::Sell),
            "hold" => Ok(SignalAction::Hold),
            other => Err(anyhow!("Unknown signal action '{}'", other)),
        }
    }
}

/// A strategy's per-day decision for one symbol, with optional risk levels
/// that the ledger attaches to the opened position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub action: SignalAction,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
}

impl Signal {
    pub fn hold<S: Into<String>>(reason: S) -> Self {
        Self {
            action: SignalAction::Hold,
            reason: reason.into(),
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn buy<S: Into<String>>(
        reason: S,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Self {
        Self {
            action: SignalAction::Buy,
            reason: reason.into(),
            stop_loss,
            take_profit,
        }
    }

    pub fn sell<S: Into<String>>(reason: S) -> Self {
        Self {
            action: SignalAction::Sell,
            reason: reason.into(),
            stop_loss: None,
            take_profit: None,
        }
    }

    /// Serialized form stored on the trade record for either leg.
    pub fn metadata(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BacktestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BacktestStatus::Pending => "pending",
            BacktestStatus::Running => "running",
            BacktestStatus::Completed => "completed",
            BacktestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BacktestStatus::Completed | BacktestStatus::Failed)
    }
}

impl FromStr for BacktestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(BacktestStatus::Pending),
            "running" => Ok(BacktestStatus::Running),
            "completed" => Ok(BacktestStatus::Completed),
            "failed" => Ok(BacktestStatus::Failed),
            other => Err(anyhow!("Unknown backtest status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestStatistics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: i32,
    pub winning_trades: i32,
    pub losing_trades: i32,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

#[derive(Debug, Clone)]
pub struct Backtest {
    pub id: String,
    pub strategy_id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub slippage_rate: f64,
    /// Symbols requested at creation time; empty means "sample the active
    /// universe" at run time.
    pub symbols: Vec<String>,
    pub status: BacktestStatus,
    pub statistics: Option<BacktestStatistics>,
    pub created_at: DateTime<Utc>,
}

/// Request payload for creating a backtest, as received from the terminal's
/// API gateway or the CLI.
#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub strategy_id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub symbols: Vec<String>,
}

impl BacktestRequest {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.strategy_id.trim().is_empty() {
            return Err(BacktestError::InvalidConfig(
                "strategy id must not be empty".to_string(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(BacktestError::InvalidConfig(format!(
                "end date {} precedes start date {}",
                self.end_date, self.start_date
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(BacktestError::InvalidConfig(
                "initial capital must be positive".to_string(),
            ));
        }
        if !self.commission_rate.is_finite() || self.commission_rate < 0.0 {
            return Err(BacktestError::InvalidConfig(
                "commission rate must be >= 0".to_string(),
            ));
        }
        if !self.slippage_rate.is_finite() || self.slippage_rate < 0.0 {
            return Err(BacktestError::InvalidConfig(
                "slippage rate must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    SmaCrossover,
    RsiMeanReversion,
    BollingerBreakout,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SmaCrossover => "sma_crossover",
            StrategyKind::RsiMeanReversion => "rsi_mean_reversion",
            StrategyKind::BollingerBreakout => "bollinger_breakout",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma_crossover" => Ok(StrategyKind::SmaCrossover),
            "rsi_mean_reversion" => Ok(StrategyKind::RsiMeanReversion),
            "bollinger_breakout" => Ok(StrategyKind::BollingerBreakout),
            other => Err(BacktestError::UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub id: String,
    pub name: String,
    pub kind: StrategyKind,
    pub parameters: HashMap<String, f64>,
}

/// Flatten a JSON parameter object into the numeric map strategies consume.
/// Numbers pass through, numeric strings are parsed, booleans become 0/1;
/// anything else is skipped with a warning so one bad key cannot sink a run.
pub fn parse_parameter_map(raw: &Value) -> HashMap<String, f64> {
    let Some(object) = raw.as_object() else {
        if !raw.is_null() {
            warn!("Strategy parameters are not a JSON object: {}", raw);
        }
        return HashMap::new();
    };

    let mut cleaned = HashMap::with_capacity(object.len());
    for (key, value) in object {
        if let Some(num) = value.as_f64() {
            if num.is_finite() {
                cleaned.insert(key.clone(), num);
            } else {
                warn!("Skipping parameter `{}`: non-finite value {}", key, value);
            }
            continue;
        }

        if let Some(text) = value.as_str() {
            match text.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => {
                    cleaned.insert(key.clone(), parsed);
                }
                _ => warn!("Skipping parameter `{}`: unparseable value {}", key, value),
            }
            continue;
        }

        if let Some(boolean) = value.as_bool() {
            cleaned.insert(key.clone(), if boolean { 1.0 } else { 0.0 });
            continue;
        }

        warn!("Skipping parameter `{}`: unsupported value {}", key, value);
    }

    cleaned
}

/// An open holding in the simulated portfolio. At most one per symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(TradeStatus::Open),
            "closed" => Ok(TradeStatus::Closed),
            other => Err(anyhow!("Unknown trade status '{}'", other)),
        }
    }
}

/// One round trip (or its open half). `commission` accumulates both legs.
#[derive(Debug, Clone)]
pub struct Trade {
    pub id: String,
    pub backtest_id: String,
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: Option<NaiveDate>,
    pub exit_price: Option<f64>,
    pub quantity: i64,
    pub commission: f64,
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub status: TradeStatus,
    pub entry_signal: Value,
    pub exit_signal: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub backtest_id: String,
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub cash: f64,
    pub positions_value: f64,
    pub daily_return: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_numeric_string_and_bool_parameters() {
        let raw = json!({
            "short_window": 20,
            "stop_loss": "0.05",
            "enabled": true,
            "label": "fast",
        });

        let params = parse_parameter_map(&raw);
        assert_eq!(params.get("short_window"), Some(&20.0));
        assert_eq!(params.get("stop_loss"), Some(&0.05));
        assert_eq!(params.get("enabled"), Some(&1.0));
        assert!(!params.contains_key("label"));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            BacktestStatus::Pending,
            BacktestStatus::Running,
            BacktestStatus::Completed,
            BacktestStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<BacktestStatus>().unwrap(), status);
        }
        assert!(BacktestStatus::Completed.is_terminal());
        assert!(!BacktestStatus::Running.is_terminal());
    }

    #[test]
    fn request_validation_rejects_inverted_range_and_bad_capital() {
        let request = BacktestRequest {
            strategy_id: "s1".to_string(),
            name: "test".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            initial_capital: 100_000.0,
            commission_rate: 0.001,
            slippage_rate: 0.001,
            symbols: vec![],
        };
        assert!(request.validate().is_err());

        let request = BacktestRequest {
            end_date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            initial_capital: 0.0,
            ..request
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn signal_metadata_omits_absent_risk_levels() {
        let metadata = Signal::sell("RSI overbought at 74.2").metadata();
        assert_eq!(metadata["action"], json!("Sell"));
        assert!(metadata.get("stopLoss").is_none());
    }
}
