use crate::models::{Candle, IndicatorSet, Position, Signal, StrategyKind};
use std::collections::HashMap;

/// A trading strategy evaluated once per symbol per trading day. Evaluation
/// is pure: the same bar, indicators, and position always yield the same
/// signal.
pub trait Strategy {
    fn kind(&self) -> StrategyKind;
    fn evaluate(
        &self,
        bar: &Candle,
        indicators: &IndicatorSet,
        position: Option<&Position>,
    ) -> Signal;
}

#[path = "strategies/sma_crossover.rs"]
pub mod sma_crossover;

pub use sma_crossover::SmaCrossoverStrategy;

#[path = "strategies/rsi_mean_reversion.rs"]
pub mod rsi_mean_reversion;

pub use rsi_mean_reversion::RsiMeanReversionStrategy;

#[path = "strategies/bollinger_breakout.rs"]
pub mod bollinger_breakout;

pub use bollinger_breakout::BollingerBreakoutStrategy;

pub fn create_strategy(
    kind: StrategyKind,
    parameters: &HashMap<String, f64>,
) -> Box<dyn Strategy + Send + Sync> {
    match kind {
        StrategyKind::SmaCrossover => Box::new(SmaCrossoverStrategy::new(parameters)),
        StrategyKind::RsiMeanReversion => Box::new(RsiMeanReversionStrategy::new(parameters)),
        StrategyKind::BollingerBreakout => Box::new(BollingerBreakoutStrategy::new(parameters)),
    }
}

/// Exit against the position's recorded stop-loss level, if breached.
pub(crate) fn stop_loss_exit(bar: &Candle, position: &Position) -> Option<Signal> {
    let stop_loss = position.stop_loss?;
    if bar.close <= stop_loss {
        Some(Signal::sell(format!(
            "Stop loss triggered at {:.2}",
            stop_loss
        )))
    } else {
        None
    }
}

/// Exit against the position's recorded take-profit level, if reached.
pub(crate) fn take_profit_exit(bar: &Candle, position: &Position) -> Option<Signal> {
    let take_profit = position.take_profit?;
    if bar.close >= take_profit {
        Some(Signal::sell(format!(
            "Take profit triggered at {:.2}",
            take_profit
        )))
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use chrono::NaiveDate;

    pub fn bar(close: f64) -> Candle {
        Candle {
            symbol: "AAPL".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000_000,
        }
    }

    pub fn open_position(entry_price: f64, stop_loss: Option<f64>, take_profit: Option<f64>) -> Position {
        Position {
            symbol: "AAPL".to_string(),
            quantity: 10,
            entry_price,
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            stop_loss,
            take_profit,
        }
    }
}
