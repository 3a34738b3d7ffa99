use crate::events::{completion_payload, EventPublisher, BACKTEST_COMPLETED_TOPIC};
use crate::market_data::MarketDataProvider;
use crate::models::{
    BacktestError, BacktestRequest, BacktestStatistics, BacktestStatus, SignalAction,
};
use crate::portfolio::Portfolio;
use crate::statistics::StatisticsCalculator;
use crate::store::ResultStore;
use crate::strategy::create_strategy;
use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// How many active symbols a run samples when none were requested.
pub const DEFAULT_SYMBOL_SAMPLE: i64 = 10;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub backtest_id: String,
    pub symbols: Vec<String>,
    pub trading_days: usize,
    pub total_trades: usize,
    pub final_value: f64,
    pub statistics: BacktestStatistics,
}

/// Drives one backtest from creation to a terminal status. Collaborators are
/// injected once per process; each `run` owns a fresh portfolio, so
/// orchestrators can serve many concurrent runs.
pub struct BacktestOrchestrator {
    store: Arc<dyn ResultStore>,
    market_data: Arc<dyn MarketDataProvider>,
    events: Arc<dyn EventPublisher>,
    sample_size: i64,
}

impl BacktestOrchestrator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        market_data: Arc<dyn MarketDataProvider>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            market_data,
            events,
            sample_size: DEFAULT_SYMBOL_SAMPLE,
        }
    }

    pub fn with_sample_size(mut self, sample_size: i64) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Validate and persist a new backtest. `status` is `Running` for inline
    /// execution and `Pending` when the run is queued for a worker.
    pub async fn create(
        &self,
        request: &BacktestRequest,
        status: BacktestStatus,
    ) -> Result<String> {
        request.validate()?;
        if self.store.get_strategy(&request.strategy_id).await?.is_none() {
            return Err(BacktestError::StrategyNotFound(request.strategy_id.clone()).into());
        }

        let id = self.store.create_backtest(request, status).await?;
        info!(
            "Created backtest {} for strategy {} ({} to {}, {})",
            id,
            request.strategy_id,
            request.start_date,
            request.end_date,
            status.as_str()
        );
        Ok(id)
    }

    /// Execute a backtest to completion or failure. Any error marks the run
    /// failed and propagates; trades and equity points already persisted stay
    /// in place for diagnostics.
    pub async fn run(&self, backtest_id: &str, symbols: &[String]) -> Result<RunSummary> {
        match self.simulate(backtest_id, symbols).await {
            Ok(summary) => Ok(summary),
            Err(run_error) => {
                error!("Backtest {} failed: {:#}", backtest_id, run_error);
                if let Err(status_error) = self
                    .store
                    .update_status(backtest_id, BacktestStatus::Failed)
                    .await
                {
                    warn!(
                        "Could not mark backtest {} as failed: {:#}",
                        backtest_id, status_error
                    );
                }
                Err(run_error)
            }
        }
    }

    async fn simulate(&self, backtest_id: &str, symbols: &[String]) -> Result<RunSummary> {
        let backtest = self
            .store
            .get_backtest(backtest_id)
            .await?
            .ok_or_else(|| BacktestError::BacktestNotFound(backtest_id.to_string()))?;
        if backtest.status.is_terminal() {
            return Err(anyhow!(
                "backtest {} is already {}",
                backtest.id,
                backtest.status.as_str()
            ));
        }

        let config = self
            .store
            .get_strategy(&backtest.strategy_id)
            .await?
            .ok_or_else(|| BacktestError::StrategyNotFound(backtest.strategy_id.clone()))?;
        let strategy = create_strategy(config.kind, &config.parameters);

        let mut symbols = if symbols.is_empty() {
            backtest.symbols.clone()
        } else {
            symbols.to_vec()
        };
        if symbols.is_empty() {
            symbols = self.market_data.default_symbols(self.sample_size).await?;
            info!(
                "Backtest {}: sampled {} active symbols",
                backtest.id,
                symbols.len()
            );
        }
        if symbols.is_empty() {
            warn!(
                "Backtest {}: no symbols available, equity curve will be cash only",
                backtest.id
            );
        }

        if backtest.status != BacktestStatus::Running {
            self.store
                .update_status(&backtest.id, BacktestStatus::Running)
                .await?;
        }
        info!(
            "Starting backtest {} ({}, {} symbols, {} to {})",
            backtest.id,
            config.kind.as_str(),
            symbols.len(),
            backtest.start_date,
            backtest.end_date
        );

        let mut portfolio = Portfolio::new(
            &backtest.id,
            backtest.initial_capital,
            backtest.commission_rate,
        );

        let mut date = backtest.start_date;
        while date <= backtest.end_date {
            if !is_trading_day(date) {
                date = date.succ_opt().expect("calendar date overflow");
                continue;
            }

            let mut closes: HashMap<String, f64> = HashMap::new();
            for symbol in &symbols {
                // A failed or empty fetch skips this symbol for the day
                // without touching the rest of the loop.
                let bar = match self.market_data.daily_bar(symbol, date).await {
                    Ok(Some(bar)) => bar,
                    Ok(None) => continue,
                    Err(fetch_error) => {
                        warn!(
                            "Market data unavailable for {} on {}: {:#}",
                            symbol, date, fetch_error
                        );
                        continue;
                    }
                };
                closes.insert(symbol.clone(), bar.close);

                let indicators = match self.market_data.indicators(symbol, date).await {
                    Ok(Some(indicators)) => indicators,
                    Ok(None) => continue,
                    Err(fetch_error) => {
                        warn!(
                            "Indicators unavailable for {} on {}: {:#}",
                            symbol, date, fetch_error
                        );
                        continue;
                    }
                };

                let signal = strategy.evaluate(&bar, &indicators, portfolio.position(symbol));
                match signal.action {
                    SignalAction::Buy => {
                        if let Some(trade) =
                            portfolio.execute_buy(symbol, date, bar.close, &signal).cloned()
                        {
                            info!(
                                "BUY: {} x{} @ {:.2} on {} ({})",
                                symbol, trade.quantity, bar.close, date, signal.reason
                            );
                            self.store.append_trade(&trade).await?;
                        }
                    }
                    SignalAction::Sell => {
                        if let Some(trade) =
                            portfolio.execute_sell(symbol, date, bar.close, &signal).cloned()
                        {
                            info!(
                                "SELL: {} x{} @ {:.2} on {}, P&L: {:.2} ({})",
                                symbol,
                                trade.quantity,
                                bar.close,
                                date,
                                trade.pnl.unwrap_or(0.0),
                                signal.reason
                            );
                            self.store.update_trade(&trade).await?;
                        }
                    }
                    SignalAction::Hold => {}
                }
            }

            let point = portfolio
                .valuate(date, |symbol| closes.get(symbol).copied())
                .clone();
            self.store.append_equity_point(&point).await?;

            date = date.succ_opt().expect("calendar date overflow");
        }

        let statistics =
            StatisticsCalculator::calculate(portfolio.trades(), portfolio.equity_curve());
        self.store.write_statistics(&backtest.id, &statistics).await?;
        self.store
            .update_status(&backtest.id, BacktestStatus::Completed)
            .await?;

        let total_trades = portfolio.trades().len();
        if let Err(publish_error) = self
            .events
            .publish(
                BACKTEST_COMPLETED_TOPIC,
                completion_payload(&backtest.id, total_trades),
            )
            .await
        {
            // The run itself is already completed; a lost notification is
            // recoverable downstream, a rolled-back run is not.
            warn!(
                "Completion event for backtest {} not published: {:#}",
                backtest.id, publish_error
            );
        }

        info!(
            "Completed backtest {}: return {:.2}%, {} trades, win rate {:.1}%",
            backtest.id, statistics.total_return, total_trades, statistics.win_rate
        );

        Ok(RunSummary {
            backtest_id: backtest.id,
            symbols,
            trading_days: portfolio.equity_curve().len(),
            total_trades,
            final_value: portfolio.total_value(),
            statistics,
        })
    }
}

/// Weekends are the only non-trading days; there is no holiday calendar.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekends_are_not_trading_days() {
        // 2024-03-04 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        assert!(is_trading_day(monday));
        assert!(!is_trading_day(saturday));
        assert!(!is_trading_day(sunday));
    }
}
