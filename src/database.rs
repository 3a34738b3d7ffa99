use crate::events::EventPublisher;
use crate::market_data::MarketDataProvider;
use crate::models::{
    parse_parameter_map, Backtest, BacktestRequest, BacktestStatistics, BacktestStatus, Candle,
    EquityPoint, IndicatorSet, StrategyConfig, Trade,
};
use crate::store::ResultStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use log::{error, warn};
use serde_json::Value;
use std::str::FromStr;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

const DEFAULT_COMMISSION_RATE: f64 = 0.001;
const DEFAULT_SLIPPAGE_RATE: f64 = 0.001;

pub struct Database {
    client: Client,
}

impl Database {
    pub async fn new<S: AsRef<str>>(database_url: S) -> Result<Self> {
        let database_url = database_url.as_ref().to_string();
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to PostgreSQL at {}", database_url))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        Ok(Self { client })
    }

    pub async fn get_setting_value(&self, setting_key: &str) -> Result<Option<String>> {
        let row = self
            .client
            .query_opt(
                "SELECT value FROM settings WHERE setting_key = $1",
                &[&setting_key],
            )
            .await?;
        Ok(row.map(|row| row.get::<_, String>(0)))
    }

    /// Commission and slippage rates from the settings table, falling back to
    /// the service defaults when a key is absent or unparseable.
    pub async fn resolve_trading_costs(&self) -> Result<(f64, f64)> {
        let commission = self
            .setting_rate("BACKTEST_COMMISSION_RATE")
            .await?
            .unwrap_or(DEFAULT_COMMISSION_RATE);
        let slippage = self
            .setting_rate("BACKTEST_SLIPPAGE_RATE")
            .await?
            .unwrap_or(DEFAULT_SLIPPAGE_RATE);
        Ok((commission, slippage))
    }

    async fn setting_rate(&self, key: &str) -> Result<Option<f64>> {
        let Some(raw) = self.get_setting_value(key).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => Ok(Some(value)),
            _ => {
                warn!("Ignoring unusable setting {} (value: {})", key, raw);
                Ok(None)
            }
        }
    }
}

fn backtest_from_row(row: &Row) -> Result<Backtest> {
    let status_raw: String = row.get("status");
    let total_trades: Option<i32> = row.get("total_trades");
    let statistics = total_trades.map(|total_trades| BacktestStatistics {
        total_return: row.get::<_, Option<f64>>("total_return").unwrap_or(0.0),
        max_drawdown: row.get::<_, Option<f64>>("max_drawdown").unwrap_or(0.0),
        sharpe_ratio: row.get::<_, Option<f64>>("sharpe_ratio").unwrap_or(0.0),
        win_rate: row.get::<_, Option<f64>>("win_rate").unwrap_or(0.0),
        profit_factor: row.get::<_, Option<f64>>("profit_factor").unwrap_or(0.0),
        total_trades,
        winning_trades: row.get::<_, Option<i32>>("winning_trades").unwrap_or(0),
        losing_trades: row.get::<_, Option<i32>>("losing_trades").unwrap_or(0),
        avg_win: row.get::<_, Option<f64>>("avg_win").unwrap_or(0.0),
        avg_loss: row.get::<_, Option<f64>>("avg_loss").unwrap_or(0.0),
        largest_win: row.get::<_, Option<f64>>("largest_win").unwrap_or(0.0),
        largest_loss: row.get::<_, Option<f64>>("largest_loss").unwrap_or(0.0),
    });

    Ok(Backtest {
        id: row.get("id"),
        strategy_id: row.get("strategy_id"),
        name: row.get("name"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        initial_capital: row.get("initial_capital"),
        commission_rate: row.get("commission_rate"),
        slippage_rate: row.get("slippage_rate"),
        symbols: row.get("symbols"),
        status: BacktestStatus::from_str(&status_raw)?,
        statistics,
        created_at: row.get("created_at"),
    })
}

fn trade_from_row(row: &Row) -> Result<Trade> {
    let status_raw: String = row.get("status");
    Ok(Trade {
        id: row.get("id"),
        backtest_id: row.get("backtest_id"),
        symbol: row.get("symbol"),
        entry_date: row.get("entry_date"),
        entry_price: row.get("entry_price"),
        exit_date: row.get("exit_date"),
        exit_price: row.get("exit_price"),
        quantity: row.get("quantity"),
        commission: row.get("commission"),
        pnl: row.get("pnl"),
        pnl_percent: row.get("pnl_percent"),
        status: crate::models::TradeStatus::from_str(&status_raw)?,
        entry_signal: row
            .get::<_, Option<Value>>("entry_signal")
            .unwrap_or(Value::Null),
        exit_signal: row.get("exit_signal"),
    })
}

fn equity_point_from_row(row: &Row) -> EquityPoint {
    EquityPoint {
        backtest_id: row.get("backtest_id"),
        date: row.get("trade_date"),
        portfolio_value: row.get("portfolio_value"),
        cash: row.get("cash"),
        positions_value: row.get("positions_value"),
        daily_return: row.get("daily_return"),
    }
}

#[async_trait]
impl ResultStore for Database {
    async fn create_backtest(
        &self,
        request: &BacktestRequest,
        status: BacktestStatus,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        self.client
            .execute(
                "INSERT INTO backtests (id, strategy_id, name, start_date, end_date,
                     initial_capital, commission_rate, slippage_rate, symbols, status, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    &id,
                    &request.strategy_id,
                    &request.name,
                    &request.start_date,
                    &request.end_date,
                    &request.initial_capital,
                    &request.commission_rate,
                    &request.slippage_rate,
                    &request.symbols,
                    &status.as_str(),
                    &created_at,
                ],
            )
            .await
            .context("failed to insert backtest record")?;
        Ok(id)
    }

    async fn get_backtest(&self, id: &str) -> Result<Option<Backtest>> {
        let row = self
            .client
            .query_opt("SELECT * FROM backtests WHERE id = $1", &[&id])
            .await?;
        row.as_ref().map(backtest_from_row).transpose()
    }

    async fn get_strategy(&self, id: &str) -> Result<Option<StrategyConfig>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, name, kind, parameters FROM strategies WHERE id = $1",
                &[&id],
            )
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let kind_raw: String = row.get("kind");
        let parameters: Value = row.get("parameters");
        Ok(Some(StrategyConfig {
            id: row.get("id"),
            name: row.get("name"),
            kind: kind_raw.parse()?,
            parameters: parse_parameter_map(&parameters),
        }))
    }

    async fn update_status(&self, id: &str, status: BacktestStatus) -> Result<()> {
        if status.is_terminal() {
            self.client
                .execute(
                    "UPDATE backtests SET status = $1, completed_at = NOW() WHERE id = $2",
                    &[&status.as_str(), &id],
                )
                .await?;
        } else {
            self.client
                .execute(
                    "UPDATE backtests SET status = $1 WHERE id = $2",
                    &[&status.as_str(), &id],
                )
                .await?;
        }
        Ok(())
    }

    async fn append_trade(&self, trade: &Trade) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO backtest_trades (id, backtest_id, symbol, entry_date, entry_price,
                     quantity, commission, status, entry_signal)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &trade.id,
                    &trade.backtest_id,
                    &trade.symbol,
                    &trade.entry_date,
                    &trade.entry_price,
                    &trade.quantity,
                    &trade.commission,
                    &trade.status.as_str(),
                    &trade.entry_signal,
                ],
            )
            .await
            .context("failed to insert trade record")?;
        Ok(())
    }

    async fn update_trade(&self, trade: &Trade) -> Result<()> {
        self.client
            .execute(
                "UPDATE backtest_trades
                 SET exit_date = $1, exit_price = $2, pnl = $3, pnl_percent = $4,
                     commission = $5, status = $6, exit_signal = $7
                 WHERE id = $8",
                &[
                    &trade.exit_date,
                    &trade.exit_price,
                    &trade.pnl,
                    &trade.pnl_percent,
                    &trade.commission,
                    &trade.status.as_str(),
                    &trade.exit_signal,
                    &trade.id,
                ],
            )
            .await
            .context("failed to update trade record")?;
        Ok(())
    }

    async fn append_equity_point(&self, point: &EquityPoint) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO backtest_equity_curve (backtest_id, trade_date, portfolio_value,
                     cash, positions_value, daily_return)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (backtest_id, trade_date) DO UPDATE SET
                     portfolio_value = EXCLUDED.portfolio_value,
                     cash = EXCLUDED.cash,
                     positions_value = EXCLUDED.positions_value,
                     daily_return = EXCLUDED.daily_return",
                &[
                    &point.backtest_id,
                    &point.date,
                    &point.portfolio_value,
                    &point.cash,
                    &point.positions_value,
                    &point.daily_return,
                ],
            )
            .await
            .context("failed to insert equity curve point")?;
        Ok(())
    }

    async fn write_statistics(&self, id: &str, statistics: &BacktestStatistics) -> Result<()> {
        self.client
            .execute(
                "UPDATE backtests SET
                     total_return = $1, max_drawdown = $2, sharpe_ratio = $3, win_rate = $4,
                     profit_factor = $5, total_trades = $6, winning_trades = $7,
                     losing_trades = $8, avg_win = $9, avg_loss = $10, largest_win = $11,
                     largest_loss = $12
                 WHERE id = $13",
                &[
                    &statistics.total_return,
                    &statistics.max_drawdown,
                    &statistics.sharpe_ratio,
                    &statistics.win_rate,
                    &statistics.profit_factor,
                    &statistics.total_trades,
                    &statistics.winning_trades,
                    &statistics.losing_trades,
                    &statistics.avg_win,
                    &statistics.avg_loss,
                    &statistics.largest_win,
                    &statistics.largest_loss,
                    &id,
                ],
            )
            .await
            .context("failed to write backtest statistics")?;
        Ok(())
    }

    async fn list_trades(&self, backtest_id: &str) -> Result<Vec<Trade>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM backtest_trades WHERE backtest_id = $1 ORDER BY entry_date, id",
                &[&backtest_id],
            )
            .await?;
        rows.iter().map(trade_from_row).collect()
    }

    async fn list_equity_curve(&self, backtest_id: &str) -> Result<Vec<EquityPoint>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM backtest_equity_curve WHERE backtest_id = $1 ORDER BY trade_date",
                &[&backtest_id],
            )
            .await?;
        Ok(rows.iter().map(equity_point_from_row).collect())
    }

    async fn list_pending_backtests(&self) -> Result<Vec<Backtest>> {
        let rows = self
            .client
            .query(
                "SELECT * FROM backtests WHERE status = 'pending' ORDER BY created_at, id",
                &[],
            )
            .await?;
        rows.iter().map(backtest_from_row).collect()
    }
}

#[async_trait]
impl MarketDataProvider for Database {
    async fn daily_bar(&self, symbol: &str, date: NaiveDate) -> Result<Option<Candle>> {
        let row = self
            .client
            .query_opt(
                "SELECT symbol, trade_date, open, high, low, close, volume
                 FROM ohlcv WHERE symbol = $1 AND trade_date = $2",
                &[&symbol, &date],
            )
            .await?;
        Ok(row.map(|row| Candle {
            symbol: row.get("symbol"),
            date: row.get("trade_date"),
            open: row.get("open"),
            high: row.get("high"),
            low: row.get("low"),
            close: row.get("close"),
            volume: row.get("volume"),
        }))
    }

    async fn indicators(&self, symbol: &str, date: NaiveDate) -> Result<Option<IndicatorSet>> {
        let row = self
            .client
            .query_opt(
                "SELECT sma_20, sma_50, ema_12, ema_26, rsi_14, macd, macd_signal,
                        bb_upper, bb_middle, bb_lower
                 FROM indicators WHERE symbol = $1 AND trade_date = $2",
                &[&symbol, &date],
            )
            .await?;
        Ok(row.map(|row| IndicatorSet {
            sma_20: row.get("sma_20"),
            sma_50: row.get("sma_50"),
            ema_12: row.get("ema_12"),
            ema_26: row.get("ema_26"),
            rsi_14: row.get("rsi_14"),
            macd: row.get("macd"),
            macd_signal: row.get("macd_signal"),
            bb_upper: row.get("bb_upper"),
            bb_middle: row.get("bb_middle"),
            bb_lower: row.get("bb_lower"),
        }))
    }

    async fn default_symbols(&self, limit: i64) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT symbol FROM symbols WHERE is_active = TRUE ORDER BY symbol LIMIT $1",
                &[&limit],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

#[async_trait]
impl EventPublisher for Database {
    async fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        let created_at = Utc::now();
        self.client
            .execute(
                "INSERT INTO system_events (topic, payload, created_at) VALUES ($1, $2, $3)",
                &[&topic, &payload, &created_at],
            )
            .await
            .context("failed to publish system event")?;
        Ok(())
    }
}
