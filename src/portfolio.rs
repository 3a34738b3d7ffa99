use crate::models::{EquityPoint, Position, Signal, Trade, TradeStatus};
use chrono::NaiveDate;
use log::debug;
use std::collections::HashMap;
use uuid::Uuid;

/// Cap on how much of the current cash balance a single entry may consume.
const MAX_POSITION_FRACTION: f64 = 0.1;

/// The simulated account for one backtest run. Owns cash, open positions,
/// the trade ledger, and the equity curve; all mutation goes through
/// `execute_buy` / `execute_sell` / `valuate` so the books stay consistent.
///
/// A portfolio belongs to exactly one run and is never shared across runs.
pub struct Portfolio {
    backtest_id: String,
    commission_rate: f64,
    cash: f64,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    total_value: f64,
}

impl Portfolio {
    pub fn new(backtest_id: &str, initial_capital: f64, commission_rate: f64) -> Self {
        Self {
            backtest_id: backtest_id.to_string(),
            commission_rate,
            cash: initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            total_value: initial_capital,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Open a long position at `price`, sized to at most 10% of current cash
    /// including the commission on every share. An order that sizes to zero
    /// or would overdraw cash is a no-op, not an error: the signal simply
    /// goes unfilled, which the caller may log for observability.
    ///
    /// Returns the opened trade so the caller can persist it.
    pub fn execute_buy(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        price: f64,
        signal: &Signal,
    ) -> Option<&Trade> {
        if self.positions.contains_key(symbol) {
            debug!("Buy skipped for {}: position already open", symbol);
            return None;
        }
        if !(price.is_finite() && price > 0.0) {
            debug!("Buy skipped for {}: unusable price {}", symbol, price);
            return None;
        }

        let budget = (self.cash * MAX_POSITION_FRACTION).min(self.cash);
        let quantity = (budget / (price * (1.0 + self.commission_rate))).floor() as i64;
        if quantity <= 0 {
            debug!(
                "Buy skipped for {}: budget {:.2} sizes to zero at price {:.2}",
                symbol, budget, price
            );
            return None;
        }

        let commission = price * quantity as f64 * self.commission_rate;
        let total_cost = quantity as f64 * price + commission;
        if total_cost > self.cash {
            debug!(
                "Buy skipped for {}: need {:.2}, have {:.2}",
                symbol, total_cost, self.cash
            );
            return None;
        }

        self.cash -= total_cost;
        self.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                quantity,
                entry_price: price,
                entry_date: date,
                stop_loss: signal.stop_loss,
                take_profit: signal.take_profit,
            },
        );

        self.trades.push(Trade {
            id: Uuid::new_v4().to_string(),
            backtest_id: self.backtest_id.clone(),
            symbol: symbol.to_string(),
            entry_date: date,
            entry_price: price,
            exit_date: None,
            exit_price: None,
            quantity,
            commission,
            pnl: None,
            pnl_percent: None,
            status: TradeStatus::Open,
            entry_signal: signal.metadata(),
            exit_signal: None,
        });

        self.trades.last()
    }

    /// Close the open position for `symbol` at `price`, crediting the
    /// proceeds net of commission and settling pnl onto the matching open
    /// trade. A sell with no position is a no-op.
    ///
    /// Returns the closed trade so the caller can persist the update.
    pub fn execute_sell(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        price: f64,
        signal: &Signal,
    ) -> Option<&Trade> {
        let Some(position) = self.positions.remove(symbol) else {
            debug!("Sell skipped for {}: no open position", symbol);
            return None;
        };

        let quantity = position.quantity as f64;
        let commission = price * quantity * self.commission_rate;
        let proceeds = quantity * price - commission;
        let cost_basis = quantity * position.entry_price;

        self.cash += proceeds;

        let index = self
            .trades
            .iter()
            .rposition(|t| t.symbol == symbol && t.status == TradeStatus::Open)
            .expect("open position always has a matching open trade");
        let trade = &mut self.trades[index];

        // Realized pnl is net of the commissions on both legs; the entry leg
        // was recorded on the trade when the position opened.
        let pnl = proceeds - cost_basis - trade.commission;
        let pnl_percent = if cost_basis > 0.0 {
            pnl / cost_basis * 100.0
        } else {
            0.0
        };

        trade.exit_date = Some(date);
        trade.exit_price = Some(price);
        trade.pnl = Some(pnl);
        trade.pnl_percent = Some(pnl_percent);
        trade.status = TradeStatus::Closed;
        trade.exit_signal = Some(signal.metadata());
        trade.commission += commission;

        Some(&self.trades[index])
    }

    /// Mark the portfolio to market and append the day's equity point.
    /// `close_for` resolves a symbol's close for the valuation date; an
    /// unavailable close values that position at zero (stale positions are
    /// a known limitation of daily-close valuation).
    pub fn valuate<F>(&mut self, date: NaiveDate, close_for: F) -> &EquityPoint
    where
        F: Fn(&str) -> Option<f64>,
    {
        let positions_value: f64 = self
            .positions
            .values()
            .map(|p| p.quantity as f64 * close_for(&p.symbol).unwrap_or(0.0))
            .sum();
        let portfolio_value = self.cash + positions_value;

        let daily_return = if self.equity_curve.is_empty() || self.total_value <= 0.0 {
            0.0
        } else {
            (portfolio_value - self.total_value) / self.total_value
        };

        self.total_value = portfolio_value;
        self.equity_curve.push(EquityPoint {
            backtest_id: self.backtest_id.clone(),
            date,
            portfolio_value,
            cash: self.cash,
            positions_value,
            daily_return,
        });

        self.equity_curve.last().expect("point just pushed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn buy_signal() -> Signal {
        Signal::buy("test entry", Some(95.0), Some(110.0))
    }

    #[test]
    fn buy_sizes_to_ten_percent_of_cash_including_commission() {
        let mut portfolio = Portfolio::new("b1", 100_000.0, 0.001);
        let trade = portfolio
            .execute_buy("AAPL", day(4), 100.0, &buy_signal())
            .expect("order should fill");

        // floor(10_000 / (100 * 1.001)) = 99 shares
        assert_eq!(trade.quantity, 99);
        assert!((trade.commission - 9.9).abs() < 1e-9);
        assert!((portfolio.cash() - (100_000.0 - 9_900.0 - 9.9)).abs() < 1e-9);

        let position = portfolio.position("AAPL").unwrap();
        assert_eq!(position.quantity, 99);
        assert_eq!(position.stop_loss, Some(95.0));
        assert_eq!(position.take_profit, Some(110.0));
    }

    #[test]
    fn underfunded_buy_is_a_true_no_op() {
        let mut portfolio = Portfolio::new("b1", 500.0, 0.001);
        // 10% of cash cannot afford a single share.
        let result = portfolio.execute_buy("AAPL", day(4), 100.0, &buy_signal());

        assert!(result.is_none());
        assert_eq!(portfolio.cash(), 500.0);
        assert_eq!(portfolio.open_position_count(), 0);
        assert!(portfolio.trades().is_empty());
    }

    #[test]
    fn second_buy_for_held_symbol_is_rejected() {
        let mut portfolio = Portfolio::new("b1", 100_000.0, 0.001);
        portfolio.execute_buy("AAPL", day(4), 100.0, &buy_signal());
        let cash_after_first = portfolio.cash();

        assert!(portfolio
            .execute_buy("AAPL", day(5), 101.0, &buy_signal())
            .is_none());
        assert_eq!(portfolio.cash(), cash_after_first);
        assert_eq!(portfolio.trades().len(), 1);
    }

    #[test]
    fn round_trip_settles_pnl_net_of_both_commissions() {
        let mut portfolio = Portfolio::new("b1", 100_000.0, 0.001);
        portfolio.execute_buy("AAPL", day(4), 100.0, &buy_signal());
        let trade = portfolio
            .execute_sell("AAPL", day(8), 110.0, &Signal::sell("test exit"))
            .expect("position should close")
            .clone();

        let entry_commission = 100.0 * 99.0 * 0.001;
        let exit_commission = 110.0 * 99.0 * 0.001;
        let expected_pnl = 99.0 * (110.0 - 100.0) - (entry_commission + exit_commission);

        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.exit_date, Some(day(8)));
        assert_eq!(trade.exit_price, Some(110.0));
        assert!((trade.pnl.unwrap() - expected_pnl).abs() < 1e-9);
        assert!((trade.commission - (entry_commission + exit_commission)).abs() < 1e-9);
        assert_eq!(portfolio.open_position_count(), 0);

        let pnl_percent = trade.pnl_percent.unwrap();
        assert!((pnl_percent - expected_pnl / 9_900.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn sell_without_position_changes_nothing() {
        let mut portfolio = Portfolio::new("b1", 100_000.0, 0.001);
        assert!(portfolio
            .execute_sell("AAPL", day(4), 100.0, &Signal::sell("test exit"))
            .is_none());
        assert_eq!(portfolio.cash(), 100_000.0);
    }

    #[test]
    fn valuation_reconciles_cash_plus_positions() {
        let mut portfolio = Portfolio::new("b1", 100_000.0, 0.001);
        portfolio.execute_buy("AAPL", day(4), 100.0, &buy_signal());
        let cash = portfolio.cash();

        let point = portfolio.valuate(day(4), |_| Some(102.0)).clone();
        assert!((point.portfolio_value - (cash + 99.0 * 102.0)).abs() < 1e-9);
        assert_eq!(point.daily_return, 0.0);

        // Next day the close moves; the return is measured off the prior value.
        let previous = point.portfolio_value;
        let point = portfolio.valuate(day(5), |_| Some(104.0)).clone();
        let expected = (point.portfolio_value - previous) / previous;
        assert!((point.daily_return - expected).abs() < 1e-12);
    }

    #[test]
    fn missing_close_values_position_at_zero() {
        let mut portfolio = Portfolio::new("b1", 100_000.0, 0.001);
        portfolio.execute_buy("AAPL", day(4), 100.0, &buy_signal());
        let cash = portfolio.cash();

        let point = portfolio.valuate(day(4), |_| None);
        assert_eq!(point.positions_value, 0.0);
        assert!((point.portfolio_value - cash).abs() < 1e-9);
    }
}
