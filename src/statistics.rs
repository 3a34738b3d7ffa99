use crate::models::{BacktestStatistics, EquityPoint, Trade, TradeStatus};
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub struct StatisticsCalculator;

impl StatisticsCalculator {
    /// Derive the aggregate performance metrics for a finished run from its
    /// closed trades and the ordered equity curve. Every ratio is defined for
    /// degenerate inputs: no trades, flat curves, and zero losses all produce
    /// zeros rather than NaN or infinity.
    pub fn calculate(trades: &[Trade], equity_curve: &[EquityPoint]) -> BacktestStatistics {
        let closed: Vec<&Trade> = trades
            .iter()
            .filter(|t| t.status == TradeStatus::Closed)
            .collect();

        let mut winning_pnls = Vec::new();
        let mut losing_pnls = Vec::new();
        for trade in &closed {
            let pnl = trade.pnl.unwrap_or(0.0);
            if pnl > 0.0 {
                winning_pnls.push(pnl);
            } else if pnl < 0.0 {
                losing_pnls.push(pnl);
            }
        }

        let total_trades = closed.len() as i32;
        let winning_trades = winning_pnls.len() as i32;
        let losing_trades = losing_pnls.len() as i32;
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let avg_win = Self::average(&winning_pnls);
        let losing_magnitudes: Vec<f64> = losing_pnls.iter().map(|pnl| pnl.abs()).collect();
        let avg_loss = Self::average(&losing_magnitudes);
        let profit_factor = if avg_loss > 0.0 { avg_win / avg_loss } else { 0.0 };

        let largest_win = winning_pnls.iter().copied().fold(0.0, f64::max);
        let largest_loss = losing_pnls.iter().copied().fold(0.0, f64::min);

        BacktestStatistics {
            total_return: Self::total_return(equity_curve),
            max_drawdown: Self::max_drawdown(equity_curve),
            sharpe_ratio: Self::sharpe_ratio(equity_curve),
            win_rate,
            profit_factor,
            total_trades,
            winning_trades,
            losing_trades,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
        }
    }

    fn total_return(equity_curve: &[EquityPoint]) -> f64 {
        let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
            return 0.0;
        };
        if first.portfolio_value <= 0.0 {
            return 0.0;
        }
        (last.portfolio_value - first.portfolio_value) / first.portfolio_value * 100.0
    }

    /// Largest percentage decline from the running peak portfolio value.
    fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
        let Some(first) = equity_curve.first() else {
            return 0.0;
        };

        let mut max_drawdown = 0.0_f64;
        let mut peak = first.portfolio_value;
        for point in equity_curve {
            if point.portfolio_value > peak {
                peak = point.portfolio_value;
            } else if peak > 0.0 {
                let drawdown = (peak - point.portfolio_value) / peak * 100.0;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        max_drawdown
    }

    /// Mean daily return over its volatility, annualized by √252. The daily
    /// returns are the ones recorded on the curve, so the first point's zero
    /// participates the same way it did in the original series.
    fn sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
        if equity_curve.len() < 2 {
            return 0.0;
        }

        let returns: Vec<f64> = equity_curve.iter().map(|p| p.daily_return).collect();
        let mean_return = returns.clone().mean();
        let std_dev = returns.population_std_dev();

        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }

        mean_return / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    }

    fn average(values: &[f64]) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for value in values.iter().copied() {
            if value.is_finite() {
                sum += value;
                count += 1;
            }
        }

        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::Value;

    fn point(day: u32, value: f64, daily_return: f64) -> EquityPoint {
        EquityPoint {
            backtest_id: "b1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            portfolio_value: value,
            cash: value,
            positions_value: 0.0,
            daily_return,
        }
    }

    fn closed_trade(pnl: f64) -> Trade {
        Trade {
            id: "t".to_string(),
            backtest_id: "b1".to_string(),
            symbol: "AAPL".to_string(),
            entry_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            entry_price: 100.0,
            exit_date: Some(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()),
            exit_price: Some(100.0 + pnl),
            quantity: 1,
            commission: 0.2,
            pnl: Some(pnl),
            pnl_percent: Some(pnl),
            status: TradeStatus::Closed,
            entry_signal: Value::Null,
            exit_signal: None,
        }
    }

    #[test]
    fn empty_inputs_produce_all_zero_statistics() {
        let stats = StatisticsCalculator::calculate(&[], &[]);
        assert_eq!(stats, BacktestStatistics::default());
    }

    #[test]
    fn partitions_trades_and_computes_win_rate() {
        let trades = vec![
            closed_trade(50.0),
            closed_trade(30.0),
            closed_trade(-20.0),
            closed_trade(0.0),
        ];
        let stats = StatisticsCalculator::calculate(&trades, &[]);

        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert!((stats.win_rate - 50.0).abs() < 1e-9);
        assert!((stats.avg_win - 40.0).abs() < 1e-9);
        assert!((stats.avg_loss - 20.0).abs() < 1e-9);
        assert!((stats.profit_factor - 2.0).abs() < 1e-9);
        assert_eq!(stats.largest_win, 50.0);
        assert_eq!(stats.largest_loss, -20.0);
    }

    #[test]
    fn profit_factor_is_zero_without_losses() {
        let stats = StatisticsCalculator::calculate(&[closed_trade(50.0)], &[]);
        assert_eq!(stats.profit_factor, 0.0);
        assert!(stats.profit_factor.is_finite());
    }

    #[test]
    fn drawdown_tracks_running_peak_and_stays_bounded() {
        let curve = vec![
            point(4, 100_000.0, 0.0),
            point(5, 110_000.0, 0.1),
            point(6, 88_000.0, -0.2),
            point(7, 115_000.0, 0.3068),
            point(8, 103_500.0, -0.1),
        ];
        let stats = StatisticsCalculator::calculate(&[], &curve);

        // Worst decline: 110k -> 88k = 20%.
        assert!((stats.max_drawdown - 20.0).abs() < 1e-9);
        assert!(stats.max_drawdown >= 0.0 && stats.max_drawdown <= 100.0);
        assert!((stats.total_return - 3.5).abs() < 1e-9);
    }

    #[test]
    fn sharpe_is_zero_for_flat_curves() {
        let curve = vec![
            point(4, 100_000.0, 0.0),
            point(5, 100_000.0, 0.0),
            point(6, 100_000.0, 0.0),
        ];
        let stats = StatisticsCalculator::calculate(&[], &curve);
        assert_eq!(stats.sharpe_ratio, 0.0);
    }

    #[test]
    fn sharpe_annualizes_daily_returns() {
        let returns = [0.0, 0.01, -0.005, 0.02, 0.003];
        let mut value = 100_000.0;
        let curve: Vec<EquityPoint> = returns
            .iter()
            .enumerate()
            .map(|(i, r)| {
                value *= 1.0 + r;
                point(4 + i as u32, value, *r)
            })
            .collect();

        let stats = StatisticsCalculator::calculate(&[], &curve);

        let mean: f64 = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance: f64 =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let expected = mean / variance.sqrt() * 252.0_f64.sqrt();
        assert!((stats.sharpe_ratio - expected).abs() < 1e-9);
    }
}
