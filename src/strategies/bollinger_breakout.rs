use crate::models::{Candle, IndicatorSet, Position, Signal, StrategyKind};
use crate::params::get_param_fraction;
use std::collections::HashMap;

/// Momentum breakout over the Bollinger channel: enter above the upper band,
/// exit below the lower band.
pub struct BollingerBreakoutStrategy {
    stop_loss: f64,
    take_profit: f64,
}

impl BollingerBreakoutStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> Self {
        Self {
            stop_loss: get_param_fraction(parameters, "stop_loss", 0.05),
            take_profit: get_param_fraction(parameters, "take_profit", 0.10),
        }
    }
}

impl super::Strategy for BollingerBreakoutStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BollingerBreakout
    }

    fn evaluate(
        &self,
        bar: &Candle,
        indicators: &IndicatorSet,
        position: Option<&Position>,
    ) -> Signal {
        let (Some(upper_band), Some(lower_band)) = (indicators.bb_upper, indicators.bb_lower)
        else {
            return Signal::hold("Bollinger bands not available");
        };

        match position {
            None => {
                if bar.close > upper_band {
                    return Signal::buy(
                        "Bollinger upper band breakout",
                        Some(bar.close * (1.0 - self.stop_loss)),
                        Some(bar.close * (1.0 + self.take_profit)),
                    );
                }
            }
            Some(position) => {
                if bar.close < lower_band {
                    return Signal::sell("Bollinger lower band breakdown");
                }
                if let Some(signal) = super::stop_loss_exit(bar, position) {
                    return signal;
                }
                if let Some(signal) = super::take_profit_exit(bar, position) {
                    return signal;
                }
            }
        }

        Signal::hold("Inside Bollinger channel")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalAction;
    use crate::strategy::test_fixtures::{bar, open_position};
    use crate::strategy::Strategy;

    fn indicators(lower: f64, upper: f64) -> IndicatorSet {
        IndicatorSet {
            bb_lower: Some(lower),
            bb_upper: Some(upper),
            bb_middle: Some((lower + upper) / 2.0),
            ..Default::default()
        }
    }

    #[test]
    fn buys_above_upper_band() {
        let strategy = BollingerBreakoutStrategy::new(&HashMap::new());
        let signal = strategy.evaluate(&bar(112.0), &indicators(90.0, 110.0), None);

        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.stop_loss.is_some());
        assert!(signal.take_profit.is_some());
    }

    #[test]
    fn sells_below_lower_band_while_holding() {
        let strategy = BollingerBreakoutStrategy::new(&HashMap::new());
        let position = open_position(112.0, Some(106.4), Some(123.2));
        let signal = strategy.evaluate(&bar(89.0), &indicators(90.0, 110.0), Some(&position));

        assert_eq!(signal.action, SignalAction::Sell);
    }

    #[test]
    fn take_profit_exit_inside_channel() {
        let strategy = BollingerBreakoutStrategy::new(&HashMap::new());
        let position = open_position(100.0, Some(95.0), Some(104.0));
        let signal = strategy.evaluate(&bar(105.0), &indicators(90.0, 110.0), Some(&position));

        assert_eq!(signal.action, SignalAction::Sell);
        assert!(signal.reason.contains("Take profit"));
    }

    #[test]
    fn holds_inside_channel_when_flat() {
        let strategy = BollingerBreakoutStrategy::new(&HashMap::new());
        let signal = strategy.evaluate(&bar(100.0), &indicators(90.0, 110.0), None);

        assert_eq!(signal.action, SignalAction::Hold);
    }
}
