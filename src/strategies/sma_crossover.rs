use crate::models::{Candle, IndicatorSet, Position, Signal, StrategyKind};
use crate::params::{get_param_fraction, get_param_usize};
use std::collections::HashMap;

pub struct SmaCrossoverStrategy {
    short_window: usize,
    long_window: usize,
    stop_loss: f64,
    take_profit: f64,
}

impl SmaCrossoverStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> Self {
        Self {
            short_window: get_param_usize(parameters, "short_window", 20, 1),
            long_window: get_param_usize(parameters, "long_window", 50, 1),
            stop_loss: get_param_fraction(parameters, "stop_loss", 0.05),
            take_profit: get_param_fraction(parameters, "take_profit", 0.10),
        }
    }
}

/// The indicator store precomputes the 20/50 pair; other windows read as
/// absent and fall through to hold.
fn sma_for_window(indicators: &IndicatorSet, window: usize) -> Option<f64> {
    match window {
        20 => indicators.sma_20,
        50 => indicators.sma_50,
        _ => None,
    }
}

impl super::Strategy for SmaCrossoverStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SmaCrossover
    }

    fn evaluate(
        &self,
        bar: &Candle,
        indicators: &IndicatorSet,
        position: Option<&Position>,
    ) -> Signal {
        let short_ma = sma_for_window(indicators, self.short_window);
        let long_ma = sma_for_window(indicators, self.long_window);
        let (Some(short_ma), Some(long_ma)) = (short_ma, long_ma) else {
            return Signal::hold("Moving averages not available");
        };

        match position {
            None => {
                if short_ma > long_ma {
                    return Signal::buy(
                        "SMA crossover - short MA above long MA",
                        Some(bar.close * (1.0 - self.stop_loss)),
                        Some(bar.close * (1.0 + self.take_profit)),
                    );
                }
            }
            Some(position) => {
                if short_ma < long_ma {
                    return Signal::sell("SMA crossover - short MA below long MA");
                }
                if let Some(signal) = super::stop_loss_exit(bar, position) {
                    return signal;
                }
                if let Some(signal) = super::take_profit_exit(bar, position) {
                    return signal;
                }
            }
        }

        Signal::hold("No crossover")
    }
}
