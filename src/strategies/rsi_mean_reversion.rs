use crate::models::{Candle, IndicatorSet, Position, Signal, StrategyKind};
use crate::params::{get_param, get_param_fraction};
use std::collections::HashMap;

pub struct RsiMeanReversionStrategy {
    oversold: f64,
    overbought: f64,
    stop_loss: f64,
}

impl RsiMeanReversionStrategy {
    pub fn new(parameters: &HashMap<String, f64>) -> Self {
        Self {
            oversold: get_param(parameters, "oversold", 30.0),
            overbought: get_param(parameters, "overbought", 70.0),
            stop_loss: get_param_fraction(parameters, "stop_loss", 0.05),
        }
    }
}

impl super::Strategy for RsiMeanReversionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RsiMeanReversion
    }

    fn evaluate(
        &self,
        bar: &Candle,
        indicators: &IndicatorSet,
        position: Option<&Position>,
    ) -> Signal {
        let Some(rsi) = indicators.rsi_14 else {
            return Signal::hold("RSI not available");
        };

        match position {
            None => {
                if rsi < self.oversold {
                    return Signal::buy(
                        format!("RSI oversold at {:.1}", rsi),
                        Some(bar.close * (1.0 - self.stop_loss)),
                        None,
                    );
                }
            }
            Some(position) => {
                if rsi > self.overbought {
                    return Signal::sell(format!("RSI overbought at {:.1}", rsi));
                }
                if let Some(signal) = super::stop_loss_exit(bar, position) {
                    return signal;
                }
            }
        }

        Signal::hold("RSI in neutral range")
    }
}
