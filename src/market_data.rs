use crate::models::{Candle, IndicatorSet};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::Arc;

/// Read side of the analytic store: one daily bar and one indicator row per
/// symbol per trading day. `None` means the day genuinely has no data for
/// that symbol (holiday, listing gap, stale ingestion) and the simulator
/// skips the symbol for the day.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn daily_bar(&self, symbol: &str, date: NaiveDate) -> Result<Option<Candle>>;
    async fn indicators(&self, symbol: &str, date: NaiveDate) -> Result<Option<IndicatorSet>>;
    /// Sample of the active universe used when a run names no symbols.
    /// Deterministic ordering so repeated runs see the same population.
    async fn default_symbols(&self, limit: i64) -> Result<Vec<String>>;
}

/// Memoizing decorator over a provider. Fetches are keyed per
/// (symbol, date) and absence is cached alongside presence, so a symbol with
/// a data gap costs one store round trip no matter how many runs replay the
/// same window. Errors are not cached; the next caller retries.
pub struct CachedMarketData {
    inner: Arc<dyn MarketDataProvider>,
    bars: DashMap<(String, NaiveDate), Option<Candle>>,
    indicators: DashMap<(String, NaiveDate), Option<IndicatorSet>>,
}

impl CachedMarketData {
    pub fn new(inner: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            inner,
            bars: DashMap::new(),
            indicators: DashMap::new(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.bars.len() + self.indicators.len()
    }
}

#[async_trait]
impl MarketDataProvider for CachedMarketData {
    async fn daily_bar(&self, symbol: &str, date: NaiveDate) -> Result<Option<Candle>> {
        let key = (symbol.to_string(), date);
        if let Some(cached) = self.bars.get(&key) {
            return Ok(cached.clone());
        }

        let fetched = self.inner.daily_bar(symbol, date).await?;
        self.bars.insert(key, fetched.clone());
        Ok(fetched)
    }

    async fn indicators(&self, symbol: &str, date: NaiveDate) -> Result<Option<IndicatorSet>> {
        let key = (symbol.to_string(), date);
        if let Some(cached) = self.indicators.get(&key) {
            return Ok(cached.clone());
        }

        let fetched = self.inner.indicators(symbol, date).await?;
        self.indicators.insert(key, fetched.clone());
        Ok(fetched)
    }

    async fn default_symbols(&self, limit: i64) -> Result<Vec<String>> {
        self.inner.default_symbols(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        bar_fetches: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for CountingProvider {
        async fn daily_bar(&self, symbol: &str, date: NaiveDate) -> Result<Option<Candle>> {
            self.bar_fetches.fetch_add(1, Ordering::SeqCst);
            // Odd days have data, even days are gaps.
            if date.day() % 2 == 1 {
                Ok(Some(Candle {
                    symbol: symbol.to_string(),
                    date,
                    open: 100.0,
                    high: 101.0,
                    low: 99.0,
                    close: 100.5,
                    volume: 1_000,
                }))
            } else {
                Ok(None)
            }
        }

        async fn indicators(&self, _symbol: &str, _date: NaiveDate) -> Result<Option<IndicatorSet>> {
            Ok(None)
        }

        async fn default_symbols(&self, _limit: i64) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn repeated_fetches_hit_the_cache_including_absent_days() {
        let provider = Arc::new(CountingProvider {
            bar_fetches: AtomicUsize::new(0),
        });
        let cached = CachedMarketData::new(provider.clone());
        let present = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let absent = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();

        for _ in 0..3 {
            assert!(cached.daily_bar("AAPL", present).await.unwrap().is_some());
            assert!(cached.daily_bar("AAPL", absent).await.unwrap().is_none());
        }

        assert_eq!(provider.bar_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(cached.cached_entries(), 2);
    }
}
