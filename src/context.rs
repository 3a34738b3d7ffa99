use crate::database::Database;
use crate::events::EventPublisher;
use crate::market_data::{CachedMarketData, MarketDataProvider};
use crate::orchestrator::BacktestOrchestrator;
use crate::store::ResultStore;
use anyhow::Result;
use std::sync::Arc;

/// Per-process wiring. The database connection, the market-data cache, and
/// the event publisher are constructed once here and injected into every
/// orchestrator; nothing in the crate reaches for ambient globals.
pub struct AppContext {
    store: Arc<Database>,
    market_data: Arc<CachedMarketData>,
}

impl AppContext {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let store = Arc::new(Database::new(database_url).await?);
        let provider: Arc<dyn MarketDataProvider> = store.clone();
        let market_data = Arc::new(CachedMarketData::new(provider));
        Ok(Self { store, market_data })
    }

    pub fn store(&self) -> Arc<dyn ResultStore> {
        self.store.clone()
    }

    pub fn database(&self) -> Arc<Database> {
        self.store.clone()
    }

    pub fn orchestrator(&self, sample_size: i64) -> BacktestOrchestrator {
        let events: Arc<dyn EventPublisher> = self.store.clone();
        BacktestOrchestrator::new(self.store.clone(), self.market_data.clone(), events)
            .with_sample_size(sample_size)
    }
}
