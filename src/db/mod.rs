pub mod postgres;

pub use postgres::PostgresStore;

use crate::models::{AnalysisKind, AnalysisRecord, MarketDataRecord, TriggerEvent};
use crate::Result;
use async_trait::async_trait;

/// Market data time series, dispatcher event log and analyst reports
///
/// Stores that only keep the time series can rely on the default
/// report and event methods.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Persist one pass's row for a symbol; an existing `(symbol, timestamp)` row is kept
    async fn save_market_data(&self, record: &MarketDataRecord) -> Result<()>;

    /// Append one dispatcher invocation
    async fn record_event(&self, event: &TriggerEvent) -> Result<()>;

    /// Newest invocations first
    async fn recent_events(&self, _limit: usize) -> Result<Vec<TriggerEvent>> {
        Ok(Vec::new())
    }

    async fn save_analysis(&self, _record: &AnalysisRecord) -> Result<()> {
        Ok(())
    }

    /// Newest report of `kind`; `symbol` is `None` for market-wide kinds
    async fn latest_analysis(
        &self,
        _kind: AnalysisKind,
        _symbol: Option<&str>,
    ) -> Result<Option<AnalysisRecord>> {
        Ok(None)
    }
}
