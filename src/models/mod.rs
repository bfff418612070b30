use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One fixed-interval OHLCV sample from the exchange
///
/// Prices and volumes are kept as exact decimals, parsed from the
/// numeric strings the exchange returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: i64, // epoch millis
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64, // epoch millis
    pub quote_volume: Decimal,
    pub trade_count: u64,
}

impl Candle {
    /// Open time as a UTC timestamp, `None` if out of chrono's range
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.open_time)
    }
}

/// Latest traded price for a symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Market-wide aggregates from the secondary source
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GlobalMarketData {
    pub active_cryptocurrencies: Option<u64>,
    pub markets: Option<u64>,
    pub total_market_cap_usd: Option<f64>,
    pub total_volume_24h_usd: Option<f64>,
    pub market_cap_change_percentage_24h_usd: Option<f64>,
    pub btc_dominance: Option<f64>,
    pub updated_at: Option<i64>,
}

/// A coin from the secondary source's trending list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendingCoin {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub market_cap_rank: Option<u32>,
    pub score: Option<u32>,
    pub price_btc: Option<f64>,
}

/// Fear/greed index reading with its qualitative label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FearGreedIndex {
    pub value: u8,
    pub classification: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One persisted row of the per-symbol time series, written once per pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketDataRecord {
    pub symbol: String,
    pub timestamp: i64, // candle open time, epoch millis
    pub price: Decimal,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub volume: Decimal,
    pub ma_short: Option<f64>,
    pub ma_medium: Option<f64>,
    pub ma_long: Option<f64>,
}

/// Outcome of one dispatcher invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventStatus {
    Ok,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Ok => "ok",
            EventStatus::Error => "error",
        }
    }
}

/// Append-only log entry for a dispatcher invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: Uuid,
    pub symbol: Option<String>,
    pub capability: String,
    pub status: EventStatus,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(
        capability: impl Into<String>,
        symbol: Option<String>,
        status: EventStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol,
            capability: capability.into(),
            status,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Which analyst produced a report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    Technical,
    Fundamental,
    Sentiment,
    Macro,
    Comprehensive,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Technical => "technical",
            AnalysisKind::Fundamental => "fundamental",
            AnalysisKind::Sentiment => "sentiment",
            AnalysisKind::Macro => "macro",
            AnalysisKind::Comprehensive => "comprehensive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "technical" => Some(AnalysisKind::Technical),
            "fundamental" => Some(AnalysisKind::Fundamental),
            "sentiment" => Some(AnalysisKind::Sentiment),
            "macro" => Some(AnalysisKind::Macro),
            "comprehensive" => Some(AnalysisKind::Comprehensive),
            _ => None,
        }
    }

    /// Capability that produces this kind of report
    pub fn capability(&self) -> &'static str {
        match self {
            AnalysisKind::Technical => "technical_analysis",
            AnalysisKind::Fundamental => "fundamental_analysis",
            AnalysisKind::Sentiment => "market_sentiment_analysis",
            AnalysisKind::Macro => "macro_analysis",
            AnalysisKind::Comprehensive => "comprehensive_analysis",
        }
    }

    /// Slow-moving reports are reused for the rest of the UTC day
    pub fn reusable_same_day(&self) -> bool {
        matches!(
            self,
            AnalysisKind::Fundamental | AnalysisKind::Sentiment | AnalysisKind::Macro
        )
    }
}

/// One persisted analyst report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub kind: AnalysisKind,
    pub symbol: Option<String>,
    pub content: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(
        kind: AnalysisKind,
        symbol: Option<String>,
        content: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            symbol,
            content: content.into(),
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }

    /// Written on the same UTC calendar day as `now`
    pub fn is_same_day(&self, now: DateTime<Utc>) -> bool {
        self.created_at.date_naive() == now.date_naive()
    }
}
