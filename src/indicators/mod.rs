// Technical indicators module
// Implements RSI, MACD and moving averages over candle closes

pub mod engine;
pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use engine::{compute_snapshot, IndicatorConfig, IndicatorEngine, IndicatorSnapshot};
pub use macd::{macd_series, MacdSeries};
pub use moving_average::{calculate_ema, calculate_sma, ema_series, sma_series};
pub use rsi::{calculate_rsi, rsi_series};
