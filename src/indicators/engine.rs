use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::macd::macd_series;
use super::moving_average::calculate_sma;
use super::rsi::calculate_rsi;
use crate::models::Candle;

/// Indicator windows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub ma_short: usize,
    pub ma_medium: usize,
    pub ma_long: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            ma_short: 20,
            ma_medium: 50,
            ma_long: 200,
        }
    }
}

/// Latest indicator values for one candle history
///
/// Every numeric field is `None` when there was not enough history to
/// compute it. Booleans are `false` when their inputs are undefined.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub macd_bullish_crossover: bool,
    pub macd_bearish_crossover: bool,
    pub ma_short: Option<f64>,
    pub ma_medium: Option<f64>,
    pub ma_long: Option<f64>,
    pub price_above_ma_short: bool,
    pub price_above_ma_medium: bool,
    pub price_above_ma_long: bool,
    pub current_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
}

impl IndicatorSnapshot {
    /// Compact one-line summary for logs and analyst prompts
    pub fn summary(&self) -> String {
        fn fmt(v: Option<f64>) -> String {
            v.map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "n/a".to_string())
        }

        format!(
            "price={} rsi={} macd={} signal={} hist={} ma_short={} ma_medium={} ma_long={} high={} low={}",
            fmt(self.current_price),
            fmt(self.rsi),
            fmt(self.macd),
            fmt(self.macd_signal),
            fmt(self.macd_histogram),
            fmt(self.ma_short),
            fmt(self.ma_medium),
            fmt(self.ma_long),
            fmt(self.high_price),
            fmt(self.low_price),
        )
    }
}

/// Pure indicator computation over a candle history (oldest first)
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn compute(&self, candles: &[Candle]) -> IndicatorSnapshot {
        compute_snapshot(candles, &self.config)
    }
}

/// Compute the indicator snapshot for `candles`
///
/// Never fails: a history too short for a window just leaves that field
/// undefined, and an empty history yields an all-undefined snapshot.
pub fn compute_snapshot(candles: &[Candle], config: &IndicatorConfig) -> IndicatorSnapshot {
    let Some(closes) = candles
        .iter()
        .map(|c| c.close.to_f64())
        .collect::<Option<Vec<f64>>>()
    else {
        tracing::warn!("Candle close not representable as f64, skipping indicators");
        return IndicatorSnapshot::default();
    };

    let Some(&current) = closes.last() else {
        return IndicatorSnapshot::default();
    };

    let rsi = calculate_rsi(&closes, config.rsi_period);

    let macd = macd_series(&closes, config.macd_fast, config.macd_slow, config.macd_signal);
    let (macd_value, macd_signal, macd_histogram) = macd.latest();

    let ma_short = calculate_sma(&closes, config.ma_short);
    let ma_medium = calculate_sma(&closes, config.ma_medium);
    let ma_long = calculate_sma(&closes, config.ma_long);

    let above = |ma: Option<f64>| ma.is_some_and(|ma| current > ma);

    let high_price = candles
        .iter()
        .filter_map(|c| c.high.to_f64())
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))));
    let low_price = candles
        .iter()
        .filter_map(|c| c.low.to_f64())
        .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))));

    IndicatorSnapshot {
        rsi,
        macd: macd_value,
        macd_signal,
        macd_histogram,
        macd_bullish_crossover: macd.is_bullish_crossover(),
        macd_bearish_crossover: macd.is_bearish_crossover(),
        ma_short,
        ma_medium,
        ma_long,
        price_above_ma_short: above(ma_short),
        price_above_ma_medium: above(ma_medium),
        price_above_ma_long: above(ma_long),
        current_price: Some(current),
        high_price,
        low_price,
    }
}
