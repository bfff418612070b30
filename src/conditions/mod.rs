// Special condition detection
// Turns an indicator snapshot into the anomalies that bypass the heartbeat schedule

use crate::indicators::IndicatorSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// RSI levels and which detectors are enabled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub rsi_extreme_overbought: f64,
    pub rsi_extreme_oversold: f64,
    pub rsi_extreme_detection: bool,
    /// Also emit the milder overbought/oversold labels
    pub mild_rsi_detection: bool,
    pub macd_cross_detection: bool,
    pub ma_break_detection: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            rsi_extreme_overbought: 80.0,
            rsi_extreme_oversold: 20.0,
            rsi_extreme_detection: true,
            mild_rsi_detection: false,
            macd_cross_detection: true,
            ma_break_detection: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    RsiExtremeOverbought,
    RsiExtremeOversold,
    RsiOverbought,
    RsiOversold,
    MacdGoldenCross,
    MacdDeathCross,
    /// Price above the long MA but not above the medium MA
    MaBreakout,
    /// Price above the medium MA but not above the long MA
    MaBreakdown,
}

impl ConditionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConditionKind::RsiExtremeOverbought => "RSI extreme overbought",
            ConditionKind::RsiExtremeOversold => "RSI extreme oversold",
            ConditionKind::RsiOverbought => "RSI overbought",
            ConditionKind::RsiOversold => "RSI oversold",
            ConditionKind::MacdGoldenCross => "MACD golden cross",
            ConditionKind::MacdDeathCross => "MACD death cross",
            ConditionKind::MaBreakout => "MA breakout",
            ConditionKind::MaBreakdown => "MA breakdown",
        }
    }
}

/// One detected anomaly plus the value and threshold that fired it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCondition {
    pub kind: ConditionKind,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
}

impl TriggerCondition {
    fn new(kind: ConditionKind, value: Option<f64>, threshold: Option<f64>) -> Self {
        Self {
            kind,
            value,
            threshold,
        }
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.label())?;
        match (self.value, self.threshold) {
            (Some(value), Some(threshold)) => {
                write!(f, ": {:.1} (threshold {:.1})", value, threshold)
            }
            (Some(value), None) => write!(f, ": {:.4}", value),
            _ => Ok(()),
        }
    }
}

/// Stateless evaluator over configured thresholds
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator {
    thresholds: Thresholds,
}

impl ConditionEvaluator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn evaluate(&self, symbol: &str, snapshot: &IndicatorSnapshot) -> Vec<TriggerCondition> {
        evaluate(symbol, snapshot, &self.thresholds)
    }
}

/// Detect special conditions in `snapshot`
///
/// Order is stable: RSI, then MACD, then moving averages. An extreme RSI
/// label suppresses the matching mild one.
pub fn evaluate(
    symbol: &str,
    snapshot: &IndicatorSnapshot,
    thresholds: &Thresholds,
) -> Vec<TriggerCondition> {
    let mut conditions = Vec::new();

    if let Some(rsi) = snapshot.rsi {
        let extreme = if !thresholds.rsi_extreme_detection {
            None
        } else if rsi >= thresholds.rsi_extreme_overbought {
            Some((ConditionKind::RsiExtremeOverbought, thresholds.rsi_extreme_overbought))
        } else if rsi <= thresholds.rsi_extreme_oversold {
            Some((ConditionKind::RsiExtremeOversold, thresholds.rsi_extreme_oversold))
        } else {
            None
        };

        let mild = if !thresholds.mild_rsi_detection {
            None
        } else if rsi >= thresholds.rsi_overbought {
            Some((ConditionKind::RsiOverbought, thresholds.rsi_overbought))
        } else if rsi <= thresholds.rsi_oversold {
            Some((ConditionKind::RsiOversold, thresholds.rsi_oversold))
        } else {
            None
        };

        if let Some((kind, threshold)) = extreme.or(mild) {
            conditions.push(TriggerCondition::new(kind, Some(rsi), Some(threshold)));
        }
    }

    if thresholds.macd_cross_detection {
        if snapshot.macd_bullish_crossover {
            conditions.push(TriggerCondition::new(
                ConditionKind::MacdGoldenCross,
                snapshot.macd_histogram,
                None,
            ));
        } else if snapshot.macd_bearish_crossover {
            conditions.push(TriggerCondition::new(
                ConditionKind::MacdDeathCross,
                snapshot.macd_histogram,
                None,
            ));
        }
    }

    // Only meaningful once both averages exist
    if thresholds.ma_break_detection && snapshot.ma_medium.is_some() && snapshot.ma_long.is_some() {
        let (above_medium, above_long) = (
            snapshot.price_above_ma_medium,
            snapshot.price_above_ma_long,
        );

        if above_long && !above_medium {
            conditions.push(TriggerCondition::new(
                ConditionKind::MaBreakout,
                snapshot.current_price,
                snapshot.ma_medium,
            ));
        } else if !above_long && above_medium {
            conditions.push(TriggerCondition::new(
                ConditionKind::MaBreakdown,
                snapshot.current_price,
                snapshot.ma_long,
            ));
        }
    }

    if !conditions.is_empty() {
        tracing::info!(
            symbol = %symbol,
            conditions = %conditions
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "Special conditions detected"
        );
    }

    conditions
}
