//! Moving Average Convergence Divergence (MACD)
//!
//! MACD line = EMA(fast) - EMA(slow). The signal line is the EMA of the
//! MACD line itself, computed over the defined MACD values only.

use super::moving_average::ema_series;

/// Aligned MACD line, signal line and histogram, one entry per price
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

impl MacdSeries {
    /// Latest (macd, signal, histogram)
    pub fn latest(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        (
            self.macd.last().copied().flatten(),
            self.signal.last().copied().flatten(),
            self.histogram.last().copied().flatten(),
        )
    }

    /// MACD line crossed above the signal line on the latest sample
    pub fn is_bullish_crossover(&self) -> bool {
        matches!(
            self.last_two_pairs(),
            Some(((prev_macd, prev_signal), (macd, signal)))
                if prev_macd <= prev_signal && macd > signal
        )
    }

    /// MACD line crossed below the signal line on the latest sample
    pub fn is_bearish_crossover(&self) -> bool {
        matches!(
            self.last_two_pairs(),
            Some(((prev_macd, prev_signal), (macd, signal)))
                if prev_macd >= prev_signal && macd < signal
        )
    }

    /// Previous and current (macd, signal) pairs, both fully defined
    fn last_two_pairs(&self) -> Option<((f64, f64), (f64, f64))> {
        let n = self.macd.len().min(self.signal.len());
        if n < 2 {
            return None;
        }

        let prev = (self.macd[n - 2]?, self.signal[n - 2]?);
        let curr = (self.macd[n - 1]?, self.signal[n - 1]?);
        Some((prev, curr))
    }
}

/// Calculate MACD for every sample
pub fn macd_series(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdSeries {
    let fast = ema_series(prices, fast_period);
    let slow = ema_series(prices, slow_period);

    let macd: Vec<Option<f64>> = fast
        .iter()
        .zip(slow.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    // Once both EMAs are seeded they stay defined, so the MACD values form a
    // contiguous tail and the signal EMA can be realigned by offset.
    let defined: Vec<f64> = macd.iter().flatten().copied().collect();
    let offset = macd.len() - defined.len();

    let mut signal = vec![None; offset];
    signal.extend(ema_series(&defined, signal_period));

    let histogram = macd
        .iter()
        .zip(signal.iter())
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();

    MacdSeries {
        macd,
        signal,
        histogram,
    }
}
