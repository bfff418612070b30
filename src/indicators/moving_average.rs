/// Simple Moving Average (SMA) for every sample, `None` until the window fills
pub fn sma_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; prices.len()];

    if period == 0 || prices.len() < period {
        return values;
    }

    let mut window_sum: f64 = prices[..period].iter().sum();
    values[period - 1] = Some(window_sum / period as f64);

    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        values[i] = Some(window_sum / period as f64);
    }

    values
}

/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Exponential Moving Average (EMA) for every sample
///
/// Seeded with the SMA of the first `period` values, then smoothed with
/// the multiplier `2 / (period + 1)`.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; prices.len()];

    if period == 0 || prices.len() < period {
        return values;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Start with SMA
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    values[period - 1] = Some(ema);

    for (i, price) in prices.iter().enumerate().skip(period) {
        ema = (price - ema) * multiplier + ema;
        values[i] = Some(ema);
    }

    values
}

/// Calculate Exponential Moving Average (EMA), latest value only
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).last().copied().flatten()
}
