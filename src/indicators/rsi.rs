/// Calculate Relative Strength Index (RSI) for every sample
///
/// Uses Wilder smoothing: the first average gain/loss is the plain mean of
/// the first `period` deltas, every later one is
/// `avg = (avg * (period - 1) + sample) / period`.
///
/// Entries are `None` until `period + 1` prices exist.
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; prices.len()];

    if period == 0 || prices.len() < period + 1 {
        return values;
    }

    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let n = period as f64;

    let mut avg_gain = deltas[..period].iter().map(|d| d.max(0.0)).sum::<f64>() / n;
    let mut avg_loss = deltas[..period].iter().map(|d| (-d).max(0.0)).sum::<f64>() / n;
    values[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in (period + 1)..prices.len() {
        let delta = deltas[i - 1];
        avg_gain = (avg_gain * (n - 1.0) + delta.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-delta).max(0.0)) / n;
        values[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    values
}

/// Latest RSI value, `None` when fewer than `period + 1` prices are available
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    rsi_series(prices, period).last().copied().flatten()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_calculation() {
        let prices = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25, 46.0,
            46.5,
        ];

        let rsi = calculate_rsi(&prices, 14);
        assert!(rsi.is_some());

        let rsi_value = rsi.unwrap();
        assert!(rsi_value > 0.0 && rsi_value < 100.0);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![100.0, 102.0, 101.0];
        assert!(calculate_rsi(&prices, 14).is_none());

        // Exactly `period` prices is still one short
        let prices: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        assert!(calculate_rsi(&prices, 14).is_none());
    }

    #[test]
    fn test_rsi_empty_and_zero_period() {
        assert!(calculate_rsi(&[], 14).is_none());
        assert!(rsi_series(&[1.0, 2.0, 3.0], 0).iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_rsi_all_gains() {
        let prices = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let rsi = calculate_rsi(&prices, 5);
        assert_eq!(rsi, Some(100.0)); // no losses => exactly 100
    }

    #[test]
    fn test_rsi_flat_prices() {
        let prices = vec![50.0; 20];
        assert_eq!(calculate_rsi(&prices, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_all_losses() {
        let prices = vec![105.0, 104.0, 103.0, 102.0, 101.0, 100.0];
        assert_eq!(calculate_rsi(&prices, 5), Some(0.0));
    }

    #[test]
    fn test_rsi_wilder_smoothing_by_hand() {
        // deltas: +1, -1, +1, +1
        let prices = vec![1.0, 2.0, 1.0, 2.0, 3.0];
        let series = rsi_series(&prices, 3);

        assert_eq!(&series[..3], &[None, None, None]);

        // seed: gain 2/3, loss 1/3 => RS 2
        let first = series[3].unwrap();
        assert!((first - (100.0 - 100.0 / 3.0)).abs() < 1e-9);

        // smoothed: gain 7/9, loss 2/9 => RS 3.5
        let second = series[4].unwrap();
        assert!((second - (100.0 - 100.0 / 4.5)).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_stays_in_bounds() {
        let prices: Vec<f64> = (0..200)
            .map(|i| 100.0 + ((i * 37) % 23) as f64 - ((i * 11) % 7) as f64 * 1.5)
            .collect();

        for value in rsi_series(&prices, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value), "RSI out of range: {}", value);
        }
    }
}
