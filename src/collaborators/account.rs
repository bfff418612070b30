use super::TradingAccount;
use crate::feed::CandleSource;
use crate::Result;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// An open paper position from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperPosition {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
}

impl PaperPosition {
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.entry_price
    }
}

/// Paper trading account valued at live ticker prices
///
/// Holds no orders; it only reports the configured cash balance and
/// positions.
pub struct PaperAccount {
    source: Arc<dyn CandleSource>,
    cash_balance: f64,
    positions: Vec<PaperPosition>,
}

impl PaperAccount {
    pub fn new(source: Arc<dyn CandleSource>, cash_balance: f64, positions: Vec<PaperPosition>) -> Self {
        Self {
            source,
            cash_balance,
            positions,
        }
    }

    /// Current price per position, `None` where the ticker failed
    async fn mark_prices(&self) -> Vec<Option<f64>> {
        let mut prices = Vec::with_capacity(self.positions.len());

        for position in &self.positions {
            match self.source.ticker(&position.symbol).await {
                Ok(ticker) => prices.push(ticker.price.to_f64()),
                Err(e) => {
                    tracing::warn!(symbol = %position.symbol, "Failed to price position: {}", e);
                    prices.push(None);
                }
            }
        }

        prices
    }
}

#[async_trait]
impl TradingAccount for PaperAccount {
    async fn account_status(&self) -> Result<serde_json::Value> {
        let prices = self.mark_prices().await;

        let mut positions_value = 0.0;
        let mut cost_basis = 0.0;
        let mut unpriced = Vec::new();

        for (position, price) in self.positions.iter().zip(prices) {
            match price {
                Some(price) => {
                    positions_value += position.quantity * price;
                    cost_basis += position.cost_basis();
                }
                None => unpriced.push(position.symbol.clone()),
            }
        }

        Ok(json!({
            "mode": "paper",
            "cash_balance": self.cash_balance,
            "positions_value": positions_value,
            "total_value": self.cash_balance + positions_value,
            "unrealized_pnl": positions_value - cost_basis,
            "open_positions": self.positions.len(),
            "unpriced_symbols": unpriced,
        }))
    }

    async fn positions(&self) -> Result<serde_json::Value> {
        let prices = self.mark_prices().await;

        let positions: Vec<serde_json::Value> = self
            .positions
            .iter()
            .zip(prices)
            .map(|(position, price)| {
                let pnl = price.map(|p| (p - position.entry_price) * position.quantity);
                json!({
                    "symbol": position.symbol,
                    "quantity": position.quantity,
                    "entry_price": position.entry_price,
                    "current_price": price,
                    "unrealized_pnl": pnl,
                })
            })
            .collect();

        Ok(serde_json::Value::Array(positions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedError;
    use crate::models::{Candle, Ticker};
    use chrono::Utc;
    use rust_decimal::Decimal;

    struct PriceSource;

    #[async_trait]
    impl CandleSource for PriceSource {
        async fn candles(&self, _symbol: &str) -> std::result::Result<Vec<Candle>, FeedError> {
            Ok(vec![])
        }

        async fn ticker(&self, symbol: &str) -> std::result::Result<Ticker, FeedError> {
            match symbol {
                "BTCUSDT" => Ok(Ticker {
                    symbol: symbol.to_string(),
                    price: Decimal::from(110),
                    fetched_at: Utc::now(),
                }),
                _ => Err(FeedError::malformed("no price")),
            }
        }
    }

    fn account() -> PaperAccount {
        PaperAccount::new(
            Arc::new(PriceSource),
            1000.0,
            vec![
                PaperPosition {
                    symbol: "BTCUSDT".to_string(),
                    quantity: 2.0,
                    entry_price: 100.0,
                },
                PaperPosition {
                    symbol: "DOGEUSDT".to_string(),
                    quantity: 10.0,
                    entry_price: 1.0,
                },
            ],
        )
    }

    #[tokio::test]
    async fn test_account_status_values_positions() {
        let status = account().account_status().await.unwrap();

        assert_eq!(status["positions_value"], 220.0);
        assert_eq!(status["total_value"], 1220.0);
        assert_eq!(status["unrealized_pnl"], 20.0);
        assert_eq!(status["unpriced_symbols"], json!(["DOGEUSDT"]));
    }

    #[tokio::test]
    async fn test_positions_report_missing_price() {
        let positions = account().positions().await.unwrap();

        assert_eq!(positions[0]["unrealized_pnl"], 20.0);
        assert!(positions[1]["current_price"].is_null());
    }
}
