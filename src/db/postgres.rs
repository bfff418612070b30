use super::MarketStore;
use crate::models::{AnalysisKind, AnalysisRecord, EventStatus, MarketDataRecord, TriggerEvent};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres persistence for market data, trigger events and analyst reports
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to Postgres
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    /// Most recent market data rows for a symbol, newest first
    #[cfg(test)]
    async fn load_recent_market_data(
        &self,
        symbol: &str,
        limit: i64,
    ) -> Result<Vec<MarketDataRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, timestamp, price, rsi, macd, volume, ma_short, ma_medium, ma_long
            FROM market_data
            WHERE symbol = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MarketDataRecord {
                symbol: row.get("symbol"),
                timestamp: row.get("timestamp"),
                price: row.get("price"),
                rsi: row.get("rsi"),
                macd: row.get("macd"),
                volume: row.get("volume"),
                ma_short: row.get("ma_short"),
                ma_medium: row.get("ma_medium"),
                ma_long: row.get("ma_long"),
            })
            .collect())
    }
}

#[async_trait]
impl MarketStore for PostgresStore {
    async fn save_market_data(&self, record: &MarketDataRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO market_data (
                symbol, timestamp, price, rsi, macd, volume, ma_short, ma_medium, ma_long
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (symbol, timestamp) DO NOTHING
            "#,
        )
        .bind(&record.symbol)
        .bind(record.timestamp)
        .bind(record.price)
        .bind(record.rsi)
        .bind(record.macd)
        .bind(record.volume)
        .bind(record.ma_short)
        .bind(record.ma_medium)
        .bind(record.ma_long)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            symbol = %record.symbol,
            inserted = result.rows_affected(),
            "Saved market data to Postgres"
        );

        Ok(())
    }

    async fn record_event(&self, event: &TriggerEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trigger_events (id, symbol, capability, status, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(&event.symbol)
        .bind(&event.capability)
        .bind(event.status.as_str())
        .bind(&event.detail)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<TriggerEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, capability, status, detail, created_at
            FROM trigger_events
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());

        for row in rows {
            let id: Uuid = row.get("id");
            let status_str: String = row.get("status");
            let created_at: DateTime<Utc> = row.get("created_at");

            let status = match status_str.as_str() {
                "ok" => EventStatus::Ok,
                "error" => EventStatus::Error,
                other => {
                    tracing::warn!("Unknown trigger event status '{}' for {}", other, id);
                    continue;
                }
            };

            events.push(TriggerEvent {
                id,
                symbol: row.get("symbol"),
                capability: row.get("capability"),
                status,
                detail: row.get("detail"),
                timestamp: created_at,
            });
        }

        Ok(events)
    }

    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_records (id, kind, symbol, content, summary, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.kind.as_str())
        .bind(&record.symbol)
        .bind(&record.content)
        .bind(&record.summary)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(kind = record.kind.as_str(), symbol = ?record.symbol, "Saved analysis record");
        Ok(())
    }

    async fn latest_analysis(
        &self,
        kind: AnalysisKind,
        symbol: Option<&str>,
    ) -> Result<Option<AnalysisRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, symbol, content, summary, created_at
            FROM analysis_records
            WHERE kind = $1 AND symbol IS NOT DISTINCT FROM $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored_kind: String = row.get("kind");
        let kind = AnalysisKind::parse(&stored_kind)
            .ok_or_else(|| format!("unknown analysis kind '{}'", stored_kind))?;

        Ok(Some(AnalysisRecord {
            id: row.get("id"),
            kind,
            symbol: row.get("symbol"),
            content: row.get("content"),
            summary: row.get("summary"),
            created_at: row.get("created_at"),
        }))
    }
}
