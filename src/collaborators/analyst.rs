use super::{Analyst, Briefing};
use crate::api::{ChatMessage, LlmClient};
use crate::feed::{CandleSource, DataFeed};
use crate::indicators::IndicatorEngine;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// System prompts per analyst role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalystPrompts {
    pub technical: String,
    pub fundamental: String,
    pub sentiment: String,
    pub macro_outlook: String,
    /// Answers operator questions from the other analysts' reports
    pub chief: String,
}

impl Default for AnalystPrompts {
    fn default() -> Self {
        Self {
            technical: "You are a technical analyst. Interpret the indicators and recent candles \
                        and give a short outlook with key levels."
                .to_string(),
            fundamental: "You are a fundamental analyst. Assess the asset's market position \
                          using the market data provided."
                .to_string(),
            sentiment: "You are a market sentiment analyst. Summarize the mood of the crypto \
                        market from the fear/greed index and trending coins."
                .to_string(),
            macro_outlook: "You are a macro analyst. Describe the overall crypto market regime \
                            from the global aggregates provided."
                .to_string(),
            chief: "You are the chief analyst. Answer the operator's question using the \
                    macro, sentiment, technical and fundamental reports provided. Be concise."
                .to_string(),
        }
    }
}

/// Analyst backed by the chat-completion API and live feed data
pub struct LlmAnalyst {
    feed: DataFeed,
    engine: IndicatorEngine,
    llm: LlmClient,
    prompts: AnalystPrompts,
}

impl LlmAnalyst {
    pub fn new(feed: DataFeed, engine: IndicatorEngine, llm: LlmClient, prompts: AnalystPrompts) -> Self {
        Self {
            feed,
            engine,
            llm,
            prompts,
        }
    }

    async fn ask(&self, system: &str, data: String) -> Result<String> {
        let messages = [ChatMessage::system(system), ChatMessage::user(data)];
        let completion = self.llm.complete(&messages, &[]).await?;

        if completion.content.trim().is_empty() {
            return Err("analyst returned no text".into());
        }
        Ok(completion.content)
    }

    /// Indicator summary plus the last few closes
    async fn symbol_context(&self, symbol: &str) -> Result<String> {
        let candles = self.feed.candles(symbol).await?;
        let snapshot = self.engine.compute(&candles);

        let recent: Vec<String> = candles
            .iter()
            .rev()
            .take(10)
            .rev()
            .map(|c| c.close.to_string())
            .collect();

        Ok(format!(
            "Symbol: {}\nInterval: {}\nIndicators: {}\nRecent closes: {}",
            symbol,
            self.feed.config().interval,
            snapshot.summary(),
            recent.join(", ")
        ))
    }
}

#[async_trait]
impl Analyst for LlmAnalyst {
    async fn technical(&self, symbol: &str) -> Result<String> {
        let context = self.symbol_context(symbol).await?;
        self.ask(&self.prompts.technical, context).await
    }

    async fn fundamental(&self, symbol: &str) -> Result<String> {
        let mut context = self.symbol_context(symbol).await?;

        match self.feed.global_market().await {
            Ok(global) => context.push_str(&format!("\nGlobal market: {}", serde_json::to_string(&global)?)),
            Err(e) => tracing::warn!("Global market data unavailable: {:#}", e),
        }

        self.ask(&self.prompts.fundamental, context).await
    }

    async fn sentiment(&self) -> Result<String> {
        let mut context = String::new();

        match self.feed.fear_greed().await {
            Ok(index) => context.push_str(&format!(
                "Fear/greed index: {} ({})\n",
                index.value, index.classification
            )),
            Err(e) => tracing::warn!("Fear/greed index unavailable: {:#}", e),
        }

        match self.feed.trending().await {
            Ok(coins) => {
                let names: Vec<String> = coins
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.symbol))
                    .collect();
                context.push_str(&format!("Trending: {}\n", names.join(", ")));
            }
            Err(e) => tracing::warn!("Trending coins unavailable: {:#}", e),
        }

        if context.is_empty() {
            return Err("no sentiment data available".into());
        }

        self.ask(&self.prompts.sentiment, context).await
    }

    async fn macro_outlook(&self) -> Result<String> {
        let global = self
            .feed
            .global_market()
            .await
            .map_err(|e| format!("global market data unavailable: {:#}", e))?;

        self.ask(
            &self.prompts.macro_outlook,
            format!("Global market: {}", serde_json::to_string(&global)?),
        )
        .await
    }

    async fn comprehensive(&self, question: &str, briefing: &Briefing) -> Result<String> {
        self.ask(
            &self.prompts.chief,
            format!("Question: {}\n\n{}", question, briefing.render()),
        )
        .await
    }
}
