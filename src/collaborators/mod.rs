// External collaborators the dispatcher calls into
// Analysis text producers, the trading account reader and the notifier

pub mod account;
pub mod analyst;
pub mod notifier;

pub use account::{PaperAccount, PaperPosition};
pub use analyst::{AnalystPrompts, LlmAnalyst};
pub use notifier::{LogNotifier, TelegramNotifier};

use crate::Result;
use async_trait::async_trait;

/// Produces analysis text; the content is opaque to the monitor
#[async_trait]
pub trait Analyst: Send + Sync {
    async fn technical(&self, symbol: &str) -> Result<String>;

    async fn fundamental(&self, symbol: &str) -> Result<String>;

    async fn sentiment(&self) -> Result<String>;

    async fn macro_outlook(&self) -> Result<String>;

    /// Answer an operator question from the gathered reports
    ///
    /// The default stitches the reports together under the question.
    async fn comprehensive(&self, question: &str, briefing: &Briefing) -> Result<String> {
        Ok(format!("Question: {}\n\n{}", question, briefing.render()))
    }
}

/// Per-symbol reports gathered for a comprehensive answer
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolBriefing {
    pub symbol: String,
    pub technical: String,
    pub fundamental: String,
}

/// Market-wide and per-symbol reports handed to [`Analyst::comprehensive`]
#[derive(Debug, Clone, PartialEq)]
pub struct Briefing {
    pub macro_outlook: String,
    pub sentiment: String,
    pub symbols: Vec<SymbolBriefing>,
}

impl Briefing {
    pub fn render(&self) -> String {
        let mut out = format!(
            "## Macro\n{}\n\n## Sentiment\n{}\n",
            self.macro_outlook, self.sentiment
        );
        for entry in &self.symbols {
            out.push_str(&format!(
                "\n## {}\n### Technical\n{}\n### Fundamental\n{}\n",
                entry.symbol, entry.technical, entry.fundamental
            ));
        }
        out
    }
}

/// Read-only view of a trading account
#[async_trait]
pub trait TradingAccount: Send + Sync {
    async fn account_status(&self) -> Result<serde_json::Value>;

    async fn positions(&self) -> Result<serde_json::Value>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}
