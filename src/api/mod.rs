pub mod binance;
pub mod coingecko;
pub mod fear_greed;
pub mod llm;
pub mod telegram;

pub use binance::{BinanceClient, DEFAULT_ENDPOINTS};
pub use coingecko::CoinGeckoClient;
pub use fear_greed::FearGreedClient;
pub use llm::{ChatCompletion, ChatMessage, LlmClient, ToolCall, ToolDefinition};
pub use telegram::TelegramClient;
