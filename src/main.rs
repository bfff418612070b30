use clap::Parser;
use cryptomonitor::api::{BinanceClient, CoinGeckoClient, FearGreedClient, LlmClient, TelegramClient};
use cryptomonitor::collaborators::{
    Analyst, LlmAnalyst, LogNotifier, Notifier, PaperAccount, TelegramNotifier,
};
use cryptomonitor::conditions::ConditionEvaluator;
use cryptomonitor::db::PostgresStore;
use cryptomonitor::decision::{DecisionEngine, LlmDecider};
use cryptomonitor::dispatch::DecisionDispatcher;
use cryptomonitor::feed::{CandleSource, DataFeed};
use cryptomonitor::indicators::IndicatorEngine;
use cryptomonitor::monitor::{HeartbeatScheduler, MonitorConfig, StopHandle};
use cryptomonitor::persistence::{OverrideStore, RedisOverrideStore};
use cryptomonitor::settings::{AppConfig, Secrets};
use cryptomonitor::Result;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "cryptomonitor", about = "Market monitor with heartbeat-driven analysis")]
struct Cli {
    /// TOML settings file (default: config/monitor.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single heartbeat pass and exit
    #[arg(long)]
    once: bool,

    /// Handle one operator message and exit
    #[arg(long, value_name = "TEXT")]
    dispatch: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    tracing::info!("🚀 Market monitor starting");

    let app = AppConfig::load(cli.config.as_deref())?;
    let secrets = Secrets::from_env();
    let config = MonitorConfig::new(app.monitor_settings())?;

    // Market data
    let feed = build_feed(&app, &secrets)?;
    match feed.select_endpoint().await {
        Some(endpoint) => tracing::info!("✅ Exchange endpoint: {}", endpoint),
        None => tracing::warn!("No exchange endpoint answered the health check, rotating on demand"),
    }
    let source: Arc<dyn CandleSource> = Arc::new(feed.clone());

    // Optional persistence
    let postgres = connect_to_postgres(secrets.database_url.as_deref()).await;
    let overrides = connect_to_redis(secrets.redis_url.as_deref()).await;

    if let Some(store) = &overrides {
        apply_overrides(&config, store.as_ref()).await;
    }

    // Collaborators
    let api_key = secrets
        .openai_api_key
        .clone()
        .ok_or("OPENAI_API_KEY not found in environment")?;
    let mut llm = LlmClient::new(api_key, app.llm.model.clone(), app.request_timeout() * 3)?;
    if let Some(url) = &app.llm.base_url {
        llm = llm.with_url(url.clone());
    }

    let engine = IndicatorEngine::new(app.indicators);
    let analyst: Arc<dyn Analyst> = Arc::new(LlmAnalyst::new(
        feed.clone(),
        engine,
        llm.clone(),
        app.llm.analyst_prompts.clone(),
    ));
    let notifier = build_notifier(&app, &secrets)?;
    let account = Arc::new(PaperAccount::new(
        source.clone(),
        app.account.starting_balance,
        app.account.positions.clone(),
    ));

    let stop = StopHandle::new();

    let mut dispatcher =
        DecisionDispatcher::new(analyst, account, notifier, config.clone(), source.clone())
            .with_stop_handle(stop.clone());
    if let Some(store) = &overrides {
        dispatcher = dispatcher.with_override_store(store.clone());
    }
    if let Some(store) = &postgres {
        dispatcher = dispatcher.with_store(store.clone());
    }

    let decision_engine = Arc::new(DecisionEngine::new(
        Arc::new(LlmDecider::new(llm, app.llm.system_prompt.clone())),
        Arc::new(dispatcher),
    ));

    if let Some(text) = cli.dispatch {
        let transcript = decision_engine.handle_operator_message(&text).await;
        println!("{}", transcript);
        return Ok(());
    }

    let mut scheduler = HeartbeatScheduler::new(
        source,
        decision_engine.clone(),
        config.clone(),
        engine,
        ConditionEvaluator::new(app.thresholds),
    )
    .with_stop_handle(stop.clone());
    if let Some(store) = &postgres {
        scheduler = scheduler.with_store(store.clone());
    }

    let settings = config.snapshot();
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Primary: {}", settings.primary_symbols.join(", "));
    tracing::info!("  Secondary: {}", settings.secondary_symbols.join(", "));
    tracing::info!("  Heartbeat: {}s", settings.heartbeat_interval_secs);
    tracing::info!("  Fetch interval: {}s", settings.fetch_interval_secs);
    tracing::info!("  Candles: {} x {}", app.feed.history_limit, app.feed.interval);

    if cli.once {
        let report = scheduler.run_pass().await;
        tracing::info!(
            "✅ Pass complete: {} evaluated, {} dispatched, {} skipped",
            report.evaluated.len(),
            report.dispatched.len(),
            report.skipped.len()
        );
        return Ok(());
    }

    // Spawn the heartbeat loop
    let mut scheduler_task = {
        let scheduler = Arc::new(scheduler);
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    // Spawn the operator channel
    let operator_task = {
        let engine = decision_engine.clone();
        let lines = spawn_stdin_reader();
        tokio::spawn(async move {
            operator_loop(engine, lines).await;
        })
    };

    tracing::info!("✅ Heartbeat loop and operator channel running");
    tracing::info!("Type operator messages on stdin. Press Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = &mut scheduler_task => {
            tracing::error!("Heartbeat loop exited: {:?}", result);
        }
    }

    stop.stop();
    operator_task.abort();

    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler_task).await.is_err() {
        tracing::warn!("Heartbeat loop did not stop within {}s", SHUTDOWN_GRACE.as_secs());
    }

    tracing::info!("👋 Market monitor stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cryptomonitor=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_feed(app: &AppConfig, secrets: &Secrets) -> Result<DataFeed> {
    let timeout = app.request_timeout();

    let exchange = BinanceClient::new(app.feed.endpoints.clone(), timeout)?;
    let coingecko = CoinGeckoClient::new(app.coingecko_min_interval(), timeout)?
        .with_api_key(secrets.coingecko_api_key.clone());
    let fear_greed = FearGreedClient::new(timeout)?;

    Ok(DataFeed::new(exchange, coingecko, fear_greed, app.feed_config()))
}

fn build_notifier(app: &AppConfig, secrets: &Secrets) -> Result<Arc<dyn Notifier>> {
    match (&secrets.telegram_token, &secrets.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            let client = TelegramClient::new(token.clone(), chat_id.clone(), app.request_timeout())?;
            tracing::info!("Telegram notifications enabled");
            Ok(Arc::new(TelegramNotifier::new(client)))
        }
        _ => {
            tracing::warn!("TELEGRAM_TOKEN/TELEGRAM_CHAT_ID not set, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

async fn connect_to_postgres(database_url: Option<&str>) -> Option<Arc<PostgresStore>> {
    let Some(database_url) = database_url else {
        tracing::warn!("DATABASE_URL not set, market data and events are not persisted");
        return None;
    };

    match PostgresStore::new(database_url).await {
        Ok(store) => {
            tracing::info!("Postgres persistence enabled (market data & trigger events)");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Postgres ({}), continuing without persistence",
                e
            );
            None
        }
    }
}

async fn connect_to_redis(redis_url: Option<&str>) -> Option<Arc<RedisOverrideStore>> {
    let redis_url = redis_url?;

    match RedisOverrideStore::new(redis_url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Redis ({}), settings changes will not survive a restart",
                e
            );
            None
        }
    }
}

/// Re-apply persisted settings through the validated setters
async fn apply_overrides(config: &MonitorConfig, store: &dyn OverrideStore) {
    let overrides = match store.load().await {
        Ok(Some(overrides)) => overrides,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("Failed to load monitor overrides: {}", e);
            return;
        }
    };

    if let Err(e) = config.set_symbols(&overrides.primary_symbols, &overrides.secondary_symbols) {
        tracing::warn!("Ignoring stored symbol override: {}", e);
    }
    if let Err(e) = config.set_heartbeat_interval(overrides.heartbeat_interval_secs as f64) {
        tracing::warn!("Ignoring stored interval override: {}", e);
    }

    tracing::info!("Restored monitor overrides saved at {}", overrides.saved_at);
}

// ============================================================================
// Operator Channel
// ============================================================================

/// Read stdin on a plain thread so a pending read never holds up shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read operator input: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

/// Hand each operator line to the decision engine until the channel closes
async fn operator_loop(engine: Arc<DecisionEngine>, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        tracing::info!("💬 Operator: {}", line);
        let transcript = engine.handle_operator_message(line).await;
        tracing::info!("\n{}", transcript);
    }

    tracing::info!("Operator channel closed");
}
