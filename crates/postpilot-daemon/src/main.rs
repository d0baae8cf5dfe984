use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

mod daemon;

#[derive(Parser)]
#[command(name = "postpilot-daemon", about = "Publication worker and queue refiller")]
struct Cli {
    /// Path to postpilot.toml (default: ~/.postpilot/postpilot.toml).
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single tick and exit (for cron-style setups).
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postpilot=info,postpilot_daemon=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > POSTPILOT_CONFIG env > ~/.postpilot/postpilot.toml
    let config_path = cli
        .config
        .or_else(|| std::env::var("POSTPILOT_CONFIG").ok());
    let config = postpilot_core::config::PostpilotConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            warn!("Config load failed ({e}), using defaults");
            postpilot_core::config::PostpilotConfig::default()
        });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    let store = Arc::new(postpilot_store::ContentStore::new(db)?);

    let provider = build_provider(&config);
    let model = config
        .ai
        .as_ref()
        .map(|ai| ai.model.clone())
        .unwrap_or_else(|| "gpt-4o-mini".to_string());
    let ai = Arc::new(postpilot_ai::AiService::new(
        provider,
        model,
        config.image.clone(),
    ));

    let mut registry = postpilot_publishers::PublisherRegistry::new();
    registry.register(Box::new(postpilot_publishers::VkPublisher::new()));
    let registry = Arc::new(registry);

    // Drained queues ask for fresh content over this channel.
    let (refill_tx, refill_rx) =
        tokio::sync::mpsc::channel::<postpilot_scheduler::RefillRequest>(64);

    let daemon = daemon::PublisherDaemon::new(
        store,
        ai,
        registry,
        refill_tx,
        config.daemon.poll_secs,
        config.daemon.refill_count,
    );

    if cli.once {
        daemon.tick().await?;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupt received");
        let _ = shutdown_tx.send(true);
    });

    daemon.run(refill_rx, shutdown_rx).await;
    Ok(())
}

/// Build the LLM provider from config, falling back to the OPENAI_API_KEY
/// env var and finally to a null provider that errors on every call.
fn build_provider(
    config: &postpilot_core::config::PostpilotConfig,
) -> Arc<dyn postpilot_ai::LlmProvider> {
    if let Some(ref ai) = config.ai {
        info!(base_url = %ai.base_url, model = %ai.model, "LLM provider: configured OpenAI-compatible");
        return Arc::new(postpilot_ai::openai::OpenAiProvider::new(
            ai.api_key.clone(),
            Some(ai.base_url.clone()),
        ));
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        info!("LLM provider: OpenAI (from env)");
        return Arc::new(postpilot_ai::openai::OpenAiProvider::new(key, None));
    }
    warn!("No LLM provider configured — generation and scoring will fail open");
    Arc::new(NullProvider)
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

/// Placeholder provider when no API key is available.
struct NullProvider;

#[async_trait::async_trait]
impl postpilot_ai::LlmProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }
    async fn send(
        &self,
        _req: &postpilot_ai::ChatRequest,
    ) -> Result<postpilot_ai::ChatResponse, postpilot_ai::ProviderError> {
        Err(postpilot_ai::ProviderError::Unavailable(
            "no LLM provider configured — set ai.api_key in postpilot.toml".into(),
        ))
    }
}
