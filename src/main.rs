//! Diagnosa server
//!
//! Entry point for the single-page chat service.

use std::sync::Arc;

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use diagnosa::config::{AppConfig, LogFormat};
use diagnosa::controller::SessionController;
use diagnosa::{llm, server};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env (if present) before config and the filter read the environment
    let _ = dotenv();

    // The log format is configurable, so config is loaded before tracing exists
    let config = match AppConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(config.logging.format);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Startup failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Initialize tracing (M-LOG-STRUCTURED)
fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .init(),
    }
}

async fn run(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let settings = config.model_settings()?;

    info!(
        name: "model.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        temperature = settings.temperature,
        max_output_tokens = settings.max_output_tokens,
        timeout_secs = settings.exchange_timeout.as_secs(),
        "Model configuration loaded"
    );

    let client = llm::shared_client(&settings)?;
    let controller = SessionController::new(client, settings.exchange_timeout);

    server::start_server(config, controller).await
}
