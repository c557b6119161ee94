use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use think_proxy::providers::BackendPreset;
use think_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "think-proxy",
    about = "OpenAI-compatible proxy that folds backend reasoning into <think> blocks",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend name (overrides config)
    #[arg(long)]
    backend: Option<String>,

    /// Show reasoning in <think> blocks (overrides config)
    #[arg(long)]
    show_reasoning: Option<bool>,

    /// Request reasoning from the backend chat template (overrides config)
    #[arg(long)]
    thinking_mode: Option<bool>,

    /// Request log file path
    #[arg(long, default_value = "think-proxy.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "think_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        println!("  1. think-proxy.toml (current directory)");
        if cfg!(target_os = "macos") {
            println!("  2. ~/Library/Application Support/think-proxy/config.toml");
        } else {
            println!("  2. $XDG_CONFIG_HOME/think-proxy/config.toml");
            println!("     ~/.config/think-proxy/config.toml");
        }
        println!("  3. ~/.think-proxy.toml");
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref backend) = cli.backend {
        config.backend.name = backend.clone();
        if BackendPreset::from_name(backend).is_some() {
            // A named preset replaces any endpoint left over from the file.
            config.backend.base_url = None;
            config.backend.api_key_env = None;
        }
    }
    config.reasoning = config
        .reasoning
        .with_overrides(cli.show_reasoning, cli.thinking_mode);

    let logger = SharedLogger::new(&cli.log_file)?;

    // Validate config eagerly
    let base_url = config.effective_base_url()?;
    let _api_key = config.resolve_api_key()?;
    let preset = BackendPreset::from_name(&config.backend.name);

    info!("think-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend:    {}", config.backend.name);
    info!("  Base URL:   {}", base_url);
    info!("  Port:       {}", config.port);
    info!(
        "  Models:     {} mapped, {} allowed",
        config.models.len(),
        config.allowed_models.len()
    );
    info!(
        "  Reasoning:  {}",
        if config.reasoning.show { "shown in <think> blocks" } else { "hidden" }
    );
    info!(
        "  Thinking:   {}",
        if config.reasoning.thinking_mode { "requested" } else { "off" }
    );
    info!("  Log file:   {}", cli.log_file.display());

    if config.reasoning.show && preset.is_some_and(|p| !p.emits_reasoning) {
        tracing::warn!(
            backend = %config.backend.name,
            "Reasoning display is on but this backend does not stream reasoning_content"
        );
    }

    logger.info(
        "startup",
        format!(
            "Starting think-proxy backend={} base_url={} port={} show_reasoning={} thinking_mode={}",
            config.backend.name,
            base_url,
            config.port,
            config.reasoning.show,
            config.reasoning.thinking_mode
        ),
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let port = config.port;
    let state = Arc::new(AppState::new(config, client, logger));

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OpenAI base URL for clients: http://localhost:{}/v1", port);

    axum::serve(listener, app).await?;

    Ok(())
}
