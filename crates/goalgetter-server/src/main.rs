use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use goalgetter_core::config::{ConfigLoader, GoalgetterConfig, DEFAULT_CONFIG_FILE};
use goalgetter_core::core_types::ThreadKey;
use goalgetter_server::repl::{format_status, run_session};
use goalgetter_server::{
    build_orchestrator, shutdown_signal, AppState, GoalgetterServer, ServerConfig, TelegramClient,
};
use log::LevelFilter;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(name = "goalgetter-server", author, version, about = "Goalgetter productivity assistant")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, default_value = DEFAULT_CONFIG_FILE, help = "Path to the YAML configuration file")]
    config: String,

    #[clap(long, short, help = "Log level (overrides logging.level)")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default command)
    Serve {
        #[clap(long, help = "Bind host (overrides server.host)")]
        host: Option<String>,

        #[clap(long, help = "Bind port (overrides server.port)")]
        port: Option<u16>,
    },
    /// Chat with the assistant in the terminal
    Chat {
        #[clap(long, default_value = "123")]
        user_id: String,
    },
    /// Print the memory status of a user's thread
    Status {
        #[clap(long)]
        user_id: String,
    },
    /// Register the Telegram webhook URL
    SetWebhook {
        #[clap(long, help = "Webhook URL (defaults to WEBHOOK_URL)")]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.level)
        .parse()
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::new().filter_level(level).init();

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Chat { user_id } => chat(config, &user_id).await,
        Commands::Status { user_id } => status(config, &user_id).await,
        Commands::SetWebhook { url } => set_webhook(config, url).await,
    }
}

async fn serve(mut config: GoalgetterConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let server_config = ServerConfig::from_settings(&config.server)?;
    let orchestrator = Arc::new(build_orchestrator(&config).await?);

    let mut state = AppState::new(orchestrator, config.service.clone());
    match TelegramClient::from_config(&config.telegram) {
        Some(client) => state = state.with_telegram(client),
        None => log::warn!("TELEGRAM_BOT_TOKEN not set; webhook replies will not be delivered"),
    }

    log::info!("Configuration:");
    log::info!("  Bind address: {}", server_config.bind_addr);
    log::info!("  CORS enabled: {}", server_config.enable_cors);
    log::info!("  Request timeout: {:?}", server_config.request_timeout);
    log::info!("  Model: {}", config.llm.model);

    GoalgetterServer::new(state, server_config)
        .serve_with_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn chat(config: GoalgetterConfig, user_id: &str) -> Result<()> {
    let orchestrator = build_orchestrator(&config).await?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    run_session(&orchestrator, user_id, stdin, &mut stdout).await
}

async fn status(config: GoalgetterConfig, user_id: &str) -> Result<()> {
    let store = goalgetter_core::memory::open_checkpoint_store(&config.storage).await;
    let thread_key = ThreadKey::for_user(user_id)?;
    let status = goalgetter_core::diagnostics::memory_status(store.as_ref(), &thread_key).await?;
    println!("{}", format_status(&status));
    Ok(())
}

async fn set_webhook(config: GoalgetterConfig, url: Option<String>) -> Result<()> {
    let client = TelegramClient::from_config(&config.telegram)
        .context("TELEGRAM_BOT_TOKEN is not set")?;
    let url = url
        .or(config.telegram.webhook_url)
        .context("No webhook URL given; pass --url or set WEBHOOK_URL")?;

    client.set_webhook(&url).await?;
    println!("Webhook set to {}", url);
    let info = client.webhook_info().await?;
    println!("Current webhook info: {}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
