//! thinkgate - reasoning-scrubbing OpenAI-compatible proxy
//!
//! A reverse proxy that sits between OpenAI-API-compatible clients and a
//! NIM-class chat-completion provider, rewriting model names, enabling
//! extended thinking, and stripping reasoning segments from responses.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thinkgate::config::Config;

#[derive(Parser)]
#[command(name = "thinkgate")]
#[command(about = "Reasoning-scrubbing OpenAI-compatible proxy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

/// RUST_LOG wins; otherwise the configured level applies to this crate.
fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("thinkgate={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let path = config;
            let mut config = Config::from_file(&path)?;
            init_tracing(&config.logging.level);
            tracing::info!(config = %path, "Loaded configuration");

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            thinkgate::proxy::run_server(config).await
        }

        Commands::Check { config } => {
            let parsed = Config::from_file(&config)?;
            let model_count = parsed.model_map().client_models().len();
            println!(
                "config ok: listen={} upstream={} models={}",
                parsed.server.listen, parsed.upstream.url, model_count
            );
            Ok(())
        }
    }
}
