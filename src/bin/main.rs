use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tokengate::{ApiTokenAuthenticator, config};

#[derive(Parser)]
#[command(name = "tokengate")]
#[command(about = "OIDC bearer-token authentication gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server with authentication applied
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
        /// Path to the settings file (defaults to TOKENGATE_CONFIG lookup)
        #[arg(long, env = "TOKENGATE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Load and validate the settings file, then exit
    CheckConfig {
        #[arg(long, env = "TOKENGATE_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn load(config: Option<PathBuf>) -> Result<tokengate::AuthSettings> {
    let path = match config {
        Some(path) => path,
        None => config::resolve_settings_path()?,
    };
    config::load_settings(&path)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config } => {
            let settings = load(config)?;
            info!(
                "Authenticating against issuer {} for audience {:?}",
                settings.primary_issuer(),
                settings.audience
            );
            let authenticator = Arc::new(ApiTokenAuthenticator::new(settings));
            tokengate::serve(&bind, authenticator).await?;
        }
        Commands::CheckConfig { config } => {
            let settings = load(config)?;
            println!(
                "Settings OK: issuer={:?} audience={:?} scheme={}",
                settings.issuer, settings.audience, settings.auth_scheme
            );
        }
    }

    Ok(())
}
