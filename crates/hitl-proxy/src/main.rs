//! `hitl-proxy` binary: serve the end-to-end-encrypted MCP proxy on stdio.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hitl_crypto::{Keystore, SealedBox};
use hitl_proxy::auth::StoredCredentials;
use hitl_proxy::devices::DeviceKeyClient;
use hitl_proxy::engine::ProxyEngine;
use hitl_proxy::front::StdioFront;
use hitl_proxy::gateway::HttpGateway;
use hitl_types::config::ProxyConfig;
use hitl_types::errors::ProxyError;

#[derive(Parser)]
#[command(name = "hitl-proxy", version, about = "End-to-end-encrypted MCP proxy for human-in-the-loop tool calls")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the MCP protocol on stdin/stdout.
    Serve {
        /// Backend base URL (overrides HITL_BACKEND_URL).
        #[arg(long)]
        backend_url: Option<String>,
    },
    /// Print the agent's public key, generating a keypair if needed.
    Identity,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout is the protocol stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("hitl-proxy: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ProxyError> {
    let cli = Cli::parse();
    let mut config = ProxyConfig::from_env()?;

    match cli.command {
        Command::Serve { backend_url } => {
            if let Some(url) = backend_url {
                config.backend_base_url = url;
            }
            serve(config).await
        }
        Command::Identity => {
            let (keypair, created) = Keystore::new(config.keypair_path()).ensure()?;
            if created {
                info!("generated a new identity keypair");
            }
            println!("{}", keypair.public_key_b64());
            Ok(())
        }
    }
}

async fn serve(config: ProxyConfig) -> Result<(), ProxyError> {
    info!(
        backend = %config.backend_base_url,
        config_dir = %config.config_dir.display(),
        "starting proxy"
    );

    let credentials = Arc::new(StoredCredentials::new(&config));
    let devices = Arc::new(DeviceKeyClient::new(&config, credentials.clone())?);

    let (keypair, created) = Keystore::new(config.keypair_path()).ensure()?;
    if created {
        info!("generated a new identity keypair");
        // Best-effort; the human's devices verify the agent once this lands.
        if !devices.register_public_key(&keypair.public_key_b64()).await {
            warn!("public key registration deferred to a later start");
        }
    }

    let gateway = Arc::new(HttpGateway::new(&config, credentials)?);
    let engine = Arc::new(ProxyEngine::new(gateway, devices, SealedBox::new(keypair)));

    StdioFront::new(engine).run().await
}
