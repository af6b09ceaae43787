//! Hub Gateway - catalog-to-Hub integration service
//!
//! OAuth token broker, Hub proxy, and catalog sync for an external
//! application-modernization Hub.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use hub_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::HubGateway,
    setup_tracing, sync,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Handle subcommands
    match cli.command {
        Some(Command::Sync { ref output }) => run_sync(&cli, output.as_deref()).await,
        Some(Command::CreateApp { ref name, ref repo }) => {
            run_create_app(&cli, name, repo.as_deref()).await
        }
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Load configuration, applying CLI overrides
fn load_config(cli: &Cli) -> Option<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

/// Run the gateway server
async fn run_server(cli: Cli) -> ExitCode {
    let Some(config) = load_config(&cli) else {
        return ExitCode::FAILURE;
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        hub = %config.hub.api_url(),
        "Starting Hub gateway"
    );

    let gateway = match HubGateway::new(config).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}

/// Run the catalog sync job
async fn run_sync(cli: &Cli, output: Option<&std::path::Path>) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    match sync::sync_catalog(&config).await {
        Ok(entities) => {
            let rendered = match serde_json::to_string_pretty(&entities) {
                Ok(s) => s,
                Err(e) => {
                    error!("Failed to serialize entity set: {e}");
                    return ExitCode::FAILURE;
                }
            };

            if let Some(path) = output {
                if let Err(e) = std::fs::write(path, rendered) {
                    error!("Failed to write {}: {e}", path.display());
                    return ExitCode::FAILURE;
                }
                info!(path = %path.display(), "Entity set written");
            } else {
                println!("{rendered}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Sync failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the create-application action
async fn run_create_app(cli: &Cli, name: &str, repo: Option<&str>) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    match sync::create_application(&config, name, repo).await {
        Ok(created) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&created).unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Create failed: {e}");
            ExitCode::FAILURE
        }
    }
}
