//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Catalog-to-Hub integration gateway - OAuth token broker and proxy
#[derive(Parser, Debug)]
#[command(name = "hub-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "HUB_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "HUB_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "HUB_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "HUB_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "HUB_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Pull the Hub application inventory and emit the catalog entity set
    Sync {
        /// Write the entity set to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create an application in the Hub
    CreateApp {
        /// Display name of the new application
        #[arg(required = true)]
        name: String,

        /// URL of the application's source repository
        #[arg(long)]
        repo: Option<String>,
    },
}
