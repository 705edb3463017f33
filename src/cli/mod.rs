//! CLI Module
//!
//! Command-line interface for wasuite using Clap v4.

mod commands;
mod sessions;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::load_config;

/// wasuite - WhatsApp Suite session connector
#[derive(Parser, Debug)]
#[command(name = "wasuite")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug mode (writes log files to ~/.wasuite/logs/)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List sessions with their current status
    List,

    /// Create a new session
    Create {
        /// Display name of the session
        #[arg(short, long)]
        name: String,

        /// Session type (MAIN, SALES, SUPPORT, ...)
        #[arg(short = 't', long = "type", default_value = "MAIN")]
        session_type: String,

        /// Keep running and follow the pairing until it finishes
        #[arg(short, long)]
        watch: bool,
    },

    /// Connect a session and follow the pairing
    Connect {
        /// Session ID
        id: String,

        /// Write the QR image here instead of drawing it in the terminal
        #[arg(long)]
        qr_out: Option<PathBuf>,
    },

    /// Show the QR code of a session
    Qr {
        /// Session ID
        id: String,

        /// Ask the backend for a fresh code first
        #[arg(short, long)]
        refresh: bool,

        /// Write the QR image here instead of drawing it in the terminal
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Follow every session that is still pairing
    Watch,

    /// Disconnect a session
    Disconnect {
        /// Session ID
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session ID
        id: String,
    },

    /// Initialize configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration
    Config {
        /// Show full configuration including secrets
        #[arg(short, long)]
        show_secrets: bool,
    },

    /// Log management operations
    Logs {
        #[command(subcommand)]
        operation: LogCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum LogCommands {
    /// Show log file location and status
    Status,
    /// Clean up old log files
    Clean {
        /// Maximum age in days (default: 7)
        #[arg(short = 'a', long, default_value = "7")]
        days: u64,
    },
}

/// Main CLI entry point
pub async fn run(cli: Cli) -> Result<()> {
    if cli.debug {
        tracing::info!("Debug mode enabled");
    }

    // Commands that must work with a broken or missing config
    match &cli.command {
        Commands::Init { force } => return commands::cmd_init(*force),
        Commands::Logs { operation } => return commands::cmd_logs(operation),
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List => sessions::cmd_list(&config).await,
        Commands::Create {
            name,
            session_type,
            watch,
        } => sessions::cmd_create(&config, name, &session_type, watch).await,
        Commands::Connect { id, qr_out } => sessions::cmd_connect(&config, &id, qr_out).await,
        Commands::Qr { id, refresh, out } => sessions::cmd_qr(&config, &id, refresh, out).await,
        Commands::Watch => sessions::cmd_watch(&config).await,
        Commands::Disconnect { id } => sessions::cmd_disconnect(&config, &id).await,
        Commands::Delete { id } => sessions::cmd_delete(&config, &id).await,
        Commands::Config { show_secrets } => commands::cmd_config(&config, show_secrets),
        Commands::Init { .. } | Commands::Logs { .. } => Ok(()),
    }
}
