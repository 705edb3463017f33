//! CLI subcommands: init, config, logs, and config loading.

use anyhow::{Context, Result};

use super::LogCommands;
use crate::config::Config;
use crate::logging;
use crate::utils::mask_secret;

/// Load configuration from file or defaults
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = if let Some(path) = config_path {
        tracing::info!("Loading configuration from custom path: {}", path);
        Config::load_from_path(path)?
    } else {
        tracing::debug!("Loading default configuration");
        Config::load()?
    };

    config.validate()?;

    Ok(config)
}

/// Initialize configuration file
pub(crate) fn cmd_init(force: bool) -> Result<()> {
    println!("📱 wasuite Configuration Initialization\n");

    let config_path =
        Config::system_config_path().context("Could not determine config directory")?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    Config::default().save(&config_path)?;

    println!("✅ Configuration initialized at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set api.base_url to your WhatsApp Suite backend");
    println!("   2. Set WASUITE_API_TOKEN (or api.token) if the backend needs auth");
    println!("   3. Run 'wasuite list' to check the connection");

    Ok(())
}

/// Show configuration
pub(crate) fn cmd_config(config: &Config, show_secrets: bool) -> Result<()> {
    println!("📱 wasuite Configuration\n");

    println!("API URL: {}", config.api.base_url);
    if show_secrets {
        println!(
            "API token: {}",
            config.api.token.as_deref().unwrap_or("[NOT SET]")
        );
    } else {
        println!(
            "API token: {}",
            config
                .api
                .token
                .as_deref()
                .map(mask_secret)
                .unwrap_or_else(|| "[NOT SET]".to_string())
        );
    }
    println!("Request timeout: {}s", config.api.timeout_secs);

    println!("\nPolling:");
    println!("  Interval: {}ms", config.polling.interval_ms);
    if config.polling.max_duration_secs == 0 {
        println!("  Max duration: unlimited");
    } else {
        println!("  Max duration: {}s", config.polling.max_duration_secs);
    }
    println!(
        "  QR retries: {} x {}ms",
        config.polling.qr_retry_attempts, config.polling.qr_retry_delay_ms
    );

    println!("\nLog level: {}", config.logging.level);
    if let Some(file) = &config.logging.file {
        println!("Log file: {}", file.display());
    }

    if !show_secrets {
        println!("\n💡 Use --show-secrets to display the API token");
    }

    Ok(())
}

/// Log management
pub(crate) fn cmd_logs(operation: &LogCommands) -> Result<()> {
    let log_dir = logging::log_dir();

    match operation {
        LogCommands::Status => {
            println!("📊 wasuite Logging Status\n");
            println!("Log directory: {}", log_dir.display());

            let (files, bytes) = logging::log_stats(&log_dir)?;
            if files > 0 {
                println!("Status: ✅ Active");
                println!("Log files: {}", files);
                println!("Total size: {:.2} MB", bytes as f64 / (1024.0 * 1024.0));
            } else {
                println!("Status: ❌ No logs found");
            }

            println!("\n💡 To enable debug logging, run with -d flag:");
            println!("   wasuite -d watch");
            Ok(())
        }

        LogCommands::Clean { days } => {
            println!("🧹 Cleaning up log files older than {} days...\n", days);

            match logging::cleanup_old_logs(*days) {
                Ok(0) => println!("✅ No old log files to remove"),
                Ok(removed) => println!("✅ Removed {} old log file(s)", removed),
                Err(e) => println!("❌ Error cleaning logs: {}", e),
            }

            Ok(())
        }
    }
}
