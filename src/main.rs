mod config;
mod constants;
mod core_cache;
mod core_cli;
mod core_ftp;
mod core_http;
mod core_policy;
mod helpers;
mod server;

use crate::config::load_config;
use crate::core_cli::Cli;
use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Initialize the logger with a custom format
    let default_filter = if args.verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            writeln!(
                buf,
                "[{}] [{}] {}",
                timestamp,
                record.level(),
                record.args()
            )
        })
        .init();

    // Determine the default config path based on the OS
    let default_config_path = if cfg!(target_os = "windows") {
        "C:\\src\\rouilleproxy\\etc\\rouilleproxy.conf"
    } else {
        "/etc/rouilleproxy.conf"
    };

    // Load configuration from the TOML file
    let config_path = if args.config.is_empty() {
        default_config_path
    } else {
        args.config.as_str()
    };
    let config = load_config(config_path)?;

    // Run the gateway
    server::run(config).await?;

    Ok(())
}
