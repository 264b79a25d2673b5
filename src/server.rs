use crate::config::Config;
use crate::core_http;
use anyhow::Result;
use log::{error, info};
use std::sync::Arc;

/// Runs the gateway with the provided configuration.
///
/// This function wires the path policy, cache, and FTP client together and
/// starts the HTTP listener, logging significant steps and potential issues.
pub async fn run(config: Config) -> Result<()> {
    info!(
        "Starting gateway: {} allowed remote path(s), cache {}",
        config.proxy.remote_paths.len(),
        if config.cache_enabled() { "enabled" } else { "disabled" }
    );

    match core_http::serve(Arc::new(config)).await {
        Ok(_) => info!("Gateway stopped."),
        Err(e) => {
            error!("Gateway failed: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
