use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use tagbridge::config::Config;
use tagbridge::dispatcher::Dispatcher;
use tagbridge::http_server::start_http_server;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("🚀 Starting tag bridge HTTP server...");

    let application_id = config.require_application_id()?;
    let dispatcher = Dispatcher::connect(&config, application_id).await?;
    info!("✅ Dispatcher initialized");

    // Built-ins also bind lazily by name, so a failure here is not fatal.
    if let Err(e) = dispatcher.sync_commands().await {
        error!("❌ Failed to load global slash commands: {}", e);
    }

    if let Err(e) = start_http_server(config, Arc::new(dispatcher)).await {
        error!("❌ HTTP server failed: {}", e);
        return Err(e);
    }

    Ok(())
}
