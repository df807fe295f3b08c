//! Provisions the built-in slash commands with a bulk overwrite.
//!
//! Targets `REGISTER_GUILD_ID` when set (instant, handy for a test guild),
//! the global namespace otherwise.

use anyhow::Result;
use dotenvy::dotenv;
use log::{info, warn};

use tagbridge::commands::create_slash_commands;
use tagbridge::config::Config;
use tagbridge::http::DiscordHttp;
use tagbridge::registry::{CommandRegistry, HttpCommandRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let application_id = config.require_application_id()?;
    let http = DiscordHttp::new(&config.discord_token, &config.api_base_url, config.http_timeout())?;
    let registry = HttpCommandRegistry::new(http, application_id);

    match config.register_guild_id {
        Some(guild_id) => warn!(
            "⚠️ Overwriting the commands of guild {}; its custom tags will be unregistered",
            guild_id
        ),
        None => info!("🌐 Overwriting global commands"),
    }

    let definitions = create_slash_commands();
    let registered = registry
        .overwrite_commands(config.register_guild_id, &definitions)
        .await?;

    for command in &registered {
        info!("✅ /{} registered ({})", command.name, command.id);
    }
    info!("🎉 {} commands registered", registered.len());

    Ok(())
}
