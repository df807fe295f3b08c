use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub application_id: Option<u64>,
    pub database_path: String,
    pub log_level: String,
    pub discord_public_key: Option<String>,
    pub api_base_url: String,
    pub http_timeout_secs: u64,
    pub http_port: u16,
    pub support_server_url: Option<String>,
    pub register_guild_id: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN environment variable not set"))?,
            application_id: parse_optional("DISCORD_APPLICATION_ID")?,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "tags.db".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            discord_public_key: env::var("DISCORD_PUBLIC_KEY").ok(),
            api_base_url: env::var("DISCORD_API_BASE")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            http_timeout_secs: parse_optional("HTTP_TIMEOUT_SECS")?.unwrap_or(10),
            http_port: parse_optional("HTTP_PORT")?.unwrap_or(6666),
            support_server_url: env::var("SUPPORT_SERVER_URL").ok().filter(|s| !s.is_empty()),
            register_guild_id: parse_optional("REGISTER_GUILD_ID")?,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Application id, required by everything that talks to the interaction endpoints.
    pub fn require_application_id(&self) -> Result<u64> {
        self.application_id
            .ok_or_else(|| anyhow::anyhow!("DISCORD_APPLICATION_ID environment variable not set"))
    }
}

fn parse_optional<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        _ => Ok(None),
    }
}
