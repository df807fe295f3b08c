//! HTTP command registry client: create, delete and list application
//! commands, globally or for a single guild.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serenity::async_trait;

use crate::error::BridgeResult;
use crate::http::DiscordHttp;
use crate::snowflake;

/// A command as known by Discord.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredCommand {
    #[serde(deserialize_with = "snowflake::deserialize")]
    pub id: u64,
    pub name: String,
    #[serde(default, deserialize_with = "snowflake::option::deserialize")]
    pub guild_id: Option<u64>,
    #[serde(default)]
    pub description: String,
}

/// Option declared on a command definition (only used for provisioning).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOptionDefinition {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Body of a command creation or bulk overwrite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    pub options: Vec<CommandOptionDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_permission: Option<bool>,
}

#[async_trait]
pub trait CommandRegistry: Send + Sync {
    /// `guild_id == None` targets the global namespace.
    async fn add_command(
        &self,
        guild_id: Option<u64>,
        name: &str,
        description: &str,
    ) -> BridgeResult<RegisteredCommand>;

    /// Returns the HTTP status Discord answered with.
    async fn remove_command(&self, guild_id: Option<u64>, command_id: u64) -> BridgeResult<u16>;

    async fn list_commands(&self, guild_id: Option<u64>) -> BridgeResult<Vec<RegisteredCommand>>;

    /// Replaces every command of the namespace with `definitions`.
    async fn overwrite_commands(
        &self,
        guild_id: Option<u64>,
        definitions: &[CommandDefinition],
    ) -> BridgeResult<Vec<RegisteredCommand>>;
}

pub struct HttpCommandRegistry {
    http: DiscordHttp,
    application_id: u64,
}

impl HttpCommandRegistry {
    pub fn new(http: DiscordHttp, application_id: u64) -> Self {
        Self {
            http,
            application_id,
        }
    }

    fn commands_path(&self, guild_id: Option<u64>) -> String {
        match guild_id {
            Some(guild_id) => format!(
                "/applications/{}/guilds/{}/commands",
                self.application_id, guild_id
            ),
            None => format!("/applications/{}/commands", self.application_id),
        }
    }
}

#[async_trait]
impl CommandRegistry for HttpCommandRegistry {
    async fn add_command(
        &self,
        guild_id: Option<u64>,
        name: &str,
        description: &str,
    ) -> BridgeResult<RegisteredCommand> {
        let url = self.http.url(&self.commands_path(guild_id));
        let body = json!({
            "name": name,
            "description": description,
            "options": [],
        });

        let response = self.http.execute(|c| c.post(&url).json(&body)).await?;
        let command: RegisteredCommand = response.json().await?;
        info!(
            "➕ Registered command /{} ({}) in {}",
            command.name,
            command.id,
            scope(guild_id)
        );
        Ok(command)
    }

    async fn remove_command(&self, guild_id: Option<u64>, command_id: u64) -> BridgeResult<u16> {
        let url = self
            .http
            .url(&format!("{}/{}", self.commands_path(guild_id), command_id));

        let response = self.http.execute(|c| c.delete(&url)).await?;
        let status = response.status().as_u16();
        info!(
            "➖ Removed command {} from {} (status {})",
            command_id,
            scope(guild_id),
            status
        );
        Ok(status)
    }

    async fn list_commands(&self, guild_id: Option<u64>) -> BridgeResult<Vec<RegisteredCommand>> {
        let url = self.http.url(&self.commands_path(guild_id));
        let response = self.http.execute(|c| c.get(&url)).await?;
        let commands: Vec<RegisteredCommand> = response.json().await?;
        debug!("Fetched {} command(s) from {}", commands.len(), scope(guild_id));
        Ok(commands)
    }

    async fn overwrite_commands(
        &self,
        guild_id: Option<u64>,
        definitions: &[CommandDefinition],
    ) -> BridgeResult<Vec<RegisteredCommand>> {
        let url = self.http.url(&self.commands_path(guild_id));
        let response = self.http.execute(|c| c.put(&url).json(definitions)).await?;
        let commands: Vec<RegisteredCommand> = response.json().await?;
        info!(
            "📋 Overwrote {} command(s) in {}",
            commands.len(),
            scope(guild_id)
        );
        Ok(commands)
    }
}

fn scope(guild_id: Option<u64>) -> String {
    match guild_id {
        Some(id) => format!("guild {}", id),
        None => "global scope".to_string(),
    }
}
