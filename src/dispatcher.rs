//! # Feature: Slash Command Dispatcher
//!
//! Turns raw `INTERACTION_CREATE` events into handler calls. Owns the
//! command bindings and every client a handler may need, and routes handler
//! errors to the user or the operator.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Lazy resolution of unbound command ids, tagged report path
//! - 1.0.0: Initial raw event dispatcher

use log::{debug, error, info};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serenity::model::permissions::Permissions;
use std::sync::Arc;

use crate::bindings::{Binding, CommandBindings, ResolvedCommand};
use crate::commands::{self, BuiltIn, Latency};
use crate::config::Config;
use crate::error::{BridgeError, BridgeResult};
use crate::http::DiscordHttp;
use crate::interaction::{HttpInteractionApi, InteractionApi, InteractionContext, Invoker, ResponseState};
use crate::message::Reply;
use crate::options::CommandArgs;
use crate::registry::{CommandRegistry, HttpCommandRegistry};
use crate::snowflake;
use crate::tags::{SqliteTagStore, TagStore};

// Discord interaction types
pub const PING: u8 = 1;
pub const APPLICATION_COMMAND: u8 = 2;

const GENERIC_FAILURE: &str = "❌ Something went wrong while running this command. Please try again later.";

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    #[serde(deserialize_with = "snowflake::deserialize")]
    pub id: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberPayload {
    #[serde(default)]
    pub user: Option<UserPayload>,
    /// Sent as a decimal string by Discord.
    #[serde(default, deserialize_with = "deserialize_permissions")]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    #[serde(deserialize_with = "snowflake::deserialize")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub options: Vec<Value>,
}

/// The `d` field of an `INTERACTION_CREATE` event, or the body Discord posts
/// to the interactions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionPayload {
    #[serde(deserialize_with = "snowflake::deserialize")]
    pub id: u64,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default, deserialize_with = "snowflake::option::deserialize")]
    pub guild_id: Option<u64>,
    #[serde(default, deserialize_with = "snowflake::option::deserialize")]
    pub channel_id: Option<u64>,
    #[serde(default)]
    pub member: Option<MemberPayload>,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub data: Option<CommandData>,
}

fn deserialize_permissions<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Permissions>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(snowflake::from_value)
        .map(Permissions::from_bits_truncate))
}

impl InteractionPayload {
    /// Guild members come wrapped in `member`, DM users in `user`.
    fn invoker(&self) -> BridgeResult<Invoker> {
        let member = self.member.as_ref();
        let user = member
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
            .ok_or_else(|| BridgeError::Payload(format!("interaction {} has no user", self.id)))?;
        Ok(Invoker {
            id: user.id,
            name: user.global_name.clone().unwrap_or_else(|| user.username.clone()),
            permissions: member.and_then(|m| m.permissions),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a slash command, or a command nobody handles.
    Ignored,
    Handled,
    /// The handler or the event failed; already reported.
    Failed,
}

pub struct Dispatcher {
    registry: Arc<dyn CommandRegistry>,
    interactions: Arc<dyn InteractionApi>,
    store: Arc<dyn TagStore>,
    bindings: CommandBindings,
    latency: Latency,
    application_id: u64,
    support_server_url: Option<String>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn CommandRegistry>,
        interactions: Arc<dyn InteractionApi>,
        store: Arc<dyn TagStore>,
        application_id: u64,
    ) -> Self {
        Self {
            registry,
            interactions,
            store,
            bindings: CommandBindings::new(),
            latency: Latency::default(),
            application_id,
            support_server_url: None,
        }
    }

    /// Production wiring: REST clients against the configured API base and the SQLite store.
    pub async fn connect(config: &Config, application_id: u64) -> BridgeResult<Self> {
        let http = DiscordHttp::new(&config.discord_token, &config.api_base_url, config.http_timeout())?;
        let registry = HttpCommandRegistry::new(http.clone(), application_id);
        let interactions = HttpInteractionApi::new(http, application_id);
        let store = SqliteTagStore::open(&config.database_path).await?;

        Ok(Self::new(
            Arc::new(registry),
            Arc::new(interactions),
            Arc::new(store),
            application_id,
        )
        .with_support_server(config.support_server_url.clone()))
    }

    pub fn with_support_server(mut self, url: Option<String>) -> Self {
        self.support_server_url = url;
        self
    }

    pub fn with_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    pub fn registry(&self) -> &dyn CommandRegistry {
        self.registry.as_ref()
    }

    pub fn store(&self) -> &dyn TagStore {
        self.store.as_ref()
    }

    pub fn bindings(&self) -> &CommandBindings {
        &self.bindings
    }

    pub fn latency(&self) -> &Latency {
        &self.latency
    }

    pub fn application_id(&self) -> u64 {
        self.application_id
    }

    /// Buttons shown by `/about-tags`: the invite link, then the support server if configured.
    pub fn about_links(&self) -> Vec<(String, String)> {
        let mut links = vec![(
            "Invite the bot".to_string(),
            format!(
                "https://discord.com/oauth2/authorize?client_id={}&scope=bot%20applications.commands",
                self.application_id
            ),
        )];
        if let Some(url) = &self.support_server_url {
            links.push(("Support server".to_string(), url.clone()));
        }
        links
    }

    /// Binds the global built-ins. Called once the gateway is ready.
    pub async fn sync_commands(&self) -> BridgeResult<usize> {
        let bound = self.bindings.sync_commands(self.registry.as_ref()).await?;
        info!("✅ {} global slash commands bound", bound);
        Ok(bound)
    }

    /// Entry point for raw gateway events (`{"t": ..., "d": ...}`).
    pub async fn handle_raw_event(&self, event: &Value) -> DispatchOutcome {
        if event.get("t").and_then(Value::as_str) != Some("INTERACTION_CREATE") {
            return DispatchOutcome::Ignored;
        }
        let Some(data) = event.get("d") else {
            self.report_event_error(&BridgeError::Payload("event without `d`".into()), event);
            return DispatchOutcome::Failed;
        };
        if data.get("type").and_then(Value::as_u64) != Some(u64::from(APPLICATION_COMMAND)) {
            return DispatchOutcome::Ignored;
        }
        match InteractionPayload::deserialize(data) {
            Ok(payload) => self.dispatch_interaction(payload, ResponseState::Unresponded).await,
            Err(e) => {
                self.report_event_error(&e.into(), event);
                DispatchOutcome::Failed
            }
        }
    }

    /// Runs the handler bound to `payload`. `state` is `Deferred` when the
    /// interaction was already acknowledged, as the HTTP endpoint does.
    pub async fn dispatch_interaction(
        &self,
        payload: InteractionPayload,
        state: ResponseState,
    ) -> DispatchOutcome {
        if payload.kind != APPLICATION_COMMAND {
            debug!("Ignoring interaction {} of type {}", payload.id, payload.kind);
            return DispatchOutcome::Ignored;
        }

        let mut ctx = match self.build_context(payload, state) {
            Ok(ctx) => ctx,
            Err((e, raw)) => {
                self.report_event_error(&e, &raw);
                return DispatchOutcome::Failed;
            }
        };

        let binding = match self.resolve(ctx.command_id, &ctx.command_name).await {
            Ok(Some(binding)) => binding,
            Ok(None) => {
                debug!(
                    "Ignoring unbound command /{} ({})",
                    ctx.command_name, ctx.command_id
                );
                return DispatchOutcome::Ignored;
            }
            Err(e) => {
                self.report_error(&mut ctx, e).await;
                return DispatchOutcome::Failed;
            }
        };

        debug!(
            "▶️ /{} ({}) by {} in guild {:?}",
            ctx.command_name, ctx.command_id, ctx.invoker.name, ctx.guild_id
        );
        let result = match binding {
            Binding::BuiltIn(builtin) => builtin.run(self, &mut ctx).await,
            Binding::CustomTag => commands::custom_tag(self, &mut ctx).await,
        };

        match result {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => {
                self.report_error(&mut ctx, e).await;
                DispatchOutcome::Failed
            }
        }
    }

    fn build_context(
        &self,
        payload: InteractionPayload,
        state: ResponseState,
    ) -> Result<InteractionContext, (BridgeError, Value)> {
        let raw = || serde_json::json!({ "id": payload.id.to_string(), "type": payload.kind });
        let invoker = payload.invoker().map_err(|e| (e, raw()))?;
        let data = payload.data.as_ref().ok_or_else(|| {
            (
                BridgeError::Payload(format!("command interaction {} has no data", payload.id)),
                raw(),
            )
        })?;
        let args = CommandArgs::parse(&data.options).map_err(|e| (e, raw()))?;

        Ok(InteractionContext::new(
            self.interactions.clone(),
            payload.id,
            payload.token.clone(),
            data.id,
            data.name.clone(),
            payload.guild_id,
            payload.channel_id,
            invoker,
            args,
            state,
        ))
    }

    /// Binding for `command_id`, learning it on the fly for ids bound after startup.
    async fn resolve(&self, command_id: u64, name: &str) -> BridgeResult<Option<Binding>> {
        match self.bindings.resolve(command_id) {
            ResolvedCommand::BuiltIn(builtin) => Ok(Some(Binding::BuiltIn(builtin))),
            ResolvedCommand::CustomTag(_) => Ok(Some(Binding::CustomTag)),
            ResolvedCommand::Unknown(id) => {
                if let Some(builtin) = BuiltIn::from_name(name) {
                    info!("🔗 Binding /{} ({}) on first use", name, id);
                    self.bindings.register(id, Binding::BuiltIn(builtin));
                    return Ok(Some(Binding::BuiltIn(builtin)));
                }
                if self.store.get_by_id(id).await?.is_some() {
                    debug!("Binding custom tag /{} ({}) on first use", name, id);
                    self.bindings.register(id, Binding::CustomTag);
                    return Ok(Some(Binding::CustomTag));
                }
                Ok(None)
            }
        }
    }

    async fn report_error(&self, ctx: &mut InteractionContext, err: BridgeError) {
        if let Some(message) = err.user_message() {
            debug!("/{} refused for {}: {}", ctx.command_name, ctx.invoker.name, err);
            if let Err(e) = ctx.send(Reply::new(message).hidden(true)).await {
                error!(
                    "[slash_command] Could not report an error on /{} ({}): {}",
                    ctx.command_name, ctx.command_id, e
                );
            }
            return;
        }

        error!(
            "[slash_command] /{} ({}) failed in guild {:?} for user {}: {}",
            ctx.command_name, ctx.command_id, ctx.guild_id, ctx.invoker.id, err
        );
        if err.is_protocol() {
            return;
        }
        if let Err(e) = ctx.send(Reply::new(GENERIC_FAILURE).hidden(true)).await {
            error!(
                "[slash_command] Could not report a failure on /{} ({}): {}",
                ctx.command_name, ctx.command_id, e
            );
        }
    }

    /// Events that never made it to a handler.
    pub fn report_event_error(&self, err: &BridgeError, event: &Value) {
        let mut raw = event.to_string();
        if raw.len() > 500 {
            let mut end = 500;
            while !raw.is_char_boundary(end) {
                end -= 1;
            }
            raw.truncate(end);
            raw.push_str("...");
        }
        error!("[on_slash_command] {} | event: {}", err, raw);
    }
}
