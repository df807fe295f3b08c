//! Tag administration (/add-tag, /remove-tag, /set-link) and the handler
//! every custom tag command dispatches to.

use log::{error, info, warn};
use regex::Regex;
use serenity::model::permissions::Permissions;
use std::sync::OnceLock;

use crate::bindings::Binding;
use crate::commands::BuiltIn;
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::interaction::InteractionContext;
use crate::message::{Button, Reply};
use crate::tags::{CustomTag, TAG_DESCRIPTION};

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 32;
pub const MAX_LABEL_LEN: usize = 80;

/// Registry status meaning the guild reached its command quota.
const QUOTA_STATUS: u16 = 400;

fn url_pattern() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"^https?://[A-Za-z0-9\-._~]+(:\d+)?(/\S*)?$").unwrap())
}

/// Single word, lowercased and stripped to `[a-z0-9]`, 2 to 32 characters.
pub fn normalize_tag_name(raw: &str) -> BridgeResult<String> {
    if raw.split_whitespace().count() != 1 {
        return Err(BridgeError::Validation(
            "The name can only contain one word!".into(),
        ));
    }
    let name: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&name.len()) {
        return Err(BridgeError::Validation(format!(
            "The name must contain between {} and {} letters or digits!",
            MIN_NAME_LEN, MAX_NAME_LEN
        )));
    }
    Ok(name)
}

pub fn validate_link_url(url: &str) -> BridgeResult<()> {
    if url_pattern().is_match(url) {
        Ok(())
    } else {
        Err(BridgeError::Validation(format!(
            "`{}` is not a valid link! It should look like `https://example.com/page`.",
            url
        )))
    }
}

pub fn validate_link_label(label: &str) -> BridgeResult<()> {
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(BridgeError::Validation(format!(
            "The button label cannot be longer than {} characters!",
            MAX_LABEL_LEN
        )));
    }
    Ok(())
}

/// Guild id of an invocation allowed to manage tags.
fn require_manager(ctx: &InteractionContext) -> BridgeResult<u64> {
    let guild_id = ctx.guild_id.ok_or_else(|| {
        BridgeError::Permission("This command can only be used in a server!".into())
    })?;
    if !ctx.has_permission(Permissions::MANAGE_GUILD) {
        return Err(BridgeError::Permission(
            "You need the **Manage Server** permission to manage tags!".into(),
        ));
    }
    Ok(guild_id)
}

fn required<'a>(ctx: &'a InteractionContext, name: &str, index: usize) -> BridgeResult<&'a str> {
    ctx.args
        .string(name, index)
        .ok_or_else(|| BridgeError::Validation(format!("Missing the `{}` argument!", name)))
}

pub(super) async fn add_tag(dispatcher: &Dispatcher, ctx: &mut InteractionContext) -> BridgeResult<()> {
    let guild_id = require_manager(ctx)?;
    let name = normalize_tag_name(required(ctx, "name", 0)?)?;
    let answer = required(ctx, "answer", 1)?.to_string();

    if BuiltIn::from_name(&name).is_some() {
        return Err(BridgeError::Conflict(format!(
            "`/{}` is already a command of this bot!",
            name
        )));
    }
    if dispatcher.store().get_by_name(guild_id, &name).await?.is_some() {
        return Err(BridgeError::Conflict("A command already exists with this name!".into()));
    }
    let remote = dispatcher.registry().list_commands(Some(guild_id)).await?;
    if remote.iter().any(|c| c.name == name) {
        return Err(BridgeError::Conflict("A command already exists with this name!".into()));
    }

    let command = match dispatcher
        .registry()
        .add_command(Some(guild_id), &name, TAG_DESCRIPTION)
        .await
    {
        Ok(command) => command,
        Err(e) if e.status() == Some(QUOTA_STATUS) => {
            warn!("Guild {} refused tag /{}: {}", guild_id, name, e);
            return Err(BridgeError::Quota);
        }
        Err(e) => return Err(e),
    };

    let tag = CustomTag::new(command.id, guild_id, name.clone(), answer.clone());
    if let Err(e) = dispatcher.store().insert(&tag).await {
        error!(
            "[slash_command] Inconsistent state: command /{} ({}) exists in guild {} but its tag row could not be stored: {}",
            name, command.id, guild_id, e
        );
        return Err(e);
    }
    dispatcher.bindings().register(command.id, Binding::CustomTag);

    info!("🏷️ Tag /{} ({}) created in guild {}", name, command.id, guild_id);
    ctx.send(Reply::new(format!(
        "The command `/{}` has been added with the following answer:\n{}",
        name, answer
    )))
    .await?;
    Ok(())
}

pub(super) async fn remove_tag(dispatcher: &Dispatcher, ctx: &mut InteractionContext) -> BridgeResult<()> {
    let guild_id = require_manager(ctx)?;
    let name = normalize_tag_name(required(ctx, "name", 0)?)?;

    let local = dispatcher.store().get_by_name(guild_id, &name).await?;
    let command_id = match &local {
        Some(tag) => tag.id,
        None => {
            let remote = dispatcher.registry().list_commands(Some(guild_id)).await?;
            match remote.into_iter().find(|c| c.name == name) {
                Some(command) => command.id,
                None => {
                    return Err(BridgeError::NotFound(
                        "No command exists with this name!".into(),
                    ))
                }
            }
        }
    };

    if let Err(e) = dispatcher
        .registry()
        .remove_command(Some(guild_id), command_id)
        .await
    {
        warn!(
            "[slash_command] Something went wrong when deleting custom command {}: {}",
            command_id, e
        );
        ctx.send(Reply::new("Oops, something went wrong during the deletion!").hidden(true))
            .await?;
        return Ok(());
    }
    dispatcher.bindings().unregister(command_id);

    if local.is_some() {
        if let Err(e) = dispatcher.store().delete(guild_id, command_id).await {
            error!(
                "[slash_command] Inconsistent state: command {} was deleted from guild {} but its tag row remains: {}",
                command_id, guild_id, e
            );
            return Err(e);
        }
    }

    info!("🗑️ Tag /{} ({}) removed from guild {}", name, command_id, guild_id);
    ctx.send(Reply::new(format!("The command `/{}` has been deleted!", name)))
        .await?;
    Ok(())
}

pub(super) async fn set_link(dispatcher: &Dispatcher, ctx: &mut InteractionContext) -> BridgeResult<()> {
    let guild_id = require_manager(ctx)?;
    let name = normalize_tag_name(required(ctx, "tag", 0)?)?;
    let label = ctx.args.string("label", 1).map(str::trim).filter(|l| !l.is_empty());
    let url = ctx.args.string("url", 2).map(str::trim).filter(|u| !u.is_empty());

    if let Some(url) = url {
        validate_link_url(url)?;
    }
    if let Some(label) = label {
        validate_link_label(label)?;
    }

    let tag = dispatcher
        .store()
        .get_by_name(guild_id, &name)
        .await?
        .ok_or_else(|| BridgeError::NotFound(format!("No tag named `{}` in this server!", name)))?;

    // Without a url there is no button, so the label goes too.
    let label = url.and(label);
    dispatcher.store().set_link(tag.id, label, url).await?;

    let message = match url {
        Some(url) => format!(
            "The tag `/{}` now shows a **{}** button leading to <{}>",
            tag.name,
            label.unwrap_or(crate::tags::DEFAULT_LINK_LABEL),
            url
        ),
        None => format!("The link of `/{}` has been removed.", tag.name),
    };
    ctx.send(Reply::new(message)).await?;
    Ok(())
}

/// Answers a custom tag. Unknown ids are ignored silently.
pub async fn custom_tag(dispatcher: &Dispatcher, ctx: &mut InteractionContext) -> BridgeResult<()> {
    let Some(tag) = dispatcher.store().get_by_id(ctx.command_id).await? else {
        return Ok(());
    };

    let mut reply = Reply::new(tag.answer.clone());
    if let Some((label, url)) = tag.link() {
        reply = reply.button(Button::link(label, url));
    }
    ctx.send(reply).await?;
    Ok(())
}
