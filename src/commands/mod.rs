//! # Command System
//!
//! Built-in slash commands, their definitions for provisioning, and the
//! handler for guild-defined custom tags.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Tag commands (`add-tag`, `remove-tag`, `set-link`, `about-tags`)
//! - 1.0.0: Initial reorganization with modular command structure

mod about;
mod ping;
mod tags;

pub use ping::Latency;
pub use tags::{custom_tag, normalize_tag_name, validate_link_label, validate_link_url};

use serenity::model::permissions::Permissions;

use crate::dispatcher::Dispatcher;
use crate::error::BridgeResult;
use crate::interaction::InteractionContext;
use crate::options::STRING;
use crate::registry::{CommandDefinition, CommandOptionDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltIn {
    Ping,
    AddTag,
    RemoveTag,
    SetLink,
    AboutTags,
}

impl BuiltIn {
    pub const ALL: [BuiltIn; 5] = [
        BuiltIn::Ping,
        BuiltIn::AddTag,
        BuiltIn::RemoveTag,
        BuiltIn::SetLink,
        BuiltIn::AboutTags,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuiltIn::Ping => "ping",
            BuiltIn::AddTag => "add-tag",
            BuiltIn::RemoveTag => "remove-tag",
            BuiltIn::SetLink => "set-link",
            BuiltIn::AboutTags => "about-tags",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub async fn run(self, dispatcher: &Dispatcher, ctx: &mut InteractionContext) -> BridgeResult<()> {
        match self {
            BuiltIn::Ping => ping::ping(dispatcher, ctx).await,
            BuiltIn::AddTag => tags::add_tag(dispatcher, ctx).await,
            BuiltIn::RemoveTag => tags::remove_tag(dispatcher, ctx).await,
            BuiltIn::SetLink => tags::set_link(dispatcher, ctx).await,
            BuiltIn::AboutTags => about::about_tags(dispatcher, ctx).await,
        }
    }

    pub fn definition(self) -> CommandDefinition {
        let admin = Some(Permissions::MANAGE_GUILD.bits().to_string());
        match self {
            BuiltIn::Ping => definition(self, "Check that the bot is alive", vec![], None),
            BuiltIn::AddTag => definition(
                self,
                "Create a custom command answering with a fixed text",
                vec![
                    string_option("name", "Name of the new command (one word)", true),
                    string_option("answer", "What the command should answer", true),
                ],
                admin,
            ),
            BuiltIn::RemoveTag => definition(
                self,
                "Delete a custom command",
                vec![string_option("name", "Name of the command to delete", true)],
                admin,
            ),
            BuiltIn::SetLink => definition(
                self,
                "Attach a link button to a custom command",
                vec![
                    string_option("tag", "Name of the custom command", true),
                    string_option("label", "Text of the button (80 characters max)", false),
                    string_option("url", "Link opened by the button; omit to remove it", false),
                ],
                admin,
            ),
            BuiltIn::AboutTags => {
                definition(self, "Learn how custom commands work", vec![], None)
            }
        }
    }
}

fn definition(
    builtin: BuiltIn,
    description: &str,
    options: Vec<CommandOptionDefinition>,
    default_member_permissions: Option<String>,
) -> CommandDefinition {
    let guild_only = default_member_permissions.is_some();
    CommandDefinition {
        name: builtin.name().to_string(),
        description: description.to_string(),
        options,
        default_member_permissions,
        dm_permission: guild_only.then_some(false),
    }
}

fn string_option(name: &str, description: &str, required: bool) -> CommandOptionDefinition {
    CommandOptionDefinition {
        kind: STRING,
        name: name.to_string(),
        description: description.to_string(),
        required,
    }
}

/// Definitions of every built-in, for a bulk overwrite.
pub fn create_slash_commands() -> Vec<CommandDefinition> {
    BuiltIn::ALL.into_iter().map(BuiltIn::definition).collect()
}
