//! /about-tags

use crate::dispatcher::Dispatcher;
use crate::error::BridgeResult;
use crate::interaction::InteractionContext;
use crate::message::{Button, Embed, Reply};

const ABOUT_TEXT: &str = "Custom tags are slash commands created by the members of a server. \
Each one answers with a text chosen when it was created, and can show a link button.\n\n\
• `/add-tag <name> <answer>` creates a tag\n\
• `/remove-tag <name>` deletes it\n\
• `/set-link <tag> [label] [url]` attaches a link button\n\n\
Managing tags requires the **Manage Server** permission. Discord allows a limited number of commands per server.";

pub(super) async fn about_tags(dispatcher: &Dispatcher, ctx: &mut InteractionContext) -> BridgeResult<()> {
    let embed = Embed::new()
        .title("🏷️ Custom tags")
        .description(ABOUT_TEXT)
        .color(0x5865F2);

    let mut reply = Reply::new("").embed(embed);
    for (label, url) in dispatcher.about_links() {
        reply = reply.button(Button::link(label, url));
    }
    ctx.send(reply).await?;
    Ok(())
}
