//! # Feature: Interaction Responses
//!
//! Three-phase interaction response protocol (initial response, deferral,
//! followup) implemented directly over the webhook endpoints, including
//! multipart uploads and message edit/delete.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Response state modelled as an enum instead of `deferred`/`responded` flags

use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use serenity::async_trait;
use serenity::model::permissions::Permissions;
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::http::DiscordHttp;
use crate::message::{MessagePayload, Reply, EPHEMERAL_FLAG};
use crate::options::CommandArgs;
use crate::snowflake;

// Discord interaction response types
pub const PONG: u8 = 1;
pub const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
pub const DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRef {
    Original,
    Id(u64),
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRef::Original => f.write_str("@original"),
            MessageRef::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Raw interaction endpoints. Message-returning calls yield the new message id when known.
#[async_trait]
pub trait InteractionApi: Send + Sync {
    async fn create_response(&self, interaction_id: u64, token: &str, body: &Value) -> BridgeResult<()>;

    async fn edit_message(
        &self,
        token: &str,
        message: MessageRef,
        payload: &MessagePayload,
    ) -> BridgeResult<Option<u64>>;

    async fn create_followup(&self, token: &str, payload: &MessagePayload) -> BridgeResult<Option<u64>>;

    async fn delete_message(&self, token: &str, message: MessageRef) -> BridgeResult<()>;
}

pub struct HttpInteractionApi {
    http: DiscordHttp,
    application_id: u64,
}

impl HttpInteractionApi {
    pub fn new(http: DiscordHttp, application_id: u64) -> Self {
        Self {
            http,
            application_id,
        }
    }

    fn webhook_url(&self, token: &str) -> String {
        self.http
            .url(&format!("/webhooks/{}/{}", self.application_id, token))
    }
}

/// JSON body, or `multipart/form-data` with a `payload_json` part when files are attached.
fn with_payload(builder: RequestBuilder, payload: &MessagePayload) -> RequestBuilder {
    if payload.files.is_empty() {
        return builder.json(&payload.body);
    }
    let mut form = Form::new().text("payload_json", payload.body.to_string());
    for (i, file) in payload.files.iter().enumerate() {
        let part = Part::bytes(file.data.clone()).file_name(file.filename.clone());
        form = form.part(format!("files[{}]", i), part);
    }
    builder.multipart(form)
}

async fn message_id(response: Response) -> Option<u64> {
    response
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v.get("id").and_then(snowflake::from_value))
}

#[async_trait]
impl InteractionApi for HttpInteractionApi {
    async fn create_response(&self, interaction_id: u64, token: &str, body: &Value) -> BridgeResult<()> {
        let url = self
            .http
            .url(&format!("/interactions/{}/{}/callback", interaction_id, token));
        self.http.execute(|c: &Client| c.post(&url).json(body)).await?;
        Ok(())
    }

    async fn edit_message(
        &self,
        token: &str,
        message: MessageRef,
        payload: &MessagePayload,
    ) -> BridgeResult<Option<u64>> {
        let url = format!("{}/messages/{}", self.webhook_url(token), message);
        let response = self
            .http
            .execute(|c| with_payload(c.request(Method::PATCH, &url), payload))
            .await?;
        Ok(message_id(response).await)
    }

    async fn create_followup(&self, token: &str, payload: &MessagePayload) -> BridgeResult<Option<u64>> {
        let url = format!("{}?wait=true", self.webhook_url(token));
        let response = self
            .http
            .execute(|c| with_payload(c.post(&url), payload))
            .await?;
        Ok(message_id(response).await)
    }

    async fn delete_message(&self, token: &str, message: MessageRef) -> BridgeResult<()> {
        let url = format!("{}/messages/{}", self.webhook_url(token), message);
        self.http.execute(|c| c.delete(&url)).await?;
        Ok(())
    }
}

/// Where an interaction is in the response protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Unresponded,
    /// Acknowledged with a loading placeholder; `hidden` is the visibility chosen at defer time.
    Deferred { hidden: bool },
    /// The initial response is used up; everything else is a followup.
    Responded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    pub id: u64,
    pub name: String,
    /// `None` outside of guilds.
    pub permissions: Option<Permissions>,
}

/// One invocation of a slash command, owned by the task handling it.
pub struct InteractionContext {
    pub interaction_id: u64,
    pub token: String,
    pub command_id: u64,
    pub command_name: String,
    pub guild_id: Option<u64>,
    pub channel_id: Option<u64>,
    pub invoker: Invoker,
    pub args: CommandArgs,
    state: ResponseState,
    api: Arc<dyn InteractionApi>,
}

impl InteractionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn InteractionApi>,
        interaction_id: u64,
        token: String,
        command_id: u64,
        command_name: String,
        guild_id: Option<u64>,
        channel_id: Option<u64>,
        invoker: Invoker,
        args: CommandArgs,
        state: ResponseState,
    ) -> Self {
        Self {
            interaction_id,
            token,
            command_id,
            command_name,
            guild_id,
            channel_id,
            invoker,
            args,
            state,
            api,
        }
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Whether the invoker holds `permission` (administrators hold everything).
    pub fn has_permission(&self, permission: Permissions) -> bool {
        self.invoker
            .permissions
            .map(|p| p.contains(Permissions::ADMINISTRATOR) || p.contains(permission))
            .unwrap_or(false)
    }

    /// Shows a loading state to the user. Only valid before any response.
    pub async fn defer(&mut self, hidden: bool) -> BridgeResult<()> {
        if self.state != ResponseState::Unresponded {
            return Err(BridgeError::Protocol(format!(
                "cannot defer interaction {} in state {:?}",
                self.interaction_id, self.state
            )));
        }
        let mut body = json!({ "type": DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE });
        if hidden {
            body["data"] = json!({ "flags": EPHEMERAL_FLAG });
        }
        self.api
            .create_response(self.interaction_id, &self.token, &body)
            .await?;
        self.state = ResponseState::Deferred { hidden };
        debug!("Deferred interaction {} (hidden: {})", self.interaction_id, hidden);
        Ok(())
    }

    /// Sends `reply` using whichever endpoint the current state allows.
    ///
    /// Replies with files defer first, since the callback endpoint takes no uploads.
    pub async fn send(&mut self, reply: Reply) -> BridgeResult<Option<u64>> {
        let payload = reply.into_payload()?;

        if self.state == ResponseState::Unresponded && !payload.files.is_empty() {
            self.defer(payload.hidden).await?;
        }

        match self.state {
            ResponseState::Unresponded => {
                let body = json!({
                    "type": CHANNEL_MESSAGE_WITH_SOURCE,
                    "data": payload.body,
                });
                self.api
                    .create_response(self.interaction_id, &self.token, &body)
                    .await?;
                self.state = ResponseState::Responded;
                Ok(None)
            }
            ResponseState::Deferred { hidden } => {
                if hidden != payload.hidden {
                    warn!(
                        "⚠️ Interaction {} was deferred as {} but answered as {}; the visibility of a deferred response cannot change",
                        self.interaction_id,
                        visibility(hidden),
                        visibility(payload.hidden)
                    );
                }
                let id = self
                    .api
                    .edit_message(&self.token, MessageRef::Original, &payload)
                    .await?;
                self.state = ResponseState::Responded;
                Ok(id)
            }
            ResponseState::Responded => self.api.create_followup(&self.token, &payload).await,
        }
    }

    pub async fn edit(&self, message: MessageRef, reply: Reply) -> BridgeResult<Option<u64>> {
        let payload = reply.into_payload()?;
        self.api.edit_message(&self.token, message, &payload).await
    }

    pub async fn delete(&self, message: MessageRef) -> BridgeResult<()> {
        self.api.delete_message(&self.token, message).await
    }
}

fn visibility(hidden: bool) -> &'static str {
    if hidden {
        "hidden"
    } else {
        "visible"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::message::Attachment;
    use crate::testing::MockDiscord;

    pub(crate) fn context(api: Arc<dyn InteractionApi>, state: ResponseState) -> InteractionContext {
        InteractionContext::new(
            api,
            842864675703488512,
            "tok".to_string(),
            789420712669872131,
            "ping".to_string(),
            Some(842823690999955481),
            Some(842823690999955483),
            Invoker {
                id: 842823322072907776,
                name: "Z_Speeder".to_string(),
                permissions: Some(Permissions::MANAGE_GUILD),
            },
            CommandArgs::default(),
            state,
        )
    }

    #[tokio::test]
    async fn test_first_send_uses_callback() {
        let mock = MockDiscord::start().await;
        let mut ctx = context(Arc::new(mock.interactions()), ResponseState::Unresponded);

        ctx.send(Reply::new("hello")).await.unwrap();

        assert_eq!(ctx.state(), ResponseState::Responded);
        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/interactions/842864675703488512/tok/callback");
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["type"], 4);
        assert_eq!(body["data"]["content"], "hello");
    }

    #[tokio::test]
    async fn test_send_after_defer_patches_original() {
        let mock = MockDiscord::start().await;
        let mut ctx = context(Arc::new(mock.interactions()), ResponseState::Unresponded);

        ctx.defer(false).await.unwrap();
        assert_eq!(ctx.state(), ResponseState::Deferred { hidden: false });
        let before = mock.count("POST", "/interactions/");

        ctx.send(Reply::new("done")).await.unwrap();

        assert_eq!(mock.count("POST", "/interactions/") - before, 0);
        assert_eq!(mock.count("PATCH", "/webhooks/"), 1);
        let patch = mock
            .requests()
            .into_iter()
            .find(|r| r.method == "PATCH")
            .unwrap();
        assert!(patch.path.ends_with("/messages/@original"));
        assert_eq!(ctx.state(), ResponseState::Responded);
    }

    #[tokio::test]
    async fn test_second_send_is_followup() {
        let mock = MockDiscord::start().await;
        let mut ctx = context(Arc::new(mock.interactions()), ResponseState::Unresponded);

        ctx.send(Reply::new("one")).await.unwrap();
        let id = ctx.send(Reply::new("two")).await.unwrap();

        assert_eq!(mock.count("POST", "/interactions/"), 1);
        assert_eq!(mock.count("PATCH", "/webhooks/"), 0);
        let followups: Vec<_> = mock
            .requests()
            .into_iter()
            .filter(|r| r.method == "POST" && r.path.starts_with("/webhooks/"))
            .collect();
        assert_eq!(followups.len(), 1);
        assert_eq!(id, Some(900));
        assert_eq!(ctx.state(), ResponseState::Responded);
    }

    #[tokio::test]
    async fn test_double_defer_is_protocol_error() {
        let mock = MockDiscord::start().await;
        let mut ctx = context(Arc::new(mock.interactions()), ResponseState::Unresponded);

        ctx.defer(true).await.unwrap();
        let err = ctx.defer(true).await.unwrap_err();
        assert!(err.is_protocol());

        ctx.send(Reply::new("x").hidden(true)).await.unwrap();
        assert!(ctx.defer(false).await.unwrap_err().is_protocol());
        assert_eq!(mock.count("POST", "/interactions/"), 1);
    }

    #[tokio::test]
    async fn test_hidden_defer_sets_flag() {
        let mock = MockDiscord::start().await;
        let mut ctx = context(Arc::new(mock.interactions()), ResponseState::Unresponded);

        ctx.defer(true).await.unwrap();
        let body: Value = serde_json::from_str(&mock.requests()[0].body).unwrap();
        assert_eq!(body, json!({"type": 5, "data": {"flags": 64}}));
    }

    #[tokio::test]
    async fn test_visibility_mismatch_still_sends() {
        let mock = MockDiscord::start().await;
        let mut ctx = context(Arc::new(mock.interactions()), ResponseState::Deferred { hidden: false });

        ctx.send(Reply::new("secret").hidden(true)).await.unwrap();
        assert_eq!(mock.count("PATCH", "/webhooks/"), 1);
        assert_eq!(ctx.state(), ResponseState::Responded);
    }

    #[tokio::test]
    async fn test_files_defer_then_upload_multipart() {
        let mock = MockDiscord::start().await;
        let mut ctx = context(Arc::new(mock.interactions()), ResponseState::Unresponded);

        ctx.send(Reply::new("card").file(Attachment::new("card.png", vec![0u8, 1, 2])))
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        let defer: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(defer["type"], 5);
        assert_eq!(requests[1].method, "PATCH");
        assert!(requests[1]
            .content_type
            .as_deref()
            .unwrap()
            .starts_with("multipart/form-data"));
        assert!(requests[1].body.contains("payload_json"));
        assert!(requests[1].body.contains("card.png"));
    }

    #[tokio::test]
    async fn test_invalid_reply_sends_nothing() {
        let mock = MockDiscord::start().await;
        let mut ctx = context(Arc::new(mock.interactions()), ResponseState::Unresponded);

        let reply = Reply::new("").embeds(vec![crate::message::Embed::new(); 11]);
        assert!(ctx.send(reply).await.is_err());
        assert!(mock.requests().is_empty());
        assert_eq!(ctx.state(), ResponseState::Unresponded);
    }

    #[tokio::test]
    async fn test_edit_and_delete_target_messages() {
        let mock = MockDiscord::start().await;
        let ctx = context(Arc::new(mock.interactions()), ResponseState::Responded);

        ctx.edit(MessageRef::Id(901), Reply::new("edited")).await.unwrap();
        ctx.delete(MessageRef::Original).await.unwrap();

        let requests = mock.requests();
        assert!(requests[0].path.ends_with("/tok/messages/901"));
        assert_eq!(requests[1].method, "DELETE");
        assert!(requests[1].path.ends_with("/tok/messages/@original"));
    }

    #[test]
    fn test_permission_check() {
        struct Nop;
        #[async_trait]
        impl InteractionApi for Nop {
            async fn create_response(&self, _: u64, _: &str, _: &Value) -> BridgeResult<()> {
                Ok(())
            }
            async fn edit_message(&self, _: &str, _: MessageRef, _: &MessagePayload) -> BridgeResult<Option<u64>> {
                Ok(None)
            }
            async fn create_followup(&self, _: &str, _: &MessagePayload) -> BridgeResult<Option<u64>> {
                Ok(None)
            }
            async fn delete_message(&self, _: &str, _: MessageRef) -> BridgeResult<()> {
                Ok(())
            }
        }

        let mut ctx = context(Arc::new(Nop), ResponseState::Unresponded);
        assert!(ctx.has_permission(Permissions::MANAGE_GUILD));
        ctx.invoker.permissions = Some(Permissions::SEND_MESSAGES);
        assert!(!ctx.has_permission(Permissions::MANAGE_GUILD));
        ctx.invoker.permissions = Some(Permissions::ADMINISTRATOR);
        assert!(ctx.has_permission(Permissions::MANAGE_GUILD));
        ctx.invoker.permissions = None;
        assert!(!ctx.has_permission(Permissions::MANAGE_GUILD));
    }
}
