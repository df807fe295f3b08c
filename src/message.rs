//! Reply payloads: content, embeds, attachments, the hidden flag and button
//! rows, serialized the way the interaction endpoints expect them.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{BridgeError, BridgeResult};

/// Message flag rendering a reply only to the invoking user.
pub const EPHEMERAL_FLAG: u64 = 1 << 6;
pub const MAX_EMBEDS: usize = 10;
pub const MAX_BUTTONS_PER_ROW: usize = 5;
pub const MAX_ROWS: usize = 5;
pub const MAX_BUTTON_LABEL: usize = 80;

const ACTION_ROW: u8 = 1;
const BUTTON: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary = 1,
    Secondary = 2,
    Success = 3,
    Danger = 4,
    Link = 5,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    Url(String),
    CustomId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub style: ButtonStyle,
    pub label: String,
    pub target: ButtonTarget,
    pub disabled: bool,
}

impl Button {
    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            style: ButtonStyle::Link,
            label: label.into(),
            target: ButtonTarget::Url(url.into()),
            disabled: false,
        }
    }

    pub fn action(style: ButtonStyle, label: impl Into<String>, custom_id: impl Into<String>) -> Self {
        Self {
            style,
            label: label.into(),
            target: ButtonTarget::CustomId(custom_id.into()),
            disabled: false,
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    fn to_json(&self) -> BridgeResult<Value> {
        if self.label.chars().count() > MAX_BUTTON_LABEL {
            return Err(BridgeError::InvalidMessage(format!(
                "button label longer than {} characters",
                MAX_BUTTON_LABEL
            )));
        }
        let mut button = json!({
            "type": BUTTON,
            "style": self.style as u8,
            "label": self.label,
            "disabled": self.disabled,
        });
        match (&self.target, self.style) {
            (ButtonTarget::Url(url), ButtonStyle::Link) => button["url"] = json!(url),
            (ButtonTarget::CustomId(id), style) if style != ButtonStyle::Link => {
                button["custom_id"] = json!(id)
            }
            _ => {
                return Err(BridgeError::InvalidMessage(
                    "link buttons need a url and other buttons a custom id".into(),
                ))
            }
        }
        Ok(button)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Value>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(json!({ "text": text.into() }));
        self
    }
}

/// File uploaded alongside a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// A reply as written by a handler. `embed`/`embeds` and `file`/`files`
/// are mutually exclusive; that is checked in [`Reply::into_payload`].
#[derive(Debug, Clone, Default)]
pub struct Reply {
    content: String,
    embed: Option<Embed>,
    embeds: Option<Vec<Embed>>,
    file: Option<Attachment>,
    files: Option<Vec<Attachment>>,
    tts: bool,
    hidden: bool,
    buttons: Vec<Button>,
}

impl Reply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn embeds(mut self, embeds: Vec<Embed>) -> Self {
        self.embeds = Some(embeds);
        self
    }

    pub fn file(mut self, file: Attachment) -> Self {
        self.file = Some(file);
        self
    }

    pub fn files(mut self, files: Vec<Attachment>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn tts(mut self, tts: bool) -> Self {
        self.tts = tts;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn has_files(&self) -> bool {
        self.file.is_some() || self.files.as_ref().map_or(false, |f| !f.is_empty())
    }

    /// Validates the reply and turns it into the wire payload.
    pub fn into_payload(self) -> BridgeResult<MessagePayload> {
        if self.embed.is_some() && self.embeds.is_some() {
            return Err(BridgeError::InvalidMessage(
                "`embed` and `embeds` cannot be used together".into(),
            ));
        }
        if self.file.is_some() && self.files.is_some() {
            return Err(BridgeError::InvalidMessage(
                "`file` and `files` cannot be used together".into(),
            ));
        }

        let embeds = match (self.embed, self.embeds) {
            (Some(embed), _) => vec![embed],
            (None, Some(embeds)) => embeds,
            (None, None) => Vec::new(),
        };
        if embeds.len() > MAX_EMBEDS {
            return Err(BridgeError::InvalidMessage(format!(
                "at most {} embeds per message",
                MAX_EMBEDS
            )));
        }

        let files = match (self.file, self.files) {
            (Some(file), _) => vec![file],
            (None, Some(files)) => files,
            (None, None) => Vec::new(),
        };

        if self.buttons.len() > MAX_BUTTONS_PER_ROW * MAX_ROWS {
            return Err(BridgeError::InvalidMessage(format!(
                "at most {} buttons per message",
                MAX_BUTTONS_PER_ROW * MAX_ROWS
            )));
        }
        let components = self
            .buttons
            .chunks(MAX_BUTTONS_PER_ROW)
            .map(|row| {
                let buttons = row
                    .iter()
                    .map(Button::to_json)
                    .collect::<BridgeResult<Vec<_>>>()?;
                Ok(json!({ "type": ACTION_ROW, "components": buttons }))
            })
            .collect::<BridgeResult<Vec<_>>>()?;

        let mut body = Map::new();
        body.insert("content".into(), json!(self.content));
        body.insert("tts".into(), json!(self.tts));
        body.insert("embeds".into(), serde_json::to_value(&embeds)?);
        body.insert("allowed_mentions".into(), json!({ "parse": [] }));
        if !components.is_empty() {
            body.insert("components".into(), Value::Array(components));
        }
        if self.hidden {
            body.insert("flags".into(), json!(EPHEMERAL_FLAG));
        }
        if !files.is_empty() {
            let attachments: Vec<Value> = files
                .iter()
                .enumerate()
                .map(|(i, f)| json!({ "id": i, "filename": f.filename }))
                .collect();
            body.insert("attachments".into(), Value::Array(attachments));
        }

        Ok(MessagePayload {
            body: Value::Object(body),
            files,
            hidden: self.hidden,
        })
    }
}

/// Validated wire form of a [`Reply`].
#[derive(Debug, Clone)]
pub struct MessagePayload {
    pub body: Value,
    pub files: Vec<Attachment>,
    pub hidden: bool,
}

impl MessagePayload {
    pub fn buttons(&self) -> Vec<&Value> {
        self.body
            .get("components")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get("components").and_then(Value::as_array))
                    .flatten()
                    .collect()
            })
            .unwrap_or_default()
    }
}
