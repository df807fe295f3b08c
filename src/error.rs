//! Error taxonomy shared by the registry client, the interaction client,
//! the tag store and the dispatcher.

use std::time::Duration;
use thiserror::Error;

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Bad tag name, label or url. Shown to the invoking user.
    #[error("{0}")]
    Validation(String),

    /// Missing "manage guild" capability, or a guild-only command used in DMs.
    #[error("{0}")]
    Permission(String),

    /// Name already registered locally or remotely.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// The registry refused to create another guild command.
    #[error("this server already has too many tags")]
    Quota,

    /// Non-2xx answer from the Discord REST API (429 excluded).
    #[error("Discord API answered {status}: {body}")]
    Registry { status: u16, body: String },

    /// Still rate limited after the single automatic retry.
    #[error("still rate limited after retrying (retry after {retry_after:?})")]
    RateLimited { retry_after: Duration },

    /// Misuse of the interaction response state machine, e.g. deferring twice.
    #[error("interaction protocol misuse: {0}")]
    Protocol(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("malformed interaction payload: {0}")]
    Payload(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("tag store error: {0}")]
    Store(#[from] sqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Text reported back to the invoking user for user-correctable errors.
    pub fn user_message(&self) -> Option<String> {
        match self {
            BridgeError::Validation(msg)
            | BridgeError::Permission(msg)
            | BridgeError::Conflict(msg)
            | BridgeError::NotFound(msg) => Some(format!("❌ {}", msg)),
            BridgeError::Quota => Some(
                "❌ This server already has too many tags! Remove one with `/remove-tag` first."
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Programming errors that make any further reply on the interaction pointless.
    pub fn is_protocol(&self) -> bool {
        matches!(self, BridgeError::Protocol(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Registry { status, .. } => Some(*status),
            _ => None,
        }
    }
}
