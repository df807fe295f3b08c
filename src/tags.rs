//! # Feature: Custom Tags
//!
//! Guild-defined slash commands answering with stored text and an optional
//! link button. Each row shares its id with the remote command it backs.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.3.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Link label and url columns
//! - 1.0.0: Initial tag table

use log::{debug, info};
use serenity::async_trait;
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::BridgeResult;

/// Description every tag command is registered with.
pub const TAG_DESCRIPTION: &str = "A custom tag!";
/// Button label used when a tag has a link but no label.
pub const DEFAULT_LINK_LABEL: &str = "click me";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTag {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub description: String,
    pub answer: String,
    pub link_label: Option<String>,
    pub link_url: Option<String>,
}

impl CustomTag {
    pub fn new(id: u64, guild_id: u64, name: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id,
            guild_id,
            name: name.into(),
            description: TAG_DESCRIPTION.to_string(),
            answer: answer.into(),
            link_label: None,
            link_url: None,
        }
    }

    /// Label and url of the link button, if the tag has a link.
    pub fn link(&self) -> Option<(&str, &str)> {
        self.link_url.as_deref().filter(|url| !url.is_empty()).map(|url| {
            let label = self
                .link_label
                .as_deref()
                .filter(|l| !l.is_empty())
                .unwrap_or(DEFAULT_LINK_LABEL);
            (label, url)
        })
    }
}

#[async_trait]
pub trait TagStore: Send + Sync {
    /// Lookup scoped to a guild; names are unique per guild.
    async fn get_by_name(&self, guild_id: u64, name: &str) -> BridgeResult<Option<CustomTag>>;

    /// Lookup by command id, which is globally unique.
    async fn get_by_id(&self, id: u64) -> BridgeResult<Option<CustomTag>>;

    async fn insert(&self, tag: &CustomTag) -> BridgeResult<()>;

    /// Returns whether a row was deleted.
    async fn delete(&self, guild_id: u64, id: u64) -> BridgeResult<bool>;

    /// Replaces both link fields. Returns whether a row was updated.
    async fn set_link(&self, id: u64, label: Option<&str>, url: Option<&str>) -> BridgeResult<bool>;

    async fn list_guild(&self, guild_id: u64) -> BridgeResult<Vec<CustomTag>>;

    /// Every guild that owns at least one tag.
    async fn guild_ids(&self) -> BridgeResult<Vec<u64>>;
}

#[derive(Clone)]
pub struct SqliteTagStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteTagStore {
    pub async fn open(database_path: &str) -> BridgeResult<Self> {
        let connection = sqlite::open(database_path)?;
        let store = SqliteTagStore {
            connection: Arc::new(Mutex::new(connection)),
        };

        store.init_tables().await?;
        info!("Tag store initialized at: {}", database_path);
        Ok(store)
    }

    pub async fn in_memory() -> BridgeResult<Self> {
        Self::open(":memory:").await
    }

    async fn init_tables(&self) -> BridgeResult<()> {
        let conn = self.connection.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS custom_tags (
                id INTEGER PRIMARY KEY,
                guild INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                answer TEXT NOT NULL,
                link_label TEXT,
                link_url TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(guild, name)
            )",
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_custom_tags_guild
             ON custom_tags(guild, name)",
        )?;

        Ok(())
    }
}

const SELECT_TAG: &str =
    "SELECT id, guild, name, description, answer, link_label, link_url FROM custom_tags";

fn read_tag(statement: &Statement) -> BridgeResult<CustomTag> {
    Ok(CustomTag {
        id: statement.read::<i64, _>("id")? as u64,
        guild_id: statement.read::<i64, _>("guild")? as u64,
        name: statement.read::<String, _>("name")?,
        description: statement.read::<String, _>("description")?,
        answer: statement.read::<String, _>("answer")?,
        link_label: statement.read::<Option<String>, _>("link_label")?,
        link_url: statement.read::<Option<String>, _>("link_url")?,
    })
}

#[async_trait]
impl TagStore for SqliteTagStore {
    async fn get_by_name(&self, guild_id: u64, name: &str) -> BridgeResult<Option<CustomTag>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(format!("{} WHERE guild = ? AND name = ?", SELECT_TAG))?;
        statement.bind((1, guild_id as i64))?;
        statement.bind((2, name))?;

        if let State::Row = statement.next()? {
            Ok(Some(read_tag(&statement)?))
        } else {
            Ok(None)
        }
    }

    async fn get_by_id(&self, id: u64) -> BridgeResult<Option<CustomTag>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(format!("{} WHERE id = ?", SELECT_TAG))?;
        statement.bind((1, id as i64))?;

        if let State::Row = statement.next()? {
            Ok(Some(read_tag(&statement)?))
        } else {
            Ok(None)
        }
    }

    async fn insert(&self, tag: &CustomTag) -> BridgeResult<()> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO custom_tags (id, guild, name, description, answer, link_label, link_url)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        statement.bind((1, tag.id as i64))?;
        statement.bind((2, tag.guild_id as i64))?;
        statement.bind((3, tag.name.as_str()))?;
        statement.bind((4, tag.description.as_str()))?;
        statement.bind((5, tag.answer.as_str()))?;
        statement.bind((6, tag.link_label.as_deref()))?;
        statement.bind((7, tag.link_url.as_deref()))?;
        statement.next()?;
        info!("Stored tag /{} ({}) for guild {}", tag.name, tag.id, tag.guild_id);
        Ok(())
    }

    async fn delete(&self, guild_id: u64, id: u64) -> BridgeResult<bool> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare("DELETE FROM custom_tags WHERE id = ? AND guild = ?")?;
        statement.bind((1, id as i64))?;
        statement.bind((2, guild_id as i64))?;
        statement.next()?;
        drop(statement);
        let deleted = conn.change_count() > 0;
        debug!("Deleted tag {} from guild {}: {}", id, guild_id, deleted);
        Ok(deleted)
    }

    async fn set_link(&self, id: u64, label: Option<&str>, url: Option<&str>) -> BridgeResult<bool> {
        let conn = self.connection.lock().await;
        let mut statement =
            conn.prepare("UPDATE custom_tags SET link_label = ?, link_url = ? WHERE id = ?")?;
        statement.bind((1, label))?;
        statement.bind((2, url))?;
        statement.bind((3, id as i64))?;
        statement.next()?;
        drop(statement);
        Ok(conn.change_count() > 0)
    }

    async fn list_guild(&self, guild_id: u64) -> BridgeResult<Vec<CustomTag>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(format!("{} WHERE guild = ? ORDER BY name", SELECT_TAG))?;
        statement.bind((1, guild_id as i64))?;

        let mut tags = Vec::new();
        while let State::Row = statement.next()? {
            tags.push(read_tag(&statement)?);
        }
        Ok(tags)
    }

    async fn guild_ids(&self) -> BridgeResult<Vec<u64>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare("SELECT DISTINCT guild FROM custom_tags ORDER BY guild")?;

        let mut guilds = Vec::new();
        while let State::Row = statement.next()? {
            guilds.push(statement.read::<i64, _>("guild")? as u64);
        }
        Ok(guilds)
    }
}
