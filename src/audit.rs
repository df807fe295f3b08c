//! Consistency check between the remote guild commands and the tag rows.
//!
//! Tag creation and removal are two-step operations that are never rolled
//! back, so a failure in the middle leaves a remote command without a row or
//! a row without a remote command. The audit only reports them.

use log::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::BridgeResult;
use crate::registry::RegisteredCommand;
use crate::tags::CustomTag;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Remote guild commands with no tag row.
    pub remote_only: Vec<RegisteredCommand>,
    /// Tag rows whose remote command is gone.
    pub local_only: Vec<CustomTag>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.remote_only.is_empty() && self.local_only.is_empty()
    }

    fn merge(&mut self, other: AuditReport) {
        self.remote_only.extend(other.remote_only);
        self.local_only.extend(other.local_only);
    }
}

pub async fn audit_guild(dispatcher: &Dispatcher, guild_id: u64) -> BridgeResult<AuditReport> {
    let remote = dispatcher.registry().list_commands(Some(guild_id)).await?;
    let local = dispatcher.store().list_guild(guild_id).await?;

    let remote_only: Vec<RegisteredCommand> = remote
        .iter()
        .filter(|c| !local.iter().any(|t| t.id == c.id))
        .cloned()
        .collect();
    let local_only: Vec<CustomTag> = local
        .into_iter()
        .filter(|t| !remote.iter().any(|c| c.id == t.id))
        .collect();

    for command in &remote_only {
        warn!(
            "⚠️ Guild {}: command /{} ({}) has no tag row",
            guild_id, command.name, command.id
        );
    }
    for tag in &local_only {
        warn!(
            "⚠️ Guild {}: tag /{} ({}) has no remote command",
            guild_id, tag.name, tag.id
        );
    }

    Ok(AuditReport {
        remote_only,
        local_only,
    })
}

/// Audits every guild owning at least one tag. A guild that cannot be
/// listed is skipped with a warning.
pub async fn audit_all(dispatcher: &Dispatcher) -> BridgeResult<AuditReport> {
    let guilds = dispatcher.store().guild_ids().await?;
    let mut report = AuditReport::default();

    for guild_id in &guilds {
        match audit_guild(dispatcher, *guild_id).await {
            Ok(guild_report) => report.merge(guild_report),
            Err(e) => warn!("⚠️ Could not audit guild {}: {}", guild_id, e),
        }
    }

    if report.is_consistent() {
        info!("✅ Tag audit: {} guilds consistent", guilds.len());
    } else {
        warn!(
            "⚠️ Tag audit: {} remote commands without a row, {} rows without a remote command",
            report.remote_only.len(),
            report.local_only.len()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{SqliteTagStore, TagStore};
    use crate::testing::{MockDiscord, MOCK_APP_ID};
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (MockDiscord, SqliteTagStore, Dispatcher) {
        let mock = MockDiscord::start().await;
        let store = SqliteTagStore::in_memory().await.unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(mock.registry()),
            Arc::new(mock.interactions()),
            Arc::new(store.clone()),
            MOCK_APP_ID,
        );
        (mock, store, dispatcher)
    }

    #[tokio::test]
    async fn test_audit_guild_finds_both_sides() {
        let (mock, store, dispatcher) = setup().await;
        mock.seed_command(Some(1), 10, "synced");
        mock.seed_command(Some(1), 11, "orphan");
        store.insert(&CustomTag::new(10, 1, "synced", "a")).await.unwrap();
        store.insert(&CustomTag::new(12, 1, "stale", "b")).await.unwrap();

        let report = audit_guild(&dispatcher, 1).await.unwrap();

        assert_eq!(report.remote_only.len(), 1);
        assert_eq!(report.remote_only[0].id, 11);
        assert_eq!(report.local_only.len(), 1);
        assert_eq!(report.local_only[0].name, "stale");
        // Nothing is repaired.
        assert_eq!(mock.commands(Some(1)).len(), 2);
        assert!(store.get_by_id(12).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_audit_all_skips_failing_guilds() {
        let (mock, store, dispatcher) = setup().await;
        mock.seed_command(Some(1), 10, "one");
        store.insert(&CustomTag::new(10, 1, "one", "a")).await.unwrap();
        store.insert(&CustomTag::new(20, 2, "two", "b")).await.unwrap();
        mock.push_response_for(Method::GET, StatusCode::FORBIDDEN, json!({"message": "Missing Access"}));

        let report = audit_all(&dispatcher).await.unwrap();

        // Guild 1 is audited first and refused; guild 2 still gets checked.
        assert_eq!(mock.count("GET", "/applications/"), 2);
        assert!(report.remote_only.is_empty());
        assert_eq!(report.local_only.len(), 1);
        assert_eq!(report.local_only[0].id, 20);
    }

    #[tokio::test]
    async fn test_consistent_store() {
        let (mock, store, dispatcher) = setup().await;
        mock.seed_command(Some(1), 10, "one");
        store.insert(&CustomTag::new(10, 1, "one", "a")).await.unwrap();

        assert!(audit_all(&dispatcher).await.unwrap().is_consistent());
    }
}
