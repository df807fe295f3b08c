//! /ping

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::error::BridgeResult;
use crate::interaction::InteractionContext;
use crate::message::Reply;
use crate::snowflake;

const UNKNOWN: u64 = u64::MAX;

/// Last gateway heartbeat latency, shared between the shard watcher and `/ping`.
#[derive(Debug, Clone)]
pub struct Latency(Arc<AtomicU64>);

impl Default for Latency {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(UNKNOWN)))
    }
}

impl Latency {
    pub fn set(&self, latency: Option<Duration>) {
        let millis = latency.map_or(UNKNOWN, |d| d.as_millis().min(u128::from(UNKNOWN - 1)) as u64);
        self.0.store(millis, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Relaxed) {
            UNKNOWN => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }
}

/// Time elapsed since Discord created the interaction.
fn since_creation(interaction_id: u64) -> u64 {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    now.saturating_sub(snowflake::timestamp_ms(interaction_id))
}

pub(super) async fn ping(dispatcher: &Dispatcher, ctx: &mut InteractionContext) -> BridgeResult<()> {
    let millis = match dispatcher.latency().get() {
        Some(latency) => latency.as_millis() as u64,
        None => since_creation(ctx.interaction_id),
    };
    ctx.send(Reply::new(format!("Pong! (`{}`ms)", millis))).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_defaults_to_unknown() {
        let latency = Latency::default();
        assert_eq!(latency.get(), None);

        let shared = latency.clone();
        shared.set(Some(Duration::from_millis(42)));
        assert_eq!(latency.get(), Some(Duration::from_millis(42)));

        shared.set(None);
        assert_eq!(latency.get(), None);
    }

    #[test]
    fn test_since_creation_of_old_interaction() {
        // Created in May 2021, so well over a year ago.
        assert!(since_creation(842864675703488512) > 365 * 24 * 3600 * 1000);
    }
}
