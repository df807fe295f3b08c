use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use serde_json::json;
use serenity::async_trait;
use serenity::client::{Context, RawEventHandler};
use serenity::model::event::Event;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use tagbridge::audit::audit_all;
use tagbridge::commands::Latency;
use tagbridge::config::Config;
use tagbridge::dispatcher::Dispatcher;

const LATENCY_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Forwards raw gateway events to the dispatcher, which only exists once
/// READY told us the application id.
struct Handler {
    config: Config,
    latency: Latency,
    dispatcher: OnceCell<Arc<Dispatcher>>,
}

impl Handler {
    async fn on_ready(&self, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        if let Some(shard) = ready.shard {
            info!("⚡ Shard: {}/{}", shard[0] + 1, shard[1]);
        }

        let application_id = ready.application.id.0;
        let dispatcher = match self
            .dispatcher
            .get_or_try_init(|| async {
                Dispatcher::connect(&self.config, application_id)
                    .await
                    .map(|d| Arc::new(d.with_latency(self.latency.clone())))
            })
            .await
        {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                error!("❌ Failed to initialize the dispatcher: {}", e);
                return;
            }
        };
        info!("🤖 Application ID: {}", dispatcher.application_id());

        if let Err(e) = dispatcher.sync_commands().await {
            error!("❌ Failed to load global slash commands: {}", e);
        }
        if let Err(e) = audit_all(dispatcher).await {
            error!("❌ Tag audit failed: {}", e);
        }
    }
}

#[async_trait]
impl RawEventHandler for Handler {
    async fn raw_event(&self, _ctx: Context, event: Event) {
        match event {
            Event::Ready(ready) => self.on_ready(ready.ready).await,
            Event::InteractionCreate(create) => {
                let Some(dispatcher) = self.dispatcher.get() else {
                    warn!("⚠️ Interaction received before the dispatcher was ready");
                    return;
                };
                match serde_json::to_value(&create.interaction) {
                    Ok(d) => {
                        let raw = json!({ "t": "INTERACTION_CREATE", "d": d });
                        dispatcher.handle_raw_event(&raw).await;
                    }
                    Err(e) => error!("[on_slash_command] Could not re-serialize interaction: {}", e),
                }
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("🚀 Starting tag bridge gateway bot...");

    let latency = Latency::default();
    let handler = Handler {
        config: config.clone(),
        latency: latency.clone(),
        dispatcher: OnceCell::new(),
    };

    // Slash commands arrive regardless of intents.
    let intents = GatewayIntents::GUILDS;
    let mut client = Client::builder(&config.discord_token, intents)
        .raw_event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {}", e);
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LATENCY_PROBE_INTERVAL);
        loop {
            interval.tick().await;
            let manager = shard_manager.lock().await;
            let runners = manager.runners.lock().await;
            latency.set(runners.values().find_map(|runner| runner.latency));
        }
    });

    info!("Establishing WebSocket connection to Discord gateway...");
    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {:?}", why);
        return Err(anyhow::anyhow!("Failed to establish gateway connection: {}", why));
    }

    Ok(())
}
