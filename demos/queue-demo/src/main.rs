//! Drives the event pipeline end to end against a logging endpoint.
//!
//! Set `ROVER_CONFIG` to a JSON file to override the demo limits, and
//! `RUST_LOG=debug` to watch the queue and session internals.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Context as _;
use async_trait::async_trait;
use futures::StreamExt;
use rover_core::{
    AppLifecycle, Attributes, ClientError, ContextRegistry, EventInfo, Notification, QueueConfig,
    Region, RoverConfig, SessionConfig,
    context::{ContextManager, DebugContextManager, Locale, Reachability},
};
use rover_queue::{EventQueue, storage::FileStorage};
use rover_session::SessionTracker;
use rover_transport::{EventsEndpoint, JsonApiClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Accepts every batch and answers the first one with a region to monitor.
#[derive(Default)]
struct LoggingEndpoint {
    calls: AtomicUsize,
}

#[async_trait]
impl EventsEndpoint for LoggingEndpoint {
    async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let document: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| ClientError::Network(format!("unreadable request: {e}")))?;
        let names: Vec<_> = document["data"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|resource| resource["attributes"]["name"].as_str())
            .collect();
        tracing::info!(call, bytes = body.len(), ?names, "POST /v1/events");

        let reply = if call == 0 {
            serde_json::json!({
                "included": [{
                    "type": "geofence-regions",
                    "id": "head-office",
                    "attributes": { "latitude": 43.6532, "longitude": -79.3832, "radius": 150.0 }
                }]
            })
        } else {
            serde_json::json!({})
        };
        serde_json::to_vec(&reply).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

fn load_config() -> anyhow::Result<RoverConfig> {
    if let Ok(path) = std::env::var("ROVER_CONFIG") {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {path}"))?;
        return RoverConfig::from_json(&json).context("parsing config");
    }
    Ok(RoverConfig {
        queue: QueueConfig {
            flush_at: 5,
            flush_interval_secs: 2.0,
            ..QueueConfig::default()
        },
        session: SessionConfig { keep_alive_secs: 1 },
    })
}

fn screen_viewed(screen: &'static str) -> impl Fn(Duration) -> EventInfo + Send + Sync + 'static {
    move |duration| {
        let mut attributes = Attributes::new();
        // Both keys are valid identifiers.
        let _ = attributes.insert("screen", screen);
        let _ = attributes.insert("duration", duration.as_secs_f64());
        EventInfo::new("Screen Viewed")
            .with_namespace("rover")
            .with_attributes(attributes)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let storage_path: PathBuf = std::env::temp_dir().join("rover-demo").join("events.json");
    tracing::info!(path = %storage_path.display(), ?config, "Starting demo");

    let context = Arc::new(ContextManager::new());
    context.set_locale(Locale {
        language: Some("en".into()),
        region: Some("CA".into()),
        script: None,
    });
    context.set_time_zone("America/Toronto");
    context.set_reachability(Reachability {
        is_wifi_enabled: true,
        is_cellular_enabled: false,
    });
    context.update_user_info(|info| {
        let _ = info.insert("tier", "gold");
    });
    let registry = ContextRegistry::builder()
        .locale(context.clone())
        .time_zone(context.clone())
        .reachability(context.clone())
        .user_info(context.clone())
        .debug(Arc::new(DebugContextManager::new(true)))
        .build();

    let client = Arc::new(JsonApiClient::new(Arc::new(LoggingEndpoint::default())));
    let queue = EventQueue::new(
        config.queue.clone(),
        client,
        Arc::new(FileStorage::new(storage_path)),
    )?;
    queue.set_context_provider(Arc::new(registry));

    let mut notifications = queue.notifier().stream();
    let observer = tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            match notification {
                Notification::DidPostEvent(event) => {
                    tracing::info!(name = %event.name, id = %event.id, "Delivered");
                }
                Notification::DidReceiveRegions(regions) => {
                    let ids: Vec<_> = regions.iter().map(Region::identifier).collect();
                    tracing::info!(?ids, "Monitoring regions");
                }
                Notification::DidReceiveMessages(messages) => {
                    tracing::info!(count = messages.len(), "Inbox updated");
                }
            }
        }
    });

    let restored = queue.restore().await;
    if restored > 0 {
        tracing::info!(restored, "Resending events left over from last run");
    }
    let timer = queue.spawn_flush_timer();
    let tracker = SessionTracker::new(Arc::new(queue.clone()), &config.session);

    queue
        .add_event(EventInfo::new("App Opened").with_namespace("rover"))
        .await;
    tracker.register_session("home", screen_viewed("home"));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let office = Region::Geofence {
        identifier: "head-office".into(),
        latitude: 43.6532,
        longitude: -79.3832,
        radius: 150.0,
    };
    queue.add_event(EventInfo::region_entered(&office)).await;
    tracker.unregister_session("home");
    tracker.register_session("detail", screen_viewed("detail"));
    tokio::time::sleep(Duration::from_millis(800)).await;

    tracing::info!("App moving to background");
    tracker.handle_lifecycle(AppLifecycle::WillResignActive);
    queue.handle_lifecycle(AppLifecycle::WillResignActive).await;
    tokio::time::sleep(config.session.keep_alive() + Duration::from_millis(200)).await;
    queue.handle_lifecycle(AppLifecycle::DidEnterBackground).await;

    tracing::info!(remaining = queue.len(), "Demo finished");
    timer.abort();
    drop(queue);
    drop(tracker);
    observer.abort();
    Ok(())
}
