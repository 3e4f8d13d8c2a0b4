use appconfig_sync::provider::InMemoryProvider;
use appconfig_sync::{EngineOptions, SyncEngine, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

/// Poll interval used by engines built in tests
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Upper bound for waiting on a single event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Options with short intervals suitable for tests
///
/// # Arguments
/// * `prefix` - Optional key prefix
pub fn fast_options(prefix: Option<&str>) -> EngineOptions {
    EngineOptions {
        poll_interval: POLL_INTERVAL,
        discovery_interval: Duration::from_millis(40),
        key_prefix: prefix.map(str::to_string),
        ..EngineOptions::new("shop", "prod")
    }
}

/// Creates an engine over a fresh in-memory provider
///
/// # Returns
/// * `(provider, engine, events)` - the receiver is subscribed before start
#[allow(dead_code)]
pub fn memory_engine(
    options: EngineOptions,
) -> (Arc<InMemoryProvider>, SyncEngine, Receiver<SyncEvent>) {
    let provider = Arc::new(InMemoryProvider::new());
    let engine = SyncEngine::new(options, provider.clone()).expect("valid options");
    let events = engine.subscribe();
    (provider, engine, events)
}

/// Waits for the first event matching `predicate`, skipping others
///
/// # Panics
/// * If no matching event arrives within [`EVENT_TIMEOUT`]
pub async fn wait_for<F>(events: &mut Receiver<SyncEvent>, mut predicate: F) -> SyncEvent
where
    F: FnMut(&SyncEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Collects every event that arrives within `window`
#[allow(dead_code)]
pub async fn collect_for(events: &mut Receiver<SyncEvent>, window: Duration) -> Vec<SyncEvent> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        collected.push(event);
    }
    collected
}

#[allow(dead_code)]
pub fn is_update_for(event: &SyncEvent, name: &str) -> bool {
    matches!(event, SyncEvent::Update { profile_name, .. } if profile_name == name)
}
