use serde_json::Value;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Where a recoverable error came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorScope {
    Discovery,
    Profile(String),
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Discovery => f.write_str("discovery"),
            ErrorScope::Profile(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Ready { profile_names: Vec<String> },
    Update { profile_name: String, value: Value },
    Error { scope: ErrorScope, message: String },
    ProfileDeleted { profile_name: String },
    Debug { message: String },
}

/// Fan-out of [`SyncEvent`]s. Publishing never waits on subscribers and
/// succeeds even when nobody is listening.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) {
        debug!("Publishing event: {:?}", event);
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn ready(&self, profile_names: Vec<String>) {
        self.publish(SyncEvent::Ready { profile_names });
    }

    pub fn update(&self, profile_name: &str, value: Value) {
        self.publish(SyncEvent::Update {
            profile_name: profile_name.to_string(),
            value,
        });
    }

    pub fn error(&self, scope: ErrorScope, error: &impl fmt::Display) {
        self.publish(SyncEvent::Error {
            scope,
            message: error.to_string(),
        });
    }

    pub fn profile_deleted(&self, profile_name: &str) {
        self.publish(SyncEvent::ProfileDeleted {
            profile_name: profile_name.to_string(),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.publish(SyncEvent::Debug {
            message: message.into(),
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
