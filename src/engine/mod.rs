//! Public facade of the synchronization engine.
//!
//! A [`SyncEngine`] owns the session tokens, payload digests and cache for
//! one application/environment pair. [`SyncEngine::start`] runs the first
//! discovery pass and the first pull of every discovered profile, then
//! leaves discovery and one poller per profile running in the background
//! until [`SyncEngine::close`] is called or the engine is dropped.

use crate::cache::ConfigCache;
use crate::config::EngineOptions;
use crate::discovery::Discovery;
use crate::error::{Error, Result};
use crate::notification::{EventBus, SyncEvent};
use crate::poller::ProfilePoller;
use crate::provider::ConfigProvider;
use crate::session::SessionTracker;
use crate::types::{CacheEntry, Profile};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Lifecycle of a profile the engine has claimed.
#[derive(Debug)]
pub(crate) enum Tracker {
    Starting,
    Polling(JoinHandle<()>),
}

/// State shared between the facade, discovery and every poller task.
pub(crate) struct EngineShared {
    pub(crate) options: EngineOptions,
    pub(crate) provider: Arc<dyn ConfigProvider>,
    pub(crate) cache: Arc<ConfigCache>,
    pub(crate) sessions: SessionTracker,
    pub(crate) events: EventBus,
    trackers: Mutex<HashMap<String, Tracker>>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl EngineShared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn trackers(&self) -> MutexGuard<'_, HashMap<String, Tracker>> {
        self.trackers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Mark every profile not already tracked as starting and return those.
    pub(crate) fn claim_new(&self, profiles: &[Profile]) -> Vec<Profile> {
        let mut trackers = self.trackers();
        if self.is_closed() {
            return Vec::new();
        }

        let mut fresh = Vec::new();
        for profile in profiles {
            if !trackers.contains_key(&profile.name) {
                trackers.insert(profile.name.clone(), Tracker::Starting);
                fresh.push(profile.clone());
            }
        }
        fresh
    }

    pub(crate) fn untrack(&self, profile_name: &str) {
        self.trackers().remove(profile_name);
    }

    /// Spawn the recurring poll task for a started profile. Returns false
    /// when the engine closed in the meantime.
    pub(crate) fn install_poller(&self, poller: ProfilePoller) -> bool {
        let mut trackers = self.trackers();
        if self.is_closed() {
            return false;
        }

        let name = poller.profile_name().to_string();
        let handle = tokio::spawn(poller.run(self.shutdown_signal()));
        trackers.insert(name, Tracker::Polling(handle));
        true
    }

    pub(crate) fn tracked_profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .trackers()
            .iter()
            .filter(|(_, t)| matches!(t, Tracker::Polling(handle) if !handle.is_finished()))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn close(&self) {
        let mut trackers = self.trackers();
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown.send(true);
        let stopped = trackers.len();
        // In-flight pulls finish on their own and see the closed flag
        trackers.clear();
        drop(trackers);

        self.sessions.clear();
        self.cache.clear_digests();
        info!("Configuration engine closed, {} pollers stopped", stopped);
    }
}

pub struct SyncEngine {
    shared: Arc<EngineShared>,
    ready: OnceCell<Vec<String>>,
}

impl SyncEngine {
    /// Build an engine. Invalid options are the only fatal error.
    pub fn new(options: EngineOptions, provider: Arc<dyn ConfigProvider>) -> Result<Self> {
        options.validate()?;

        let cache = ConfigCache::with_prefix(options.key_prefix.clone().unwrap_or_default());
        let sessions = SessionTracker::new(&options.application_id, &options.environment_id);
        let events = EventBus::new(options.event_capacity);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(EngineShared {
                options,
                provider,
                cache: Arc::new(cache),
                sessions,
                events,
                trackers: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                shutdown,
            }),
            ready: OnceCell::new(),
        })
    }

    /// Run initial discovery and the first pull of each discovered profile,
    /// then keep both going in the background. Calling it again returns the
    /// profile names from the first run.
    pub async fn start(&self) -> Result<Vec<String>> {
        if self.shared.is_closed() {
            return Err(Error::Configuration("engine has been closed".to_string()));
        }

        let names = self
            .ready
            .get_or_init(|| async {
                info!(
                    "Starting configuration engine for {}/{}",
                    self.shared.options.application_id, self.shared.options.environment_id
                );

                let discovery = Discovery::new(self.shared.clone());
                let profiles = discovery.discover(true).await;
                let names: Vec<String> = profiles.into_iter().map(|p| p.name).collect();

                info!("Configuration engine ready with {} profiles", names.len());
                self.shared.events.ready(names.clone());

                tokio::spawn(discovery.run(self.shared.shutdown_signal()));
                names
            })
            .await;

        Ok(names.clone())
    }

    /// Stop discovery and every poller and release sessions and digests.
    /// Cached values stay readable.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Replace the key prefix. Only allowed before [`SyncEngine::start`].
    pub fn set_prefix(&self, prefix: impl Into<String>) -> Result<()> {
        if self.ready.initialized() {
            return Err(Error::Configuration(
                "key prefix cannot change after start".to_string(),
            ));
        }
        let prefix = prefix.into();
        debug!("Key prefix set to {:?}", prefix);
        self.shared.cache.set_prefix(prefix);
        Ok(())
    }

    pub fn prefix(&self) -> String {
        self.shared.cache.prefix()
    }

    pub fn get_all(&self) -> HashMap<String, CacheEntry> {
        self.shared.cache.get_all()
    }

    /// Parsed value for a short profile name.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.shared.cache.get(name)
    }

    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.shared.cache.get_or(name, default)
    }

    /// Handle for serving layers that read the cache directly.
    pub fn cache(&self) -> Arc<ConfigCache> {
        self.shared.cache.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Profiles with a running poller, sorted by name.
    pub fn tracked_profiles(&self) -> Vec<String> {
        self.shared.tracked_profiles()
    }

    /// Every cached value as one JSON object keyed by fully qualified name.
    pub fn snapshot_json(&self) -> Result<Value> {
        let sorted: BTreeMap<String, CacheEntry> = self.get_all().into_iter().collect();
        Ok(serde_json::to_value(sorted)?)
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shared.close();
    }
}
