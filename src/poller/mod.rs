//! Per-profile pull loop.
//!
//! A poller moves through `Starting -> Polling -> Stopped`. Starting opens
//! a session; Polling pulls with the current token, applies real changes
//! to the cache and waits one interval after each pull completes, so only
//! one pull per profile is ever in flight. The poller stops when the
//! provider reports the profile gone or the engine closes.

use crate::codec;
use crate::digest::compute_digest;
use crate::engine::EngineShared;
use crate::error::{Error, Result};
use crate::notification::ErrorScope;
use crate::provider::ProviderError;
use crate::types::{CacheEntry, LatestConfiguration, Profile};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Continue,
    Deleted,
    Closed,
}

pub(crate) struct ProfilePoller {
    shared: Arc<EngineShared>,
    profile: Profile,
}

impl ProfilePoller {
    pub(crate) fn new(shared: Arc<EngineShared>, profile: Profile) -> Self {
        Self { shared, profile }
    }

    pub(crate) fn profile_name(&self) -> &str {
        &self.profile.name
    }

    /// Start the session, run the first pull, then hand the poller to a
    /// background task. The profile must already be claimed as starting.
    ///
    /// If the launch is dropped before it finishes, the claim is released
    /// so a later discovery cycle can start the profile again.
    pub(crate) async fn launch(self) {
        let name = self.profile.name.clone();
        let claim = StartingClaim::new(self.shared.clone(), &name);

        if let Err(e) = self
            .shared
            .sessions
            .start_session(self.shared.provider.as_ref(), &self.profile)
            .await
        {
            match e {
                Error::Session(_) | Error::ProfileGone(_) => {
                    warn!("Not starting {}: {}", name, e);
                    self.shared
                        .events
                        .debug(format!("Profile {name} not started: {e}"));
                }
                other => {
                    error!("Failed to start session for {}: {}", name, other);
                    self.shared.events.error(ErrorScope::Profile(name), &other);
                }
            }
            return;
        }

        match self.poll_once().await {
            PollOutcome::Continue => {
                let shared = self.shared.clone();
                if shared.install_poller(self) {
                    claim.keep();
                }
            }
            PollOutcome::Deleted => claim.keep(),
            PollOutcome::Closed => {}
        }
    }

    /// Recurring part: wait, pull, repeat until stopped.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.shared.options.poll_interval;

        loop {
            tokio::select! {
                _ = sleep(interval) => {}
                _ = shutdown.changed() => break,
            }

            match self.poll_once().await {
                PollOutcome::Continue => {}
                PollOutcome::Deleted => break,
                PollOutcome::Closed => {
                    self.shared.sessions.end_session(&self.profile.name);
                    break;
                }
            }
        }

        debug!("Poller for {} stopped", self.profile.name);
    }

    /// One pull with the current token.
    pub(crate) async fn poll_once(&self) -> PollOutcome {
        let name = self.profile.name.as_str();
        if self.shared.is_closed() {
            return PollOutcome::Closed;
        }

        let Some(token) = self.shared.sessions.token(name) else {
            debug!("No session for {}, stopping", name);
            self.shared.untrack(name);
            return PollOutcome::Closed;
        };

        let result = self.shared.provider.get_latest(&token).await;
        if self.shared.is_closed() {
            return PollOutcome::Closed;
        }

        match result {
            Ok(latest) => {
                let next_token = latest.next_token.clone();
                match self.apply(latest) {
                    Ok(true) => {}
                    Ok(false) => self
                        .shared
                        .events
                        .debug(format!("No configuration change for {name}")),
                    Err(e) => {
                        warn!("Skipping update for {}: {}", name, e);
                        self.shared
                            .events
                            .error(ErrorScope::Profile(name.to_string()), &e);
                    }
                }
                self.shared.sessions.advance(name, next_token);
                PollOutcome::Continue
            }
            Err(ProviderError::NotFound(_)) => {
                self.handle_deleted();
                PollOutcome::Deleted
            }
            Err(e) => {
                let e = Error::Provider(e);
                error!("Failed to pull configuration for {}: {}", name, e);
                self.shared
                    .events
                    .error(ErrorScope::Profile(name.to_string()), &e);
                PollOutcome::Continue
            }
        }
    }

    /// Update the cache when the payload differs from the last applied one.
    /// Returns whether the cache changed.
    fn apply(&self, latest: LatestConfiguration) -> Result<bool> {
        let name = self.profile.name.as_str();
        let LatestConfiguration {
            payload,
            content_type,
            version,
            ..
        } = latest;

        let Some(payload) = payload else {
            return Ok(false);
        };
        let text = std::str::from_utf8(&payload)
            .map_err(|e| Error::Parse(format!("payload for {name} is not valid UTF-8: {e}")))?;
        if text.trim().is_empty() {
            return Ok(false);
        }

        let digest = compute_digest(&payload);
        if self.shared.cache.digest_matches(name, &digest) {
            return Ok(false);
        }

        let parsed = codec::parse(text, content_type.as_deref())?;
        let entry = CacheEntry {
            parsed: parsed.clone(),
            content_type,
            version,
            updated_at: Utc::now(),
        };
        self.shared.cache.apply(name, digest, entry);

        info!("Configuration updated for {}", name);
        self.shared.events.update(name, parsed);
        Ok(true)
    }

    fn handle_deleted(&self) {
        let name = self.profile.name.as_str();
        warn!("Profile {} no longer exists, stopping poller", name);

        self.shared.sessions.end_session(name);
        if self.shared.options.purge_on_delete {
            self.shared.cache.purge(name);
        } else {
            self.shared.cache.forget_digest(name);
        }
        self.shared.untrack(name);
        self.shared.events.profile_deleted(name);
    }
}

/// A profile claimed as starting. Dropping it releases the claim and any
/// session opened for it, unless [`StartingClaim::keep`] was called.
struct StartingClaim {
    shared: Arc<EngineShared>,
    profile_name: String,
    armed: bool,
}

impl StartingClaim {
    fn new(shared: Arc<EngineShared>, profile_name: &str) -> Self {
        Self {
            shared,
            profile_name: profile_name.to_string(),
            armed: true,
        }
    }

    /// The profile reached Polling or Stopped and owns its tracker entry.
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for StartingClaim {
    fn drop(&mut self) {
        if self.armed {
            debug!("Releasing start claim for {}", self.profile_name);
            self.shared.sessions.end_session(&self.profile_name);
            self.shared.untrack(&self.profile_name);
        }
    }
}
