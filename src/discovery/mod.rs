use crate::engine::EngineShared;
use crate::error::Result;
use crate::notification::ErrorScope;
use crate::poller::ProfilePoller;
use crate::types::Profile;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Finds profiles at the provider and starts a poller for each new one.
pub(crate) struct Discovery {
    shared: Arc<EngineShared>,
}

impl Discovery {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    /// Every profile under the application whose name carries the key
    /// prefix, following pagination to the end.
    pub(crate) async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let prefix = self.shared.cache.prefix();
        let application_id = &self.shared.options.application_id;

        let mut profiles = Vec::new();
        let mut next_token = None;
        loop {
            let page = self
                .shared
                .provider
                .list_profiles(application_id, next_token)
                .await?;
            profiles.extend(
                page.items
                    .into_iter()
                    .filter(|p| p.name.starts_with(&prefix)),
            );

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(profiles)
    }

    /// One discovery cycle. Returns the profiles observed this cycle, or an
    /// empty list when listing failed.
    ///
    /// With `wait` set the call returns only after every new profile has
    /// attempted its session start and first pull; otherwise new pollers
    /// start in the background.
    pub(crate) async fn discover(&self, wait: bool) -> Vec<Profile> {
        let profiles = match self.list_profiles().await {
            Ok(profiles) => profiles,
            Err(e) => {
                error!("Profile discovery failed: {}", e);
                self.shared.events.error(ErrorScope::Discovery, &e);
                return Vec::new();
            }
        };

        let fresh = self.shared.claim_new(&profiles);
        if fresh.is_empty() {
            debug!("Discovery found {} profiles, none new", profiles.len());
        } else {
            let names: Vec<&str> = fresh.iter().map(|p| p.name.as_str()).collect();
            info!("Discovered new profiles: {}", names.join(", "));
            self.shared
                .events
                .debug(format!("Starting pollers for {}", names.join(", ")));
        }

        if wait {
            let mut launches = JoinSet::new();
            for profile in fresh {
                launches.spawn(ProfilePoller::new(self.shared.clone(), profile).launch());
            }
            while let Some(joined) = launches.join_next().await {
                if let Err(e) = joined {
                    error!("Profile start task failed: {}", e);
                }
            }
        } else {
            for profile in fresh {
                tokio::spawn(ProfilePoller::new(self.shared.clone(), profile).launch());
            }
        }

        profiles
    }

    /// Recurring discovery until shutdown.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.shared.options.discovery_interval;

        loop {
            tokio::select! {
                _ = sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
            if self.shared.is_closed() {
                break;
            }
            self.discover(false).await;
        }

        debug!("Discovery loop stopped");
    }
}
