//! In-process provider backed by plain maps.
//!
//! Every pull returns the full current deployment, so repeated pulls of an
//! unchanged profile exercise the engine's digest check. Failures can be
//! queued per operation to simulate a flaky service.

use super::{ConfigProvider, ProviderError, ProviderResult};
use crate::types::{LatestConfiguration, Profile, ProfilePage};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Deployment {
    payload: Vec<u8>,
    content_type: Option<String>,
    version: u64,
}

#[derive(Debug)]
struct StoredProfile {
    profile: Profile,
    deployment: Option<Deployment>,
}

#[derive(Debug)]
struct State {
    /// Keyed by profile id.
    profiles: BTreeMap<String, StoredProfile>,
    /// Live token -> profile id.
    sessions: HashMap<String, String>,
    token_seq: u64,
    page_size: usize,
    rotate_tokens: bool,
    list_failures: VecDeque<ProviderError>,
    pull_failures: HashMap<String, VecDeque<ProviderError>>,
    pulls: HashMap<String, usize>,
}

impl State {
    fn issue_token(&mut self, profile_id: &str) -> String {
        self.token_seq += 1;
        let token = format!("{}#{}", profile_id, self.token_seq);
        self.sessions.insert(token.clone(), profile_id.to_string());
        token
    }
}

#[derive(Debug)]
pub struct InMemoryProvider {
    state: Mutex<State>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                profiles: BTreeMap::new(),
                sessions: HashMap::new(),
                token_seq: 0,
                page_size: 50,
                rotate_tokens: true,
                list_failures: VecDeque::new(),
                pull_failures: HashMap::new(),
                pulls: HashMap::new(),
            }),
        }
    }

    /// Limit how many profiles a single listing page returns.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a profile with nothing deployed yet.
    pub fn add_profile(&self, id: &str, name: &str) {
        self.lock().profiles.insert(
            id.to_string(),
            StoredProfile {
                profile: Profile::new(id, name),
                deployment: None,
            },
        );
    }

    /// Deploy a new payload for `name`, creating the profile if needed.
    /// Returns the deployment version.
    pub fn deploy(
        &self,
        name: &str,
        payload: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) -> u64 {
        let mut state = self.lock();
        let id = state
            .profiles
            .iter()
            .find(|(_, p)| p.profile.name == name)
            .map_or_else(|| name.to_string(), |(id, _)| id.clone());
        let stored = state
            .profiles
            .entry(id.clone())
            .or_insert_with(|| StoredProfile {
                profile: Profile::new(id, name),
                deployment: None,
            });
        let version = stored.deployment.as_ref().map_or(1, |d| d.version + 1);
        stored.deployment = Some(Deployment {
            payload: payload.into(),
            content_type: content_type.map(str::to_string),
            version,
        });
        version
    }

    /// Delete a profile. Open sessions for it start reporting `NotFound`.
    pub fn remove_profile(&self, name: &str) {
        let mut state = self.lock();
        state.profiles.retain(|_, p| p.profile.name != name);
    }

    pub fn fail_next_list(&self, error: ProviderError) {
        self.lock().list_failures.push_back(error);
    }

    pub fn fail_next_pull(&self, name: &str, error: ProviderError) {
        self.lock()
            .pull_failures
            .entry(name.to_string())
            .or_default()
            .push_back(error);
    }

    /// When disabled, pulls stop handing out replacement tokens.
    pub fn set_rotate_tokens(&self, rotate: bool) {
        self.lock().rotate_tokens = rotate;
    }

    /// Number of `get_latest` calls answered for a profile name.
    pub fn pull_count(&self, name: &str) -> usize {
        self.lock().pulls.get(name).copied().unwrap_or(0)
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigProvider for InMemoryProvider {
    async fn list_profiles(
        &self,
        _application_id: &str,
        next_token: Option<String>,
    ) -> ProviderResult<ProfilePage> {
        let mut state = self.lock();
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }

        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ProviderError::Other(format!("Invalid next token: {token}")))?,
            None => 0,
        };

        let items: Vec<Profile> = state
            .profiles
            .values()
            .skip(offset)
            .take(state.page_size)
            .map(|p| p.profile.clone())
            .collect();
        let consumed = offset + items.len();
        let next_token = (consumed < state.profiles.len()).then(|| consumed.to_string());

        Ok(ProfilePage { items, next_token })
    }

    async fn start_session(
        &self,
        _application_id: &str,
        _environment_id: &str,
        profile_id: &str,
    ) -> ProviderResult<Option<String>> {
        let mut state = self.lock();
        let deployed = match state.profiles.get(profile_id) {
            Some(stored) => stored.deployment.is_some(),
            None => return Err(ProviderError::NotFound(profile_id.to_string())),
        };
        if !deployed {
            return Ok(None);
        }
        Ok(Some(state.issue_token(profile_id)))
    }

    async fn get_latest(&self, token: &str) -> ProviderResult<LatestConfiguration> {
        let mut state = self.lock();
        let profile_id = state
            .sessions
            .get(token)
            .cloned()
            .ok_or_else(|| ProviderError::Other(format!("Unknown or expired token: {token}")))?;

        if !state.profiles.contains_key(&profile_id) {
            state.sessions.remove(token);
            return Err(ProviderError::NotFound(profile_id));
        }
        let stored = &state.profiles[&profile_id];
        let name = stored.profile.name.clone();
        let deployment = stored.deployment.clone();

        *state.pulls.entry(name.clone()).or_default() += 1;

        if let Some(error) = state
            .pull_failures
            .get_mut(&name)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        let next_token = if state.rotate_tokens {
            state.sessions.remove(token);
            Some(state.issue_token(&profile_id))
        } else {
            None
        };

        Ok(match deployment {
            Some(d) => LatestConfiguration {
                payload: Some(d.payload),
                content_type: d.content_type,
                version: Some(d.version),
                next_token,
            },
            None => LatestConfiguration {
                next_token,
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_is_paginated() {
        let provider = InMemoryProvider::new().with_page_size(2);
        for name in ["a", "b", "c"] {
            provider.add_profile(name, name);
        }

        let first = provider.list_profiles("app", None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let second = provider.list_profiles("app", first.next_token).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, "c");
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_session_requires_deployment() {
        let provider = InMemoryProvider::new();
        provider.add_profile("p1", "flags");

        let token = provider.start_session("app", "prod", "p1").await.unwrap();
        assert!(token.is_none());

        provider.deploy("flags", "{}", Some("application/json"));
        let token = provider.start_session("app", "prod", "p1").await.unwrap();
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn test_tokens_rotate_on_pull() {
        let provider = InMemoryProvider::new();
        provider.deploy("flags", r#"{"a":1}"#, Some("application/json"));

        let token = provider
            .start_session("app", "prod", "flags")
            .await
            .unwrap()
            .unwrap();
        let latest = provider.get_latest(&token).await.unwrap();
        assert_eq!(latest.version, Some(1));
        let next = latest.next_token.unwrap();
        assert_ne!(next, token);

        // The consumed token is no longer valid
        assert!(matches!(
            provider.get_latest(&token).await,
            Err(ProviderError::Other(_))
        ));
        assert!(provider.get_latest(&next).await.is_ok());
        assert_eq!(provider.pull_count("flags"), 2);
    }

    #[tokio::test]
    async fn test_removed_profile_reports_not_found() {
        let provider = InMemoryProvider::new();
        provider.deploy("flags", "{}", None);
        let token = provider
            .start_session("app", "prod", "flags")
            .await
            .unwrap()
            .unwrap();

        provider.remove_profile("flags");
        assert!(matches!(
            provider.get_latest(&token).await,
            Err(ProviderError::NotFound(_))
        ));
    }
}
