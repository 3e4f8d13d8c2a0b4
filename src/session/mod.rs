use crate::error::{Error, Result};
use crate::provider::{ConfigProvider, ProviderError};
use crate::types::Profile;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Continuation tokens for every profile with an open pull session.
pub struct SessionTracker {
    application_id: String,
    environment_id: String,
    tokens: Mutex<HashMap<String, String>>,
}

impl SessionTracker {
    pub fn new(application_id: impl Into<String>, environment_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            environment_id: environment_id.into(),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a session for `profile` and remember its initial token.
    ///
    /// A provider that hands back no token has nothing deployed; that is
    /// reported as [`Error::Session`] and nothing is stored.
    pub async fn start_session(
        &self,
        provider: &dyn ConfigProvider,
        profile: &Profile,
    ) -> Result<String> {
        let token = provider
            .start_session(&self.application_id, &self.environment_id, &profile.id)
            .await
            .map_err(|e| match e {
                ProviderError::NotFound(_) => Error::ProfileGone(profile.name.clone()),
                other => Error::Provider(other),
            })?;

        let Some(token) = token else {
            return Err(Error::Session(format!(
                "No active deployment for profile {} in environment {}",
                profile.name, self.environment_id
            )));
        };

        info!("Started configuration session for {}", profile.name);
        self.tokens().insert(profile.name.clone(), token.clone());
        Ok(token)
    }

    pub fn token(&self, profile_name: &str) -> Option<String> {
        self.tokens().get(profile_name).cloned()
    }

    /// Replace the stored token when the provider issued a new one.
    /// Returns whether a replacement happened.
    pub fn advance(&self, profile_name: &str, next_token: Option<String>) -> bool {
        let Some(next_token) = next_token else {
            debug!("No new token for {}, keeping current session", profile_name);
            return false;
        };

        let mut tokens = self.tokens();
        match tokens.get_mut(profile_name) {
            Some(token) => {
                *token = next_token;
                true
            }
            // The session was released while the pull was in flight
            None => false,
        }
    }

    pub fn end_session(&self, profile_name: &str) -> Option<String> {
        self.tokens().remove(profile_name)
    }

    pub fn clear(&self) {
        self.tokens().clear();
    }

    pub fn len(&self) -> usize {
        self.tokens().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockConfigProvider;
    use mockall::predicate::eq;

    fn profile() -> Profile {
        Profile::new("id-1", "dev4_flags")
    }

    #[tokio::test]
    async fn test_start_session_stores_token() {
        let mut provider = MockConfigProvider::new();
        provider
            .expect_start_session()
            .with(eq("shop"), eq("prod"), eq("id-1"))
            .times(1)
            .returning(|_, _, _| Ok(Some("token-1".to_string())));

        let tracker = SessionTracker::new("shop", "prod");
        let token = tracker.start_session(&provider, &profile()).await.unwrap();

        assert_eq!(token, "token-1");
        assert_eq!(tracker.token("dev4_flags").as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn test_start_session_without_token_is_session_error() {
        let mut provider = MockConfigProvider::new();
        provider
            .expect_start_session()
            .times(1)
            .returning(|_, _, _| Ok(None));

        let tracker = SessionTracker::new("shop", "prod");
        let err = tracker
            .start_session(&provider, &profile())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Session(_)));
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_start_session_provider_failure() {
        let mut provider = MockConfigProvider::new();
        provider
            .expect_start_session()
            .returning(|_, _, _| Err(ProviderError::Unavailable("timeout".to_string())));

        let tracker = SessionTracker::new("shop", "prod");
        let err = tracker
            .start_session(&provider, &profile())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_advance_keeps_token_without_replacement() {
        let tracker = SessionTracker::new("shop", "prod");
        tracker
            .tokens()
            .insert("dev4_flags".to_string(), "token-1".to_string());

        assert!(!tracker.advance("dev4_flags", None));
        assert_eq!(tracker.token("dev4_flags").as_deref(), Some("token-1"));

        assert!(tracker.advance("dev4_flags", Some("token-2".to_string())));
        assert_eq!(tracker.token("dev4_flags").as_deref(), Some("token-2"));
    }

    #[test]
    fn test_advance_after_end_session_is_ignored() {
        let tracker = SessionTracker::new("shop", "prod");
        tracker
            .tokens()
            .insert("dev4_flags".to_string(), "token-1".to_string());

        assert_eq!(tracker.end_session("dev4_flags").as_deref(), Some("token-1"));
        assert!(!tracker.advance("dev4_flags", Some("token-2".to_string())));
        assert!(tracker.token("dev4_flags").is_none());
    }
}
