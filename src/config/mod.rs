use crate::error::{Error, Result};
use std::time::Duration;

/// Engine settings. Build with struct update syntax over [`Default`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub application_id: String,
    pub environment_id: String,
    /// Delay between the end of one pull and the start of the next, per profile
    pub poll_interval: Duration,
    pub discovery_interval: Duration,
    /// Literal prefix for discovery filtering and lookup resolution
    pub key_prefix: Option<String>,
    /// Drop a deleted profile's cached value instead of leaving it servable
    pub purge_on_delete: bool,
    /// Buffered notifications per subscriber before old ones are dropped
    pub event_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            environment_id: String::new(),
            poll_interval: Duration::from_secs(30),
            discovery_interval: Duration::from_secs(60),
            key_prefix: None,
            purge_on_delete: false,
            event_capacity: 256,
        }
    }
}

impl EngineOptions {
    pub fn new(application_id: impl Into<String>, environment_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            environment_id: environment_id.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.application_id.trim().is_empty() {
            return Err(Error::Configuration(
                "application_id must not be empty".to_string(),
            ));
        }
        if self.environment_id.trim().is_empty() {
            return Err(Error::Configuration(
                "environment_id must not be empty".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Configuration(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.discovery_interval.is_zero() {
            return Err(Error::Configuration(
                "discovery_interval must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Configuration(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
