//! Remote configuration provider boundary.
//!
//! The engine talks to the provider only through [`ConfigProvider`]. Two
//! implementations ship with the crate:
//!
//! - [`memory::InMemoryProvider`]: scriptable, process-local provider
//! - [`filesystem::DirectoryProvider`]: serves files from a directory tree

use crate::types::{LatestConfiguration, ProfilePage};
use async_trait::async_trait;
use thiserror::Error;

pub mod filesystem;
pub mod memory;

pub use filesystem::DirectoryProvider;
pub use memory::InMemoryProvider;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The profile behind a session no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("{0}")]
    Other(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// List one page of profiles for an application. Pass the previous
    /// page's `next_token` to continue.
    async fn list_profiles(
        &self,
        application_id: &str,
        next_token: Option<String>,
    ) -> ProviderResult<ProfilePage>;

    /// Open a pull session. `Ok(None)` means nothing is deployed for the
    /// profile in that environment.
    async fn start_session(
        &self,
        application_id: &str,
        environment_id: &str,
        profile_id: &str,
    ) -> ProviderResult<Option<String>>;

    /// Pull whatever is newer than what `token` has already seen.
    async fn get_latest(&self, token: &str) -> ProviderResult<LatestConfiguration>;
}
