pub mod cache;
pub mod codec;
pub mod config;
pub mod digest;
mod discovery;
pub mod engine;
pub mod error;
pub mod notification;
mod poller;
pub mod provider;
pub mod session;
pub mod types;

pub use config::EngineOptions;
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use notification::{ErrorScope, SyncEvent};
pub use provider::{ConfigProvider, ProviderError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
