use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named configuration unit known to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
}

impl Profile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One page of a profile listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePage {
    pub items: Vec<Profile>,
    /// Present while more pages remain.
    pub next_token: Option<String>,
}

/// Response of a "get latest" pull.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestConfiguration {
    /// `None` or empty means nothing new since the presented token.
    pub payload: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub version: Option<u64>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub parsed: serde_json::Value,
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}
