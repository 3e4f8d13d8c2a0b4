//! Directory-backed provider.
//!
//! Layout: `<root>/<application_id>/<file>`. Every regular file is a
//! profile whose id is the file name and whose name is the file stem. When
//! two files share a stem, only the first by file name is listed. An empty
//! file counts as a profile with nothing deployed.

use super::{ConfigProvider, ProviderError, ProviderResult};
use crate::digest::compute_digest;
use crate::types::{LatestConfiguration, Profile, ProfilePage};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct FileSession {
    path: PathBuf,
    /// Digest of the content last handed out on this session.
    served: Option<String>,
}

#[derive(Debug)]
pub struct DirectoryProvider {
    root: PathBuf,
    page_size: usize,
    sessions: Mutex<HashMap<String, FileSession>>,
    token_seq: AtomicU64,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
            sessions: Mutex::new(HashMap::new()),
            token_seq: AtomicU64::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, FileSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn issue_token(&self, session: FileSession) -> String {
        let seq = self.token_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let token = format!("{}@{}", session.path.display(), seq);
        self.sessions().insert(token.clone(), session);
        token
    }

    fn content_type_for(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => "application/json",
            Some("yaml") | Some("yml") => "application/x-yaml",
            _ => "text/plain",
        }
    }

    fn map_io(path: &Path, e: std::io::Error) -> ProviderError {
        if e.kind() == ErrorKind::NotFound {
            ProviderError::NotFound(path.display().to_string())
        } else {
            ProviderError::Unavailable(format!("{}: {}", path.display(), e))
        }
    }

    async fn list_all(&self, application_id: &str) -> ProviderResult<Vec<Profile>> {
        let dir = self.root.join(application_id);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Self::map_io(&dir, e))?;

        let mut profiles = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::map_io(&dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Self::map_io(&entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();
            let (Some(id), Some(name)) = (
                path.file_name().and_then(|n| n.to_str()),
                path.file_stem().and_then(|n| n.to_str()),
            ) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            profiles.push(Profile::new(id, name));
        }

        profiles.sort_by(|a, b| a.id.cmp(&b.id));

        // Profile names must be unique; the first file name wins
        let mut seen = HashSet::new();
        profiles.retain(|p| {
            if seen.insert(p.name.clone()) {
                true
            } else {
                warn!(
                    "Ignoring {} in {}: profile {} is already served by another file",
                    p.id,
                    dir.display(),
                    p.name
                );
                false
            }
        });
        Ok(profiles)
    }
}

#[async_trait]
impl ConfigProvider for DirectoryProvider {
    async fn list_profiles(
        &self,
        application_id: &str,
        next_token: Option<String>,
    ) -> ProviderResult<ProfilePage> {
        let profiles = self.list_all(application_id).await?;

        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ProviderError::Other(format!("Invalid next token: {token}")))?,
            None => 0,
        };
        let items: Vec<Profile> = profiles
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        let consumed = offset + items.len();
        let next_token = (consumed < profiles.len()).then(|| consumed.to_string());

        Ok(ProfilePage { items, next_token })
    }

    async fn start_session(
        &self,
        application_id: &str,
        _environment_id: &str,
        profile_id: &str,
    ) -> ProviderResult<Option<String>> {
        let path = self.root.join(application_id).join(profile_id);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Self::map_io(&path, e))?;

        if metadata.len() == 0 {
            debug!("Nothing deployed in {}", path.display());
            return Ok(None);
        }

        Ok(Some(self.issue_token(FileSession { path, served: None })))
    }

    async fn get_latest(&self, token: &str) -> ProviderResult<LatestConfiguration> {
        let session = self
            .sessions()
            .get(token)
            .cloned()
            .ok_or_else(|| ProviderError::Other(format!("Unknown or expired token: {token}")))?;

        let content = match tokio::fs::read(&session.path).await {
            Ok(content) => content,
            Err(e) => {
                // Transient read failures keep the session usable
                if e.kind() == ErrorKind::NotFound {
                    self.sessions().remove(token);
                }
                return Err(Self::map_io(&session.path, e));
            }
        };
        self.sessions().remove(token);
        let digest = compute_digest(&content);
        let unchanged = session.served.as_deref() == Some(digest.as_str());
        let content_type = Self::content_type_for(&session.path);

        let next_token = self.issue_token(FileSession {
            path: session.path,
            served: Some(digest),
        });

        Ok(LatestConfiguration {
            payload: (!unchanged).then_some(content),
            content_type: Some(content_type.to_string()),
            version: None,
            next_token: Some(next_token),
        })
    }
}
