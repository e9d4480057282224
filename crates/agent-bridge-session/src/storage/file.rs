//! JSON-file session id store.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use agent_bridge_core::{SessionIdStore, StoreError};
use async_trait::async_trait;
use tokio::sync::Mutex;

const APP_NAME: &str = "agent-bridge";
const FILE_NAME: &str = "sessions.json";

/// Session ids keyed by project path, kept in a single JSON object on disk.
///
/// Writes replace the whole file through a temporary sibling so a crash never
/// leaves a half-written map behind.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store under the platform data directory, e.g.
    /// `~/.local/share/agent-bridge/sessions.json`.
    ///
    /// # Errors
    /// Returns error if no data directory can be determined.
    pub fn in_data_dir() -> Result<Self, StoreError> {
        let dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .ok_or_else(|| StoreError::Internal("unable to determine data directory".into()))?;
        Ok(Self::new(dir.join(APP_NAME).join(FILE_NAME)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(map)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionIdStore for FileSessionStore {
    async fn save(&self, session_id: &str, project_path: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(project_path.to_string(), session_id.to_string());
        self.write_map(&map).await
    }

    async fn load(&self, project_path: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(project_path))
    }

    async fn clear(&self, project_path: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(project_path).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}
