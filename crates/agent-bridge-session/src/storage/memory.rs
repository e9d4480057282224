//! In-memory collaborator stores.

use std::{collections::HashMap, sync::RwLock};

use agent_bridge_core::{DraftStore, SessionIdStore, StoreError};
use async_trait::async_trait;

/// Session ids keyed by project path.
///
/// Useful for tests and single-process clients. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionIdStore for MemorySessionStore {
    async fn save(&self, session_id: &str, project_path: &str) -> Result<(), StoreError> {
        self.sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(project_path.to_string(), session_id.to_string());
        Ok(())
    }

    async fn load(&self, project_path: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(project_path)
            .cloned())
    }

    async fn clear(&self, project_path: &str) -> Result<(), StoreError> {
        self.sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .remove(project_path);
        Ok(())
    }
}

/// Drafts keyed by project path. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: RwLock<HashMap<String, String>>,
}

impl MemoryDraftStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn save_draft(&self, project_path: &str, text: &str) -> Result<(), StoreError> {
        self.drafts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(project_path.to_string(), text.to_string());
        Ok(())
    }

    async fn load_draft(&self, project_path: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .drafts
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(project_path)
            .cloned())
    }

    async fn clear_draft(&self, project_path: &str) -> Result<(), StoreError> {
        self.drafts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .remove(project_path);
        Ok(())
    }
}
