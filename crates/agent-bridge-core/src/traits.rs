//! Collaborator traits consumed by the bridge client.
//!
//! These are accessed only at connect, disconnect and error boundaries,
//! never while frames are streaming.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::StoreError;

/// Persists the last acknowledged session id per project.
#[async_trait]
pub trait SessionIdStore: Send + Sync {
    /// Remember `session_id` for `project_path`.
    async fn save(&self, session_id: &str, project_path: &str) -> Result<(), StoreError>;

    /// Load the remembered session id for `project_path`.
    async fn load(&self, project_path: &str) -> Result<Option<String>, StoreError>;

    /// Forget the session id for `project_path`.
    async fn clear(&self, project_path: &str) -> Result<(), StoreError>;
}

/// Persists unsent or failed input so the caller can offer a retry.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Store `text` as the draft for `project_path`, replacing any previous one.
    async fn save_draft(&self, project_path: &str, text: &str) -> Result<(), StoreError>;

    /// Load the draft for `project_path`.
    async fn load_draft(&self, project_path: &str) -> Result<Option<String>, StoreError>;

    /// Remove the draft for `project_path`.
    async fn clear_draft(&self, project_path: &str) -> Result<(), StoreError>;
}

/// Network reachability signal.
pub trait NetworkMonitor: Send + Sync {
    /// Whether a network path is currently available.
    fn is_available(&self) -> bool;

    /// Receiver notified on every reachability change.
    fn watch(&self) -> watch::Receiver<bool>;
}
