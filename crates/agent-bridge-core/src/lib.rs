//! Core abstractions for the agent bridge client.
//!
//! This crate provides the fundamental building blocks:
//! - `ConnectionState`, `AgentState`, `Session` - the session data model
//! - `AnyValue` - tagged dynamic payloads for tool inputs and outputs
//! - `BridgeError` - the error taxonomy surfaced to callers
//! - `BridgeConfig` - configuration and endpoint derivation
//! - Collaborator traits (session-id store, draft store, network monitor)

pub mod config;
pub mod error;
pub mod model;
pub mod network;
pub mod traits;
pub mod value;

pub use config::{BridgeConfig, ConfigError, ReconnectPolicy};
pub use error::{
    BridgeError, DEFAULT_RETRY_AFTER, MAX_RETRY_AFTER, ServerErrorKind, StoreError,
    classify_server_error,
};
pub use model::{
    AgentState, ConnectionState, PendingPermissionRequest, PendingQuestionRequest,
    PermissionChoice, PermissionMode, Question, QuestionOption, Session, TokenUsage, ToolProgress,
    ToolResult, ToolUse,
};
pub use network::NetworkStatus;
pub use traits::{DraftStore, NetworkMonitor, SessionIdStore};
pub use value::AnyValue;
