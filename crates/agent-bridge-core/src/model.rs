//! Session data model shared by the codec and the client.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::AnyValue;

/// Transport connectivity as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport is open and no retry is scheduled.
    #[default]
    Disconnected,
    /// A transport is open and the `start` handshake is awaiting acknowledgment.
    Connecting,
    /// The server acknowledged the handshake.
    Connected {
        /// Identifier of the remote agent process.
        agent_id: String,
    },
    /// Waiting out the backoff before the given reconnection attempt.
    Reconnecting {
        /// One-based attempt number.
        attempt: u32,
    },
}

impl ConnectionState {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Agent id, present only while connected.
    #[must_use]
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Connected { agent_id } => Some(agent_id),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected { agent_id } => write!(f, "connected({agent_id})"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting({attempt})"),
        }
    }
}

/// Activity of the remote agent, independent of transport connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Starting,
    Thinking,
    Executing,
    WaitingPermission,
    WaitingInput,
    Recovering,
    Stopped,
}

impl AgentState {
    /// Parse a server-reported state name.
    ///
    /// Accepts both `snake_case` and `camelCase` spellings; unknown names yield `None`.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        let state = match name {
            "idle" => Self::Idle,
            "starting" => Self::Starting,
            "thinking" => Self::Thinking,
            "executing" => Self::Executing,
            "waiting_permission" | "waitingPermission" => Self::WaitingPermission,
            "waiting_input" | "waitingInput" => Self::WaitingInput,
            "recovering" => Self::Recovering,
            "stopped" => Self::Stopped,
            _ => return None,
        };
        Some(state)
    }

    /// Whether the agent is in the middle of a turn.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(
            self,
            Self::Starting
                | Self::Thinking
                | Self::Executing
                | Self::WaitingPermission
                | Self::WaitingInput
        )
    }
}

/// Parameters of the last `connect` call, replayed on reconnection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Server-acknowledged session id, if any.
    pub session_id: Option<String>,
    /// Project directory on the agent host.
    pub project_path: String,
    /// Requested model.
    pub model: Option<String>,
    /// Whether this is a helper (side) session.
    pub helper: bool,
}

impl Session {
    #[must_use]
    pub fn new(project_path: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            ..Self::default()
        }
    }
}

/// A tool invocation waiting for the user's permission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPermissionRequest {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub input: BTreeMap<String, AnyValue>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// One selectable answer of a [`Question`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A question the agent asks the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub multi_select: bool,
}

/// Questions waiting for the user's answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuestionRequest {
    pub id: String,
    pub questions: Vec<Question>,
}

/// Progress of a long-running tool. Transient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProgress {
    pub id: String,
    pub tool: String,
    /// Seconds since the tool started.
    #[serde(default)]
    pub elapsed: f64,
    /// Completion fraction, when the tool reports one.
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Token accounting snapshot. Replaced wholesale on every `usage` event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_create_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_limit: Option<u64>,
}

/// A tool call started by the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: AnyValue,
}

/// The outcome of a tool call, with its output already rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub id: String,
    pub tool: String,
    pub output: String,
    pub success: bool,
    pub is_error: bool,
}

/// The user's answer to a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionChoice {
    Allow,
    Deny,
    /// Allow now and for the rest of the session.
    Always,
}

/// Permission policy applied by the remote agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}
