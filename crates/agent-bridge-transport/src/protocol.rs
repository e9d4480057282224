//! Wire protocol for client-server communication.
//!
//! Every frame is a JSON object with a top-level `type` discriminator.
//! Unrecognized `type` values, at the envelope level or inside a `stream`
//! frame, decode to nothing rather than to an error so that older clients keep
//! working against newer servers.

use std::collections::BTreeMap;

use agent_bridge_core::{
    AnyValue, PendingPermissionRequest, PendingQuestionRequest, PermissionChoice, PermissionMode,
    TokenUsage, ToolProgress,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Image attached to an `input` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    /// Encoding of `data`; always `base64`.
    #[serde(rename = "type")]
    pub encoding: String,
    pub data: String,
    pub mime_type: String,
}

impl ImageAttachment {
    /// Create an attachment from raw image bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            encoding: "base64".to_string(),
            data: BASE64.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Decode the image bytes.
    #[must_use]
    pub fn decode_data(&self) -> Option<Vec<u8>> {
        BASE64.decode(&self.data).ok()
    }
}

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Open or resume a session.
    Start {
        project_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        helper: Option<bool>,
    },
    /// User input for the agent.
    Input {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        images: Vec<ImageAttachment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking_mode: Option<String>,
    },
    /// Answer to a permission request.
    PermissionResponse { id: String, choice: PermissionChoice },
    /// Answers to a question request.
    QuestionResponse {
        id: String,
        answers: BTreeMap<String, AnyValue>,
    },
    /// Interrupt the current turn.
    Interrupt,
    /// Switch the model.
    SetModel { model: String },
    /// Change the agent's permission policy.
    SetPermissionMode { mode: PermissionMode },
    /// Drop input queued behind the current turn.
    CancelQueued,
}

impl ClientMessage {
    /// Build the `start` handshake. `helper` is only sent when set.
    #[must_use]
    pub fn start(
        project_path: impl Into<String>,
        session_id: Option<String>,
        model: Option<String>,
        helper: bool,
    ) -> Self {
        Self::Start {
            project_path: project_path.into(),
            session_id,
            model,
            helper: helper.then_some(true),
        }
    }

    /// Wire name of this message's `type`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Input { .. } => "input",
            Self::PermissionResponse { .. } => "permission_response",
            Self::QuestionResponse { .. } => "question_response",
            Self::Interrupt => "interrupt",
            Self::SetModel { .. } => "set_model",
            Self::SetPermissionMode { .. } => "set_permission_mode",
            Self::CancelQueued => "cancel_queued",
        }
    }

    /// Encode as a text frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Handshake acknowledgment.
    Connected {
        agent_id: String,
        session_id: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        protocol_version: Option<String>,
    },
    /// Wrapper around one agent stream event.
    Stream {
        #[serde(default)]
        id: String,
        #[serde(default)]
        timestamp: Option<String>,
        message: StreamMessage,
    },
    /// Server-side failure.
    Error {
        code: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        recoverable: bool,
        #[serde(default)]
        retryable: Option<bool>,
        #[serde(default)]
        retry_after: Option<f64>,
    },
    /// The turn finished.
    Stopped {
        #[serde(default)]
        reason: Option<String>,
    },
    /// The turn was interrupted.
    Interrupted,
    /// A session was created, updated or deleted on the server.
    SessionEvent {
        action: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        session: Option<AnyValue>,
    },
    /// A page of conversation history.
    History {
        #[serde(default)]
        messages: Vec<AnyValue>,
        #[serde(default)]
        has_more: bool,
        #[serde(default)]
        cursor: Option<String>,
    },
    /// The active model changed.
    ModelChanged {
        model: String,
        #[serde(default)]
        previous_model: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Agent event carried inside a `stream` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamMessage {
    /// Assistant text. Always fully committed; `delta` is legacy and ignored.
    Assistant {
        #[serde(default)]
        content: String,
        #[serde(default)]
        delta: Option<bool>,
    },
    Thinking {
        #[serde(default)]
        content: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: AnyValue,
    },
    ToolResult {
        id: String,
        #[serde(default)]
        tool: String,
        #[serde(default)]
        output: AnyValue,
        #[serde(default = "default_success")]
        success: bool,
        #[serde(default)]
        is_error: Option<bool>,
    },
    Progress(ToolProgress),
    Usage(TokenUsage),
    State {
        state: String,
        #[serde(default)]
        tool: Option<String>,
    },
    Permission(PendingPermissionRequest),
    Question(PendingQuestionRequest),
    SubagentStart {
        id: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        agent_type: Option<String>,
    },
    SubagentComplete {
        id: String,
        #[serde(default)]
        summary: String,
    },
    #[serde(other)]
    Unknown,
}

const fn default_success() -> bool {
    true
}

/// Decode one complete text frame.
///
/// Returns `Ok(None)` for frames whose `type` (or nested stream `type`) is not
/// recognized.
///
/// # Errors
/// Returns error if the frame is not valid JSON or a recognized message is
/// missing required fields.
pub fn decode_frame(text: &str) -> Result<Option<ServerMessage>, ProtocolError> {
    let message: ServerMessage = serde_json::from_str(text)?;
    match message {
        ServerMessage::Unknown
        | ServerMessage::Stream {
            message: StreamMessage::Unknown,
            ..
        } => {
            tracing::debug!("ignoring frame with unrecognized type");
            Ok(None)
        }
        message => Ok(Some(message)),
    }
}
