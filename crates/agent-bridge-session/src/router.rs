//! Event fan-out.
//!
//! Every routed event goes to at most one callback registered for its kind and
//! then to the broadcast channel behind [`crate::BridgeClient::subscribe`].
//! Callbacks run inline on the client task, in decode order, so they must
//! return quickly; anything slow belongs on the broadcast stream.

use std::collections::HashMap;

use agent_bridge_core::{
    AgentState, AnyValue, BridgeError, ConnectionState, PendingPermissionRequest,
    PendingQuestionRequest, TokenUsage, ToolProgress, ToolResult, ToolUse,
};
use tokio::sync::broadcast;

/// Callback slot selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Text,
    Thinking,
    ToolStart,
    ToolResult,
    ToolProgress,
    Usage,
    Permission,
    Question,
    Error,
    Stopped,
    SubagentStart,
    SubagentComplete,
    SessionConnected,
    ModelChanged,
    SessionEvent,
    History,
    ConnectionState,
    AgentState,
}

/// An application-level event produced from decoded frames or local
/// transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Assistant text currently on display.
    Text(String),
    Thinking(String),
    ToolStart(ToolUse),
    ToolResult(ToolResult),
    Progress(ToolProgress),
    Usage(TokenUsage),
    PermissionRequested(PendingPermissionRequest),
    QuestionAsked(PendingQuestionRequest),
    Error(BridgeError),
    /// The turn ended, either normally or by interruption.
    Stopped {
        reason: Option<String>,
        interrupted: bool,
    },
    SubagentStarted {
        id: String,
        description: String,
        agent_type: Option<String>,
    },
    SubagentCompleted {
        id: String,
        summary: String,
    },
    SessionConnected {
        agent_id: String,
        session_id: String,
        model: Option<String>,
        version: Option<String>,
        protocol_version: Option<String>,
    },
    ModelChanged {
        model: String,
        previous_model: Option<String>,
    },
    SessionEvent {
        action: String,
        session_id: Option<String>,
        session: Option<AnyValue>,
    },
    History {
        messages: Vec<AnyValue>,
        has_more: bool,
        cursor: Option<String>,
    },
    ConnectionStateChanged(ConnectionState),
    AgentStateChanged(AgentState),
}

impl BridgeEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Text(_) => EventKind::Text,
            Self::Thinking(_) => EventKind::Thinking,
            Self::ToolStart(_) => EventKind::ToolStart,
            Self::ToolResult(_) => EventKind::ToolResult,
            Self::Progress(_) => EventKind::ToolProgress,
            Self::Usage(_) => EventKind::Usage,
            Self::PermissionRequested(_) => EventKind::Permission,
            Self::QuestionAsked(_) => EventKind::Question,
            Self::Error(_) => EventKind::Error,
            Self::Stopped { .. } => EventKind::Stopped,
            Self::SubagentStarted { .. } => EventKind::SubagentStart,
            Self::SubagentCompleted { .. } => EventKind::SubagentComplete,
            Self::SessionConnected { .. } => EventKind::SessionConnected,
            Self::ModelChanged { .. } => EventKind::ModelChanged,
            Self::SessionEvent { .. } => EventKind::SessionEvent,
            Self::History { .. } => EventKind::History,
            Self::ConnectionStateChanged(_) => EventKind::ConnectionState,
            Self::AgentStateChanged(_) => EventKind::AgentState,
        }
    }
}

/// Callback invoked for one event kind.
pub type EventHandler = Box<dyn Fn(&BridgeEvent) + Send + Sync>;

/// One callback slot per [`EventKind`] plus a broadcast channel.
pub struct EventRouter {
    slots: HashMap<EventKind, EventHandler>,
    broadcast: broadcast::Sender<BridgeEvent>,
}

impl EventRouter {
    /// Create a router whose broadcast channel buffers `capacity` events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (broadcast, _) = broadcast::channel(capacity.max(1));
        Self {
            slots: HashMap::new(),
            broadcast,
        }
    }

    /// Install `handler` for `kind`, replacing any previous one.
    pub fn on(&mut self, kind: EventKind, handler: EventHandler) {
        self.slots.insert(kind, handler);
    }

    /// Remove the handler for `kind`. Returns whether one was installed.
    pub fn off(&mut self, kind: EventKind) -> bool {
        self.slots.remove(&kind).is_some()
    }

    /// Sender half of the broadcast channel, for handing out subscriptions.
    #[must_use]
    pub fn sender(&self) -> broadcast::Sender<BridgeEvent> {
        self.broadcast.clone()
    }

    pub fn dispatch(&self, event: BridgeEvent) {
        tracing::trace!(kind = ?event.kind(), "dispatching event");
        if let Some(handler) = self.slots.get(&event.kind()) {
            handler(&event);
        }
        // No receivers is fine.
        let _ = self.broadcast.send(event);
    }

    pub fn dispatch_all(&self, events: impl IntoIterator<Item = BridgeEvent>) {
        for event in events {
            self.dispatch(event);
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .field("subscribers", &self.broadcast.receiver_count())
            .finish()
    }
}
