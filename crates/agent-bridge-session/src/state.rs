//! Authoritative session record.
//!
//! [`SessionState`] is mutated only through its transition methods. Each
//! transition updates the record and queues the events it produced; the
//! client drains the queue into the router after every step, so events leave
//! in the same order the transitions happened.

use agent_bridge_core::{
    AgentState, BridgeError, ConnectionState, PendingPermissionRequest, PendingQuestionRequest,
    PermissionChoice, Session, TokenUsage, ToolProgress, ToolResult, ToolUse,
};

use crate::router::BridgeEvent;

/// Point-in-time copy of everything the client tracks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub agent: AgentState,
    /// The pending connection, with the current session id.
    pub session: Option<Session>,
    pub pending_permission: Option<PendingPermissionRequest>,
    pub pending_question: Option<PendingQuestionRequest>,
    pub tool_progress: Option<ToolProgress>,
    pub token_usage: Option<TokenUsage>,
    pub model: Option<String>,
    pub current_text: String,
    pub committed_text: String,
    pub reconnect_attempt: u32,
}

impl SessionSnapshot {
    /// Current session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref()?.session_id.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    connection: ConnectionState,
    agent: AgentState,
    session: Option<Session>,
    pending_permission: Option<PendingPermissionRequest>,
    pending_question: Option<PendingQuestionRequest>,
    tool_progress: Option<ToolProgress>,
    token_usage: Option<TokenUsage>,
    model: Option<String>,
    last_input: Option<String>,
    events: Vec<BridgeEvent>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    #[must_use]
    pub const fn agent(&self) -> AgentState {
        self.agent
    }

    /// The pending connection.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref()?.session_id.as_deref()
    }

    #[must_use]
    pub fn project_path(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.project_path.as_str())
    }

    #[must_use]
    pub const fn pending_permission(&self) -> Option<&PendingPermissionRequest> {
        self.pending_permission.as_ref()
    }

    #[must_use]
    pub const fn pending_question(&self) -> Option<&PendingQuestionRequest> {
        self.pending_question.as_ref()
    }

    #[must_use]
    pub const fn tool_progress(&self) -> Option<&ToolProgress> {
        self.tool_progress.as_ref()
    }

    /// Text of the input that started the current turn.
    #[must_use]
    pub fn last_input(&self) -> Option<&str> {
        self.last_input.as_deref()
    }

    /// Take the events queued by transitions since the last drain.
    pub fn drain_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Queue an event that carries no state change of its own.
    pub fn emit(&mut self, event: BridgeEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn snapshot(
        &self,
        current_text: &str,
        committed_text: &str,
        attempt: u32,
    ) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection.clone(),
            agent: self.agent,
            session: self.session.clone(),
            pending_permission: self.pending_permission.clone(),
            pending_question: self.pending_question.clone(),
            tool_progress: self.tool_progress.clone(),
            token_usage: self.token_usage.clone(),
            model: self.model.clone(),
            current_text: current_text.to_owned(),
            committed_text: committed_text.to_owned(),
            reconnect_attempt: attempt,
        }
    }

    fn set_connection(&mut self, connection: ConnectionState) {
        if self.connection != connection {
            tracing::debug!(from = %self.connection, to = %connection, "connection state");
            self.connection = connection.clone();
            self.events.push(BridgeEvent::ConnectionStateChanged(connection));
        }
    }

    fn set_agent(&mut self, agent: AgentState) {
        if self.agent != agent {
            tracing::debug!(from = ?self.agent, to = ?agent, "agent state");
            self.agent = agent;
            self.events.push(BridgeEvent::AgentStateChanged(agent));
        }
    }

    fn clear_requests(&mut self) {
        self.pending_permission = None;
        self.pending_question = None;
        self.tool_progress = None;
    }

    /// A fresh `connect()` is opening a transport for `session`.
    pub fn begin_connect(&mut self, session: Session) {
        self.session = Some(session);
        self.clear_requests();
        self.last_input = None;
        self.set_connection(ConnectionState::Connecting);
        self.set_agent(AgentState::Starting);
    }

    /// The server acknowledged the handshake.
    pub fn connected(
        &mut self,
        agent_id: String,
        session_id: String,
        model: Option<String>,
        version: Option<String>,
        protocol_version: Option<String>,
    ) {
        if let Some(session) = self.session.as_mut() {
            session.session_id = Some(session_id.clone());
        }
        if model.is_some() {
            self.model.clone_from(&model);
        }
        self.set_connection(ConnectionState::Connected {
            agent_id: agent_id.clone(),
        });
        self.set_agent(AgentState::Idle);
        self.events.push(BridgeEvent::SessionConnected {
            agent_id,
            session_id,
            model,
            version,
            protocol_version,
        });
    }

    /// Input was handed to the transport.
    pub fn input_sent(&mut self, text: String) {
        self.last_input = Some(text);
        if !self.agent.is_busy() {
            self.set_agent(AgentState::Thinking);
        }
    }

    pub fn tool_use(&mut self, tool: ToolUse) {
        self.tool_progress = None;
        self.set_agent(AgentState::Executing);
        self.events.push(BridgeEvent::ToolStart(tool));
    }

    pub fn tool_result(&mut self, result: ToolResult) {
        self.tool_progress = None;
        self.set_agent(AgentState::Thinking);
        self.events.push(BridgeEvent::ToolResult(result));
    }

    pub fn progress(&mut self, progress: ToolProgress) {
        self.tool_progress = Some(progress.clone());
        self.events.push(BridgeEvent::Progress(progress));
    }

    /// Replace the usage snapshot wholesale.
    pub fn usage(&mut self, usage: TokenUsage) {
        self.token_usage = Some(usage.clone());
        self.events.push(BridgeEvent::Usage(usage));
    }

    /// Apply a server-reported agent state. Unknown names are ignored.
    pub fn server_state(&mut self, name: &str) {
        match AgentState::from_wire(name) {
            Some(state) => self.set_agent(state),
            None => tracing::debug!(state = name, "ignoring unknown agent state"),
        }
    }

    pub fn permission(&mut self, request: PendingPermissionRequest) {
        self.tool_progress = None;
        self.pending_permission = Some(request.clone());
        self.set_agent(AgentState::WaitingPermission);
        self.events.push(BridgeEvent::PermissionRequested(request));
    }

    pub fn question(&mut self, request: PendingQuestionRequest) {
        self.tool_progress = None;
        self.pending_question = Some(request.clone());
        self.set_agent(AgentState::WaitingInput);
        self.events.push(BridgeEvent::QuestionAsked(request));
    }

    pub fn permission_answered(&mut self, choice: PermissionChoice) {
        self.pending_permission = None;
        match choice {
            PermissionChoice::Allow | PermissionChoice::Always => {
                self.set_agent(AgentState::Executing);
            }
            PermissionChoice::Deny => self.set_agent(AgentState::Thinking),
        }
    }

    pub fn question_answered(&mut self) {
        self.pending_question = None;
        self.set_agent(AgentState::Thinking);
    }

    /// `stopped` or `interrupted`.
    pub fn turn_ended(&mut self, reason: Option<String>, interrupted: bool) {
        self.clear_requests();
        self.last_input = None;
        self.set_agent(AgentState::Idle);
        self.events.push(BridgeEvent::Stopped {
            reason,
            interrupted,
        });
    }

    pub fn model_changed(&mut self, model: String, previous_model: Option<String>) {
        self.model = Some(model.clone());
        self.events.push(BridgeEvent::ModelChanged {
            model,
            previous_model,
        });
    }

    /// The server rejected the session id. Connectivity is left alone.
    pub fn session_invalid(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.session_id = None;
        }
        self.clear_requests();
        self.set_agent(AgentState::Stopped);
        self.events.push(BridgeEvent::Error(BridgeError::SessionInvalid));
    }

    /// A server error that is neither session-invalid nor a rate limit.
    ///
    /// Returns the input that was in flight if the error ended a busy turn.
    pub fn server_error(
        &mut self,
        code: String,
        message: String,
        recoverable: bool,
    ) -> Option<String> {
        let interrupted_input = if self.agent.is_busy() {
            self.tool_progress = None;
            self.set_agent(AgentState::Idle);
            self.last_input.take()
        } else {
            None
        };
        self.events.push(BridgeEvent::Error(BridgeError::ServerError {
            code,
            message,
            recoverable,
        }));
        interrupted_input
    }

    /// Requests tied to a connection that just died.
    pub fn transport_lost(&mut self) {
        self.clear_requests();
    }

    pub fn reconnecting(&mut self, attempt: u32) {
        self.set_connection(ConnectionState::Reconnecting { attempt });
        self.set_agent(AgentState::Recovering);
    }

    /// No network path; stay disconnected until it returns.
    pub fn network_unavailable(&mut self) {
        self.set_connection(ConnectionState::Disconnected);
        self.events.push(BridgeEvent::Error(BridgeError::NetworkUnavailable));
    }

    /// The retry budget is spent.
    pub fn gave_up(&mut self, attempts: u32) {
        self.set_connection(ConnectionState::Disconnected);
        self.set_agent(AgentState::Stopped);
        self.events
            .push(BridgeEvent::Error(BridgeError::ReconnectFailed { attempts }));
    }

    /// `disconnect()`.
    ///
    /// Returns the input that was in flight if a turn was interrupted.
    pub fn disconnected(&mut self, preserve_session: bool) -> Option<String> {
        let interrupted_input = if self.agent.is_busy() {
            self.last_input.take()
        } else {
            self.last_input = None;
            None
        };
        if !preserve_session {
            if let Some(session) = self.session.as_mut() {
                session.session_id = None;
            }
        }
        self.clear_requests();
        self.set_connection(ConnectionState::Disconnected);
        self.set_agent(AgentState::Idle);
        interrupted_input
    }

    /// Surface an error that has no state change of its own.
    pub fn error(&mut self, error: BridgeError) {
        self.events.push(BridgeEvent::Error(error));
    }
}
