//! The bridge client: a cloneable handle in front of a single actor task.
//!
//! The actor owns the session state, the text buffer, the reconnection
//! controller, the open connection and the event router. Public calls, inbound
//! frames, fired timers, finished transport opens and network changes all
//! arrive on channels and are handled one at a time, in arrival order per
//! source.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use agent_bridge_core::{
    AgentState, AnyValue, BridgeConfig, BridgeError, ConnectionState, DraftStore,
    NetworkMonitor, NetworkStatus, PermissionChoice, PermissionMode, ServerErrorKind, Session,
    SessionIdStore, ToolResult, ToolUse, classify_server_error,
};
use agent_bridge_transport::{
    ClientMessage, Connection, ImageAttachment, Inbound, NORMAL_CLOSURE, ServerMessage,
    StreamMessage, Transport, TransportError, decode_frame,
};
use futures::stream::BoxStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use url::Url;

use crate::{
    assembler::StreamAssembler,
    dispatcher::CommandDispatcher,
    reconnect::{ReconnectController, ReconnectDecision, RetryKind, TimerId},
    router::{BridgeEvent, EventHandler, EventKind, EventRouter},
    state::{SessionSnapshot, SessionState},
};

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Parameters of a `connect()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    pub project_path: String,
    /// Session to resume.
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub helper: bool,
    /// Resume the stored session id for the project when `session_id` is
    /// absent.
    pub resume_saved: bool,
}

impl ConnectRequest {
    #[must_use]
    pub fn new(project_path: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn helper(mut self, helper: bool) -> Self {
        self.helper = helper;
        self
    }

    #[must_use]
    pub fn resume_saved(mut self, resume: bool) -> Self {
        self.resume_saved = resume;
        self
    }
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Connect {
        request: ConnectRequest,
        reply: Reply<Result<(), BridgeError>>,
    },
    Disconnect {
        preserve_session: bool,
        reply: Reply<()>,
    },
    Send {
        message: ClientMessage,
        reply: Reply<Result<(), BridgeError>>,
    },
    ClearText {
        reply: Reply<()>,
    },
    On {
        kind: EventKind,
        handler: EventHandler,
        reply: Reply<()>,
    },
    Off {
        kind: EventKind,
        reply: Reply<bool>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
}

/// Builder for [`BridgeClient`].
pub struct BridgeClientBuilder {
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    session_store: Option<Arc<dyn SessionIdStore>>,
    draft_store: Option<Arc<dyn DraftStore>>,
    network: Arc<dyn NetworkMonitor>,
    event_capacity: usize,
}

impl BridgeClientBuilder {
    /// Persist acknowledged session ids here.
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionIdStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Save interrupted input here.
    #[must_use]
    pub fn draft_store(mut self, store: Arc<dyn DraftStore>) -> Self {
        self.draft_store = Some(store);
        self
    }

    /// Reachability signal. Defaults to always available.
    #[must_use]
    pub fn network(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = network;
        self
    }

    /// Events buffered per stream subscriber before it starts lagging.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Spawn the client task on the current Tokio runtime.
    #[must_use]
    pub fn build(self) -> BridgeClient {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(self.event_capacity);
        let events = router.sender();
        let mut network_rx = self.network.watch();
        network_rx.borrow_and_update();

        let actor = ClientActor {
            reconnect: ReconnectController::new(self.config.reconnect.clone()),
            config: self.config,
            transport: self.transport,
            session_store: self.session_store,
            draft_store: self.draft_store,
            network: self.network,
            network_rx,
            network_live: true,
            state: SessionState::new(),
            assembler: StreamAssembler::new(),
            dispatcher: CommandDispatcher::new(),
            router,
            commands: commands_rx,
            timers_tx,
            timers_rx,
            opened_tx,
            opened_rx,
            open_generation: 0,
            opening: None,
            pending_reply: None,
        };
        tokio::spawn(actor.run());

        BridgeClient {
            commands: commands_tx,
            events,
        }
    }
}

/// Handle to a bridge session. Cheap to clone; the session ends when the
/// last clone is dropped.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<BridgeEvent>,
}

impl BridgeClient {
    /// Start building a client that opens connections through `transport`.
    #[must_use]
    pub fn builder(config: BridgeConfig, transport: Arc<dyn Transport>) -> BridgeClientBuilder {
        BridgeClientBuilder {
            config,
            transport,
            session_store: None,
            draft_store: None,
            network: Arc::new(NetworkStatus::default()),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Open the transport and send the `start` handshake.
    ///
    /// A no-op while already connecting or connected.
    ///
    /// # Errors
    /// Returns `InvalidServerUrl` or `NetworkUnavailable` without opening a
    /// transport, or the transport error if the open failed (automatic
    /// reconnection still takes over in that case).
    pub async fn connect(&self, request: ConnectRequest) -> Result<(), BridgeError> {
        self.request(|reply| Command::Connect { request, reply })
            .await?
    }

    /// Close the transport and cancel any pending reconnection. Idempotent.
    ///
    /// # Errors
    /// Returns `ClientClosed` if the client task has ended.
    pub async fn disconnect(&self, preserve_session: bool) -> Result<(), BridgeError> {
        self.request(|reply| Command::Disconnect {
            preserve_session,
            reply,
        })
        .await
    }

    /// Send user input.
    ///
    /// # Errors
    /// Returns `NotConnected` unless the handshake has been acknowledged.
    pub async fn send_input(
        &self,
        text: impl Into<String>,
        images: Vec<ImageAttachment>,
        thinking_mode: Option<String>,
    ) -> Result<(), BridgeError> {
        self.send(ClientMessage::Input {
            text: text.into(),
            images,
            thinking_mode,
        })
        .await
    }

    /// Answer the pending permission request.
    ///
    /// # Errors
    /// Returns `NotConnected` unless the handshake has been acknowledged.
    pub async fn respond_to_permission(
        &self,
        id: impl Into<String>,
        choice: PermissionChoice,
    ) -> Result<(), BridgeError> {
        self.send(ClientMessage::PermissionResponse {
            id: id.into(),
            choice,
        })
        .await
    }

    /// Answer the pending question request.
    ///
    /// # Errors
    /// Returns `NotConnected` unless the handshake has been acknowledged.
    pub async fn respond_to_question(
        &self,
        id: impl Into<String>,
        answers: BTreeMap<String, AnyValue>,
    ) -> Result<(), BridgeError> {
        self.send(ClientMessage::QuestionResponse {
            id: id.into(),
            answers,
        })
        .await
    }

    /// # Errors
    /// Returns `NotConnected` unless the handshake has been acknowledged.
    pub async fn interrupt(&self) -> Result<(), BridgeError> {
        self.send(ClientMessage::Interrupt).await
    }

    /// # Errors
    /// Returns `NotConnected` unless the handshake has been acknowledged.
    pub async fn set_model(&self, model: impl Into<String>) -> Result<(), BridgeError> {
        self.send(ClientMessage::SetModel {
            model: model.into(),
        })
        .await
    }

    /// # Errors
    /// Returns `NotConnected` unless the handshake has been acknowledged.
    pub async fn set_permission_mode(&self, mode: PermissionMode) -> Result<(), BridgeError> {
        self.send(ClientMessage::SetPermissionMode { mode }).await
    }

    /// # Errors
    /// Returns `NotConnected` unless the handshake has been acknowledged.
    pub async fn cancel_queued(&self) -> Result<(), BridgeError> {
        self.send(ClientMessage::CancelQueued).await
    }

    /// Drop the displayed and committed assistant text.
    ///
    /// # Errors
    /// Returns `ClientClosed` if the client task has ended.
    pub async fn clear_current_text(&self) -> Result<(), BridgeError> {
        self.request(|reply| Command::ClearText { reply }).await
    }

    /// Install the callback for `kind`, replacing any previous one.
    ///
    /// The callback runs on the client task; hand slow work off.
    ///
    /// # Errors
    /// Returns `ClientClosed` if the client task has ended.
    pub async fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&BridgeEvent) + Send + Sync + 'static,
    ) -> Result<(), BridgeError> {
        let handler: EventHandler = Box::new(handler);
        self.request(|reply| Command::On {
            kind,
            handler,
            reply,
        })
        .await
    }

    /// Remove the callback for `kind`. Returns whether one was installed.
    ///
    /// # Errors
    /// Returns `ClientClosed` if the client task has ended.
    pub async fn off(&self, kind: EventKind) -> Result<bool, BridgeError> {
        self.request(|reply| Command::Off { kind, reply }).await
    }

    /// Every routed event from now on, in order.
    ///
    /// A subscriber that falls more than the configured capacity behind skips
    /// the events it missed.
    #[must_use]
    pub fn subscribe(&self) -> BoxStream<'static, BridgeEvent> {
        let stream = BroadcastStream::new(self.events.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event subscriber lagged");
                None
            }
        });
        Box::pin(stream)
    }

    /// Copy of the current session state.
    ///
    /// # Errors
    /// Returns `ClientClosed` if the client task has ended.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, BridgeError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn send(&self, message: ClientMessage) -> Result<(), BridgeError> {
        self.request(|reply| Command::Send { message, reply })
            .await?
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| BridgeError::ClientClosed)?;
        rx.await.map_err(|_| BridgeError::ClientClosed)
    }
}

struct Opened {
    generation: u64,
    result: Result<Connection, TransportError>,
}

enum Step {
    Command(Command),
    Inbound(Inbound),
    Timer(TimerId),
    Opened(Opened),
    Network(bool),
    NetworkGone,
    Shutdown,
}

struct ClientActor {
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    session_store: Option<Arc<dyn SessionIdStore>>,
    draft_store: Option<Arc<dyn DraftStore>>,
    network: Arc<dyn NetworkMonitor>,
    network_rx: watch::Receiver<bool>,
    network_live: bool,
    state: SessionState,
    assembler: StreamAssembler,
    reconnect: ReconnectController,
    dispatcher: CommandDispatcher,
    router: EventRouter,
    commands: mpsc::UnboundedReceiver<Command>,
    timers_tx: mpsc::UnboundedSender<TimerId>,
    timers_rx: mpsc::UnboundedReceiver<TimerId>,
    opened_tx: mpsc::UnboundedSender<Opened>,
    opened_rx: mpsc::UnboundedReceiver<Opened>,
    open_generation: u64,
    /// Generation of the transport open in flight, if any.
    opening: Option<u64>,
    /// Caller of the `connect()` whose open is in flight.
    pending_reply: Option<Reply<Result<(), BridgeError>>>,
}

impl ClientActor {
    async fn run(mut self) {
        tracing::debug!("bridge client started");
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => command.map_or(Step::Shutdown, Step::Command),
                inbound = self.dispatcher.receive() => Step::Inbound(inbound),
                Some(timer) = self.timers_rx.recv() => Step::Timer(timer),
                Some(opened) = self.opened_rx.recv() => Step::Opened(opened),
                changed = self.network_rx.changed(), if self.network_live => match changed {
                    Ok(()) => Step::Network(*self.network_rx.borrow_and_update()),
                    Err(_) => Step::NetworkGone,
                },
            };

            match step {
                Step::Command(command) => self.handle_command(command).await,
                Step::Inbound(inbound) => self.handle_inbound(inbound).await,
                Step::Timer(timer) => self.handle_timer(timer),
                Step::Opened(opened) => self.handle_opened(opened),
                Step::Network(available) => self.handle_network(available),
                Step::NetworkGone => {
                    tracing::debug!("network monitor dropped");
                    self.network_live = false;
                }
                Step::Shutdown => break,
            }
            self.flush();
        }

        self.reconnect.mark_manual_disconnect();
        self.dispatcher.close("client dropped");
        tracing::debug!("bridge client stopped");
    }

    /// Route the events queued by the last step.
    fn flush(&mut self) {
        self.router.dispatch_all(self.state.drain_events());
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { request, reply } => self.handle_connect(request, reply).await,
            Command::Disconnect {
                preserve_session,
                reply,
            } => {
                self.handle_disconnect(preserve_session).await;
                self.flush();
                let _ = reply.send(());
            }
            Command::Send { message, reply } => {
                let result = self.handle_send(message);
                self.flush();
                let _ = reply.send(result);
            }
            Command::ClearText { reply } => {
                self.assembler.clear();
                let _ = reply.send(());
            }
            Command::On {
                kind,
                handler,
                reply,
            } => {
                self.router.on(kind, handler);
                let _ = reply.send(());
            }
            Command::Off { kind, reply } => {
                let _ = reply.send(self.router.off(kind));
            }
            Command::Snapshot { reply } => {
                let snapshot = self.state.snapshot(
                    self.assembler.current(),
                    self.assembler.committed(),
                    self.reconnect.attempt(),
                );
                let _ = reply.send(snapshot);
            }
        }
    }

    async fn handle_connect(
        &mut self,
        request: ConnectRequest,
        reply: Reply<Result<(), BridgeError>>,
    ) {
        // A handshake the server refused outright no longer counts as in flight.
        let handshake_refused = *self.state.connection() == ConnectionState::Connecting
            && self.state.agent() == AgentState::Stopped;
        if !handshake_refused
            && matches!(
                self.state.connection(),
                ConnectionState::Connecting | ConnectionState::Connected { .. }
            )
        {
            tracing::debug!(state = %self.state.connection(), "connect ignored");
            let _ = reply.send(Ok(()));
            return;
        }

        let url = match self.config.endpoint_url() {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "refusing to connect");
                self.fail_connect(reply, e);
                return;
            }
        };
        if !self.network.is_available() {
            self.fail_connect(reply, BridgeError::NetworkUnavailable);
            return;
        }

        let session_id = match request.session_id {
            Some(session_id) => Some(session_id),
            None if request.resume_saved => self.load_session_id(&request.project_path).await,
            None => None,
        };

        tracing::info!(
            project = %request.project_path,
            session_id = session_id.as_deref().unwrap_or("<new>"),
            "connecting"
        );
        self.reconnect.begin_connect();
        self.dispatcher.close("reconnecting");
        self.state.begin_connect(Session {
            session_id,
            project_path: request.project_path,
            model: request.model,
            helper: request.helper,
        });
        self.pending_reply = Some(reply);
        self.open_transport(url);
    }

    fn fail_connect(&mut self, reply: Reply<Result<(), BridgeError>>, error: BridgeError) {
        self.state.error(error.clone());
        self.flush();
        let _ = reply.send(Err(error));
    }

    async fn handle_disconnect(&mut self, preserve_session: bool) {
        tracing::info!(preserve_session, "disconnecting");
        self.reconnect.mark_manual_disconnect();
        self.opening = None;
        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(Err(BridgeError::NotConnected));
        }
        self.dispatcher.close("client disconnect");
        self.assembler.clear();

        let project_path = self.state.project_path().map(str::to_owned);
        let interrupted_input = self.state.disconnected(preserve_session);
        if let Some(project_path) = project_path {
            if let Some(text) = interrupted_input {
                self.save_draft(&project_path, &text).await;
            }
            if !preserve_session {
                self.forget_session_id(&project_path).await;
            }
        }
    }

    fn handle_send(&mut self, message: ClientMessage) -> Result<(), BridgeError> {
        self.dispatcher.send(self.state.connection(), &message)?;
        match message {
            ClientMessage::Input { text, .. } => self.state.input_sent(text),
            ClientMessage::PermissionResponse { choice, .. } => {
                self.state.permission_answered(choice);
            }
            ClientMessage::QuestionResponse { .. } => self.state.question_answered(),
            _ => {}
        }
        Ok(())
    }

    fn open_transport(&mut self, url: Url) {
        self.open_generation += 1;
        let generation = self.open_generation;
        self.opening = Some(generation);

        let transport = Arc::clone(&self.transport);
        let opened_tx = self.opened_tx.clone();
        tokio::spawn(async move {
            let result = transport.open(&url).await;
            let _ = opened_tx.send(Opened { generation, result });
        });
    }

    fn handle_opened(&mut self, opened: Opened) {
        if self.opening != Some(opened.generation) {
            if let Ok(connection) = opened.result {
                connection.close(NORMAL_CLOSURE, "superseded");
            }
            return;
        }
        self.opening = None;

        match opened.result {
            Ok(connection) => {
                self.dispatcher.attach(connection);
                let result = self.send_handshake();
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "failed to send start");
                }
                if let Some(reply) = self.pending_reply.take() {
                    self.flush();
                    let _ = reply.send(result);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transport open failed");
                let reply = self.pending_reply.take();
                self.on_unexpected_failure();
                if let Some(reply) = reply {
                    self.flush();
                    let _ = reply.send(Err(e.into()));
                }
            }
        }
    }

    /// Send `start` for the pending connection with the current session id.
    fn send_handshake(&self) -> Result<(), BridgeError> {
        let session = self.state.session().ok_or(BridgeError::NotConnected)?;
        let start = ClientMessage::start(
            session.project_path.clone(),
            session.session_id.clone(),
            session.model.clone(),
            session.helper,
        );
        self.dispatcher.send_start(self.state.connection(), &start)
    }

    async fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Frame(text) => self.handle_frame(&text).await,
            Inbound::Closed { code, reason } => {
                tracing::info!(?code, %reason, "transport closed by peer");
                self.on_unexpected_failure();
            }
            Inbound::Failed(error) => {
                tracing::warn!(%error, "transport failed");
                self.on_unexpected_failure();
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        let message = match decode_frame(text) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed frame");
                return;
            }
        };

        match message {
            ServerMessage::Connected {
                agent_id,
                session_id,
                model,
                version,
                protocol_version,
            } => {
                tracing::info!(%agent_id, %session_id, "session connected");
                self.reconnect.on_connected();
                self.state.connected(
                    agent_id,
                    session_id.clone(),
                    model,
                    version,
                    protocol_version,
                );
                if let Some(project_path) = self.state.project_path().map(str::to_owned) {
                    self.save_session_id(&session_id, &project_path).await;
                }
            }
            ServerMessage::Stream { message, .. } => self.handle_stream(message),
            ServerMessage::Error {
                code,
                message,
                recoverable,
                retryable,
                retry_after,
            } => {
                self.handle_server_error(code, message, recoverable, retryable, retry_after)
                    .await;
            }
            ServerMessage::Stopped { reason } => {
                self.assembler.commit();
                self.state.turn_ended(reason, false);
            }
            ServerMessage::Interrupted => {
                self.assembler.commit();
                self.state.turn_ended(None, true);
            }
            ServerMessage::SessionEvent {
                action,
                session_id,
                session,
            } => self.state.emit(BridgeEvent::SessionEvent {
                action,
                session_id,
                session,
            }),
            ServerMessage::History {
                messages,
                has_more,
                cursor,
            } => self.state.emit(BridgeEvent::History {
                messages,
                has_more,
                cursor,
            }),
            ServerMessage::ModelChanged {
                model,
                previous_model,
            } => self.state.model_changed(model, previous_model),
            ServerMessage::Unknown => {}
        }
    }

    fn handle_stream(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Assistant { content, .. } => {
                if self.assembler.append_or_set(&content) {
                    self.state.emit(BridgeEvent::Text(content));
                }
            }
            StreamMessage::Thinking { content } => self.state.emit(BridgeEvent::Thinking(content)),
            StreamMessage::ToolUse { id, name, input } => {
                self.state.tool_use(ToolUse { id, name, input });
            }
            StreamMessage::ToolResult {
                id,
                tool,
                output,
                success,
                is_error,
            } => self.state.tool_result(ToolResult {
                id,
                tool,
                output: output.to_display_string(),
                success,
                is_error: is_error.unwrap_or(!success),
            }),
            StreamMessage::Progress(progress) => self.state.progress(progress),
            StreamMessage::Usage(usage) => self.state.usage(usage),
            StreamMessage::State { state, .. } => self.state.server_state(&state),
            StreamMessage::Permission(request) => self.state.permission(request),
            StreamMessage::Question(request) => self.state.question(request),
            StreamMessage::SubagentStart {
                id,
                description,
                agent_type,
            } => self.state.emit(BridgeEvent::SubagentStarted {
                id,
                description,
                agent_type,
            }),
            StreamMessage::SubagentComplete { id, summary } => {
                self.state.emit(BridgeEvent::SubagentCompleted { id, summary });
            }
            StreamMessage::Unknown => {}
        }
    }

    async fn handle_server_error(
        &mut self,
        code: String,
        message: String,
        recoverable: bool,
        retryable: Option<bool>,
        retry_after: Option<f64>,
    ) {
        let project_path = self.state.project_path().map(str::to_owned);
        match classify_server_error(&code, retryable, retry_after) {
            ServerErrorKind::SessionInvalid => {
                tracing::warn!(%code, %message, "session rejected");
                let rejected_resume = self.state.session_id().is_some();
                self.state.session_invalid();
                if let Some(project_path) = project_path {
                    self.forget_session_id(&project_path).await;
                }
                if rejected_resume && *self.state.connection() == ConnectionState::Connecting {
                    tracing::info!("retrying handshake as a new session");
                    if let Err(e) = self.send_handshake() {
                        tracing::warn!(error = %e, "handshake retry failed");
                    }
                }
            }
            ServerErrorKind::RateLimited(retry_after) => {
                tracing::warn!(%code, ?retry_after, "rate limited, retrying handshake");
                self.state.error(BridgeError::RateLimited { retry_after });
                let timer = self.reconnect.arm_handshake_retry();
                self.schedule(timer, retry_after);
            }
            ServerErrorKind::Other => {
                tracing::warn!(%code, %message, recoverable, "server error");
                let interrupted_input = self.state.server_error(code, message, recoverable);
                if let (Some(project_path), Some(text)) = (project_path, interrupted_input) {
                    self.save_draft(&project_path, &text).await;
                }
            }
        }
    }

    fn on_unexpected_failure(&mut self) {
        self.dispatcher.discard();
        self.state.transport_lost();
        let decision = self
            .reconnect
            .on_unexpected_disconnect(self.network.is_available());
        self.apply(decision);
    }

    fn apply(&mut self, decision: ReconnectDecision) {
        match decision {
            ReconnectDecision::Ignore => {}
            ReconnectDecision::WaitForNetwork => {
                tracing::info!("network unavailable, waiting before reconnecting");
                self.state.network_unavailable();
            }
            ReconnectDecision::GiveUp { attempts } => {
                tracing::warn!(attempts, "giving up on reconnection");
                self.state.gave_up(attempts);
            }
            ReconnectDecision::Retry {
                attempt,
                delay,
                timer,
            } => {
                tracing::info!(attempt, ?delay, "scheduling reconnect");
                self.state.reconnecting(attempt);
                self.schedule(timer, delay);
            }
        }
    }

    fn schedule(&self, timer: TimerId, delay: Duration) {
        let timers_tx = self.timers_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timers_tx.send(timer);
        });
    }

    fn handle_timer(&mut self, timer: TimerId) {
        match self.reconnect.take_fired(timer) {
            None => tracing::trace!(timer, "ignoring disarmed timer"),
            Some(RetryKind::Reconnect) => match self.config.endpoint_url() {
                Ok(url) => {
                    tracing::info!(attempt = self.reconnect.attempt(), "reconnecting");
                    self.dispatcher.close("reconnecting");
                    self.open_transport(url);
                }
                Err(e) => self.state.error(e),
            },
            Some(RetryKind::Handshake) => {
                if let Err(e) = self.send_handshake() {
                    tracing::warn!(error = %e, "handshake retry failed");
                }
            }
        }
    }

    fn handle_network(&mut self, available: bool) {
        tracing::debug!(available, "network changed");
        if !available {
            return;
        }
        if let Some(decision) = self.reconnect.on_network_restored() {
            self.apply(decision);
        }
    }

    async fn load_session_id(&self, project_path: &str) -> Option<String> {
        let store = self.session_store.as_ref()?;
        match store.load(project_path).await {
            Ok(session_id) => session_id,
            Err(e) => {
                tracing::warn!(error = %e, project = project_path, "failed to load session id");
                None
            }
        }
    }

    async fn save_session_id(&self, session_id: &str, project_path: &str) {
        if let Some(store) = &self.session_store {
            if let Err(e) = store.save(session_id, project_path).await {
                tracing::warn!(error = %e, project = project_path, "failed to save session id");
            }
        }
    }

    async fn forget_session_id(&self, project_path: &str) {
        if let Some(store) = &self.session_store {
            if let Err(e) = store.clear(project_path).await {
                tracing::warn!(error = %e, project = project_path, "failed to clear session id");
            }
        }
    }

    async fn save_draft(&self, project_path: &str, text: &str) {
        if let Some(store) = &self.draft_store {
            match store.save_draft(project_path, text).await {
                Ok(()) => tracing::debug!(project = project_path, "saved draft"),
                Err(e) => {
                    tracing::warn!(error = %e, project = project_path, "failed to save draft");
                }
            }
        }
    }
}
