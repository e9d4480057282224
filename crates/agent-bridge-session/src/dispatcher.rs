//! Outgoing command gate.
//!
//! Owns the open [`Connection`] and refuses to write unless the connection
//! state allows the command.

use agent_bridge_core::{BridgeError, ConnectionState};
use agent_bridge_transport::{ClientMessage, Connection, Inbound, NORMAL_CLOSURE};

#[derive(Debug, Default)]
pub struct CommandDispatcher {
    connection: Option<Connection>,
}

impl CommandDispatcher {
    #[must_use]
    pub const fn new() -> Self {
        Self { connection: None }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Adopt a freshly opened connection. Any previous one is closed.
    pub fn attach(&mut self, connection: Connection) {
        tracing::debug!(connection_id = %connection.id(), "transport attached");
        if let Some(old) = self.connection.replace(connection) {
            old.close(NORMAL_CLOSURE, "replaced");
        }
    }

    /// Close the connection on purpose.
    pub fn close(&mut self, reason: &str) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!(connection_id = %connection.id(), reason, "closing transport");
            connection.close(NORMAL_CLOSURE, reason);
        }
    }

    /// Forget a connection that already failed.
    pub fn discard(&mut self) {
        self.connection = None;
    }

    /// Next inbound item, or never if nothing is open.
    pub async fn receive(&mut self) -> Inbound {
        match self.connection.as_mut() {
            Some(connection) => connection.receive().await,
            None => std::future::pending().await,
        }
    }

    /// Send the `start` handshake.
    ///
    /// # Errors
    /// Returns `NotConnected` if no transport is open or the client is
    /// disconnected.
    pub fn send_start(
        &self,
        state: &ConnectionState,
        message: &ClientMessage,
    ) -> Result<(), BridgeError> {
        if matches!(state, ConnectionState::Disconnected) {
            return Err(BridgeError::NotConnected);
        }
        self.write(message)
    }

    /// Send any other command.
    ///
    /// # Errors
    /// Returns `NotConnected` unless the handshake has been acknowledged.
    pub fn send(
        &self,
        state: &ConnectionState,
        message: &ClientMessage,
    ) -> Result<(), BridgeError> {
        if !state.is_connected() {
            tracing::debug!(kind = message.kind(), state = %state, "refusing command");
            return Err(BridgeError::NotConnected);
        }
        self.write(message)
    }

    fn write(&self, message: &ClientMessage) -> Result<(), BridgeError> {
        let connection = self.connection.as_ref().ok_or(BridgeError::NotConnected)?;
        let frame = message
            .to_frame()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        tracing::debug!(connection_id = %connection.id(), kind = message.kind(), "sending command");
        connection.send(frame).map_err(BridgeError::from)
    }
}
