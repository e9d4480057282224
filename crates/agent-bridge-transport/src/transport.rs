//! Duplex text-frame transport abstraction.

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

/// Close code sent when the client hangs up on purpose.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Connect timed out")]
    Timeout,
    #[error("Connection closed")]
    Closed,
}

impl From<TransportError> for agent_bridge_core::BridgeError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Something the transport delivers to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One complete text frame.
    Frame(String),
    /// The peer closed the stream.
    Closed { code: Option<u16>, reason: String },
    /// The stream failed.
    Failed(String),
}

/// Something the owner asks the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// An open duplex stream.
///
/// Reading happens on the transport's own task; frames are handed over
/// through the inbound channel so the owner processes them in order on its
/// own context.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    sender: mpsc::UnboundedSender<Outbound>,
    receiver: mpsc::UnboundedReceiver<Inbound>,
}

impl Connection {
    /// Create a connection from its channel pair.
    #[must_use]
    pub fn new(
        sender: mpsc::UnboundedSender<Outbound>,
        receiver: mpsc::UnboundedReceiver<Inbound>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            receiver,
        }
    }

    /// Identifier used to correlate log lines for this connection.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a text frame.
    ///
    /// # Errors
    /// Returns error if the transport task has ended.
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.sender
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    /// Next inbound item. A closed channel is reported as a failure.
    pub async fn receive(&mut self) -> Inbound {
        self.receiver
            .recv()
            .await
            .unwrap_or_else(|| Inbound::Failed("transport task ended".to_string()))
    }

    /// Ask the transport to close. Safe to call more than once.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.sender.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Opens duplex connections to a bridge endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection to `url`.
    async fn open(&self, url: &Url) -> Result<Connection, TransportError>;
}
