//! Scriptable in-memory transport for tests.
//!
//! Every successful `open` produces a [`MockPeer`]: the server side of the
//! connection, able to inject frames, read what the client sent, and drop the
//! link.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::transport::{Connection, Inbound, Outbound, Transport, TransportError};

/// Server side of a mock connection.
#[derive(Debug)]
pub struct MockPeer {
    pub url: Url,
    outgoing: mpsc::UnboundedReceiver<Outbound>,
    incoming: mpsc::UnboundedSender<Inbound>,
}

impl MockPeer {
    /// Deliver a text frame to the client.
    pub fn inject(&self, frame: impl Into<String>) {
        let _ = self.incoming.send(Inbound::Frame(frame.into()));
    }

    /// Deliver a JSON value as a text frame.
    pub fn inject_json(&self, value: &serde_json::Value) {
        self.inject(value.to_string());
    }

    /// Simulate the server closing the stream.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.incoming.send(Inbound::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Simulate a network failure.
    pub fn fail(&self, error: &str) {
        let _ = self.incoming.send(Inbound::Failed(error.to_string()));
    }

    /// Next text frame the client sent, skipping close requests.
    pub async fn next_sent(&mut self) -> Option<String> {
        loop {
            match self.outgoing.recv().await? {
                Outbound::Text(text) => return Some(text),
                Outbound::Close { .. } => {}
            }
        }
    }

    /// Next text frame the client sent, parsed as JSON.
    pub async fn next_sent_json(&mut self) -> Option<serde_json::Value> {
        let text = self.next_sent().await?;
        serde_json::from_str(&text).ok()
    }

    /// Everything the client has queued so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<Outbound> {
        let mut sent = Vec::new();
        while let Ok(item) = self.outgoing.try_recv() {
            sent.push(item);
        }
        sent
    }

    /// Whether the client asked to close this connection.
    pub fn was_closed_by_client(&mut self) -> bool {
        self.drain_sent()
            .iter()
            .any(|item| matches!(item, Outbound::Close { .. }))
    }
}

#[derive(Debug, Default)]
struct Script {
    failures_remaining: usize,
}

/// In-memory [`Transport`].
#[derive(Debug, Clone)]
pub struct MockTransport {
    opens: Arc<AtomicUsize>,
    script: Arc<Mutex<Script>>,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(Mutex::new(Script::default())),
            peers_tx,
            peers_rx: Arc::new(tokio::sync::Mutex::new(peers_rx)),
        }
    }

    /// Make the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        if let Ok(mut script) = self.script.lock() {
            script.failures_remaining = count;
        }
    }

    /// Number of `open` calls so far, failed ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Wait for the next successfully opened connection.
    pub async fn accept(&self) -> Option<MockPeer> {
        self.peers_rx.lock().await.recv().await
    }

    /// The next opened connection if one is already waiting.
    pub fn try_accept(&self) -> Option<MockPeer> {
        self.peers_rx.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &Url) -> Result<Connection, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let should_fail = self.script.lock().is_ok_and(|mut script| {
            if script.failures_remaining > 0 {
                script.failures_remaining -= 1;
                true
            } else {
                false
            }
        });
        if should_fail {
            return Err(TransportError::Connect("scripted failure".to_string()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let peer = MockPeer {
            url: url.clone(),
            outgoing: out_rx,
            incoming: in_tx,
        };
        self.peers_tx
            .send(peer)
            .map_err(|_| TransportError::Connect("mock transport dropped".to_string()))?;
        Ok(Connection::new(out_tx, in_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_produces_peer() {
        let transport = MockTransport::new();
        let url = Url::parse("ws://localhost/ws").unwrap();

        let mut conn = transport.open(&url).await.unwrap();
        let mut peer = transport.accept().await.unwrap();
        assert_eq!(peer.url, url);

        conn.send("ping".to_string()).unwrap();
        assert_eq!(peer.next_sent().await.as_deref(), Some("ping"));

        peer.inject("pong");
        assert_eq!(conn.receive().await, Inbound::Frame("pong".to_string()));

        conn.close(1000, "done");
        assert!(peer.was_closed_by_client());
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let transport = MockTransport::new();
        let url = Url::parse("ws://localhost/ws").unwrap();
        transport.fail_next_opens(2);

        assert!(transport.open(&url).await.is_err());
        assert!(transport.open(&url).await.is_err());
        assert!(transport.open(&url).await.is_ok());
        assert_eq!(transport.open_count(), 3);
        assert!(transport.try_accept().is_some());
        assert!(transport.try_accept().is_none());
    }
}
