//! WebSocket transport for the bridge endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, time};
use tokio_tungstenite::tungstenite::{
    Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
use url::Url;

use crate::transport::{Connection, Inbound, Outbound, Transport, TransportError};

/// WebSocket transport built on `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
    ping_interval: Option<Duration>,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub const fn new(connect_timeout: Duration, ping_interval: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            ping_interval,
        }
    }

    /// Create a transport tuned by a client configuration.
    #[must_use]
    pub const fn from_config(config: &agent_bridge_core::BridgeConfig) -> Self {
        Self::new(config.connect_timeout(), config.ping_interval())
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<Connection, TransportError> {
        tracing::debug!(url = %url, "opening WebSocket");

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (stream, _) = match time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            Err(_) => return Err(TransportError::Timeout),
        };

        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();
        let connection = Connection::new(out_tx, in_rx);
        let connection_id = connection.id();

        // Forward outbound frames and keepalive pings to the socket.
        let ping_interval = self.ping_interval;
        let write_in_tx = in_tx.clone();
        tokio::spawn(async move {
            let mut ping = ping_interval.map(time::interval);
            if let Some(interval) = ping.as_mut() {
                interval.tick().await; // skip first immediate tick
            }
            loop {
                let op = tokio::select! {
                    msg = out_rx.recv() => msg.map_or(WriteOp::Hangup, WriteOp::Send),
                    () = tick(ping.as_mut()) => WriteOp::Ping,
                };
                let result = match op {
                    WriteOp::Send(Outbound::Text(text)) => {
                        write.send(Message::Text(text.into())).await
                    }
                    WriteOp::Send(Outbound::Close { code, reason }) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    WriteOp::Ping => write.send(Message::Ping(Vec::new().into())).await,
                    WriteOp::Hangup => {
                        let _ = write.close().await;
                        break;
                    }
                };
                if let Err(e) = result {
                    tracing::warn!(%connection_id, error = %e, "WebSocket write failed");
                    let _ = write_in_tx.send(Inbound::Failed(e.to_string()));
                    break;
                }
            }
        });

        // Deliver whole text frames to the owner.
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let inbound = match msg {
                    Ok(Message::Text(text)) => Inbound::Frame(text.as_str().to_owned()),
                    Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => Inbound::Frame(text),
                        Err(_) => {
                            tracing::debug!(%connection_id, "dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame.map_or((None, String::new()), |f| {
                            (Some(u16::from(f.code)), f.reason.as_str().to_owned())
                        });
                        let _ = in_tx.send(Inbound::Closed { code, reason });
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(%connection_id, error = %e, "WebSocket read failed");
                        let _ = in_tx.send(Inbound::Failed(e.to_string()));
                        return;
                    }
                };
                if in_tx.send(inbound).is_err() {
                    return;
                }
            }
            let _ = in_tx.send(Inbound::Closed {
                code: None,
                reason: "stream ended".to_string(),
            });
        });

        tracing::info!(%connection_id, url = %url, "WebSocket connected");
        Ok(connection)
    }
}

enum WriteOp {
    Send(Outbound),
    Ping,
    Hangup,
}

async fn tick(interval: Option<&mut time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
