//! Wire protocol and transports for the agent bridge client.
//!
//! Provides:
//! - Wire protocol codec (JSON envelopes, tolerant decoding)
//! - `Transport` abstraction over a duplex text-frame stream
//! - WebSocket transport (feature: websocket)
//! - In-memory mock transport (feature: mock)

pub mod protocol;
pub mod transport;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use protocol::{
    ClientMessage, ImageAttachment, ProtocolError, ServerMessage, StreamMessage, decode_frame,
};
pub use transport::{Connection, Inbound, NORMAL_CLOSURE, Outbound, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockPeer, MockTransport};
