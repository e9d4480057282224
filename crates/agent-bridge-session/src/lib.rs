//! Session client for the agent bridge.
//!
//! Provides:
//! - `BridgeClient` - handle to a serialized session actor
//! - Session state, stream assembler, reconnection controller
//! - Command dispatcher and event router
//! - Store implementations (memory, JSON file)

pub mod assembler;
pub mod client;
pub mod dispatcher;
pub mod reconnect;
pub mod router;
pub mod state;
pub mod storage;

pub use assembler::StreamAssembler;
pub use client::{BridgeClient, BridgeClientBuilder, ConnectRequest};
pub use reconnect::{ReconnectController, ReconnectDecision};
pub use router::{BridgeEvent, EventHandler, EventKind, EventRouter};
pub use state::{SessionSnapshot, SessionState};
