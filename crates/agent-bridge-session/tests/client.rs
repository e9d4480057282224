//! End-to-end client scenarios against the mock transport.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use agent_bridge_core::{
    AgentState, BridgeConfig, BridgeError, ConnectionState, DraftStore, MAX_RETRY_AFTER,
    NetworkStatus, PermissionChoice, SessionIdStore,
};
use agent_bridge_session::{
    BridgeClient, BridgeEvent, ConnectRequest, EventKind,
    storage::{MemoryDraftStore, MemorySessionStore},
};
use agent_bridge_transport::{MockPeer, MockTransport};
use futures::{StreamExt, stream::BoxStream};
use serde_json::{Value, json};
use tokio::time::{Instant, sleep, timeout};

struct Harness {
    client: BridgeClient,
    transport: MockTransport,
    events: BoxStream<'static, BridgeEvent>,
    sessions: Arc<MemorySessionStore>,
    drafts: Arc<MemoryDraftStore>,
    network: NetworkStatus,
}

fn harness() -> Harness {
    harness_with(BridgeConfig::default())
}

fn harness_with(config: BridgeConfig) -> Harness {
    let transport = MockTransport::new();
    let sessions = Arc::new(MemorySessionStore::new());
    let drafts = Arc::new(MemoryDraftStore::new());
    let network = NetworkStatus::new(true);

    let client = BridgeClient::builder(config, Arc::new(transport.clone()))
        .session_store(sessions.clone())
        .draft_store(drafts.clone())
        .network(Arc::new(network.clone()))
        .build();
    let events = client.subscribe();

    Harness {
        client,
        transport,
        events,
        sessions,
        drafts,
        network,
    }
}

async fn wait_for(
    events: &mut BoxStream<'static, BridgeEvent>,
    predicate: impl Fn(&BridgeEvent) -> bool,
) -> BridgeEvent {
    timeout(Duration::from_secs(600), async {
        loop {
            let event = events.next().await.expect("event stream ended");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn stream(message: Value) -> Value {
    json!({
        "type": "stream",
        "id": "m1",
        "timestamp": "2026-01-01T00:00:00Z",
        "message": message,
    })
}

fn connected_frame(session_id: &str) -> Value {
    json!({
        "type": "connected",
        "agentId": "a1",
        "sessionId": session_id,
        "model": "opus",
        "version": "1.4.0",
        "protocolVersion": "2",
    })
}

/// Connect to `/proj` and acknowledge the handshake with session `s1`.
async fn connect_and_ack(h: &mut Harness) -> MockPeer {
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    let start = peer.next_sent_json().await.unwrap();
    assert_eq!(start["type"], "start");

    peer.inject_json(&connected_frame("s1"));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::SessionConnected { .. })
    })
    .await;
    peer
}

fn is_stopped(event: &BridgeEvent) -> bool {
    matches!(event, BridgeEvent::Stopped { .. })
}

#[tokio::test(start_paused = true)]
async fn test_connect_then_connected_ack() {
    let mut h = harness();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();

    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.connection, ConnectionState::Connecting);
    assert_eq!(snapshot.agent, AgentState::Starting);

    let mut peer = h.transport.accept().await.unwrap();
    assert_eq!(peer.url.as_str(), "ws://localhost:8080/ws");
    assert_eq!(
        peer.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/proj"})
    );

    peer.inject_json(&json!({"type": "connected", "agentId": "a1", "sessionId": "s1"}));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::SessionConnected { .. })
    })
    .await;

    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(
        snapshot.connection,
        ConnectionState::Connected {
            agent_id: "a1".to_string()
        }
    );
    assert_eq!(snapshot.session_id(), Some("s1"));
    assert_eq!(snapshot.reconnect_attempt, 0);
    assert_eq!(h.sessions.load("/proj").await.unwrap().as_deref(), Some("s1"));
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_does_not_open_again() {
    let mut h = harness();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();

    let mut peer = h.transport.accept().await.unwrap();
    assert_eq!(peer.next_sent_json().await.unwrap()["type"], "start");
    assert!(peer.drain_sent().is_empty());
    assert_eq!(h.transport.open_count(), 1);

    peer.inject_json(&connected_frame("s1"));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::SessionConnected { .. })
    })
    .await;
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    assert!(peer.drain_sent().is_empty());
    assert_eq!(h.transport.open_count(), 1);
    assert!(h.transport.try_accept().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_full_turn_agent_state_sequence() {
    let mut h = harness();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    peer.next_sent().await.unwrap();
    peer.inject_json(&connected_frame("s1"));

    let mut states = Vec::new();
    loop {
        let event = wait_for(&mut h.events, |_| true).await;
        match event {
            BridgeEvent::AgentStateChanged(state) => states.push(state),
            BridgeEvent::SessionConnected { .. } => break,
            _ => {}
        }
    }

    h.client
        .send_input("list files", Vec::new(), None)
        .await
        .unwrap();
    assert_eq!(
        peer.next_sent_json().await.unwrap(),
        json!({"type": "input", "text": "list files"})
    );

    peer.inject_json(&stream(json!({
        "type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "ls"}
    })));
    peer.inject_json(&stream(json!({
        "type": "tool_result", "id": "t1", "tool": "Bash",
        "output": {"stdout": "a.txt\nb.txt"}, "success": true
    })));
    peer.inject_json(&stream(json!({"type": "assistant", "content": "Two files."})));
    peer.inject_json(&json!({"type": "stopped", "reason": "end_turn"}));

    loop {
        let event = wait_for(&mut h.events, |_| true).await;
        match event {
            BridgeEvent::AgentStateChanged(state) => states.push(state),
            BridgeEvent::ToolResult(result) => assert_eq!(result.output, "a.txt\nb.txt"),
            event if is_stopped(&event) => break,
            _ => {}
        }
    }

    assert_eq!(
        states,
        vec![
            AgentState::Starting,
            AgentState::Idle,
            AgentState::Thinking,
            AgentState::Executing,
            AgentState::Thinking,
            AgentState::Idle,
        ]
    );

    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.current_text, "");
    assert_eq!(snapshot.committed_text, "Two files.");
}

#[tokio::test(start_paused = true)]
async fn test_commands_require_connected() {
    let h = harness();
    assert_eq!(
        h.client.send_input("early", Vec::new(), None).await,
        Err(BridgeError::NotConnected)
    );

    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    assert_eq!(h.client.interrupt().await, Err(BridgeError::NotConnected));
    assert_eq!(
        h.client.respond_to_permission("p1", PermissionChoice::Allow).await,
        Err(BridgeError::NotConnected)
    );

    assert_eq!(peer.next_sent_json().await.unwrap()["type"], "start");
    assert!(peer.drain_sent().is_empty());
    assert_eq!(
        h.client.snapshot().await.unwrap().agent,
        AgentState::Starting
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_url_never_opens() {
    let mut h = harness_with(BridgeConfig::new("ftp://example.com"));

    let result = h.client.connect(ConnectRequest::new("/proj")).await;
    assert!(matches!(result, Err(BridgeError::InvalidServerUrl(_))));
    assert!(matches!(
        wait_for(&mut h.events, |e| matches!(e, BridgeEvent::Error(_))).await,
        BridgeEvent::Error(BridgeError::InvalidServerUrl(_))
    ));
    assert_eq!(h.transport.open_count(), 0);
    assert_eq!(
        h.client.snapshot().await.unwrap().connection,
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn test_connect_without_network_fails_fast() {
    let h = harness();
    h.network.set_available(false);

    assert_eq!(
        h.client.connect(ConnectRequest::new("/proj")).await,
        Err(BridgeError::NetworkUnavailable)
    );
    assert_eq!(h.transport.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let mut h = harness();
    let mut peer = connect_and_ack(&mut h).await;

    h.client.send_input("go", Vec::new(), None).await.unwrap();
    peer.inject_json(&stream(json!({"type": "assistant", "content": "Working"})));
    peer.inject_json(&stream(json!({
        "type": "permission", "id": "p1", "tool": "Write",
        "input": {"path": "/tmp/x"}, "options": ["allow", "deny"]
    })));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::PermissionRequested(_))
    })
    .await;

    for _ in 0..3 {
        h.client.disconnect(false).await.unwrap();
        let snapshot = h.client.snapshot().await.unwrap();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert_eq!(snapshot.agent, AgentState::Idle);
        assert_eq!(snapshot.session_id(), None);
        assert!(snapshot.pending_permission.is_none());
        assert!(snapshot.pending_question.is_none());
        assert!(snapshot.tool_progress.is_none());
        assert_eq!(snapshot.current_text, "");
        assert_eq!(snapshot.committed_text, "");
    }

    assert!(peer.was_closed_by_client());
    // The turn was cut short, so its input is kept as a draft.
    assert_eq!(h.drafts.load_draft("/proj").await.unwrap().as_deref(), Some("go"));
    assert_eq!(h.sessions.load("/proj").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_can_preserve_session() {
    let mut h = harness();
    let _peer = connect_and_ack(&mut h).await;

    h.client.disconnect(true).await.unwrap();
    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert_eq!(snapshot.session_id(), Some("s1"));
    assert_eq!(h.sessions.load("/proj").await.unwrap().as_deref(), Some("s1"));
}

#[tokio::test(start_paused = true)]
async fn test_session_invalid_clears_session() {
    let mut h = harness();
    let peer = connect_and_ack(&mut h).await;
    h.client.send_input("hi", Vec::new(), None).await.unwrap();

    peer.inject_json(&json!({
        "type": "error", "code": "SESSION_INVALID",
        "message": "unknown session", "recoverable": false
    }));
    wait_for(&mut h.events, |e| {
        *e == BridgeEvent::Error(BridgeError::SessionInvalid)
    })
    .await;

    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.session_id(), None);
    assert_eq!(snapshot.agent, AgentState::Stopped);
    assert!(snapshot.connection.is_connected());
    assert_eq!(h.sessions.load("/proj").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_requests_clear_tool_progress() {
    let mut h = harness();
    let mut peer = connect_and_ack(&mut h).await;
    h.client.send_input("edit", Vec::new(), None).await.unwrap();
    peer.next_sent().await.unwrap();

    let progress = stream(json!({
        "type": "progress", "id": "t1", "tool": "Bash", "elapsed": 3.0, "detail": "running"
    }));
    peer.inject_json(&progress);
    wait_for(&mut h.events, |e| matches!(e, BridgeEvent::Progress(_))).await;
    assert!(h.client.snapshot().await.unwrap().tool_progress.is_some());

    peer.inject_json(&stream(json!({
        "type": "permission", "id": "p1", "tool": "Write", "input": {}, "options": []
    })));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::PermissionRequested(_))
    })
    .await;
    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.agent, AgentState::WaitingPermission);
    assert!(snapshot.tool_progress.is_none());
    assert_eq!(snapshot.pending_permission.unwrap().id, "p1");

    h.client
        .respond_to_permission("p1", PermissionChoice::Always)
        .await
        .unwrap();
    assert_eq!(
        peer.next_sent_json().await.unwrap(),
        json!({"type": "permission_response", "id": "p1", "choice": "always"})
    );
    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.agent, AgentState::Executing);
    assert!(snapshot.pending_permission.is_none());

    peer.inject_json(&progress);
    wait_for(&mut h.events, |e| matches!(e, BridgeEvent::Progress(_))).await;
    peer.inject_json(&stream(json!({
        "type": "question", "id": "q1",
        "questions": [{
            "question": "Which file?",
            "options": [{"label": "a.rs"}],
            "multiSelect": false
        }]
    })));
    wait_for(&mut h.events, |e| matches!(e, BridgeEvent::QuestionAsked(_))).await;
    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.agent, AgentState::WaitingInput);
    assert!(snapshot.tool_progress.is_none());
    assert_eq!(snapshot.pending_question.unwrap().questions[0].question, "Which file?");
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replays_current_session_id() {
    let mut h = harness();
    h.client
        .connect(
            ConnectRequest::new("/proj")
                .with_session_id("s0")
                .with_model("sonnet"),
        )
        .await
        .unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    assert_eq!(peer.next_sent_json().await.unwrap()["sessionId"], "s0");
    peer.inject_json(&connected_frame("s1"));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::SessionConnected { .. })
    })
    .await;

    let dropped_at = Instant::now();
    peer.fail("connection reset");
    wait_for(&mut h.events, |e| {
        *e == BridgeEvent::ConnectionStateChanged(ConnectionState::Reconnecting { attempt: 1 })
    })
    .await;
    assert_eq!(h.client.snapshot().await.unwrap().agent, AgentState::Recovering);

    let mut replayed = h.transport.accept().await.unwrap();
    let waited = dropped_at.elapsed();
    assert!(waited >= Duration::from_millis(1000), "{waited:?}");
    assert!(waited <= Duration::from_millis(1200), "{waited:?}");
    assert_eq!(
        replayed.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/proj", "sessionId": "s1", "model": "sonnet"})
    );

    replayed.inject_json(&connected_frame("s1"));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::SessionConnected { .. })
    })
    .await;
    let snapshot = h.client.snapshot().await.unwrap();
    assert!(snapshot.connection.is_connected());
    assert_eq!(snapshot.agent, AgentState::Idle);
    assert_eq!(snapshot.reconnect_attempt, 0);
    assert_eq!(h.transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_five_attempts() {
    let mut h = harness();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    h.client
        .on(EventKind::Error, move |event| {
            if let BridgeEvent::Error(error) = event {
                seen.lock().unwrap().push(error.clone());
            }
        })
        .await
        .unwrap();

    let peer = connect_and_ack(&mut h).await;
    h.transport.fail_next_opens(100);
    peer.fail("connection reset");

    let mut attempts = Vec::new();
    loop {
        match wait_for(&mut h.events, |_| true).await {
            BridgeEvent::ConnectionStateChanged(ConnectionState::Reconnecting { attempt }) => {
                attempts.push(attempt);
            }
            BridgeEvent::Error(BridgeError::ReconnectFailed { attempts: gave_up_after }) => {
                assert_eq!(gave_up_after, 5);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(attempts, vec![1, 2, 3, 4, 5]);

    sleep(Duration::from_secs(300)).await;
    let give_ups = errors
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, BridgeError::ReconnectFailed { .. }))
        .count();
    assert_eq!(give_ups, 1);
    assert_eq!(h.transport.open_count(), 6);

    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert_eq!(snapshot.agent, AgentState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_backoff_cancels_retry() {
    let mut h = harness();
    let peer = connect_and_ack(&mut h).await;

    peer.fail("connection reset");
    wait_for(&mut h.events, |e| {
        matches!(
            e,
            BridgeEvent::ConnectionStateChanged(ConnectionState::Reconnecting { .. })
        )
    })
    .await;

    h.client.disconnect(false).await.unwrap();
    sleep(Duration::from_secs(120)).await;

    assert_eq!(h.transport.open_count(), 1);
    assert!(h.transport.try_accept().is_none());
    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert_eq!(snapshot.agent, AgentState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_connect_during_backoff_starts_fresh() {
    let mut h = harness();
    let peer = connect_and_ack(&mut h).await;
    peer.fail("connection reset");
    wait_for(&mut h.events, |e| {
        matches!(
            e,
            BridgeEvent::ConnectionStateChanged(ConnectionState::Reconnecting { .. })
        )
    })
    .await;

    h.client
        .connect(ConnectRequest::new("/other"))
        .await
        .unwrap();
    let mut fresh = h.transport.accept().await.unwrap();
    assert_eq!(
        fresh.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/other"})
    );

    // The cancelled backoff never fires.
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.open_count(), 2);
    assert!(fresh.drain_sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_handshake_is_retried() {
    let mut h = harness();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    peer.next_sent().await.unwrap();

    peer.inject_json(&json!({
        "type": "error", "code": "RATE_LIMITED", "message": "slow down",
        "recoverable": true, "retryable": true, "retryAfter": 2
    }));
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, BridgeEvent::Error(_))).await,
        BridgeEvent::Error(BridgeError::RateLimited {
            retry_after: Duration::from_secs(2)
        })
    );

    assert!(
        timeout(Duration::from_millis(1900), peer.next_sent())
            .await
            .is_err()
    );
    assert_eq!(
        peer.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/proj"})
    );
    assert_eq!(h.transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connected_ack_drops_pending_handshake_retry() {
    let mut h = harness();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    peer.next_sent().await.unwrap();

    peer.inject_json(&json!({
        "type": "error", "code": "RATE_LIMITED", "message": "slow down",
        "recoverable": true, "retryAfter": 2
    }));
    wait_for(&mut h.events, |e| matches!(e, BridgeEvent::Error(_))).await;
    peer.inject_json(&connected_frame("s1"));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::SessionConnected { .. })
    })
    .await;

    assert!(
        timeout(Duration::from_secs(10), peer.next_sent())
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn test_huge_retry_after_is_capped() {
    let mut h = harness();
    let mut peer = connect_and_ack(&mut h).await;

    peer.inject_json(&json!({
        "type": "error", "code": "RATE_LIMITED", "message": "slow down",
        "recoverable": true, "retryable": true, "retryAfter": 1e20
    }));
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, BridgeEvent::Error(_))).await,
        BridgeEvent::Error(BridgeError::RateLimited {
            retry_after: MAX_RETRY_AFTER
        })
    );

    let snapshot = h.client.snapshot().await.unwrap();
    assert!(snapshot.connection.is_connected());
    h.client.send_input("still here", Vec::new(), None).await.unwrap();
    assert_eq!(peer.next_sent_json().await.unwrap()["type"], "input");
}

#[tokio::test(start_paused = true)]
async fn test_rejected_resume_starts_new_session() {
    let mut h = harness();
    h.sessions.save("stale", "/proj").await.unwrap();
    h.client
        .connect(ConnectRequest::new("/proj").with_session_id("stale"))
        .await
        .unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    assert_eq!(
        peer.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/proj", "sessionId": "stale"})
    );

    peer.inject_json(&json!({
        "type": "error", "code": "SESSION_INVALID",
        "message": "unknown session", "recoverable": false
    }));
    wait_for(&mut h.events, |e| {
        *e == BridgeEvent::Error(BridgeError::SessionInvalid)
    })
    .await;
    assert_eq!(
        peer.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/proj"})
    );
    assert_eq!(h.sessions.load("/proj").await.unwrap(), None);

    peer.inject_json(&connected_frame("s2"));
    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::SessionConnected { .. })
    })
    .await;
    let snapshot = h.client.snapshot().await.unwrap();
    assert!(snapshot.connection.is_connected());
    assert_eq!(snapshot.agent, AgentState::Idle);
    assert_eq!(snapshot.session_id(), Some("s2"));
    assert_eq!(h.transport.open_count(), 1);
    h.client.send_input("hi", Vec::new(), None).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_refused_handshake_opens_again() {
    let mut h = harness();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    peer.next_sent().await.unwrap();

    peer.inject_json(&json!({
        "type": "error", "code": "UNAUTHORIZED",
        "message": "no", "recoverable": false
    }));
    wait_for(&mut h.events, |e| {
        *e == BridgeEvent::Error(BridgeError::SessionInvalid)
    })
    .await;
    assert!(
        timeout(Duration::from_secs(1), peer.next_sent())
            .await
            .is_err()
    );

    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let mut fresh = h.transport.accept().await.unwrap();
    assert_eq!(
        fresh.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/proj"})
    );
    assert_eq!(h.transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_bad_frames_keep_connection_alive() {
    let mut h = harness();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let peer = h.transport.accept().await.unwrap();

    peer.inject("{not json");
    peer.inject_json(&json!({"type": "telemetry", "payload": 1}));
    peer.inject_json(&stream(json!({"type": "hologram", "content": "?"})));
    peer.inject_json(&json!({"type": "stream"}));
    peer.inject_json(&connected_frame("s1"));

    wait_for(&mut h.events, |e| {
        matches!(e, BridgeEvent::SessionConnected { .. })
    })
    .await;
    assert!(h.client.snapshot().await.unwrap().connection.is_connected());
    assert_eq!(h.transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_ends_turn_and_saves_draft() {
    let mut h = harness();
    let peer = connect_and_ack(&mut h).await;
    h.client
        .send_input("fix the bug", Vec::new(), None)
        .await
        .unwrap();

    peer.inject_json(&json!({
        "type": "error", "code": "INTERNAL", "message": "boom", "recoverable": true
    }));
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, BridgeEvent::Error(_))).await,
        BridgeEvent::Error(BridgeError::ServerError {
            code: "INTERNAL".to_string(),
            message: "boom".to_string(),
            recoverable: true,
        })
    );

    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.agent, AgentState::Idle);
    assert!(snapshot.connection.is_connected());
    assert_eq!(
        h.drafts.load_draft("/proj").await.unwrap().as_deref(),
        Some("fix the bug")
    );
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_network_before_reconnecting() {
    let mut h = harness();
    let peer = connect_and_ack(&mut h).await;

    h.network.set_available(false);
    peer.fail("no route to host");
    assert_eq!(
        wait_for(&mut h.events, |e| matches!(e, BridgeEvent::Error(_))).await,
        BridgeEvent::Error(BridgeError::NetworkUnavailable)
    );
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.open_count(), 1);
    assert_eq!(
        h.client.snapshot().await.unwrap().connection,
        ConnectionState::Disconnected
    );

    h.network.set_available(true);
    let mut replayed = h.transport.accept().await.unwrap();
    assert_eq!(
        replayed.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/proj", "sessionId": "s1"})
    );
}

#[tokio::test(start_paused = true)]
async fn test_resume_saved_session_id() {
    let h = harness();
    h.sessions.save("s-old", "/proj").await.unwrap();

    h.client
        .connect(ConnectRequest::new("/proj").resume_saved(true).helper(true))
        .await
        .unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    assert_eq!(
        peer.next_sent_json().await.unwrap(),
        json!({"type": "start", "projectPath": "/proj", "sessionId": "s-old", "helper": true})
    );
}

#[tokio::test(start_paused = true)]
async fn test_text_callbacks_and_model_tracking() {
    let mut h = harness();
    let texts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&texts);
    h.client
        .on(EventKind::Text, move |event| {
            if let BridgeEvent::Text(text) = event {
                seen.lock().unwrap().push(text.clone());
            }
        })
        .await
        .unwrap();

    let peer = connect_and_ack(&mut h).await;
    assert_eq!(h.client.snapshot().await.unwrap().model.as_deref(), Some("opus"));

    peer.inject_json(&stream(json!({"type": "assistant", "content": "He", "delta": true})));
    peer.inject_json(&stream(json!({"type": "assistant", "content": "Hello"})));
    peer.inject_json(&stream(json!({"type": "assistant", "content": "Hello"})));
    peer.inject_json(&json!({"type": "model_changed", "model": "haiku", "previousModel": "opus"}));
    peer.inject_json(&json!({"type": "interrupted"}));

    let stopped = wait_for(&mut h.events, is_stopped).await;
    assert_eq!(
        stopped,
        BridgeEvent::Stopped {
            reason: None,
            interrupted: true
        }
    );
    assert_eq!(*texts.lock().unwrap(), vec!["He", "Hello"]);

    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.model.as_deref(), Some("haiku"));
    assert_eq!(snapshot.committed_text, "Hello");

    h.client.clear_current_text().await.unwrap();
    let snapshot = h.client.snapshot().await.unwrap();
    assert_eq!(snapshot.committed_text, "");
    assert!(h.client.off(EventKind::Text).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_closes_transport() {
    let h = harness();
    h.client.connect(ConnectRequest::new("/proj")).await.unwrap();
    let mut peer = h.transport.accept().await.unwrap();
    peer.next_sent().await.unwrap();

    drop(h.client);
    // The close request is the last thing the client sends.
    assert_eq!(timeout(Duration::from_secs(5), peer.next_sent()).await, Ok(None));
}
