//! Terminal client for an agent bridge server.
//!
//! Run with: cargo run -p bridge-cli -- [project-path]
//!
//! The server URL comes from `AGENT_BRIDGE_SERVER_URL` (default
//! `http://localhost:8080`). Lines typed on stdin are sent as input; lines
//! starting with `/` are commands (`/help` lists them).

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use agent_bridge_core::{BridgeConfig, PermissionChoice, PermissionMode, SessionIdStore};
use agent_bridge_session::{
    BridgeClient, BridgeEvent, ConnectRequest,
    storage::{FileSessionStore, MemoryDraftStore, MemorySessionStore},
};
use agent_bridge_transport::WebSocketTransport;
use anyhow::Context;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
/allow <id>         allow a pending tool call
/always <id>        allow a tool for the rest of the session
/deny <id>          deny a pending tool call
/answer <id> <text> answer the first question of a pending request
/interrupt          stop the current turn
/model <name>       switch model
/mode <mode>        default | acceptEdits | plan | bypassPermissions
/cancel             drop queued input
/clear              clear the displayed text
/status             print the session state
/quit               disconnect, keeping the session for next time";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = BridgeConfig::from_env().context("invalid configuration")?;
    let project_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().context("no current directory")?,
    };

    let session_store: Arc<dyn SessionIdStore> = match FileSessionStore::in_data_dir() {
        Ok(store) => {
            tracing::debug!(path = %store.path().display(), "session ids stored on disk");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "falling back to in-memory session ids");
            Arc::new(MemorySessionStore::new())
        }
    };

    let transport = Arc::new(WebSocketTransport::from_config(&config));
    let client = BridgeClient::builder(config, transport)
        .session_store(session_store)
        .draft_store(Arc::new(MemoryDraftStore::new()))
        .build();

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            print_event(&event);
        }
    });

    let request = ConnectRequest::new(project_path.to_string_lossy()).resume_saved(true);
    if let Err(e) = client.connect(request).await {
        // Reconnection keeps trying on transport errors.
        tracing::warn!(error = %e, "connect failed");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match handle_line(&client, line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("! {e}"),
        }
    }

    client.disconnect(true).await?;
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(client: &BridgeClient, line: &str) -> anyhow::Result<bool> {
    let Some(command) = line.strip_prefix('/') else {
        client.send_input(line, Vec::new(), None).await?;
        return Ok(true);
    };

    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "allow" => client.respond_to_permission(rest, PermissionChoice::Allow).await?,
        "always" => client.respond_to_permission(rest, PermissionChoice::Always).await?,
        "deny" => client.respond_to_permission(rest, PermissionChoice::Deny).await?,
        "answer" => {
            let (id, text) = rest.split_once(' ').context("usage: /answer <id> <text>")?;
            let snapshot = client.snapshot().await?;
            let question = snapshot
                .pending_question
                .filter(|pending| pending.id == id)
                .and_then(|pending| pending.questions.into_iter().next())
                .context("no such pending question")?;
            let answers = BTreeMap::from([(question.question, text.trim().into())]);
            client.respond_to_question(id, answers).await?;
        }
        "interrupt" => client.interrupt().await?,
        "model" => client.set_model(rest).await?,
        "mode" => {
            let mode = match rest {
                "default" => PermissionMode::Default,
                "acceptEdits" => PermissionMode::AcceptEdits,
                "plan" => PermissionMode::Plan,
                "bypassPermissions" => PermissionMode::BypassPermissions,
                other => anyhow::bail!("unknown mode {other:?}"),
            };
            client.set_permission_mode(mode).await?;
        }
        "cancel" => client.cancel_queued().await?,
        "clear" => client.clear_current_text().await?,
        "status" => {
            let snapshot = client.snapshot().await?;
            println!(
                "connection: {}  agent: {:?}  session: {}  model: {}",
                snapshot.connection,
                snapshot.agent,
                snapshot.session_id().unwrap_or("-"),
                snapshot.model.as_deref().unwrap_or("-"),
            );
            if let Some(usage) = snapshot.token_usage {
                println!("tokens: {} in / {} out", usage.input_tokens, usage.output_tokens);
            }
        }
        "quit" => return Ok(false),
        _ => println!("{HELP}"),
    }
    Ok(true)
}

fn print_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::Text(text) => println!("assistant: {text}"),
        BridgeEvent::Thinking(text) => println!("(thinking) {text}"),
        BridgeEvent::ToolStart(tool) => println!("> {} [{}]", tool.name, tool.id),
        BridgeEvent::ToolResult(result) => {
            let mark = if result.is_error { "x" } else { "<" };
            println!("{mark} {}: {}", result.tool, result.output);
        }
        BridgeEvent::PermissionRequested(request) => println!(
            "? {} wants to run {} ({}); reply /allow {0}, /always {0} or /deny {0}",
            request.id,
            request.tool,
            request.options.join(", "),
        ),
        BridgeEvent::QuestionAsked(request) => {
            for question in &request.questions {
                let options: Vec<_> = question.options.iter().map(|o| o.label.as_str()).collect();
                println!("? [{}] {} {:?}", request.id, question.question, options);
            }
        }
        BridgeEvent::Error(error) => eprintln!("! {error}"),
        BridgeEvent::Stopped { interrupted, .. } => {
            println!("{}", if *interrupted { "-- interrupted --" } else { "-- done --" });
        }
        BridgeEvent::SubagentStarted { description, .. } => println!("+ subagent: {description}"),
        BridgeEvent::SubagentCompleted { summary, .. } => println!("- subagent: {summary}"),
        BridgeEvent::SessionConnected {
            session_id, model, ..
        } => println!(
            "connected to session {session_id} ({})",
            model.as_deref().unwrap_or("default model")
        ),
        BridgeEvent::ModelChanged { model, .. } => println!("model: {model}"),
        BridgeEvent::ConnectionStateChanged(state) => tracing::info!(%state, "connection"),
        BridgeEvent::AgentStateChanged(state) => tracing::debug!(?state, "agent"),
        BridgeEvent::Progress(_)
        | BridgeEvent::Usage(_)
        | BridgeEvent::SessionEvent { .. }
        | BridgeEvent::History { .. } => {}
    }
}
