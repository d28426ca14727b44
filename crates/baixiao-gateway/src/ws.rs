//! WebSocket handler for streaming chat.
//!
//! Protocol:
//! → Client sends: {"methods":"chat","query":"...","chat_history":[...]}
//! ← Server sends: {"type":"token","text":"..."}   (zero or more)
//! ← Server sends: {"type":"done"} or {"type":"error","error":"..."}
//!
//! The connection stays open across requests. Frames that arrive while a
//! response is streaming count as activity and are served once it finishes.
//! Invalid JSON or a blank query only earns an error frame; an unknown
//! method is answered with an error and closed with 1002. Connections with
//! no inbound frames for the idle timeout are closed with 1008 "Idle timeout".

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use baixiao_agent::EventStream;
use baixiao_core::error::{BaixiaoError, Result};
use baixiao_core::types::{ChatHistoryEntry, StreamEvent};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use super::server::{AppState, IdlePolicy};

/// Upper bound on delivering a close frame to a client that stopped reading.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Requests a client may queue while a session is still streaming.
const MAX_PENDING: usize = 16;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Last inbound activity of one connection, shared with its idle monitor.
#[derive(Debug)]
pub struct ActivityClock {
    opened: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            opened: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    pub fn touch(&self) {
        let now = self.opened.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(now, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.opened.elapsed().saturating_sub(last)
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub query: String,
    pub chat_history: Vec<ChatHistoryEntry>,
}

/// Parse one inbound text frame.
///
/// `Protocol` errors close the connection; everything else is reported and
/// the connection stays usable. The query itself is validated later by the
/// orchestrator.
pub fn parse_message(text: &str) -> Result<ChatMessage> {
    let invalid_json = || BaixiaoError::InvalidInput("Invalid JSON".into());
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(text) else {
        return Err(invalid_json());
    };

    let method = fields.get("methods").and_then(Value::as_str).unwrap_or("");
    if method.trim() != "chat" {
        return Err(BaixiaoError::Protocol("Invalid method".into()));
    }

    let query = fields
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let bad_history = || BaixiaoError::InvalidInput("chat_history must be a list of objects".into());
    let chat_history = match fields.get("chat_history") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_object().cloned().ok_or_else(bad_history))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(bad_history()),
    };

    Ok(ChatMessage {
        query,
        chat_history,
    })
}

/// Outbound JSON for one session event.
pub fn event_frame(event: &StreamEvent) -> Value {
    match event {
        StreamEvent::Token { text } => token_frame(text),
        terminal => serde_json::to_value(terminal)
            .unwrap_or_else(|e| serde_json::json!({ "type": "error", "error": e.to_string() })),
    }
}

/// A token whose text is itself a JSON object is forwarded field by field.
pub fn token_frame(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut fields)) => {
            fields.insert("type".into(), Value::from("token"));
            Value::Object(fields)
        }
        _ => serde_json::json!({ "type": "token", "text": text }),
    }
}

enum Outcome {
    Continue,
    Close(CloseFrame),
    Disconnected,
}

enum Inbound {
    Frame(Message),
    Idle,
    Closed,
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    tracing::info!("🔌 WS client connected ({id})");

    let clock = Arc::new(ActivityClock::new());
    let (idle_tx, idle_rx) = oneshot::channel::<()>();
    let monitor = tokio::spawn(idle_monitor(clock.clone(), state.idle, idle_tx));

    let (sender, receiver) = socket.split();
    let mut conn = Connection {
        id,
        sender,
        receiver,
        clock,
        idle: idle_rx,
        pending: VecDeque::new(),
    };

    let close = loop {
        let msg = match conn.next_frame().await {
            Inbound::Frame(msg) => msg,
            Inbound::Idle => break Some(idle_close()),
            Inbound::Closed => break None,
        };
        let outcome = match msg {
            Message::Text(text) => conn.handle_text(&state, text.as_str()).await,
            _ => conn.reply("Invalid JSON").await,
        };
        match outcome {
            Outcome::Continue => {}
            Outcome::Close(frame) => break Some(frame),
            Outcome::Disconnected => break None,
        }
    };

    monitor.abort();
    let id = conn.id;
    if let Some(frame) = close {
        tracing::info!("WS closing ({id}): {} {}", frame.code, frame.reason.as_str());
        let mut sender = conn.sender;
        let _ = tokio::time::timeout(CLOSE_GRACE, sender.send(Message::Close(Some(frame)))).await;
    }
    tracing::info!("🔌 WS client disconnected ({id})");
}

/// One client connection. Requests that arrive while a session is streaming
/// wait in `pending` and are served in arrival order.
struct Connection {
    id: String,
    sender: SplitSink<WebSocket, Message>,
    receiver: SplitStream<WebSocket>,
    clock: Arc<ActivityClock>,
    idle: oneshot::Receiver<()>,
    pending: VecDeque<Message>,
}

impl Connection {
    /// Next data frame: queued requests first, then the socket.
    async fn next_frame(&mut self) -> Inbound {
        if let Some(msg) = self.pending.pop_front() {
            return Inbound::Frame(msg);
        }
        loop {
            tokio::select! {
                _ = &mut self.idle => return Inbound::Idle,
                msg = self.receiver.next() => match self.received(msg) {
                    None => return Inbound::Closed,
                    // Pings are answered by the protocol layer.
                    Some(Message::Ping(_) | Message::Pong(_)) => {}
                    Some(msg) => return Inbound::Frame(msg),
                },
            }
        }
    }

    /// Record inbound activity; `None` once the peer has gone away.
    fn received(&self, msg: Option<std::result::Result<Message, axum::Error>>) -> Option<Message> {
        match msg {
            Some(Ok(Message::Close(_))) | None => None,
            Some(Err(e)) => {
                tracing::debug!("WS receive error ({}): {e}", self.id);
                None
            }
            Some(Ok(msg)) => {
                self.clock.touch();
                Some(msg)
            }
        }
    }

    /// Run one chat request, streaming its events back to the client.
    async fn handle_text(&mut self, state: &AppState, text: &str) -> Outcome {
        let request = match parse_message(text) {
            Ok(request) => request,
            Err(BaixiaoError::Protocol(reason)) => {
                tracing::warn!("WS ({}) rejected: {reason}", self.id);
                if self.send_error(&reason).await.is_err() {
                    return Outcome::Disconnected;
                }
                return Outcome::Close(CloseFrame {
                    code: close_code::PROTOCOL,
                    reason: reason.into(),
                });
            }
            Err(e) => return self.reply_error(&e).await,
        };

        let history_len = request.chat_history.len();
        let events = match state.orchestrator.run(&request.query, request.chat_history) {
            Ok(events) => events,
            Err(e) => return self.reply_error(&e).await,
        };
        tracing::info!(
            "💬 WS chat ({}): query_len={}, history={history_len}",
            self.id,
            request.query.trim().chars().count()
        );
        self.stream(events).await
    }

    /// Forward session events while still reading from the client.
    async fn stream(&mut self, mut events: EventStream) -> Outcome {
        loop {
            tokio::select! {
                _ = &mut self.idle => return Outcome::Close(idle_close()),
                msg = self.receiver.next() => match self.received(msg) {
                    None => return Outcome::Disconnected,
                    Some(Message::Ping(_) | Message::Pong(_)) => {}
                    Some(msg) if self.pending.len() < MAX_PENDING => self.pending.push_back(msg),
                    Some(_) => {
                        if self.send_error("Too many pending requests").await.is_err() {
                            return Outcome::Disconnected;
                        }
                    }
                },
                event = events.next() => {
                    let Some(event) = event else {
                        return Outcome::Continue;
                    };
                    if let StreamEvent::Error { error } = &event {
                        tracing::warn!("WS chat ({}) ended with error: {error}", self.id);
                    }
                    if self.send_json(&event_frame(&event)).await.is_err() {
                        return Outcome::Disconnected;
                    }
                    if event.is_terminal() {
                        return Outcome::Continue;
                    }
                }
            }
        }
    }

    async fn reply_error(&mut self, error: &BaixiaoError) -> Outcome {
        if !error.is_client_error() {
            tracing::error!("WS request failed ({}): {error}", self.id);
        }
        self.reply(&error.to_string()).await
    }

    async fn reply(&mut self, message: &str) -> Outcome {
        match self.send_error(message).await {
            Ok(()) => Outcome::Continue,
            Err(()) => Outcome::Disconnected,
        }
    }

    async fn send_json(&mut self, value: &Value) -> std::result::Result<(), ()> {
        self.sender
            .send(Message::Text(value.to_string().into()))
            .await
            .map_err(|e| {
                tracing::debug!("WS send failed ({}): {e}", self.id);
            })
    }

    async fn send_error(&mut self, message: &str) -> std::result::Result<(), ()> {
        self.send_json(&serde_json::json!({ "type": "error", "error": message }))
            .await
    }
}

/// Signals once the connection has been idle longer than the policy allows.
async fn idle_monitor(clock: Arc<ActivityClock>, policy: IdlePolicy, fired: oneshot::Sender<()>) {
    let start = tokio::time::Instant::now() + policy.check_interval;
    let mut ticker = tokio::time::interval_at(start, policy.check_interval);
    loop {
        ticker.tick().await;
        let idle = clock.idle_for();
        if idle > policy.timeout {
            tracing::info!("⏰ WS idle for {}s, closing", idle.as_secs());
            let _ = fired.send(());
            return;
        }
    }
}

fn idle_close() -> CloseFrame {
    CloseFrame {
        code: close_code::POLICY,
        reason: "Idle timeout".into(),
    }
}
