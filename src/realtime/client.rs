//! Socket.IO client task for the admin live channel.
//!
//! Connects over WebSocket, authenticates with the stored admin token and
//! republishes `new-order` / `order-updated` into the [`EventHub`]. Drops
//! are retried with exponential backoff; every successful reconnect is
//! published as [`LiveEvent::Reconnected`] so views resync.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hub::{EventHub, LiveEvent};
use super::protocol::{
    decode_engine, decode_socket, encode_engine, encode_socket, EnginePacket, SocketPacket,
};
use crate::error::{AdminError, AdminResult};
use crate::events::{self, Emitter};
use crate::orders::StatusChange;
use crate::storage::TokenStore;

pub const EVENT_NEW_ORDER: &str = "new-order";
pub const EVENT_ORDER_UPDATED: &str = "order-updated";

const INITIAL_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 5_000;
/// Read deadline before the server has told us its ping timings.
const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(45);

/// Delay before reconnect attempt `attempt` (0-based).
pub fn reconnect_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
    Duration::from_millis(INITIAL_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS))
}

/// WebSocket endpoint for a Socket.IO server rooted at `base`.
pub fn socket_endpoint(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        format!("ws://{base}")
    };
    format!("{base}/socket.io/?EIO=4&transport=websocket")
}

// ---------------------------------------------------------------------------
// Frame interpretation
// ---------------------------------------------------------------------------

/// What the session loop should do with one incoming text frame.
#[derive(Debug, PartialEq)]
pub(crate) enum FrameAction {
    /// Write this frame back to the server.
    Reply(String),
    /// Handshake accepted; read deadline is `interval + timeout`.
    Opened(Duration),
    /// Namespace connect acknowledged.
    Joined,
    Publish(LiveEvent),
    /// Server closed the session.
    Closed(String),
    /// Namespace connect refused.
    Refused(String),
    Ignore,
}

pub(crate) fn interpret_frame(frame: &str, token: &str) -> Vec<FrameAction> {
    let packet = match decode_engine(frame) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "dropping malformed live frame");
            return vec![FrameAction::Ignore];
        }
    };
    match packet {
        EnginePacket::Open(handshake) => {
            let deadline = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
            let connect = encode_socket(&SocketPacket::Connect {
                namespace: "/".into(),
                data: Some(json!({ "token": token })),
            });
            vec![FrameAction::Opened(deadline), FrameAction::Reply(connect)]
        }
        EnginePacket::Ping(data) => vec![FrameAction::Reply(encode_engine(&EnginePacket::Pong(
            data,
        )))],
        EnginePacket::Close => vec![FrameAction::Closed("server closed the transport".into())],
        EnginePacket::Message(payload) => match decode_socket(&payload) {
            Ok(SocketPacket::Connect { .. }) => vec![FrameAction::Joined],
            Ok(SocketPacket::ConnectError { data, .. }) => {
                let reason = data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string();
                vec![FrameAction::Refused(reason)]
            }
            Ok(SocketPacket::Disconnect { .. }) => {
                vec![FrameAction::Closed("server disconnected the namespace".into())]
            }
            Ok(SocketPacket::Event { name, args, .. }) => vec![event_action(&name, args)],
            Ok(SocketPacket::Ack { .. }) => vec![FrameAction::Ignore],
            Err(e) => {
                warn!(error = %e, "dropping malformed live packet");
                vec![FrameAction::Ignore]
            }
        },
        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {
            vec![FrameAction::Ignore]
        }
    }
}

fn event_action(name: &str, args: Vec<Value>) -> FrameAction {
    let payload = args.into_iter().next().unwrap_or(Value::Null);
    match name {
        EVENT_NEW_ORDER => FrameAction::Publish(LiveEvent::NewOrder(payload)),
        EVENT_ORDER_UPDATED => match serde_json::from_value::<StatusChange>(payload) {
            Ok(change) => FrameAction::Publish(LiveEvent::OrderUpdated(change)),
            Err(e) => {
                warn!(error = %e, "ignoring malformed order-updated payload");
                FrameAction::Ignore
            }
        },
        other => {
            debug!(event = other, "ignoring unhandled live event");
            FrameAction::Ignore
        }
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SessionEnd {
    Cancelled,
    Dropped(String),
    Refused(String),
}

struct SessionOutcome {
    joined: bool,
    end: SessionEnd,
}

/// Running live channel. Dropping the handle stops the task.
pub struct LiveHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel and wait for the task to finish its close handshake.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn the live channel task on the current tokio runtime.
pub fn start(
    socket_url: &str,
    tokens: Arc<dyn TokenStore>,
    hub: EventHub,
    emitter: Arc<dyn Emitter>,
) -> LiveHandle {
    let url = socket_endpoint(socket_url);
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    let task = tokio::spawn(async move {
        run(url, tokens, hub, emitter, child).await;
    });
    LiveHandle {
        cancel,
        task: Some(task),
    }
}

fn emit_status(emitter: &dyn Emitter, connected: bool, attempt: u32, reason: Option<&str>) {
    emitter.emit(
        events::EVENT_LIVE_STATUS,
        json!({ "connected": connected, "attempt": attempt, "reason": reason }),
    );
}

async fn run(
    url: String,
    tokens: Arc<dyn TokenStore>,
    hub: EventHub,
    emitter: Arc<dyn Emitter>,
    cancel: CancellationToken,
) {
    info!(url = %url, "live channel starting");
    let mut attempt: u32 = 0;
    let mut ever_joined = false;

    loop {
        let Some(token) = tokens.load() else {
            warn!("no admin token; live channel stopped");
            emit_status(emitter.as_ref(), false, attempt, Some("signed out"));
            break;
        };

        let outcome = session(&url, &token, &hub, emitter.as_ref(), &cancel, ever_joined).await;
        let reason = match outcome {
            Ok(SessionOutcome { joined, end }) => {
                if joined && !matches!(end, SessionEnd::Cancelled) {
                    ever_joined = true;
                    attempt = 0;
                    hub.publish(LiveEvent::Disconnected);
                }
                match end {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Refused(reason) if is_auth_refusal(&reason) => {
                        warn!(reason = %reason, "live channel rejected the admin token");
                        if let Err(e) = tokens.clear() {
                            warn!(error = %e, "failed to clear admin token");
                        }
                        emitter.emit(events::EVENT_SESSION_EXPIRED, json!({ "reason": reason }));
                        emit_status(emitter.as_ref(), false, attempt, Some(&reason));
                        break;
                    }
                    SessionEnd::Refused(reason) | SessionEnd::Dropped(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };

        let delay = reconnect_delay(attempt);
        warn!(reason = %reason, attempt, delay_ms = delay.as_millis() as u64, "live channel down, retrying");
        emit_status(emitter.as_ref(), false, attempt, Some(&reason));
        attempt = attempt.saturating_add(1);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!("live channel stopped");
}

/// Namespace refusals that retrying with the same token cannot fix.
pub(crate) fn is_auth_refusal(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    ["auth", "token", "jwt", "unauthorized", "forbidden"]
        .iter()
        .any(|needle| reason.contains(needle))
}

async fn session(
    url: &str,
    token: &str,
    hub: &EventHub,
    emitter: &dyn Emitter,
    cancel: &CancellationToken,
    resumed: bool,
) -> AdminResult<SessionOutcome> {
    let (ws, _) = tokio::select! {
        _ = cancel.cancelled() => {
            return Ok(SessionOutcome { joined: false, end: SessionEnd::Cancelled });
        }
        res = connect_async(url) => res.map_err(|e| AdminError::Channel(e.to_string()))?,
    };
    let (write, read) = ws.split();
    Ok(drive(write, read, token, hub, emitter, cancel, resumed).await)
}

/// Pump one connected session until it ends. Never loses track of whether
/// the namespace was joined, whichever side fails.
async fn drive<W, R, E>(
    mut write: W,
    mut read: R,
    token: &str,
    hub: &EventHub,
    emitter: &dyn Emitter,
    cancel: &CancellationToken,
    resumed: bool,
) -> SessionOutcome
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = HANDSHAKE_DEADLINE;
    let mut joined = false;
    let dropped = |joined: bool, reason: String| SessionOutcome {
        joined,
        end: SessionEnd::Dropped(reason),
    };

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                let bye = encode_socket(&SocketPacket::Disconnect { namespace: "/".into() });
                let _ = write.send(Message::Text(bye)).await;
                let _ = write.close().await;
                return SessionOutcome { joined, end: SessionEnd::Cancelled };
            }
            next = tokio::time::timeout(deadline, read.next()) => next,
        };

        let frame = match next {
            Err(_) => return dropped(joined, "ping timeout".into()),
            Ok(None) => return dropped(joined, "connection closed".into()),
            Ok(Some(Err(e))) => return dropped(joined, e.to_string()),
            Ok(Some(Ok(Message::Text(text)))) => text,
            Ok(Some(Ok(Message::Close(_)))) => return dropped(joined, "closed by server".into()),
            Ok(Some(Ok(_))) => continue,
        };

        for action in interpret_frame(&frame, token) {
            match action {
                FrameAction::Reply(out) => {
                    if let Err(e) = write.send(Message::Text(out)).await {
                        return dropped(joined, format!("write failed: {e}"));
                    }
                }
                FrameAction::Opened(d) => deadline = d,
                FrameAction::Joined => {
                    joined = true;
                    info!(resumed, "live channel connected");
                    emit_status(emitter, true, 0, None);
                    hub.publish(if resumed {
                        LiveEvent::Reconnected
                    } else {
                        LiveEvent::Connected
                    });
                }
                FrameAction::Publish(event) => {
                    hub.publish(event);
                }
                FrameAction::Closed(reason) => return dropped(joined, reason),
                FrameAction::Refused(reason) => {
                    return SessionOutcome {
                        joined,
                        end: SessionEnd::Refused(reason),
                    }
                }
                FrameAction::Ignore => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEmitter;
    use crate::orders::OrderStatus;

    #[test]
    fn backoff_doubles_up_to_five_seconds() {
        let delays: Vec<u64> = (0..6).map(|a| reconnect_delay(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000, 5000]);
        assert_eq!(reconnect_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn endpoint_follows_http_scheme() {
        assert_eq!(
            socket_endpoint("https://api.freshlaa.com/"),
            "wss://api.freshlaa.com/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_endpoint("http://localhost:5000"),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn open_frame_triggers_authenticated_connect() {
        let open = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
        let actions = interpret_frame(open, "tok");
        assert_eq!(
            actions,
            vec![
                FrameAction::Opened(Duration::from_millis(45_000)),
                FrameAction::Reply(r#"40{"token":"tok"}"#.into()),
            ]
        );
    }

    #[test]
    fn ping_gets_pong() {
        assert_eq!(
            interpret_frame("2", "tok"),
            vec![FrameAction::Reply("3".into())]
        );
    }

    #[test]
    fn order_events_are_published() {
        let updated = interpret_frame(r#"42["order-updated",{"orderId":"a","status":"Delivered"}]"#, "t");
        assert_eq!(
            updated,
            vec![FrameAction::Publish(LiveEvent::OrderUpdated(StatusChange {
                order_id: "a".into(),
                status: OrderStatus::Delivered,
            }))]
        );

        let created = interpret_frame(r#"42["new-order",{"_id":"n1","total":99}]"#, "t");
        assert_eq!(
            created,
            vec![FrameAction::Publish(LiveEvent::NewOrder(
                json!({ "_id": "n1", "total": 99 })
            ))]
        );
    }

    #[test]
    fn bad_or_unknown_events_are_ignored() {
        assert_eq!(
            interpret_frame(r#"42["order-updated",{"status":"Packed"}]"#, "t"),
            vec![FrameAction::Ignore]
        );
        assert_eq!(
            interpret_frame(r#"42["chat",{}]"#, "t"),
            vec![FrameAction::Ignore]
        );
        assert_eq!(interpret_frame("x", "t"), vec![FrameAction::Ignore]);
    }

    #[test]
    fn connect_error_refuses_session() {
        assert_eq!(
            interpret_frame(r#"44{"message":"Authentication error"}"#, "t"),
            vec![FrameAction::Refused("Authentication error".into())]
        );
        assert_eq!(interpret_frame("40", "t"), vec![FrameAction::Joined]);
    }

    #[test]
    fn auth_refusals_are_recognised() {
        assert!(is_auth_refusal("Authentication error"));
        assert!(is_auth_refusal("invalid token"));
        assert!(is_auth_refusal("jwt expired"));
        assert!(!is_auth_refusal("server is shutting down"));
        assert!(!is_auth_refusal("connection refused"));
    }

    const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    fn frames(texts: &[&str]) -> impl Stream<Item = Result<Message, std::io::Error>> + Unpin {
        let items: Vec<Result<Message, std::io::Error>> = texts
            .iter()
            .map(|t| Ok(Message::Text(t.to_string())))
            .collect();
        futures_util::stream::iter(items)
    }

    /// Sink that accepts `ok` frames, then fails every write.
    fn sink_failing_after(ok: u32) -> impl Sink<Message, Error = std::io::Error> + Unpin {
        Box::pin(futures_util::sink::unfold(0u32, move |sent, _msg: Message| async move {
            if sent < ok {
                Ok(sent + 1)
            } else {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"))
            }
        }))
    }

    #[tokio::test]
    async fn write_failure_after_join_keeps_joined() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();
        let emitter = RecordingEmitter::default();

        // Namespace connect goes out, the pong after the join fails.
        let outcome = drive(
            sink_failing_after(1),
            frames(&[OPEN, "40", "2", r#"42["new-order",{"_id":"lost"}]"#]),
            "tok",
            &hub,
            &emitter,
            &CancellationToken::new(),
            false,
        )
        .await;

        assert!(outcome.joined);
        assert!(
            matches!(&outcome.end, SessionEnd::Dropped(reason) if reason.contains("broken pipe")),
            "unexpected end: {:?}",
            outcome.end
        );
        assert_eq!(sub.try_recv(), Some(LiveEvent::Connected));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn resumed_session_publishes_reconnected() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();
        let emitter = RecordingEmitter::default();

        let outcome = drive(
            sink_failing_after(u32::MAX),
            frames(&[OPEN, "40", r#"42["order-updated",{"orderId":"a","status":"Packed"}]"#]),
            "tok",
            &hub,
            &emitter,
            &CancellationToken::new(),
            true,
        )
        .await;

        assert!(outcome.joined);
        assert!(matches!(&outcome.end, SessionEnd::Dropped(reason) if reason == "connection closed"));
        assert_eq!(sub.try_recv(), Some(LiveEvent::Reconnected));
        assert!(matches!(sub.try_recv(), Some(LiveEvent::OrderUpdated(_))));
        assert_eq!(emitter.names(), vec![events::EVENT_LIVE_STATUS]);
    }

    #[tokio::test]
    async fn refused_namespace_ends_before_join() {
        let hub = EventHub::new();
        let emitter = RecordingEmitter::default();

        let outcome = drive(
            sink_failing_after(u32::MAX),
            frames(&[OPEN, r#"44{"message":"Authentication error"}"#, "40"]),
            "stale",
            &hub,
            &emitter,
            &CancellationToken::new(),
            false,
        )
        .await;

        assert!(!outcome.joined);
        assert!(matches!(&outcome.end, SessionEnd::Refused(reason) if reason == "Authentication error"));
        assert!(emitter.names().is_empty());
    }
}
