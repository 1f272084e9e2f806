//! JSON-lines bridge between the UI host and the console core.
//!
//! Requests arrive on stdin, one per line:
//! `{"id": 7, "cmd": "orders_set_page", "args": [3]}`. `args` may be an
//! array (first two entries become `arg0`/`arg1`), a single value, or absent.
//!
//! Every request gets exactly one reply line, `{"id", "ok"}` or
//! `{"id", "error"}`. Local view commands are answered in receipt order;
//! remote ones in completion order. Host events are interleaved as
//! `{"event", "payload"}`. The bridge stops when stdin closes.

use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::events::HostEvent;
use crate::AppState;

/// Outbound lines buffered ahead of a slow host.
const OUTBOUND_CAPACITY: usize = 512;

#[derive(Debug, Deserialize)]
pub struct BridgeRequest {
    #[serde(default)]
    pub id: Value,
    pub cmd: String,
    #[serde(default)]
    pub args: Value,
}

impl BridgeRequest {
    /// Split `args` into the two positional command arguments.
    pub fn positional(&self) -> (Option<Value>, Option<Value>) {
        match &self.args {
            Value::Null => (None, None),
            Value::Array(items) => (items.first().cloned(), items.get(1).cloned()),
            single => (Some(single.clone()), None),
        }
    }
}

pub fn parse_request(line: &str) -> Result<BridgeRequest, String> {
    let request: BridgeRequest =
        serde_json::from_str(line).map_err(|e| format!("Malformed request: {e}"))?;
    if request.cmd.trim().is_empty() {
        return Err("Malformed request: empty cmd".to_string());
    }
    Ok(request)
}

pub fn encode_response(id: &Value, result: Result<Value, String>) -> String {
    let line = match result {
        Ok(value) => json!({ "id": id, "ok": value }),
        Err(message) => json!({ "id": id, "error": message }),
    };
    line.to_string()
}

async fn respond(state: &AppState, request: BridgeRequest) -> String {
    let (arg0, arg1) = request.positional();
    let result = commands::invoke(state, &request.cmd, arg0, arg1).await;
    if let Err(message) = &result {
        debug!(cmd = %request.cmd, %message, "command failed");
    }
    encode_response(&request.id, result)
}

pub fn encode_event(event: &HostEvent) -> String {
    json!({ "event": event.name, "payload": event.payload }).to_string()
}

/// Serve the bridge on this process's stdin/stdout.
pub async fn serve(state: Arc<AppState>, events: broadcast::Receiver<HostEvent>) -> io::Result<()> {
    serve_io(
        state,
        events,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

pub async fn serve_io<R, W>(
    state: Arc<AppState>,
    mut events: broadcast::Receiver<HostEvent>,
    reader: R,
    mut writer: W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    let writer_task = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<(), io::Error>(())
    });

    let event_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if event_tx.send(encode_event(&event)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "host is not keeping up, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut in_flight = JoinSet::new();
    let mut lines = reader.lines();
    let read_result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request = match parse_request(line) {
            Ok(request) => request,
            Err(message) => {
                warn!(%message, "rejecting bridge request");
                let _ = out_tx.send(encode_response(&Value::Null, Err(message))).await;
                continue;
            }
        };

        debug!(cmd = %request.cmd, "bridge request");
        // View edits apply in the order the host sent them.
        if commands::runs_inline(&request.cmd) {
            let _ = out_tx.send(respond(&state, request).await).await;
            continue;
        }
        let state = Arc::clone(&state);
        let tx = out_tx.clone();
        in_flight.spawn(async move {
            let _ = tx.send(respond(&state, request).await).await;
        });
        // Reap finished requests so the set does not grow unbounded.
        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done {
                error!(error = %e, "bridge request task panicked");
            }
        }
    };

    info!("host closed the bridge, finishing in-flight requests");
    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            error!(error = %e, "bridge request task panicked");
        }
    }
    forwarder.abort();
    let _ = forwarder.await;
    drop(out_tx);

    match writer_task.await {
        Ok(written) => written?,
        Err(e) => error!(error = %e, "bridge writer task failed"),
    }
    read_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_token;
    use std::collections::HashMap;
    use tokio::io::AsyncReadExt;

    #[test]
    fn positional_args_from_array_or_value() {
        let req = parse_request(r#"{"id":1,"cmd":"x","args":["a",{"b":1},"ignored"]}"#).unwrap();
        assert_eq!(req.positional(), (Some(json!("a")), Some(json!({ "b": 1 }))));

        let req = parse_request(r#"{"id":"r2","cmd":"x","args":{"page":2}}"#).unwrap();
        assert_eq!(req.positional(), (Some(json!({ "page": 2 })), None));

        let req = parse_request(r#"{"cmd":"x"}"#).unwrap();
        assert_eq!(req.id, Value::Null);
        assert_eq!(req.positional(), (None, None));
    }

    #[test]
    fn malformed_requests_are_rejected() {
        assert!(parse_request("not json").is_err());
        assert!(parse_request(r#"{"id":1}"#).is_err());
        assert!(parse_request(r#"{"id":1,"cmd":"  "}"#).is_err());
    }

    #[test]
    fn response_and_event_shapes() {
        assert_eq!(
            encode_response(&json!(3), Ok(json!([1]))),
            r#"{"id":3,"ok":[1]}"#
        );
        let err: Value =
            serde_json::from_str(&encode_response(&json!("a"), Err("nope".into()))).unwrap();
        assert_eq!(err, json!({ "id": "a", "error": "nope" }));
        let ev: Value = serde_json::from_str(&encode_event(&HostEvent {
            name: "toast".into(),
            payload: json!({ "kind": "success" }),
        }))
        .unwrap();
        assert_eq!(ev["event"], "toast");
        assert_eq!(ev["payload"]["kind"], "success");
    }

    #[tokio::test]
    async fn view_edits_apply_in_receipt_order() {
        let (state, _) = state_with_token(Some("tok"));
        let (_events_tx, events_rx) = broadcast::channel(8);
        let (writer, mut host_side) = tokio::io::duplex(64 * 1024);
        let input: &[u8] = b"{\"id\":1,\"cmd\":\"orders_set_page\",\"args\":[3]}\n\
            {\"id\":2,\"cmd\":\"orders_set_query\",\"args\":[{\"search\":\"atta\"}]}\n\
            {\"id\":3,\"cmd\":\"orders_get_page\"}\n";

        serve_io(Arc::new(state), events_rx, input, writer)
            .await
            .unwrap();

        let mut out = String::new();
        host_side.read_to_string(&mut out).await.unwrap();
        let replies: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let ids: Vec<i64> = replies.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(replies[2]["ok"]["query"]["search"], "atta");
        assert_eq!(replies[2]["ok"]["query"]["page"], 1);
    }

    #[tokio::test]
    async fn serves_until_input_closes() {
        let (state, _) = state_with_token(None);
        let (events_tx, events_rx) = broadcast::channel(8);
        let (writer, mut host_side) = tokio::io::duplex(64 * 1024);
        let input: &[u8] = b"{\"id\":1,\"cmd\":\"orders_get_statuses\"}\n\
            \n\
            {\"id\":2,\"cmd\":\"no_such_command\"}\n\
            garbage\n";

        serve_io(Arc::new(state), events_rx, input, writer)
            .await
            .unwrap();
        drop(events_tx);

        let mut out = String::new();
        host_side.read_to_string(&mut out).await.unwrap();
        let replies: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);

        let by_id: HashMap<String, &Value> = replies
            .iter()
            .map(|r| (r["id"].to_string(), r))
            .collect();
        assert_eq!(by_id["1"]["ok"].as_array().unwrap().len(), 5);
        assert_eq!(by_id["2"]["error"], "Unknown command: no_such_command");
        assert!(by_id["null"]["error"]
            .as_str()
            .unwrap()
            .starts_with("Malformed request"));
    }
}
