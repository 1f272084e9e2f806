//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the text framing is handled; the backend never sends binary
//! attachments on the admin channel.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError(pub String);

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket protocol error: {}", self.0)
    }
}

impl std::error::Error for ProtocolError {}

/// Body of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

// ---------------------------------------------------------------------------
// Engine.IO
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

pub fn decode_engine(frame: &str) -> Result<EnginePacket, ProtocolError> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ProtocolError("empty engine frame".into()))?;
    let rest = chars.as_str();
    match kind {
        '0' => serde_json::from_str::<Handshake>(rest)
            .map(EnginePacket::Open)
            .map_err(|e| ProtocolError(format!("bad handshake: {e}"))),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => Ok(EnginePacket::Message(rest.to_string())),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(ProtocolError(format!("unknown engine packet type {other:?}"))),
    }
}

pub fn encode_engine(packet: &EnginePacket) -> String {
    match packet {
        // Clients never send `open`; encode it for completeness of the codec.
        EnginePacket::Open(h) => format!(
            "0{}",
            serde_json::json!({
                "sid": h.sid,
                "upgrades": h.upgrades,
                "pingInterval": h.ping_interval,
                "pingTimeout": h.ping_timeout,
            })
        ),
        EnginePacket::Close => "1".to_string(),
        EnginePacket::Ping(data) => format!("2{data}"),
        EnginePacket::Pong(data) => format!("3{data}"),
        EnginePacket::Message(data) => format!("4{data}"),
        EnginePacket::Upgrade => "5".to_string(),
        EnginePacket::Noop => "6".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Socket.IO
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

/// Split `[/nsp,][ackId]json` after the type digit.
fn split_header(rest: &str) -> (String, Option<u64>, &str) {
    let (namespace, rest) = if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
            None => (rest.to_string(), ""),
        }
    } else {
        ("/".to_string(), rest)
    };

    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let ack_id = if digits > 0 {
        rest[..digits].parse::<u64>().ok()
    } else {
        None
    };
    (namespace, ack_id, &rest[digits..])
}

fn parse_optional_json(body: &str) -> Result<Option<Value>, ProtocolError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| ProtocolError(format!("bad packet json: {e}")))
}

pub fn decode_socket(payload: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = payload.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ProtocolError("empty socket packet".into()))?;
    let (namespace, ack_id, body) = split_header(chars.as_str());

    match kind {
        '0' => Ok(SocketPacket::Connect {
            namespace,
            data: parse_optional_json(body)?,
        }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' | '3' => {
            let args = match parse_optional_json(body)? {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(ProtocolError(format!(
                        "event payload is not an array: {other}"
                    )))
                }
                None => Vec::new(),
            };
            if kind == '3' {
                let ack_id =
                    ack_id.ok_or_else(|| ProtocolError("ack packet without id".into()))?;
                return Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args,
                });
            }
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => return Err(ProtocolError("event without a name".into())),
            };
            Ok(SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args: args.collect(),
            })
        }
        '4' => Ok(SocketPacket::ConnectError {
            namespace,
            data: parse_optional_json(body)?,
        }),
        '5' | '6' => Err(ProtocolError("binary packets are not supported".into())),
        other => Err(ProtocolError(format!("unknown socket packet type {other:?}"))),
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == "/" || namespace.is_empty() {
        String::new()
    } else {
        format!("{namespace},")
    }
}

/// Socket.IO packet wrapped in an Engine.IO message, ready for the wire.
pub fn encode_socket(packet: &SocketPacket) -> String {
    let inner = match packet {
        SocketPacket::Connect { namespace, data } => format!(
            "0{}{}",
            namespace_prefix(namespace),
            data.as_ref().map(Value::to_string).unwrap_or_default()
        ),
        SocketPacket::Disconnect { namespace } => format!("1{}", namespace_prefix(namespace)),
        SocketPacket::Event {
            namespace,
            ack_id,
            name,
            args,
        } => {
            let mut all = Vec::with_capacity(args.len() + 1);
            all.push(Value::String(name.clone()));
            all.extend(args.iter().cloned());
            format!(
                "2{}{}{}",
                namespace_prefix(namespace),
                ack_id.map(|id| id.to_string()).unwrap_or_default(),
                Value::Array(all)
            )
        }
        SocketPacket::Ack {
            namespace,
            ack_id,
            args,
        } => format!(
            "3{}{}{}",
            namespace_prefix(namespace),
            ack_id,
            Value::Array(args.clone())
        ),
        SocketPacket::ConnectError { namespace, data } => format!(
            "4{}{}",
            namespace_prefix(namespace),
            data.as_ref().map(Value::to_string).unwrap_or_default()
        ),
    };
    encode_engine(&EnginePacket::Message(inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let frame = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match decode_engine(frame).expect("open") {
            EnginePacket::Open(h) => {
                assert_eq!(h.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(h.ping_interval, 25000);
                assert_eq!(h.max_payload, Some(1_000_000));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn ping_is_answered_with_matching_pong() {
        assert_eq!(decode_engine("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(encode_engine(&EnginePacket::Pong(String::new())), "3");
        assert_eq!(encode_engine(&EnginePacket::Pong("probe".into())), "3probe");
    }

    #[test]
    fn decodes_order_updated_event() {
        let frame = r#"42["order-updated",{"orderId":"a","status":"Packed"}]"#;
        let message = match decode_engine(frame).unwrap() {
            EnginePacket::Message(m) => m,
            other => panic!("unexpected packet {other:?}"),
        };
        match decode_socket(&message).unwrap() {
            SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                assert_eq!(namespace, "/");
                assert_eq!(ack_id, None);
                assert_eq!(name, "order-updated");
                assert_eq!(args, vec![json!({ "orderId": "a", "status": "Packed" })]);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn decodes_namespace_and_ack_id() {
        let packet = decode_socket(r#"2/admin,17["new-order",{"_id":"x"}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/admin".into(),
                ack_id: Some(17),
                name: "new-order".into(),
                args: vec![json!({ "_id": "x" })],
            }
        );
    }

    #[test]
    fn connect_packets() {
        assert_eq!(
            decode_socket(r#"0{"sid":"abc"}"#).unwrap(),
            SocketPacket::Connect {
                namespace: "/".into(),
                data: Some(json!({ "sid": "abc" })),
            }
        );
        let out = encode_socket(&SocketPacket::Connect {
            namespace: "/".into(),
            data: Some(json!({ "token": "t" })),
        });
        assert_eq!(out, r#"40{"token":"t"}"#);
        assert_eq!(
            encode_socket(&SocketPacket::Disconnect {
                namespace: "/admin".into()
            }),
            "41/admin,"
        );
    }

    #[test]
    fn rejects_malformed_packets() {
        assert!(decode_engine("").is_err());
        assert!(decode_engine("9").is_err());
        assert!(decode_socket(r#"2{"not":"array"}"#).is_err());
        assert!(decode_socket("2[42]").is_err());
        assert!(decode_socket("51-[\"x\",{}]").is_err());
    }
}
