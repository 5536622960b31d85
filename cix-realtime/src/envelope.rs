//! Wire envelope codec.
//!
//! Every frame on the update channel is one JSON object:
//! `{ "id", "timestamp", "type", "data", ...extra }`. Inbound frames are
//! decoded into a tagged [`Payload`] keyed by `type`; the reserved types get
//! typed variants and everything else stays an opaque application event.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cix_core::constants::message_type;
use cix_core::error::{CixError, CixResult};

/// Top-level keys owned by the envelope itself; never taken from `extra`.
const ENVELOPE_KEYS: &[&str] = &["id", "timestamp", "type", "data"];

/// On-the-wire shape of an envelope.
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// One discrete message exchanged over the persistent connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Correlation id. Always set on outbound envelopes; optional inbound.
    pub id: Option<String>,
    /// ISO-8601 creation time. Always set on outbound envelopes; optional inbound.
    pub timestamp: Option<String>,
    /// Typed payload.
    pub payload: Payload,
    /// Additional top-level fields (e.g. `channels`, `request_id`).
    pub extra: Map<String, Value>,
}

/// Payload of an envelope, tagged by its `type` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Client keepalive (`ping`).
    Ping(Value),
    /// Server keepalive acknowledgement (`pong`); discarded on receipt.
    Pong,
    /// Protocol-level error reported by the server (`error`).
    Error(ErrorMessage),
    /// User-facing notification (`notification`).
    Notification(NotificationPayload),
    /// Data-synchronization change on a named collection (`sync`).
    Sync(SyncMessage),
    /// Any application-defined event type (`threat`, `alert`, ...).
    Event {
        /// The `type` string as received or sent.
        event_type: String,
        /// Opaque payload owned by the consumer.
        data: Value,
    },
}

/// Body of an `error` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    /// Human-readable error text.
    pub message: String,
    /// The raw `data` value, for subscribers that want more than the text.
    pub data: Value,
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    /// Parse a level string; unrecognized levels are treated as `Info`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a `notification` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub level: NotificationLevel,
    pub title: String,
    pub content: String,
    /// Optional action descriptor, passed through untouched.
    pub action: Option<Value>,
}

/// Kind of change carried by a `sync` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Body of a `sync` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMessage {
    /// Logical data set affected (e.g. `threats`).
    pub collection: String,
    pub operation: SyncOperation,
    /// The affected record for create/update, or its identifier for delete.
    pub data: Value,
}

impl Payload {
    /// The wire `type` string for this payload.
    pub fn kind(&self) -> &str {
        match self {
            Self::Ping(_) => message_type::PING,
            Self::Pong => message_type::PONG,
            Self::Error(_) => message_type::ERROR,
            Self::Notification(_) => message_type::NOTIFICATION,
            Self::Sync(_) => message_type::SYNC,
            Self::Event { event_type, .. } => event_type,
        }
    }

    /// The wire `data` value for this payload.
    fn to_data(&self) -> Value {
        match self {
            Self::Ping(data) => data.clone(),
            Self::Pong => Value::Object(Map::new()),
            Self::Error(err) => {
                let mut data = match &err.data {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                data.insert("error".into(), Value::String(err.message.clone()));
                Value::Object(data)
            }
            Self::Notification(n) => serde_json::json!({
                "level": n.level.as_str(),
                "title": n.title,
                "content": n.content,
                "action": n.action,
            }),
            Self::Sync(s) => serde_json::json!({
                "collection": s.collection,
                "operation": s.operation.as_str(),
                "data": s.data,
            }),
            Self::Event { data, .. } => data.clone(),
        }
    }

    /// Build the payload for an outbound envelope of the given type.
    fn outbound(kind: &str, data: Value) -> Self {
        if kind == message_type::PING {
            Self::Ping(data)
        } else {
            Self::Event {
                event_type: kind.to_string(),
                data,
            }
        }
    }
}

impl Envelope {
    /// Create an outbound envelope, stamping a fresh id and timestamp.
    ///
    /// Keys in `extra` that collide with the envelope's own fields are dropped.
    pub fn outbound(kind: &str, data: Value, mut extra: Map<String, Value>) -> Self {
        for key in ENVELOPE_KEYS {
            extra.remove(*key);
        }
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            payload: Payload::outbound(kind, data),
            extra,
        }
    }

    /// The wire `type` string.
    pub fn kind(&self) -> &str {
        self.payload.kind()
    }

    /// Encode to a JSON text frame.
    pub fn encode(&self) -> CixResult<String> {
        let wire = WireEnvelope {
            id: self.id.clone(),
            timestamp: self.timestamp.clone(),
            kind: self.kind().to_string(),
            data: Some(self.payload.to_data()),
            extra: self.extra.clone(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decode a JSON text frame.
    ///
    /// Fails with `CixError::Decode` when the frame is not a JSON object with
    /// a string `type`, or when a reserved type's payload is malformed.
    pub fn decode(text: &str) -> CixResult<Self> {
        let wire: WireEnvelope = serde_json::from_str(text)
            .map_err(|e| CixError::Decode(format!("malformed envelope: {e}")))?;

        let payload = match wire.kind.as_str() {
            message_type::PING => Payload::Ping(wire.data.unwrap_or(Value::Null)),
            message_type::PONG => Payload::Pong,
            message_type::ERROR => Payload::Error(decode_error(wire.data, &wire.extra)),
            message_type::NOTIFICATION => {
                Payload::Notification(decode_notification(wire.data, &wire.extra)?)
            }
            message_type::SYNC => Payload::Sync(decode_sync(wire.data)?),
            other => Payload::Event {
                event_type: other.to_string(),
                // Server-side events may carry their body as top-level fields.
                data: wire
                    .data
                    .unwrap_or_else(|| Value::Object(wire.extra.clone())),
            },
        };

        Ok(Self {
            id: wire.id,
            timestamp: wire.timestamp,
            payload,
            extra: wire.extra,
        })
    }
}

fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn decode_error(data: Option<Value>, extra: &Map<String, Value>) -> ErrorMessage {
    let data = data.unwrap_or(Value::Null);
    let message = match &data {
        Value::Object(map) => str_field(map, "error").or_else(|| str_field(map, "message")),
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
    .or_else(|| str_field(extra, "message"))
    .unwrap_or("unknown server error")
    .to_string();

    ErrorMessage { message, data }
}

fn decode_notification(
    data: Option<Value>,
    extra: &Map<String, Value>,
) -> CixResult<NotificationPayload> {
    let body = match data {
        Some(Value::Object(map)) => map,
        None => extra.clone(),
        Some(other) => {
            return Err(CixError::Decode(format!(
                "notification data must be an object, got {other}"
            )))
        }
    };

    Ok(NotificationPayload {
        level: NotificationLevel::parse(str_field(&body, "level").unwrap_or("info")),
        title: str_field(&body, "title").unwrap_or_default().to_string(),
        content: str_field(&body, "content")
            .or_else(|| str_field(&body, "message"))
            .unwrap_or_default()
            .to_string(),
        action: body.get("action").filter(|v| !v.is_null()).cloned(),
    })
}

fn decode_sync(data: Option<Value>) -> CixResult<SyncMessage> {
    let Some(Value::Object(mut body)) = data else {
        return Err(CixError::Decode("sync envelope without object data".into()));
    };

    let collection = str_field(&body, "collection")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CixError::Decode("sync envelope missing collection".into()))?
        .to_string();
    let operation = str_field(&body, "operation")
        .and_then(SyncOperation::parse)
        .ok_or_else(|| CixError::Decode(format!("sync envelope for {collection} has no valid operation")))?;

    Ok(SyncMessage {
        collection,
        operation,
        data: body.remove("data").unwrap_or(Value::Null),
    })
}
