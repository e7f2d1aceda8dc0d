//! WAMP-like frame codec for the local API event bus.
//!
//! Frames are JSON arrays of the shape `[opcode, topic, payload]`. Inbound
//! arrays are decoded into an [`ApiEvent`] right here so nothing past this
//! module ever handles a raw heterogeneous array.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

pub const OPCODE_SUBSCRIBE: u8 = 5;
pub const OPCODE_UNSUBSCRIBE: u8 = 6;
pub const OPCODE_EVENT: u8 = 8;

/// Topic prefix for JSON API change notifications.
pub const EVENT_PREFIX: &str = "OnJsonApiEvent";

// ── EventType ────────────────────────────────────────────────────────

/// Change kind carried by an event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Create,
    Update,
    Delete,
    Unknown,
}

impl EventType {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "Create" => Self::Create,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            _ => Self::Unknown,
        }
    }

    /// Numeric code: `Create = 0`, `Update = 1`, `Delete = 2`, anything else `-1`.
    pub fn code(self) -> i8 {
        match self {
            Self::Create => 0,
            Self::Update => 1,
            Self::Delete => 2,
            Self::Unknown => -1,
        }
    }
}

// ── ApiEvent ─────────────────────────────────────────────────────────

/// A decoded event frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiEvent {
    pub topic: String,
    pub uri: String,
    pub event_type: EventType,
    pub data: Value,
}

#[derive(Deserialize)]
struct RawPayload {
    uri: String,
    #[serde(rename = "eventType", default)]
    event_type: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame.
///
/// * `Ok(Some(event))` — an event frame (`[8, topic, {uri, eventType, data}]`).
/// * `Ok(None)` — well-formed but not an event (welcome, call results, short arrays).
/// * `Err(Error::Protocol)` — not a JSON array, or an event frame with a bad payload.
pub fn decode_frame(text: &str) -> Result<Option<ApiEvent>, Error> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| Error::Protocol(format!("invalid JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(Error::Protocol("frame is not an array".into()));
    };

    let is_event = items
        .first()
        .and_then(Value::as_u64)
        .is_some_and(|op| op == u64::from(OPCODE_EVENT));
    if !is_event || items.len() < 3 {
        return Ok(None);
    }

    let mut items = items.into_iter();
    let _opcode = items.next();
    let topic = items
        .next()
        .and_then(|t| t.as_str().map(str::to_owned))
        .unwrap_or_default();
    let payload = items.next().unwrap_or(Value::Null);
    if !payload.is_object() {
        return Err(Error::Protocol("event payload is not an object".into()));
    }

    let raw: RawPayload = serde_json::from_value(payload)
        .map_err(|e| Error::Protocol(format!("event payload: {e}")))?;

    Ok(Some(ApiEvent {
        topic,
        uri: raw.uri,
        event_type: raw
            .event_type
            .as_deref()
            .map_or(EventType::Unknown, EventType::from_wire),
        data: raw.data,
    }))
}

/// Topic for a subscription path: `/lol-summoner/v1/x` → `OnJsonApiEvent_lol-summoner_v1_x`.
/// An empty path (or `/`) subscribes to every JSON API event.
pub fn topic_for(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return EVENT_PREFIX.to_owned();
    }
    format!("{EVENT_PREFIX}{}", trimmed.replace('/', "_"))
}

pub fn subscribe_frame(path: &str) -> String {
    serde_json::json!([OPCODE_SUBSCRIBE, topic_for(path)]).to_string()
}

/// Unsubscribe takes the bare path, not the event topic.
pub fn unsubscribe_frame(path: &str) -> String {
    serde_json::json!([OPCODE_UNSUBSCRIBE, path]).to_string()
}
