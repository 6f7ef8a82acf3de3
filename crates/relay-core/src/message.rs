//! Inbound frame classification.
//!
//! Every inbound frame carries a `_type` of the form `wf_api_<tag>_event` or
//! `wf_api_<tag>_response`. The two vocabularies share the field, so a frame
//! is classified by which pattern matches, and the tag is the captured middle.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::CodecError;

static EVENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^wf_api_(\w+)_event$").expect("event pattern compiles"));

static RESPONSE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^wf_api_(\w+)_response$").expect("response pattern compiles"));

/// Fields that may carry the correlation id, highest priority first.
pub const CORRELATION_FIELDS: [&str; 3] = ["_id", "id", "request_id"];

/// Name of the declared-type field on every frame.
pub const TYPE_FIELD: &str = "_type";

/// Tags with special meaning to the correlator and session.
pub mod tags {
    pub const PROMPT: &str = "prompt";
    pub const PROGRESS: &str = "progress";
    pub const ERROR: &str = "error";
    pub const SPEECH: &str = "speech";
    pub const STOP: &str = "stop";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Event,
    Response,
    Unknown,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Response => "response",
            Self::Unknown => "unknown",
        }
    }
}

/// One parsed inbound frame.
#[derive(Clone, Debug)]
pub struct Message {
    payload: Map<String, Value>,
    kind: MessageKind,
    wire_type: Option<String>,
    tag: String,
    correlation_id: Option<String>,
}

impl Message {
    /// Parse a raw frame, reporting why it could not be classified.
    pub fn parse(raw: &str) -> Result<Self, CodecError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
        let Value::Object(payload) = value else {
            return Err(CodecError::NotAnObject);
        };
        Self::from_payload(payload)
    }

    /// Classify an already-decoded JSON object.
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self, CodecError> {
        let wire_type = payload
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingType)?
            .to_owned();

        let (kind, tag) = if let Some(caps) = EVENT_PATTERN.captures(&wire_type) {
            (MessageKind::Event, caps[1].to_owned())
        } else if let Some(caps) = RESPONSE_PATTERN.captures(&wire_type) {
            (MessageKind::Response, caps[1].to_owned())
        } else {
            return Err(CodecError::UnrecognizedType(wire_type));
        };

        let correlation_id = extract_correlation_id(&payload);
        Ok(Self {
            payload,
            kind,
            wire_type: Some(wire_type),
            tag,
            correlation_id,
        })
    }

    /// A message that matched nothing. Carries no state and routes nowhere.
    pub fn unknown() -> Self {
        Self {
            payload: Map::new(),
            kind: MessageKind::Unknown,
            wire_type: None,
            tag: String::new(),
            correlation_id: None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Semantic tag, e.g. `start`, `prompt`, `say`. Empty for unknown frames.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The declared `_type` exactly as received.
    pub fn wire_type(&self) -> Option<&str> {
        self.wire_type.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn is_event(&self) -> bool {
        self.kind == MessageKind::Event
    }

    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }

    pub fn is_tag(&self, tag: &str) -> bool {
        self.kind != MessageKind::Unknown && self.tag == tag
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Decode the whole payload into a typed shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }
}

/// Classify a raw frame. Never fails: anything that cannot be classified
/// comes back as [`MessageKind::Unknown`].
pub fn classify(raw: &str) -> Message {
    match Message::parse(raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, kind = e.error_kind(), "dropping unclassifiable frame");
            Message::unknown()
        }
    }
}

fn extract_correlation_id(payload: &Map<String, Value>) -> Option<String> {
    CORRELATION_FIELDS
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}
