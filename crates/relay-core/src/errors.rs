/// Reasons an inbound frame could not be turned into a tagged message.
/// None of these are fatal: the frame is dropped and the session carries on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no string `_type` field")]
    MissingType,
    #[error("unrecognized message type: {0}")]
    UnrecognizedType(String),
}

impl CodecError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::UnrecognizedType(_) => "unrecognized_type",
        }
    }
}

/// A known event tag whose payload did not fit its typed shape.
#[derive(Debug, thiserror::Error)]
#[error("malformed `{tag}` event: {source}")]
pub struct EventDecodeError {
    pub tag: String,
    #[source]
    pub source: serde_json::Error,
}
