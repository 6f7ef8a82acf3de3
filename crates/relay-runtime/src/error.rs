use std::time::Duration;

use relay_core::envelope::RequestType;

/// Failures at the session boundary.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("connection {0} already has a session")]
    DuplicateConnection(String),
}

/// Ways a pending call ends without a result.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("session stopped")]
    Stopped,

    #[error("remote error: {0}")]
    Remote(String),

    #[error("request id {0} is already pending")]
    DuplicateRequest(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("send queue full")]
    QueueFull,

    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// What a workflow sees when an action fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("timed out after {0:?} without a response")]
    Timeout(Duration),

    #[error("session stopped")]
    Stopped,

    #[error("remote error: {0}")]
    Remote(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("duplicate request id")]
    DuplicateRequest,

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("response has no `{0}` field")]
    MissingField(&'static str),
}

impl ActionError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Stopped => "stopped",
            Self::Remote(_) => "remote",
            Self::Transport(_) => "transport",
            Self::DuplicateRequest => "duplicate_request",
            Self::Decode(_) => "decode",
            Self::MissingField(_) => "missing_field",
        }
    }

    /// A stopped session is the normal end of in-flight calls, not an anomaly.
    pub(crate) fn log(&self, request: RequestType, request_id: &str) {
        let kind = self.error_kind();
        match self {
            Self::Stopped => {
                tracing::debug!(%request, request_id, kind, "action cancelled by session stop");
            }
            Self::Timeout(_) | Self::Remote(_) => {
                tracing::warn!(%request, request_id, kind, error = %self, "action failed");
            }
            Self::Transport(_) => {
                tracing::error!(%request, request_id, kind, error = %self, "action failed");
            }
            Self::DuplicateRequest | Self::Decode(_) | Self::MissingField(_) => {
                tracing::warn!(%request, request_id, kind, error = %self, "action failed");
            }
        }
    }
}

impl From<CallError> for ActionError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Timeout(d) => Self::Timeout(d),
            CallError::Stopped => Self::Stopped,
            CallError::Remote(msg) => Self::Remote(msg),
            CallError::DuplicateRequest(_) => Self::DuplicateRequest,
        }
    }
}

impl From<TransportError> for ActionError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_errors_map_onto_action_errors() {
        let d = Duration::from_secs(10);
        assert_eq!(ActionError::from(CallError::Timeout(d)), ActionError::Timeout(d));
        assert_eq!(ActionError::from(CallError::Stopped), ActionError::Stopped);
        assert_eq!(
            ActionError::from(CallError::Remote("busy".into())),
            ActionError::Remote("busy".into())
        );
        assert_eq!(
            ActionError::from(CallError::DuplicateRequest("abc".into())),
            ActionError::DuplicateRequest
        );
    }

    #[test]
    fn transport_errors_keep_their_message() {
        let err = ActionError::from(TransportError::QueueFull);
        assert_eq!(err, ActionError::Transport("send queue full".into()));
        assert_eq!(err.error_kind(), "transport");
    }

    #[test]
    fn display_strings() {
        assert_eq!(
            RuntimeError::UnknownWorkflow("nope".into()).to_string(),
            "unknown workflow: nope"
        );
        assert_eq!(ActionError::MissingField("name").to_string(), "response has no `name` field");
    }
}
