use std::sync::Arc;

use relay_core::envelope::{build_request, Envelope, RequestType};
use relay_core::ids::SessionId;
use relay_core::message::Message;
use serde_json::{Map, Value};

use crate::correlator::Continuation;
use crate::error::ActionError;
use crate::session::{Session, SessionState};

/// Handle a workflow uses to act on its session. Cheap to clone, so a
/// callback can hand it to a spawned task.
#[derive(Clone)]
pub struct Relay {
    session: Arc<Session>,
}

impl Relay {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session_id(&self) -> &SessionId {
        self.session.id()
    }

    pub fn workflow_name(&self) -> &str {
        self.session.workflow_name()
    }

    pub fn pending_calls(&self) -> usize {
        self.session.pending_calls()
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.session.state() == SessionState::Closed
    }

    /// Send a request and wait for its result under `policy`.
    ///
    /// `FireAndForget` returns `Ok(None)` once the frame is queued.
    pub async fn invoke(
        &self,
        request_type: RequestType,
        target: Option<&str>,
        fields: Map<String, Value>,
        policy: Continuation,
    ) -> Result<Option<Message>, ActionError> {
        self.send_envelope(request_type, build_request(request_type, target, fields), policy)
            .await
    }

    pub(crate) async fn send_envelope(
        &self,
        request_type: RequestType,
        envelope: Envelope,
        policy: Continuation,
    ) -> Result<Option<Message>, ActionError> {
        let request_id = envelope.id().as_str().to_owned();
        self.exchange(envelope, policy)
            .await
            .inspect_err(|e| e.log(request_type, &request_id))
    }

    async fn exchange(
        &self,
        envelope: Envelope,
        policy: Continuation,
    ) -> Result<Option<Message>, ActionError> {
        let text = envelope
            .to_json()
            .map_err(|e| ActionError::Transport(format!("encode failed: {e}")))?;

        if policy == Continuation::FireAndForget {
            self.session.transport().send(text)?;
            tracing::debug!(request_id = %envelope.id(), wire_type = envelope.wire_type(), "request sent");
            return Ok(None);
        }

        let correlator = self.session.correlator();
        let call = correlator.open(envelope.id().clone())?;
        self.session.transport().send(text)?;
        tracing::debug!(request_id = %envelope.id(), wire_type = envelope.wire_type(), ?policy, "request sent, awaiting result");

        let message = correlator.await_result(call, policy).await?;
        Ok(Some(message))
    }

    pub(crate) fn stop_session(&self, reason: &str) -> bool {
        self.session.stop(reason)
    }
}
