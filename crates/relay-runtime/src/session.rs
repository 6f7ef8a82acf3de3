//! One connection running one workflow.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_core::ids::SessionId;
use relay_core::message::{classify, tags, Message, MessageKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::RuntimeConfig;
use crate::correlator::Correlator;
use crate::dispatch;
use crate::error::RuntimeError;
use crate::registry::WorkflowRegistry;
use crate::transport::Transport;

/// Close reason sent when the requested workflow is not registered.
pub const INVALID_WORKFLOW_REASON: &str = "invalid_workflow_name";

/// Tags that also feed a pending call besides being queued as events.
const CONTINUATION_TAGS: [&str; 4] = [tags::PROMPT, tags::PROGRESS, tags::SPEECH, tags::ERROR];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Running = 0,
    Stopping = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Stopping,
            _ => Self::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Closed => "closed",
        }
    }
}

pub(crate) enum QueueEntry {
    Event(Message),
    Stop,
}

pub struct Session {
    id: SessionId,
    workflow: String,
    transport: Arc<dyn Transport>,
    correlator: Correlator,
    queue: mpsc::UnboundedSender<QueueEntry>,
    state: AtomicU8,
    in_callback: AtomicBool,
    stop_reason: Mutex<Option<String>>,
    started_at: DateTime<Utc>,
}

/// A started session and its dispatch task.
pub struct SessionHandle {
    pub session: Arc<Session>,
    pub dispatcher: JoinHandle<()>,
}

impl Session {
    /// Resolve `workflow` and start dispatching. An unknown name closes the
    /// transport and creates nothing.
    pub fn start(
        registry: &WorkflowRegistry,
        workflow: &str,
        transport: Arc<dyn Transport>,
        config: &RuntimeConfig,
    ) -> Result<SessionHandle, RuntimeError> {
        let instance = match registry.instantiate(workflow) {
            Ok(instance) => instance,
            Err(e) => {
                tracing::warn!(workflow, error = %e, "rejecting connection");
                transport.close(INVALID_WORKFLOW_REASON);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: SessionId::new(),
            workflow: workflow.to_owned(),
            transport,
            correlator: Correlator::new(config.response_timeout()),
            queue: tx,
            state: AtomicU8::new(SessionState::Running as u8),
            in_callback: AtomicBool::new(false),
            stop_reason: Mutex::new(None),
            started_at: Utc::now(),
        });

        let span = tracing::info_span!("session", session_id = %session.id, workflow);
        let dispatcher = tokio::spawn(
            dispatch::run(Arc::clone(&session), instance, rx).instrument(span),
        );
        tracing::info!(session_id = %session.id, workflow, "session started");

        Ok(SessionHandle {
            session,
            dispatcher,
        })
    }

    /// Feed one inbound text frame.
    pub fn on_message(&self, raw: &str) {
        let state = self.state();
        if state == SessionState::Closed {
            tracing::trace!(session_id = %self.id, "frame after close ignored");
            return;
        }

        let message = classify(raw);
        match message.kind() {
            MessageKind::Unknown => {}
            MessageKind::Response => {
                self.correlator.route(&message);
            }
            MessageKind::Event => {
                if CONTINUATION_TAGS.iter().any(|tag| message.is_tag(tag)) {
                    self.correlator.route(&message);
                }
                // A stop handler may still be awaiting responses, but no
                // further events are delivered.
                if state != SessionState::Running {
                    tracing::trace!(session_id = %self.id, tag = message.tag(), "event after stop dropped");
                    return;
                }
                let stop_reason = message
                    .is_tag(tags::STOP)
                    .then(|| message.get_str("reason").unwrap_or("stopped").to_owned());
                self.enqueue(QueueEntry::Event(message));
                if let Some(reason) = stop_reason {
                    self.begin_stop(reason);
                }
            }
        }
    }

    /// The peer asked the workflow to stop. The dispatch loop delivers the
    /// stop event and then finishes teardown.
    fn begin_stop(&self, reason: String) {
        if self
            .state
            .compare_exchange(
                SessionState::Running as u8,
                SessionState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }
        tracing::debug!(session_id = %self.id, %reason, "stop event received");
        *self.stop_reason.lock() = Some(reason);

        // A callback blocked on an action would hold the stop event behind
        // it until the idle window ran out.
        if self.in_callback.load(Ordering::SeqCst) {
            self.correlator.stop_all();
        }
    }

    /// Tear the session down: cancel pending calls, end the dispatch loop
    /// after queued events, close the transport. Returns false if it was
    /// already closed.
    pub fn stop(&self, reason: &str) -> bool {
        let previous = self.state.swap(SessionState::Closed as u8, Ordering::SeqCst);
        if previous == SessionState::Closed as u8 {
            return false;
        }
        self.stop_reason
            .lock()
            .get_or_insert_with(|| reason.to_owned());

        let cancelled = self.correlator.stop_all();
        self.enqueue(QueueEntry::Stop);
        self.transport.close(reason);
        tracing::info!(session_id = %self.id, reason, cancelled, "session closed");
        true
    }

    fn enqueue(&self, entry: QueueEntry) {
        if self.queue.send(entry).is_err() {
            tracing::trace!(session_id = %self.id, "dispatch loop already gone");
        }
    }

    /// Mark the dispatch loop busy. Events drained after a stop run with
    /// the pending table already closed; the stop handler itself does not.
    pub(crate) fn enter_callback(&self, is_stop_event: bool) {
        self.in_callback.store(true, Ordering::SeqCst);
        // Pairs with begin_stop: one side always sees the other.
        if !is_stop_event && self.state() != SessionState::Running {
            self.correlator.stop_all();
        }
    }

    pub(crate) fn exit_callback(&self) {
        self.in_callback.store(false, Ordering::SeqCst);
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn pending_calls(&self) -> usize {
        self.correlator.pending_count()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Reason recorded by the first stop, if any.
    pub fn stop_reason(&self) -> Option<String> {
        self.stop_reason.lock().clone()
    }

    pub(crate) fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::Continuation;
    use crate::testing::MockTransport;
    use crate::workflow::Workflow;
    use relay_core::ids::RequestId;

    #[derive(Default)]
    struct Idle;

    impl Workflow for Idle {}

    fn registry() -> WorkflowRegistry {
        let mut registry = WorkflowRegistry::new();
        registry.register_default::<Idle>("idle");
        registry
    }

    #[tokio::test]
    async fn unknown_workflow_closes_transport_without_session() {
        let transport = MockTransport::new();
        let result = Session::start(&registry(), "ghost", transport.clone(), &RuntimeConfig::default());
        assert!(matches!(result, Err(RuntimeError::UnknownWorkflow(_))));
        assert_eq!(transport.close_reasons(), vec![INVALID_WORKFLOW_REASON.to_string()]);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn stop_twice_is_stop_once() {
        let transport = MockTransport::new();
        let handle =
            Session::start(&registry(), "idle", transport.clone(), &RuntimeConfig::default()).unwrap();
        let session = handle.session;

        assert!(session.stop("transport_closed"));
        assert!(!session.stop("transport_closed"));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(transport.close_count(), 1);
        assert_eq!(session.stop_reason().as_deref(), Some("transport_closed"));
        handle.dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn stop_cancels_pending_calls_once() {
        let transport = MockTransport::new();
        let handle =
            Session::start(&registry(), "idle", transport.clone(), &RuntimeConfig::default()).unwrap();
        let session = handle.session;

        let a = session.correlator().open(RequestId::from_raw("aaaaaaaaaaaaaaaa")).unwrap();
        let b = session.correlator().open(RequestId::from_raw("bbbbbbbbbbbbbbbb")).unwrap();
        assert_eq!(session.pending_calls(), 2);

        session.stop("server_shutdown");
        session.stop("server_shutdown");

        let c = session.correlator().clone();
        assert!(c.await_result(a, Continuation::Immediate).await.is_err());
        assert!(c.await_result(b, Continuation::Immediate).await.is_err());
        assert_eq!(session.pending_calls(), 0);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn malformed_frames_change_nothing() {
        let transport = MockTransport::new();
        let handle =
            Session::start(&registry(), "idle", transport.clone(), &RuntimeConfig::default()).unwrap();
        let session = handle.session;

        for raw in ["", "{", "[]", r#"{"_type":"nope"}"#, r#"{"_id":"x"}"#] {
            session.on_message(raw);
        }
        assert!(session.is_running());
        assert_eq!(session.pending_calls(), 0);
        assert_eq!(transport.close_count(), 0);
        session.stop("done");
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::Running.as_str(), "running");
        assert_eq!(SessionState::from_u8(1), SessionState::Stopping);
        assert_eq!(SessionState::from_u8(9), SessionState::Closed);
    }
}
