//! Connection-level entry points for a transport.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use relay_core::ids::{ConnectionId, SessionId};
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::registry::WorkflowRegistry;
use crate::session::{Session, SessionHandle};
use crate::transport::Transport;

/// Owns every live session, keyed by the connection that carries it.
pub struct Runtime {
    registry: Arc<WorkflowRegistry>,
    config: RuntimeConfig,
    sessions: DashMap<ConnectionId, SessionHandle>,
}

impl Runtime {
    pub fn new(registry: Arc<WorkflowRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Bind a new connection to a fresh instance of `workflow`.
    pub fn on_connection_open(
        &self,
        conn_id: ConnectionId,
        workflow: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<SessionId, RuntimeError> {
        if self.sessions.contains_key(&conn_id) {
            transport.close("duplicate_connection");
            return Err(RuntimeError::DuplicateConnection(conn_id.to_string()));
        }
        let handle = Session::start(&self.registry, workflow, transport, &self.config)?;
        let session_id = handle.session.id().clone();
        tracing::debug!(client_id = %conn_id, %session_id, workflow, "connection bound");
        self.sessions.insert(conn_id, handle);
        Ok(session_id)
    }

    pub fn on_message(&self, conn_id: &ConnectionId, text: &str) {
        match self.session(conn_id) {
            Some(session) => session.on_message(text),
            None => tracing::trace!(client_id = %conn_id, "frame for unknown connection"),
        }
    }

    /// Stop the connection's session and hand back its dispatch task.
    pub fn on_connection_closed(
        &self,
        conn_id: &ConnectionId,
        reason: &str,
    ) -> Option<JoinHandle<()>> {
        let (_, handle) = self.sessions.remove(conn_id)?;
        handle.session.stop(reason);
        Some(handle.dispatcher)
    }

    pub fn session(&self, conn_id: &ConnectionId) -> Option<Arc<Session>> {
        self.sessions.get(conn_id).map(|h| Arc::clone(&h.session))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Stop every session, then wait up to `grace` in total for their
    /// dispatch loops. Returns how many sessions were stopped.
    pub async fn shutdown_all(&self, reason: &str, grace: Duration) -> usize {
        let ids: Vec<ConnectionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut dispatchers = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(dispatcher) = self.on_connection_closed(id, reason) {
                dispatchers.push(dispatcher);
            }
        }

        let stopped = dispatchers.len();
        let drain = futures::future::join_all(dispatchers);
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!(?grace, "dispatch loops did not finish in time");
        }
        tracing::info!(stopped, reason, "all sessions stopped");
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use relay_core::events::{ButtonEvent, StartEvent};
    use tokio::time::Instant;

    use crate::relay::Relay;
    use crate::testing::MockTransport;
    use crate::workflow::Workflow;

    /// Counts presses in per-instance state.
    struct Counter {
        presses: usize,
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Workflow for Counter {
        async fn on_button(&mut self, _relay: &Relay, _event: ButtonEvent) {
            self.presses += 1;
            self.seen.fetch_max(self.presses, Ordering::SeqCst);
        }
    }

    fn runtime(seen: &Arc<AtomicUsize>) -> Runtime {
        let mut registry = WorkflowRegistry::new();
        let seen = Arc::clone(seen);
        registry.register("counter", move || {
            Box::new(Counter {
                presses: 0,
                seen: Arc::clone(&seen),
            })
        });
        Runtime::new(Arc::new(registry), RuntimeConfig::default())
    }

    const PRESS: &str = r#"{"_type":"wf_api_button_event","button":"action","taps":"single"}"#;

    #[tokio::test]
    async fn sessions_do_not_share_workflow_state() {
        let seen = Arc::new(AtomicUsize::new(0));
        let rt = runtime(&seen);
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        rt.on_connection_open(a.clone(), "counter", MockTransport::new()).unwrap();
        rt.on_connection_open(b.clone(), "counter", MockTransport::new()).unwrap();
        assert_eq!(rt.session_count(), 2);

        for conn in [&a, &b, &a, &b] {
            rt.on_message(conn, PRESS);
        }
        for conn in [&a, &b] {
            rt.on_connection_closed(conn, "transport_closed").unwrap().await.unwrap();
        }

        // Each instance counted only its own two presses.
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(rt.session_count(), 0);
    }

    #[tokio::test]
    async fn unknown_workflow_is_rejected_without_affecting_others() {
        let seen = Arc::new(AtomicUsize::new(0));
        let rt = runtime(&seen);
        let good = ConnectionId::new();
        rt.on_connection_open(good.clone(), "counter", MockTransport::new()).unwrap();

        let bad_transport = MockTransport::new();
        let err = rt
            .on_connection_open(ConnectionId::new(), "nope", bad_transport.clone())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownWorkflow(_)));
        assert_eq!(bad_transport.close_count(), 1);
        assert_eq!(rt.session_count(), 1);
        assert!(rt.session(&good).unwrap().is_running());
    }

    #[tokio::test]
    async fn duplicate_connection_is_refused() {
        let seen = Arc::new(AtomicUsize::new(0));
        let rt = runtime(&seen);
        let conn = ConnectionId::new();
        rt.on_connection_open(conn.clone(), "counter", MockTransport::new()).unwrap();
        let second = MockTransport::new();
        assert!(matches!(
            rt.on_connection_open(conn, "counter", second.clone()),
            Err(RuntimeError::DuplicateConnection(_))
        ));
        assert_eq!(second.close_count(), 1);
    }

    #[tokio::test]
    async fn closing_unknown_connection_is_a_no_op() {
        let seen = Arc::new(AtomicUsize::new(0));
        let rt = runtime(&seen);
        let ghost = ConnectionId::new();
        rt.on_message(&ghost, PRESS);
        assert!(rt.on_connection_closed(&ghost, "gone").is_none());
    }

    #[tokio::test]
    async fn shutdown_all_stops_every_session() {
        let seen = Arc::new(AtomicUsize::new(0));
        let rt = runtime(&seen);
        let transports: Vec<_> = (0..3).map(|_| MockTransport::new()).collect();
        for t in &transports {
            rt.on_connection_open(ConnectionId::new(), "counter", t.clone()).unwrap();
        }

        let stopped = rt.shutdown_all("server_shutdown", Duration::from_secs(1)).await;
        assert_eq!(stopped, 3);
        assert_eq!(rt.session_count(), 0);
        for t in &transports {
            assert_eq!(t.close_reasons(), vec!["server_shutdown".to_string()]);
        }
    }

    /// Never returns from `on_start`.
    #[derive(Default)]
    struct Stuck;

    #[async_trait]
    impl Workflow for Stuck {
        async fn on_start(&mut self, _relay: &Relay, _event: StartEvent) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_all_waits_one_grace_period_in_total() {
        let mut registry = WorkflowRegistry::new();
        registry.register_default::<Stuck>("stuck");
        let rt = Runtime::new(Arc::new(registry), RuntimeConfig::default());
        for _ in 0..3 {
            let conn = ConnectionId::new();
            rt.on_connection_open(conn.clone(), "stuck", MockTransport::new()).unwrap();
            rt.on_message(&conn, r#"{"_type":"wf_api_start_event"}"#);
        }
        tokio::task::yield_now().await;

        let began = Instant::now();
        let stopped = rt.shutdown_all("server_shutdown", Duration::from_secs(5)).await;
        assert_eq!(stopped, 3);
        let waited = began.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6), "{waited:?}");
    }
}
