//! Pairs outbound requests with the messages that answer them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_core::ids::RequestId;
use relay_core::message::{tags, Message};
use tokio::sync::mpsc;

use crate::error::CallError;

/// How a pending request decides it is finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Continuation {
    /// The first qualifying message is the result.
    Immediate,
    /// The first qualifying message is held back. The call resolves on the
    /// next non-progress message, or with the held message when a `prompt`
    /// of type `stopped` arrives. `say_and_wait` relies on the second form,
    /// `listen` on the first.
    WaitForFollowUp,
    /// Send and return. Never registered here.
    FireAndForget,
}

/// What a pending call can receive.
#[derive(Clone, Debug)]
pub enum Delivery {
    Message(Message),
    Stopped,
}

struct Table {
    pending: DashMap<String, mpsc::UnboundedSender<Delivery>>,
    closed: AtomicBool,
}

/// Pending-call table for one session.
#[derive(Clone)]
pub struct Correlator {
    table: Arc<Table>,
    idle_timeout: Duration,
}

/// A registered request awaiting its result. Dropping it removes the
/// table entry, whichever way the wait ended.
pub struct PendingCall {
    id: RequestId,
    rx: mpsc::UnboundedReceiver<Delivery>,
    table: Arc<Table>,
}

impl PendingCall {
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.table.pending.remove(self.id.as_str());
    }
}

impl Correlator {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            table: Arc::new(Table {
                pending: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Register a request id. Must happen before the request is sent so an
    /// early response cannot slip past.
    pub fn open(&self, id: RequestId) -> Result<PendingCall, CallError> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.table.pending.entry(id.as_str().to_owned()) {
            Entry::Occupied(_) => return Err(CallError::DuplicateRequest(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        let call = PendingCall {
            id,
            rx,
            table: Arc::clone(&self.table),
        };
        // Checked after the insert: a concurrent stop_all either sees this
        // entry or we see its flag.
        if self.table.closed.load(Ordering::SeqCst) {
            return Err(CallError::Stopped);
        }
        Ok(call)
    }

    /// Hand a message to the call it correlates with.
    pub fn route(&self, message: &Message) -> bool {
        let Some(id) = message.correlation_id() else {
            return false;
        };
        match self.table.pending.get(id) {
            Some(tx) => tx.send(Delivery::Message(message.clone())).is_ok(),
            None => {
                tracing::trace!(request_id = id, tag = message.tag(), "no pending call for message");
                false
            }
        }
    }

    /// Wait until the call resolves under `policy`.
    pub async fn await_result(
        &self,
        mut call: PendingCall,
        policy: Continuation,
    ) -> Result<Message, CallError> {
        let mut held: Option<Message> = None;
        loop {
            let message = match tokio::time::timeout(self.idle_timeout, call.rx.recv()).await {
                Err(_) => {
                    tracing::debug!(request_id = %call.id, "no response within idle window");
                    return Err(CallError::Timeout(self.idle_timeout));
                }
                Ok(None) | Ok(Some(Delivery::Stopped)) => return Err(CallError::Stopped),
                Ok(Some(Delivery::Message(message))) => message,
            };

            if message.is_tag(tags::PROMPT) {
                if policy == Continuation::WaitForFollowUp
                    && message.get_str("type") == Some("stopped")
                {
                    if let Some(result) = held.take() {
                        return Ok(result);
                    }
                }
                continue;
            }
            if message.is_tag(tags::PROGRESS) {
                continue;
            }
            if held.is_some() {
                return Ok(message);
            }
            if message.is_tag(tags::ERROR) {
                return Err(CallError::Remote(remote_error_text(&message)));
            }
            match policy {
                Continuation::WaitForFollowUp => held = Some(message),
                Continuation::Immediate | Continuation::FireAndForget => return Ok(message),
            }
        }
    }

    /// Unblock every pending call with `Stopped` and refuse new ones.
    /// Returns how many calls were signalled; zero on repeat calls.
    pub fn stop_all(&self) -> usize {
        if self.table.closed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let mut signalled = 0;
        for entry in self.table.pending.iter() {
            if entry.value().send(Delivery::Stopped).is_ok() {
                signalled += 1;
            }
        }
        signalled
    }

    pub fn is_stopped(&self) -> bool {
        self.table.closed.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.table.pending.len()
    }
}

fn remote_error_text(message: &Message) -> String {
    ["error", "message", "reason"]
        .iter()
        .find_map(|key| message.get_str(key))
        .map(str::to_owned)
        .unwrap_or_else(|| serde_json::Value::Object(message.payload().clone()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::message::classify;

    const WINDOW: Duration = Duration::from_secs(10);

    fn response(tag: &str, id: &str) -> Message {
        classify(&format!(r#"{{"_type":"wf_api_{tag}_response","_id":"{id}"}}"#))
    }

    fn event(raw: &str) -> Message {
        classify(raw)
    }

    #[tokio::test]
    async fn immediate_returns_first_response() {
        let c = Correlator::new(WINDOW);
        let call = c.open(RequestId::from_raw("aaaaaaaaaaaaaaaa")).unwrap();
        assert!(c.route(&response("say", "aaaaaaaaaaaaaaaa")));
        let msg = c.await_result(call, Continuation::Immediate).await.unwrap();
        assert_eq!(msg.tag(), "say");
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_open_is_rejected_and_original_survives() {
        let c = Correlator::new(WINDOW);
        let first = c.open(RequestId::from_raw("a")).unwrap();
        let err = c.open(RequestId::from_raw("a")).err().unwrap();
        assert_eq!(err, CallError::DuplicateRequest("a".into()));
        assert_eq!(c.pending_count(), 1);
        drop(first);
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn unmatched_messages_are_discarded() {
        let c = Correlator::new(WINDOW);
        let _call = c.open(RequestId::from_raw("a")).unwrap();
        assert!(!c.route(&response("say", "b")));
        assert!(!c.route(&event(r#"{"_type":"wf_api_button_event"}"#)));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_and_clears_entry() {
        let c = Correlator::new(WINDOW);
        let call = c.open(RequestId::from_raw("a")).unwrap();
        let started = tokio::time::Instant::now();
        let err = c.await_result(call, Continuation::Immediate).await.unwrap_err();
        assert_eq!(err, CallError::Timeout(WINDOW));
        assert!(started.elapsed() >= WINDOW);
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_resets_the_idle_window() {
        let c = Correlator::new(WINDOW);
        let call = c.open(RequestId::from_raw("a")).unwrap();
        let router = c.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(9)).await;
            router.route(&event(r#"{"_type":"wf_api_progress_event","_id":"a"}"#));
            tokio::time::sleep(Duration::from_secs(9)).await;
            router.route(&response("listen", "a"));
            tokio::time::sleep(Duration::from_secs(9)).await;
            router.route(&event(r#"{"_type":"wf_api_speech_event","request_id":"a","text":"yes"}"#));
        });
        let msg = c.await_result(call, Continuation::WaitForFollowUp).await.unwrap();
        assert_eq!(msg.tag(), "speech");
        assert_eq!(msg.get_str("text"), Some("yes"));
    }

    #[tokio::test]
    async fn follow_up_returns_held_response_on_prompt_stopped() {
        let c = Correlator::new(WINDOW);
        let call = c.open(RequestId::from_raw("a")).unwrap();
        c.route(&response("say", "a"));
        c.route(&event(r#"{"_type":"wf_api_prompt_event","id":"a","type":"started"}"#));
        c.route(&event(r#"{"_type":"wf_api_prompt_event","id":"a","type":"stopped"}"#));
        let msg = c.await_result(call, Continuation::WaitForFollowUp).await.unwrap();
        assert_eq!(msg.tag(), "say");
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_stopped_before_response_is_ignored() {
        let c = Correlator::new(WINDOW);
        let call = c.open(RequestId::from_raw("a")).unwrap();
        c.route(&event(r#"{"_type":"wf_api_prompt_event","id":"a","type":"stopped"}"#));
        let err = c.await_result(call, Continuation::WaitForFollowUp).await.unwrap_err();
        assert_eq!(err, CallError::Timeout(WINDOW));
    }

    #[tokio::test]
    async fn immediate_ignores_prompts() {
        let c = Correlator::new(WINDOW);
        let call = c.open(RequestId::from_raw("a")).unwrap();
        c.route(&event(r#"{"_type":"wf_api_prompt_event","id":"a","type":"stopped"}"#));
        c.route(&response("say", "a"));
        let msg = c.await_result(call, Continuation::Immediate).await.unwrap();
        assert_eq!(msg.tag(), "say");
    }

    #[tokio::test]
    async fn error_is_a_remote_failure() {
        let c = Correlator::new(WINDOW);
        let call = c.open(RequestId::from_raw("a")).unwrap();
        c.route(&classify(r#"{"_type":"wf_api_error_response","_id":"a","error":"invalid_target"}"#));
        let err = c.await_result(call, Continuation::Immediate).await.unwrap_err();
        assert_eq!(err, CallError::Remote("invalid_target".into()));
    }

    #[tokio::test]
    async fn follow_up_takes_next_message_even_if_error() {
        let c = Correlator::new(WINDOW);
        let call = c.open(RequestId::from_raw("a")).unwrap();
        c.route(&response("listen", "a"));
        c.route(&classify(r#"{"_type":"wf_api_error_response","_id":"a","error":"x"}"#));
        let msg = c.await_result(call, Continuation::WaitForFollowUp).await.unwrap();
        assert_eq!(msg.tag(), "error");
    }

    #[tokio::test]
    async fn stop_all_unblocks_every_call_once() {
        let c = Correlator::new(WINDOW);
        let a = c.open(RequestId::from_raw("a")).unwrap();
        let b = c.open(RequestId::from_raw("b")).unwrap();

        let ca = c.clone();
        let wa = tokio::spawn(async move { ca.await_result(a, Continuation::Immediate).await });
        let cb = c.clone();
        let wb = tokio::spawn(async move { cb.await_result(b, Continuation::WaitForFollowUp).await });
        tokio::task::yield_now().await;

        assert_eq!(c.stop_all(), 2);
        assert_eq!(c.stop_all(), 0);
        assert_eq!(wa.await.unwrap().unwrap_err(), CallError::Stopped);
        assert_eq!(wb.await.unwrap().unwrap_err(), CallError::Stopped);
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn open_after_stop_is_refused() {
        let c = Correlator::new(WINDOW);
        c.stop_all();
        assert!(c.is_stopped());
        assert_eq!(c.open(RequestId::from_raw("a")).err().unwrap(), CallError::Stopped);
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn interleaved_routing_never_crosses_calls() {
        let c = Correlator::new(WINDOW);
        let ids: Vec<RequestId> = (0..32).map(|_| RequestId::generate()).collect();
        let mut waiters = Vec::new();
        for id in &ids {
            let call = c.open(id.clone()).unwrap();
            let cc = c.clone();
            waiters.push(tokio::spawn(async move {
                cc.await_result(call, Continuation::Immediate).await
            }));
        }

        // Route in reverse, each response tagged with its own id.
        for id in ids.iter().rev() {
            let raw = format!(r#"{{"_type":"wf_api_get_var_response","_id":"{id}","value":"{id}"}}"#);
            assert!(c.route(&classify(&raw)));
        }

        for (id, waiter) in ids.iter().zip(waiters) {
            let msg = waiter.await.unwrap().unwrap();
            assert_eq!(msg.get_str("value"), Some(id.as_str()));
        }
        assert_eq!(c.pending_count(), 0);
    }
}
