//! A recording transport for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::transport::Transport;

/// Captures every frame sent and every close requested.
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<String>>,
    fail_sends: AtomicBool,
    frames_tx: mpsc::UnboundedSender<String>,
    frames_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            frames_tx,
            frames_rx: tokio::sync::Mutex::new(frames_rx),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap_or(Value::Null))
            .collect()
    }

    /// Wait for the next frame that has not been returned yet.
    pub async fn next_sent(&self) -> Value {
        let raw = self
            .frames_rx
            .lock()
            .await
            .recv()
            .await
            .unwrap_or_default();
        serde_json::from_str(&raw).unwrap_or(Value::Null)
    }

    pub fn close_count(&self) -> usize {
        self.closes.lock().len()
    }

    pub fn close_reasons(&self) -> Vec<String> {
        self.closes.lock().clone()
    }

    /// Make subsequent sends fail as if the connection had dropped.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(text.clone());
        let _ = self.frames_tx.send(text);
        Ok(())
    }

    fn close(&self, reason: &str) {
        self.closes.lock().push(reason.to_owned());
    }
}
