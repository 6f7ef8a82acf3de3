//! Session runtime for Relay workflows: registry, request correlation,
//! per-connection sessions and the dispatch loop that drives workflow
//! callbacks.

mod actions;
pub mod config;
pub mod correlator;
mod dispatch;
pub mod error;
pub mod registry;
pub mod relay;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod workflow;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::RuntimeConfig;
pub use correlator::{Continuation, Correlator};
pub use error::{ActionError, CallError, RuntimeError, TransportError};
pub use registry::{WorkflowFactory, WorkflowRegistry};
pub use relay::Relay;
pub use runtime::Runtime;
pub use session::{Session, SessionHandle, SessionState};
pub use transport::Transport;
pub use workflow::Workflow;

// Re-exported so workflow crates need only one dependency.
pub use async_trait::async_trait;
pub use relay_core;
