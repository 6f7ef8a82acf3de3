use crate::error::TransportError;

/// The outbound half of one connection.
///
/// Both methods are non-blocking: implementations queue the frame for a
/// writer task and report a full or dead queue as an error.
pub trait Transport: Send + Sync {
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Close the connection. Called at most once per session.
    fn close(&self, reason: &str);
}
