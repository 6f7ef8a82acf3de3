//! Wire vocabulary for the Relay workflow protocol: message classification,
//! request envelopes, typed events and identifiers.

pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod types;

pub use envelope::{build_request, make_target, Envelope, RequestType};
pub use errors::{CodecError, EventDecodeError};
pub use events::{Event, EventKind};
pub use ids::{ConnectionId, RequestId, SessionId};
pub use message::{classify, tags, Message, MessageKind};
