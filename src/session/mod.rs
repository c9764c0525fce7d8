//! Session lifecycle for the streamable HTTP transport
//!
//! A session binds a sequence of independent HTTP requests to one stateful
//! protocol conversation. The [`registry::SessionRegistry`] owns every open
//! [`handle::Session`]; the HTTP router only borrows them per request.

pub mod handle;
pub mod handshake;
pub mod registry;

mod id;

pub use handle::{CloseReason, EventStream, Session, SessionContext, SessionObserver, SessionState};
pub use handshake::{classify, MessageKind};
pub use id::SessionId;
pub use registry::SessionRegistry;
