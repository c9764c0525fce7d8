//! The seam between session routing and protocol business logic
//!
//! A session owns exactly one [`ProtocolEngine`], created by an
//! [`EngineFactory`] when the session's handshake is accepted.

use async_trait::async_trait;
use serde_json::Value;

use crate::{errors::AppError, session::SessionContext};

/// Outcome of processing one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReply {
    /// Notifications and client responses; nothing to send back.
    Accepted,
    Message(Value),
    Batch(Vec<Value>),
}

impl EngineReply {
    pub fn into_messages(self) -> Vec<Value> {
        match self {
            Self::Accepted => Vec::new(),
            Self::Message(message) => vec![message],
            Self::Batch(messages) => messages,
        }
    }
}

#[async_trait]
pub trait ProtocolEngine: Send {
    /// Errors are fatal for the session that produced them.
    async fn process_message(
        &mut self,
        message: Value,
        ctx: &SessionContext<'_>,
    ) -> Result<EngineReply, AppError>;
}

pub trait EngineFactory: Send + Sync {
    fn create_engine(&self) -> Box<dyn ProtocolEngine>;
}
