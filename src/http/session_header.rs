//! Typed `mcp-session-id` header

use std::iter;

use axum::http::{HeaderName, HeaderValue};
use axum_extra::headers::{self, Header};

use crate::session::SessionId;

pub static MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");

impl Header for SessionId {
    fn name() -> &'static HeaderName {
        &MCP_SESSION_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        // Opaque bytes decode as an id that no session can carry.
        let value = String::from_utf8_lossy(value.as_bytes());
        Ok(SessionId::from(value.trim()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(self.as_str()) {
            values.extend(iter::once(value));
        }
    }
}
