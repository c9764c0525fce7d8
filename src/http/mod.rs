//! HTTP transport layer for the Model Context Protocol
//!
//! Routes `/mcp` requests onto sessions and exposes general metadata endpoints.

pub mod handlers;
pub mod session_header;
