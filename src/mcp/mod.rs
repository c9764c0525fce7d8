//! Model Context Protocol (MCP) engine and JSON-RPC implementations
//!
//! Provides the engine seam sessions dispatch through, the default echo
//! engine, and JSON-RPC formatting helpers.

pub mod engine;
pub mod rpc;
pub mod server;
