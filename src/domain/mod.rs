//! Echo business logic exposed over the MCP protocol
//!
//! Provides the `echo` tool, the `echo://{message}` resource template and the
//! `echo` prompt served by every session's engine.

pub mod prompts;
pub mod resources;
pub mod tools;

