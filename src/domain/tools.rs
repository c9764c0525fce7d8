//! Interactive tools exposed via Model Context Protocol
//!
//! Provides the `echo` tool. Each call is also announced on the session's
//! event stream as a `notifications/message` log event.

use chrono::{SecondsFormat, Utc};
use rust_mcp_sdk::{
    macros,
    schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::AppError;
use crate::mcp::rpc::{json_rpc_error, json_rpc_error_with_data, json_rpc_notification, json_rpc_result};
use crate::session::SessionContext;

#[macros::mcp_tool(name = "echo", description = "Echo a message back to the caller")]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct EchoTool {
    pub message: String,
}

pub fn build_tools_list() -> Vec<Tool> {
    vec![EchoTool::tool()]
}

pub fn echo_text(message: &str) -> String {
    format!("Tool echo: {message}")
}

pub fn handle_tools_call(
    ctx: &SessionContext<'_>,
    id: Option<Value>,
    params: Option<Value>,
) -> Result<Value, AppError> {
    let Some(raw_params) = params else {
        return Ok(json_rpc_error(id, -32602, "Invalid params"));
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return Ok(json_rpc_error(id, -32602, "Invalid params")),
    };

    match tool_call.name.as_str() {
        "echo" => {
            let arguments: EchoTool =
                match serde_json::from_value(json!(tool_call.arguments.unwrap_or_default())) {
                    Ok(value) => value,
                    Err(_) => return Ok(json_rpc_error(id, -32602, "Invalid params")),
                };

            let streamed = ctx.notify(json_rpc_notification(
                "notifications/message",
                json!({
                    "level": "info",
                    "logger": "echo",
                    "data": {
                        "tool": "echo",
                        "message": &arguments.message,
                        "at_utc": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    }
                }),
            ));
            debug!(session_id = %ctx.session_id(), streamed, "echo tool called");

            let result = serde_json::to_value(CallToolResult {
                content: vec![ContentBlock::from(TextContent::new(
                    echo_text(&arguments.message),
                    None,
                    None,
                ))],
                is_error: None,
                meta: None,
                structured_content: None,
            })
            .map_err(|err| AppError::internal(format!("echo tool result serialization: {err}")))?;

            Ok(json_rpc_result(id, result))
        }
        _ => Ok(json_rpc_error_with_data(
            id,
            -32601,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": tool_call.name,
                },
            })),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::StreamExt;
    use serde_json::json;

    use super::{build_tools_list, echo_text, handle_tools_call};
    use crate::mcp::server::McpEngine;
    use crate::session::{Session, SessionContext, SessionId};

    #[test]
    fn lists_echo_tool() {
        let tools = build_tools_list();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[test]
    fn echo_call_returns_prefixed_text() {
        let session = Session::new(SessionId::generate());
        let ctx = SessionContext::new(&session);
        let response = handle_tools_call(
            &ctx,
            Some(json!(3)),
            Some(json!({ "name": "echo", "arguments": { "message": "hi" } })),
        )
        .expect("tool call");

        assert_eq!(response["id"], 3);
        assert_eq!(response["result"]["content"][0]["type"], "text");
        assert_eq!(response["result"]["content"][0]["text"], echo_text("hi"));
    }

    #[test]
    fn missing_message_is_invalid_params() {
        let session = Session::new(SessionId::generate());
        let ctx = SessionContext::new(&session);
        let response = handle_tools_call(
            &ctx,
            Some(json!(4)),
            Some(json!({ "name": "echo", "arguments": {} })),
        )
        .expect("tool call");

        assert_eq!(response["error"]["code"], -32602);
    }

    #[test]
    fn unknown_tool_returns_tool_not_found_data() {
        let session = Session::new(SessionId::generate());
        let ctx = SessionContext::new(&session);
        let response = handle_tools_call(
            &ctx,
            Some(json!(5)),
            Some(json!({ "name": "reverse", "arguments": {} })),
        )
        .expect("tool call");

        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["data"]["code"], "tool_not_found");
        assert_eq!(response["error"]["data"]["details"]["name"], "reverse");
    }

    #[tokio::test]
    async fn echo_call_is_announced_on_open_stream() {
        let session = Arc::new(Session::new(SessionId::generate()));
        session
            .bind_engine(Box::new(McpEngine::new()))
            .await
            .expect("bind engine");
        let mut stream = session.open_stream().expect("open stream");

        let ctx = SessionContext::new(&session);
        handle_tools_call(
            &ctx,
            Some(json!(6)),
            Some(json!({ "name": "echo", "arguments": { "message": "streamed" } })),
        )
        .expect("tool call");

        let event = stream.next().await.expect("log event");
        assert_eq!(event["method"], "notifications/message");
        assert_eq!(event["params"]["data"]["message"], "streamed");
    }
}
