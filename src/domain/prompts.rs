//! Model Context Protocol prompt templates

use serde::Deserialize;
use serde_json::{json, Value};

use crate::mcp::rpc::{json_rpc_error, json_rpc_error_with_data, json_rpc_result};

#[derive(Debug, Deserialize)]
struct EchoArguments {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GetPromptParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

pub fn build_prompts_list() -> Value {
    json!({
        "prompts": [
            {
                "name": "echo",
                "description": "Ask the model to process a message",
                "arguments": [
                    { "name": "message", "required": true }
                ]
            }
        ]
    })
}

pub fn echo_prompt_text(message: &str) -> String {
    format!("Please process this message: {message}")
}

pub fn handle_prompts_get(id: Option<Value>, params: Option<Value>) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, -32602, "Invalid params");
    };

    let prompt: GetPromptParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
    };

    if prompt.name != "echo" {
        return json_rpc_error_with_data(
            id,
            -32602,
            "Invalid params",
            Some(json!({
                "code": "prompt_not_found",
                "message": "unknown prompt name",
                "details": {
                    "name": prompt.name,
                },
            })),
        );
    }

    let arguments: EchoArguments =
        match serde_json::from_value(prompt.arguments.unwrap_or_else(|| json!({}))) {
            Ok(value) => value,
            Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
        };

    json_rpc_result(
        id,
        json!({
            "messages": [
                {
                    "role": "user",
                    "content": {
                        "type": "text",
                        "text": echo_prompt_text(&arguments.message)
                    }
                }
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_prompts_list, handle_prompts_get};

    #[test]
    fn lists_echo_prompt() {
        let prompts = build_prompts_list();
        assert_eq!(prompts["prompts"][0]["name"], "echo");
        assert_eq!(prompts["prompts"][0]["arguments"][0]["name"], "message");
    }

    #[test]
    fn get_echo_prompt_wraps_message() {
        let response = handle_prompts_get(
            Some(json!(1)),
            Some(json!({ "name": "echo", "arguments": { "message": "hello" } })),
        );

        assert_eq!(response["result"]["messages"][0]["role"], "user");
        assert_eq!(
            response["result"]["messages"][0]["content"]["text"],
            "Please process this message: hello"
        );
    }

    #[test]
    fn unknown_prompt_is_invalid_params() {
        let response = handle_prompts_get(Some(json!(2)), Some(json!({ "name": "shout" })));
        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["error"]["data"]["code"], "prompt_not_found");
    }

    #[test]
    fn missing_message_is_invalid_params() {
        let response = handle_prompts_get(Some(json!(3)), Some(json!({ "name": "echo" })));
        assert_eq!(response["error"]["code"], -32602);
    }
}
