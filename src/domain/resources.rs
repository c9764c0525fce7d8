//! Model Context Protocol resource providers
//!
//! Exposes the `echo://{message}` resource template.

use rust_mcp_sdk::schema::{
    ReadResourceContent, ReadResourceRequestParams, ReadResourceResult, TextResourceContents,
};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::mcp::rpc::{json_rpc_error, json_rpc_error_with_data, json_rpc_result};

pub const ECHO_URI_SCHEME: &str = "echo://";
pub const ECHO_URI_TEMPLATE: &str = "echo://{message}";

pub fn build_resource_templates_list() -> Value {
    json!({
        "resourceTemplates": [
            {
                "uriTemplate": ECHO_URI_TEMPLATE,
                "name": "echo",
                "description": "Echo the message embedded in the uri",
                "mimeType": "text/plain"
            }
        ]
    })
}

pub fn echo_text(message: &str) -> String {
    format!("Resource echo: {message}")
}

pub fn handle_resources_read(id: Option<Value>, params: Option<Value>) -> Result<Value, AppError> {
    let Some(raw_params) = params else {
        return Ok(json_rpc_error(id, -32602, "Invalid params"));
    };

    let resource_read: ReadResourceRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return Ok(json_rpc_error(id, -32602, "Invalid params")),
    };

    let Some(message) = resource_read.uri.strip_prefix(ECHO_URI_SCHEME) else {
        return Ok(json_rpc_error_with_data(
            id,
            -32601,
            "Method not found",
            Some(json!({
                "code": "resource_not_found",
                "message": "unknown resource uri",
                "details": {
                    "uri": resource_read.uri,
                },
            })),
        ));
    };

    let result = serde_json::to_value(ReadResourceResult {
        contents: vec![ReadResourceContent::from(TextResourceContents {
            meta: None,
            mime_type: Some("text/plain".to_string()),
            text: echo_text(message),
            uri: resource_read.uri.clone(),
        })],
        meta: None,
    })
    .map_err(|err| AppError::internal(format!("read echo resource serialization: {err}")))?;

    Ok(json_rpc_result(id, result))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_resource_templates_list, handle_resources_read, ECHO_URI_TEMPLATE};

    #[test]
    fn templates_list_exposes_echo_template() {
        let templates = build_resource_templates_list();
        assert_eq!(
            templates["resourceTemplates"][0]["uriTemplate"],
            ECHO_URI_TEMPLATE
        );
    }

    #[test]
    fn read_echo_uri_returns_contents() {
        let response =
            handle_resources_read(Some(json!(1)), Some(json!({ "uri": "echo://hello" })))
                .expect("read resource");

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["contents"][0]["uri"], "echo://hello");
        assert_eq!(
            response["result"]["contents"][0]["text"],
            "Resource echo: hello"
        );
    }

    #[test]
    fn read_unknown_uri_returns_resource_not_found_data() {
        let response =
            handle_resources_read(Some(json!(2)), Some(json!({ "uri": "file:///etc/passwd" })))
                .expect("read resource");

        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["data"]["code"], "resource_not_found");
    }

    #[test]
    fn read_without_params_is_invalid() {
        let response = handle_resources_read(Some(json!(3)), None).expect("read resource");
        assert_eq!(response["error"]["code"], -32602);
    }
}
