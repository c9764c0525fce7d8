//! The per-session Model Context Protocol engine
//!
//! Provides JSON-RPC decoding, method routing, capabilities negotiation
//! (`initialize`), and the echo tool/resource/prompt integrations.

use async_trait::async_trait;
use rust_mcp_sdk::schema::{
    CallToolRequest, GetPromptRequest, Implementation, InitializeRequest, InitializeResult,
    JsonrpcMessage, JsonrpcRequest, ListResourcesResult, ListToolsResult, PingRequest,
    ReadResourceRequest, ServerCapabilities, ServerCapabilitiesResources, ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::domain::{
    prompts::{build_prompts_list, handle_prompts_get},
    resources::{build_resource_templates_list, handle_resources_read},
    tools::{build_tools_list, handle_tools_call},
};
use crate::errors::AppError;
use crate::mcp::engine::{EngineFactory, EngineReply, ProtocolEngine};
use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result, request_id_to_value,
};
use crate::session::SessionContext;

/// Newest first; an unsupported offer is answered with the first entry.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// State of one client conversation. A fresh engine is created per session.
#[derive(Debug, Default)]
pub struct McpEngine {
    protocol_version: Option<&'static str>,
    client_name: Option<String>,
    client_ready: bool,
}

impl McpEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol_version(&self) -> Option<&'static str> {
        self.protocol_version
    }

    pub fn is_client_ready(&self) -> bool {
        self.client_ready
    }

    async fn handle_json_rpc_value(
        &mut self,
        ctx: &SessionContext<'_>,
        payload: Value,
    ) -> Result<Option<Value>, AppError> {
        if !payload.is_object() {
            return Ok(Some(json_rpc_error(None, -32600, "Invalid Request")));
        }

        let request_id = payload.get("id").cloned();
        let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(_) => return Ok(Some(json_rpc_error(request_id, -32600, "Invalid Request"))),
        };

        match parsed {
            JsonrpcMessage::Request(request) => {
                let request_id = Some(request_id_to_value(request.id.clone()));
                if request.method.trim().is_empty() {
                    return Ok(Some(json_rpc_error(request_id, -32600, "Invalid Request")));
                }
                if !validate_request_shape(&request)? {
                    return Ok(Some(json_rpc_error(request_id, -32602, "Invalid params")));
                }

                let response = self
                    .handle_json_rpc_request(
                        ctx,
                        request_id,
                        request.method,
                        request.params.map(Value::Object),
                    )
                    .await?;
                Ok(Some(response))
            }
            JsonrpcMessage::Notification(notification) => {
                self.handle_notification(ctx, &notification.method);
                Ok(None)
            }
            JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
                debug!(session_id = %ctx.session_id(), "ignoring client response message");
                Ok(None)
            }
        }
    }

    fn handle_notification(&mut self, ctx: &SessionContext<'_>, method: &str) {
        match method {
            "notifications/initialized" => {
                self.client_ready = true;
                info!(
                    session_id = %ctx.session_id(),
                    client = self.client_name.as_deref().unwrap_or("unknown"),
                    "client ready"
                );
            }
            "notifications/cancelled" => {
                debug!(session_id = %ctx.session_id(), "client cancelled a request");
            }
            _ => debug!(session_id = %ctx.session_id(), method, "ignoring notification"),
        }
    }

    async fn handle_json_rpc_request(
        &mut self,
        ctx: &SessionContext<'_>,
        id: Option<Value>,
        method: String,
        params: Option<Value>,
    ) -> Result<Value, AppError> {
        let audit_params = redact_audit_params(params.as_ref());

        let response = match method.as_str() {
            "initialize" => self.initialize(id, params.as_ref())?,
            "ping" => json_rpc_result(id, json!({})),
            "tools/list" => json_rpc_result(
                id,
                to_result_value(ListToolsResult {
                    meta: None,
                    next_cursor: None,
                    tools: build_tools_list(),
                })?,
            ),
            "tools/call" => handle_tools_call(ctx, id, params)?,
            "resources/list" => json_rpc_result(
                id,
                to_result_value(ListResourcesResult {
                    meta: None,
                    next_cursor: None,
                    resources: vec![],
                })?,
            ),
            "resources/templates/list" => json_rpc_result(id, build_resource_templates_list()),
            "resources/read" => handle_resources_read(id, params)?,
            "prompts/list" => json_rpc_result(id, build_prompts_list()),
            "prompts/get" => handle_prompts_get(id, params),
            _ => json_rpc_error(id, -32601, "Method not found"),
        };

        info!(
            session_id = %ctx.session_id(),
            method = %method,
            params = %audit_params,
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp action audited"
        );

        Ok(response)
    }

    fn initialize(&mut self, id: Option<Value>, params: Option<&Value>) -> Result<Value, AppError> {
        if self.protocol_version.is_some() {
            return Ok(json_rpc_error(id, -32600, "Session already initialized"));
        }

        let protocol_version = match negotiate_protocol_version(params) {
            Ok(version) => version,
            Err(err) => return Ok(app_error_to_json_rpc(id, err)),
        };

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools {
                    list_changed: Some(false),
                }),
                resources: Some(ServerCapabilitiesResources {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
                prompts: None,
                ..Default::default()
            },
            protocol_version: protocol_version.to_string(),
            instructions: None,
            meta: None,
        };

        let mut result = to_result_value(initialize_result)?;
        result["capabilities"]["prompts"] = json!({ "listChanged": false });
        result["capabilities"]["logging"] = json!({});

        self.protocol_version = Some(protocol_version);
        self.client_name = params
            .and_then(|params| params.get("clientInfo"))
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(json_rpc_result(id, result))
    }
}

#[async_trait]
impl ProtocolEngine for McpEngine {
    async fn process_message(
        &mut self,
        message: Value,
        ctx: &SessionContext<'_>,
    ) -> Result<EngineReply, AppError> {
        if let Some(batch) = message.as_array() {
            if batch.is_empty() {
                return Ok(EngineReply::Message(json_rpc_error(
                    None,
                    -32600,
                    "Invalid Request",
                )));
            }

            let mut responses = Vec::new();
            for item in batch {
                if let Some(response) = self.handle_json_rpc_value(ctx, item.clone()).await? {
                    responses.push(response);
                }
            }

            if responses.is_empty() {
                return Ok(EngineReply::Accepted);
            }
            return Ok(EngineReply::Batch(responses));
        }

        match self.handle_json_rpc_value(ctx, message).await? {
            Some(response) => Ok(EngineReply::Message(response)),
            None => Ok(EngineReply::Accepted),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct McpEngineFactory;

impl EngineFactory for McpEngineFactory {
    fn create_engine(&self) -> Box<dyn ProtocolEngine> {
        Box::new(McpEngine::new())
    }
}

fn to_result_value<T: serde::Serialize>(result: T) -> Result<Value, AppError> {
    serde_json::to_value(result)
        .map_err(|err| AppError::internal(format!("result serialization failed: {err}")))
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<bool, AppError> {
    let payload = serde_json::to_value(request)
        .map_err(|err| AppError::internal(format!("request serialization failed: {err}")))?;

    let valid = match request.method.as_str() {
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "resources/read" => serde_json::from_value::<ReadResourceRequest>(payload).is_ok(),
        "prompts/get" => serde_json::from_value::<GetPromptRequest>(payload).is_ok(),
        _ => true,
    };

    Ok(valid)
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<&'static str, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    Ok(SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|version| *version == offered_version)
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]))
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
