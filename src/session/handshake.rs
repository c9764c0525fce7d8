//! Classification of inbound messages as initialization handshakes

use rust_mcp_sdk::schema::InitializeRequest;
use serde_json::Value;

use crate::mcp::rpc::JSONRPC_VERSION;

pub const INITIALIZE_METHOD: &str = "initialize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Initialize,
    Other,
}

/// Decides whether `message` opens a new session.
///
/// Only a single JSON-RPC request object whose method is `initialize` and
/// whose params carry a complete `InitializeRequest` qualifies. Batches,
/// notifications and anything malformed are `Other`.
pub fn classify(message: &Value) -> MessageKind {
    let Some(object) = message.as_object() else {
        return MessageKind::Other;
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION)
        || object.get("method").and_then(Value::as_str) != Some(INITIALIZE_METHOD)
    {
        return MessageKind::Other;
    }

    let has_request_id = object
        .get("id")
        .is_some_and(|id| id.is_string() || id.is_i64());
    if !has_request_id {
        return MessageKind::Other;
    }

    match serde_json::from_value::<InitializeRequest>(message.clone()) {
        Ok(_) => MessageKind::Initialize,
        Err(_) => MessageKind::Other,
    }
}

pub fn is_initialize_request(message: &Value) -> bool {
    classify(message) == MessageKind::Initialize
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{classify, is_initialize_request, MessageKind};

    fn initialize() -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "clientInfo": { "name": "test-client", "version": "1.0.0" },
                "capabilities": {}
            }
        })
    }

    #[test]
    fn recognizes_initialize_request() {
        assert_eq!(classify(&initialize()), MessageKind::Initialize);
    }

    #[test]
    fn accepts_string_request_ids() {
        let mut message = initialize();
        message["id"] = json!("init-1");
        assert!(is_initialize_request(&message));
    }

    #[test]
    fn other_methods_are_not_handshakes() {
        let message = json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" });
        assert_eq!(classify(&message), MessageKind::Other);
    }

    #[test]
    fn initialize_notification_is_not_a_handshake() {
        let mut message = initialize();
        if let Some(object) = message.as_object_mut() {
            object.remove("id");
        }
        assert_eq!(classify(&message), MessageKind::Other);
    }

    #[test]
    fn missing_client_info_is_not_a_handshake() {
        let mut message = initialize();
        if let Some(params) = message["params"].as_object_mut() {
            params.remove("clientInfo");
        }
        assert_eq!(classify(&message), MessageKind::Other);
    }

    #[test]
    fn batches_and_scalars_are_not_handshakes() {
        assert_eq!(classify(&json!([initialize()])), MessageKind::Other);
        assert_eq!(classify(&json!("initialize")), MessageKind::Other);
        assert_eq!(classify(&json!(null)), MessageKind::Other);
    }

    #[test]
    fn wrong_jsonrpc_version_is_not_a_handshake() {
        let mut message = initialize();
        message["jsonrpc"] = json!("1.0");
        assert_eq!(classify(&message), MessageKind::Other);
    }
}
