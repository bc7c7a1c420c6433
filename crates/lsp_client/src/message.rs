//! JSON-RPC message shapes and the id space
//!
//! Discrimination follows field presence, not a `jsonrpc` envelope tag:
//! `id` + `method` is a request, `id` + (`result` xor `error`) is a
//! response, `method` without `id` is a notification. Anything else is a
//! protocol violation.

use lsp_support::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

pub const CANCEL_REQUEST_METHOD: &str = "$/cancelRequest";

/// A JSON-RPC request id. The engine always mints `String` ids carrying a
/// UUID (spec recommends UUIDs); `Number` is accepted on the wire because
/// some servers echo back numeric ids verbatim, or a peer may issue one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    String(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<lsp_support::RequestId> for Id {
    fn from(id: lsp_support::RequestId) -> Self {
        Id::String(id.to_wire_string())
    }
}

/// A JSON-RPC error object as carried in a `Response`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const REQUEST_CANCELLED: i64 = -32802;
    pub const CONTENT_MODIFIED: i64 = -32801;
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
}

impl JsonRpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: error_codes::METHOD_NOT_FOUND,
            message: format!("method not found: {method}"),
            data: None,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }
}

/// The four wire shapes the engine handles. `CancelRequest` is a
/// convenience variant for a notification whose method is
/// `$/cancelRequest`; it is still encoded as an ordinary `Notification`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: Id,
        method: String,
        params: Value,
    },
    Response {
        id: Id,
        outcome: Result<Value, JsonRpcError>,
    },
    Notification {
        method: String,
        params: Value,
    },
    CancelRequest {
        id: Id,
    },
}

impl Message {
    pub fn request(id: Id, method: impl Into<String>, params: Value) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn cancel_request(id: Id) -> Self {
        Message::CancelRequest { id }
    }

    pub fn ok_response(id: Id, result: Value) -> Self {
        Message::Response {
            id,
            outcome: Ok(result),
        }
    }

    pub fn err_response(id: Id, error: JsonRpcError) -> Self {
        Message::Response {
            id,
            outcome: Err(error),
        }
    }

    /// Encode this message as the JSON value that goes over the wire.
    pub fn to_value(&self) -> Value {
        match self {
            Message::Request { id, method, params } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "method": method,
                "params": params,
            }),
            Message::Response { id, outcome } => match outcome {
                Ok(result) => serde_json::json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": id,
                    "result": result,
                }),
                Err(error) => serde_json::json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": id,
                    "error": error,
                }),
            },
            Message::Notification { method, params } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": method,
                "params": params,
            }),
            Message::CancelRequest { id } => serde_json::json!({
                "jsonrpc": JSONRPC_VERSION,
                "method": CANCEL_REQUEST_METHOD,
                "params": { "id": id },
            }),
        }
    }

    /// Decode a wire value into a `Message`, applying the field-presence
    /// discrimination rules from the protocol's message model.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut obj) = value else {
            return Err(Error::Protocol("message is not a JSON object".into()));
        };

        let id = obj.remove("id").map(|v| serde_json::from_value::<Id>(v)).transpose()
            .map_err(|e| Error::Protocol(format!("invalid id: {e}")))?;
        let method = obj
            .remove("method")
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Err(Error::Protocol(format!("method must be a string, got {other}"))),
            })
            .transpose()?;
        let params = obj.remove("params").unwrap_or(Value::Null);
        let result = obj.remove("result");
        let error = obj
            .remove("error")
            .map(|v| serde_json::from_value::<JsonRpcError>(v))
            .transpose()
            .map_err(|e| Error::Protocol(format!("invalid error object: {e}")))?;

        match (id, method, result, error) {
            (Some(id), Some(method), _, _) => Ok(Message::Request { id, method, params }),
            (Some(id), None, Some(result), None) => Ok(Message::Response {
                id,
                outcome: Ok(result),
            }),
            (Some(id), None, None, Some(error)) => Ok(Message::Response {
                id,
                outcome: Err(error),
            }),
            (Some(id), None, Some(_), Some(_)) => Err(Error::Protocol(format!(
                "response {id} carries both result and error"
            ))),
            (Some(id), None, None, None) => Err(Error::Protocol(format!(
                "response {id} carries neither result nor error"
            ))),
            (None, Some(method), _, _) if method == CANCEL_REQUEST_METHOD => {
                let id = params
                    .get("id")
                    .cloned()
                    .ok_or_else(|| Error::Protocol("$/cancelRequest missing id".into()))?;
                let id: Id = serde_json::from_value(id)
                    .map_err(|e| Error::Protocol(format!("invalid cancel id: {e}")))?;
                Ok(Message::CancelRequest { id })
            }
            (None, Some(method), _, _) => Ok(Message::Notification { method, params }),
            (None, None, _, _) => Err(Error::Protocol(
                "message has neither id nor method".into(),
            )),
        }
    }
}
