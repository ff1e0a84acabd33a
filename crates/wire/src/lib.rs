// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! conman-wire: JSON-RPC request/response DTOs shared by the server
//! (`conman-daemon`) and any client, plus the mapping from
//! [`conman_core::ErrorKind`] to a wire error code (spec §6, §7).

mod codes;
mod container;
mod methods;

pub use codes::error_code_for;
pub use container::ContainerView;
pub use methods::*;

use serde::{Deserialize, Serialize};

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest<P> {
    pub jsonrpc: JsonRpcVersion,
    pub id: RequestId,
    pub method: String,
    pub params: P,
}

/// A JSON-RPC 2.0 success/error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse<R> {
    pub jsonrpc: JsonRpcVersion,
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: RpcPayload<R>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcPayload<R> {
    Ok { result: R },
    Err { error: RpcError },
}

impl<R> RpcResponse<R> {
    pub fn ok(id: RequestId, result: R) -> Self {
        Self { jsonrpc: JsonRpcVersion, payload: RpcPayload::Ok { result }, id }
    }

    pub fn err(id: RequestId, error: RpcError) -> Self {
        Self { jsonrpc: JsonRpcVersion, payload: RpcPayload::Err { error }, id }
    }
}

/// The literal string `"2.0"`, serialized/deserialized as such.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        if s == "2.0" {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!("unsupported jsonrpc version {s:?}")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// A JSON-RPC error object. `code` follows [`error_code_for`]'s mapping
/// from [`conman_core::ErrorKind`]; `message` is the error's `Display`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn from_core_error(err: &conman_core::Error) -> Self {
        Self { code: error_code_for(err.kind()), message: err.to_string(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_round_trips_through_json() {
        let resp = RpcResponse::ok(RequestId::Number(1), PingResult { ok: true });
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        let back: RpcResponse<PingResult> = serde_json::from_str(&json).unwrap();
        match back.payload {
            RpcPayload::Ok { result } => assert!(result.ok),
            RpcPayload::Err { .. } => panic!("expected ok payload"),
        }
    }

    #[test]
    fn err_response_carries_code_and_message() {
        let core_err = conman_core::Error::Stopping;
        let resp: RpcResponse<PingResult> =
            RpcResponse::err(RequestId::String("req-1".to_string()), RpcError::from_core_error(&core_err));
        let json = serde_json::to_string(&resp).unwrap();
        let back: RpcResponse<PingResult> = serde_json::from_str(&json).unwrap();
        match back.payload {
            RpcPayload::Err { error } => {
                assert_eq!(error.code, error_code_for(conman_core::ErrorKind::Stopping));
                assert_eq!(error.message, "manager is shutting down");
            }
            RpcPayload::Ok { .. } => panic!("expected err payload"),
        }
    }

    #[test]
    fn rejects_unknown_jsonrpc_version() {
        let bad = serde_json::json!({"jsonrpc": "1.0", "id": 1, "result": {"ok": true}});
        let res: Result<RpcResponse<PingResult>, _> = serde_json::from_value(bad);
        assert!(res.is_err());
    }
}
