//! Wire codec for the ClearNode session protocol.
//!
//! The coordinator speaks JSON-RPC-style frames over a persistent WebSocket:
//! requests carry `{jsonrpc: "2.0", id, method, params}`, responses carry
//! `{id, result}` or `{id, error}`, and unsolicited push notifications carry
//! `{method, params}` with no `id`. Inbound frames are validated and narrowed
//! into a closed set of variants before dispatch; anything else is a
//! [`ProtocolError`] the connection layer logs and drops.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_AUTH_CHALLENGE: &str = "auth_challenge";
pub const METHOD_AUTH_VERIFY: &str = "auth_verify";
const METHOD_BALANCE_UPDATE: &str = "balance_update";
const METHOD_CHANNEL_OPENED: &str = "channel_opened";
const METHOD_CHANNEL_CLOSED: &str = "channel_closed";

/// Outbound request frame, correlated to its response by `id`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame {
    jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RequestFrame {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    pub fn encode(&self) -> String {
        // RequestFrame is a plain string/number/Value struct; serialization
        // cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Error body of a `{id, error}` response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

/// A response frame correlated to an outbound request.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<RpcErrorBody>,
}

/// Push notification from the coordinator, already validated and narrowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// Replaces the session balance in place.
    BalanceUpdate { balance: String },
    /// A channel was funded; the session adopts its identity and balance.
    ChannelOpened {
        channel_id: String,
        balance: String,
    },
    /// The channel was settled and closed.
    ChannelClosed,
}

/// Any valid inbound frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Response(ResponseFrame),
    Push(PushMessage),
}

/// Expected `result` body of a successful `auth_challenge` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallengeResult {
    pub challenge: String,
}

/// Expected `result` body of an `auth_verify` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthVerifyResult {
    pub authenticated: bool,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub balance: Option<String>,
}

/// Build the `auth_challenge` request for a wallet address.
pub fn auth_challenge_request(id: u64, address: &str) -> RequestFrame {
    RequestFrame::new(
        id,
        METHOD_AUTH_CHALLENGE,
        serde_json::json!({ "address": address }),
    )
}

/// Build the `auth_verify` request carrying the challenge signature.
pub fn auth_verify_request(id: u64, address: &str, signature: &str) -> RequestFrame {
    RequestFrame::new(
        id,
        METHOD_AUTH_VERIFY,
        serde_json::json!({ "address": address, "signature": signature }),
    )
}

/// Decode a raw text frame into a validated [`InboundFrame`].
///
/// Frames with an `id` are responses; frames with only a `method` are pushes.
/// Pushes are narrowed against the recognized method set here so the session
/// layer never sees untyped payloads.
pub fn decode_inbound(raw: &str) -> Result<InboundFrame, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    if let Some(id_value) = value.get("id") {
        let id = id_value.as_u64().ok_or(ProtocolError::InvalidId)?;
        let result = value.get("result").cloned();
        let error = match value.get("error") {
            Some(body) => Some(
                serde_json::from_value::<RpcErrorBody>(body.clone())
                    .map_err(|_| ProtocolError::MissingField {
                        method: "response".to_string(),
                        field: "error.message",
                    })?,
            ),
            None => None,
        };
        if result.is_none() && error.is_none() {
            return Err(ProtocolError::EmptyResponse);
        }
        return Ok(InboundFrame::Response(ResponseFrame { id, result, error }));
    }

    let method = value
        .get("method")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingDiscriminator)?;
    let params = value.get("params").cloned().unwrap_or(Value::Null);

    let push = match method {
        METHOD_BALANCE_UPDATE => PushMessage::BalanceUpdate {
            balance: required_string(&params, method, "balance")?,
        },
        METHOD_CHANNEL_OPENED => PushMessage::ChannelOpened {
            channel_id: required_string(&params, method, "channel_id")?,
            balance: required_string(&params, method, "balance")?,
        },
        METHOD_CHANNEL_CLOSED => PushMessage::ChannelClosed,
        other => {
            return Err(ProtocolError::UnknownMethod {
                method: other.to_string(),
            });
        }
    };
    Ok(InboundFrame::Push(push))
}

fn required_string(
    params: &Value,
    method: &str,
    field: &'static str,
) -> Result<String, ProtocolError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::MissingField {
            method: method.to_string(),
            field,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_frame_encodes_jsonrpc_envelope() {
        let frame = auth_challenge_request(1, "0xabc");
        let parsed: Value = serde_json::from_str(&frame.encode()).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 1);
        assert_eq!(parsed["method"], "auth_challenge");
        assert_eq!(parsed["params"]["address"], "0xabc");
    }

    #[test]
    fn auth_verify_request_carries_signature() {
        let frame = auth_verify_request(2, "0xabc", "0xsig");
        let parsed: Value = serde_json::from_str(&frame.encode()).unwrap();
        assert_eq!(parsed["method"], "auth_verify");
        assert_eq!(parsed["params"]["signature"], "0xsig");
    }

    #[test]
    fn decodes_result_response() {
        let frame = decode_inbound(r#"{"id": 7, "result": {"challenge": "c"}}"#).unwrap();
        match frame {
            InboundFrame::Response(resp) => {
                assert_eq!(resp.id, 7);
                assert_eq!(resp.result.unwrap()["challenge"], "c");
                assert!(resp.error.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn decodes_error_response() {
        let frame = decode_inbound(r#"{"id": 3, "error": {"message": "nope"}}"#).unwrap();
        match frame {
            InboundFrame::Response(resp) => {
                assert_eq!(resp.error.unwrap().message, "nope");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn decodes_balance_update_push() {
        let frame =
            decode_inbound(r#"{"method": "balance_update", "params": {"balance": "2000000"}}"#)
                .unwrap();
        match frame {
            InboundFrame::Push(PushMessage::BalanceUpdate { balance }) => {
                assert_eq!(balance, "2000000");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn decodes_channel_opened_push() {
        let raw = r#"{"method": "channel_opened", "params": {"channel_id": "c1", "balance": "5"}}"#;
        match decode_inbound(raw).unwrap() {
            InboundFrame::Push(PushMessage::ChannelOpened {
                channel_id,
                balance,
            }) => {
                assert_eq!(channel_id, "c1");
                assert_eq!(balance, "5");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn decodes_channel_closed_without_params() {
        match decode_inbound(r#"{"method": "channel_closed"}"#).unwrap() {
            InboundFrame::Push(PushMessage::ChannelClosed) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_push_method() {
        let err = decode_inbound(r#"{"method": "quote_stream", "params": {}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownMethod { .. }));
    }

    #[test]
    fn rejects_push_missing_required_field() {
        let err = decode_inbound(r#"{"method": "balance_update", "params": {}}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingField {
                field: "balance",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_json_frame() {
        assert!(matches!(
            decode_inbound("not json").unwrap_err(),
            ProtocolError::InvalidJson(_)
        ));
    }

    #[test]
    fn rejects_response_with_non_numeric_id() {
        let err = decode_inbound(r#"{"id": "seven", "result": {}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidId));
    }

    #[test]
    fn rejects_response_with_no_body() {
        let err = decode_inbound(r#"{"id": 1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyResponse));
    }
}
