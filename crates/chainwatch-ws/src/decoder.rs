//! Frame decoding for the `logsSubscribe` protocol.
//!
//! Inbound frames are one of:
//! - a control response `{id, result | error}` correlated to a request we sent
//! - a notification `{method: "logsNotification", params: {subscription, result: {context, value}}}`
//! - anything else, which is ignored

use serde_json::Value;

use chainwatch_core::types::{Notification, Subscription};

use crate::error::DecodeError;
use crate::request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Response to a request we issued; carries no subscription payload.
    Control {
        id: RpcId,
        result: Option<Value>,
        error: Option<JsonRpcError>,
    },
    Notification(Notification),
    Other(Value),
}

/// Classify one text frame.
pub fn decode(text: &str) -> Result<Frame, DecodeError> {
    let val: Value = serde_json::from_str(text)?;
    let Some(obj) = val.as_object() else {
        return Err(DecodeError::NotObject);
    };

    if let Some(params) = obj.get("params") {
        let result = params.get("result");
        let Some(value) = result.and_then(|r| r.get("value")) else {
            return Ok(Frame::Other(val));
        };
        let signature = value
            .get("signature")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField("params.result.value.signature"))?;

        let logs = value
            .get("logs")
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|l| l.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        return Ok(Frame::Notification(Notification {
            subscription: params.get("subscription").and_then(Value::as_u64),
            slot: result
                .and_then(|r| r.get("context"))
                .and_then(|c| c.get("slot"))
                .and_then(Value::as_u64),
            signature: signature.to_string(),
            err: value.get("err").filter(|e| !e.is_null()).cloned(),
            logs,
        }));
    }

    if obj.contains_key("id") {
        let resp: JsonRpcResponse = serde_json::from_value(val)?;
        return Ok(Frame::Control {
            id: resp.id,
            result: resp.result,
            error: resp.error,
        });
    }

    Ok(Frame::Other(val))
}

/// Build the `logsSubscribe` request text for `subscription`.
pub fn logs_subscribe_request(id: u64, subscription: &Subscription) -> String {
    let req = JsonRpcRequest::new(
        id,
        "logsSubscribe",
        vec![
            subscription.filter.to_param(),
            serde_json::json!({ "commitment": subscription.commitment }),
        ],
    );
    // A struct of strings, numbers and `Value`s always serializes.
    serde_json::to_string(&req).unwrap_or_default()
}
