//! Turns raw HTTP payloads into response envelopes.
//!
//! A decode failure is an operation failure, not a crash: both processors
//! always return an envelope, synthesizing a failed one when the payload
//! cannot be understood.

use serde_json::Value;
use tracing::{debug, warn};

use super::binary;
use crate::model::{keys, ModelNode};

/// Content type of the binary-encoded payloads.
pub const APPLICATION_DMR_ENCODED: &str = "application/dmr-encoded";
/// Content type of the JSON payloads some upload responses carry.
pub const APPLICATION_JSON: &str = "application/json";

const UNKNOWN_FAILURE: &str = "unknown failure";

/// The transport method an operation was sent over; payload decoding is
/// method-aware because lightweight responses arrive without an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// Builds a synthetic failed envelope carrying the given description.
pub(crate) fn failed_envelope(description: impl Into<ModelNode>) -> ModelNode {
    let mut envelope = ModelNode::object();
    envelope.insert(keys::OUTCOME, "failed");
    envelope.insert(keys::FAILURE_DESCRIPTION, description);
    envelope
}

fn success_envelope(result: ModelNode) -> ModelNode {
    let mut envelope = ModelNode::object();
    envelope.insert(keys::OUTCOME, keys::SUCCESS);
    envelope.insert(keys::RESULT, result);
    envelope
}

/// Strict processor for regular management responses: base64 text of the
/// binary encoding, re-wrapped into a synthetic success envelope for
/// lightweight (GET) responses which carry the result tree directly.
pub fn process_dmr(method: HttpMethod, content_type: &str, payload: &str) -> ModelNode {
    if content_type.starts_with(APPLICATION_DMR_ENCODED) {
        match binary::from_base64(payload) {
            Ok(node) => match method {
                HttpMethod::Get => success_envelope(node),
                HttpMethod::Post => node,
            },
            Err(error) => {
                warn!("unable to decode dmr payload: {error}");
                failed_envelope(format!("Unable to decode response payload: {error}"))
            }
        }
    } else {
        warn!("unexpected response content type '{content_type}'");
        failed_envelope(format!(
            "Unable to parse response with content type '{content_type}'"
        ))
    }
}

/// Tolerant processor for upload responses, which arrive either as the
/// binary encoding or as a JSON object depending on the server version.
pub fn process_upload(content_type: &str, payload: &str) -> ModelNode {
    if content_type.starts_with(APPLICATION_DMR_ENCODED) {
        process_dmr(HttpMethod::Post, content_type, payload)
    } else if content_type.starts_with(APPLICATION_JSON) {
        match serde_json::from_str::<Value>(payload) {
            Ok(json) => envelope_from_json(&json),
            Err(error) => {
                warn!("unable to parse upload response as json: {error}");
                failed_envelope(format!("Unable to parse upload response: {error}"))
            }
        }
    } else {
        warn!("unexpected upload response content type '{content_type}'");
        failed_envelope(format!(
            "Unable to parse upload response with content type '{content_type}'"
        ))
    }
}

fn envelope_from_json(json: &Value) -> ModelNode {
    let outcome = json
        .get(keys::OUTCOME)
        .and_then(Value::as_str)
        .unwrap_or_default();
    if outcome == keys::SUCCESS {
        let result = json
            .get(keys::RESULT)
            .map(json_to_node)
            .unwrap_or_default();
        success_envelope(result)
    } else {
        let description = match json.get(keys::FAILURE_DESCRIPTION) {
            Some(Value::String(text)) => text.clone(),
            Some(nested) => find_failure(nested).unwrap_or_else(|| UNKNOWN_FAILURE.to_string()),
            None => UNKNOWN_FAILURE.to_string(),
        };
        debug!("upload reported failure: {description}");
        failed_envelope(description)
    }
}

// Depth-first search for the first key containing "failure" with a
// non-empty string value.
fn find_failure(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.contains("failure") {
                    if let Some(text) = child.as_str() {
                        if !text.is_empty() {
                            return Some(text.to_string());
                        }
                    }
                }
                if let Some(found) = find_failure(child) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(find_failure),
        _ => None,
    }
}

/// Converts a JSON value into the model tree. Integral numbers become ints
/// when they fit, longs otherwise; `null` maps to undefined.
pub fn json_to_node(json: &Value) -> ModelNode {
    match json {
        Value::Null => ModelNode::Undefined,
        Value::Bool(b) => ModelNode::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(small) => ModelNode::Int(small),
                    Err(_) => ModelNode::Long(i),
                }
            } else {
                ModelNode::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => ModelNode::String(s.clone()),
        Value::Array(items) => ModelNode::List(items.iter().map(json_to_node).collect()),
        Value::Object(map) => {
            ModelNode::Object(map.iter().map(|(k, v)| (k.clone(), json_to_node(v))).collect())
        }
    }
}
