//! Call Trace Decoder
//!
//! Decodes the `callTracer` response of `debug_traceCall` into a tree of
//! [`CallFrame`]s. Child frames keep the order the node returned them in,
//! which is the order the sub-calls were made.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while decoding a trace response
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Trace response was empty")]
    EmptyResult,

    #[error("Unexpected trace shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("Invalid hex: {0}")]
    Hex(String),
}

/// One frame of a call trace
///
/// Fields are kept as the hex/decimal strings the tracer emits; absent fields
/// decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub gas: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub time: String,
    /// Frame kind (CALL, STATICCALL, DELEGATECALL, CREATE, ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    /// Sub-calls in call order
    #[serde(default)]
    pub calls: Vec<CallFrame>,
}

impl CallFrame {
    /// Number of frames in this tree, including the root
    pub fn node_count(&self) -> usize {
        1 + self.calls.iter().map(CallFrame::node_count).sum::<usize>()
    }

    /// Depth of the tree; a frame without children has depth 1
    pub fn depth(&self) -> usize {
        1 + self.calls.iter().map(CallFrame::depth).max().unwrap_or(0)
    }

    /// Pre-order walk over every frame in the tree
    pub fn iter(&self) -> impl Iterator<Item = &CallFrame> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let frame = stack.pop()?;
            stack.extend(frame.calls.iter().rev());
            Some(frame)
        })
    }

    /// Whether this frame (not its children) reverted
    pub fn is_reverted(&self) -> bool {
        self.error.is_some()
    }

    /// 4-byte selector of this frame's input, if it carries one
    pub fn selector(&self) -> Option<[u8; 4]> {
        let input = hex_to_bytes(&self.input).ok()?;
        extract_method_id(&input)
    }
}

/// Decode a raw `debug_traceCall` result into a call tree
pub fn decode_call_frame(raw: Value) -> Result<CallFrame, DecodeError> {
    if raw.is_null() {
        return Err(DecodeError::EmptyResult);
    }
    Ok(serde_json::from_value(raw)?)
}

/// Extract method ID from call input data
///
/// # Returns
/// `Some([u8; 4])` if input has at least 4 bytes, `None` otherwise
pub fn extract_method_id(input: &[u8]) -> Option<[u8; 4]> {
    if input.len() < 4 {
        return None;
    }
    let mut method_id = [0u8; 4];
    method_id.copy_from_slice(&input[..4]);
    Some(method_id)
}

/// Parse a hex string to bytes (with or without 0x prefix)
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, DecodeError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| DecodeError::Hex(e.to_string()))
}
