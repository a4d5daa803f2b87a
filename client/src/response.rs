//! Finish message construction for completed snippets

use crate::error::{DispatchError, DispatchResult};
use crate::host::Value;
use log::error;
use shared::{FinishSpSnippet, Packet, Reliability, ReturnValue, NO_RESPONSE_SNIPPET_IDX};
use tokio::sync::mpsc;

/// Packet queued for the network sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub packet: Packet,
    pub reliability: Reliability,
}

/// Builds the finish message for `result`, or `None` for fire-and-forget snippets.
///
/// Void results are reported exactly like null ones. Anything that is not
/// null, a number, a string or a boolean cannot be sent back.
pub fn encode_result(snippet_idx: u32, result: Value) -> DispatchResult<Option<FinishSpSnippet>> {
    if snippet_idx == NO_RESPONSE_SNIPPET_IDX {
        return Ok(None);
    }

    let return_value = match result {
        Value::Undefined | Value::Null => None,
        Value::Number(n) => Some(ReturnValue::Number(n)),
        Value::String(s) => Some(ReturnValue::String(s)),
        Value::Bool(b) => Some(ReturnValue::Bool(b)),
        other => {
            return Err(DispatchError::UnsupportedResult {
                type_name: other.type_name(),
            })
        }
    };

    Ok(Some(FinishSpSnippet {
        snippet_idx,
        return_value,
    }))
}

/// Hands finish messages to the network layer.
#[derive(Clone)]
pub struct ResponseEncoder {
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl ResponseEncoder {
    pub fn new(outgoing: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self { outgoing }
    }

    pub fn send(&self, finish: FinishSpSnippet) {
        let message = Outgoing {
            packet: Packet::FinishSpSnippet(finish),
            reliability: Reliability::Reliable,
        };

        if let Err(e) = self.outgoing.send(message) {
            error!("Failed to queue finish message: {}", e);
        }
    }
}
