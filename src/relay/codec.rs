//! Relay frame codec
//!
//! Frames are parsed as JSON first and then validated against the three
//! message kinds in a single union check. Anything that fails either step is
//! malformed: the host answers it with an [`ErrorFrame`], the client drops it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Error, Result};

use super::protocol::Message;

/// Error text used in structural error frames
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";

/// Reply sent by the host for a frame that is not a valid message.
///
/// Deliberately not a [`Message`]: it has no `type` and no id, so it can never
/// be mistaken for the response to a pending request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
    pub details: String,
}

impl ErrorFrame {
    pub fn invalid_format(details: impl Into<String>) -> Self {
        Self {
            error: INVALID_MESSAGE_FORMAT.to_string(),
            details: details.into(),
        }
    }
}

/// Decode and validate one text frame
pub fn decode(text: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::MalformedMessage(format!("invalid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(Error::MalformedMessage(
            "frame is not a JSON object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| Error::MalformedMessage(e.to_string()))
}

/// Encode a message as one text frame
pub fn encode(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Encode a structural error frame
pub fn encode_error_frame(frame: &ErrorFrame) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}
