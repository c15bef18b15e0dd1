//! Relay protocol message types
//!
//! Every frame is one JSON object whose `type` field selects the message
//! kind. Requests and responses carry a `command` sub-discriminant and an
//! opaque `id`; events carry an `event` sub-discriminant and no id.
//!
//! ```text
//! {"type":"request","command":"getStackTrace","id":"7","threadId":1}
//! {"type":"response","command":"getStackTrace","id":"7","success":true,"stackFrames":[...]}
//! {"type":"event","event":"debuggerStopped","reason":"breakpoint","threadId":1}
//! ```

use serde::{Deserialize, Serialize};

/// Any frame exchanged over the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

/// Request from the agent-facing side to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed back in the response
    pub id: String,
    /// The command to execute
    #[serde(flatten)]
    pub command: Command,
}

/// Commands the host can execute against the debug session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Run a raw debugger command in the session's command context
    ExecuteLldbCommand {
        #[serde(rename = "lldbCommand")]
        lldb_command: String,
    },

    /// Get the call stack of a thread
    GetStackTrace {
        #[serde(rename = "threadId")]
        thread_id: i64,
    },

    /// Get the children of a variables reference
    GetVariables {
        #[serde(rename = "variablesReference")]
        variables_reference: i64,
    },
}

impl Command {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecuteLldbCommand { .. } => "executeLldbCommand",
            Self::GetStackTrace { .. } => "getStackTrace",
            Self::GetVariables { .. } => "getVariables",
        }
    }

    /// Response body with no result, used on the failure path
    pub fn empty_body(&self) -> ResponseBody {
        match self {
            Self::ExecuteLldbCommand { .. } => ResponseBody::ExecuteLldbCommand { result: None },
            Self::GetStackTrace { .. } => ResponseBody::GetStackTrace { stack_frames: None },
            Self::GetVariables { .. } => ResponseBody::GetVariables { variables: None },
        }
    }
}

/// Response from the host, exactly one per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this response answers
    pub id: String,
    /// Whether the command succeeded
    pub success: bool,
    /// Error text on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Command-specific result fields
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    /// Create a success response
    pub fn success(id: String, body: ResponseBody) -> Self {
        Self {
            id,
            success: true,
            error: None,
            body,
        }
    }

    /// Create an error response for the given command
    pub fn error(id: String, command: &Command, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            error: Some(error.into()),
            body: command.empty_body(),
        }
    }

    /// Wire name of the answered command
    pub fn command_name(&self) -> &'static str {
        self.body.command_name()
    }
}

/// Command-specific part of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ResponseBody {
    ExecuteLldbCommand {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },

    GetStackTrace {
        #[serde(rename = "stackFrames", default, skip_serializing_if = "Option::is_none")]
        stack_frames: Option<Vec<StackFrameInfo>>,
    },

    GetVariables {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variables: Option<Vec<VariableInfo>>,
    },
}

impl ResponseBody {
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::ExecuteLldbCommand { .. } => "executeLldbCommand",
            Self::GetStackTrace { .. } => "getStackTrace",
            Self::GetVariables { .. } => "getVariables",
        }
    }
}

/// Unsolicited notifications pushed by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// Execution stopped (breakpoint, step, exception, pause, ...)
    DebuggerStopped {
        reason: String,
        #[serde(rename = "threadId")]
        thread_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(
            rename = "allThreadsStopped",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        all_threads_stopped: Option<bool>,
    },

    /// Execution resumed
    DebuggerContinued {
        #[serde(rename = "threadId")]
        thread_id: i64,
        #[serde(
            rename = "allThreadsContinued",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        all_threads_continued: Option<bool>,
    },
}

impl Event {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::DebuggerStopped { .. } => "debuggerStopped",
            Self::DebuggerContinued { .. } => "debuggerContinued",
        }
    }
}

// === Result types ===

/// Stack frame information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrameInfo {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// Variable information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableInfo {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// 0 when the value has no children
    #[serde(default)]
    pub variables_reference: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let msg = Message::Request(Request {
            id: "3".to_string(),
            command: Command::GetStackTrace { thread_id: 1 },
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "request", "command": "getStackTrace", "id": "3", "threadId": 1})
        );
    }

    #[test]
    fn test_failed_response_omits_result_fields() {
        let command = Command::GetVariables {
            variables_reference: 0,
        };
        let msg = Message::Response(Response::error("9".to_string(), &command, "nope"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "response",
                "command": "getVariables",
                "id": "9",
                "success": false,
                "error": "nope"
            })
        );
    }

    #[test]
    fn test_stopped_event_optional_fields() {
        let msg: Message = serde_json::from_value(json!({
            "type": "event",
            "event": "debuggerStopped",
            "reason": "breakpoint",
            "threadId": 4
        }))
        .unwrap();
        assert_eq!(
            msg,
            Message::Event(Event::DebuggerStopped {
                reason: "breakpoint".to_string(),
                thread_id: 4,
                description: None,
                all_threads_stopped: None,
            })
        );
    }

    #[test]
    fn test_variable_type_field_name() {
        let var = VariableInfo {
            name: "count".to_string(),
            value: "3".to_string(),
            type_name: Some("int".to_string()),
            variables_reference: 0,
        };
        let value = serde_json::to_value(&var).unwrap();
        assert_eq!(
            value,
            json!({"name": "count", "value": "3", "type": "int", "variablesReference": 0})
        );
    }

    #[test]
    fn test_names_match_wire_tags() {
        let command = Command::ExecuteLldbCommand {
            lldb_command: "bt".to_string(),
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["command"], command.name());
        assert_eq!(command.empty_body().command_name(), command.name());
    }
}
