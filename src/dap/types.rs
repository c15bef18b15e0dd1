//! DAP message types
//!
//! Only the slice of the Debug Adapter Protocol the relay host drives:
//! session setup, stack traces, variables, evaluate, and the lifecycle
//! events. See: https://microsoft.github.io/debug-adapter-protocol/specification

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Base Protocol Messages ===

/// Request sent to the adapter
#[derive(Debug, Clone, Serialize)]
pub struct RequestMessage<'a> {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl<'a> RequestMessage<'a> {
    pub fn new(seq: i64, command: &'a str, arguments: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "request",
            command,
            arguments,
        }
    }
}

/// Message read from the adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IncomingMessage {
    Response(ResponseMessage),
    Event(EventMessage),
    /// Reverse requests (runInTerminal, ...) are not supported
    Request(Value),
}

/// DAP response message
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl ResponseMessage {
    /// Error text the adapter attached to a failed response.
    ///
    /// lldb-dap puts the useful text in `body.error.format` and a short
    /// code in `message`, so the body wins when present.
    pub fn error_text(&self) -> String {
        self.body
            .as_ref()
            .and_then(|b| b.pointer("/error/format"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| format!("{} failed", self.command))
    }
}

/// DAP event message
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub body: Option<Value>,
}

// === Request Arguments ===

/// Initialize request arguments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_name: String,
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    pub lines_start_at1: bool,
    pub columns_start_at1: bool,
    pub path_format: String,
    pub supports_variable_type: bool,
    pub supports_variable_paging: bool,
    pub supports_run_in_terminal_request: bool,
}

impl InitializeArguments {
    pub fn new(adapter_id: &str) -> Self {
        Self {
            client_id: "lldb-relay".to_string(),
            client_name: "LLDB Relay".to_string(),
            adapter_id: adapter_id.to_string(),
            lines_start_at1: true,
            columns_start_at1: true,
            path_format: "path".to_string(),
            supports_variable_type: true,
            supports_variable_paging: false,
            supports_run_in_terminal_request: false,
        }
    }
}

/// Launch request arguments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    pub program: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub stop_on_entry: bool,
}

/// Attach request arguments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArguments {
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_on_entry: Option<bool>,
}

/// StackTrace request arguments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: i64,
    pub start_frame: i64,
    pub levels: i64,
}

/// Variables request arguments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

/// Evaluate request arguments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    pub context: String,
}

/// Disconnect request arguments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    pub terminate_debuggee: bool,
}

// === Response Bodies ===

/// Capabilities returned by the initialize response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub supports_configuration_done_request: bool,
    #[serde(default)]
    pub supports_evaluate_for_hovers: bool,
    #[serde(default)]
    pub supports_terminate_request: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    pub stack_frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariablesResponseBody {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    pub result: String,
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub variables_reference: i64,
}

// === Common Types ===

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub variables_reference: i64,
}

// === Event Bodies ===

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub all_threads_stopped: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: i64,
    #[serde(default)]
    pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    pub exit_code: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputEventBody {
    #[serde(default)]
    pub category: Option<String>,
    pub output: String,
}

// === Parsed Events ===

/// Adapter event the host cares about
#[derive(Debug, Clone)]
pub enum Event {
    Initialized,
    Stopped(StoppedEventBody),
    Continued(ContinuedEventBody),
    Exited(ExitedEventBody),
    Terminated,
    Output(OutputEventBody),
    Other(String),
}

impl Event {
    /// Parse an event from an EventMessage. Bodies that do not match the
    /// expected shape degrade to [`Event::Other`].
    pub fn from_message(msg: EventMessage) -> Self {
        let EventMessage { event, body } = msg;
        let parsed = match event.as_str() {
            "initialized" => Some(Event::Initialized),
            "terminated" => Some(Event::Terminated),
            "stopped" => parse_body(&body).map(Event::Stopped),
            "continued" => parse_body(&body).map(Event::Continued),
            "exited" => parse_body(&body).map(Event::Exited),
            "output" => parse_body(&body).map(Event::Output),
            _ => None,
        };
        parsed.unwrap_or(Event::Other(event))
    }
}

fn parse_body<T: DeserializeOwned>(body: &Option<Value>) -> Option<T> {
    body.as_ref()
        .and_then(|b| serde_json::from_value(b.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> Event {
        match serde_json::from_value::<IncomingMessage>(value).unwrap() {
            IncomingMessage::Event(msg) => Event::from_message(msg),
            other => panic!("Expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_stopped_event() {
        let parsed = event(json!({
            "seq": 10,
            "type": "event",
            "event": "stopped",
            "body": {"reason": "breakpoint", "threadId": 1, "allThreadsStopped": true}
        }));
        match parsed {
            Event::Stopped(body) => {
                assert_eq!(body.reason.as_deref(), Some("breakpoint"));
                assert_eq!(body.thread_id, Some(1));
                assert_eq!(body.all_threads_stopped, Some(true));
            }
            other => panic!("Expected Stopped, got {:?}", other),
        }
    }

    #[test]
    fn test_continued_without_body_degrades() {
        let parsed = event(json!({"seq": 3, "type": "event", "event": "continued"}));
        assert!(matches!(parsed, Event::Other(name) if name == "continued"));
    }

    #[test]
    fn test_terminated_ignores_body() {
        let parsed = event(json!({
            "seq": 4, "type": "event", "event": "terminated", "body": {"restart": false}
        }));
        assert!(matches!(parsed, Event::Terminated));
    }

    #[test]
    fn test_error_text_prefers_body_format() {
        let response: ResponseMessage = serde_json::from_value(json!({
            "seq": 8,
            "type": "response",
            "request_seq": 7,
            "success": false,
            "command": "evaluate",
            "message": "error",
            "body": {"error": {"id": 3, "format": "use of undeclared identifier 'foo'"}}
        }))
        .unwrap();
        assert_eq!(response.error_text(), "use of undeclared identifier 'foo'");
    }

    #[test]
    fn test_request_serialization() {
        let request = RequestMessage::new(
            5,
            "stackTrace",
            Some(
                serde_json::to_value(StackTraceArguments {
                    thread_id: 1,
                    start_frame: 0,
                    levels: 100,
                })
                .unwrap(),
            ),
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "seq": 5,
                "type": "request",
                "command": "stackTrace",
                "arguments": {"threadId": 1, "startFrame": 0, "levels": 100}
            })
        );
    }
}
