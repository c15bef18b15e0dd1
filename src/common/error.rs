//! Error types for the relay
//!
//! Error messages are designed to be clear and actionable for LLM agents,
//! with hints on how to resolve common issues.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("Failed to connect to relay host on port {port} after {attempts} attempts. Is 'lldb-relay host' running?")]
    ConnectFailed { port: u16, attempts: u32 },

    #[error("A connection attempt to the relay host is already in progress, retry shortly")]
    ConnectionInProgress,

    #[error("Connection to the relay host closed before a response arrived")]
    ConnectionClosed,

    #[error("Failed to bind relay listener after {attempts} attempts: {last_error}")]
    BindFailed { attempts: u32, last_error: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    // === Message Errors ===
    #[error("Malformed relay message: {0}")]
    MalformedMessage(String),

    // === Session Errors ===
    #[error("No active debug session")]
    SessionNotActive,

    #[error("variablesReference 0 has no children. Pass a non-zero variablesReference taken from a previous getStackTrace or getVariables result")]
    InvalidVariablesReference,

    // === Command Errors ===
    #[error("{0}")]
    CommandFailed(String),

    #[error("No response to '{command}' within {secs} seconds. The command may still complete on the debugger side")]
    RequestTimeout { command: String, secs: u64 },

    // === Adapter Errors ===
    #[error("Debug adapter '{name}' not found. Searched: {searched}")]
    AdapterNotFound { name: String, searched: String },

    #[error("Debug adapter failed to start: {0}")]
    AdapterStartFailed(String),

    #[error("Debug adapter crashed unexpectedly")]
    AdapterCrashed,

    // === DAP Protocol Errors ===
    #[error("DAP protocol error: {0}")]
    DapProtocol(String),

    #[error("DAP request '{command}' failed: {message}")]
    DapRequestFailed { command: String, message: String },

    #[error("DAP initialization failed: {0}")]
    DapInitFailed(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an adapter not found error with search paths
    pub fn adapter_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::AdapterNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create a DAP request failed error
    pub fn dap_request_failed(command: &str, message: &str) -> Self {
        Self::DapRequestFailed {
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error came from the transport rather than from the debugger
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. }
                | Self::ConnectionInProgress
                | Self::ConnectionClosed
                | Self::WebSocket(_)
                | Self::Io(_)
        )
    }

    /// Text placed in the `error` field of a failed relay response.
    ///
    /// Operation errors from the debugger are passed through verbatim.
    pub fn response_text(&self) -> String {
        match self {
            Self::DapRequestFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}
