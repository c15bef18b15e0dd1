//! lldb-relay - a relay between AI agents and a live LLDB debug session
//!
//! The host side ([`host`]) owns the debug session and listens for
//! WebSocket peers; the agent-facing side ([`relay::RelayClient`]) forwards
//! requests to it and tracks the session state from the events it pushes.

pub mod cli;
pub mod commands;
pub mod common;
pub mod dap;
pub mod host;
pub mod relay;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use relay::{Command, RelayClient};
