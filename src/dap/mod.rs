//! Debug Adapter Protocol (DAP) client
//!
//! Drives debug adapters like lldb-dap on behalf of the relay host.

pub mod client;
pub mod codec;
pub mod types;

pub use client::{DapClient, InFlight};
pub use types::*;
