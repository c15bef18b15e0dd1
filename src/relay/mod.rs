//! The relay protocol and its agent-facing side
//!
//! The host side lives in [`crate::host`] and shares the protocol, codec and
//! transport defined here.

pub mod client;
pub mod codec;
pub mod protocol;
pub mod state;
pub mod transport;

pub use client::RelayClient;
pub use protocol::{Command, Event, Message, Request, Response, ResponseBody};
pub use state::{ConnectionStatus, SessionSnapshot, SessionStateCache};
