//! Common utilities shared between the host and the agent-facing side

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
