//! The debug-session capability the host relays to
//!
//! The host never talks to a debugger directly. It drives whatever
//! [`DebugSession`] is currently installed in the [`SessionSlot`] and learns
//! about stops and resumes through [`Lifecycle`] notifications.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::common::Result;
use crate::relay::protocol::{StackFrameInfo, VariableInfo};

/// Capacity of the lifecycle bus
pub const LIFECYCLE_CAPACITY: usize = 256;

/// Operations the host can perform against a live debug session
#[async_trait]
pub trait DebugSession: Send + Sync + 'static {
    /// Run a command in the debugger's command (REPL) context
    async fn evaluate_command(&self, command: &str) -> Result<String>;

    /// Up to `levels` frames of a thread's call stack, innermost first
    async fn stack_trace(&self, thread_id: i64, levels: i64) -> Result<Vec<StackFrameInfo>>;

    /// Children of a non-zero variables reference
    async fn variables(&self, reference: i64) -> Result<Vec<VariableInfo>>;
}

/// State changes published by the debug session
#[derive(Debug, Clone, PartialEq)]
pub enum Lifecycle {
    Stopped {
        reason: Option<String>,
        thread_id: i64,
        description: Option<String>,
        all_threads_stopped: Option<bool>,
    },
    Continued {
        thread_id: i64,
        all_threads_continued: Option<bool>,
    },
    /// The session is gone; the host drops it from its slot
    Terminated,
}

/// Bus that carries [`Lifecycle`] notifications to the broadcaster
pub fn lifecycle_bus() -> broadcast::Sender<Lifecycle> {
    broadcast::channel(LIFECYCLE_CAPACITY).0
}

/// Holder of the currently active session, if any
pub struct SessionSlot<S> {
    inner: Arc<RwLock<Option<Arc<S>>>>,
}

impl<S> Clone for SessionSlot<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Default for SessionSlot<S> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }
}

impl<S> SessionSlot<S> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_session(session: Arc<S>) -> Self {
        let slot = Self::default();
        slot.set(session);
        slot
    }

    /// Install a session, replacing any previous one
    pub fn set(&self, session: Arc<S>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Remove the session, returning it
    pub fn clear(&self) -> Option<Arc<S>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// The active session, cloned out so no lock is held while it is used
    pub fn current(&self) -> Option<Arc<S>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }
}
