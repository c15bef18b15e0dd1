//! Session state cache for the agent-facing side
//!
//! A point-in-time view of the debug session built only from relay events
//! and connection transitions. Commands never touch it, so it can lag behind
//! a session that changed state through some other channel.

use std::sync::RwLock;

use serde::Serialize;

use super::protocol::Event;

/// State of the link to the relay host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Snapshot returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub is_stopped: bool,
    pub current_thread_id: i64,
    pub stop_reason: String,
    pub connection_status: ConnectionStatus,
    pub connection_port: Option<u16>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            is_stopped: false,
            current_thread_id: 0,
            stop_reason: String::new(),
            connection_status: ConnectionStatus::Disconnected,
            connection_port: None,
        }
    }
}

/// Continuously updated snapshot of the debug session
#[derive(Debug, Default)]
pub struct SessionStateCache {
    inner: RwLock<SessionSnapshot>,
}

impl SessionStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, without a round trip to the host
    pub fn snapshot(&self) -> SessionSnapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Fold one relay event into the cache
    pub fn apply_event(&self, event: &Event) {
        self.update(|state| match event {
            Event::DebuggerStopped {
                reason, thread_id, ..
            } => {
                state.is_stopped = true;
                state.current_thread_id = *thread_id;
                state.stop_reason = reason.clone();
            }
            Event::DebuggerContinued { .. } => {
                state.is_stopped = false;
            }
        });
    }

    pub fn set_connecting(&self, port: u16) {
        self.set_connection(ConnectionStatus::Connecting, port);
    }

    pub fn set_connected(&self, port: u16) {
        self.set_connection(ConnectionStatus::Connected, port);
    }

    pub fn set_disconnected(&self) {
        self.update(|state| state.connection_status = ConnectionStatus::Disconnected);
    }

    fn set_connection(&self, status: ConnectionStatus, port: u16) {
        self.update(|state| {
            state.connection_status = status;
            state.connection_port = Some(port);
        });
    }

    fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped(thread_id: i64, reason: &str) -> Event {
        Event::DebuggerStopped {
            reason: reason.to_string(),
            thread_id,
            description: None,
            all_threads_stopped: None,
        }
    }

    fn continued(thread_id: i64) -> Event {
        Event::DebuggerContinued {
            thread_id,
            all_threads_continued: Some(true),
        }
    }

    #[test]
    fn test_initial_state() {
        let cache = SessionStateCache::new();
        let snapshot = cache.snapshot();
        assert!(!snapshot.is_stopped);
        assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(snapshot.connection_port, None);
    }

    #[test]
    fn test_replay_stop_continue_stop() {
        let cache = SessionStateCache::new();
        for event in [stopped(1, "breakpoint"), continued(1), stopped(2, "exception")] {
            cache.apply_event(&event);
        }

        let snapshot = cache.snapshot();
        assert!(snapshot.is_stopped);
        assert_eq!(snapshot.current_thread_id, 2);
        assert_eq!(snapshot.stop_reason, "exception");
    }

    #[test]
    fn test_continue_keeps_last_thread_and_reason() {
        let cache = SessionStateCache::new();
        cache.apply_event(&stopped(7, "step"));
        cache.apply_event(&continued(7));

        let snapshot = cache.snapshot();
        assert!(!snapshot.is_stopped);
        assert_eq!(snapshot.current_thread_id, 7);
        assert_eq!(snapshot.stop_reason, "step");
    }

    #[test]
    fn test_connection_transitions_do_not_touch_debug_state() {
        let cache = SessionStateCache::new();
        cache.apply_event(&stopped(3, "pause"));

        cache.set_connecting(40123);
        assert_eq!(cache.snapshot().connection_status, ConnectionStatus::Connecting);

        cache.set_connected(40123);
        cache.set_disconnected();

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(snapshot.connection_port, Some(40123));
        assert!(snapshot.is_stopped);
        assert_eq!(snapshot.current_thread_id, 3);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let value = serde_json::to_value(SessionStateCache::new().snapshot()).unwrap();
        assert_eq!(value["connectionStatus"], "disconnected");
        assert_eq!(value["isStopped"], false);
    }
}
