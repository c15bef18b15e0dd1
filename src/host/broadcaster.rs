//! Pushes debug-session state changes to every connected peer

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::relay::codec;
use crate::relay::protocol::{Event, Message};

use super::capability::{Lifecycle, SessionSlot};
use super::server::PeerSet;

/// Reason reported when the session gives none
const UNKNOWN_REASON: &str = "unknown";

/// Relay event for a lifecycle notification; `None` for notifications that
/// are handled on the host only
pub fn relay_event(lifecycle: Lifecycle) -> Option<Event> {
    match lifecycle {
        Lifecycle::Stopped {
            reason,
            thread_id,
            description,
            all_threads_stopped,
        } => Some(Event::DebuggerStopped {
            reason: reason.unwrap_or_else(|| UNKNOWN_REASON.to_string()),
            thread_id,
            description,
            all_threads_stopped,
        }),
        Lifecycle::Continued {
            thread_id,
            all_threads_continued,
        } => Some(Event::DebuggerContinued {
            thread_id,
            all_threads_continued,
        }),
        Lifecycle::Terminated => None,
    }
}

/// Forward lifecycle notifications until the bus closes
pub async fn run<S>(
    mut lifecycle: broadcast::Receiver<Lifecycle>,
    peers: Arc<PeerSet>,
    slot: SessionSlot<S>,
) {
    loop {
        let notification = match lifecycle.recv().await {
            Ok(notification) => notification,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Broadcaster fell behind, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if notification == Lifecycle::Terminated {
            if slot.clear().is_some() {
                tracing::info!("Debug session ended");
            }
            continue;
        }

        let Some(event) = relay_event(notification) else {
            continue;
        };
        let name = event.name();
        match codec::encode(&Message::Event(event)) {
            Ok(text) => {
                let delivered = peers.broadcast(&text);
                tracing::debug!(event = name, delivered, "Broadcast event");
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::capability::lifecycle_bus;

    #[test]
    fn test_missing_reason_becomes_unknown() {
        let event = relay_event(Lifecycle::Stopped {
            reason: None,
            thread_id: 5,
            description: None,
            all_threads_stopped: Some(false),
        });
        assert_eq!(
            event,
            Some(Event::DebuggerStopped {
                reason: "unknown".to_string(),
                thread_id: 5,
                description: None,
                all_threads_stopped: Some(false),
            })
        );
    }

    #[test]
    fn test_terminated_is_not_relayed() {
        assert_eq!(relay_event(Lifecycle::Terminated), None);
    }

    #[tokio::test]
    async fn test_terminated_clears_slot() {
        let bus = lifecycle_bus();
        let slot = SessionSlot::with_session(Arc::new(()));
        let task = tokio::spawn(run(bus.subscribe(), Arc::new(PeerSet::default()), slot.clone()));

        bus.send(Lifecycle::Terminated).unwrap();
        drop(bus);
        task.await.unwrap();

        assert!(!slot.is_active());
    }
}
