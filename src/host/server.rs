//! Relay host server - WebSocket listener and per-peer loops

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::common::config::RelayConfig;
use crate::common::{Error, Result};
use crate::relay::codec::{self, ErrorFrame};
use crate::relay::protocol::Message;
use crate::relay::transport;

use super::broadcaster;
use super::capability::{DebugSession, Lifecycle, SessionSlot};
use super::handler;

/// Outbound queues of every connected peer
#[derive(Default)]
pub struct PeerSet {
    next_id: AtomicU64,
    peers: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
}

impl PeerSet {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<String>>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a peer, returning its id, its queue and the queue's receiving end
    fn register(&self) -> (u64, mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx.clone());
        (id, tx, rx)
    }

    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Number of connected peers
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a frame for every open peer, returning how many took it
    pub fn broadcast(&self, text: &str) -> usize {
        self.lock()
            .values()
            .filter(|tx| tx.send(text.to_string()).is_ok())
            .count()
    }
}

/// Listening side of the relay
pub struct RelayHost<S> {
    listener: TcpListener,
    port: u16,
    slot: SessionSlot<S>,
    peers: Arc<PeerSet>,
    lifecycle: broadcast::Receiver<Lifecycle>,
}

impl<S: DebugSession> RelayHost<S> {
    /// Bind the listener and subscribe to the lifecycle bus
    pub async fn bind(
        config: &RelayConfig,
        slot: SessionSlot<S>,
        lifecycle: &broadcast::Sender<Lifecycle>,
    ) -> Result<Self> {
        let (listener, port) = transport::bind_listener(config).await?;
        tracing::info!(port, "Relay host listening on ws://{}:{}", transport::LOOPBACK, port);

        Ok(Self {
            listener,
            port,
            slot,
            peers: Arc::new(PeerSet::default()),
            lifecycle: lifecycle.subscribe(),
        })
    }

    /// Port the listener is bound to
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn peers(&self) -> Arc<PeerSet> {
        Arc::clone(&self.peers)
    }

    /// Accept peers until `shutdown` completes
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Self {
            listener,
            port,
            slot,
            peers,
            lifecycle,
        } = self;

        let events = tokio::spawn(broadcaster::run(
            lifecycle,
            Arc::clone(&peers),
            slot.clone(),
        ));

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(port, "Relay host shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(%addr, "Accepted connection");
                        tokio::spawn(serve_peer(stream, slot.clone(), Arc::clone(&peers)));
                    }
                    Err(e) => tracing::error!(error = %e, "Accept error"),
                },
            }
        }

        events.abort();
        Ok(())
    }
}

/// Serve one peer until it disconnects
async fn serve_peer<S: DebugSession>(stream: TcpStream, slot: SessionSlot<S>, peers: Arc<PeerSet>) {
    let ws = match transport::accept_peer(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = ws.split();
    let (peer_id, outbound, mut queue) = peers.register();
    tracing::info!(peer = peer_id, peers = peers.len(), "Peer connected");

    tokio::spawn(async move {
        while let Some(text) = queue.recv().await {
            if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                tracing::debug!(peer = peer_id, error = %e, "Peer write failed");
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Binary(_)) => {
                reject(&outbound, "binary frames are not supported");
                continue;
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(peer = peer_id, error = %e, "Peer read failed");
                break;
            }
        };

        match codec::decode(text.as_str()) {
            Ok(Message::Request(request)) => {
                let slot = slot.clone();
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    let response = handler::handle_request(&slot, request).await;
                    match codec::encode(&Message::Response(response)) {
                        Ok(text) => {
                            let _ = outbound.send(text);
                        }
                        Err(e) => tracing::error!(error = %e, "Failed to encode response"),
                    }
                });
            }
            Ok(other) => {
                tracing::debug!(peer = peer_id, message = ?other, "Ignoring non-request message");
            }
            Err(e) => {
                tracing::warn!(peer = peer_id, error = %e, "Malformed frame");
                let details = match e {
                    Error::MalformedMessage(details) => details,
                    other => other.to_string(),
                };
                reject(&outbound, details);
            }
        }
    }

    peers.remove(peer_id);
    tracing::info!(peer = peer_id, peers = peers.len(), "Peer disconnected");
}

fn reject(outbound: &mpsc::UnboundedSender<String>, details: impl Into<String>) {
    match codec::encode_error_frame(&ErrorFrame::invalid_format(details)) {
        Ok(text) => {
            let _ = outbound.send(text);
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode error frame"),
    }
}
