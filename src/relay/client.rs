//! Agent-facing relay client
//!
//! [`RelayClient`] correlates requests with responses over a single
//! WebSocket link to the host. The link is opened lazily by the first
//! [`RelayClient::send`] and reopened by the next one after it drops; there is
//! no background reconnect. Events from the host are folded into a
//! [`SessionStateCache`] and re-published to local subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::common::config::ClientConfig;
use crate::common::{Error, Result};

use super::codec::{self, ErrorFrame};
use super::protocol::{
    Command, Event, Message, Request, Response, ResponseBody, StackFrameInfo, VariableInfo,
};
use super::state::{SessionSnapshot, SessionStateCache};
use super::transport::{self, ClientStream};

/// Capacity of the local event fan-out; slow subscribers lag rather than block
const EVENT_CHANNEL_CAPACITY: usize = 64;

type PendingTable = HashMap<String, oneshot::Sender<Response>>;

/// Handle to the relay host. Cheap to clone; clones share one link.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<Inner>,
}

struct Inner {
    port: u16,
    config: ClientConfig,
    link: Mutex<Option<Link>>,
    connecting: AtomicBool,
    pending: Mutex<PendingTable>,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    retry_count: AtomicU32,
    cache: SessionStateCache,
    events: broadcast::Sender<Event>,
}

/// An open connection, identified by generation so a stale reader cannot
/// tear down its successor
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    generation: u64,
}

impl RelayClient {
    pub fn new(port: u16, config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                port,
                config,
                link: Mutex::new(None),
                connecting: AtomicBool::new(false),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
                retry_count: AtomicU32::new(0),
                cache: SessionStateCache::new(),
                events,
            }),
        }
    }

    /// Port of the relay host this client talks to
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Current session snapshot, without a round trip
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.cache.snapshot()
    }

    /// Failed connection attempts since the last successful connection
    pub fn retry_count(&self) -> u32 {
        self.inner.retry_count.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.current_link().is_some()
    }

    /// Receive every event the host pushes from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Open the link if it is not open yet
    pub async fn connect(&self) -> Result<()> {
        self.ensure_connected().await.map(|_| ())
    }

    /// Send a command and wait for its response.
    ///
    /// Resolves exactly once: with the response body, with the host's error
    /// text, or with [`Error::RequestTimeout`] once the configured window
    /// elapses.
    pub async fn send(&self, command: Command) -> Result<ResponseBody> {
        let outbound = self.ensure_connected().await?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let name = command.name();
        let text = codec::encode(&Message::Request(Request {
            id: id.clone(),
            command,
        }))?;

        let (tx, rx) = oneshot::channel();
        self.inner.lock_pending().insert(id.clone(), tx);
        let _pending = PendingEntry {
            inner: &self.inner,
            id: &id,
        };

        tracing::debug!(id = %id, command = name, "Sending request");
        outbound.send(text).map_err(|_| Error::ConnectionClosed)?;

        let timeout = self.inner.config.request_timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) if response.success => Ok(response.body),
            Ok(Ok(response)) => Err(Error::CommandFailed(
                response
                    .error
                    .unwrap_or_else(|| format!("{} failed", name)),
            )),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                tracing::warn!(id = %id, command = name, "Request timed out");
                Err(Error::RequestTimeout {
                    command: name.to_string(),
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Run a raw debugger command and return its output text
    pub async fn execute_lldb_command(&self, lldb_command: impl Into<String>) -> Result<String> {
        let command = Command::ExecuteLldbCommand {
            lldb_command: lldb_command.into(),
        };
        match self.send(command).await? {
            ResponseBody::ExecuteLldbCommand { result } => Ok(result.unwrap_or_default()),
            other => Err(unexpected_body("executeLldbCommand", &other)),
        }
    }

    /// Call stack of a thread, innermost frame first
    pub async fn stack_trace(&self, thread_id: i64) -> Result<Vec<StackFrameInfo>> {
        match self.send(Command::GetStackTrace { thread_id }).await? {
            ResponseBody::GetStackTrace { stack_frames } => Ok(stack_frames.unwrap_or_default()),
            other => Err(unexpected_body("getStackTrace", &other)),
        }
    }

    /// Children of a variables reference
    pub async fn variables(&self, variables_reference: i64) -> Result<Vec<VariableInfo>> {
        match self
            .send(Command::GetVariables {
                variables_reference,
            })
            .await?
        {
            ResponseBody::GetVariables { variables } => Ok(variables.unwrap_or_default()),
            other => Err(unexpected_body("getVariables", &other)),
        }
    }

    async fn ensure_connected(&self) -> Result<mpsc::UnboundedSender<String>> {
        if let Some(outbound) = self.inner.current_link() {
            return Ok(outbound);
        }

        if self
            .inner
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::ConnectionInProgress);
        }
        let _connecting = ConnectingFlag(&self.inner.connecting);

        self.connect_with_retry().await
    }

    async fn connect_with_retry(&self) -> Result<mpsc::UnboundedSender<String>> {
        let port = self.inner.port;
        let config = &self.inner.config;
        let attempts = config.connect_retries.max(1);

        self.inner.cache.set_connecting(port);
        tracing::debug!(port, "Connecting to relay host");

        for attempt in 1..=attempts {
            match transport::connect(port, config.connect_timeout()).await {
                Ok(stream) => {
                    self.inner.retry_count.store(0, Ordering::SeqCst);
                    let outbound = Inner::attach(&self.inner, stream);
                    self.inner.cache.set_connected(port);
                    tracing::info!(port, attempt, "Connected to relay host");
                    return Ok(outbound);
                }
                Err(e) => {
                    self.inner.retry_count.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(port, attempt, error = %e, "Connection attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(config.retry_delay()).await;
                    }
                }
            }
        }

        self.inner.cache.set_disconnected();
        tracing::warn!(port, attempts, "Giving up on relay host");
        Err(Error::ConnectFailed { port, attempts })
    }
}

impl Inner {
    fn lock_pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_link(&self) -> Option<mpsc::UnboundedSender<String>> {
        self.lock_link()
            .as_ref()
            .filter(|link| !link.outbound.is_closed())
            .map(|link| link.outbound.clone())
    }

    /// Install a fresh link and start its reader and writer tasks
    fn attach(inner: &Arc<Self>, stream: ClientStream) -> mpsc::UnboundedSender<String> {
        let generation = inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let (outbound, mut rx) = mpsc::unbounded_channel::<String>();
        let (mut sink, mut source) = stream.split();

        *inner.lock_link() = Some(Link {
            outbound: outbound.clone(),
            generation,
        });

        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                    tracing::debug!(error = %e, "Relay write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = Arc::clone(inner);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => reader.handle_frame(text.as_str()),
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Relay read failed");
                        break;
                    }
                }
            }
            reader.detach(generation);
        });

        outbound
    }

    /// Drop the link if it is still the one this reader served
    fn detach(&self, generation: u64) {
        let mut link = self.lock_link();
        if link.as_ref().is_some_and(|l| l.generation == generation) {
            *link = None;
            drop(link);
            self.cache.set_disconnected();
            tracing::warn!(port = self.port, "Disconnected from relay host");
        }
    }

    fn handle_frame(&self, text: &str) {
        match codec::decode(text) {
            Ok(Message::Response(response)) => {
                let waiter = self.lock_pending().remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        tracing::debug!(id = %response.id, "Dropping response with no pending request");
                    }
                }
            }
            Ok(Message::Event(event)) => {
                tracing::debug!(event = event.name(), "Relay event");
                self.cache.apply_event(&event);
                let _ = self.events.send(event);
            }
            Ok(Message::Request(request)) => {
                tracing::debug!(id = %request.id, "Ignoring request sent to the client side");
            }
            Err(e) => match serde_json::from_str::<ErrorFrame>(text) {
                Ok(frame) => {
                    tracing::warn!(error = %frame.error, details = %frame.details, "Host rejected a frame");
                }
                Err(_) => tracing::warn!(error = %e, "Discarding malformed frame"),
            },
        }
    }
}

/// Removes a pending entry when its request resolves, times out or is dropped
struct PendingEntry<'a> {
    inner: &'a Inner,
    id: &'a str,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.inner.lock_pending().remove(self.id);
    }
}

/// Clears the in-progress flag however the connection attempt ends
struct ConnectingFlag<'a>(&'a AtomicBool);

impl Drop for ConnectingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn unexpected_body(expected: &str, body: &ResponseBody) -> Error {
    Error::MalformedMessage(format!(
        "expected a '{}' response, got '{}'",
        expected,
        body.command_name()
    ))
}
