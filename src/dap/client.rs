//! DAP client for communicating with debug adapters
//!
//! The adapter runs as a child process speaking DAP over stdio. A background
//! reader task owns stdout: responses are routed to the waiting request by
//! `request_seq`, events are forwarded on a channel. Any number of requests
//! may be in flight at once.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::common::{Error, Result};

use super::codec;
use super::types::*;

type PendingMap = HashMap<i64, oneshot::Sender<ResponseMessage>>;

/// Tracks whether the adapter has sent its `initialized` event
#[derive(Default)]
struct InitializedSignal {
    seen: AtomicBool,
    notify: Notify,
}

/// A request that has been written but whose response is still outstanding
pub struct InFlight {
    seq: i64,
    command: String,
    rx: oneshot::Receiver<ResponseMessage>,
}

/// DAP client for communicating with a debug adapter
pub struct DapClient {
    adapter: Mutex<Child>,
    writer: Mutex<BufWriter<ChildStdin>>,
    seq: AtomicI64,
    pending: Arc<StdMutex<PendingMap>>,
    initialized: Arc<InitializedSignal>,
    request_timeout: Duration,
    reader_task: JoinHandle<()>,
}

impl DapClient {
    /// Spawn the adapter and start reading from it.
    ///
    /// Returns the client and the receiving end of the adapter's event
    /// stream. The stream ends when the adapter exits.
    pub async fn spawn(
        adapter_path: &Path,
        args: &[String],
        request_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Event>)> {
        let mut adapter = Command::new(adapter_path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::AdapterStartFailed(format!(
                    "Failed to start {}: {}",
                    adapter_path.display(),
                    e
                ))
            })?;

        let stdin = adapter
            .stdin
            .take()
            .ok_or_else(|| Error::AdapterStartFailed("Failed to get adapter stdin".to_string()))?;
        let stdout = adapter.stdout.take().ok_or_else(|| {
            Error::AdapterStartFailed("Failed to get adapter stdout".to_string())
        })?;

        let pending = Arc::new(StdMutex::new(PendingMap::new()));
        let initialized = Arc::new(InitializedSignal::default());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(reader_loop(
            stdout,
            Arc::clone(&pending),
            Arc::clone(&initialized),
            event_tx,
        ));

        tracing::debug!(adapter = %adapter_path.display(), ?args, "Spawned DAP adapter");

        let client = Self {
            adapter: Mutex::new(adapter),
            writer: Mutex::new(BufWriter::new(stdin)),
            seq: AtomicI64::new(1),
            pending,
            initialized,
            request_timeout,
            reader_task,
        };
        Ok((client, event_rx))
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a request without waiting for its response
    pub async fn begin(&self, command: &str, arguments: Option<Value>) -> Result<InFlight> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let json = serde_json::to_string(&RequestMessage::new(seq, command, arguments))?;
        tracing::trace!("DAP >>> {}", json);

        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(seq, tx);

        let written = {
            let mut writer = self.writer.lock().await;
            codec::write_frame(&mut *writer, &json).await
        };
        if let Err(e) = written {
            self.lock_pending().remove(&seq);
            return Err(e);
        }

        Ok(InFlight {
            seq,
            command: command.to_string(),
            rx,
        })
    }

    /// Wait for the response to a request started with [`DapClient::begin`]
    pub async fn finish<T: DeserializeOwned>(
        &self,
        in_flight: InFlight,
        timeout: Duration,
    ) -> Result<T> {
        let InFlight { seq, command, rx } = in_flight;

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(Error::AdapterCrashed),
            Err(_) => {
                self.lock_pending().remove(&seq);
                return Err(Error::dap_request_failed(
                    &command,
                    &format!("no response within {} seconds", timeout.as_secs()),
                ));
            }
        };

        if !response.success {
            return Err(Error::dap_request_failed(&command, &response.error_text()));
        }

        serde_json::from_value(response.body.unwrap_or(Value::Null)).map_err(|e| {
            Error::DapProtocol(format!("Failed to parse {} response: {}", command, e))
        })
    }

    /// Send a request and wait for its response
    pub async fn request<T: DeserializeOwned>(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<T> {
        let in_flight = self.begin(command, arguments).await?;
        self.finish(in_flight, self.request_timeout).await
    }

    /// Initialize the debug adapter
    pub async fn initialize(&self, adapter_id: &str, timeout: Duration) -> Result<Capabilities> {
        let args = serde_json::to_value(InitializeArguments::new(adapter_id))?;
        let in_flight = self.begin("initialize", Some(args)).await?;
        self.finish(in_flight, timeout).await.map_err(|e| match e {
            Error::DapRequestFailed { message, .. } => Error::DapInitFailed(message),
            other => other,
        })
    }

    /// Wait for the `initialized` event
    pub async fn wait_initialized(&self, timeout: Duration) -> Result<()> {
        let notified = self.initialized.notify.notified();
        if self.initialized.seen.load(Ordering::SeqCst) {
            return Ok(());
        }
        tokio::time::timeout(timeout, notified).await.map_err(|_| {
            Error::DapInitFailed(format!(
                "adapter sent no initialized event within {} seconds",
                timeout.as_secs()
            ))
        })
    }

    /// Start a launch; the response arrives after `configurationDone`
    pub async fn begin_launch(&self, args: &LaunchArguments) -> Result<InFlight> {
        self.begin("launch", Some(serde_json::to_value(args)?)).await
    }

    /// Start an attach; the response arrives after `configurationDone`
    pub async fn begin_attach(&self, args: &AttachArguments) -> Result<InFlight> {
        self.begin("attach", Some(serde_json::to_value(args)?)).await
    }

    pub async fn configuration_done(&self) -> Result<()> {
        self.request::<Value>("configurationDone", None).await?;
        Ok(())
    }

    /// Get stack trace
    pub async fn stack_trace(&self, thread_id: i64, levels: i64) -> Result<Vec<StackFrame>> {
        let args = StackTraceArguments {
            thread_id,
            start_frame: 0,
            levels,
        };
        let body: StackTraceResponseBody = self
            .request("stackTrace", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(body.stack_frames)
    }

    /// Get variables
    pub async fn variables(&self, variables_reference: i64) -> Result<Vec<Variable>> {
        let args = VariablesArguments {
            variables_reference,
        };
        let body: VariablesResponseBody = self
            .request("variables", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(body.variables)
    }

    /// Evaluate an expression or, in the `repl` context, a debugger command
    pub async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<i64>,
        context: &str,
    ) -> Result<EvaluateResponseBody> {
        let args = EvaluateArguments {
            expression: expression.to_string(),
            frame_id,
            context: context.to_string(),
        };
        self.request("evaluate", Some(serde_json::to_value(&args)?))
            .await
    }

    /// Disconnect from the adapter
    pub async fn disconnect(&self, terminate_debuggee: bool) -> Result<()> {
        let args = DisconnectArguments { terminate_debuggee };
        self.request::<Value>("disconnect", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(())
    }

    /// Stop reading and kill the adapter process
    pub async fn shutdown(&self) {
        self.reader_task.abort();
        let mut adapter = self.adapter.lock().await;
        let _ = adapter.kill().await;
    }
}

async fn reader_loop(
    stdout: ChildStdout,
    pending: Arc<StdMutex<PendingMap>>,
    initialized: Arc<InitializedSignal>,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut reader = BufReader::new(stdout);

    loop {
        let json = match codec::read_frame(&mut reader).await {
            Ok(json) => json,
            Err(Error::AdapterCrashed) => {
                tracing::info!("DAP adapter closed its output");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read from DAP adapter");
                break;
            }
        };
        tracing::trace!("DAP <<< {}", json);

        let message: IncomingMessage = match serde_json::from_str(&json) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparsable DAP message");
                continue;
            }
        };

        match message {
            IncomingMessage::Response(response) => {
                let waiter = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&response.request_seq);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::debug!(
                        request_seq = response.request_seq,
                        command = %response.command,
                        "DAP response with no waiter"
                    ),
                }
            }
            IncomingMessage::Event(msg) => match Event::from_message(msg) {
                Event::Initialized => {
                    initialized.seen.store(true, Ordering::SeqCst);
                    initialized.notify.notify_waiters();
                }
                event => {
                    let _ = events.send(event);
                }
            },
            IncomingMessage::Request(request) => {
                tracing::debug!(?request, "Ignoring reverse request from adapter");
            }
        }
    }

    // Dropping the senders fails every outstanding request
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
