//! Debug session backed by a DAP adapter
//!
//! Launches or attaches through an adapter such as lldb-dap, answers relay
//! commands with DAP requests, and republishes adapter events on the
//! lifecycle bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::dap::{self, AttachArguments, Capabilities, DapClient, LaunchArguments};
use crate::relay::protocol::{StackFrameInfo, VariableInfo};

use super::capability::{DebugSession, Lifecycle};

/// What the session debugs
#[derive(Debug, Clone)]
pub enum Target {
    /// Start a program under the debugger
    Launch {
        program: PathBuf,
        args: Vec<String>,
        stop_on_entry: bool,
    },
    /// Attach to a running process
    Attach { pid: u32 },
}

impl Target {
    fn describe(&self) -> String {
        match self {
            Self::Launch { program, .. } => program.display().to_string(),
            Self::Attach { pid } => format!("pid:{}", pid),
        }
    }
}

/// Debug session managing a DAP connection
pub struct DapSession {
    client: DapClient,
    adapter_name: String,
    target: Target,
    capabilities: Capabilities,
}

impl DapSession {
    /// Start the adapter and bring the session up to the running state.
    ///
    /// Sequence: `initialize`, `launch`/`attach`, wait for `initialized`,
    /// `configurationDone`, then the `launch`/`attach` response.
    #[tracing::instrument(skip(config, target, lifecycle), fields(adapter = %adapter_name.as_deref().unwrap_or("default")))]
    pub async fn start(
        config: &Config,
        target: Target,
        adapter_name: Option<String>,
        lifecycle: broadcast::Sender<Lifecycle>,
    ) -> Result<Arc<Self>> {
        let adapter_name = adapter_name.unwrap_or_else(|| config.defaults.adapter.clone());
        let adapter = config
            .get_adapter(&adapter_name)
            .ok_or_else(|| Error::adapter_not_found(&adapter_name, &["config.toml", "PATH"]))?;

        let init_timeout = Duration::from_secs(config.timeouts.dap_initialize_secs);
        let request_timeout = Duration::from_secs(config.timeouts.dap_request_secs);

        tracing::info!(
            debuggee = %target.describe(),
            adapter_path = %adapter.path.display(),
            "Starting debug session"
        );

        let (client, events) = DapClient::spawn(&adapter.path, &adapter.args, request_timeout).await?;
        tokio::spawn(pump_events(events, lifecycle));

        let session = Self {
            client,
            adapter_name,
            target,
            capabilities: Capabilities::default(),
        };

        let handshake = session
            .handshake(adapter.adapter_type.adapter_id(), init_timeout, request_timeout)
            .await;
        match handshake {
            Ok(capabilities) => {
                tracing::info!("Debug session running");
                Ok(Arc::new(Self {
                    capabilities,
                    ..session
                }))
            }
            Err(e) => {
                session.client.shutdown().await;
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        adapter_id: &str,
        init_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Capabilities> {
        let capabilities = self.client.initialize(adapter_id, init_timeout).await?;
        tracing::debug!(?capabilities, "DAP adapter initialized");

        let start = match &self.target {
            Target::Launch {
                program,
                args,
                stop_on_entry,
            } => {
                let launch = LaunchArguments {
                    program: program.to_string_lossy().into_owned(),
                    args: args.clone(),
                    cwd: std::env::current_dir()
                        .ok()
                        .map(|p| p.to_string_lossy().into_owned()),
                    stop_on_entry: *stop_on_entry,
                };
                self.client.begin_launch(&launch).await?
            }
            Target::Attach { pid } => {
                let attach = AttachArguments {
                    pid: *pid,
                    stop_on_entry: None,
                };
                self.client.begin_attach(&attach).await?
            }
        };

        self.client.wait_initialized(request_timeout).await?;
        self.client.configuration_done().await?;
        self.client
            .finish::<serde_json::Value>(start, request_timeout)
            .await?;

        Ok(capabilities)
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// End the session: launched programs are terminated, attached ones
    /// are left running
    pub async fn stop(&self) {
        let terminate = matches!(self.target, Target::Launch { .. });
        if let Err(e) = self.client.disconnect(terminate).await {
            tracing::debug!(error = %e, "Disconnect failed");
        }
        self.client.shutdown().await;
    }
}

#[async_trait]
impl DebugSession for DapSession {
    async fn evaluate_command(&self, command: &str) -> Result<String> {
        let body = self.client.evaluate(command, None, "repl").await?;
        Ok(body.result)
    }

    async fn stack_trace(&self, thread_id: i64, levels: i64) -> Result<Vec<StackFrameInfo>> {
        let frames = self.client.stack_trace(thread_id, levels).await?;
        Ok(frames.into_iter().map(frame_info).collect())
    }

    async fn variables(&self, reference: i64) -> Result<Vec<VariableInfo>> {
        let variables = self.client.variables(reference).await?;
        Ok(variables.into_iter().map(variable_info).collect())
    }
}

fn frame_info(frame: dap::StackFrame) -> StackFrameInfo {
    StackFrameInfo {
        id: frame.id,
        name: frame.name,
        source: frame.source.and_then(|s| s.path.or(s.name)),
        line: frame.line,
        column: frame.column,
    }
}

fn variable_info(variable: dap::Variable) -> VariableInfo {
    VariableInfo {
        name: variable.name,
        value: variable.value,
        type_name: variable.type_name,
        variables_reference: variable.variables_reference,
    }
}

/// Map adapter events onto the lifecycle bus until the adapter goes away
async fn pump_events(
    mut events: mpsc::UnboundedReceiver<dap::Event>,
    lifecycle: broadcast::Sender<Lifecycle>,
) {
    while let Some(event) = events.recv().await {
        let notification = match event {
            dap::Event::Stopped(body) => Lifecycle::Stopped {
                reason: body.reason,
                thread_id: body.thread_id.unwrap_or_default(),
                description: body.description,
                all_threads_stopped: body.all_threads_stopped,
            },
            dap::Event::Continued(body) => Lifecycle::Continued {
                thread_id: body.thread_id,
                all_threads_continued: body.all_threads_continued,
            },
            dap::Event::Terminated => break,
            dap::Event::Exited(body) => {
                tracing::info!(exit_code = body.exit_code, "Debuggee exited");
                break;
            }
            dap::Event::Output(body) => {
                tracing::debug!(
                    category = body.category.as_deref().unwrap_or("console"),
                    output = %body.output.trim_end(),
                    "Debuggee output"
                );
                continue;
            }
            dap::Event::Initialized | dap::Event::Other(_) => continue,
        };
        let _ = lifecycle.send(notification);
    }

    tracing::info!("Debug session terminated");
    let _ = lifecycle.send(Lifecycle::Terminated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dap::{Source, StackFrame};

    #[test]
    fn test_frame_source_prefers_path() {
        let info = frame_info(StackFrame {
            id: 1,
            name: "main".to_string(),
            source: Some(Source {
                name: Some("main.c".to_string()),
                path: Some("/src/main.c".to_string()),
            }),
            line: 10,
            column: 2,
        });
        assert_eq!(info.source.as_deref(), Some("/src/main.c"));

        let no_path = frame_info(StackFrame {
            id: 2,
            name: "start".to_string(),
            source: Some(Source {
                name: Some("crt0".to_string()),
                path: None,
            }),
            line: 0,
            column: 0,
        });
        assert_eq!(no_path.source.as_deref(), Some("crt0"));
    }

    #[tokio::test]
    async fn test_pump_maps_events_and_ends_with_terminated() {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = crate::host::capability::lifecycle_bus();
        let mut sub = bus.subscribe();

        tx.send(dap::Event::Stopped(dap::StoppedEventBody {
            reason: Some("breakpoint".to_string()),
            description: None,
            thread_id: Some(3),
            all_threads_stopped: Some(true),
        }))
        .unwrap();
        tx.send(dap::Event::Other("module".to_string())).unwrap();
        tx.send(dap::Event::Continued(dap::ContinuedEventBody {
            thread_id: 3,
            all_threads_continued: None,
        }))
        .unwrap();
        drop(tx);

        pump_events(rx, bus.clone()).await;

        assert!(matches!(
            sub.recv().await.unwrap(),
            Lifecycle::Stopped { thread_id: 3, .. }
        ));
        assert!(matches!(
            sub.recv().await.unwrap(),
            Lifecycle::Continued { thread_id: 3, .. }
        ));
        assert_eq!(sub.recv().await.unwrap(), Lifecycle::Terminated);
    }

    #[tokio::test]
    async fn test_exit_ends_session_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = crate::host::capability::lifecycle_bus();
        let mut sub = bus.subscribe();

        tx.send(dap::Event::Exited(dap::ExitedEventBody { exit_code: 0 }))
            .unwrap();
        tx.send(dap::Event::Terminated).unwrap();

        pump_events(rx, bus.clone()).await;

        assert_eq!(sub.recv().await.unwrap(), Lifecycle::Terminated);
        assert!(matches!(
            sub.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
