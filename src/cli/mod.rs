//! CLI command handling
//!
//! Forwards agent-facing commands to a running relay host and formats the
//! results.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::commands::{Commands, ConnectOptions};
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::relay::protocol::{StackFrameInfo, VariableInfo};
use crate::relay::{Event, RelayClient, SessionSnapshot};

/// How often `watch` checks that the link is still up
const WATCH_POLL: Duration = Duration::from_secs(1);

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Host { .. } => Err(Error::Internal(
            "host mode is handled by the binary entry point".to_string(),
        )),

        Commands::Exec { command, connect } => {
            let client = client_for(&connect)?;
            let result = client.execute_lldb_command(command).await?;

            if connect.json {
                print_json(&serde_json::json!({ "result": result }))
            } else {
                println!("{}", result.trim_end());
                Ok(())
            }
        }

        Commands::Stack { thread, connect } => {
            let client = client_for(&connect)?;
            let frames = client.stack_trace(thread).await?;

            if connect.json {
                print_json(&serde_json::json!({ "stackFrames": frames }))
            } else {
                print_frames(&frames);
                Ok(())
            }
        }

        Commands::Vars { reference, connect } => {
            let client = client_for(&connect)?;
            let variables = client.variables(reference).await?;

            if connect.json {
                print_json(&serde_json::json!({ "variables": variables }))
            } else {
                print_variables(&variables);
                Ok(())
            }
        }

        Commands::Status { connect } => {
            let client = client_for(&connect)?;
            if let Err(e) = client.connect().await {
                tracing::warn!(error = %e, "Relay host unreachable");
            }
            print_snapshot(&client.snapshot(), connect.json)
        }

        Commands::Watch { connect } => {
            let client = client_for(&connect)?;
            let mut events = client.subscribe_events();
            client.connect().await?;
            eprintln!("Watching relay host on port {} (Ctrl+C to stop)", client.port());

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => return Ok(()),
                    received = events.recv() => match received {
                        Ok(event) => {
                            print_event(&event, connect.json)?;
                            print_snapshot(&client.snapshot(), connect.json)?;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Missed events");
                        }
                        Err(RecvError::Closed) => return Ok(()),
                    },
                    _ = tokio::time::sleep(WATCH_POLL) => {
                        if !client.is_connected() {
                            return Err(Error::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }
}

/// Port to reach the host on: `--port`, then `LLDB_RELAY_PORT`, then the
/// port file of a running host, then the configured default
pub fn resolve_port(flag: Option<u16>, config: &Config) -> u16 {
    flag.or_else(paths::port_from_env)
        .or_else(paths::read_port_file)
        .unwrap_or(config.relay.port)
}

fn client_for(options: &ConnectOptions) -> Result<RelayClient> {
    let config = Config::load()?;
    let port = resolve_port(options.port, &config);
    tracing::debug!(port, "Using relay host port");
    Ok(RelayClient::new(port, config.client))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_frames(frames: &[StackFrameInfo]) {
    if frames.is_empty() {
        println!("No stack frames");
        return;
    }
    for (i, frame) in frames.iter().enumerate() {
        let source = frame.source.as_deref().unwrap_or("?");
        println!(
            "#{} {} at {}:{}:{} [frame {}]",
            i, frame.name, source, frame.line, frame.column, frame.id
        );
    }
}

fn print_variables(variables: &[VariableInfo]) {
    if variables.is_empty() {
        println!("No variables");
        return;
    }
    for var in variables {
        let type_suffix = var
            .type_name
            .as_ref()
            .map(|t| format!(" ({})", t))
            .unwrap_or_default();
        let children = if var.variables_reference != 0 {
            format!(" [ref {}]", var.variables_reference)
        } else {
            String::new()
        };
        println!("  {} = {}{}{}", var.name, var.value, type_suffix, children);
    }
}

fn print_event(event: &Event, json: bool) -> Result<()> {
    if json {
        return print_json(event);
    }
    match event {
        Event::DebuggerStopped {
            reason,
            thread_id,
            description,
            ..
        } => match description {
            Some(description) => {
                println!("Stopped: {} on thread {} ({})", reason, thread_id, description)
            }
            None => println!("Stopped: {} on thread {}", reason, thread_id),
        },
        Event::DebuggerContinued { thread_id, .. } => println!("Continued: thread {}", thread_id),
    }
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot, json: bool) -> Result<()> {
    if json {
        return print_json(snapshot);
    }
    print!("{}", format_snapshot(snapshot));
    Ok(())
}

/// Text rendering of the cached session state, one line per fact
fn format_snapshot(snapshot: &SessionSnapshot) -> String {
    let port = snapshot
        .connection_port
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let state = if snapshot.is_stopped {
        format!(
            "State: stopped on thread {} ({})",
            snapshot.current_thread_id, snapshot.stop_reason
        )
    } else {
        "State: running or unknown".to_string()
    };
    format!(
        "Connection: {} (port {})\n{}\n",
        snapshot.connection_status, port, state
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::ConnectionStatus;

    #[test]
    fn test_flag_wins_port_resolution() {
        let config = Config::default();
        assert_eq!(resolve_port(Some(4242), &config), 4242);
    }

    #[test]
    fn test_snapshot_text_shows_stop() {
        let snapshot = SessionSnapshot {
            connection_status: ConnectionStatus::Connected,
            connection_port: Some(27183),
            is_stopped: true,
            current_thread_id: 2,
            stop_reason: "exception".to_string(),
        };
        assert_eq!(
            format_snapshot(&snapshot),
            "Connection: connected (port 27183)\nState: stopped on thread 2 (exception)\n"
        );

        let idle = format_snapshot(&SessionSnapshot::default());
        assert!(idle.contains("(port -)"), "{}", idle);
        assert!(idle.ends_with("State: running or unknown\n"), "{}", idle);
    }
}
