//! Host mode - the listening side of the relay
//!
//! The host owns the live debug session and executes the commands peers
//! forward to it. Multiple peers may be connected at once; all of them
//! receive every stop and continue event.

pub mod broadcaster;
pub mod capability;
pub mod handler;
pub mod server;
pub mod session;

use std::sync::Arc;

use crate::common::{config::Config, paths, Result};

pub use capability::{lifecycle_bus, DebugSession, Lifecycle, SessionSlot};
pub use server::RelayHost;
pub use session::{DapSession, Target};

/// Options for `lldb-relay host`
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// Program to launch or process to attach to; `None` starts the relay
    /// without a session
    pub target: Option<Target>,
    /// Adapter name, defaulting to the configured one
    pub adapter: Option<String>,
    /// Overrides the configured listening port
    pub port: Option<u16>,
}

/// Run in host mode until interrupted
pub async fn run(options: HostOptions) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = options.port {
        config.relay.port = port;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Starting relay host"
    );

    let lifecycle = lifecycle_bus();
    let slot = SessionSlot::<DapSession>::empty();

    // Subscribe before the session can publish anything
    let host = RelayHost::bind(&config.relay, slot.clone(), &lifecycle).await?;
    let port = host.port();

    let session = match options.target {
        Some(target) => {
            let session =
                DapSession::start(&config, target, options.adapter, lifecycle.clone()).await?;
            slot.set(Arc::clone(&session));
            Some(session)
        }
        None => {
            tracing::info!("No debug session; commands will fail until one is started");
            None
        }
    };

    match paths::write_port_file(port) {
        Ok(Some(path)) => tracing::info!(port, path = %path.display(), "Published relay port"),
        Ok(None) => tracing::warn!(port, "No data directory; port file not written"),
        Err(e) => tracing::warn!(port, error = %e, "Failed to write port file"),
    }
    eprintln!("lldb-relay host listening on port {}", port);

    let result = host.run(shutdown_signal()).await;

    if let Some(session) = session {
        tracing::debug!("Stopping debug session");
        session.stop().await;
    }
    if let Err(e) = paths::remove_port_file() {
        tracing::warn!(error = %e, "Failed to remove port file");
    }
    tracing::info!("Relay host shutdown complete");

    result
}

/// Completes on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C");
    }
}
