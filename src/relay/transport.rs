//! WebSocket transport over loopback TCP
//!
//! The listening side binds with randomized port retry; the connecting side
//! makes one bounded connection attempt per call and leaves retry policy to
//! the caller.

use std::io;
use std::time::Duration;

use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::common::config::RelayConfig;
use crate::common::{Error, Result};

/// Stream held by the connecting side
pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Stream held by the host for each accepted peer
pub type PeerStream = WebSocketStream<TcpStream>;

/// Loopback address the relay binds to and connects to
pub const LOOPBACK: &str = "127.0.0.1";

/// Bind the relay listener, returning it together with the bound port.
///
/// The configured port is tried first. While it is taken, ports are drawn at
/// random from the retry range until `bind_retries` attempts are used up.
pub async fn bind_listener(config: &RelayConfig) -> Result<(TcpListener, u16)> {
    let attempts = config.bind_retries.max(1);
    let mut candidate = config.port;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match TcpListener::bind((LOOPBACK, candidate)).await {
            Ok(listener) => {
                let port = listener.local_addr()?.port();
                if attempt > 1 {
                    tracing::info!(port, attempt, "Bound relay listener on fallback port");
                }
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::debug!(port = candidate, attempt, "Port in use");
                last_error = e.to_string();
                candidate = random_port(config);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::BindFailed {
        attempts,
        last_error,
    })
}

fn random_port(config: &RelayConfig) -> u16 {
    let (start, end) = if config.port_range_start <= config.port_range_end {
        (config.port_range_start, config.port_range_end)
    } else {
        (config.port_range_end, config.port_range_start)
    };
    rand::thread_rng().gen_range(start..=end)
}

/// Upgrade an accepted TCP stream to a WebSocket
pub async fn accept_peer(stream: TcpStream) -> Result<PeerStream> {
    Ok(tokio_tungstenite::accept_async(stream).await?)
}

/// URL of a relay host listening on the given port
pub fn relay_url(port: u16) -> String {
    format!("ws://{}:{}", LOOPBACK, port)
}

/// Make a single connection attempt, bounded by `timeout`
pub async fn connect(port: u16, timeout: Duration) -> Result<ClientStream> {
    let url = relay_url(port);
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str())).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connecting to {} timed out after {:?}", url, timeout),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_config(port: u16) -> RelayConfig {
        RelayConfig {
            port,
            port_range_start: 20000,
            port_range_end: 60000,
            bind_retries: 10,
        }
    }

    #[tokio::test]
    async fn test_bind_os_assigned_port() {
        let (listener, port) = bind_listener(&relay_config(0)).await.unwrap();
        assert_ne!(port, 0);
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_bind_falls_back_when_port_taken() {
        let taken = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let taken_port = taken.local_addr().unwrap().port();

        let (_listener, port) = bind_listener(&relay_config(taken_port)).await.unwrap();
        assert_ne!(port, taken_port);
        assert!((20000..=60000).contains(&port));
    }

    #[tokio::test]
    async fn test_bind_gives_up_after_retries() {
        let taken = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let taken_port = taken.local_addr().unwrap().port();

        let config = RelayConfig {
            port: taken_port,
            port_range_start: taken_port,
            port_range_end: taken_port,
            bind_retries: 3,
        };
        match bind_listener(&config).await {
            Err(Error::BindFailed { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("Expected BindFailed, got {:?}", other.map(|(_, p)| p)),
        }
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let port = {
            let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = connect(port, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_transport(), "{:?}", err);
    }
}
