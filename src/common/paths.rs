//! Configuration, log and port-file paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/lldb-relay/`, `~/.local/share/lldb-relay/`
//! - macOS: `~/Library/Application Support/lldb-relay/`
//! - Windows: `%APPDATA%\lldb-relay\`

use std::io;
use std::path::PathBuf;

/// Application name used for directories
const APP_NAME: &str = "lldb-relay";

/// File the host writes its bound port to
const PORT_FILE_NAME: &str = "relay.port";

/// Environment variable consulted for the host port
pub const PORT_ENV_VAR: &str = "LLDB_RELAY_PORT";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Get the path of the port discovery file
pub fn port_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join(PORT_FILE_NAME))
}

/// Publish the host's bound port so connecting processes can find it
pub fn write_port_file(port: u16) -> io::Result<Option<PathBuf>> {
    let Some(path) = port_file() else {
        return Ok(None);
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, port.to_string())?;
    Ok(Some(path))
}

/// Read the port published by a running host, if any
pub fn read_port_file() -> Option<u16> {
    let path = port_file()?;
    let content = std::fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}

/// Remove the port file (on host shutdown)
pub fn remove_port_file() -> io::Result<()> {
    if let Some(path) = port_file() {
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Read the port from the environment, ignoring unparsable values
pub fn port_from_env() -> Option<u16> {
    std::env::var(PORT_ENV_VAR)
        .ok()
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_port_file_lives_next_to_logs() {
        let port = port_file().unwrap();
        let logs = log_dir().unwrap();
        assert_eq!(port.parent(), logs.parent());
        assert!(port.ends_with(PORT_FILE_NAME));
    }
}
