//! Configuration file handling

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Listening-role settings
    #[serde(default)]
    pub relay: RelayConfig,

    /// Connecting-role settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Debug adapter configurations
    #[serde(default)]
    pub adapters: HashMap<String, AdapterConfig>,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Listening-role settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// First port tried when binding (0 lets the OS pick)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Lower bound of the range used for randomized retries
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,

    /// Upper bound (inclusive) of the range used for randomized retries
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,

    /// Total bind attempts before giving up
    #[serde(default = "default_bind_retries")]
    pub bind_retries: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
            bind_retries: default_bind_retries(),
        }
    }
}

fn default_port() -> u16 {
    27183
}
fn default_port_range_start() -> u16 {
    20000
}
fn default_port_range_end() -> u16 {
    60000
}
fn default_bind_retries() -> u32 {
    10
}

/// Connecting-role settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Connection attempts before a send gives up
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Fixed pause between connection attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// A single connection attempt that takes longer than this counts as failed
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a request waits for its response
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_retries: default_connect_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_connect_retries() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    30
}

/// Adapter type for specialized launch argument handling
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdapterType {
    /// lldb-dap (LLVM debugger)
    #[default]
    LldbDap,
    /// CodeLLDB (VSCode extension)
    Codelldb,
    /// Generic DAP adapter (no special handling)
    Generic,
}

impl AdapterType {
    /// Identifier sent as `adapterID` during initialize
    pub fn adapter_id(&self) -> &'static str {
        match self {
            Self::LldbDap => "lldb-dap",
            Self::Codelldb => "codelldb",
            Self::Generic => "generic",
        }
    }
}

/// Configuration for a debug adapter
#[derive(Debug, Deserialize, Clone)]
pub struct AdapterConfig {
    /// Path to the adapter executable
    pub path: PathBuf,

    /// Additional arguments to pass to the adapter
    #[serde(default)]
    pub args: Vec<String>,

    /// Adapter type for specialized handling
    #[serde(default)]
    pub adapter_type: AdapterType,
}

/// Default settings
#[derive(Debug, Deserialize)]
pub struct Defaults {
    /// Default adapter to use
    #[serde(default = "default_adapter")]
    pub adapter: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
        }
    }
}

fn default_adapter() -> String {
    "lldb-dap".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Timeout for DAP initialize request
    #[serde(default = "default_dap_initialize")]
    pub dap_initialize_secs: u64,

    /// Timeout for general DAP requests
    #[serde(default = "default_dap_request")]
    pub dap_request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dap_initialize_secs: default_dap_initialize(),
            dap_request_secs: default_dap_request(),
        }
    }
}

fn default_dap_initialize() -> u64 {
    10
}
fn default_dap_request() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                let config = Self::from_toml(&content)?;
                config.validate()?;
                return Ok(config);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.relay.port_range_start > self.relay.port_range_end {
            return Err(super::Error::Config(format!(
                "relay.port_range_start ({}) is greater than relay.port_range_end ({})",
                self.relay.port_range_start, self.relay.port_range_end
            )));
        }
        if self.relay.bind_retries == 0 || self.client.connect_retries == 0 {
            return Err(super::Error::Config(
                "relay.bind_retries and client.connect_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get adapter configuration by name
    ///
    /// Falls back to searching PATH if not explicitly configured
    pub fn get_adapter(&self, name: &str) -> Option<AdapterConfig> {
        // Check explicit configuration first
        if let Some(config) = self.adapters.get(name) {
            return Some(config.clone());
        }

        // Try to find in PATH
        which::which(name).ok().map(|path| {
            let adapter_type = match name {
                "lldb-dap" | "lldb-vscode" => AdapterType::LldbDap,
                "codelldb" => AdapterType::Codelldb,
                _ => AdapterType::Generic,
            };
            AdapterConfig {
                path,
                args: Vec::new(),
                adapter_type,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.relay.port, 27183);
        assert_eq!(config.relay.bind_retries, 10);
        assert_eq!(config.client.request_timeout_secs, 30);
        assert_eq!(config.defaults.adapter, "lldb-dap");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
[relay]
port = 0

[client]
retry_delay_ms = 250

[adapters.codelldb]
path = "/opt/codelldb/adapter/codelldb"
adapter_type = "codelldb"
"#,
        )
        .unwrap();

        assert_eq!(config.relay.port, 0);
        assert_eq!(config.relay.port_range_end, 60000);
        assert_eq!(config.client.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.client.connect_retries, 5);

        let adapter = config.get_adapter("codelldb").unwrap();
        assert_eq!(adapter.adapter_type, AdapterType::Codelldb);
        assert_eq!(adapter.adapter_type.adapter_id(), "codelldb");
    }

    #[test]
    fn test_inverted_port_range_is_rejected() {
        let config = Config::from_toml(
            r#"
[relay]
port_range_start = 5000
port_range_end = 4000
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
