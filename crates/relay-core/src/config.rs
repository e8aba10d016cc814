use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Per-connection outbound queue depth. A client whose queue is full when a
/// broadcast arrives is dropped rather than allowed to stall the fan-out.
pub const DEFAULT_SEND_CAP: usize = 256;
/// Hub command channel depth (registrations, broadcasts, inbound payloads).
pub const DEFAULT_COMMAND_CAP: usize = 128;
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024; // 128 KB hard cap per frame
/// Header whose value becomes a connection's routing flag.
pub const DEFAULT_FLAG_HEADER: &str = "sec-websocket-protocol";

/// Top-level config (relay.toml + RELAY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Request header carrying the client's routing flag. Absent or empty
    /// header means the connection joins no group and only receives
    /// broadcast-to-all messages.
    #[serde(default = "default_flag_header")]
    pub flag_header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_send_cap")]
    pub send_cap: usize,
    #[serde(default = "default_command_cap")]
    pub command_cap: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            hub: HubConfig::default(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            flag_header: DEFAULT_FLAG_HEADER.to_string(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_cap: DEFAULT_SEND_CAP,
            command_cap: DEFAULT_COMMAND_CAP,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_flag_header() -> String {
    DEFAULT_FLAG_HEADER.to_string()
}
fn default_send_cap() -> usize {
    DEFAULT_SEND_CAP
}
fn default_command_cap() -> usize {
    DEFAULT_COMMAND_CAP
}

impl RelayConfig {
    /// Load config from a TOML file with RELAY_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. RELAY_CONFIG env var
    ///   3. ~/.relay/relay.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("RELAY_CONFIG").ok())
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        let config: RelayConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("RELAY_").split("__"))
            .extract()
            .map_err(|e| crate::error::RelayError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.hub.send_cap == 0 {
            return Err(crate::error::RelayError::Config(
                "hub.send_cap must be positive".to_string(),
            ));
        }
        if self.hub.command_cap == 0 {
            return Err(crate::error::RelayError::Config(
                "hub.command_cap must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.relay/relay.toml", home)
}
