//! Node configuration.
//!
//! One TOML file per node. Missing sections and keys fall back to defaults, and a default
//! file is written on first start so there is something to edit.
//!
//! ```toml
//! role = "button"
//! identity = "btnNode07"
//! peer = "ledNode07"
//!
//! [broker]
//! host = "10.200.97.100"
//! port = 1883
//! ```

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::mqtt::codec::CommandCodec;
use crate::mqtt::reconnect::ReconnectPolicy;
use crate::mqtt::session::{SessionSettings, PUBLISH_OVERHEAD};
use crate::mqtt::topics::{MessageKind, NodeIdentity};
use crate::node::{Replies, RuntimeSettings};

const CONFIG_DIR: &str = "lednode";
const CONFIG_FILE: &str = "node.toml";

/// Smallest frame limit that still fits a command or status with short identities.
const MIN_PACKET_SIZE: usize = 128;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Button,
    Actuator,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    /// Largest MQTT packet in either direction, header included.
    pub max_packet_size: usize,
    pub connect_timeout_ms: u64,
    pub poll_timeout_ms: u64,
    pub max_frames_per_poll: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive_secs: 15,
            max_packet_size: 512,
            connect_timeout_ms: 3000,
            poll_timeout_ms: 5,
            max_frames_per_poll: 32,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub interval_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub debounce_ms: u64,
    pub sample_interval_ms: u64,
    pub on_pin: u8,
    pub off_pin: u8,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 10,
            sample_interval_ms: 10,
            on_pin: 21,
            off_pin: 17,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub pin: u8,
    pub active_high: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pin: 21,
            active_high: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub role: Role,
    /// This node's broker client id; must be unique among connected clients.
    pub identity: String,
    /// The node this one talks to.
    pub peer: String,
    pub broker: BrokerConfig,
    pub reconnect: ReconnectConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub messages: Replies,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: Role::Button,
            identity: "btnNode00".to_string(),
            peer: "ledNode00".to_string(),
            broker: BrokerConfig::default(),
            reconnect: ReconnectConfig::default(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
            messages: Replies::default(),
        }
    }
}

impl NodeConfig {
    /// `<config dir>/lednode/node.toml`
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir().ok_or_else(|| eyre!("No config directory available"))?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse node config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded {:?} node config from {}", config.role, path.display());
        Ok(config)
    }

    /// Load `path`, writing the defaults there first if it does not exist yet.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            warn!(
                "Config file {} does not exist, writing defaults",
                path.display()
            );
            Self::default().save(path).await?;
        }
        Self::load(path).await
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize node config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        debug!("Saved node config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let identity = self.identity()?;
        let peer = self.peer()?;
        if identity == peer {
            return Err(eyre!("identity and peer must differ (both '{}')", identity));
        }
        if self.broker.max_packet_size < MIN_PACKET_SIZE {
            return Err(eyre!(
                "broker.max_packet_size {} is below the minimum of {}",
                self.broker.max_packet_size,
                MIN_PACKET_SIZE
            ));
        }
        if self.codec().max_payload() == 0 {
            return Err(eyre!("identities too long for broker.max_packet_size"));
        }
        for (name, value) in [
            ("broker.poll_timeout_ms", self.broker.poll_timeout_ms),
            ("broker.connect_timeout_ms", self.broker.connect_timeout_ms),
            ("broker.max_frames_per_poll", self.broker.max_frames_per_poll as u64),
            ("reconnect.interval_secs", self.reconnect.interval_secs),
            ("input.sample_interval_ms", self.input.sample_interval_ms),
        ] {
            if value == 0 {
                return Err(eyre!("{} must be greater than zero", name));
            }
        }
        Ok(())
    }

    pub fn identity(&self) -> Result<NodeIdentity> {
        NodeIdentity::new(self.identity.clone()).map_err(|e| eyre!("identity: {}", e))
    }

    pub fn peer(&self) -> Result<NodeIdentity> {
        NodeIdentity::new(self.peer.clone()).map_err(|e| eyre!("peer: {}", e))
    }

    /// Payload limit leaving room for the longest topic this node publishes to.
    pub fn codec(&self) -> CommandCodec {
        let longest_kind = [MessageKind::LedCommand, MessageKind::LedStatus]
            .iter()
            .map(|kind| kind.as_str().len())
            .max()
            .unwrap_or_default();
        let topic = self.identity.len().max(self.peer.len()) + 1 + longest_kind;
        CommandCodec::new(
            self.broker
                .max_packet_size
                .saturating_sub(PUBLISH_OVERHEAD + topic),
        )
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_millis(self.broker.connect_timeout_ms),
            poll_timeout: Duration::from_millis(self.broker.poll_timeout_ms),
            max_frames_per_poll: self.broker.max_frames_per_poll,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_secs(self.reconnect.interval_secs))
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            tick: Duration::from_millis(self.input.sample_interval_ms),
            ..RuntimeSettings::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.input.debounce_ms)
    }
}
