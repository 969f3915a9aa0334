//! Service configuration.
//!
//! Settings come from an optional YAML file, then command-line flags override
//! individual fields. Everything has a default, so the service runs with no
//! configuration at all against a local broker.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::error::ServiceError;
use crate::reactions::Reactions;

/// Command-line arguments.
#[derive(Parser, Debug, Default)]
#[command(name = "nibegw", version, about = "MODBUS40 accessory emulator bridging a Nibe heat pump to MQTT")]
pub struct Cli {
    /// YAML configuration file.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Data item catalog (YAML or JSON).
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// UDP port the serial gateway sends to.
    #[arg(long)]
    pub udp_port: Option<u16>,

    /// MQTT broker host.
    #[arg(long)]
    pub mqtt_host: Option<String>,

    /// MQTT broker port.
    #[arg(long)]
    pub mqtt_port: Option<u16>,

    /// Root topic; requests on <topic>/req/#, values on <topic>/res/<name>.
    #[arg(long)]
    pub mqtt_topic: Option<String>,

    /// Log filter when RUST_LOG is unset, e.g. `info` or `nibegw_runner=debug`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[cfg(feature = "prometheus")]
    #[arg(long)]
    pub metrics_listen: Option<std::net::SocketAddr>,
}

/// UDP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// Port to bind.
    pub port: u16,
}

impl Default for UdpConfig {
    fn default() -> Self {
        UdpConfig {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9999,
        }
    }
}

/// MQTT client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Root topic.
    pub topic: String,
    /// Client identifier.
    pub client_id: String,
    /// Keep-alive interval (seconds).
    pub keep_alive_secs: u64,
    /// QoS for subscriptions and publishes, 0 to 2.
    pub qos: u8,
    /// Requests the client may queue before publishing waits.
    pub channel_capacity: usize,
    /// Publish values as `{"value", "provenance", "invalid"}` objects
    /// instead of the bare value.
    pub envelope: bool,
    /// Optional credentials.
    pub username: Option<String>,
    /// Optional credentials.
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1883,
            topic: "nibe".to_string(),
            client_id: "nibegw".to_string(),
            keep_alive_secs: 30,
            qos: 2,
            channel_capacity: 100,
            envelope: false,
            username: None,
            password: None,
        }
    }
}

impl MqttConfig {
    /// Keep-alive as a [`Duration`].
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Catalog file.
    pub catalog: PathBuf,
    /// Gateway link.
    pub udp: UdpConfig,
    /// Broker link.
    pub mqtt: MqttConfig,
    /// Engine tuning.
    pub engine: EngineConfig,
    /// How often the engine checks deadlines when idle (milliseconds).
    pub tick_interval_ms: u64,
    /// Items read once at startup.
    pub startup_reads: Vec<String>,
    /// Automatic writes.
    pub reactions: Reactions,
    /// Log filter used when RUST_LOG is unset.
    pub log_level: String,
    /// Prometheus listen address.
    pub metrics_listen: Option<std::net::SocketAddr>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            catalog: PathBuf::from("config/catalog.yaml"),
            udp: UdpConfig::default(),
            mqtt: MqttConfig::default(),
            engine: EngineConfig::default(),
            tick_interval_ms: 100,
            startup_reads: vec!["alarm-45001".to_string()],
            reactions: Reactions::default(),
            log_level: "warn".to_string(),
            metrics_listen: None,
        }
    }
}

impl ServiceConfig {
    /// Parse a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&source)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Build from command-line arguments, reading `--config` if given.
    pub fn from_cli(cli: &Cli) -> Result<Self, ServiceError> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        Ok(config)
    }

    /// Override fields with whatever flags were given.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(catalog) = &cli.catalog {
            self.catalog = catalog.clone();
        }
        if let Some(port) = cli.udp_port {
            self.udp.port = port;
        }
        if let Some(host) = &cli.mqtt_host {
            self.mqtt.host = host.clone();
        }
        if let Some(port) = cli.mqtt_port {
            self.mqtt.port = port;
        }
        if let Some(topic) = &cli.mqtt_topic {
            self.mqtt.topic = topic.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        #[cfg(feature = "prometheus")]
        if let Some(addr) = cli.metrics_listen {
            self.metrics_listen = Some(addr);
        }
    }

    /// Tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
