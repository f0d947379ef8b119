use clap::ArgMatches;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::modbus::codec::CoilBitOrder;
use crate::utils::error::BridgeError;

pub const DEFAULT_ADAPTER_NAME: &str = "modbusClientAdapter";
pub const DEFAULT_TOPIC_ROOT: &str = "modbus/command";
pub const DEFAULT_CONFIG_COLLECTION: &str = "adapter_config";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub mqtt: MqttSettings,
    pub modbus: ModbusSettings,
    pub adapter: AdapterSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub broker_host: String,
    pub broker_port: u16,
    /// Username and client id prefix.
    pub device_name: String,
    pub active_key: Option<String>,
    pub keep_alive_secs: u64,
    /// Capacity of the bounded hand-off channel between broker and worker.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusSettings {
    pub timeout_ms: u64,
    /// 0 keeps sessions open indefinitely.
    pub idle_timeout_secs: u64,
    pub unit_id: u8,
    pub coil_bit_order: CoilBitOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    pub adapter_name: String,
    pub adapter_id: Option<String>,
    pub config_collection: String,
    pub config_store: Option<PathBuf>,
    pub topic_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mqtt: MqttSettings::default(),
            modbus: ModbusSettings::default(),
            adapter: AdapterSettings::default(),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            device_name: DEFAULT_ADAPTER_NAME.to_string(),
            active_key: None,
            keep_alive_secs: 30,
            channel_capacity: 64,
        }
    }
}

impl Default for ModbusSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            idle_timeout_secs: 60,
            unit_id: 255,
            coil_bit_order: CoilBitOrder::MsbFirst,
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            adapter_name: DEFAULT_ADAPTER_NAME.to_string(),
            adapter_id: None,
            config_collection: DEFAULT_CONFIG_COLLECTION.to_string(),
            config_store: None,
            topic_root: DEFAULT_TOPIC_ROOT.to_string(),
        }
    }
}

impl ModbusSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

fn parse_flag<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, BridgeError>
where
    T::Err: std::fmt::Display,
{
    matches
        .get_one::<String>(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| BridgeError::ConfigError(format!("invalid --{} value {:?}: {}", name, raw, e)))
        })
        .transpose()
}

impl Config {
    /// Loads `--config` when given, then overlays the remaining flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, BridgeError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_matches(matches)?;
        Ok(config)
    }

    pub fn apply_matches(&mut self, matches: &ArgMatches) -> Result<(), BridgeError> {
        if let Some(host) = matches.get_one::<String>("broker") {
            self.mqtt.broker_host = host.clone();
        }
        if let Some(port) = parse_flag(matches, "broker-port")? {
            self.mqtt.broker_port = port;
        }
        if let Some(device) = matches.get_one::<String>("device-id") {
            self.mqtt.device_name = device.clone();
        }
        if let Some(key) = matches.get_one::<String>("active-key") {
            self.mqtt.active_key = Some(key.clone());
        }
        if let Some(root) = matches.get_one::<String>("topic-root") {
            self.adapter.topic_root = root.clone();
        }
        if let Some(id) = matches.get_one::<String>("adapter-id") {
            self.adapter.adapter_id = Some(id.clone());
        }
        if let Some(collection) = matches.get_one::<String>("adapter-config-collection") {
            self.adapter.config_collection = collection.clone();
        }
        if let Some(store) = matches.get_one::<String>("adapter-config-store") {
            self.adapter.config_store = Some(PathBuf::from(store));
        }
        if let Some(unit) = parse_flag(matches, "unit-id")? {
            self.modbus.unit_id = unit;
        }
        if let Some(timeout) = parse_flag(matches, "timeout-ms")? {
            self.modbus.timeout_ms = timeout;
        }
        if let Some(level) = matches.get_one::<String>("log-level") {
            self.log_level = level.clone();
        }
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BridgeError::ConfigError(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("📋 Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, BridgeError> {
        toml::to_string_pretty(self)
            .map_err(|e| BridgeError::SerializationError(format!("TOML error: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), BridgeError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BridgeError::ConfigError(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        std::fs::write(path.as_ref(), self.to_toml()?)
            .map_err(|e| BridgeError::ConfigError(format!("cannot write {}: {}", path.as_ref().display(), e)))
    }
}
