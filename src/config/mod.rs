pub mod adapter_config;
pub mod settings;

pub use adapter_config::{
    resolve_topic_root, AdapterConfigRow, AdapterConfigSource, AdapterQuery, FileAdapterConfigSource,
};
pub use settings::{AdapterSettings, Config, ModbusSettings, MqttSettings};
