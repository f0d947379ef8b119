//! Modbus/TCP command bridge
//!
//! Receives JSON-encoded Modbus commands over MQTT, validates them, executes
//! them against the addressed Modbus/TCP device and publishes the outcome to a
//! response or error topic.

pub mod cli;
pub mod command;
pub mod config;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use command::{validate_command, Command, CommandEnvelope};
pub use config::Config;
pub use modbus::{ConnectionManager, Dispatcher, ModbusConnector, TcpConnector};
pub use output::{JsonFormatter, ResultFormatter};
pub use services::{CommandPipeline, CommandWorker, MessagingClient, MqttMessagingClient};
pub use utils::error::BridgeError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
