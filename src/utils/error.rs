use thiserror::Error;

use crate::modbus::protocol::ExceptionCode;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Modbus exception {code} ({}) for function {function}", exception_name(.code))]
    ModbusException { function: u8, code: u8 },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn exception_name(code: &u8) -> &'static str {
    ExceptionCode::describe(*code)
}

impl BridgeError {
    /// Transport-level faults poison the Modbus session; device rejections do not.
    pub fn is_network_fault(&self) -> bool {
        matches!(
            self,
            BridgeError::Network(_) | BridgeError::Timeout | BridgeError::InvalidResponse(_)
        )
    }

    pub fn exception_code(&self) -> Option<u8> {
        match self {
            BridgeError::ModbusException { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Network(format!("IO error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for BridgeError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        BridgeError::Timeout
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigError(format!("TOML error: {}", err))
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        BridgeError::ConnectionError(format!("MQTT client error: {}", err))
    }
}
