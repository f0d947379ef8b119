use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::modbus::protocol::{DataShape, FunctionCode};
use crate::utils::error::BridgeError;

/// The `Data` payload of a command, resolved against the catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandData {
    Boolean(bool),
    BooleanSequence(Vec<bool>),
    Integer(u16),
    IntegerSequence(Vec<u16>),
    Raw(Value),
}

/// Accepts JSON integers and integral floats within `u16` range.
pub fn value_as_u16(value: &Value) -> Option<u16> {
    if let Some(n) = value.as_u64() {
        return u16::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u16::MAX as f64)
        .map(|f| f as u16)
}

fn value_as_bit(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        other => match value_as_u16(other) {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
    }
}

impl CommandData {
    /// Reads `value` as the shape `expected`; anything else comes back as `Raw`.
    pub fn resolve(value: &Value, expected: DataShape) -> CommandData {
        let resolved = match expected {
            DataShape::Boolean => value_as_bit(value).map(CommandData::Boolean),
            DataShape::Integer => value_as_u16(value).map(CommandData::Integer),
            DataShape::BooleanSequence => value
                .as_array()
                .and_then(|items| items.iter().map(value_as_bit).collect::<Option<Vec<_>>>())
                .map(CommandData::BooleanSequence),
            DataShape::IntegerSequence => value
                .as_array()
                .and_then(|items| items.iter().map(value_as_u16).collect::<Option<Vec<_>>>())
                .map(CommandData::IntegerSequence),
            DataShape::None => None,
        };
        resolved.unwrap_or_else(|| CommandData::Raw(value.clone()))
    }

    pub fn len(&self) -> usize {
        match self {
            CommandData::BooleanSequence(v) => v.len(),
            CommandData::IntegerSequence(v) => v.len(),
            _ => 1,
        }
    }
}

/// A command that passed validation and may be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub host: String,
    pub function: FunctionCode,
    pub start_address: u16,
    pub address_count: Option<u16>,
    pub data: Option<CommandData>,
}

impl Command {
    /// Number of addresses the request touches; single writes touch one.
    pub fn quantity(&self) -> u16 {
        self.address_count.unwrap_or(1)
    }
}

/// Structured error attached to a result. `code` is `None` when no Modbus
/// exception applies; the wire form writes that as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    #[serde(serialize_with = "code_or_zero")]
    pub code: Option<u8>,
    pub message: String,
}

fn code_or_zero<S: Serializer>(code: &Option<u8>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(code.unwrap_or(0))
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>, code: Option<u8>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Folds several records into one: messages joined, first exception code kept.
    pub fn combine(records: &[ErrorRecord]) -> Option<ErrorRecord> {
        if records.is_empty() {
            return None;
        }
        let message = records
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let code = records.iter().find_map(|r| r.code.filter(|c| *c != 0));
        Some(ErrorRecord { code, message })
    }
}

impl From<&BridgeError> for ErrorRecord {
    fn from(err: &BridgeError) -> Self {
        ErrorRecord::new(err.to_string(), err.exception_code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Booleans(Vec<bool>),
    Registers(Vec<u16>),
}

/// Everything known about one inbound message as it moves through the engine.
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    /// Inbound fields, echoed back in the result.
    pub fields: Map<String, Value>,
    pub raw: Vec<u8>,
    pub command: Option<Command>,
    pub errors: Vec<ErrorRecord>,
    /// Set by validation failures; the raw request is echoed under `request`.
    pub echo_request: bool,
    pub response: Option<ResponseData>,
}

impl CommandEnvelope {
    pub fn new(raw: &[u8], fields: Map<String, Value>) -> Self {
        Self {
            fields,
            raw: raw.to_vec(),
            command: None,
            errors: Vec::new(),
            echo_request: false,
            response: None,
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>, code: Option<u8>) {
        self.errors.push(ErrorRecord::new(message, code));
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Records the dispatch outcome.
    pub fn complete(&mut self, outcome: Result<ResponseData, BridgeError>) {
        match outcome {
            Ok(data) => self.response = Some(data),
            Err(e) => self.errors.push(ErrorRecord::from(&e)),
        }
    }
}
