//! Checks an inbound payload against the requirements of its function code.
//!
//! Every check runs; each failure appends its own error so a single response
//! reports all defects found.

use log::{debug, error};
use serde_json::{Map, Value};

use super::model::{value_as_u16, Command, CommandData, CommandEnvelope};
use crate::modbus::protocol::{DataShape, ExceptionCode, FunctionCode};

pub const FIELD_HOST: &str = "ModbusHost";
pub const FIELD_FUNCTION_CODE: &str = "FunctionCode";
pub const FIELD_START_ADDRESS: &str = "StartAddress";
pub const FIELD_ADDRESS_COUNT: &str = "AddressCount";
pub const FIELD_DATA: &str = "Data";

fn present<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

fn shape_description(shape: DataShape) -> &'static str {
    match shape {
        DataShape::Boolean => "a boolean or 0/1",
        DataShape::BooleanSequence => "a list of booleans",
        DataShape::Integer => "an integer between 0 and 65535",
        DataShape::IntegerSequence => "a list of integers between 0 and 65535",
        DataShape::None => "absent",
    }
}

pub fn validate_command(payload: &[u8]) -> CommandEnvelope {
    debug!("validate_command - payload received: {}", String::from_utf8_lossy(payload));

    let mut envelope = match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(fields)) => CommandEnvelope::new(payload, fields),
        Ok(other) => {
            error!("❌ Inbound payload is not a JSON object: {}", other);
            let mut envelope = CommandEnvelope::new(payload, Map::new());
            envelope.add_error("malformed payload: expected a JSON object", None);
            envelope
        }
        Err(e) => {
            error!("❌ Error unmarshalling inbound payload: {}", e);
            let mut envelope = CommandEnvelope::new(payload, Map::new());
            envelope.add_error(format!("malformed payload: {}", e), None);
            envelope
        }
    };

    let host = match present(&envelope.fields, FIELD_HOST).and_then(Value::as_str) {
        Some(h) if !h.trim().is_empty() => Some(h.to_string()),
        _ => {
            error!("❌ ModbusHost not specified in incoming payload");
            envelope.add_error("ModbusHost is required", None);
            None
        }
    };

    let function = match present(&envelope.fields, FIELD_FUNCTION_CODE) {
        None => {
            error!("❌ FunctionCode not specified in incoming payload");
            envelope.add_error("FunctionCode is required", None);
            None
        }
        Some(value) => {
            let code = value_as_u16(value)
                .and_then(|c| u8::try_from(c).ok())
                .and_then(FunctionCode::from_u8);
            if code.is_none() {
                error!("❌ FunctionCode {} is not supported", value);
                envelope.add_error("Invalid FunctionCode", Some(ExceptionCode::IllegalFunction as u8));
            }
            code
        }
    };

    let start_address = match present(&envelope.fields, FIELD_START_ADDRESS) {
        None => {
            error!("❌ StartAddress not specified in incoming payload");
            envelope.add_error("StartAddress is required", None);
            None
        }
        Some(value) => {
            let address = value_as_u16(value);
            if address.is_none() {
                envelope.add_error("StartAddress must be an integer between 0 and 65535", None);
            }
            address
        }
    };

    let mut address_count = None;
    let mut data = None;

    if let Some(function) = function {
        let entry = function.entry();

        if entry.requires_address_count {
            match present(&envelope.fields, FIELD_ADDRESS_COUNT) {
                None => {
                    error!("❌ AddressCount not specified and is required for {}", entry.name);
                    envelope.add_error("AddressCount is required", None);
                }
                Some(value) => match value_as_u16(value) {
                    Some(count) if count >= 1 && count <= entry.max_quantity => {
                        address_count = Some(count)
                    }
                    _ => envelope.add_error(
                        format!(
                            "AddressCount must be between 1 and {} for {}",
                            entry.max_quantity, entry.name
                        ),
                        None,
                    ),
                },
            }
        }

        if entry.is_write() {
            match present(&envelope.fields, FIELD_DATA) {
                None => {
                    error!("❌ Data not specified and is required for {}", entry.name);
                    envelope.add_error("Data is required for 'write' function codes", None);
                }
                Some(value) => match CommandData::resolve(value, entry.data) {
                    CommandData::Raw(_) => envelope.add_error(
                        format!("Data must be {} for {}", shape_description(entry.data), entry.name),
                        None,
                    ),
                    resolved => {
                        if let Some(count) = address_count {
                            let is_sequence = matches!(
                                entry.data,
                                DataShape::BooleanSequence | DataShape::IntegerSequence
                            );
                            if is_sequence && resolved.len() != count as usize {
                                envelope.add_error(
                                    format!(
                                        "Data length {} does not match AddressCount {}",
                                        resolved.len(),
                                        count
                                    ),
                                    None,
                                );
                            }
                        }
                        data = Some(resolved);
                    }
                },
            }
        }
    }

    if envelope.has_error() {
        envelope.echo_request = true;
        return envelope;
    }

    if let (Some(host), Some(function), Some(start_address)) = (host, function, start_address) {
        envelope.command = Some(Command {
            host,
            function,
            start_address,
            address_count,
            data,
        });
    }

    envelope
}
