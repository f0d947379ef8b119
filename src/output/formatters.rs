use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde_json::{json, Value};

use crate::command::model::{CommandEnvelope, ErrorRecord};
use crate::utils::error::BridgeError;

pub const RESPONSE_SUFFIX: &str = "/response";
pub const ERROR_SUFFIX: &str = "/error";
pub const REQUEST_SUFFIX: &str = "/request";

/// A serialized result ready for the messaging channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

pub trait ResultFormatter: Send + Sync {
    fn format_at(&self, envelope: &CommandEnvelope, now: DateTime<Utc>) -> Result<OutboundMessage, BridgeError>;

    fn format(&self, envelope: &CommandEnvelope) -> Result<OutboundMessage, BridgeError> {
        self.format_at(envelope, Utc::now())
    }
}

/// ISO-8601 with milliseconds and an explicit offset (`Z` for UTC).
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct JsonFormatter {
    topic_root: String,
}

impl JsonFormatter {
    pub fn new(topic_root: impl Into<String>) -> Self {
        Self {
            topic_root: topic_root.into(),
        }
    }

    pub fn request_topic(&self) -> String {
        format!("{}{}", self.topic_root, REQUEST_SUFFIX)
    }

    /// Builds the JSON result object: inbound fields echoed, then outcome and timestamp.
    pub fn to_value(&self, envelope: &CommandEnvelope, now: DateTime<Utc>) -> Value {
        let mut result = envelope.fields.clone();

        match ErrorRecord::combine(&envelope.errors) {
            Some(error) => {
                result.insert("success".to_string(), Value::Bool(false));
                result.insert("error".to_string(), json!(error));
                if envelope.echo_request {
                    result.insert("request".to_string(), Value::String(base64::encode(&envelope.raw)));
                }
            }
            None => {
                result.insert("success".to_string(), Value::Bool(true));
                if let Some(data) = &envelope.response {
                    result.insert("Data".to_string(), json!(data));
                }
            }
        }

        result.insert("timestamp".to_string(), Value::String(timestamp(now)));
        Value::Object(result)
    }
}

impl ResultFormatter for JsonFormatter {
    fn format_at(&self, envelope: &CommandEnvelope, now: DateTime<Utc>) -> Result<OutboundMessage, BridgeError> {
        let suffix = if envelope.has_error() { ERROR_SUFFIX } else { RESPONSE_SUFFIX };
        let topic = format!("{}{}", self.topic_root, suffix);

        let payload = serde_json::to_vec(&self.to_value(envelope, now))?;
        debug!("format - response for {}: {}", topic, String::from_utf8_lossy(&payload));

        Ok(OutboundMessage { topic, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::model::ResponseData;
    use crate::command::validator::validate_command;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap() + chrono::Duration::milliseconds(42)
    }

    fn parse(message: &OutboundMessage) -> Value {
        serde_json::from_slice(&message.payload).unwrap()
    }

    #[test]
    fn timestamp_has_milliseconds_and_offset() {
        assert_eq!(timestamp(fixed_now()), "2024-03-09T14:05:07.042Z");
    }

    #[test]
    fn success_goes_to_response_topic_with_data() {
        let formatter = JsonFormatter::new("modbus/command");
        let mut envelope = validate_command(
            br#"{"ModbusHost":"plc:502","FunctionCode":3,"StartAddress":0,"AddressCount":2}"#,
        );
        envelope.complete(Ok(ResponseData::Registers(vec![1, 2])));

        let message = formatter.format_at(&envelope, fixed_now()).unwrap();
        assert_eq!(message.topic, "modbus/command/response");

        let body = parse(&message);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["Data"], json!([1, 2]));
        assert_eq!(body["ModbusHost"], json!("plc:502"));
        assert_eq!(body["timestamp"], json!("2024-03-09T14:05:07.042Z"));
        assert!(body.get("error").is_none());
    }

    #[test]
    fn validation_failure_goes_to_error_topic_with_request_echo() {
        let formatter = JsonFormatter::new("site/7");
        let raw = br#"{"ModbusHost":"plc:502","StartAddress":0}"#;
        let envelope = validate_command(raw);

        let message = formatter.format_at(&envelope, fixed_now()).unwrap();
        assert_eq!(message.topic, "site/7/error");

        let body = parse(&message);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!({"code": 0, "message": "FunctionCode is required"}));
        assert_eq!(body["request"], json!(base64::encode(raw)));
        assert_eq!(body["StartAddress"], json!(0));
        assert!(body["timestamp"].as_str().is_some());
    }

    #[test]
    fn device_exception_keeps_its_code() {
        let formatter = JsonFormatter::new("modbus/command");
        let mut envelope = validate_command(
            br#"{"ModbusHost":"plc:502","FunctionCode":3,"StartAddress":9000,"AddressCount":1}"#,
        );
        envelope.complete(Err(BridgeError::ModbusException { function: 3, code: 2 }));

        let body = parse(&formatter.format_at(&envelope, fixed_now()).unwrap());
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["code"], json!(2));
        assert!(!body["error"]["message"].as_str().unwrap().is_empty());
        assert!(body.get("request").is_none());
    }

    #[test]
    fn request_topic_uses_root() {
        assert_eq!(JsonFormatter::new("a/b").request_topic(), "a/b/request");
    }
}
