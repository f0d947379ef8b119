pub mod formatters;

pub use formatters::{JsonFormatter, OutboundMessage, ResultFormatter};
