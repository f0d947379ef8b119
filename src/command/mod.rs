pub mod model;
pub mod validator;

pub use model::{Command, CommandData, CommandEnvelope, ErrorRecord, ResponseData};
pub use validator::validate_command;
