pub mod command_worker;
pub mod messaging;

pub use command_worker::{CommandPipeline, CommandWorker};
pub use messaging::{MessagingClient, MockMessaging, MqttMessagingClient};
