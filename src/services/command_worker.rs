use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use super::messaging::MessagingClient;
use crate::command::model::CommandEnvelope;
use crate::command::validator::validate_command;
use crate::modbus::client::ModbusConnector;
use crate::modbus::dispatcher::Dispatcher;
use crate::output::formatters::{OutboundMessage, ResultFormatter};
use crate::utils::error::BridgeError;

/// Validator, dispatcher and formatter chained for one payload at a time.
pub struct CommandPipeline<C: ModbusConnector> {
    dispatcher: Dispatcher<C>,
    formatter: Box<dyn ResultFormatter>,
}

impl<C: ModbusConnector> CommandPipeline<C> {
    pub fn new(dispatcher: Dispatcher<C>, formatter: Box<dyn ResultFormatter>) -> Self {
        Self { dispatcher, formatter }
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    /// Runs one payload through validation and, when clean, dispatch.
    pub async fn execute(&mut self, payload: &[u8]) -> CommandEnvelope {
        let mut envelope = validate_command(payload);

        if let Some(command) = envelope.command.take() {
            let outcome = self.dispatcher.dispatch(&command).await;
            envelope.complete(outcome);
            envelope.command = Some(command);
        }

        envelope
    }

    /// Executes and formats a payload; no message is produced if formatting fails.
    pub async fn process(&mut self, payload: &[u8]) -> Result<OutboundMessage, BridgeError> {
        let envelope = self.execute(payload).await;
        self.formatter.format(&envelope)
    }

    pub async fn shutdown(&mut self) {
        self.dispatcher.shutdown().await;
    }
}

/// Sequential command loop: pulls one inbound message at a time, runs it
/// through the pipeline and publishes the result.
pub struct CommandWorker<C: ModbusConnector, M: MessagingClient + ?Sized> {
    pipeline: CommandPipeline<C>,
    messaging: Arc<M>,
}

impl<C: ModbusConnector, M: MessagingClient + ?Sized> CommandWorker<C, M> {
    pub fn new(pipeline: CommandPipeline<C>, messaging: Arc<M>) -> Self {
        Self { pipeline, messaging }
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        self.pipeline.dispatcher()
    }

    pub async fn process(&mut self, payload: &[u8]) -> Result<OutboundMessage, BridgeError> {
        self.pipeline.process(payload).await
    }

    pub async fn handle_request(&mut self, payload: &[u8]) {
        info!("📨 Processing request");
        let message = match self.process(payload).await {
            Ok(message) => message,
            Err(e) => {
                error!("❌ Unable to format response, nothing published: {}", e);
                return;
            }
        };

        info!("📤 Publishing response to {}", message.topic);
        if let Err(e) = self.messaging.publish(&message.topic, &message.payload).await {
            error!("❌ Error publishing to {}: {}", message.topic, e);
        }
    }

    /// Consumes `inbound` until the channel closes or `stop` is signalled.
    /// The stop signal is only observed between commands.
    pub async fn run(&mut self, mut inbound: mpsc::Receiver<Vec<u8>>, mut stop: watch::Receiver<bool>) {
        info!("🚀 Command worker waiting for Modbus requests");

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        warn!("⚠️  Stop signal sender dropped");
                        break;
                    }
                }
                message = inbound.recv() => match message {
                    Some(payload) => self.handle_request(&payload).await,
                    None => {
                        warn!("⚠️  Inbound command channel closed");
                        break;
                    }
                },
            }
        }

        info!("🛑 Stopping command worker");
        self.pipeline.shutdown().await;
    }
}
