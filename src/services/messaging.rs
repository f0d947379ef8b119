use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::settings::MqttSettings;
use crate::utils::error::BridgeError;

/// The pub/sub channel commands arrive on and results leave by.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, BridgeError>;
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BridgeError>;
}

struct Subscription {
    topic: String,
    sender: mpsc::Sender<Vec<u8>>,
}

pub struct MqttMessagingClient {
    client: AsyncClient,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    channel_capacity: usize,
    _event_loop_handle: tokio::task::JoinHandle<()>,
}

impl MqttMessagingClient {
    pub fn client_id(settings: &MqttSettings) -> String {
        format!("{}_client-{}", settings.device_name, Uuid::new_v4().simple())
    }

    pub fn new(settings: &MqttSettings) -> Self {
        let client_id = Self::client_id(settings);
        info!(
            "📻 Connecting to MQTT broker {}:{} as {}",
            settings.broker_host, settings.broker_port, client_id
        );

        let mut options = MqttOptions::new(client_id, &settings.broker_host, settings.broker_port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
        if let Some(key) = &settings.active_key {
            options.set_credentials(&settings.device_name, key);
        }

        let (client, eventloop) = AsyncClient::new(options, settings.channel_capacity.max(1));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(Self::drive(eventloop, client.clone(), subscriptions.clone()));

        Self {
            client,
            subscriptions,
            channel_capacity: settings.channel_capacity.max(1),
            _event_loop_handle: handle,
        }
    }

    /// Queues a subscribe for each topic without waiting on the request
    /// channel, which only the event loop itself drains. Returns how many
    /// were queued.
    fn resubscribe(client: &AsyncClient, topics: &[String]) -> usize {
        let mut queued = 0;
        for topic in topics {
            match client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                Ok(()) => queued += 1,
                Err(e) => error!("❌ Unable to re-subscribe to {}: {}", topic, e),
            }
        }
        queued
    }

    /// Polls the event loop, forwarding publishes to subscribers and
    /// re-subscribing after each CONNACK since sessions are not persistent.
    async fn drive(
        mut eventloop: EventLoop,
        client: AsyncClient,
        subscriptions: Arc<Mutex<Vec<Subscription>>>,
    ) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("✅ Connected to MQTT broker");
                    let topics: Vec<String> = match subscriptions.lock() {
                        Ok(subs) => subs.iter().map(|s| s.topic.clone()).collect(),
                        Err(_) => Vec::new(),
                    };
                    Self::resubscribe(&client, &topics);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!("📨 Message received on {}", publish.topic);
                    let targets: Vec<mpsc::Sender<Vec<u8>>> = match subscriptions.lock() {
                        Ok(subs) => subs
                            .iter()
                            .filter(|s| s.topic == publish.topic)
                            .map(|s| s.sender.clone())
                            .collect(),
                        Err(_) => Vec::new(),
                    };
                    for sender in targets {
                        if sender.send(publish.payload.to_vec()).await.is_err() {
                            warn!("⚠️  Subscriber for {} has gone away", publish.topic);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("❌ MQTT event loop error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[async_trait]
impl MessagingClient for MqttMessagingClient {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, BridgeError> {
        debug!("subscribe - Subscribing to topic {}", topic);
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        self.subscriptions
            .lock()
            .map_err(|_| BridgeError::ConnectionError("subscription table poisoned".to_string()))?
            .push(Subscription {
                topic: topic.to_string(),
                sender,
            });

        self.client.subscribe(topic, QoS::AtMostOnce).await?;
        info!("📻 Subscribed to {}", topic);
        Ok(receiver)
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BridgeError> {
        debug!("publish - Publishing to topic {}", topic);
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .await?;
        Ok(())
    }
}

/// In-memory messaging client: subscribers are fed through [`MockMessaging::inject`]
/// and every publish is recorded.
#[derive(Clone, Default)]
pub struct MockMessaging {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    senders: Arc<Mutex<Vec<(String, mpsc::Sender<Vec<u8>>)>>>,
    fail_publish: Arc<Mutex<bool>>,
}

impl MockMessaging {
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn set_fail_publish(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_publish.lock() {
            *flag = fail;
        }
    }

    pub async fn inject(&self, topic: &str, payload: &[u8]) -> Result<(), BridgeError> {
        let targets: Vec<_> = self
            .senders
            .lock()
            .map_err(|_| BridgeError::ConnectionError("mock poisoned".to_string()))?
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, s)| s.clone())
            .collect();
        for sender in targets {
            sender
                .send(payload.to_vec())
                .await
                .map_err(|e| BridgeError::ConnectionError(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for MockMessaging {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, BridgeError> {
        info!("📻 [MOCK MQTT] Subscribing to topic: {}", topic);
        let (sender, receiver) = mpsc::channel(16);
        self.senders
            .lock()
            .map_err(|_| BridgeError::ConnectionError("mock poisoned".to_string()))?
            .push((topic.to_string(), sender));
        Ok(receiver)
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BridgeError> {
        if self.fail_publish.lock().map(|f| *f).unwrap_or(false) {
            return Err(BridgeError::ConnectionError("broker unavailable".to_string()));
        }
        info!("📻 [MOCK MQTT] Publishing to topic '{}'", topic);
        self.published
            .lock()
            .map_err(|_| BridgeError::ConnectionError("mock poisoned".to_string()))?
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}
