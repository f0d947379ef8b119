//! Ownership of the single outbound Modbus/TCP session.

use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

use super::client::{ModbusClientTrait, ModbusConnector};
use crate::utils::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Connecting,
    Open,
}

struct Session {
    target: String,
    client: Box<dyn ModbusClientTrait>,
    last_used: Instant,
}

pub struct ConnectionManager<C: ModbusConnector> {
    connector: C,
    session: Option<Session>,
    state: SessionState,
    idle_timeout: Option<Duration>,
}

impl<C: ModbusConnector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: None,
            state: SessionState::Absent,
            idle_timeout: None,
        }
    }

    /// Sessions unused for longer than `idle` are reopened before the next request.
    pub fn with_idle_timeout(mut self, idle: Option<Duration>) -> Self {
        self.idle_timeout = idle.filter(|d| !d.is_zero());
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_target(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.target.as_str())
    }

    fn is_idle_expired(&self, session: &Session) -> bool {
        self.idle_timeout
            .map(|idle| session.last_used.elapsed() > idle)
            .unwrap_or(false)
    }

    /// Returns a session open against `host`, replacing the current one when
    /// the target differs, the session went idle, or none is open.
    pub async fn ensure_target(&mut self, host: &str) -> Result<&mut dyn ModbusClientTrait, BridgeError> {
        let reusable = match &self.session {
            Some(session) if session.target == host => {
                if self.is_idle_expired(session) {
                    info!("⏱️  Modbus session to {} idle too long, reconnecting", host);
                    false
                } else {
                    true
                }
            }
            Some(session) => {
                info!(
                    "🔄 Modbus host changed from {} to {}, resetting session",
                    session.target, host
                );
                false
            }
            None => false,
        };

        if !reusable {
            self.close().await;

            if host.trim().is_empty() {
                return Err(BridgeError::Network(format!(
                    "Invalid address for modbus host: {:?}",
                    host
                )));
            }

            self.state = SessionState::Connecting;
            debug!("Opening Modbus session to {}", host);
            match self.connector.connect(host).await {
                Ok(client) => {
                    self.session = Some(Session {
                        target: host.to_string(),
                        client,
                        last_used: Instant::now(),
                    });
                    self.state = SessionState::Open;
                }
                Err(e) => {
                    warn!("❌ Unable to open Modbus session to {}: {}", host, e);
                    self.state = SessionState::Absent;
                    return Err(e);
                }
            }
        }

        match self.session.as_mut() {
            Some(session) => {
                session.last_used = Instant::now();
                Ok(session.client.as_mut())
            }
            None => Err(BridgeError::Network("no Modbus session".to_string())),
        }
    }

    /// Drops the session after a transport fault so the next request reconnects.
    pub async fn invalidate(&mut self) {
        if let Some(target) = self.current_target() {
            warn!("🔌 Discarding Modbus session to {} after network fault", target);
        }
        self.close().await;
    }

    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.client.close().await;
        }
        self.state = SessionState::Absent;
    }
}
