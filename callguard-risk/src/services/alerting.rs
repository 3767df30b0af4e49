//! Crisis alert delivery
//!
//! The lifecycle manager only knows the [`Alerter`] trait. The service wires
//! in [`EventBusAlerter`], which publishes `RiskAlertRaised` on the shared
//! event bus; [`spawn_alert_log_sink`] is the subscriber that turns those
//! events into log lines.

use async_trait::async_trait;
use callguard_common::events::{CareEvent, EventBus};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::RiskLevel;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("No alert subscriber is listening")]
    NoSubscribers,

    #[error("Alert delivery failed: {0}")]
    Delivery(String),
}

/// Fire-and-forget alert hook
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, conversation_id: &str, risk_level: RiskLevel) -> Result<(), AlertError>;
}

/// Publishes alerts on the event bus
pub struct EventBusAlerter {
    bus: EventBus,
}

impl EventBusAlerter {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Alerter for EventBusAlerter {
    async fn notify(&self, conversation_id: &str, risk_level: RiskLevel) -> Result<(), AlertError> {
        let alert_id = Uuid::new_v4();
        self.bus
            .emit(CareEvent::RiskAlertRaised {
                alert_id,
                conversation_id: conversation_id.to_string(),
                risk_level: risk_level.as_str().to_string(),
                timestamp: Utc::now(),
            })
            .map_err(|_| AlertError::NoSubscribers)?;

        tracing::debug!(%alert_id, conversation_id, "Risk alert published");
        Ok(())
    }
}

/// Log every `RiskAlertRaised` at warn level until the bus closes
pub fn spawn_alert_log_sink(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(CareEvent::RiskAlertRaised {
                    alert_id,
                    conversation_id,
                    risk_level,
                    timestamp,
                }) => {
                    tracing::warn!(
                        %alert_id,
                        conversation_id = %conversation_id,
                        risk_level = %risk_level,
                        raised_at = %timestamp.to_rfc3339(),
                        "IMMEDIATE INTERVENTION REQUIRED"
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::error!(skipped, "Alert sink lagged, events were dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
