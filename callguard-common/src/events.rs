//! Event types for the CallGuard event system
//!
//! Provides the shared event definitions and the broadcast `EventBus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// CallGuard event types
///
/// Events are broadcast via `EventBus` and are serializable so they can be
/// forwarded to external sinks unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CareEvent {
    /// A conversation record was created or overwritten in `active` state
    ConversationCreated {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A fresh assessment was persisted for a conversation
    ConversationAssessed {
        conversation_id: String,
        /// Internal risk vocabulary (e.g. "high")
        risk_level: String,
        risk_score: i64,
        /// Where the assessment came from (audio, text, cached, fallback-default)
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// Crisis-level finding that requires human follow-up
    RiskAlertRaised {
        alert_id: Uuid,
        conversation_id: String,
        risk_level: String,
        timestamp: DateTime<Utc>,
    },

    /// A bulk operation finished
    BatchCompleted {
        /// "import", "validate" or "refresh"
        operation: String,
        total: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CareEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &str {
        match self {
            CareEvent::ConversationCreated { .. } => "ConversationCreated",
            CareEvent::ConversationAssessed { .. } => "ConversationAssessed",
            CareEvent::RiskAlertRaised { .. } => "RiskAlertRaised",
            CareEvent::BatchCompleted { .. } => "BatchCompleted",
        }
    }
}

/// Broadcast bus shared by all components of a service
///
/// Cloning is cheap; all clones publish to the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CareEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow subscribers
    /// start missing old events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CareEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CareEvent,
    ) -> Result<usize, broadcast::error::SendError<CareEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CareEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
