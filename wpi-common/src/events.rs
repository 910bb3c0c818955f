//! Event types for the WPI event system
//!
//! Provides the shared event definitions and the EventBus used to fan events
//! out to SSE subscribers. Inspection events are keyed by the client supplied
//! session id so a camera UI can follow the progress of its own upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Stage of a running inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStage {
    /// Upload accepted, workplace and active model resolved
    Received,
    /// Image forwarded to the inference service
    Analyzing,
    /// Face check passed (or was not requested)
    PrivacyChecked,
    /// Prediction mapped onto the workplace category table
    Categorizing,
    /// Image and analysis row written
    Saving,
}

impl InspectionStage {
    /// Progress percentage reported for this stage
    pub fn percent(&self) -> u8 {
        match self {
            InspectionStage::Received => 10,
            InspectionStage::Analyzing => 30,
            InspectionStage::PrivacyChecked => 60,
            InspectionStage::Categorizing => 75,
            InspectionStage::Saving => 90,
        }
    }
}

/// WPI event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WpiEvent {
    /// An inspection moved to a new stage
    InspectionProgress {
        session_id: String,
        stage: InspectionStage,
        percent: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Inspection finished and was stored
    InspectionCompleted {
        session_id: String,
        analysis_id: Uuid,
        /// "OK" or "NOK"
        status: String,
        label: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// Faces were found in frame; the image was discarded
    InspectionPrivacyBlocked {
        session_id: String,
        faces_detected: u32,
        timestamp: DateTime<Utc>,
    },

    /// Inspection aborted with an error
    InspectionFailed {
        session_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A model became the live model of its workplace
    ModelActivated {
        workplace_id: Uuid,
        model_id: Uuid,
        version: String,
        archived_model_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// Training images of a workplace were added, relabeled or deleted
    DatasetChanged {
        workplace_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl WpiEvent {
    /// SSE event name
    pub fn event_type(&self) -> &str {
        match self {
            WpiEvent::InspectionProgress { .. } => "InspectionProgress",
            WpiEvent::InspectionCompleted { .. } => "InspectionCompleted",
            WpiEvent::InspectionPrivacyBlocked { .. } => "InspectionPrivacyBlocked",
            WpiEvent::InspectionFailed { .. } => "InspectionFailed",
            WpiEvent::ModelActivated { .. } => "ModelActivated",
            WpiEvent::DatasetChanged { .. } => "DatasetChanged",
        }
    }

    /// Inspection session the event belongs to, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            WpiEvent::InspectionProgress { session_id, .. }
            | WpiEvent::InspectionCompleted { session_id, .. }
            | WpiEvent::InspectionPrivacyBlocked { session_id, .. }
            | WpiEvent::InspectionFailed { session_id, .. } => Some(session_id),
            WpiEvent::ModelActivated { .. } | WpiEvent::DatasetChanged { .. } => None,
        }
    }

    /// True for the last event of an inspection session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WpiEvent::InspectionCompleted { .. }
                | WpiEvent::InspectionPrivacyBlocked { .. }
                | WpiEvent::InspectionFailed { .. }
        )
    }

    /// Convenience constructor for a progress event
    pub fn progress(session_id: &str, stage: InspectionStage, message: impl Into<String>) -> Self {
        WpiEvent::InspectionProgress {
            session_id: session_id.to_string(),
            stage,
            percent: stage.percent(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast bus for WPI events
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WpiEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use wpi_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<WpiEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: WpiEvent) -> Result<usize, broadcast::error::SendError<WpiEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress events are advisory; an inspection never fails because nobody
    /// is watching it.
    pub fn emit_lossy(&self, event: WpiEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = WpiEvent::progress("cam-1", InspectionStage::Analyzing, "Running model");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "InspectionProgress");
        assert_eq!(json["stage"], "analyzing");
        assert_eq!(json["percent"], 30);
        assert_eq!(json["session_id"], "cam-1");
    }

    #[test]
    fn test_terminal_events() {
        let done = WpiEvent::InspectionFailed {
            session_id: "s".into(),
            error: "boom".into(),
            timestamp: Utc::now(),
        };
        assert!(done.is_terminal());
        assert_eq!(done.session_id(), Some("s"));

        let progress = WpiEvent::progress("s", InspectionStage::Received, "");
        assert!(!progress.is_terminal());

        let dataset = WpiEvent::DatasetChanged {
            workplace_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        assert_eq!(dataset.session_id(), None);
    }

    #[test]
    fn test_stage_percent_increases() {
        let stages = [
            InspectionStage::Received,
            InspectionStage::Analyzing,
            InspectionStage::PrivacyChecked,
            InspectionStage::Categorizing,
            InspectionStage::Saving,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(10);
        assert!(bus.emit(WpiEvent::progress("x", InspectionStage::Received, "")).is_err());

        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.emit_lossy(WpiEvent::progress("x", InspectionStage::Saving, "saving"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "InspectionProgress");
    }
}
