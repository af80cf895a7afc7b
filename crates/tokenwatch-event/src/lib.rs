//! Application-wide event bus and the refresh-status notification it carries.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Topic used by the token refresher to announce the outcome of an attempt.
pub const REFRESH_STATUS_TOPIC: &str = "token:refresh-status";

/// Structured event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: SystemTime,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: SystemTime::now(),
        }
    }
}

/// Outcome of the most recent background token refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub ok: bool,
    /// Epoch milliseconds at which the attempt finished.
    pub at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl RefreshStatus {
    pub fn succeeded(at: i64) -> Self {
        Self {
            ok: true,
            at,
            error: None,
        }
    }

    pub fn failed(at: i64, error: impl Into<serde_json::Value>) -> Self {
        Self {
            ok: false,
            at,
            error: Some(error.into()),
        }
    }

    pub fn into_event(self) -> Event {
        let payload = serde_json::to_value(&self).unwrap_or(serde_json::Value::Null);
        Event::new(REFRESH_STATUS_TOPIC, payload)
    }

    /// Extract a status from `event`; `None` for other topics or bad payloads.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.topic != REFRESH_STATUS_TOPIC {
            return None;
        }
        serde_json::from_value(event.payload.clone())
            .inspect_err(|error| debug!(%error, "ignoring malformed refresh status"))
            .ok()
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `event` to current subscribers, returning how many received it.
    pub fn publish(&self, event: Event) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(err) => {
                debug!(topic = %err.0.topic, "no subscribers for event");
                0
            }
        }
    }

    pub fn publish_refresh_status(&self, status: RefreshStatus) -> usize {
        self.publish(status.into_event())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn refresh_status_round_trips_through_event() {
        let status = RefreshStatus::failed(1_700_000_000_000, 401);
        let event = status.clone().into_event();

        assert_eq!(event.topic, REFRESH_STATUS_TOPIC);
        assert_eq!(
            event.payload,
            json!({ "ok": false, "at": 1_700_000_000_000i64, "error": 401 })
        );
        assert_eq!(RefreshStatus::from_event(&event), Some(status));
    }

    #[test]
    fn from_event_ignores_other_topics_and_bad_payloads() {
        let other = Event::new("sensors.temperature", json!({ "ok": true, "at": 1 }));
        assert_eq!(RefreshStatus::from_event(&other), None);

        let malformed = Event::new(REFRESH_STATUS_TOPIC, json!({ "ok": "yes" }));
        assert_eq!(RefreshStatus::from_event(&malformed), None);

        let minimal = Event::new(REFRESH_STATUS_TOPIC, json!({ "ok": true, "at": 5 }));
        assert_eq!(
            RefreshStatus::from_event(&minimal),
            Some(RefreshStatus::succeeded(5))
        );
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish_refresh_status(RefreshStatus::succeeded(1)), 0);

        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.publish_refresh_status(RefreshStatus::succeeded(2)), 2);

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.expect("event");
            assert_eq!(
                RefreshStatus::from_event(&event),
                Some(RefreshStatus::succeeded(2))
            );
        }
    }
}
