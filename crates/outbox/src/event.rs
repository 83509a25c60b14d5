use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of an event in the outbox.
///
/// Assigned by the store in append order, so ascending ids approximate
/// the order in which the write side committed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OutboxId(i64);

impl OutboxId {
    /// Creates an id from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for OutboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OutboxId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// An event waiting to be appended, before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    /// Broker topic the relay publishes to (e.g. `"order-events"`).
    pub topic: String,

    /// Serialized event, carrying everything consumers need.
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    /// Creates a new outbox event from a raw JSON payload.
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Serializes `payload` into a new outbox event.
    pub fn serialize<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_value(payload)?))
    }
}

/// A row of the outbox relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: OutboxId,

    pub topic: String,

    pub payload: serde_json::Value,

    /// When the write transaction appended the event.
    pub created_at: DateTime<Utc>,

    /// Set once, after the broker acknowledged the publish.
    pub published_at: Option<DateTime<Utc>>,

    /// Relay instance currently holding the claim, if any.
    pub claimed_by: Option<String>,

    /// When the current claim lapses and other relays may take the row.
    pub claimed_until: Option<DateTime<Utc>>,

    /// Number of times the row has been claimed for publishing.
    pub attempts: i32,
}

impl OutboxEvent {
    /// An event with no `published_at` is pending.
    pub fn is_pending(&self) -> bool {
        self.published_at.is_none()
    }

    /// Whether another relay holds a live claim at `now`.
    pub fn is_claimed_at(&self, now: DateTime<Utc>) -> bool {
        self.claimed_until.is_some_and(|until| until > now)
    }

    /// Payload bytes as sent to the broker.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(published: bool, claimed_until: Option<DateTime<Utc>>) -> OutboxEvent {
        OutboxEvent {
            id: OutboxId::new(1),
            topic: "order-events".to_string(),
            payload: serde_json::json!({"eventType": "OrderCreated"}),
            created_at: Utc::now(),
            published_at: published.then(Utc::now),
            claimed_by: claimed_until.map(|_| "relay-1".to_string()),
            claimed_until,
            attempts: 0,
        }
    }

    #[test]
    fn unpublished_event_is_pending() {
        assert!(event(false, None).is_pending());
        assert!(!event(true, None).is_pending());
    }

    #[test]
    fn expired_claim_is_not_live() {
        let now = Utc::now();
        let expired = event(false, Some(now - chrono::TimeDelta::seconds(1)));
        let live = event(false, Some(now + chrono::TimeDelta::seconds(30)));

        assert!(!expired.is_claimed_at(now));
        assert!(live.is_claimed_at(now));
        assert!(!event(false, None).is_claimed_at(now));
    }

    #[test]
    fn outbox_ids_order_by_append_position() {
        assert!(OutboxId::new(41) < OutboxId::new(42));
    }

    #[test]
    fn new_event_serializes_payload() {
        #[derive(Serialize)]
        struct Payload {
            total: f64,
        }

        let new = NewOutboxEvent::serialize("order-events", &Payload { total: 25.0 }).unwrap();
        assert_eq!(new.topic, "order-events");
        assert_eq!(new.payload["total"], 25.0);
    }
}
