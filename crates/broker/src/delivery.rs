use std::fmt;

/// Broker-assigned identifier of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    pub fn new(tag: u64) -> Self {
        Self(tag)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message handed to a consumer.
///
/// The consumer must [`ack`](crate::Broker::ack) it once its effect is
/// durable, or [`nack`](crate::Broker::nack) it. Until then the broker
/// treats it as in flight and may redeliver it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub topic: String,
    pub payload: Vec<u8>,
    /// True when this message was delivered before and not acknowledged.
    pub redelivered: bool,
}

impl Delivery {
    /// Payload as UTF-8 text, lossy. Used when parking undecodable messages.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// A message the broker has confirmed, in confirmation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}
