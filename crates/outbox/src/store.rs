use std::time::Duration;

use async_trait::async_trait;

use crate::{OutboxEvent, OutboxId, Result};

/// Relay-facing operations on the outbox relation.
///
/// Appending is deliberately absent: events are only ever written inside the
/// write-side transaction that produces them (see
/// [`PostgresOutbox::insert_in_tx`](crate::PostgresOutbox::insert_in_tx) and
/// [`InMemoryOutbox::append`](crate::InMemoryOutbox::append)).
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claims up to `limit` pending events for `worker` for `lease`.
    ///
    /// Only rows with `published_at IS NULL` and no live claim are eligible.
    /// Claimed rows are invisible to other workers until the lease lapses,
    /// so concurrent relays never receive the same row at the same time.
    /// Events are returned in ascending id order.
    async fn claim_pending(
        &self,
        worker: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>>;

    /// Marks an event published. Call only after a broker acknowledgment.
    ///
    /// Returns `false` when the event was already marked, which leaves the
    /// original `published_at` untouched.
    async fn mark_published(&self, id: OutboxId) -> Result<bool>;

    /// Gives up `worker`'s claim on the given unpublished events so they can
    /// be picked up again without waiting for the lease to lapse.
    async fn release(&self, worker: &str, ids: &[OutboxId]) -> Result<()>;

    /// Loads a single event.
    async fn get(&self, id: OutboxId) -> Result<Option<OutboxEvent>>;

    /// Number of events not yet published.
    async fn pending_count(&self) -> Result<u64>;
}
