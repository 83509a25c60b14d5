use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::{NewOutboxEvent, OutboxError, OutboxEvent, OutboxId, OutboxStore, Result};

#[derive(Debug, Default)]
struct OutboxState {
    events: Vec<OutboxEvent>,
    next_id: i64,
    unavailable: bool,
    fail_next_append: bool,
    fail_next_mark: bool,
}

impl OutboxState {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(OutboxError::Unavailable("outbox store is offline".to_string()));
        }
        Ok(())
    }
}

/// In-memory outbox for testing and single-process deployments.
///
/// A single mutex serialises every operation, which gives the same
/// exclusive-claim guarantee `FOR UPDATE SKIP LOCKED` gives in Postgres.
/// Fault switches let tests simulate outages and crashes between publish
/// and mark.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutbox {
    state: Arc<Mutex<OutboxState>>,
}

impl InMemoryOutbox {
    /// Creates a new empty in-memory outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns the stored row.
    ///
    /// Intended to be called by a write store while it holds its own
    /// transaction lock, never on its own.
    pub async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if state.fail_next_append {
            state.fail_next_append = false;
            return Err(OutboxError::Unavailable(
                "injected append failure".to_string(),
            ));
        }

        state.next_id += 1;
        let stored = OutboxEvent {
            id: OutboxId::new(state.next_id),
            topic: event.topic,
            payload: event.payload,
            created_at: Utc::now(),
            published_at: None,
            claimed_by: None,
            claimed_until: None,
            attempts: 0,
        };
        state.events.push(stored.clone());
        Ok(stored)
    }

    /// Returns every stored event in id order.
    pub async fn events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.events.clone()
    }

    /// Returns the total number of stored events.
    pub async fn event_count(&self) -> usize {
        self.state.lock().await.events.len()
    }

    /// Takes the store offline (or back online). Every operation fails
    /// with [`OutboxError::Unavailable`] while offline.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Makes the next append fail.
    pub async fn fail_next_append(&self) {
        self.state.lock().await.fail_next_append = true;
    }

    /// Makes the next `mark_published` fail, as if the relay died right
    /// after the broker acknowledged.
    pub async fn fail_next_mark(&self) {
        self.state.lock().await.fail_next_mark = true;
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn claim_pending(
        &self,
        worker: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        let now = Utc::now();
        let claimed_until = TimeDelta::from_std(lease)
            .ok()
            .and_then(|lease| now.checked_add_signed(lease))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        // Events are kept in id order, so the first eligible rows are the oldest.
        let claimed: Vec<OutboxEvent> = state
            .events
            .iter_mut()
            .filter(|e| e.is_pending() && !e.is_claimed_at(now))
            .take(limit)
            .map(|e| {
                e.claimed_by = Some(worker.to_string());
                e.claimed_until = Some(claimed_until);
                e.attempts += 1;
                e.clone()
            })
            .collect();

        Ok(claimed)
    }

    async fn mark_published(&self, id: OutboxId) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if state.fail_next_mark {
            state.fail_next_mark = false;
            return Err(OutboxError::Unavailable("injected mark failure".to_string()));
        }

        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(OutboxError::NotFound(id))?;

        if event.published_at.is_some() {
            return Ok(false);
        }

        event.published_at = Some(Utc::now());
        event.claimed_by = None;
        event.claimed_until = None;
        Ok(true)
    }

    async fn release(&self, worker: &str, ids: &[OutboxId]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;

        for event in state.events.iter_mut().filter(|e| {
            ids.contains(&e.id) && e.is_pending() && e.claimed_by.as_deref() == Some(worker)
        }) {
            event.claimed_by = None;
            event.claimed_until = None;
        }

        Ok(())
    }

    async fn get(&self, id: OutboxId) -> Result<Option<OutboxEvent>> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.events.iter().find(|e| e.id == id).cloned())
    }

    async fn pending_count(&self) -> Result<u64> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.events.iter().filter(|e| e.is_pending()).count() as u64)
    }
}
