// In-memory outbox used by tests and local development. Mirrors the
// relational adapter closely enough that the dispatcher cannot tell them
// apart, and offers the same fault injection hooks as the other in-memory
// stores.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use super::{OutboxMessage, OutboxStatus, OutboxStore, OutboxStoreError};

pub struct InMemoryOutboxStore {
    rows: Mutex<Vec<OutboxMessage>>,
    next_id: AtomicI64,
    offline: AtomicBool,
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), OutboxStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(OutboxStoreError::Backend("outbox store offline".into()));
        }
        Ok(())
    }

    /// Direct insert, the in-memory stand-in for `create_in_tx`. Assigns the
    /// id and requires a pending row.
    pub fn insert(&self, mut message: OutboxMessage) -> Result<i64, OutboxStoreError> {
        self.ensure_online()?;

        if message.status != OutboxStatus::Pending {
            return Err(OutboxStoreError::InvalidState(format!(
                "outbox rows must be inserted as pending, got {}",
                message.status.as_str()
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        message.id = id;
        self.rows.lock().expect("lock poisoned").push(message);
        Ok(id)
    }

    pub fn message(&self, id: i64) -> Option<OutboxMessage> {
        self.rows
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|row| row.id == id)
            .cloned()
    }

    pub fn all(&self) -> Vec<OutboxMessage> {
        self.rows.lock().expect("lock poisoned").clone()
    }

    fn update<F>(&self, id: i64, apply: F) -> Result<(), OutboxStoreError>
    where
        F: FnOnce(&mut OutboxMessage),
    {
        self.ensure_online()?;

        let mut rows = self.rows.lock().expect("lock poisoned");
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(OutboxStoreError::NotFound(id))?;
        apply(row);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn get_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, OutboxStoreError> {
        self.ensure_online()?;

        let mut pending: Vec<OutboxMessage> = self
            .rows
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending)
            .cloned()
            .collect();

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn mark_processing(&self, id: i64) -> Result<(), OutboxStoreError> {
        self.update(id, |row| {
            row.status = OutboxStatus::Processing;
            row.processing_attempts += 1;
        })
    }

    async fn mark_completed(&self, id: i64) -> Result<(), OutboxStoreError> {
        self.update(id, |row| {
            row.status = OutboxStatus::Completed;
            row.processed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), OutboxStoreError> {
        self.update(id, |row| {
            row.status = OutboxStatus::Failed;
            row.last_error = Some(error_message.to_string());
        })
    }
}
