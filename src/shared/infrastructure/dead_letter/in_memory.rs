use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use super::{DeadLetterMessage, DeadLetterStatus, DeadLetterStore, DeadLetterStoreError};

pub struct InMemoryDeadLetterStore {
    rows: Mutex<Vec<DeadLetterMessage>>,
    next_id: AtomicI64,
    offline: AtomicBool,
}

impl Default for InMemoryDeadLetterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDeadLetterStore {
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

    fn ensure_online(&self) -> Result<(), DeadLetterStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DeadLetterStoreError::Backend(
                "dead letter store offline".into(),
            ));
        }
        Ok(())
    }

    pub fn message(&self, id: i64) -> Option<DeadLetterMessage> {
        self.rows
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|row| row.id == id)
            .cloned()
    }

    pub fn all(&self) -> Vec<DeadLetterMessage> {
        self.rows.lock().expect("lock poisoned").clone()
    }

    fn update<F>(&self, id: i64, apply: F) -> Result<(), DeadLetterStoreError>
    where
        F: FnOnce(&mut DeadLetterMessage),
    {
        self.ensure_online()?;

        let mut rows = self.rows.lock().expect("lock poisoned");
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(DeadLetterStoreError::NotFound(id))?;
        apply(row);
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn create(&self, mut message: DeadLetterMessage) -> Result<i64, DeadLetterStoreError> {
        self.ensure_online()?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        message.id = id;
        self.rows.lock().expect("lock poisoned").push(message);
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<DeadLetterMessage, DeadLetterStoreError> {
        self.ensure_online()?;
        self.message(id).ok_or(DeadLetterStoreError::NotFound(id))
    }

    async fn get_pending(
        &self,
        limit: i64,
    ) -> Result<Vec<DeadLetterMessage>, DeadLetterStoreError> {
        self.ensure_online()?;

        let mut pending: Vec<DeadLetterMessage> = self
            .rows
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|row| row.status == DeadLetterStatus::Pending)
            .cloned()
            .collect();

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn mark_retrying(&self, id: i64) -> Result<(), DeadLetterStoreError> {
        self.update(id, |row| {
            row.status = DeadLetterStatus::Retrying;
            row.retry_count += 1;
            row.last_retry_at = Some(Utc::now());
        })
    }

    async fn mark_resolved(&self, id: i64) -> Result<(), DeadLetterStoreError> {
        self.update(id, |row| {
            row.status = DeadLetterStatus::Resolved;
            row.resolved_at = Some(Utc::now());
        })
    }

    async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), DeadLetterStoreError> {
        self.update(id, |row| {
            row.status = DeadLetterStatus::Discarded;
            row.failure_reason = format!("{} | Discarded: {}", row.failure_reason, reason);
            row.resolved_at = Some(Utc::now());
        })
    }

    async fn reset_to_retry(&self, id: i64) -> Result<(), DeadLetterStoreError> {
        self.update(id, |row| {
            if row.status == DeadLetterStatus::Retrying {
                row.status = DeadLetterStatus::Pending;
            }
        })
    }
}
