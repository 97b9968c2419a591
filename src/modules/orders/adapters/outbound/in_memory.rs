// In-memory order store sharing an in-memory outbox, so the atomic co-write
// can be asserted end to end in tests: when the outbox rejects the event,
// the order mutation is not applied either.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::modules::orders::core::order::Order;
use crate::modules::orders::core::ports::{OrderStore, OrderStoreError};
use crate::shared::infrastructure::outbox::in_memory::InMemoryOutboxStore;
use crate::shared::infrastructure::outbox::OutboxMessage;

pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
    outbox: Arc<InMemoryOutboxStore>,
    offline: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new(outbox: Arc<InMemoryOutboxStore>) -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            outbox,
            offline: AtomicBool::new(false),
        }
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), OrderStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(OrderStoreError::Backend("order store offline".into()));
        }
        Ok(())
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, id: &str) -> Result<Order, OrderStoreError> {
        self.ensure_online()?;
        self.orders
            .lock()
            .expect("lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| OrderStoreError::NotFound(id.to_string()))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Order>, OrderStoreError> {
        self.ensure_online()?;

        let mut orders: Vec<Order> = self
            .orders
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(orders
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self) -> Result<i64, OrderStoreError> {
        self.ensure_online()?;
        Ok(self.orders.lock().expect("lock poisoned").len() as i64)
    }

    async fn create_with_event(
        &self,
        order: &Order,
        event: OutboxMessage,
    ) -> Result<i64, OrderStoreError> {
        self.ensure_online()?;

        let mut orders = self.orders.lock().expect("lock poisoned");
        let event_id = self.outbox.insert(event)?;
        orders.insert(order.id.clone(), order.clone());
        Ok(event_id)
    }

    async fn update_with_event(
        &self,
        order: &Order,
        event: OutboxMessage,
    ) -> Result<i64, OrderStoreError> {
        self.ensure_online()?;

        let mut orders = self.orders.lock().expect("lock poisoned");
        if !orders.contains_key(&order.id) {
            return Err(OrderStoreError::NotFound(order.id.clone()));
        }

        let event_id = self.outbox.insert(event)?;
        orders.insert(order.id.clone(), order.clone());
        Ok(event_id)
    }
}
