//! Shared fixtures for the hub test suites.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use banter_hub::{
    Conn, ConnId, MemoryStore, MessageEntry, MessageId, MessageStore, RoomId, StoreError, UserId,
};
use serde_json::Value;

/// One delivery observed by a test connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    New(MessageEntry),
    Update(MessageEntry),
    Notice(Value),
}

/// Clonable view of everything delivered to a test connection.
///
/// The log is held separately from the `Conn` so tests can drop their
/// strong reference to the connection (leaving the hub's as the only
/// one) and still inspect deliveries.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn new_messages(&self) -> Vec<MessageEntry> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::New(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<MessageEntry> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Update(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Notice(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    /// Message ids delivered for one room, in delivery order.
    pub fn room_message_ids(&self, room_id: RoomId) -> Vec<MessageId> {
        self.new_messages()
            .into_iter()
            .filter(|m| m.room_id == room_id)
            .map(|m| m.message_id)
            .collect()
    }

    /// Poll until `predicate` holds, panicking after five seconds.
    pub async fn wait_until<F>(&self, what: &str, predicate: F)
    where
        F: Fn(&EventLog) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !predicate(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}; saw {} events",
                self.len()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until at least `count` events were delivered.
    pub async fn wait_events(&self, count: usize) {
        self.wait_until("event count", |log| log.len() >= count).await;
    }
}

/// A `Conn` that records every delivery into an [`EventLog`].
pub struct RecordingConn {
    id: ConnId,
    user_id: UserId,
    log: EventLog,
}

impl RecordingConn {
    pub fn new(id: ConnId, user_id: UserId, log: EventLog) -> Arc<Self> {
        Arc::new(Self { id, user_id, log })
    }
}

impl Conn for RecordingConn {
    fn id(&self) -> ConnId {
        self.id
    }

    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn new_message(&self, entry: &MessageEntry) {
        self.log.push(Event::New(entry.clone()));
    }

    fn update_message(&self, entry: &MessageEntry) {
        self.log.push(Event::Update(entry.clone()));
    }

    fn notice(&self, data: &Value) {
        self.log.push(Event::Notice(data.clone()));
    }
}

/// A `MessageStore` that records the size of every `save` batch and can
/// be switched into a failing mode; everything else delegates to a
/// [`MemoryStore`].
#[derive(Clone, Default)]
pub struct BatchSpyStore {
    inner: MemoryStore,
    batches: Arc<Mutex<Vec<usize>>>,
    fail_saves: Arc<AtomicBool>,
}

impl BatchSpyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn saved_messages(&self) -> usize {
        self.batches().iter().sum()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }
}

impl MessageStore for BatchSpyStore {
    fn save(&self, batch: &[MessageEntry]) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected save failure".to_string()));
        }
        self.inner.save(batch)?;
        self.batches.lock().unwrap().push(batch.len());
        Ok(())
    }

    fn list(
        &self,
        room_id: RoomId,
        first_id: MessageId,
        count: usize,
    ) -> Result<Vec<MessageEntry>, StoreError> {
        self.inner.list(room_id, first_id, count)
    }

    fn update(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        data: Value,
    ) -> Result<Option<MessageEntry>, StoreError> {
        self.inner.update(room_id, message_id, data)
    }
}
