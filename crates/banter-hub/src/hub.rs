//! The hub: public API, lock choreography, flush engine and lifecycle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde_json::Value;
use tokio::{
    sync::{Mutex, MutexGuard, RwLock, mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    buffer::MessageBuffer,
    config::{
        DEFAULT_FLUSH_DELAY, DEFAULT_FLUSH_ITEMS, DEFAULT_FLUSH_THRESHOLD, DEFAULT_MESSAGE_COUNT,
        DEFAULT_SENDERS, TASK_QUEUE_LEN,
    },
    conn::Conn,
    dispatch::{self, Delivery, Target, Task},
    entry::{ConnId, MessageEntry, MessageId, RoomId, UserId},
    error::HubError,
    state::{ConnTable, RoomTable},
    store::MessageStore,
};

/// Flush tunables and timer state, guarded by the flush lock (lock 1).
struct FlushControl {
    /// Period of the timer-driven flush. Zero disables the timer.
    delay: Duration,
    /// Slice size handed to the store per `save` call.
    items: usize,
    /// Buffer length above which an append flushes inline.
    threshold: usize,
    /// Generation tag of the armed timer. Every flush bumps it, so a
    /// timer that fires after being superseded expires silently.
    timer_generation: u64,
}

/// One-way lifecycle: `Idle -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Lifecycle state, guarded by its own mutex. That mutex sits outside
/// and before the four numbered locks: it may be taken before lock 1 but
/// never while any numbered lock is held.
struct Lifecycle {
    state: State,
    /// Master sender of the bounded task queue. Dropping it closes the
    /// queue; the dispatcher drains what is left and exits.
    task_tx: Option<mpsc::Sender<Task>>,
    dispatcher: Option<JoinHandle<()>>,
    /// Fired exactly once, when drain completes.
    drain_done: Option<oneshot::Sender<()>>,
    /// Awaited by `stop` until drain completes.
    stopped: Option<oneshot::Receiver<()>>,
}

pub(crate) struct HubInner<S> {
    store: S,
    /// Lock 1: flush exclusion, flush tunables, timer state.
    flush: Mutex<FlushControl>,
    /// Lock 2: the unflushed message tail.
    buffer: RwLock<MessageBuffer>,
    /// Lock 3: connection indices.
    pub(crate) conns: RwLock<ConnTable>,
    /// Lock 4: room map, membership, per-room counters.
    pub(crate) rooms: RwLock<RoomTable>,
    lifecycle: Mutex<Lifecycle>,
    /// Mirrors `lifecycle.state == Running` for lock-free read checks.
    running: AtomicBool,
    /// Worker pool size; read once at start.
    senders: AtomicUsize,
}

/// The in-memory coordination engine.
///
/// Cheap to clone; every clone shares the same engine. Create one with
/// [`Hub::new`], call [`Hub::start`], register connections, and publish.
/// The lifecycle is one-way: a stopped hub stays stopped.
pub struct Hub<S: MessageStore> {
    inner: Arc<HubInner<S>>,
}

impl<S: MessageStore> Clone for Hub<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S: MessageStore> Hub<S> {
    /// Create an idle hub over a message store.
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                flush: Mutex::new(FlushControl {
                    delay: DEFAULT_FLUSH_DELAY,
                    items: DEFAULT_FLUSH_ITEMS,
                    threshold: DEFAULT_FLUSH_THRESHOLD,
                    timer_generation: 0,
                }),
                buffer: RwLock::new(MessageBuffer::new()),
                conns: RwLock::new(ConnTable::new()),
                rooms: RwLock::new(RoomTable::new()),
                lifecycle: Mutex::new(Lifecycle {
                    state: State::Idle,
                    task_tx: None,
                    dispatcher: None,
                    drain_done: None,
                    stopped: None,
                }),
                running: AtomicBool::new(false),
                senders: AtomicUsize::new(DEFAULT_SENDERS),
            }),
        }
    }

    fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Clone of the task queue sender, or `Stopped` when not running.
    async fn task_sender(&self) -> Result<mpsc::Sender<Task>, HubError> {
        let lifecycle = self.inner.lifecycle.lock().await;
        match (&lifecycle.state, &lifecycle.task_tx) {
            (State::Running, Some(tx)) => Ok(tx.clone()),
            _ => Err(HubError::Stopped),
        }
    }

    async fn publish(&self, target: Target, delivery: Delivery) -> Result<(), HubError> {
        let task_tx = self.task_sender().await?;
        if task_tx.send(Task { target, delivery }).await.is_err() {
            tracing::debug!("task queue closed during publish; hub is stopping");
        }
        Ok(())
    }

    // ---- lifecycle ------------------------------------------------------

    /// Launch the dispatcher and, if enabled, the flush timer.
    ///
    /// Idempotent while running; a no-op once the hub has been stopped
    /// (the lifecycle is one-way).
    pub async fn start(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            match lifecycle.state {
                State::Idle => {},
                State::Running => return,
                State::Stopping | State::Stopped => {
                    tracing::debug!("start ignored: hub already shut down");
                    return;
                },
            }

            let (task_tx, task_rx) = mpsc::channel(TASK_QUEUE_LEN);
            let (drain_tx, drain_rx) = oneshot::channel();
            let senders = self.inner.senders.load(Ordering::SeqCst);

            lifecycle.dispatcher =
                Some(tokio::spawn(dispatch::run(Arc::clone(&self.inner), task_rx, senders)));
            lifecycle.task_tx = Some(task_tx);
            lifecycle.drain_done = Some(drain_tx);
            lifecycle.stopped = Some(drain_rx);
            lifecycle.state = State::Running;
            self.inner.running.store(true, Ordering::SeqCst);

            tracing::debug!(senders, "hub started");
        }

        let mut control = self.inner.flush.lock().await;
        if !control.delay.is_zero() {
            self.schedule_timer(&mut control);
        }
    }

    /// Shut the hub down.
    ///
    /// Closes the task queue (the dispatcher drains it and the workers
    /// exit), then blocks until every outstanding connection has
    /// disconnected and the final flush has run. Idempotent when not
    /// running.
    pub async fn stop(&self) {
        let (stopped, dispatcher) = {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            if lifecycle.state != State::Running {
                return;
            }

            lifecycle.state = State::Stopping;
            self.inner.running.store(false, Ordering::SeqCst);
            lifecycle.task_tx = None;
            (lifecycle.stopped.take(), lifecycle.dispatcher.take())
        };

        let remaining = self.inner.conns.read().await.len();
        if remaining == 0 {
            self.drain().await;
        } else {
            tracing::debug!(remaining, "stop waiting for connections to disconnect");
        }

        if let Some(stopped) = stopped {
            let _ = stopped.await;
        }
        if let Some(dispatcher) = dispatcher {
            let _ = dispatcher.await;
        }

        tracing::debug!("hub stopped");
    }

    /// Final teardown: cancel the flush timer, flush once, signal `stop`.
    /// Runs exactly once, from `stop` (no connections left) or from the
    /// last `disconnect` after `stop` began.
    async fn drain(&self) {
        let Some(done) = self.inner.lifecycle.lock().await.drain_done.take() else {
            return;
        };

        {
            let mut control = self.inner.flush.lock().await;
            control.timer_generation = control.timer_generation.wrapping_add(1);
            let mut buffer = self.inner.buffer.write().await;
            self.flush_buffer(&mut control, &mut buffer);
        }

        self.inner.lifecycle.lock().await.state = State::Stopped;
        let _ = done.send(());
    }

    // ---- tunables -------------------------------------------------------

    /// Set the worker pool size. Takes effect at [`Hub::start`].
    pub fn set_senders(&self, count: usize) {
        self.inner.senders.store(count.max(1), Ordering::SeqCst);
    }

    /// Set the timer flush period. Zero disables the timer; enabling it
    /// while running arms a fresh timer.
    pub async fn set_flush_delay(&self, delay: Duration) {
        let mut control = self.inner.flush.lock().await;
        let was_disabled = control.delay.is_zero();
        control.delay = delay;

        if delay.is_zero() {
            // Expire whatever timer is armed.
            control.timer_generation = control.timer_generation.wrapping_add(1);
        } else if was_disabled && self.running() {
            self.schedule_timer(&mut control);
        }
    }

    /// Set the slice size handed to the store per `save` call.
    pub async fn set_flush_items(&self, count: usize) {
        self.inner.flush.lock().await.items = count;
    }

    /// Set the buffer length above which an append flushes inline.
    pub async fn set_flush_threshold(&self, count: usize) {
        self.inner.flush.lock().await.threshold = count;
    }

    // ---- flush engine ---------------------------------------------------

    /// Timer callback: flush unless this timer was superseded.
    async fn timer_flush(&self, generation: u64) {
        let control = self.inner.flush.lock().await;
        if control.timer_generation != generation {
            return;
        }
        self.flush_locked(control).await;
    }

    async fn flush_locked(&self, mut control: MutexGuard<'_, FlushControl>) {
        {
            let mut buffer = self.inner.buffer.write().await;
            self.flush_buffer(&mut control, &mut buffer);
        }
        self.schedule_timer(&mut control);
    }

    /// Flush core, called with locks 1 and 2 held. Hands the buffer to the
    /// store in `items`-sized slices; on error the unsaved tail is
    /// retained. A backlog still above the threshold after a flush attempt
    /// is unrecoverable and escalates fatally.
    fn flush_buffer(&self, control: &mut FlushControl, buffer: &mut MessageBuffer) {
        if control.items == 0 || buffer.is_empty() {
            return;
        }

        if let Err(e) = buffer.flush_to(&self.inner.store, control.items) {
            tracing::error!(
                error = %e,
                retained = buffer.len(),
                "message store save failed; retaining unsaved entries"
            );
        }

        if control.threshold > 0 && buffer.len() > control.threshold {
            tracing::error!(
                buffered = buffer.len(),
                threshold = control.threshold,
                "unflushed backlog exceeds threshold after flush; aborting"
            );
            std::process::abort();
        }
    }

    /// Arm the flush timer for one period, superseding any armed timer.
    /// No-op when the timer is disabled or the hub is not running.
    fn schedule_timer(&self, control: &mut FlushControl) {
        control.timer_generation = control.timer_generation.wrapping_add(1);
        if control.delay.is_zero() || !self.running() {
            return;
        }

        let generation = control.timer_generation;
        let delay = control.delay;
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Hub { inner }.timer_flush(generation).await;
            }
        });
    }

    // ---- connections ----------------------------------------------------

    /// Register a connection. Fails while not running and on duplicate
    /// ids.
    pub async fn connect(&self, conn: Arc<dyn Conn>) -> Result<(), HubError> {
        if !self.running() {
            return Err(HubError::Stopped);
        }

        let conn_id = conn.id();
        let user_id = conn.user_id();

        let mut conns = self.inner.conns.write().await;
        if !conns.insert(conn_id, user_id, conn) {
            return Err(HubError::DuplicateConnection(conn_id));
        }

        tracing::debug!(conn_id, user_id, "connection registered");
        Ok(())
    }

    /// Remove a connection from both indices. Unknown ids are ignored.
    ///
    /// Dropping the hub's reference here is what makes pending parcels
    /// for this connection fail their weak upgrade. When the hub is
    /// stopping and this was the last connection, drain runs.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let (removed, empty) = {
            let mut conns = self.inner.conns.write().await;
            let removed = conns.remove(conn_id).is_some();
            (removed, conns.is_empty())
        };

        if !removed {
            return;
        }

        tracing::debug!(conn_id, "connection removed");

        if empty && !self.running() {
            self.drain().await;
        }
    }

    /// Whether a connection id is registered.
    pub async fn is_connected(&self, conn_id: ConnId) -> bool {
        self.inner.conns.read().await.contains(conn_id)
    }

    /// The registered capability for a connection id, if any.
    pub async fn connection(&self, conn_id: ConnId) -> Option<Arc<dyn Conn>> {
        self.inner.conns.read().await.get(conn_id).cloned()
    }

    // ---- rooms ----------------------------------------------------------

    /// Create a room with an initial message counter (supports resuming
    /// from a stored high-water mark) and member set. No-op if the room
    /// exists.
    pub async fn new_room(&self, room_id: RoomId, last_message_id: MessageId, user_ids: &[UserId]) {
        let created = self.inner.rooms.write().await.create(room_id, last_message_id, user_ids);
        if created {
            tracing::debug!(room_id, last_message_id, members = user_ids.len(), "room created");
        }
    }

    /// Remove a room entry. Messages are not touched.
    pub async fn delete_room(&self, room_id: RoomId) {
        if self.inner.rooms.write().await.delete(room_id) {
            tracing::debug!(room_id, "room deleted");
        }
    }

    /// Add a user to a room. Idempotent on re-enter.
    pub async fn enter_room(&self, user_id: UserId, room_id: RoomId) -> Result<(), HubError> {
        if self.inner.rooms.write().await.enter(user_id, room_id) {
            Ok(())
        } else {
            Err(HubError::UnknownRoom(room_id))
        }
    }

    /// Remove a user from a room. No-op if the room or membership is
    /// absent.
    pub async fn leave_room(&self, user_id: UserId, room_id: RoomId) {
        self.inner.rooms.write().await.leave(user_id, room_id);
    }

    // ---- messages -------------------------------------------------------

    /// Accept a message into a room and fan it out to the room's members.
    ///
    /// `conn_id == 0` posts a system message (`user_id == 0`); any other
    /// id must be registered. Returns the assigned message id.
    ///
    /// The append, the id assignment and the publication happen under the
    /// buffer lock, which serializes concurrent posters: ids are gapless
    /// per room and the fan-out task for message N is enqueued before the
    /// task for N+1. If the buffer exceeds the flush threshold afterwards,
    /// a flush runs inline before returning.
    pub async fn new_message(
        &self,
        conn_id: ConnId,
        room_id: RoomId,
        data: Value,
    ) -> Result<MessageId, HubError> {
        let task_tx = self.task_sender().await?;

        let mut control = self.inner.flush.lock().await;
        let mut buffer = self.inner.buffer.write().await;

        let entry = {
            let conns = self.inner.conns.read().await;
            let rooms = self.inner.rooms.read().await;

            let user_id = if conn_id == 0 {
                0
            } else {
                conns.user_of(conn_id).ok_or(HubError::UnknownConnection(conn_id))?
            };

            let room = rooms.get(room_id).ok_or(HubError::UnknownRoom(room_id))?;

            MessageEntry {
                room_id,
                message_id: room.next_message_id(),
                user_id,
                timestamp: unix_now(),
                data,
            }
        };

        let message_id = entry.message_id;
        buffer.push(entry.clone());

        let task =
            Task { target: Target::Room(room_id), delivery: Delivery::New(Arc::new(entry)) };
        if task_tx.send(task).await.is_err() {
            tracing::debug!(room_id, message_id, "task queue closed during publish");
        }

        if control.threshold > 0 && buffer.len() > control.threshold {
            self.flush_buffer(&mut control, &mut buffer);
            drop(buffer);
            self.schedule_timer(&mut control);
        }

        Ok(message_id)
    }

    /// Replace the payload of an accepted message and fan out the update.
    ///
    /// Tries the store first, then the unflushed buffer.
    pub async fn update_message(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        data: Value,
    ) -> Result<(), HubError> {
        let task_tx = self.task_sender().await?;
        let _flush = self.inner.flush.lock().await;

        if let Some(entry) = self.inner.store.update(room_id, message_id, data.clone())? {
            let task =
                Task { target: Target::Room(room_id), delivery: Delivery::Update(Arc::new(entry)) };
            if task_tx.send(task).await.is_err() {
                tracing::debug!(room_id, message_id, "task queue closed during publish");
            }
            return Ok(());
        }

        let mut buffer = self.inner.buffer.write().await;
        let Some(entry) = buffer.update(room_id, message_id, data) else {
            return Err(HubError::UnknownMessage { room_id, message_id });
        };

        let task =
            Task { target: Target::Room(room_id), delivery: Delivery::Update(Arc::new(entry)) };
        if task_tx.send(task).await.is_err() {
            tracing::debug!(room_id, message_id, "task queue closed during publish");
        }
        Ok(())
    }

    // ---- notices --------------------------------------------------------

    /// Deliver an opaque notice to one connection.
    pub async fn conn_notice(&self, conn_id: ConnId, data: Value) -> Result<(), HubError> {
        self.publish(Target::Conn(conn_id), Delivery::Notice(Arc::new(data))).await
    }

    /// Deliver an opaque notice to every connection of one user.
    pub async fn user_notice(&self, user_id: UserId, data: Value) -> Result<(), HubError> {
        self.publish(Target::User(user_id), Delivery::Notice(Arc::new(data))).await
    }

    /// Deliver an opaque notice to every connection of every member of a
    /// room.
    pub async fn room_notice(&self, room_id: RoomId, data: Value) -> Result<(), HubError> {
        self.publish(Target::Room(room_id), Delivery::Notice(Arc::new(data))).await
    }

    /// Deliver an opaque notice to every registered connection.
    pub async fn global_notice(&self, data: Value) -> Result<(), HubError> {
        self.publish(Target::Global, Delivery::Notice(Arc::new(data))).await
    }

    // ---- queries --------------------------------------------------------

    /// Read a forward range of a room's history on behalf of a member.
    ///
    /// `first_id < 0` is an offset from the end
    /// (`last_message_id + 1 + first_id`), clamped to start at 1.
    /// `count == 0` defaults to 10. Reads the store first and continues
    /// from the unflushed buffer when the store has not caught up yet.
    pub async fn messages(
        &self,
        user_id: UserId,
        room_id: RoomId,
        first_id: i64,
        count: usize,
    ) -> Result<Vec<MessageEntry>, HubError> {
        let count = if count == 0 { DEFAULT_MESSAGE_COUNT } else { count };

        let _flush = self.inner.flush.lock().await;
        let buffer = self.inner.buffer.read().await;
        let rooms = self.inner.rooms.read().await;

        let room = rooms.get(room_id).ok_or(HubError::UnknownRoom(room_id))?;
        if !room.is_member(user_id) {
            return Err(HubError::NotMember { user_id, room_id });
        }

        let last_message_id = room.last_message_id();
        let first_id = if first_id < 0 {
            first_id + last_message_id as i64 + 1
        } else {
            first_id
        };
        let first_id = first_id.max(1) as MessageId;

        let mut result = self.inner.store.list(room_id, first_id, count)?;

        if result.len() >= count {
            return Ok(result);
        }
        if result.last().is_some_and(|m| m.message_id >= last_message_id) {
            return Ok(result);
        }

        let resume_from = result.last().map_or(first_id, |m| m.message_id + 1);
        buffer.collect_range(room_id, resume_from, count, &mut result);

        Ok(result)
    }

    /// Rooms containing a user.
    pub async fn user_room_ids(&self, user_id: UserId) -> Vec<RoomId> {
        self.inner.rooms.read().await.rooms_with(user_id)
    }

    /// Whether a user is a member of a room. Unknown rooms are `false`.
    pub async fn is_in_room(&self, user_id: UserId, room_id: RoomId) -> bool {
        self.inner.rooms.read().await.get(room_id).is_some_and(|room| room.is_member(user_id))
    }

    /// Users with at least one live connection. Empty when not running.
    pub async fn online_user_ids(&self) -> Vec<UserId> {
        if !self.running() {
            return Vec::new();
        }
        self.inner.conns.read().await.online_user_ids()
    }

    /// Members of a room. Unknown rooms yield an empty list.
    pub async fn room_user_ids(&self, room_id: RoomId) -> Vec<UserId> {
        self.inner
            .rooms
            .read()
            .await
            .get(room_id)
            .map_or_else(Vec::new, |room| room.members().iter().copied().collect())
    }

    /// Connection ids of a user. Empty when not running or offline.
    pub async fn user_conn_ids(&self, user_id: UserId) -> Vec<ConnId> {
        if !self.running() {
            return Vec::new();
        }
        self.inner.conns.read().await.user_conn_ids(user_id).to_vec()
    }

    /// Whether a user has at least one live connection.
    pub async fn user_is_connected(&self, user_id: UserId) -> bool {
        self.running() && !self.inner.conns.read().await.user_conn_ids(user_id).is_empty()
    }
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs() as i64)
}
