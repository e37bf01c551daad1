//! Fan-out dispatcher.
//!
//! Publishers push task descriptors onto a bounded queue; a single
//! consumer expands each task into per-connection parcels and feeds a
//! fixed pool of sender workers through unbounded per-worker queues. The
//! dispatcher waits for every parcel of a task to be delivered before it
//! reads the next task, so per-room delivery order matches publication
//! order at every recipient.
//!
//! Parcels hold weak connection references: a connection that disconnects
//! between expansion and delivery is dropped silently by the worker.

use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    conn::Conn,
    entry::{ConnId, MessageEntry, RoomId, UserId},
    hub::HubInner,
    state::ConnTable,
    store::MessageStore,
};

/// Scope of one published task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// One connection, if still present.
    Conn(ConnId),
    /// Every connection of one user.
    User(UserId),
    /// Every connection of every member of one room.
    Room(RoomId),
    /// Every registered connection.
    Global,
}

/// What a task delivers to each destination connection.
#[derive(Debug, Clone)]
pub(crate) enum Delivery {
    /// A newly published message.
    New(Arc<MessageEntry>),
    /// An in-place update to an earlier message.
    Update(Arc<MessageEntry>),
    /// An opaque notice.
    Notice(Arc<Value>),
}

/// A logical publication: a target scope plus a delivery.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) target: Target,
    pub(crate) delivery: Delivery,
}

/// A concrete delivery: one connection paired with one delivery, consumed
/// by a worker. Dropping the `done` sender releases the task barrier.
struct Parcel {
    conn: Weak<dyn Conn>,
    delivery: Delivery,
    done: mpsc::Sender<()>,
}

/// Dispatcher main loop: spawn the worker pool, then expand tasks until
/// the task queue closes; drain the workers afterwards.
pub(crate) async fn run<S: MessageStore>(
    hub: Arc<HubInner<S>>,
    mut tasks: mpsc::Receiver<Task>,
    senders: usize,
) {
    let senders = senders.max(1);
    let mut parcel_txs = Vec::with_capacity(senders);
    let mut workers = Vec::with_capacity(senders);

    for worker in 0..senders {
        let (tx, rx) = mpsc::unbounded_channel();
        parcel_txs.push(tx);
        workers.push(tokio::spawn(deliver(worker, rx)));
    }

    let mut round_robin = 0usize;

    while let Some(task) = tasks.recv().await {
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        expand(&hub, &task, &parcel_txs, &mut round_robin, &done_tx).await;

        // All per-parcel clones are dropped by the workers after delivery;
        // once the channel closes, every delivery of this task is done.
        drop(done_tx);
        let _ = done_rx.recv().await;
    }

    drop(parcel_txs);
    for worker in workers {
        let _ = worker.await;
    }

    tracing::debug!("dispatcher drained");
}

/// Expand a task into parcels under the connection (and, for room
/// targets, room) read locks. The locks are released before any delivery
/// runs; workers only ever see weak references.
async fn expand<S: MessageStore>(
    hub: &HubInner<S>,
    task: &Task,
    parcel_txs: &[mpsc::UnboundedSender<Parcel>],
    round_robin: &mut usize,
    done: &mpsc::Sender<()>,
) {
    let conns = hub.conns.read().await;

    match task.target {
        Target::Conn(conn_id) => {
            queue_parcel(&conns, conn_id, task, parcel_txs, round_robin, done);
        },
        Target::User(user_id) => {
            for &conn_id in conns.user_conn_ids(user_id) {
                queue_parcel(&conns, conn_id, task, parcel_txs, round_robin, done);
            }
        },
        Target::Global => {
            let conn_ids: Vec<ConnId> = conns.conn_ids().collect();
            for conn_id in conn_ids {
                queue_parcel(&conns, conn_id, task, parcel_txs, round_robin, done);
            }
        },
        Target::Room(room_id) => {
            let rooms = hub.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                for &user_id in room.members() {
                    for &conn_id in conns.user_conn_ids(user_id) {
                        queue_parcel(&conns, conn_id, task, parcel_txs, round_robin, done);
                    }
                }
            }
        },
    }
}

fn queue_parcel(
    conns: &ConnTable,
    conn_id: ConnId,
    task: &Task,
    parcel_txs: &[mpsc::UnboundedSender<Parcel>],
    round_robin: &mut usize,
    done: &mpsc::Sender<()>,
) {
    let Some(conn) = conns.get(conn_id) else {
        return;
    };

    let parcel = Parcel {
        conn: Arc::downgrade(conn),
        delivery: task.delivery.clone(),
        done: done.clone(),
    };

    let at = *round_robin % parcel_txs.len();
    *round_robin = round_robin.wrapping_add(1);

    if parcel_txs[at].send(parcel).is_err() {
        tracing::warn!(conn_id, "parcel queue closed during fan-out");
    }
}

/// Worker loop: deliver parcels until the queue closes. A connection that
/// fails to upgrade has disconnected and is skipped; a panicking callback
/// is absorbed so the pool keeps running.
async fn deliver(worker: usize, mut parcels: mpsc::UnboundedReceiver<Parcel>) {
    while let Some(parcel) = parcels.recv().await {
        let Some(conn) = parcel.conn.upgrade() else {
            continue;
        };

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            match &parcel.delivery {
                Delivery::New(entry) => conn.new_message(entry),
                Delivery::Update(entry) => conn.update_message(entry),
                Delivery::Notice(data) => conn.notice(data),
            }
        }));

        if outcome.is_err() {
            tracing::warn!(worker, "delivery callback panicked");
        }

        // `parcel.done` drops here, releasing one barrier slot.
        drop(parcel.done);
    }
}
