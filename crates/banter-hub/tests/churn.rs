//! Randomized concurrency churn: parallel posters across several rooms
//! with notices interleaved, asserting that every receiver sees every
//! room's sequence gapless and in order.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use banter_hub::{Hub, MemoryStore, RoomId};
use common::{EventLog, RecordingConn};
use rand::Rng;
use serde_json::json;

const USERS: u64 = 4;
const CONNS_PER_USER: u64 = 2;
const ROOMS: u64 = 3;
const EVENTS_PER_CONN: usize = 60;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_churn_keeps_rooms_gapless() {
    let hub = Hub::new(MemoryStore::new());
    hub.set_flush_threshold(10_000).await;
    hub.set_flush_delay(Duration::ZERO).await;
    hub.start().await;

    for room_id in 1..=ROOMS {
        let members: Vec<u64> = (1..=USERS).collect();
        hub.new_room(room_id, 0, &members).await;
    }

    let mut logs = Vec::new();
    let mut conn_ids = Vec::new();
    for user_id in 1..=USERS {
        for slot in 0..CONNS_PER_USER {
            let conn_id = user_id * 10 + slot;
            let log = EventLog::default();
            hub.connect(RecordingConn::new(conn_id, user_id, log.clone())).await.unwrap();
            logs.push(log);
            conn_ids.push(conn_id);
        }
    }

    // Scripts are drawn up front so the worker tasks stay Send; the
    // interleaving across tasks is still scheduler-driven.
    let mut rng = rand::thread_rng();
    let scripts: Vec<Vec<ChurnOp>> = conn_ids
        .iter()
        .map(|&conn_id| {
            (0..EVENTS_PER_CONN)
                .map(|i| {
                    if rng.gen_range(0..10) == 0 {
                        ChurnOp::Notice { conn_id }
                    } else {
                        ChurnOp::Post {
                            conn_id,
                            room_id: rng.gen_range(1..=ROOMS),
                            tag: i,
                        }
                    }
                })
                .collect()
        })
        .collect();

    let mut tasks = Vec::new();
    for script in scripts {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let mut posted = vec![0usize; ROOMS as usize + 1];
            for op in script {
                match op {
                    ChurnOp::Post { conn_id, room_id, tag } => {
                        hub.new_message(conn_id, room_id, json!({"from": conn_id, "tag": tag}))
                            .await
                            .unwrap();
                        posted[room_id as usize] += 1;
                    },
                    ChurnOp::Notice { conn_id } => {
                        hub.user_notice(conn_id / 10, json!({"ping": conn_id})).await.unwrap();
                    },
                }
            }
            posted
        }));
    }

    let mut posted_per_room = vec![0usize; ROOMS as usize + 1];
    for task in tasks {
        let posted = task.await.unwrap();
        for (room, count) in posted.iter().enumerate() {
            posted_per_room[room] += count;
        }
    }

    // Everyone is a member of every room, so every connection must see
    // the full sequence of every room.
    for log in &logs {
        for room_id in 1..=ROOMS {
            let expected: Vec<u64> = (1..=posted_per_room[room_id as usize] as u64).collect();
            log.wait_until("full room history", |log| {
                log.room_message_ids(room_id).len() >= expected.len()
            })
            .await;
            assert_eq!(log.room_message_ids(room_id), expected, "room {room_id} sequence");
        }
    }

    for &conn_id in &conn_ids {
        hub.disconnect(conn_id).await;
    }
    hub.stop().await;

    // The hub-side counters agree with what was accepted.
    for room_id in 1..=ROOMS as RoomId {
        assert_eq!(
            hub.room_user_ids(room_id).await.len(),
            USERS as usize,
            "membership was static"
        );
    }
}

enum ChurnOp {
    Post { conn_id: u64, room_id: RoomId, tag: usize },
    Notice { conn_id: u64 },
}
