//! Concurrency tests for per-player exclusion and session displacement
//!
//! These drive the world directly from many tasks on a multi-threaded runtime
//! and check that no interleaving loses a write or leaves two sessions behind.

use server::config::ServerConfig;
use server::game::World;
use server::gateway::{InMemoryPlayerStore, PlayerGateway, PlayerPatch};
use server::map::MAP_FILE_LEN;
use server::movement::{apply_move, MoveResult};
use server::regen::{run_tick, Vital};
use server::session::{ConnectionHandle, Outbound};
use shared::ServerMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

fn test_world(name: &str) -> (World, Arc<InMemoryPlayerStore>) {
    let dir = std::env::temp_dir().join(format!("realm-ct-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("lev01"), vec![0u8; MAP_FILE_LEN]).unwrap();

    let config = ServerConfig {
        maps_dir: dir,
        ..ServerConfig::default()
    };
    let store = Arc::new(InMemoryPlayerStore::new());
    (World::new(config, store.clone()), store)
}

fn connect() -> (ConnectionHandle, UnboundedReceiver<Outbound>) {
    let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
    ConnectionHandle::new(addr)
}

fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

/// Moves and regeneration ticks racing on one player never lose a write
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn moves_racing_regeneration_lose_no_updates() {
    const MOVES: usize = 10;
    const TICKS: usize = 2;

    let (world, store) = test_world("race");
    let (conn, _rx) = connect();
    assert!(world.signup(&conn, "racer", "pw").await.unwrap());
    let id = store.get_by_username("racer").await.unwrap().unwrap().id;

    // Low enough that neither the floor nor the ceiling can be reached
    let start = PlayerPatch {
        stamina: Some(30),
        ..Default::default()
    };
    store.update_fields(id, &start).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..MOVES {
        let world = world.clone();
        let dx = if i % 2 == 0 { 1 } else { -1 };
        tasks.push(tokio::spawn(async move {
            let result = apply_move(&world, id, dx, 0).await.unwrap();
            assert!(matches!(result, MoveResult::Moved { .. }));
        }));
    }
    for _ in 0..TICKS {
        let world = world.clone();
        tasks.push(tokio::spawn(async move {
            let report = run_tick(&world, Vital::Stamina).await;
            assert!(report.failures.is_empty());
            assert_eq!(report.updated, 1);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let player = store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(player.stamina, 30 - MOVES as i32 + 10 * TICKS as i32);
    assert_eq!((player.pos_x, player.pos_y), (5, 5));
}

/// Many simultaneous logins for one account leave exactly one live session
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logins_leave_one_session() {
    const CONNECTIONS: usize = 8;

    let (world, _store) = test_world("logins");
    let (seed_conn, _seed_rx) = connect();
    world.signup(&seed_conn, "alice", "pw").await.unwrap();
    world.disconnect(seed_conn.id).await;

    let mut handles = Vec::new();
    let mut receivers = Vec::new();
    for _ in 0..CONNECTIONS {
        let (handle, rx) = connect();
        handles.push(handle);
        receivers.push(rx);
    }

    let tasks: Vec<_> = handles
        .iter()
        .cloned()
        .map(|handle| {
            let world = world.clone();
            tokio::spawn(async move { world.login(&handle, "alice", "pw").await.unwrap() })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap());
    }

    assert_eq!(world.registry.len().await, 1);
    let winner = world
        .registry
        .find_connection_by_username("alice")
        .await
        .expect("one session survives");

    let mut displaced = 0;
    for (handle, rx) in handles.iter().zip(receivers.iter_mut()) {
        let items = drain(rx);
        let was_displaced = items.iter().any(|item| {
            matches!(item, Outbound::Message(ServerMessage::Disconnected { .. }))
        });
        if was_displaced {
            displaced += 1;
            assert!(items.contains(&Outbound::Close));
            assert_ne!(handle.id, winner.id);
        } else {
            assert_eq!(handle.id, winner.id);
        }
    }
    assert_eq!(displaced, CONNECTIONS - 1);

    // Late cleanup from every displaced connection leaves the winner alone
    for handle in &handles {
        if handle.id != winner.id {
            world.disconnect(handle.id).await;
        }
    }
    assert_eq!(world.registry.len().await, 1);
}

/// Racing signups for the same name create exactly one account
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signups_create_one_account() {
    const CONNECTIONS: usize = 8;

    let (world, store) = test_world("signups");
    let tasks: Vec<_> = (0..CONNECTIONS)
        .map(|_| {
            let world = world.clone();
            tokio::spawn(async move {
                let (handle, _rx) = connect();
                world.signup(&handle, "bob", "pw").await.unwrap()
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        if task.await.unwrap() {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.len().await, 1);
}
