//! Multi-threaded tests for per-stream locking and the command retry loop.
//!
//! Threads are lined up on a `Barrier` so the racing section starts at the
//! same moment on every thread.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, Utc};

use chronicle_es::world::{Player, PlayerCommand, PlayerEvent};
use chronicle_es::{
    AppendOutcome, CommandContext, CommandEngine, EventStore, ExecuteError, ExpectedVersion,
    InMemoryEventStore, NO_STREAM, StreamId, stream_id_for,
};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("timestamp in range")
}

fn created(name: &str, secs: i64) -> PlayerEvent {
    PlayerEvent::Created {
        name: name.into(),
        location: "tavern".into(),
        max_hp: 10,
        at: at(secs),
    }
}

fn moved(from: &str, to: &str, secs: i64) -> PlayerEvent {
    PlayerEvent::Moved {
        from: from.into(),
        to: to.into(),
        at: at(secs),
    }
}

/// The walkthrough from a fresh stream to a two-writer race.
#[test]
fn create_move_then_race_on_same_version() {
    let store = InMemoryEventStore::<PlayerEvent>::new();
    let id = StreamId::from("player-p1");
    assert_eq!(store.stream_version(&id), NO_STREAM);

    let outcome = store
        .append_to_stream(&id, ExpectedVersion::NoStream, vec![created("Ayla", 0)])
        .expect("append");
    assert!(outcome.is_success());
    assert_eq!(store.stream_version(&id), 0);

    let outcome = store
        .append_to_stream(&id, ExpectedVersion::Exact(0), vec![moved("tavern", "market", 1)])
        .expect("append");
    assert!(outcome.is_success());
    assert_eq!(store.stream_version(&id), 1);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["forest", "docks"]
        .into_iter()
        .enumerate()
        .map(|(i, dest)| {
            let store = store.clone();
            let id = id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let seen = store.stream_version(&id);
                barrier.wait();
                store
                    .append_to_stream(
                        &id,
                        ExpectedVersion::Exact(seen),
                        vec![moved("market", dest, 2 + i as i64)],
                    )
                    .expect("append")
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread panicked"))
        .collect();

    let winners = outcomes.iter().filter(|o| o.is_success()).count();
    assert_eq!(winners, 1, "exactly one writer must win: {outcomes:?}");
    let loser = outcomes
        .iter()
        .find(|o| !o.is_success())
        .expect("one writer must lose");
    assert_eq!(
        *loser,
        AppendOutcome::ConcurrentModification { actual_version: 2 }
    );
    assert_eq!(store.stream_version(&id), 2);

    // The loser resubmits against the version it was told about.
    let retry = store
        .append_to_stream(&id, ExpectedVersion::Exact(2), vec![moved("forest", "docks", 5)])
        .expect("append");
    assert!(retry.is_success());
    assert_eq!(store.stream_version(&id), 3);
}

#[test]
fn racing_exact_writers_never_duplicate_versions() {
    const WRITERS: usize = 8;
    const ROUNDS: usize = 50;

    let store = InMemoryEventStore::<PlayerEvent>::new();
    let id = StreamId::from("npc-innkeeper");
    store
        .append_to_stream(&id, ExpectedVersion::NoStream, vec![created("Bram", 0)])
        .expect("append");

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = store.clone();
            let id = id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut wins = 0usize;
                for round in 0..ROUNDS {
                    let seen = store.stream_version(&id);
                    let item = format!("coin-{w}-{round}");
                    let outcome = store
                        .append_to_stream(
                            &id,
                            ExpectedVersion::Exact(seen),
                            vec![PlayerEvent::ItemAcquired { item, at: at(1) }],
                        )
                        .expect("append");
                    if outcome.is_success() {
                        wins += 1;
                    }
                }
                wins
            })
        })
        .collect();

    let total_wins: usize = handles
        .into_iter()
        .map(|h| h.join().expect("writer thread panicked"))
        .sum();

    let facts = store.read_stream(&id);
    assert_eq!(facts.len(), total_wins + 1);
    for (expected, fact) in facts.iter().enumerate() {
        assert_eq!(fact.stream_version, expected as i64, "versions must be contiguous");
    }
}

#[test]
fn readers_never_observe_partial_batches() {
    const BATCH: usize = 5;
    const BATCHES: usize = 200;

    let store = InMemoryEventStore::<PlayerEvent>::new();
    let id = StreamId::from("location-market");

    let writer = {
        let store = store.clone();
        let id = id.clone();
        thread::spawn(move || {
            for b in 0..BATCHES {
                let events = (0..BATCH)
                    .map(|i| PlayerEvent::ItemAcquired {
                        item: format!("crate-{b}-{i}"),
                        at: at(b as i64),
                    })
                    .collect();
                store
                    .append_to_stream(&id, ExpectedVersion::Any, events)
                    .expect("append");
            }
        })
    };

    let reader = {
        let store = store.clone();
        let id = id.clone();
        thread::spawn(move || {
            loop {
                let len = store.read_stream(&id).len();
                assert_eq!(len % BATCH, 0, "observed a torn batch of length {len}");
                if len == BATCH * BATCHES {
                    break;
                }
            }
        })
    };

    writer.join().expect("writer thread panicked");
    reader.join().expect("reader thread panicked");
}

#[test]
fn distinct_streams_progress_independently() {
    const ENTITIES: usize = 6;
    const EVENTS: usize = 100;

    let store = InMemoryEventStore::<PlayerEvent>::new();
    let barrier = Arc::new(Barrier::new(ENTITIES));

    let handles: Vec<_> = (0..ENTITIES)
        .map(|n| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let id = StreamId::for_entity("npc", &n.to_string());
                barrier.wait();
                for i in 0..EVENTS {
                    let expected = ExpectedVersion::Exact(i as i64 - 1);
                    let outcome = store
                        .append_to_stream(
                            &id,
                            expected,
                            vec![PlayerEvent::Healed { amount: 1, at: at(i as i64) }],
                        )
                        .expect("append");
                    // Sole writer of its own stream: never conflicts.
                    assert!(outcome.is_success(), "unexpected conflict on {id}");
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("writer thread panicked");
    }

    assert_eq!(store.stream_ids().len(), ENTITIES);
    for n in 0..ENTITIES {
        let id = StreamId::for_entity("npc", &n.to_string());
        assert_eq!(store.stream_version(&id), EVENTS as i64 - 1);
    }
}

#[test]
fn engine_retries_resolve_contention_without_lost_updates() {
    const WORKERS: usize = 6;
    const PICKUPS: usize = 20;

    // Generous budget: every command must eventually land.
    let engine = Arc::new(
        CommandEngine::builder(InMemoryEventStore::<PlayerEvent>::new())
            .max_attempts(1_000)
            .build(),
    );
    let id = stream_id_for::<Player>("p1");
    engine
        .execute_aggregate::<Player>(
            &id,
            &PlayerCommand::Create {
                name: "Ayla".into(),
                location: "tavern".into(),
                max_hp: 10,
                at: at(0),
            },
            &CommandContext::default(),
        )
        .expect("create should succeed");

    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|w| {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ctx = CommandContext::default().with_actor(format!("worker-{w}"));
                barrier.wait();
                for i in 0..PICKUPS {
                    let cmd = PlayerCommand::PickUp {
                        item: format!("gem-{w}-{i}"),
                        at: at(1),
                    };
                    engine
                        .execute_aggregate::<Player>(&id, &cmd, &ctx)
                        .expect("pickup should commit");
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("worker thread panicked");
    }

    let snapshot = engine.state::<Player>(&id);
    assert_eq!(snapshot.state.inventory.len(), WORKERS * PICKUPS);
    assert_eq!(snapshot.stream_version, (WORKERS * PICKUPS) as i64);
}

#[test]
fn concurrent_damage_is_decided_against_fresh_state() {
    const ATTACKERS: usize = 4;

    let engine = Arc::new(
        CommandEngine::builder(InMemoryEventStore::<PlayerEvent>::new())
            .max_attempts(100)
            .build(),
    );
    let id = stream_id_for::<Player>("p2");
    engine
        .execute_aggregate::<Player>(
            &id,
            &PlayerCommand::Create {
                name: "Bram".into(),
                location: "arena".into(),
                max_hp: 6,
                at: at(0),
            },
            &CommandContext::default(),
        )
        .expect("create should succeed");

    // Each hit takes 3 hp; only two can land before the player is dead.
    let barrier = Arc::new(Barrier::new(ATTACKERS));
    let handles: Vec<_> = (0..ATTACKERS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.execute_aggregate::<Player>(
                    &id,
                    &PlayerCommand::TakeDamage { amount: 3, at: at(1) },
                    &CommandContext::default(),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("attacker thread panicked"))
        .collect();

    let landed = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(ExecuteError::Domain(_))))
        .count();
    assert_eq!(landed, 2);
    assert_eq!(rejected, ATTACKERS - 2);
    assert!(results.iter().all(|r| r.as_ref().err().is_none_or(|e| e.is_domain())));

    let player = engine.state::<Player>(&id).state;
    assert_eq!(player.hp, 0);
    assert!(!player.is_alive());
}
