//! End-to-end tests over the example player domain: commands through the
//! engine, time-travel queries, and the domain / infrastructure error split.

use chrono::{DateTime, Utc};

use chronicle_es::world::{Player, PlayerCommand, PlayerError, PlayerEvent};
use chronicle_es::{
    CommandContext, CommandEngine, EventStore, ExecuteError, ExpectedVersion, InMemoryEventStore,
    NO_STREAM, StreamId, load_aggregate_at, project, reducer, stream_id_for,
};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("timestamp in range")
}

fn ctx() -> CommandContext {
    CommandContext::default().with_actor("test")
}

fn engine_with_player(id: &StreamId) -> CommandEngine<InMemoryEventStore<PlayerEvent>> {
    let engine = CommandEngine::new(InMemoryEventStore::<PlayerEvent>::new());
    engine
        .execute_aggregate::<Player>(
            id,
            &PlayerCommand::Create {
                name: "Ayla".into(),
                location: "tavern".into(),
                max_hp: 10,
                at: at(0),
            },
            &ctx(),
        )
        .expect("create player");
    engine
}

/// Full journey: create, move, fight, loot; then ask where the player was.
#[test]
fn journey_and_time_travel() {
    let id = stream_id_for::<Player>("p1");
    let engine = engine_with_player(&id);

    let steps = [
        PlayerCommand::Move {
            to: "market".into(),
            at: at(10),
        },
        PlayerCommand::PickUp {
            item: "lantern".into(),
            at: at(20),
        },
        PlayerCommand::Move {
            to: "crypt".into(),
            at: at(30),
        },
        PlayerCommand::TakeDamage {
            amount: 4,
            at: at(40),
        },
    ];
    for cmd in &steps {
        engine
            .execute_aggregate::<Player>(&id, cmd, &ctx())
            .expect("command should commit");
    }

    let now = engine.state::<Player>(&id);
    assert_eq!(now.stream_version, 4);
    assert_eq!(now.state.location, "crypt");
    assert_eq!(now.state.hp, 6);
    assert_eq!(now.state.inventory, vec!["lantern"]);

    let at_25 = engine.state_at::<Player>(&id, at(25));
    assert_eq!(at_25.state.location, "market");
    assert_eq!(at_25.state.hp, 10);
    assert_eq!(at_25.stream_version, 2);

    let before_creation = load_aggregate_at::<Player, _>(engine.store(), &id, at(-1));
    assert_eq!(before_creation.state, Player::default());
    assert_eq!(before_creation.stream_version, NO_STREAM);
}

#[test]
fn domain_failure_leaves_stream_untouched() {
    let id = stream_id_for::<Player>("p1");
    let engine = engine_with_player(&id);
    let before = engine.store().read_stream(&id);

    let err = engine
        .execute_aggregate::<Player>(
            &id,
            &PlayerCommand::Move {
                to: "tavern".into(),
                at: at(5),
            },
            &ctx(),
        )
        .expect_err("moving in place must be rejected");

    assert!(err.is_domain());
    assert!(!err.is_infrastructure());
    assert_eq!(
        err.into_domain(),
        Some(PlayerError::AlreadyThere("tavern".into()))
    );
    assert_eq!(engine.store().read_stream(&id), before);
}

#[test]
fn commands_against_missing_player_are_rejected() {
    let engine = CommandEngine::new(InMemoryEventStore::<PlayerEvent>::new());
    let id = stream_id_for::<Player>("ghost");

    let result = engine.execute_aggregate::<Player>(
        &id,
        &PlayerCommand::Heal {
            amount: 2,
            at: at(0),
        },
        &ctx(),
    );
    assert!(matches!(result, Err(ExecuteError::Domain(PlayerError::NotFound))));
    assert_eq!(engine.store().stream_version(&id), NO_STREAM);
}

#[test]
fn facts_carry_command_context() {
    let id = stream_id_for::<Player>("p1");
    let engine = engine_with_player(&id);
    let ctx = CommandContext::default()
        .with_actor("gm")
        .with_correlation_id("session-7")
        .with_metadata(serde_json::json!({"reason": "trap"}));

    let committed = engine
        .execute_aggregate::<Player>(
            &id,
            &PlayerCommand::TakeDamage {
                amount: 2,
                at: at(3),
            },
            &ctx,
        )
        .expect("damage should commit");

    let fact = &committed.facts[0];
    assert_eq!(fact.stream_id, id);
    assert_eq!(fact.stream_version, 1);
    assert_eq!(fact.occurred_at, at(3));
    assert_eq!(fact.metadata.actor.as_deref(), Some("gm"));
    assert_eq!(fact.metadata.correlation_id.as_deref(), Some("session-7"));
    assert_eq!(
        fact.metadata.extra,
        Some(serde_json::json!({"reason": "trap"}))
    );
}

#[test]
fn store_facts_serialize_for_collaborators() {
    let id = stream_id_for::<Player>("p1");
    let engine = engine_with_player(&id);
    let facts = engine.store().read_stream(&id);

    let json = serde_json::to_value(&facts[0]).expect("serialize fact");
    assert_eq!(json["stream_id"], "player-p1");
    assert_eq!(json["stream_version"], 0);
    assert_eq!(json["event"]["type"], "Created");
    assert_eq!(json["metadata"]["actor"], "test");
}

#[test]
fn projection_over_manual_appends_matches_engine_state() {
    let store = InMemoryEventStore::<PlayerEvent>::new();
    let id = StreamId::from("player-p3");
    store
        .append_to_stream(
            &id,
            ExpectedVersion::NoStream,
            vec![
                PlayerEvent::Created {
                    name: "Cato".into(),
                    location: "docks".into(),
                    max_hp: 8,
                    at: at(0),
                },
                PlayerEvent::Damaged {
                    amount: 5,
                    at: at(1),
                },
                PlayerEvent::Healed {
                    amount: 2,
                    at: at(2),
                },
            ],
        )
        .expect("append");

    let facts = store.read_stream(&id);
    let folded = project(Player::default(), &facts, reducer::<Player>());
    let engine = CommandEngine::new(store);
    assert_eq!(engine.state::<Player>(&id).state, folded);
    assert_eq!(folded.hp, 5);
}

#[test]
fn precondition_parsed_from_text_guards_appends() {
    let store = InMemoryEventStore::<PlayerEvent>::new();
    let id = StreamId::from("player-p4");
    let guard: ExpectedVersion = "no-stream".parse().expect("parse");
    store
        .append_to_stream(
            &id,
            guard,
            vec![PlayerEvent::ItemAcquired {
                item: "map".into(),
                at: at(0),
            }],
        )
        .expect("append");

    let stale: ExpectedVersion = "exact:-1".parse().expect("parse");
    let outcome = store
        .append_to_stream(
            &id,
            stale,
            vec![PlayerEvent::ItemAcquired {
                item: "torch".into(),
                at: at(1),
            }],
        )
        .expect("append");
    assert!(!outcome.is_success());
    assert!("sometimes".parse::<ExpectedVersion>().is_err());
}
