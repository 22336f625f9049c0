//! A crowded tavern: several patrons race commands at the same entities,
//! then the history is replayed to answer "what was true back then?".
//!
//! Run with: `RUST_LOG=chronicle_es=debug cargo run --example tavern`

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, Duration, Utc};
use chronicle_es::world::{Player, PlayerCommand, PlayerEvent};
use chronicle_es::{
    CommandContext, CommandEngine, DomainEvent, EventStore, InMemoryEventStore, StreamId,
    project_stream, project_stream_until, stream_id_for,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const PATRONS: usize = 4;

// ---------------------------------------------------------------------------
// Keg: a location-side entity driven through the closure API
// ---------------------------------------------------------------------------

/// Mugs of ale left in the tavern's keg.
#[derive(Debug, Clone, Copy, Default)]
struct Keg {
    mugs: u32,
}

/// Facts recorded on the keg's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum KegEvent {
    Refilled { mugs: u32, at: DateTime<Utc> },
    Poured { patron: String, at: DateTime<Utc> },
}

impl DomainEvent for KegEvent {
    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Refilled { at, .. } | Self::Poured { at, .. } => *at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("the keg is dry")]
struct KegDry;

fn keg_transition(mut keg: Keg, event: &KegEvent) -> Keg {
    match event {
        KegEvent::Refilled { mugs, .. } => keg.mugs += mugs,
        KegEvent::Poured { .. } => keg.mugs = keg.mugs.saturating_sub(1),
    }
    keg
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let start = Utc::now();
    let engine = Arc::new(
        CommandEngine::builder(InMemoryEventStore::<PlayerEvent>::new())
            .max_attempts(20)
            .build(),
    );
    let ctx = CommandContext::default().with_actor("innkeeper");

    // The hero walks in.
    let hero = stream_id_for::<Player>("ayla");
    engine.execute_aggregate::<Player>(
        &hero,
        &PlayerCommand::Create {
            name: "Ayla".into(),
            location: "tavern".into(),
            max_hp: 20,
            at: start,
        },
        &ctx,
    )?;

    // Stock the keg with three mugs. The keg has its own event type, so it
    // lives in its own store.
    let cellar = Arc::new(
        CommandEngine::builder(InMemoryEventStore::<KegEvent>::new())
            .max_attempts(20)
            .build(),
    );
    let keg = StreamId::for_entity("location", "tavern-keg");
    cellar.execute(
        &keg,
        Keg::default(),
        keg_transition,
        |_: &Keg| {
            Ok::<_, KegDry>(vec![KegEvent::Refilled {
                mugs: 3,
                at: start + Duration::seconds(1),
            }])
        },
        &ctx,
    )?;

    // Patrons race: each one throws a punch at the hero and orders an ale.
    let barrier = Arc::new(Barrier::new(PATRONS));
    let handles: Vec<_> = (0..PATRONS)
        .map(|n| {
            let engine = Arc::clone(&engine);
            let cellar = Arc::clone(&cellar);
            let barrier = Arc::clone(&barrier);
            let hero = hero.clone();
            let keg = keg.clone();
            thread::spawn(move || {
                let ctx = CommandContext::default()
                    .with_actor(format!("patron-{n}"))
                    .with_correlation_id(format!("brawl-{n}"));
                let at = start + Duration::seconds(10 + n as i64);
                barrier.wait();

                let punch = engine.execute_aggregate::<Player>(
                    &hero,
                    &PlayerCommand::TakeDamage { amount: 3, at },
                    &ctx,
                );
                let pour = cellar.execute(
                    &keg,
                    Keg::default(),
                    keg_transition,
                    |stock: &Keg| {
                        if stock.mugs == 0 {
                            return Err(KegDry);
                        }
                        Ok(vec![KegEvent::Poured {
                            patron: format!("patron-{n}"),
                            at,
                        }])
                    },
                    &ctx,
                );
                (n, punch.is_ok(), pour.is_ok())
            })
        })
        .collect();

    for handle in handles {
        let (n, punched, poured) = handle.join().map_err(|_| "patron thread panicked")?;
        println!("patron-{n}: punch landed={punched}, got ale={poured}");
    }

    // The hero limps to the market afterwards.
    engine.execute_aggregate::<Player>(
        &hero,
        &PlayerCommand::Move {
            to: "market".into(),
            at: start + Duration::seconds(60),
        },
        &ctx,
    )?;

    let now = engine.state::<Player>(&hero);
    println!(
        "now: {} at {} with {}/{} hp (version {})",
        now.state.name, now.state.location, now.state.hp, now.state.max_hp, now.stream_version
    );

    let before_brawl: DateTime<Utc> = start + Duration::seconds(5);
    let then = engine.state_at::<Player>(&hero, before_brawl);
    println!(
        "before the brawl: at {} with {}/{} hp (version {})",
        then.state.location, then.state.hp, then.state.max_hp, then.stream_version
    );

    let keg_now = project_stream(cellar.store(), &keg, Keg::default(), keg_transition);
    let keg_then = project_stream_until(
        cellar.store(),
        &keg,
        before_brawl,
        Keg::default(),
        keg_transition,
    );
    println!(
        "keg: {} mugs now, {} before the brawl",
        keg_now.state.mugs, keg_then.state.mugs
    );

    for fact in engine.store().read_stream(&hero) {
        println!(
            "  #{} {} by {}",
            fact.stream_version,
            fact.occurred_at.format("%H:%M:%S"),
            fact.metadata.actor.as_deref().unwrap_or("-"),
        );
    }

    assert_eq!(now.state.hp, 20 - 3 * PATRONS as u32);
    assert_eq!(then.state.hp, 20);
    assert_eq!(keg_now.state.mugs, 0);
    assert_eq!(keg_then.state.mugs, 3);

    println!("all assertions passed");
    Ok(())
}
