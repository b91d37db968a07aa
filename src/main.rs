//! Machina demo entry point.
//!
//! A miniature, headless combat loop showing how the two halves of the
//! crate fit together:
//!
//! - **fsm** – each enemy runs a machine with `Idle`/`Attack`/`Dead` states
//!   plus a global `Vigil` state that applies damage and triggers death no
//!   matter which state is current
//! - **event** – a player fires directed `Damage` events at enemies;
//!   enemies broadcast `EnemyDied` when they fall, consumed by a
//!   scorekeeper listener
//!
//! # Tick loop
//!
//! Once per tick, in the documented order:
//!
//! 1. `EventDispatcher::drive()` – deliver this tick's buffered events
//! 2. `FsmRegistry::drive_all()` – update every running machine
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=debug cargo run -- --ticks 40 --enemies 4 --seed 7
//! ```

use std::cell::Cell;
use std::rc::Rc;

use clap::Parser;
use log::{debug, info};

use machina::event::dispatcher::EventDispatcher;
use machina::event::helper::EventHelper;
use machina::event::id::IdAllocator;
use machina::fsm::machine::{ChangeTiming, RunPhase};
use machina::fsm::registry::FsmRegistry;
use machina::fsm::state::{Reply, State, Transition};

/// Events exchanged over the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GameEvent {
    /// Directed at one enemy; payload is the damage amount (`f32`).
    Damage,
    /// Broadcast by a fallen enemy; no payload.
    EnemyDied,
}

/// Messages forwarded into an enemy's machine.
#[derive(Debug)]
enum EnemyMsg {
    Hurt(f32),
}

/// The owner type the states operate on.
struct Enemy {
    name: String,
    hp: f32,
}

/// Waits around; occasionally works up the nerve to attack.
struct Idle;

impl State<Enemy, EnemyMsg> for Idle {
    fn enter(&mut self, owner: &mut Enemy, _param: Option<&dyn std::any::Any>) {
        debug!("{} idles", owner.name);
    }

    fn update(&mut self, owner: &mut Enemy) -> Option<Transition<Enemy, EnemyMsg>> {
        if fastrand::f32() < 0.3 {
            let style = if fastrand::bool() { "claw" } else { "bite" };
            debug!("{} gets restless", owner.name);
            return Some(Transition::to_with(Attack::default(), style));
        }
        None
    }
}

/// A short flurry; reverts to whatever came before after two ticks.
#[derive(Default)]
struct Attack {
    ticks: u32,
}

impl State<Enemy, EnemyMsg> for Attack {
    fn enter(&mut self, owner: &mut Enemy, param: Option<&dyn std::any::Any>) {
        let style = param
            .and_then(|p| p.downcast_ref::<&str>())
            .copied()
            .unwrap_or("flail");
        info!("{} attacks with a {style}", owner.name);
    }

    fn update(&mut self, owner: &mut Enemy) -> Option<Transition<Enemy, EnemyMsg>> {
        self.ticks += 1;
        if self.ticks >= 2 {
            debug!("{} winds down", owner.name);
            return Some(Transition::revert());
        }
        None
    }
}

/// Terminal state; the main loop stops the machine once it lands here.
struct Dead;

impl State<Enemy, EnemyMsg> for Dead {
    fn enter(&mut self, owner: &mut Enemy, _param: Option<&dyn std::any::Any>) {
        info!("{} collapses", owner.name);
    }
}

/// Global state: applies damage and forces the death transition regardless
/// of what the current state is doing.
struct Vigil;

impl State<Enemy, EnemyMsg> for Vigil {
    fn on_message(&mut self, owner: &mut Enemy, msg: &EnemyMsg) -> Reply<Enemy, EnemyMsg> {
        let EnemyMsg::Hurt(damage) = msg;
        owner.hp -= damage;
        info!("{} takes {damage:.0} damage, {:.0} hp left", owner.name, owner.hp);
        if owner.hp <= 0.0 {
            return Reply::with_transition(Transition::to(Dead));
        }
        Reply::none()
    }
}

/// Machina demo: FSM-driven enemies on a deferred event bus.
#[derive(Parser)]
#[command(version, about = "Machina demo: FSM-driven enemies on a deferred event bus")]
struct Cli {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 30)]
    ticks: u32,

    /// Number of enemies to spawn.
    #[arg(long, default_value_t = 3)]
    enemies: u32,

    /// RNG seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Some(seed) = cli.seed {
        fastrand::seed(seed);
    }

    let ids = IdAllocator::new();
    let mut bus = EventDispatcher::<GameEvent>::new();
    let mut registry = FsmRegistry::<Enemy, EnemyMsg>::new(ChangeTiming::Deferred);

    // Scorekeeper: consumes every EnemyDied broadcast.
    let kills = Rc::new(Cell::new(0u32));
    let mut scorekeeper = EventHelper::new(&ids);
    {
        let kills = Rc::clone(&kills);
        scorekeeper.add_listener(
            &mut bus,
            GameEvent::EnemyDied,
            Box::new(move |ev| {
                kills.set(kills.get() + 1);
                info!("scorekeeper: enemy {} is down", ev.sender_id);
                true
            }),
        );
    }

    // Spawn enemies: one machine and one bus endpoint each. Damage events
    // directed at an enemy's id are forwarded into its machine as messages.
    let mut enemies = Vec::new();
    for i in 0..cli.enemies {
        let mut helper = EventHelper::new(&ids);
        let fsm = registry.create_with_global(
            Enemy {
                name: format!("enemy-{i}"),
                hp: 50.0,
            },
            Idle,
            Vigil,
        );
        fsm.borrow_mut().start();

        let fsm_for_handler = Rc::clone(&fsm);
        helper.add_listener(
            &mut bus,
            GameEvent::Damage,
            Box::new(move |ev| {
                if let Some(damage) = ev.payload_as::<f32>() {
                    let _ = fsm_for_handler.borrow_mut().on_message(&EnemyMsg::Hurt(*damage));
                }
                true
            }),
        );
        enemies.push((helper, fsm));
    }

    let player = EventHelper::<GameEvent>::new(&ids);
    info!("let the brawl begin: {} enemies, {} ticks", cli.enemies, cli.ticks);

    for tick in 0..cli.ticks {
        // The player swings at a random enemy that is still standing.
        let standing: Vec<_> = enemies
            .iter()
            .filter(|(_, fsm)| fsm.borrow().phase() != RunPhase::Stopped)
            .collect();
        if standing.is_empty() {
            info!("all enemies down after {tick} ticks");
            break;
        }
        let (target, _) = standing[fastrand::usize(..standing.len())];
        let damage = 10.0 + fastrand::f32() * 15.0;
        player.fire_to(&mut bus, GameEvent::Damage, target.id(), Some(Box::new(damage)));

        bus.drive();
        registry.drive_all();

        // Bury the dead: stop their machines and tear down their listeners.
        for (helper, fsm) in &mut enemies {
            let mut machine = fsm.borrow_mut();
            if machine.is_in_state::<Dead>() && machine.phase() != RunPhase::Stopped {
                machine.stop();
                drop(machine);
                helper.fire(&mut bus, GameEvent::EnemyDied, None);
                helper.remove_all_listeners(&mut bus);
            }
        }
    }

    // Flush any EnemyDied broadcasts from the final tick.
    bus.drive();
    registry.drive_all();

    info!("done: {} kills, {} machines still tracked", kills.get(), registry.len());
}
