//! Machina library.
//!
//! Control-flow backbone for tick-driven game entities: generic finite
//! state machines ([`fsm`]) and a deferred, ID-routed event dispatcher
//! ([`event`]). Entities create a machine through the registry, attach
//! states, and react to gameplay events delivered by the dispatcher as
//! structured messages.
//!
//! # Drive order
//!
//! The owning runtime calls, once per tick and in this order:
//!
//! 1. [`EventDispatcher::drive`](event::dispatcher::EventDispatcher::drive)
//! 2. [`FsmRegistry::drive_all`](fsm::registry::FsmRegistry::drive_all)
//!
//! Delivering events first guarantees a tick's messages are visible to the
//! same tick's state updates. The whole core is single-threaded and
//! cooperative; nothing here blocks, and no structure tolerates concurrent
//! mutation.

pub mod event;
pub mod fsm;
