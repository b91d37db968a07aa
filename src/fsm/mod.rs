//! Finite state machines for game entities.
//!
//! A machine owns its entity data, one current state, a single-level
//! previous state, and an optional global state that sees every message and
//! tick alongside the current one. Transitions requested by state hooks or
//! external callers are applied under a per-machine timing policy, either
//! immediately or deferred to the next tick.
//!
//! Submodules:
//! - [`state`] – the [`State`](state::State) trait, [`Transition`](state::Transition), [`Reply`](state::Reply)
//! - [`machine`] – the [`Fsm`](machine::Fsm) engine and run protocol
//! - [`registry`] – creation, per-tick driving, and disposal tracking
pub mod machine;
pub mod registry;
pub mod state;
