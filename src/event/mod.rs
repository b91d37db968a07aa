//! Deferred event delivery between game modules.
//!
//! Events are fired into a buffer at any time and delivered by one explicit
//! [`EventDispatcher::drive`](dispatcher::EventDispatcher::drive) call per
//! tick, in FIFO order. Routing is by receiver id: the [`GLOBAL_ID`](id::GLOBAL_ID)
//! sentinel broadcasts (first handler to consume wins), any other id targets
//! exactly one listener.
//!
//! Submodules:
//! - [`id`] – object ids, sentinels, and the allocator
//! - [`record`] – the event value and handler signature
//! - [`dispatcher`] – buffering, routing, and the per-tick drive
//! - [`helper`] – per-owner wrapper that stamps ids and tracks registrations
pub mod dispatcher;
pub mod helper;
pub mod id;
pub mod record;
