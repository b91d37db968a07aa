//! Deferred, ID-routed event dispatcher.
//!
//! [`EventDispatcher`] decouples event producers from consumers. Firing an
//! event never invokes a handler; records accumulate in an internal buffer
//! and are delivered by a single [`EventDispatcher::drive`] call once per
//! tick, in FIFO order.
//!
//! # Routing
//!
//! - **Broadcast** (`receiver_id == GLOBAL_ID`): handlers registered for the
//!   event id run in registration order until one returns `true`. The first
//!   handler to consume the event wins; later ones are not invoked.
//! - **Directed** (any other receiver): only the first handler whose
//!   listener id matches the receiver runs, exactly once, and its return
//!   value is ignored.
//!
//! The asymmetry is deliberate: broadcast lets the most specific listener
//! eat an event, while directed delivery is always a single attempt.
//!
//! # Failure
//!
//! A panicking handler propagates out of `drive()`, but the buffer is
//! emptied before delivery begins, so no event can be redelivered or stuck
//! after a handler fails. Events fired with an unassigned sender or
//! receiver ([`INVALID_ID`]) are dropped silently; that is the expected
//! shape of "not wired up yet", not an error.
//!
//! # Example
//!
//! ```ignore
//! let mut bus = EventDispatcher::<GameEvent>::new();
//! let token = bus.add_listener(GameEvent::Damage, enemy_id, Box::new(|ev| {
//!     // react to ev.payload_as::<f32>()
//!     true
//! }));
//! bus.fire_event(GameEvent::Damage, player_id, GLOBAL_ID, Some(Box::new(12.5f32)));
//! bus.drive(); // delivery happens here, not at fire time
//! bus.remove_listener(GameEvent::Damage, token);
//! ```
//!
//! # Related
//!
//! - [`crate::event::helper::EventHelper`] – per-owner registration wrapper
//! - [`crate::event::record::EventRecord`] – the delivered value

use std::any::Any;
use std::mem;

use log::trace;
use rustc_hash::FxHashMap;

use crate::event::id::{GLOBAL_ID, INVALID_ID, ObjectId};
use crate::event::record::{EventHandler, EventKey, EventRecord};

/// Opaque registration token returned by [`EventDispatcher::add_listener`]
/// and required for removal. Removal by token avoids comparing closures for
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(u64);

struct HandlerEntry<E> {
    listener_id: ObjectId,
    token: HandlerToken,
    handler: EventHandler<E>,
}

/// Buffers fired events and delivers them on [`drive`](Self::drive).
///
/// One dispatcher per application context; construct it at the root and
/// pass it where needed. Not safe for concurrent mutation — the whole core
/// assumes the single-threaded game-loop model.
pub struct EventDispatcher<E: EventKey> {
    handlers: FxHashMap<E, Vec<HandlerEntry<E>>>,
    buffer: Vec<EventRecord<E>>,
    next_token: u64,
    locked: bool,
}

impl<E: EventKey> EventDispatcher<E> {
    pub fn new() -> Self {
        EventDispatcher {
            handlers: FxHashMap::default(),
            buffer: Vec::new(),
            next_token: 0,
            locked: false,
        }
    }

    /// Register `handler` under `event_id` for the given listener id.
    ///
    /// Appends unconditionally — the dispatcher does not deduplicate
    /// `(event_id, listener_id)` pairs; that is the caller's contract
    /// (see [`EventHelper`](crate::event::helper::EventHelper), which does
    /// enforce it per owner).
    pub fn add_listener(
        &mut self,
        event_id: E,
        listener_id: ObjectId,
        handler: EventHandler<E>,
    ) -> HandlerToken {
        let token = HandlerToken(self.next_token);
        self.next_token += 1;
        self.handlers.entry(event_id).or_default().push(HandlerEntry {
            listener_id,
            token,
            handler,
        });
        token
    }

    /// Remove the registration identified by `token` under `event_id`.
    /// Returns `false` (silent no-op) if it is not there.
    pub fn remove_listener(&mut self, event_id: E, token: HandlerToken) -> bool {
        let Some(entries) = self.handlers.get_mut(&event_id) else {
            return false;
        };
        match entries.iter().position(|e| e.token == token) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Buffer an event for the next [`drive`](Self::drive).
    ///
    /// Never delivers synchronously. Dropped without logging when either id
    /// is [`INVALID_ID`].
    pub fn fire_event(
        &mut self,
        event_id: E,
        sender_id: ObjectId,
        receiver_id: ObjectId,
        payload: Option<Box<dyn Any>>,
    ) {
        if sender_id == INVALID_ID || receiver_id == INVALID_ID {
            return;
        }
        self.buffer
            .push(EventRecord::new(event_id, sender_id, receiver_id, payload));
    }

    /// Deliver every buffered event in fire order, then leave the buffer
    /// empty. Call once per tick, before FSM updates, so a tick's events are
    /// visible to that tick's state logic.
    ///
    /// No-op while [`lock`](Self::lock) is held; buffered events keep
    /// accumulating until unlocked. The buffer is detached up front, so a
    /// handler panic propagates to the caller with the buffer already
    /// cleared.
    pub fn drive(&mut self) {
        if self.locked {
            return;
        }
        // Detaching first is what guarantees the buffer-clear-on-panic
        // contract.
        let batch = mem::take(&mut self.buffer);
        for event in &batch {
            self.deliver(event);
        }
    }

    fn deliver(&mut self, event: &EventRecord<E>) {
        let Some(entries) = self.handlers.get_mut(&event.event_id) else {
            return;
        };
        if event.receiver_id == GLOBAL_ID {
            for entry in entries.iter_mut() {
                if (entry.handler)(event) {
                    trace!(
                        "event {:?} consumed by listener {}",
                        event.event_id, entry.listener_id
                    );
                    break;
                }
            }
        } else if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.listener_id == event.receiver_id)
        {
            // Directed delivery is one attempt; the return value does not
            // gate anything.
            let _ = (entry.handler)(event);
        }
    }

    /// Suppress [`drive`](Self::drive) until [`unlock`](Self::unlock).
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of events waiting for the next drive.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of registrations under `event_id`.
    pub fn listener_count(&self, event_id: E) -> usize {
        self.handlers.get(&event_id).map_or(0, Vec::len)
    }
}

impl<E: EventKey> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}
