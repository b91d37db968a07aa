//! Per-owner convenience wrapper over the dispatcher.
//!
//! An [`EventHelper`] gives one game object an identity on the event bus: it
//! allocates its [`ObjectId`] at construction, stamps that id on everything
//! it fires and registers, and remembers its registrations so teardown is a
//! single [`EventHelper::remove_all_listeners`] call instead of a manual
//! enumeration.
//!
//! Unlike the raw dispatcher, a helper allows at most one handler per event
//! id; a second registration for the same id is rejected with a warning
//! rather than silently shadowing the first.

use std::any::Any;

use log::warn;
use rustc_hash::FxHashMap;

use crate::event::dispatcher::{EventDispatcher, HandlerToken};
use crate::event::id::{GLOBAL_ID, IdAllocator, ObjectId};
use crate::event::record::{EventHandler, EventKey};

/// Fire/receive endpoint for a single owner.
///
/// The dispatcher is passed into each call; the helper holds no reference
/// to it, so one helper can outlive dispatcher swaps in tests and scene
/// reloads.
pub struct EventHelper<E: EventKey> {
    id: ObjectId,
    registered: FxHashMap<E, HandlerToken>,
}

impl<E: EventKey> EventHelper<E> {
    pub fn new(ids: &IdAllocator) -> Self {
        EventHelper {
            id: ids.allocate(),
            registered: FxHashMap::default(),
        }
    }

    /// The id this helper stamps as sender and listener.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Broadcast `event_id` with this helper's id as sender.
    pub fn fire(
        &self,
        dispatcher: &mut EventDispatcher<E>,
        event_id: E,
        payload: Option<Box<dyn Any>>,
    ) {
        dispatcher.fire_event(event_id, self.id, GLOBAL_ID, payload);
    }

    /// Fire `event_id` at a specific receiver, this helper's id as sender.
    pub fn fire_to(
        &self,
        dispatcher: &mut EventDispatcher<E>,
        event_id: E,
        receiver_id: ObjectId,
        payload: Option<Box<dyn Any>>,
    ) {
        dispatcher.fire_event(event_id, self.id, receiver_id, payload);
    }

    /// Register `handler` for `event_id` under this helper's id.
    ///
    /// Rejected with a warning if this helper already has a handler for
    /// `event_id`; the existing registration stays in place.
    pub fn add_listener(
        &mut self,
        dispatcher: &mut EventDispatcher<E>,
        event_id: E,
        handler: EventHandler<E>,
    ) -> Option<HandlerToken> {
        if self.registered.contains_key(&event_id) {
            warn!(
                "listener {} already has a handler for {:?}; one handler per event id",
                self.id, event_id
            );
            return None;
        }
        let token = dispatcher.add_listener(event_id, self.id, handler);
        self.registered.insert(event_id, token);
        Some(token)
    }

    /// Unregister this helper's handler for `event_id`, if any.
    pub fn remove_listener(&mut self, dispatcher: &mut EventDispatcher<E>, event_id: E) -> bool {
        match self.registered.remove(&event_id) {
            Some(token) => dispatcher.remove_listener(event_id, token),
            None => {
                warn!("listener {} has no handler for {:?}", self.id, event_id);
                false
            }
        }
    }

    /// Teardown: unregister everything this helper ever added. Call from
    /// the owner's shutdown path so stale handlers never fire into a dead
    /// object.
    pub fn remove_all_listeners(&mut self, dispatcher: &mut EventDispatcher<E>) {
        for (event_id, token) in self.registered.drain() {
            dispatcher.remove_listener(event_id, token);
        }
    }

    /// Whether this helper currently has a handler for `event_id`.
    pub fn is_listening(&self, event_id: E) -> bool {
        self.registered.contains_key(&event_id)
    }
}
