//! The inter-module event value and its handler signature.
//!
//! An [`EventRecord`] is what listeners receive: which event happened, who
//! fired it, who it is addressed to, and an opaque payload. The record type
//! is generic over the application's event-id enum `E`; the core never
//! enumerates event kinds itself.

use std::any::Any;
use std::fmt;
use std::hash::Hash;

use crate::event::id::ObjectId;

/// Bound alias for application event-id enums.
///
/// Any `Copy + Eq + Hash` enum with stable equality qualifies; the blanket
/// impl below means applications never implement this by hand.
pub trait EventKey: Copy + Eq + Hash + fmt::Debug + 'static {}
impl<E: Copy + Eq + Hash + fmt::Debug + 'static> EventKey for E {}

/// A buffered inter-module event.
///
/// `receiver_id == GLOBAL_ID` means broadcast; any other value targets one
/// registered listener. The payload is opaque to the dispatcher; listeners
/// downcast it with [`EventRecord::payload_as`].
pub struct EventRecord<E> {
    pub event_id: E,
    pub sender_id: ObjectId,
    pub receiver_id: ObjectId,
    pub payload: Option<Box<dyn Any>>,
}

impl<E: EventKey> EventRecord<E> {
    pub fn new(
        event_id: E,
        sender_id: ObjectId,
        receiver_id: ObjectId,
        payload: Option<Box<dyn Any>>,
    ) -> Self {
        EventRecord {
            event_id,
            sender_id,
            receiver_id,
            payload,
        }
    }

    /// Downcast the payload to a concrete type. `None` if there is no
    /// payload or it holds a different type.
    pub fn payload_as<P: 'static>(&self) -> Option<&P> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<P>())
    }
}

impl<E: EventKey> fmt::Debug for EventRecord<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecord")
            .field("event_id", &self.event_id)
            .field("sender_id", &self.sender_id)
            .field("receiver_id", &self.receiver_id)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// Listener callback. Returns `true` to consume the event: broadcast
/// delivery stops at the first handler that returns `true`; directed
/// delivery ignores the value.
pub type EventHandler<E> = Box<dyn FnMut(&EventRecord<E>) -> bool>;
