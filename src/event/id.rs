// Unique ids for event senders/receivers. Id 0 is the broadcast sentinel,
// -1 marks an unassigned participant.

use std::cell::Cell;

/// Identifier for an event sender or receiver.
pub type ObjectId = i64;

/// Broadcast sentinel: an event addressed to this id goes to every listener.
pub const GLOBAL_ID: ObjectId = 0;

/// Sentinel for a participant that never got an id assigned. Events carrying
/// it are dropped on fire.
pub const INVALID_ID: ObjectId = -1;

/// Hands out process-unique ids, starting at 1 and counting up.
///
/// Construct one at the application root and pass it to whatever needs ids
/// (typically [`EventHelper`](crate::event::helper::EventHelper)
/// construction). Ids are never reused; reclamation is deliberately out of
/// scope.
#[derive(Debug)]
pub struct IdAllocator {
    next: Cell<ObjectId>,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator { next: Cell::new(1) }
    }

    /// Returns the next free id. Never returns [`GLOBAL_ID`] or [`INVALID_ID`].
    pub fn allocate(&self) -> ObjectId {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_increasing_and_nonzero() {
        let ids = IdAllocator::new();
        let mut prev = GLOBAL_ID;
        for _ in 0..100 {
            let id = ids.allocate();
            assert_ne!(id, GLOBAL_ID);
            assert_ne!(id, INVALID_ID);
            assert!(id > prev);
            prev = id;
        }
    }

    #[test]
    fn first_id_is_one() {
        let ids = IdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
    }
}
