//! Integration tests for the event dispatcher, routing rules, and helper.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use machina::event::dispatcher::EventDispatcher;
use machina::event::helper::EventHelper;
use machina::event::id::{GLOBAL_ID, INVALID_ID, IdAllocator};
use machina::event::record::EventRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Ev {
    Ping,
    Pong,
}

type Hits = Rc<RefCell<Vec<String>>>;

fn hits() -> Hits {
    Rc::new(RefCell::new(Vec::new()))
}

/// Handler that records `label` and returns `handled`.
fn recorder(
    log: &Hits,
    label: &'static str,
    handled: bool,
) -> Box<dyn FnMut(&EventRecord<Ev>) -> bool> {
    let log = Rc::clone(log);
    Box::new(move |_| {
        log.borrow_mut().push(label.to_string());
        handled
    })
}

#[test]
fn delivery_is_deferred_until_drive() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    bus.add_listener(Ev::Ping, 7, recorder(&log, "h", true));

    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, None);
    assert!(log.borrow().is_empty());
    assert_eq!(bus.pending(), 1);

    bus.drive();
    assert_eq!(*log.borrow(), vec!["h"]);
    assert_eq!(bus.pending(), 0);
}

#[test]
fn broadcast_stops_at_first_consuming_handler() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    bus.add_listener(Ev::Ping, 1, recorder(&log, "h1", false));
    bus.add_listener(Ev::Ping, 2, recorder(&log, "h2", true));
    bus.add_listener(Ev::Ping, 3, recorder(&log, "h3", false));

    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, None);
    bus.drive();
    // Registration order until the first truthy handler; h3 never runs.
    assert_eq!(*log.borrow(), vec!["h1", "h2"]);
}

#[test]
fn broadcast_reaches_all_handlers_when_none_consume() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    bus.add_listener(Ev::Ping, 1, recorder(&log, "h1", false));
    bus.add_listener(Ev::Ping, 2, recorder(&log, "h2", false));

    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, None);
    bus.drive();
    assert_eq!(*log.borrow(), vec!["h1", "h2"]);
}

#[test]
fn directed_delivery_targets_exactly_one_listener() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    // Registration order deliberately puts the non-target first.
    bus.add_listener(Ev::Ping, 9, recorder(&log, "nine", true));
    bus.add_listener(Ev::Ping, 7, recorder(&log, "seven", false));

    bus.fire_event(Ev::Ping, 5, 7, None);
    bus.drive();
    // Only the id-7 handler runs; its `false` return does not trigger a
    // second attempt or fall-through to other listeners.
    assert_eq!(*log.borrow(), vec!["seven"]);
}

#[test]
fn directed_delivery_to_unknown_receiver_is_a_no_op() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    bus.add_listener(Ev::Ping, 9, recorder(&log, "nine", true));

    bus.fire_event(Ev::Ping, 5, 42, None);
    bus.drive();
    assert!(log.borrow().is_empty());
}

#[test]
fn invalid_sender_or_receiver_is_silently_dropped() {
    let mut bus = EventDispatcher::<Ev>::new();
    bus.fire_event(Ev::Ping, INVALID_ID, GLOBAL_ID, None);
    bus.fire_event(Ev::Ping, 5, INVALID_ID, None);
    assert_eq!(bus.pending(), 0);

    let log = hits();
    bus.add_listener(Ev::Ping, 7, recorder(&log, "h", true));
    bus.drive();
    assert!(log.borrow().is_empty());
}

#[test]
fn batch_is_delivered_in_fire_order() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    {
        let log = Rc::clone(&log);
        bus.add_listener(
            Ev::Ping,
            7,
            Box::new(move |ev| {
                log.borrow_mut().push(format!("sender:{}", ev.sender_id));
                false
            }),
        );
    }
    bus.fire_event(Ev::Ping, 1, GLOBAL_ID, None);
    bus.fire_event(Ev::Ping, 2, GLOBAL_ID, None);
    bus.fire_event(Ev::Ping, 3, GLOBAL_ID, None);
    bus.drive();
    assert_eq!(*log.borrow(), vec!["sender:1", "sender:2", "sender:3"]);
}

#[test]
fn buffer_is_cleared_even_when_a_handler_panics() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    {
        let log = Rc::clone(&log);
        bus.add_listener(
            Ev::Ping,
            7,
            Box::new(move |ev| {
                let marker = *ev.payload_as::<i32>().expect("payload present");
                log.borrow_mut().push(format!("seen:{marker}"));
                if marker == 1 {
                    panic!("listener bug");
                }
                true
            }),
        );
    }

    // Two events; the first handler invocation panics.
    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, Some(Box::new(1i32)));
    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, Some(Box::new(2i32)));
    let result = catch_unwind(AssertUnwindSafe(|| bus.drive()));
    assert!(result.is_err());

    // Nothing stale survives: the buffer was detached before delivery.
    assert_eq!(bus.pending(), 0);
    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, Some(Box::new(3i32)));
    bus.drive();
    assert_eq!(*log.borrow(), vec!["seen:1", "seen:3"]);
}

#[test]
fn lock_suppresses_drive_and_accumulates_events() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    bus.add_listener(Ev::Ping, 7, recorder(&log, "h", true));

    bus.lock();
    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, None);
    bus.drive();
    assert!(log.borrow().is_empty());
    assert_eq!(bus.pending(), 1);

    bus.fire_event(Ev::Ping, 6, GLOBAL_ID, None);
    bus.unlock();
    bus.drive();
    assert_eq!(*log.borrow(), vec!["h", "h"]);
}

#[test]
fn remove_listener_requires_the_matching_token() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    let first = bus.add_listener(Ev::Ping, 1, recorder(&log, "h1", false));
    let second = bus.add_listener(Ev::Ping, 2, recorder(&log, "h2", false));

    assert!(bus.remove_listener(Ev::Ping, first));
    // Already removed: silent no-op.
    assert!(!bus.remove_listener(Ev::Ping, first));
    // Wrong event id: no-op, the Pong table does not hold this token.
    assert!(!bus.remove_listener(Ev::Pong, second));
    assert_eq!(bus.listener_count(Ev::Ping), 1);

    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, None);
    bus.drive();
    assert_eq!(*log.borrow(), vec!["h2"]);
}

#[test]
fn duplicate_registrations_are_allowed_on_the_raw_dispatcher() {
    let mut bus = EventDispatcher::<Ev>::new();
    let log = hits();
    bus.add_listener(Ev::Ping, 7, recorder(&log, "a", false));
    bus.add_listener(Ev::Ping, 7, recorder(&log, "b", false));
    assert_eq!(bus.listener_count(Ev::Ping), 2);

    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, None);
    bus.drive();
    assert_eq!(*log.borrow(), vec!["a", "b"]);
}

#[test]
fn payload_downcast_is_typed() {
    let record = EventRecord::new(Ev::Pong, 1, GLOBAL_ID, Some(Box::new(12.5f32)));
    assert_eq!(record.payload_as::<f32>(), Some(&12.5));
    assert_eq!(record.payload_as::<i32>(), None);

    let empty = EventRecord::new(Ev::Pong, 1, GLOBAL_ID, None);
    assert_eq!(empty.payload_as::<f32>(), None);
}

#[test]
fn allocator_hands_out_distinct_increasing_ids() {
    let ids = IdAllocator::new();
    let allocated: Vec<_> = (0..10).map(|_| ids.allocate()).collect();
    for window in allocated.windows(2) {
        assert!(window[0] < window[1]);
    }
    assert!(allocated.iter().all(|id| *id != GLOBAL_ID && *id != INVALID_ID));
}

#[test]
fn helper_stamps_its_own_id_on_fired_events() {
    let ids = IdAllocator::new();
    let mut bus = EventDispatcher::<Ev>::new();
    let sender = EventHelper::new(&ids);
    let mut receiver = EventHelper::new(&ids);
    assert_ne!(sender.id(), receiver.id());

    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = Rc::clone(&seen);
        receiver.add_listener(
            &mut bus,
            Ev::Ping,
            Box::new(move |ev| {
                seen.borrow_mut().push((ev.sender_id, ev.receiver_id));
                true
            }),
        );
    }

    sender.fire(&mut bus, Ev::Ping, None);
    sender.fire_to(&mut bus, Ev::Ping, receiver.id(), None);
    bus.drive();
    assert_eq!(*seen.borrow(), vec![(sender.id(), GLOBAL_ID), (sender.id(), receiver.id())]);
}

#[test]
fn helper_rejects_a_second_handler_for_the_same_event() {
    let ids = IdAllocator::new();
    let mut bus = EventDispatcher::<Ev>::new();
    let mut helper = EventHelper::new(&ids);
    let log = hits();

    assert!(helper.add_listener(&mut bus, Ev::Ping, recorder(&log, "first", true)).is_some());
    assert!(helper.add_listener(&mut bus, Ev::Ping, recorder(&log, "second", true)).is_none());
    assert_eq!(bus.listener_count(Ev::Ping), 1);

    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, None);
    bus.drive();
    // The original registration stays in place.
    assert_eq!(*log.borrow(), vec!["first"]);
}

#[test]
fn helper_teardown_unregisters_everything() {
    let ids = IdAllocator::new();
    let mut bus = EventDispatcher::<Ev>::new();
    let mut helper = EventHelper::new(&ids);
    let log = hits();

    helper.add_listener(&mut bus, Ev::Ping, recorder(&log, "ping", true));
    helper.add_listener(&mut bus, Ev::Pong, recorder(&log, "pong", true));
    assert!(helper.is_listening(Ev::Ping));

    helper.remove_all_listeners(&mut bus);
    assert!(!helper.is_listening(Ev::Ping));
    assert_eq!(bus.listener_count(Ev::Ping), 0);
    assert_eq!(bus.listener_count(Ev::Pong), 0);

    bus.fire_event(Ev::Ping, 5, GLOBAL_ID, None);
    bus.drive();
    assert!(log.borrow().is_empty());
}

#[test]
fn helper_remove_single_listener() {
    let ids = IdAllocator::new();
    let mut bus = EventDispatcher::<Ev>::new();
    let mut helper = EventHelper::new(&ids);
    let log = hits();

    helper.add_listener(&mut bus, Ev::Ping, recorder(&log, "ping", true));
    assert!(helper.remove_listener(&mut bus, Ev::Ping));
    // Not registered anymore: warns and reports false.
    assert!(!helper.remove_listener(&mut bus, Ev::Ping));
    assert_eq!(bus.listener_count(Ev::Ping), 0);
}
