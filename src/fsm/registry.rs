//! Tracks live machines and drives them once per tick.
//!
//! The registry creates machines, keeps a weak reference to each, and
//! updates every running one when [`FsmRegistry::drive_all`] is called by
//! the owning runtime. Machines announce their own `stop()` over a
//! disposal channel; the registry forgets them on the next drive. Callers
//! own the returned [`FsmHandle`] and remain responsible for `start()` and
//! `stop()`.
//!
//! Cross-machine update order is insertion order and carries no meaning;
//! nothing in the core may rely on it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::error;

use crate::fsm::machine::{ChangeTiming, Fsm};
use crate::fsm::state::State;

/// Registry-scoped machine identifier, used only for disposal routing and
/// log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsmId(u64);

/// Shared handle to a machine. The caller holds the strong reference; the
/// registry only tracks a weak one.
pub type FsmHandle<T, M> = Rc<RefCell<Fsm<T, M>>>;

/// Creates and ticks machines for one owner/message type pair.
///
/// Every machine created here shares the registry's [`ChangeTiming`], so a
/// whole population of entities runs under one documented policy.
pub struct FsmRegistry<T, M> {
    machines: Vec<(FsmId, Weak<RefCell<Fsm<T, M>>>)>,
    disposal_tx: Sender<FsmId>,
    disposal_rx: Receiver<FsmId>,
    next_id: u64,
    timing: ChangeTiming,
}

impl<T: 'static, M: 'static> FsmRegistry<T, M> {
    pub fn new(timing: ChangeTiming) -> Self {
        let (disposal_tx, disposal_rx) = unbounded();
        FsmRegistry {
            machines: Vec::new(),
            disposal_tx,
            disposal_rx,
            next_id: 0,
            timing,
        }
    }

    /// Build and track a machine with no global state. Not yet started.
    pub fn create<S: State<T, M>>(&mut self, owner: T, initial: S) -> FsmHandle<T, M> {
        self.register(Fsm::new(owner, initial, self.timing))
    }

    /// Build and track a machine with a global state. Not yet started.
    pub fn create_with_global<S, G>(&mut self, owner: T, initial: S, global: G) -> FsmHandle<T, M>
    where
        S: State<T, M>,
        G: State<T, M>,
    {
        self.register(Fsm::new(owner, initial, self.timing).with_global(global))
    }

    fn register(&mut self, mut fsm: Fsm<T, M>) -> FsmHandle<T, M> {
        let id = FsmId(self.next_id);
        self.next_id += 1;
        fsm.attach_registry(id, self.disposal_tx.clone());
        let handle = Rc::new(RefCell::new(fsm));
        self.machines.push((id, Rc::downgrade(&handle)));
        handle
    }

    /// One external tick: absorb disposal notifications, then `update()`
    /// every tracked machine that is currently running, in insertion order.
    pub fn drive_all(&mut self) {
        self.process_disposals();
        for (_, weak) in &self.machines {
            if let Some(machine) = weak.upgrade() {
                let mut machine = machine.borrow_mut();
                if machine.is_running() {
                    machine.update();
                }
            }
        }
    }

    /// Drain the disposal channel. A machine is forgotten only if it
    /// reports not-running; a disposal from a machine that still claims to
    /// be running is a caller bug and is logged without further action.
    /// Unknown ids are silent no-ops. Handles the caller dropped without
    /// stopping are pruned here as well.
    fn process_disposals(&mut self) {
        while let Ok(id) = self.disposal_rx.try_recv() {
            let Some(pos) = self.machines.iter().position(|(mid, _)| *mid == id) else {
                continue;
            };
            let still_running = match self.machines[pos].1.upgrade() {
                Some(machine) => machine.borrow().is_running(),
                None => false,
            };
            if still_running {
                error!(
                    "fsm {:?} sent a disposal notification while still running; kept tracked",
                    id
                );
            } else {
                self.machines.remove(pos);
            }
        }
        self.machines.retain(|(_, weak)| weak.strong_count() > 0);
    }

    /// Number of tracked machines (including ones not yet started).
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}
