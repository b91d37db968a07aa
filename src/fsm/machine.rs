//! The finite state machine engine.
//!
//! An [`Fsm`] owns its owner value, a current state, a single-level
//! previous state, and an optional always-active global state. It routes
//! messages to the current and global states, executes transitions under a
//! per-machine [`ChangeTiming`] policy, and exposes the
//! start/pause/resume/stop run protocol.
//!
//! # Timing policy
//!
//! - [`ChangeTiming::Immediate`] – transition requests apply synchronously
//!   inside the requesting call. Simple and robust; the state observed
//!   after the call is the new one.
//! - [`ChangeTiming::Deferred`] – requests queue and the whole batch is
//!   applied at the start of the next [`Fsm::update`], which then skips
//!   per-state updates for that tick. This removes same-tick ordering
//!   ambiguity: everyone reading the machine within a tick sees one state.
//!
//! The policy is a constructor parameter, fixed for the machine's lifetime.
//!
//! # Run protocol
//!
//! `Idle --start()--> Running <--pause()/resume()--> Paused`, and
//! `Running | Paused --stop()--> Stopped` (terminal, not restartable).
//! While not `Running`, messages and updates are suppressed; no state
//! `enter`/`exit` ever runs outside `start`, `stop`, or an applied
//! transition.
//!
//! # Related
//!
//! - [`crate::fsm::state`] – the `State` trait and transition values
//! - [`crate::fsm::registry::FsmRegistry`] – batched per-tick driving

use std::mem;

use crossbeam_channel::Sender;
use log::{debug, error, warn};
use smallvec::SmallVec;
use thiserror::Error;

use crate::fsm::registry::FsmId;
use crate::fsm::state::{Reply, Slot, State, StateParam, StateResponse, Target, Transition};

/// When transition requests are applied. See the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTiming {
    /// Apply inside the requesting call.
    Immediate,
    /// Queue and apply as a batch on the next `update()`.
    Deferred,
}

/// Run phase of a machine. `Paused` is a sub-mode of being alive: ticking
/// and messages are suppressed but the machine keeps its state. `Stopped`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Which state's message response [`Fsm::on_message_from`] should return.
/// Both states always receive the message; this only selects the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Current,
    Global,
}

/// Why a transition request was rejected. Each rejection is also logged;
/// the machine is unchanged afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("state machine is not running")]
    NotRunning,
    #[error("already in state {0}; same-type transitions are rejected")]
    SameState(&'static str),
    #[error("no previous state to revert to")]
    NoPrevious,
}

/// A finite state machine over an owner `T` and message type `M`.
///
/// Built with [`Fsm::new`] (plus [`Fsm::with_global`] for a global state),
/// usually through an [`FsmRegistry`](crate::fsm::registry::FsmRegistry) so
/// it gets ticked by `drive_all()`. The creator owns the machine and is
/// responsible for calling [`start`](Self::start) and, at teardown,
/// [`stop`](Self::stop).
pub struct Fsm<T, M> {
    owner: T,
    current: Slot<T, M>,
    previous: Option<Slot<T, M>>,
    global: Option<Box<dyn State<T, M>>>,
    phase: RunPhase,
    timing: ChangeTiming,
    queued: SmallVec<[Target<T, M>; 2]>,
    id: Option<FsmId>,
    disposal: Option<Sender<FsmId>>,
}

impl<T: 'static, M: 'static> Fsm<T, M> {
    /// Build a machine in `RunPhase::Idle`; `initial` is not entered until
    /// [`start`](Self::start).
    pub fn new<S: State<T, M>>(owner: T, initial: S, timing: ChangeTiming) -> Self {
        Fsm {
            owner,
            current: Slot::new(initial),
            previous: None,
            global: None,
            phase: RunPhase::Idle,
            timing,
            queued: SmallVec::new(),
            id: None,
            disposal: None,
        }
    }

    /// Attach a global state. Its `update` and `on_message` hooks run after
    /// the current state's on every dispatch; it is never entered or
    /// exited.
    pub fn with_global<G: State<T, M>>(mut self, global: G) -> Self {
        self.global = Some(Box::new(global));
        self
    }

    /// Begin running and enter the initial state (exactly once, with no
    /// parameter). No-op if already running or paused; a stopped machine
    /// cannot be restarted.
    pub fn start(&mut self) {
        match self.phase {
            RunPhase::Idle => {
                self.phase = RunPhase::Running;
                self.current.state.enter(&mut self.owner, None);
            }
            RunPhase::Running | RunPhase::Paused => {}
            RunPhase::Stopped => {
                warn!(
                    "fsm {:?}: start() after stop() ignored; machines are not restartable",
                    self.id
                );
            }
        }
    }

    /// Suppress ticking and messages without exiting the current state.
    pub fn pause(&mut self) {
        if self.phase == RunPhase::Running {
            self.phase = RunPhase::Paused;
        }
    }

    /// Undo [`pause`](Self::pause). Queued transitions survive a
    /// pause/resume cycle untouched.
    pub fn resume(&mut self) {
        if self.phase == RunPhase::Paused {
            self.phase = RunPhase::Running;
        }
    }

    /// Exit the current state, stop for good, and notify the registry (if
    /// any) exactly once. Idempotent: a second call does nothing.
    pub fn stop(&mut self) {
        match self.phase {
            RunPhase::Running | RunPhase::Paused => {}
            RunPhase::Idle | RunPhase::Stopped => return,
        }
        self.current.state.exit(&mut self.owner);
        self.phase = RunPhase::Stopped;
        self.queued.clear();
        if let Some(tx) = self.disposal.take()
            && let Some(id) = self.id
        {
            // The registry may already be gone at app shutdown; that is fine.
            let _ = tx.send(id);
        }
    }

    /// Advance one tick.
    ///
    /// Under `Deferred`, a non-empty request queue is applied as one batch
    /// (in request order, with a warning if the tick collected more than
    /// one request — that usually signals ambiguous intent) and the
    /// per-state updates are skipped for this tick. Otherwise the current
    /// state's `update` runs, then the global state's, and any transitions
    /// they return are routed through the timing policy.
    pub fn update(&mut self) {
        if self.phase != RunPhase::Running {
            return;
        }
        if !self.queued.is_empty() {
            let batch = mem::take(&mut self.queued);
            if batch.len() > 1 {
                warn!(
                    "fsm {:?}: {} state changes queued in one tick; applying in request order",
                    self.id,
                    batch.len()
                );
            }
            for target in batch {
                // Rejections are logged inside; the batch keeps going.
                let _ = self.apply(target);
            }
            return;
        }
        if let Some(transition) = self.current.state.update(&mut self.owner) {
            let _ = self.route(transition);
        }
        let requested = match self.global.as_mut() {
            Some(global) => global.update(&mut self.owner),
            None => None,
        };
        if let Some(transition) = requested {
            let _ = self.route(transition);
        }
    }

    /// Dispatch a message to the current state and, independently, to the
    /// global state; returns the current state's response. Returns `None`
    /// without dispatching unless the machine is `Running`.
    pub fn on_message(&mut self, msg: &M) -> Option<StateResponse> {
        self.on_message_from(msg, ResponseSource::Current)
    }

    /// Like [`on_message`](Self::on_message) but `source` selects whether
    /// the current or the global state's response is returned. Transitions
    /// requested by either reply are routed (current state's first).
    pub fn on_message_from(&mut self, msg: &M, source: ResponseSource) -> Option<StateResponse> {
        if self.phase != RunPhase::Running {
            return None;
        }
        let Reply {
            response: current_response,
            transition: current_transition,
        } = self.current.state.on_message(&mut self.owner, msg);
        let Reply {
            response: global_response,
            transition: global_transition,
        } = match self.global.as_mut() {
            Some(global) => global.on_message(&mut self.owner, msg),
            None => Reply::none(),
        };
        if let Some(transition) = current_transition {
            let _ = self.route(transition);
        }
        if let Some(transition) = global_transition {
            let _ = self.route(transition);
        }
        match source {
            ResponseSource::Current => current_response,
            ResponseSource::Global => global_response,
        }
    }

    /// Request a transition to `state` with no parameter.
    pub fn change_state<S: State<T, M>>(&mut self, state: S) -> Result<(), TransitionError> {
        self.request(Transition::to(state))
    }

    /// Request a transition to `state`, handing `param` to its `enter`.
    pub fn change_state_with<S: State<T, M>>(
        &mut self,
        state: S,
        param: StateParam,
    ) -> Result<(), TransitionError> {
        self.request(Transition {
            target: Target::Enter {
                slot: Slot::new(state),
                param: Some(param),
            },
        })
    }

    /// Request a return to the previous state. Single level only: the
    /// machine keeps no deeper history.
    pub fn revert_state(&mut self) -> Result<(), TransitionError> {
        self.request(Transition::revert())
    }

    /// Route an already-built [`Transition`] through the timing policy.
    ///
    /// Under `Immediate` the result reflects validation; under `Deferred`
    /// only the running check happens here — the rest is validated (and
    /// logged) when the batch is applied on the next tick.
    pub fn request(&mut self, transition: Transition<T, M>) -> Result<(), TransitionError> {
        if self.phase != RunPhase::Running {
            error!(
                "fsm {:?}: state change requested while {:?}; ignored",
                self.id, self.phase
            );
            return Err(TransitionError::NotRunning);
        }
        self.route(transition)
    }

    fn route(&mut self, transition: Transition<T, M>) -> Result<(), TransitionError> {
        match self.timing {
            ChangeTiming::Immediate => self.apply(transition.target),
            ChangeTiming::Deferred => {
                self.queued.push(transition.target);
                Ok(())
            }
        }
    }

    /// Shared transition executor for both timing policies. Validates,
    /// swaps current/previous, then runs `exit` on the old state *before*
    /// `enter` on the new one so no two states ever consider themselves
    /// current at once.
    fn apply(&mut self, target: Target<T, M>) -> Result<(), TransitionError> {
        match target {
            Target::Enter { slot, param } => {
                if slot.ty == self.current.ty {
                    warn!(
                        "fsm {:?}: rejected change to {}; already in a state of that type",
                        self.id, slot.name
                    );
                    return Err(TransitionError::SameState(slot.name));
                }
                debug!("fsm {:?}: {} -> {}", self.id, self.current.name, slot.name);
                let mut old = mem::replace(&mut self.current, slot);
                old.state.exit(&mut self.owner);
                self.current.state.enter(&mut self.owner, param.as_deref());
                self.previous = Some(old);
                Ok(())
            }
            Target::Previous => {
                let Some(previous) = self.previous.take() else {
                    warn!("fsm {:?}: revert requested but no previous state exists", self.id);
                    return Err(TransitionError::NoPrevious);
                };
                debug!(
                    "fsm {:?}: {} -> {} (revert)",
                    self.id, self.current.name, previous.name
                );
                let mut old = mem::replace(&mut self.current, previous);
                old.state.exit(&mut self.owner);
                self.current.state.enter(&mut self.owner, None);
                self.previous = Some(old);
                Ok(())
            }
        }
    }

    pub fn owner(&self) -> &T {
        &self.owner
    }

    pub fn owner_mut(&mut self) -> &mut T {
        &mut self.owner
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Whether the machine is actively ticking (`Running`; paused machines
    /// report `false`).
    pub fn is_running(&self) -> bool {
        self.phase == RunPhase::Running
    }

    /// Short type name of the current state, for logs and assertions.
    pub fn state_name(&self) -> &'static str {
        self.current.name
    }

    /// Whether the current state is of concrete type `S`.
    pub fn is_in_state<S: State<T, M>>(&self) -> bool {
        std::any::TypeId::of::<S>() == self.current.ty
    }

    /// Registry wiring: the id this machine reports in its one-shot
    /// disposal notification.
    pub(crate) fn attach_registry(&mut self, id: FsmId, disposal: Sender<FsmId>) {
        self.id = Some(id);
        self.disposal = Some(disposal);
    }
}
