//! The behavioral unit a machine runs: the [`State`] trait and the values
//! its hooks exchange with the engine.
//!
//! States are plain types implementing [`State`] with four overridable
//! hooks, all defaulted to no-ops. Hooks never call back into the machine;
//! instead `update` and `on_message` *return* transition requests
//! ([`Transition`] / [`Reply`]), which the engine applies under its
//! configured timing policy. That keeps state logic free of any machine
//! borrow and makes transition intent explicit in the signature.
//!
//! # Example
//!
//! ```ignore
//! struct Idle;
//!
//! impl State<Enemy, EnemyMsg> for Idle {
//!     fn on_message(&mut self, owner: &mut Enemy, msg: &EnemyMsg) -> Reply<Enemy, EnemyMsg> {
//!         match msg {
//!             EnemyMsg::Hurt(dmg) => {
//!                 owner.hp -= dmg;
//!                 Reply::with_transition(Transition::to(Attack::default()))
//!             }
//!             _ => Reply::none(),
//!         }
//!     }
//! }
//! ```
//!
//! # Related
//!
//! - [`crate::fsm::machine::Fsm`] – the engine that drives these hooks

use std::any::{Any, TypeId};

/// Opaque parameter handed to [`State::enter`] by the transition that
/// targeted it.
pub type StateParam = Box<dyn Any>;

/// Opaque response returned from [`State::on_message`] to the caller of
/// [`Fsm::on_message`](crate::fsm::machine::Fsm::on_message).
pub type StateResponse = Box<dyn Any>;

/// A unit of behavior for an owner of type `T` reacting to messages of
/// type `M`.
///
/// Lifecycle while current: `enter` exactly once, `update` zero or more
/// times, `exit` exactly once. A global state attached to a machine gets
/// only `update` and `on_message`; the engine never enters or exits it.
pub trait State<T: 'static, M: 'static>: Any {
    /// Called once when this state becomes current. `param` is whatever the
    /// requesting transition attached.
    fn enter(&mut self, _owner: &mut T, _param: Option<&dyn Any>) {}

    /// Called once per tick while current (unless a queued transition batch
    /// supersedes the tick). Return a [`Transition`] to request a change.
    fn update(&mut self, _owner: &mut T) -> Option<Transition<T, M>> {
        None
    }

    /// Called once when this state stops being current.
    fn exit(&mut self, _owner: &mut T) {}

    /// Called for every message dispatched while the machine is running.
    fn on_message(&mut self, _owner: &mut T, _msg: &M) -> Reply<T, M> {
        Reply::none()
    }
}

/// Boxed state plus the identity captured at the request site. The engine
/// needs the concrete `TypeId` for same-type rejection and the name for
/// transition logs; both are erased once the state is boxed, so they are
/// recorded here while the type is still known.
pub(crate) struct Slot<T, M> {
    pub(crate) state: Box<dyn State<T, M>>,
    pub(crate) ty: TypeId,
    pub(crate) name: &'static str,
}

impl<T: 'static, M: 'static> Slot<T, M> {
    pub(crate) fn new<S: State<T, M>>(state: S) -> Self {
        Slot {
            state: Box::new(state),
            ty: TypeId::of::<S>(),
            name: short_type_name::<S>(),
        }
    }
}

/// Last path segment of a type name, for readable transition logs.
fn short_type_name<S>() -> &'static str {
    let full = std::any::type_name::<S>();
    full.rsplit("::").next().unwrap_or(full)
}

/// A requested state change, produced by state hooks or by external calls
/// to [`Fsm::change_state`](crate::fsm::machine::Fsm::change_state).
pub struct Transition<T, M> {
    pub(crate) target: Target<T, M>,
}

pub(crate) enum Target<T, M> {
    Enter {
        slot: Slot<T, M>,
        param: Option<StateParam>,
    },
    Previous,
}

impl<T: 'static, M: 'static> Transition<T, M> {
    /// Request a change to `state`, entering it with no parameter.
    pub fn to<S: State<T, M>>(state: S) -> Self {
        Transition {
            target: Target::Enter {
                slot: Slot::new(state),
                param: None,
            },
        }
    }

    /// Request a change to `state`, passing `param` to its `enter` hook.
    pub fn to_with<S: State<T, M>>(state: S, param: impl Any) -> Self {
        Transition {
            target: Target::Enter {
                slot: Slot::new(state),
                param: Some(Box::new(param)),
            },
        }
    }

    /// Request a return to the machine's previous state (single level, no
    /// parameter).
    pub fn revert() -> Self {
        Transition {
            target: Target::Previous,
        }
    }
}

/// What [`State::on_message`] hands back: an optional opaque response for
/// the message's caller, and an optional transition request.
pub struct Reply<T, M> {
    pub response: Option<StateResponse>,
    pub transition: Option<Transition<T, M>>,
}

impl<T: 'static, M: 'static> Reply<T, M> {
    /// Neither a response nor a transition.
    pub fn none() -> Self {
        Reply {
            response: None,
            transition: None,
        }
    }

    /// A response for the caller, no transition.
    pub fn with_response(value: impl Any) -> Self {
        Reply {
            response: Some(Box::new(value)),
            transition: None,
        }
    }

    /// A transition request, no response.
    pub fn with_transition(transition: Transition<T, M>) -> Self {
        Reply {
            response: None,
            transition: Some(transition),
        }
    }

    /// Both a response and a transition request.
    pub fn respond_and_transition(value: impl Any, transition: Transition<T, M>) -> Self {
        Reply {
            response: Some(Box::new(value)),
            transition: Some(transition),
        }
    }
}

impl<T: 'static, M: 'static> Default for Reply<T, M> {
    fn default() -> Self {
        Self::none()
    }
}
