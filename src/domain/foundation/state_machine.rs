//! Event-driven state machine trait.
//!
//! Implementors describe their lifecycle as a static edge table of
//! `(from, event, to)` triples and get transition evaluation, reachability
//! checks and event enumeration for free.
//!
//! # Example
//!
//! ```ignore
//! impl StateMachine for LifecycleState {
//!     type Event = LifecycleEvent;
//!
//!     fn edges() -> &'static [(Self, Self::Event, Self)] {
//!         &[(Trialing, PaymentSuccess, Active), /* ... */]
//!     }
//! }
//!
//! let result = LifecycleState::Active.transition(LifecycleEvent::PaymentFailure);
//! assert!(result.valid);
//! ```

use super::ValidationError;

/// Outcome of evaluating an event against a state.
///
/// An invalid transition leaves `state` unchanged; callers decide whether
/// that is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionResult<S> {
    pub valid: bool,
    pub state: S,
}

/// Trait for lifecycle enums driven by named events.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug + 'static {
    /// The events that drive this machine.
    type Event: Copy + PartialEq + std::fmt::Debug + 'static;

    /// Every allowed `(from, event, to)` edge.
    fn edges() -> &'static [(Self, Self::Event, Self)];

    /// Evaluates `event` from the current state. Never fails.
    fn transition(&self, event: Self::Event) -> TransitionResult<Self> {
        Self::edges()
            .iter()
            .find(|(from, ev, _)| from == self && *ev == event)
            .map(|(_, _, to)| TransitionResult {
                valid: true,
                state: *to,
            })
            .unwrap_or(TransitionResult {
                valid: false,
                state: *self,
            })
    }

    /// Performs the transition, returning an error when no edge matches.
    fn apply(&self, event: Self::Event) -> Result<Self, ValidationError> {
        let result = self.transition(event);
        if result.valid {
            Ok(result.state)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Event {:?} is not allowed from {:?}", event, self),
            ))
        }
    }

    /// Returns true if some event moves `from` directly to `to`.
    fn is_valid_transition(from: Self, to: Self) -> bool {
        Self::edges().iter().any(|(f, _, t)| *f == from && *t == to)
    }

    /// Returns the events accepted from the current state, in edge order.
    fn valid_events(&self) -> Vec<Self::Event> {
        Self::edges()
            .iter()
            .filter(|(from, _, _)| from == self)
            .map(|(_, event, _)| *event)
            .collect()
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_events().is_empty()
    }
}
