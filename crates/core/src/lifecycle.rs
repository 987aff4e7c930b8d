//! Status state machine shared by every lifecycle-driven aggregate.
//!
//! Each status enum declares its legal edges once, in [`Lifecycle::TRANSITIONS`].
//! Aggregates expose their status slot and state-entry timestamps through
//! [`Tracked`], and every status change goes through [`transition`]:
//!
//! - an edge missing from the table is rejected and the entity is untouched
//! - re-applying the current state is an idempotent no-op
//! - a state-entry timestamp is written only while it is still unset

use chrono::{DateTime, Utc};

use crate::error::{DomainError, DomainResult};

/// A closed set of states with a fixed directed graph of legal transitions.
pub trait Lifecycle:
    Copy + Eq + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static
{
    /// Entity kind used in error messages (e.g. `"order"`).
    const KIND: &'static str;

    /// Legal `(from, to)` edges.
    const TRANSITIONS: &'static [(Self, Self)];

    /// State new entities start in.
    fn initial() -> Self;

    fn can_transition_to(self, target: Self) -> bool {
        Self::TRANSITIONS.contains(&(self, target))
    }

    /// A state with no outgoing edges.
    fn is_terminal(self) -> bool {
        !Self::TRANSITIONS.iter().any(|(from, _)| *from == self)
    }
}

/// An entity whose status slot of lifecycle `L` is driven by [`transition`].
///
/// Generic over `L` so one aggregate can carry several orthogonal lifecycles
/// (an order has both a fulfilment status and a payment status).
pub trait Tracked<L: Lifecycle> {
    fn current(&self) -> L;

    fn set_current(&mut self, state: L);

    /// The entry-timestamp slot recorded when `state` is entered, if any.
    fn entry_timestamp(&mut self, _state: L) -> Option<&mut Option<DateTime<Utc>>> {
        None
    }
}

/// What a successful [`transition`] did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransitionOutcome<L> {
    /// The entity moved along a legal edge.
    Moved { from: L, to: L },
    /// The entity was already in the target state.
    Unchanged,
}

impl<L> TransitionOutcome<L> {
    pub fn moved(&self) -> bool {
        matches!(self, TransitionOutcome::Moved { .. })
    }
}

/// Move `entity` to `target`, stamping the entry timestamp at most once.
pub fn transition<L, T>(entity: &mut T, target: L, at: DateTime<Utc>) -> DomainResult<TransitionOutcome<L>>
where
    L: Lifecycle,
    T: Tracked<L> + ?Sized,
{
    let from = entity.current();
    if from != target && !from.can_transition_to(target) {
        return Err(DomainError::invalid_transition(L::KIND, from, target));
    }

    entity.set_current(target);
    if let Some(slot) = entity.entry_timestamp(target) {
        if slot.is_none() {
            *slot = Some(at);
        }
    }

    if from == target {
        Ok(TransitionOutcome::Unchanged)
    } else {
        Ok(TransitionOutcome::Moved { from, to: target })
    }
}
