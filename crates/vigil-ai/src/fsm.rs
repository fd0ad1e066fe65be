//! Shared state machine skeleton.
//!
//! Each agent archetype declares its states as a plain enum implementing
//! [`StateTag`] and a static [`TransitionTable`] listing the legal edges. A
//! [`StateMachine`] tracks the current state, when it was entered and a
//! bounded history of transitions. Archetype behaviour lives in the owning
//! agent; the machine only refuses edges the table does not list.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use vigil_common::{ticks_since, Tick};

/// Transitions retained per machine.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// A state enum usable by [`StateMachine`].
pub trait StateTag: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Stable state name used in logs and events.
    fn name(self) -> &'static str;

    /// Terminal states refuse every outgoing transition.
    fn is_terminal(self) -> bool {
        false
    }
}

/// Errors raised by refused transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsmError {
    /// The archetype's table has no such edge
    #[error("Illegal transition {from} -> {to}")]
    Illegal {
        /// Current state name
        from: &'static str,
        /// Requested state name
        to: &'static str,
    },

    /// The machine is in a terminal state
    #[error("State {0} is terminal")]
    Terminal(&'static str),
}

/// Legal edges for one archetype.
#[derive(Debug, Clone)]
pub struct TransitionTable<S: StateTag> {
    edges: Vec<(S, S)>,
}

impl<S: StateTag> Default for TransitionTable<S> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

impl<S: StateTag> TransitionTable<S> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one edge.
    #[must_use]
    pub fn allow(mut self, from: S, to: S) -> Self {
        if !self.allows(from, to) {
            self.edges.push((from, to));
        }
        self
    }

    /// Adds an edge from each of `from` into `to`.
    #[must_use]
    pub fn allow_from(mut self, from: &[S], to: S) -> Self {
        for state in from {
            self = self.allow(*state, to);
        }
        self
    }

    /// Whether `from -> to` is listed.
    #[must_use]
    pub fn allows(&self, from: S, to: S) -> bool {
        self.edges.iter().any(|&(f, t)| f == from && t == to)
    }

    /// States reachable in one step from `from`.
    pub fn successors(&self, from: S) -> impl Iterator<Item = S> + '_ {
        self.edges
            .iter()
            .filter(move |(f, _)| *f == from)
            .map(|(_, t)| *t)
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the table has no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// One recorded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    /// Previous state
    pub from: S,
    /// New state
    pub to: S,
    /// Tick of the transition
    pub tick: Tick,
}

impl<S: StateTag> TransitionRecord<S> {
    /// Whether this was a self-transition.
    #[must_use]
    pub fn is_reentry(&self) -> bool {
        self.from == self.to
    }
}

/// Current state plus bounded history.
#[derive(Debug, Clone)]
pub struct StateMachine<S: StateTag> {
    table: &'static TransitionTable<S>,
    current: S,
    entered_at: Tick,
    history: VecDeque<TransitionRecord<S>>,
    history_capacity: usize,
    transitions: u64,
}

impl<S: StateTag> StateMachine<S> {
    /// Creates a machine in `initial`, entered at `tick`.
    #[must_use]
    pub fn new(table: &'static TransitionTable<S>, initial: S, tick: Tick) -> Self {
        Self::with_history_capacity(table, initial, tick, DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates a machine keeping at most `capacity` history records.
    #[must_use]
    pub fn with_history_capacity(
        table: &'static TransitionTable<S>,
        initial: S,
        tick: Tick,
        capacity: usize,
    ) -> Self {
        Self {
            table,
            current: initial,
            entered_at: tick,
            history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            history_capacity: capacity,
            transitions: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> S {
        self.current
    }

    /// Tick the current state was entered.
    #[must_use]
    pub fn entered_at(&self) -> Tick {
        self.entered_at
    }

    /// Ticks spent in the current state as of `now`.
    #[must_use]
    pub fn ticks_in_state(&self, now: Tick) -> Tick {
        ticks_since(self.entered_at, now)
    }

    /// Moves to `to` at `tick`.
    ///
    /// A self-transition is recorded like any other and restarts the state
    /// timer.
    pub fn transition(&mut self, to: S, tick: Tick) -> Result<TransitionRecord<S>, FsmError> {
        if self.current.is_terminal() {
            return Err(FsmError::Terminal(self.current.name()));
        }
        if !self.table.allows(self.current, to) {
            return Err(FsmError::Illegal {
                from: self.current.name(),
                to: to.name(),
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            tick,
        };
        self.current = to;
        self.entered_at = tick;
        self.transitions += 1;
        if self.history_capacity > 0 {
            if self.history.len() == self.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(record);
        }
        Ok(record)
    }

    /// Retained transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TransitionRecord<S>> + '_ {
        self.history.iter()
    }

    /// Most recent transition.
    #[must_use]
    pub fn last_transition(&self) -> Option<&TransitionRecord<S>> {
        self.history.back()
    }

    /// Total transitions ever made, including ones evicted from history.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// The archetype table.
    #[must_use]
    pub fn table(&self) -> &'static TransitionTable<S> {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
        Broken,
    }

    impl StateTag for Light {
        fn name(self) -> &'static str {
            match self {
                Self::Red => "red",
                Self::Green => "green",
                Self::Broken => "broken",
            }
        }

        fn is_terminal(self) -> bool {
            self == Self::Broken
        }
    }

    fn table() -> &'static TransitionTable<Light> {
        static TABLE: OnceLock<TransitionTable<Light>> = OnceLock::new();
        TABLE.get_or_init(|| {
            TransitionTable::new()
                .allow(Light::Red, Light::Green)
                .allow(Light::Green, Light::Red)
                .allow(Light::Green, Light::Green)
                .allow_from(&[Light::Red, Light::Green], Light::Broken)
        })
    }

    #[test]
    fn test_legal_transition_resets_timer() {
        let mut fsm = StateMachine::new(table(), Light::Red, 0);
        assert_eq!(fsm.ticks_in_state(5), 5);
        let record = fsm.transition(Light::Green, 5).expect("legal");
        assert_eq!(record.from, Light::Red);
        assert_eq!(fsm.current(), Light::Green);
        assert_eq!(fsm.ticks_in_state(7), 2);
    }

    #[test]
    fn test_illegal_transition_refused() {
        let mut fsm = StateMachine::new(table(), Light::Red, 0);
        let err = fsm.transition(Light::Red, 1).expect_err("no red self-edge");
        assert_eq!(
            err,
            FsmError::Illegal {
                from: "red",
                to: "red"
            }
        );
        assert_eq!(fsm.current(), Light::Red);
        assert_eq!(fsm.transition_count(), 0);
    }

    #[test]
    fn test_self_transition_is_recorded() {
        let mut fsm = StateMachine::new(table(), Light::Green, 0);
        fsm.transition(Light::Green, 3).expect("self edge");
        let last = fsm.last_transition().expect("recorded");
        assert!(last.is_reentry());
        assert_eq!(fsm.entered_at(), 3);
    }

    #[test]
    fn test_terminal_refuses_everything() {
        let mut fsm = StateMachine::new(table(), Light::Red, 0);
        fsm.transition(Light::Broken, 1).expect("legal");
        assert_eq!(
            fsm.transition(Light::Green, 2),
            Err(FsmError::Terminal("broken"))
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let mut fsm = StateMachine::with_history_capacity(table(), Light::Red, 0, 3);
        for tick in 1..=10 {
            let next = if fsm.current() == Light::Red {
                Light::Green
            } else {
                Light::Red
            };
            fsm.transition(next, tick).expect("legal");
        }
        assert_eq!(fsm.history().count(), 3);
        assert_eq!(fsm.transition_count(), 10);
        assert_eq!(fsm.history().next().map(|r| r.tick), Some(8));
    }

    #[test]
    fn test_successors() {
        let next: Vec<Light> = table().successors(Light::Green).collect();
        assert_eq!(next, vec![Light::Red, Light::Green, Light::Broken]);
    }
}
