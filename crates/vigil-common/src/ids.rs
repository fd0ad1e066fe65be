//! ID types for agents and the simulation clock.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One discrete simulation step.
pub type Tick = u64;

/// Unique identifier for an agent driven by a state machine.
///
/// Ids are handed out by an [`AgentIdAllocator`] owned by the simulation, so
/// two independent simulations never share a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(u64);

impl AgentId {
    /// Creates an agent ID from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid agent ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) agent ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// Hands out sequential agent ids, starting at 1.
#[derive(Debug, Clone)]
pub struct AgentIdAllocator {
    next: u64,
}

impl Default for AgentIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl AgentIdAllocator {
    /// Returns the next unused id.
    pub fn next_id(&mut self) -> AgentId {
        let id = AgentId(self.next);
        self.next += 1;
        id
    }
}

/// Number of ticks elapsed from `since` to `now`, saturating at zero.
#[must_use]
pub const fn ticks_since(since: Tick, now: Tick) -> Tick {
    now.saturating_sub(since)
}
