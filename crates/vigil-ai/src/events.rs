//! Event bus for inter-system communication.
//!
//! Everything published here is fire-and-forget: agent logic never depends on
//! anyone draining the bus.

use crossbeam_channel::{bounded, Receiver, Sender};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use vigil_common::{AgentId, Tick};

/// Events that can be sent through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AiEvent {
    /// Tracked target moved further than the tracker's epsilon
    TargetMoved {
        /// Previous cached position
        from: Vec3,
        /// New cached position
        to: Vec3,
        /// Refresh tick
        tick: Tick,
    },
    /// Tracked target's concealment flag flipped
    ConcealmentChanged {
        /// New flag value
        concealed: bool,
        /// Refresh tick
        tick: Tick,
    },
    /// An agent changed state (self-transitions included)
    StateChanged {
        /// Agent
        agent: AgentId,
        /// Previous state name
        from: String,
        /// New state name
        to: String,
        /// Transition tick
        tick: Tick,
    },
    /// A boss entered a new combat phase
    PhaseChanged {
        /// Boss
        agent: AgentId,
        /// Previous phase index
        from: u8,
        /// New phase index
        to: u8,
        /// Transition tick
        tick: Tick,
    },
    /// An attack connected with the target
    StrikeLanded {
        /// Attacker
        agent: AgentId,
        /// Pattern tag, if the attacker uses patterns
        pattern: Option<String>,
        /// Damage dealt
        damage: f32,
        /// Strike tick
        tick: Tick,
    },
    /// An agent's health reached zero
    AgentDied {
        /// Agent
        agent: AgentId,
        /// Death tick
        tick: Tick,
    },
    /// An agent was removed from the simulation
    AgentDespawned {
        /// Agent
        agent: AgentId,
        /// Removal tick
        tick: Tick,
    },
}

/// Event bus for broadcasting events to subscribers.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<AiEvent>,
    /// Receiver for collecting events
    receiver: Receiver<AiEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self { sender, receiver }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: AiEvent) {
        // Non-blocking send - if full, event is dropped
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<AiEvent> {
        self.receiver.try_iter().collect()
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<AiEvent> {
        self.sender.clone()
    }
}
