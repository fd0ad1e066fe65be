//! Per-tick view of the shared services handed to agent state machines.

use crate::cues::{Cue, CueDispatcher};
use crate::events::{AiEvent, EventBus};
use crate::fsm::{StateMachine, StateTag};
use crate::ports::NavigationPort;
use crate::tracker::TargetSnapshot;
use tracing::{debug, warn};
use vigil_common::{AgentId, Tick};

/// Everything an agent may touch while stepping.
///
/// The target snapshot is a copy taken once per tick, so agents stepped from
/// different threads agree on where the target is.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    /// Current tick
    pub tick: Tick,
    /// Target state for this tick
    pub target: TargetSnapshot,
    /// Navigation service
    pub nav: &'a dyn NavigationPort,
    /// Cue fan-out
    pub cues: &'a CueDispatcher,
    /// Event bus
    pub events: &'a EventBus,
}

impl std::fmt::Debug for TickContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickContext")
            .field("tick", &self.tick)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl TickContext<'_> {
    /// Sends a cue.
    pub fn cue(&self, cue: &Cue<'_>) {
        self.cues.emit(cue);
    }

    /// Publishes an event.
    pub fn publish(&self, event: AiEvent) {
        self.events.publish(event);
    }

    /// Drives `machine` to `to`, logging and publishing on success.
    ///
    /// Refused transitions are logged and leave the machine untouched.
    pub fn transition<S: StateTag>(
        &self,
        agent: AgentId,
        machine: &mut StateMachine<S>,
        to: S,
    ) -> bool {
        match machine.transition(to, self.tick) {
            Ok(record) => {
                debug!(
                    tick = self.tick,
                    "{agent}: {} -> {}",
                    record.from.name(),
                    record.to.name()
                );
                self.publish(AiEvent::StateChanged {
                    agent,
                    from: record.from.name().to_string(),
                    to: record.to.name().to_string(),
                    tick: self.tick,
                });
                true
            },
            Err(e) => {
                warn!("{agent}: transition refused: {e}");
                false
            },
        }
    }
}
