//! Cue events for animation, audio and haptics.

use crate::ports::{CueChannel, CuePort, NullCuePort};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use vigil_common::{AgentId, Tick};

/// Symbolic cue names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CueEvent {
    /// Boss intro sequence started
    Intro,
    /// Agent noticed the target
    Spotted,
    /// Agent gave up on a stale target position
    LostTarget,
    /// An attack began (windup or melee swing)
    AttackStart,
    /// A strike window resolved against the target
    Strike,
    /// Agent took damage
    Hit,
    /// Agent was stunned
    Stunned,
    /// Boss started retreating
    Retreat,
    /// Boss entered a phase transition lockout
    PhaseTransition,
    /// Agent died
    Death,
}

impl CueEvent {
    /// Symbolic name sent to the ports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Spotted => "spotted",
            Self::LostTarget => "lost_target",
            Self::AttackStart => "attack_start",
            Self::Strike => "strike",
            Self::Hit => "hit",
            Self::Stunned => "stunned",
            Self::Retreat => "retreat",
            Self::PhaseTransition => "phase_transition",
            Self::Death => "death",
        }
    }

    /// Channels this cue is routed to.
    #[must_use]
    pub const fn channels(self) -> &'static [CueChannel] {
        use CueChannel::{Animation, Audio, Haptic};
        match self {
            Self::LostTarget | Self::Retreat => &[Animation],
            Self::Intro | Self::Spotted | Self::AttackStart | Self::Stunned => &[Animation, Audio],
            Self::Strike | Self::Hit | Self::PhaseTransition | Self::Death => {
                &[Animation, Audio, Haptic]
            },
        }
    }
}

impl fmt::Display for CueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A cue with its payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cue<'a> {
    /// Emitting agent
    pub agent: AgentId,
    /// Event
    pub event: CueEvent,
    /// Attack pattern tag, when relevant
    pub pattern: Option<&'a str>,
    /// Boss phase index, when relevant
    pub phase: Option<u8>,
    /// Hit taken while a hit-react could be inserted
    pub hit_react: bool,
    /// Tick the cue was raised on
    pub tick: Tick,
}

impl<'a> Cue<'a> {
    /// Creates a cue with no payload.
    #[must_use]
    pub const fn new(agent: AgentId, event: CueEvent, tick: Tick) -> Self {
        Self {
            agent,
            event,
            pattern: None,
            phase: None,
            hit_react: false,
            tick,
        }
    }

    /// Attaches a pattern tag.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: &'a str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Attaches a phase index.
    #[must_use]
    pub const fn with_phase(mut self, phase: u8) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Marks the hit as allowing a hit-react.
    #[must_use]
    pub const fn with_hit_react(mut self, hit_react: bool) -> Self {
        self.hit_react = hit_react;
        self
    }

    /// Symbolic event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.event.name()
    }
}

/// Routes cues to the animation, audio and haptic ports.
#[derive(Clone)]
pub struct CueDispatcher {
    animation: Arc<dyn CuePort>,
    audio: Arc<dyn CuePort>,
    haptic: Arc<dyn CuePort>,
}

impl fmt::Debug for CueDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CueDispatcher").finish_non_exhaustive()
    }
}

impl Default for CueDispatcher {
    fn default() -> Self {
        Self::silent()
    }
}

impl CueDispatcher {
    /// Creates a dispatcher over three ports.
    #[must_use]
    pub fn new(
        animation: Arc<dyn CuePort>,
        audio: Arc<dyn CuePort>,
        haptic: Arc<dyn CuePort>,
    ) -> Self {
        Self {
            animation,
            audio,
            haptic,
        }
    }

    /// Uses the same port for every channel.
    #[must_use]
    pub fn uniform(port: Arc<dyn CuePort>) -> Self {
        Self::new(Arc::clone(&port), Arc::clone(&port), port)
    }

    /// Drops every cue.
    #[must_use]
    pub fn silent() -> Self {
        Self::uniform(Arc::new(NullCuePort))
    }

    /// Sends a cue to every channel it routes to.
    pub fn emit(&self, cue: &Cue<'_>) {
        for channel in cue.event.channels() {
            self.port(*channel).cue(cue);
        }
    }

    fn port(&self, channel: CueChannel) -> &dyn CuePort {
        match channel {
            CueChannel::Animation => self.animation.as_ref(),
            CueChannel::Audio => self.audio.as_ref(),
            CueChannel::Haptic => self.haptic.as_ref(),
        }
    }
}
