//! Interfaces to the external collaborators the AI core calls through.
//!
//! None of these are implemented here beyond the test doubles in
//! [`crate::mock`]. Every port is `Send + Sync` and takes `&self`, so a host
//! may tick agents from several threads.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use vigil_common::{AgentId, Pose, PortResult};

/// Turns destinations into followable routes and moves agent bodies.
pub trait NavigationPort: Send + Sync {
    /// Requests a route for `agent` to `destination`.
    fn set_destination(&self, agent: AgentId, destination: Vec3) -> PortResult<()>;

    /// Remaining route length, or zero when idle or unknown.
    fn remaining_distance(&self, agent: AgentId) -> f32;

    /// Whether the agent reached its last requested destination.
    fn has_arrived(&self, agent: AgentId) -> bool;

    /// Current body pose, if the navigation service tracks this agent.
    fn pose(&self, agent: AgentId) -> Option<Pose>;

    /// Scales the agent's movement speed.
    fn set_speed_scale(&self, _agent: AgentId, _scale: f32) {}

    /// Freezes the agent in place until the next destination request.
    fn stop(&self, _agent: AgentId) {}

    /// Creates the navigation handle for a freshly spawned agent.
    fn attach(&self, _agent: AgentId, _pose: Pose) {}

    /// Releases the navigation handle of a despawned agent.
    fn detach(&self, _agent: AgentId) {}
}

/// A single ray hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitInfo {
    /// World-space hit point
    pub point: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
    /// Whether the collider hit belongs to the tracked target
    pub is_target: bool,
}

/// Collision queries, used only by the visibility probe.
pub trait CollisionQueryPort: Send + Sync {
    /// Casts a ray from `origin` to `target` and returns the first hit.
    ///
    /// `Ok(None)` means nothing lies between the two points.
    fn raycast(&self, origin: Vec3, target: Vec3) -> PortResult<Option<HitInfo>>;
}

/// The live target's true state, sampled by the target tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSample {
    /// Target feet position
    pub position: Vec3,
    /// Whether the target is hidden (e.g. crouched in cover)
    pub concealed: bool,
}

/// Source of the live target's pose.
pub trait TargetSource: Send + Sync {
    /// Samples the target right now.
    fn sample(&self) -> TargetSample;
}

/// Output channel for cue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CueChannel {
    /// Animation state graph
    Animation,
    /// Sound effects
    Audio,
    /// Controller/VR haptics
    Haptic,
}

/// Fire-and-forget receiver of cue events.
///
/// Implementations must not block; the signature leaves no way to fail the
/// calling transition.
pub trait CuePort: Send + Sync {
    /// Receives a cue.
    fn cue(&self, cue: &crate::cues::Cue<'_>);
}

/// A cue port that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCuePort;

impl CuePort for NullCuePort {
    fn cue(&self, _cue: &crate::cues::Cue<'_>) {}
}
