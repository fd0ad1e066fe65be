//! In-memory port implementations for tests and headless runs.

use crate::context::TickContext;
use crate::cues::{Cue, CueDispatcher, CueEvent};
use crate::events::EventBus;
use crate::ports::{
    CollisionQueryPort, CuePort, HitInfo, NavigationPort, NullCuePort, TargetSample, TargetSource,
};
use crate::tracker::TargetSnapshot;
use ahash::AHashMap;
use glam::Vec3;
use parking_lot::Mutex;
use std::sync::Arc;
use vigil_common::{AgentId, Pose, PortError, PortResult, Tick};

// ============================================================================
// Navigation
// ============================================================================

#[derive(Debug, Clone)]
struct MockBody {
    pose: Pose,
    destination: Option<Vec3>,
    speed_scale: f32,
    requests: usize,
}

impl MockBody {
    fn at(pose: Pose) -> Self {
        Self {
            pose,
            destination: None,
            speed_scale: 1.0,
            requests: 0,
        }
    }
}

#[derive(Debug, Default)]
struct MockNavState {
    bodies: AHashMap<AgentId, MockBody>,
    unreachable: bool,
}

/// Navigation that only moves bodies when told to.
///
/// Routes are straight lines. Bodies stay put until [`MockNavigation::advance`]
/// or [`MockNavigation::place`] is called.
#[derive(Debug, Default)]
pub struct MockNavigation {
    state: Mutex<MockNavState>,
}

impl MockNavigation {
    /// Arrival tolerance used by `has_arrived`.
    pub const ARRIVAL_TOLERANCE: f32 = 0.05;

    /// Creates an empty navigation mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every destination request fail with [`PortError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Teleports a body, creating it if needed. Keeps its destination.
    pub fn place(&self, agent: AgentId, position: Vec3) {
        let mut state = self.state.lock();
        let body = state
            .bodies
            .entry(agent)
            .or_insert_with(|| MockBody::at(Pose::at(position)));
        body.pose = body.pose.moved_to(position);
    }

    /// Moves one body up to `step * speed_scale` toward its destination.
    pub fn advance(&self, agent: AgentId, step: f32) {
        if let Some(body) = self.state.lock().bodies.get_mut(&agent) {
            Self::move_body(body, step);
        }
    }

    /// Moves every body.
    pub fn advance_all(&self, step: f32) {
        for body in self.state.lock().bodies.values_mut() {
            Self::move_body(body, step);
        }
    }

    fn move_body(body: &mut MockBody, step: f32) {
        let Some(destination) = body.destination else {
            return;
        };
        let delta = destination - body.pose.position;
        let reach = step * body.speed_scale;
        let next = if delta.length() <= reach {
            destination
        } else {
            body.pose.position + delta.normalize_or_zero() * reach
        };
        body.pose = body.pose.facing_toward(destination).moved_to(next);
    }

    /// Last requested destination, cleared by `stop`.
    #[must_use]
    pub fn destination(&self, agent: AgentId) -> Option<Vec3> {
        self.state.lock().bodies.get(&agent).and_then(|b| b.destination)
    }

    /// Destination requests received, failed ones included.
    #[must_use]
    pub fn destination_requests(&self, agent: AgentId) -> usize {
        self.state.lock().bodies.get(&agent).map_or(0, |b| b.requests)
    }

    /// Current speed scale.
    #[must_use]
    pub fn speed_scale(&self, agent: AgentId) -> f32 {
        self.state.lock().bodies.get(&agent).map_or(1.0, |b| b.speed_scale)
    }

    /// Whether a body exists for `agent`.
    #[must_use]
    pub fn is_attached(&self, agent: AgentId) -> bool {
        self.state.lock().bodies.contains_key(&agent)
    }
}

impl NavigationPort for MockNavigation {
    fn set_destination(&self, agent: AgentId, destination: Vec3) -> PortResult<()> {
        let mut state = self.state.lock();
        let unreachable = state.unreachable;
        let body = state
            .bodies
            .entry(agent)
            .or_insert_with(|| MockBody::at(Pose::default()));
        body.requests += 1;
        if unreachable {
            return Err(PortError::Unreachable);
        }
        body.destination = Some(destination);
        Ok(())
    }

    fn remaining_distance(&self, agent: AgentId) -> f32 {
        self.state.lock().bodies.get(&agent).map_or(0.0, |b| {
            b.destination.map_or(0.0, |d| b.pose.distance_to(d))
        })
    }

    fn has_arrived(&self, agent: AgentId) -> bool {
        self.remaining_distance(agent) <= Self::ARRIVAL_TOLERANCE
    }

    fn pose(&self, agent: AgentId) -> Option<Pose> {
        self.state.lock().bodies.get(&agent).map(|b| b.pose)
    }

    fn set_speed_scale(&self, agent: AgentId, scale: f32) {
        if let Some(body) = self.state.lock().bodies.get_mut(&agent) {
            body.speed_scale = scale;
        }
    }

    fn stop(&self, agent: AgentId) {
        if let Some(body) = self.state.lock().bodies.get_mut(&agent) {
            body.destination = None;
        }
    }

    fn attach(&self, agent: AgentId, pose: Pose) {
        self.state.lock().bodies.insert(agent, MockBody::at(pose));
    }

    fn detach(&self, agent: AgentId) {
        self.state.lock().bodies.remove(&agent);
    }
}

// ============================================================================
// Collision queries
// ============================================================================

/// Canned ray answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayScript {
    /// Nothing in the way
    Clear,
    /// First hit is the target collider
    HitsTarget,
    /// First hit is an obstacle
    Blocked,
    /// The query itself fails
    Failing,
    /// The first `n` rays are blocked, later ones are clear
    ClearAfter(u32),
}

#[derive(Debug)]
struct RayState {
    script: RayScript,
    calls: u32,
}

/// Ray caster that answers from a [`RayScript`] and counts queries.
#[derive(Debug)]
pub struct ScriptedRayCaster {
    state: Mutex<RayState>,
}

impl ScriptedRayCaster {
    /// Creates a caster following `script`.
    #[must_use]
    pub fn new(script: RayScript) -> Self {
        Self {
            state: Mutex::new(RayState { script, calls: 0 }),
        }
    }

    /// Every ray is clear.
    #[must_use]
    pub fn clear() -> Self {
        Self::new(RayScript::Clear)
    }

    /// Every ray hits the target.
    #[must_use]
    pub fn hits_target() -> Self {
        Self::new(RayScript::HitsTarget)
    }

    /// Every ray hits an obstacle.
    #[must_use]
    pub fn blocked() -> Self {
        Self::new(RayScript::Blocked)
    }

    /// Every query fails.
    #[must_use]
    pub fn failing() -> Self {
        Self::new(RayScript::Failing)
    }

    /// The first `n` rays are blocked.
    #[must_use]
    pub fn clear_after(n: u32) -> Self {
        Self::new(RayScript::ClearAfter(n))
    }

    /// Queries answered so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.state.lock().calls
    }
}

impl CollisionQueryPort for ScriptedRayCaster {
    fn raycast(&self, origin: Vec3, target: Vec3) -> PortResult<Option<HitInfo>> {
        let mut state = self.state.lock();
        let call = state.calls;
        state.calls += 1;
        let distance = origin.distance(target);
        let hit = |is_target: bool| {
            Some(HitInfo {
                point: target,
                distance,
                is_target,
            })
        };
        match state.script {
            RayScript::Clear => Ok(None),
            RayScript::HitsTarget => Ok(hit(true)),
            RayScript::Blocked => Ok(hit(false)),
            RayScript::Failing => Err(PortError::QueryFailed("scripted failure".into())),
            RayScript::ClearAfter(n) if call < n => Ok(hit(false)),
            RayScript::ClearAfter(_) => Ok(None),
        }
    }
}

// ============================================================================
// Target
// ============================================================================

/// Target whose state is set by hand.
#[derive(Debug)]
pub struct ScriptedTarget {
    sample: Mutex<TargetSample>,
}

impl ScriptedTarget {
    /// Visible target at `position`.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            sample: Mutex::new(TargetSample {
                position,
                concealed: false,
            }),
        }
    }

    /// Moves the target.
    pub fn set_position(&self, position: Vec3) {
        self.sample.lock().position = position;
    }

    /// Hides or reveals the target.
    pub fn set_concealed(&self, concealed: bool) {
        self.sample.lock().concealed = concealed;
    }
}

impl TargetSource for ScriptedTarget {
    fn sample(&self) -> TargetSample {
        *self.sample.lock()
    }
}

// ============================================================================
// Cues
// ============================================================================

/// An owned copy of a received cue.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCue {
    /// Emitting agent
    pub agent: AgentId,
    /// Event
    pub event: CueEvent,
    /// Pattern tag payload
    pub pattern: Option<String>,
    /// Phase payload
    pub phase: Option<u8>,
    /// Hit-react flag
    pub hit_react: bool,
    /// Tick
    pub tick: Tick,
}

impl From<&Cue<'_>> for RecordedCue {
    fn from(cue: &Cue<'_>) -> Self {
        Self {
            agent: cue.agent,
            event: cue.event,
            pattern: cue.pattern.map(str::to_string),
            phase: cue.phase,
            hit_react: cue.hit_react,
            tick: cue.tick,
        }
    }
}

/// Cue port that keeps everything it receives.
#[derive(Debug, Default)]
pub struct RecordingCues {
    received: Mutex<Vec<RecordedCue>>,
}

impl RecordingCues {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Event names in arrival order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.received.lock().iter().map(|c| c.event.name()).collect()
    }

    /// Cues with the given event name.
    #[must_use]
    pub fn cues_named(&self, name: &str) -> Vec<RecordedCue> {
        self.received
            .lock()
            .iter()
            .filter(|c| c.event.name() == name)
            .cloned()
            .collect()
    }

    /// Cues emitted by one agent.
    #[must_use]
    pub fn for_agent(&self, agent: AgentId) -> Vec<RecordedCue> {
        self.received
            .lock()
            .iter()
            .filter(|c| c.agent == agent)
            .cloned()
            .collect()
    }

    /// Forgets everything.
    pub fn clear(&self) {
        self.received.lock().clear();
    }
}

impl CuePort for RecordingCues {
    fn cue(&self, cue: &Cue<'_>) {
        self.received.lock().push(cue.into());
    }
}

// ============================================================================
// Rig
// ============================================================================

/// Mock services for stepping a single agent by hand.
///
/// The recorder sits on the animation channel, which every cue is routed to,
/// so it sees each cue exactly once.
#[derive(Debug)]
pub struct MockRig {
    /// Navigation
    pub nav: MockNavigation,
    /// Animation-channel recorder
    pub recorder: Arc<RecordingCues>,
    /// Dispatcher wired to the recorder
    pub cues: CueDispatcher,
    /// Event bus
    pub events: EventBus,
}

impl Default for MockRig {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRig {
    /// Creates a rig.
    #[must_use]
    pub fn new() -> Self {
        let recorder = Arc::new(RecordingCues::new());
        Self {
            nav: MockNavigation::new(),
            cues: CueDispatcher::new(
                recorder.clone(),
                Arc::new(NullCuePort),
                Arc::new(NullCuePort),
            ),
            recorder,
            events: EventBus::new(1024),
        }
    }

    /// Context with the target at the origin.
    #[must_use]
    pub fn ctx(&self, tick: Tick) -> TickContext<'_> {
        self.ctx_at(tick, Vec3::ZERO)
    }

    /// Context with the target at `position`.
    #[must_use]
    pub fn ctx_at(&self, tick: Tick, position: Vec3) -> TickContext<'_> {
        TickContext {
            tick,
            target: TargetSnapshot {
                position,
                concealed: false,
                last_update: tick,
            },
            nav: &self.nav,
            cues: &self.cues,
            events: &self.events,
        }
    }
}
