//! Guard archetype: holds a post, notices the target, chases and melees it,
//! then walks back once the trail goes cold.

use crate::context::TickContext;
use crate::cues::{Cue, CueEvent};
use crate::events::AiEvent;
use crate::fsm::{StateMachine, StateTag, TransitionTable};
use crate::health::{DamageOutcome, Health};
use crate::motion::PathRequester;
use crate::perception::{
    Awareness, CadenceConfig, PerceptionCadence, PerceptionRequest, PerceptionResult,
};
use crate::tracker::TargetSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::trace;
use vigil_common::{
    ensure_at_least, ensure_non_negative, ensure_positive, ensure_ticks, AgentId, ConfigResult,
    Pose, Tick,
};

// ============================================================================
// States
// ============================================================================

/// Guard FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardState {
    /// Idle at the post
    Guarding,
    /// Facing a newly seen target while the dwell timer runs
    Observing,
    /// Pursuing the last known target position
    Chasing,
    /// Melee engaged, movement frozen
    Attacking,
    /// Walking back to the post
    Returning,
}

impl StateTag for GuardState {
    fn name(self) -> &'static str {
        match self {
            Self::Guarding => "guarding",
            Self::Observing => "observing",
            Self::Chasing => "chasing",
            Self::Attacking => "attacking",
            Self::Returning => "returning",
        }
    }
}

/// Legal guard transitions.
pub fn guard_transitions() -> &'static TransitionTable<GuardState> {
    use GuardState::{Attacking, Chasing, Guarding, Observing, Returning};
    static TABLE: OnceLock<TransitionTable<GuardState>> = OnceLock::new();
    TABLE.get_or_init(|| {
        TransitionTable::new()
            .allow(Guarding, Observing)
            .allow(Guarding, Returning)
            .allow(Observing, Chasing)
            .allow(Chasing, Attacking)
            .allow(Chasing, Returning)
            .allow(Attacking, Chasing)
            .allow(Attacking, Attacking)
            .allow(Returning, Guarding)
            .allow(Returning, Observing)
    })
}

// ============================================================================
// Configuration
// ============================================================================

/// Guard tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Visibility range
    pub detection_radius: f32,
    /// Distance at which the guard starts swinging
    pub melee_radius: f32,
    /// Melee radius multiplier before an engaged guard gives chase again
    pub attack_hysteresis: f32,
    /// Ticks spent observing before committing to a chase
    pub observe_dwell_ticks: Tick,
    /// Ticks between swings
    pub attack_cooldown_ticks: Tick,
    /// Ticks between navigation requests
    pub path_recompute_ticks: Tick,
    /// Distance counted as arrived
    pub arrival_epsilon: f32,
    /// Damage per swing
    pub melee_damage: f32,
    /// Health pool; `None` makes the guard invulnerable
    pub max_health: Option<f32>,
    /// Perception re-request cadence
    pub cadence: CadenceConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            detection_radius: 10.0,
            melee_radius: 2.0,
            attack_hysteresis: 1.5,
            observe_dwell_ticks: 20,
            attack_cooldown_ticks: 30,
            path_recompute_ticks: 10,
            arrival_epsilon: 0.5,
            melee_damage: 10.0,
            max_health: Some(100.0),
            cadence: CadenceConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Checks radii, durations and the health pool.
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_positive("detection_radius", self.detection_radius)?;
        ensure_positive("melee_radius", self.melee_radius)?;
        ensure_positive("arrival_epsilon", self.arrival_epsilon)?;
        ensure_at_least("attack_hysteresis", self.attack_hysteresis, 1.0)?;
        ensure_non_negative("melee_damage", self.melee_damage)?;
        ensure_ticks("attack_cooldown_ticks", self.attack_cooldown_ticks)?;
        ensure_ticks("path_recompute_ticks", self.path_recompute_ticks)?;
        if let Some(max) = self.max_health {
            ensure_positive("max_health", max)?;
        }
        self.cadence.validate()
    }
}

// ============================================================================
// Guard
// ============================================================================

/// A guard-type agent.
#[derive(Debug, Clone)]
pub struct Guard {
    id: AgentId,
    config: GuardConfig,
    post: Pose,
    pose: Pose,
    machine: StateMachine<GuardState>,
    awareness: Awareness,
    cadence: PerceptionCadence,
    path: PathRequester,
    health: Option<Health>,
    swings: u32,
}

impl Guard {
    /// Creates a guard standing at `post`.
    pub fn new(id: AgentId, config: GuardConfig, post: Pose, tick: Tick) -> ConfigResult<Self> {
        config.validate()?;
        let health = config.max_health.map(Health::new).transpose()?;
        Ok(Self {
            id,
            cadence: PerceptionCadence::new(config.cadence.clone()),
            path: PathRequester::new(config.path_recompute_ticks),
            machine: StateMachine::new(guard_transitions(), GuardState::Guarding, tick),
            awareness: Awareness::default(),
            post,
            pose: post,
            health,
            swings: 0,
            config,
        })
    }

    /// Agent id.
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GuardState {
        self.machine.current()
    }

    /// State machine, for history queries.
    #[must_use]
    pub fn machine(&self) -> &StateMachine<GuardState> {
        &self.machine
    }

    /// Last known pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Post the guard returns to.
    #[must_use]
    pub fn post(&self) -> Pose {
        self.post
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// What the guard believes about the target.
    #[must_use]
    pub fn awareness(&self) -> &Awareness {
        &self.awareness
    }

    /// Health pool, if the guard can be hurt.
    #[must_use]
    pub fn health(&self) -> Option<&Health> {
        self.health.as_ref()
    }

    /// Swings started so far.
    #[must_use]
    pub fn swings(&self) -> u32 {
        self.swings
    }

    /// Builds a visibility request if the guard's cadence says one is due.
    pub fn perception_request(
        &mut self,
        tick: Tick,
        target: &TargetSnapshot,
    ) -> Option<PerceptionRequest> {
        let distance = self.pose.distance_to(target.position);
        self.cadence.poll(tick, distance).then_some(PerceptionRequest {
            agent: self.id,
            pose: self.pose,
            detection_radius: self.config.detection_radius,
            enqueued_at: tick,
        })
    }

    /// Advances the guard by one tick.
    pub fn step(&mut self, ctx: &TickContext<'_>, perception: Option<PerceptionResult>) {
        if let Some(pose) = ctx.nav.pose(self.id) {
            self.pose = pose;
        }
        let seen_now = match perception {
            Some(result) => {
                self.awareness.absorb(&result);
                result.visible
            },
            None => false,
        };

        match self.machine.current() {
            GuardState::Guarding => self.guarding(ctx, seen_now),
            GuardState::Observing => self.observing(ctx),
            GuardState::Chasing => self.chasing(ctx),
            GuardState::Attacking => self.attacking(ctx),
            GuardState::Returning => self.returning(ctx, seen_now),
        }
    }

    /// Applies damage, raising hit or death cues.
    ///
    /// The caller removes the guard on [`DamageOutcome::Depleted`].
    pub fn apply_damage(&mut self, amount: f32, ctx: &TickContext<'_>) -> DamageOutcome {
        let Some(health) = self.health.as_mut() else {
            return DamageOutcome::Ignored;
        };
        let outcome = health.apply_damage(amount);
        match outcome {
            DamageOutcome::Ignored => {},
            DamageOutcome::Hit { .. } => {
                ctx.cue(&Cue::new(self.id, CueEvent::Hit, ctx.tick));
            },
            DamageOutcome::Depleted => {
                ctx.cue(&Cue::new(self.id, CueEvent::Death, ctx.tick));
                ctx.publish(AiEvent::AgentDied {
                    agent: self.id,
                    tick: ctx.tick,
                });
            },
        }
        outcome
    }

    fn guarding(&mut self, ctx: &TickContext<'_>, seen_now: bool) {
        if seen_now {
            self.enter_observing(ctx);
        } else if self.pose.distance_to(self.post.position) > self.config.arrival_epsilon
            && ctx.transition(self.id, &mut self.machine, GuardState::Returning)
        {
            self.path.reset();
            self.path.request(ctx.nav, self.id, self.post.position, ctx.tick);
        }
    }

    fn observing(&mut self, ctx: &TickContext<'_>) {
        self.face_last_known();
        if self.machine.ticks_in_state(ctx.tick) < self.config.observe_dwell_ticks {
            return;
        }
        if ctx.transition(self.id, &mut self.machine, GuardState::Chasing) {
            self.path.reset();
            if let Some(target) = self.awareness.last_known {
                self.path.request(ctx.nav, self.id, target, ctx.tick);
            }
        }
    }

    fn chasing(&mut self, ctx: &TickContext<'_>) {
        let Some(target) = self.awareness.last_known else {
            self.enter_returning(ctx);
            return;
        };
        let distance = self.pose.distance_to(target);

        if self.awareness.visible && distance <= self.config.melee_radius {
            if ctx.transition(self.id, &mut self.machine, GuardState::Attacking) {
                ctx.nav.stop(self.id);
                self.swing(ctx);
            }
        } else if !self.awareness.visible
            && self
                .path
                .arrived(ctx.nav, self.id, &self.pose, target, self.config.arrival_epsilon)
        {
            self.enter_returning(ctx);
        } else {
            self.path.request(ctx.nav, self.id, target, ctx.tick);
        }
    }

    fn attacking(&mut self, ctx: &TickContext<'_>) {
        self.face_last_known();
        let out_of_reach = self.awareness.last_known.map_or(true, |target| {
            self.pose.distance_to(target) > self.config.melee_radius * self.config.attack_hysteresis
        });

        if !self.awareness.visible || out_of_reach {
            if ctx.transition(self.id, &mut self.machine, GuardState::Chasing) {
                self.path.reset();
                if let Some(target) = self.awareness.last_known {
                    self.path.request(ctx.nav, self.id, target, ctx.tick);
                }
            }
        } else if self.machine.ticks_in_state(ctx.tick) >= self.config.attack_cooldown_ticks
            && ctx.transition(self.id, &mut self.machine, GuardState::Attacking)
        {
            self.swing(ctx);
        }
    }

    fn returning(&mut self, ctx: &TickContext<'_>, seen_now: bool) {
        if seen_now {
            self.enter_observing(ctx);
            return;
        }
        let post = self.post.position;
        if self
            .path
            .arrived(ctx.nav, self.id, &self.pose, post, self.config.arrival_epsilon)
        {
            if ctx.transition(self.id, &mut self.machine, GuardState::Guarding) {
                ctx.nav.stop(self.id);
                self.awareness.clear();
                self.pose.facing = self.post.facing;
            }
        } else {
            self.path.request(ctx.nav, self.id, post, ctx.tick);
        }
    }

    fn enter_observing(&mut self, ctx: &TickContext<'_>) {
        if ctx.transition(self.id, &mut self.machine, GuardState::Observing) {
            ctx.nav.stop(self.id);
            self.face_last_known();
            ctx.cue(&Cue::new(self.id, CueEvent::Spotted, ctx.tick));
        }
    }

    fn enter_returning(&mut self, ctx: &TickContext<'_>) {
        if ctx.transition(self.id, &mut self.machine, GuardState::Returning) {
            ctx.cue(&Cue::new(self.id, CueEvent::LostTarget, ctx.tick));
            self.path.reset();
            self.path.request(ctx.nav, self.id, self.post.position, ctx.tick);
        }
    }

    fn swing(&mut self, ctx: &TickContext<'_>) {
        self.swings += 1;
        trace!(tick = ctx.tick, "{} swings (#{})", self.id, self.swings);
        ctx.cue(&Cue::new(self.id, CueEvent::AttackStart, ctx.tick));
        ctx.publish(AiEvent::StrikeLanded {
            agent: self.id,
            pattern: None,
            damage: self.config.melee_damage,
            tick: ctx.tick,
        });
    }

    fn face_last_known(&mut self) {
        if let Some(target) = self.awareness.last_known {
            self.pose = self.pose.facing_toward(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cues::CueDispatcher;
    use crate::events::EventBus;
    use crate::mock::{MockNavigation, RecordingCues};
    use glam::Vec3;
    use std::sync::Arc;

    struct Harness {
        nav: MockNavigation,
        cues: CueDispatcher,
        recorder: Arc<RecordingCues>,
        events: EventBus,
    }

    impl Harness {
        fn new() -> Self {
            let recorder = Arc::new(RecordingCues::new());
            Self {
                nav: MockNavigation::new(),
                cues: CueDispatcher::new(
                    recorder.clone(),
                    Arc::new(crate::ports::NullCuePort),
                    Arc::new(crate::ports::NullCuePort),
                ),
                recorder,
                events: EventBus::new(256),
            }
        }

        fn ctx(&self, tick: Tick) -> TickContext<'_> {
            TickContext {
                tick,
                target: TargetSnapshot {
                    position: Vec3::ZERO,
                    concealed: false,
                    last_update: tick,
                },
                nav: &self.nav,
                cues: &self.cues,
                events: &self.events,
            }
        }
    }

    fn config() -> GuardConfig {
        GuardConfig {
            observe_dwell_ticks: 3,
            attack_cooldown_ticks: 2,
            path_recompute_ticks: 2,
            cadence: CadenceConfig::every(1),
            ..GuardConfig::default()
        }
    }

    fn seen(x: f32, tick: Tick) -> Option<PerceptionResult> {
        Some(PerceptionResult {
            visible: true,
            target_position: Vec3::new(x, 0.0, 0.0),
            tick,
        })
    }

    fn unseen(tick: Tick) -> Option<PerceptionResult> {
        Some(PerceptionResult {
            visible: false,
            target_position: Vec3::ZERO,
            tick,
        })
    }

    fn guard(h: &Harness) -> Guard {
        let id = AgentId::from_raw(1);
        h.nav.place(id, Vec3::ZERO);
        Guard::new(id, config(), Pose::at(Vec3::ZERO), 0).expect("guard")
    }

    #[test]
    fn test_dwell_commits_to_chase_without_further_sightings() {
        let h = Harness::new();
        let mut g = guard(&h);

        g.step(&h.ctx(1), seen(8.0, 1));
        assert_eq!(g.state(), GuardState::Observing);
        g.step(&h.ctx(2), unseen(2));
        g.step(&h.ctx(3), unseen(3));
        assert_eq!(g.state(), GuardState::Observing);
        g.step(&h.ctx(4), unseen(4));
        assert_eq!(g.state(), GuardState::Chasing);
        assert_eq!(h.nav.destination(g.id()), Some(Vec3::new(8.0, 0.0, 0.0)));
        assert_eq!(h.recorder.names(), vec!["spotted"]);
    }

    #[test]
    fn test_lost_target_at_last_known_returns_to_post() {
        let h = Harness::new();
        let mut g = guard(&h);
        g.step(&h.ctx(1), seen(6.0, 1));
        for tick in 2..=4 {
            g.step(&h.ctx(tick), None);
        }
        assert_eq!(g.state(), GuardState::Chasing);

        // Reaches the stale point with the target gone.
        h.nav.place(g.id(), Vec3::new(6.0, 0.0, 0.0));
        g.step(&h.ctx(5), unseen(5));
        assert_eq!(g.state(), GuardState::Returning);
        assert_eq!(h.nav.destination(g.id()), Some(Vec3::ZERO));

        h.nav.place(g.id(), Vec3::new(0.2, 0.0, 0.0));
        g.step(&h.ctx(6), unseen(6));
        assert_eq!(g.state(), GuardState::Guarding);
        assert!(h.recorder.names().contains(&"lost_target"));
    }

    #[test]
    fn test_lost_sight_mid_route_keeps_chasing() {
        let h = Harness::new();
        let mut g = guard(&h);
        g.step(&h.ctx(1), seen(6.0, 1));
        for tick in 2..=4 {
            g.step(&h.ctx(tick), None);
        }
        h.nav.place(g.id(), Vec3::new(3.0, 0.0, 0.0));
        g.step(&h.ctx(5), unseen(5));
        assert_eq!(g.state(), GuardState::Chasing);
    }

    #[test]
    fn test_attack_self_transition_after_cooldown() {
        let h = Harness::new();
        let mut g = guard(&h);
        g.step(&h.ctx(1), seen(1.5, 1));
        for tick in 2..=4 {
            g.step(&h.ctx(tick), seen(1.5, tick));
        }
        assert_eq!(g.state(), GuardState::Chasing);
        g.step(&h.ctx(5), seen(1.5, 5));
        assert_eq!(g.state(), GuardState::Attacking);
        assert_eq!(g.swings(), 1);

        g.step(&h.ctx(6), seen(1.5, 6));
        assert_eq!(g.swings(), 1);
        g.step(&h.ctx(7), seen(1.5, 7));
        assert_eq!(g.swings(), 2);

        let last = g.machine().last_transition().expect("recorded");
        assert!(last.is_reentry());
        assert_eq!(last.tick, 7);

        let strikes = h
            .events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, AiEvent::StrikeLanded { .. }))
            .count();
        assert_eq!(strikes, 2);
    }

    #[test]
    fn test_hysteresis_band() {
        let h = Harness::new();
        let mut g = guard(&h);
        g.step(&h.ctx(1), seen(1.0, 1));
        for tick in 2..=5 {
            g.step(&h.ctx(tick), seen(1.0, tick));
        }
        assert_eq!(g.state(), GuardState::Attacking);

        // 2.5 is outside melee but inside 1.5x melee.
        g.step(&h.ctx(6), seen(2.5, 6));
        assert_eq!(g.state(), GuardState::Attacking);
        g.step(&h.ctx(7), seen(3.5, 7));
        assert_eq!(g.state(), GuardState::Chasing);
    }

    #[test]
    fn test_visibility_loss_breaks_attack() {
        let h = Harness::new();
        let mut g = guard(&h);
        g.step(&h.ctx(1), seen(1.0, 1));
        for tick in 2..=5 {
            g.step(&h.ctx(tick), seen(1.0, tick));
        }
        g.step(&h.ctx(6), unseen(6));
        assert_eq!(g.state(), GuardState::Chasing);
    }

    #[test]
    fn test_unreachable_stalls_in_chase() {
        let h = Harness::new();
        h.nav.set_unreachable(true);
        let mut g = guard(&h);
        g.step(&h.ctx(1), seen(9.0, 1));
        for tick in 2..=20 {
            g.step(&h.ctx(tick), unseen(tick));
        }
        assert_eq!(g.state(), GuardState::Chasing);
        // One request entering the chase at tick 4, then every 2 ticks.
        assert_eq!(h.nav.destination_requests(g.id()), 9);
    }

    #[test]
    fn test_redetect_while_returning() {
        let h = Harness::new();
        let mut g = guard(&h);
        g.step(&h.ctx(1), seen(6.0, 1));
        for tick in 2..=4 {
            g.step(&h.ctx(tick), None);
        }
        h.nav.place(g.id(), Vec3::new(6.0, 0.0, 0.0));
        g.step(&h.ctx(5), unseen(5));
        assert_eq!(g.state(), GuardState::Returning);

        g.step(&h.ctx(6), seen(9.0, 6));
        assert_eq!(g.state(), GuardState::Observing);
    }

    #[test]
    fn test_damage_to_death() {
        let h = Harness::new();
        let mut g = guard(&h);
        assert!(matches!(
            g.apply_damage(40.0, &h.ctx(1)),
            DamageOutcome::Hit { .. }
        ));
        assert_eq!(g.apply_damage(80.0, &h.ctx(2)), DamageOutcome::Depleted);
        assert_eq!(h.recorder.names(), vec!["hit", "death"]);
        assert!(h
            .events
            .drain()
            .iter()
            .any(|e| matches!(e, AiEvent::AgentDied { tick: 2, .. })));
    }

    #[test]
    fn test_invulnerable_guard_ignores_damage() {
        let h = Harness::new();
        let id = AgentId::from_raw(3);
        let mut g = Guard::new(
            id,
            GuardConfig {
                max_health: None,
                ..config()
            },
            Pose::default(),
            0,
        )
        .expect("guard");
        assert_eq!(g.apply_damage(1000.0, &h.ctx(1)), DamageOutcome::Ignored);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = GuardConfig {
            melee_radius: 0.0,
            ..GuardConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = GuardConfig {
            attack_hysteresis: 0.5,
            ..GuardConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_cadence_gates_requests() {
        let mut g = Guard::new(
            AgentId::from_raw(1),
            GuardConfig {
                cadence: CadenceConfig {
                    near_distance: 5.0,
                    near_interval: 1,
                    far_interval: 4,
                },
                ..config()
            },
            Pose::default(),
            0,
        )
        .expect("guard");
        let far = TargetSnapshot {
            position: Vec3::new(30.0, 0.0, 0.0),
            concealed: false,
            last_update: 0,
        };
        assert!(g.perception_request(1, &far).is_some());
        assert!(g.perception_request(2, &far).is_none());
        assert!(g.perception_request(5, &far).is_some());
    }
}
