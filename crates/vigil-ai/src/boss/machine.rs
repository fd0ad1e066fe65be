//! Boss state machine.
//!
//! Layers combat phases, staged attack patterns, a probabilistic retreat and
//! stuns on top of the same observe/approach/engage skeleton the guard uses.
//!
//! Per-tick order: dead bosses are skipped; pose and perception are folded
//! in; depleted health kills the boss unless a phase transition is running;
//! a newly derived phase preempts everything except the intro and a running
//! transition; finally the current state's handler runs.

use super::config::BossConfig;
use super::pattern::{AttackSequence, AttackStage, PatternCatalog};
use super::phase::PhaseTable;
use super::selector::{
    select_pattern, CombatContext, PatternSelector, SeededSelector, SelectionRequest,
};
use crate::context::TickContext;
use crate::cues::{Cue, CueEvent};
use crate::events::AiEvent;
use crate::fsm::{StateMachine, StateTag, TransitionTable};
use crate::health::{DamageOutcome, Health};
use crate::motion::PathRequester;
use crate::perception::{Awareness, PerceptionCadence, PerceptionRequest, PerceptionResult};
use crate::tracker::TargetSnapshot;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, info, trace};
use vigil_common::{ticks_since, AgentId, ConfigResult, Pose, Tick};

/// Boss FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BossState {
    /// Non-interactive entrance
    Intro,
    /// Walking the patrol route
    Patrol,
    /// Dwell after first sighting
    Observing,
    /// Closing distance to the last known position
    Approaching,
    /// Engaged; decides between attacking and retreating
    Combat,
    /// Executing an attack pattern
    Attacking,
    /// Backing away at low health
    Retreating,
    /// Phase change lockout
    PhaseTransition,
    /// Stunned by an outside hit
    Stunned,
    /// Terminal
    Dead,
}

impl StateTag for BossState {
    fn name(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Patrol => "patrol",
            Self::Observing => "observing",
            Self::Approaching => "approaching",
            Self::Combat => "combat",
            Self::Attacking => "attacking",
            Self::Retreating => "retreating",
            Self::PhaseTransition => "phase_transition",
            Self::Stunned => "stunned",
            Self::Dead => "dead",
        }
    }

    fn is_terminal(self) -> bool {
        self == Self::Dead
    }
}

/// Legal boss transitions.
pub fn boss_transitions() -> &'static TransitionTable<BossState> {
    use BossState::{
        Approaching, Attacking, Combat, Dead, Intro, Observing, Patrol, PhaseTransition,
        Retreating, Stunned,
    };
    static TABLE: OnceLock<TransitionTable<BossState>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let active = [Patrol, Observing, Approaching, Combat, Attacking, Retreating];
        TransitionTable::new()
            .allow(Intro, Patrol)
            .allow(Patrol, Observing)
            .allow(Observing, Approaching)
            .allow(Approaching, Combat)
            .allow(Approaching, Patrol)
            .allow(Combat, Attacking)
            .allow(Combat, Approaching)
            .allow(Combat, Retreating)
            .allow(Attacking, Combat)
            .allow(Retreating, Approaching)
            .allow(PhaseTransition, Combat)
            .allow(Stunned, Combat)
            .allow_from(&active, Stunned)
            .allow_from(&active, PhaseTransition)
            .allow(Stunned, PhaseTransition)
            .allow_from(&active, Dead)
            .allow_from(&[Intro, Stunned], Dead)
    })
}

/// A boss-type agent.
#[derive(Debug)]
pub struct Boss {
    id: AgentId,
    config: BossConfig,
    catalog: PatternCatalog,
    phases: PhaseTable,
    home: Pose,
    pose: Pose,
    machine: StateMachine<BossState>,
    health: Health,
    phase: u8,
    awareness: Awareness,
    cadence: PerceptionCadence,
    path: PathRequester,
    combat: CombatContext,
    sequence: Option<AttackSequence>,
    selector: Box<dyn PatternSelector>,
    waypoint: usize,
    stun_until: Tick,
    last_retreat_roll: Option<Tick>,
    retreat_point: Option<Vec3>,
    died_at: Option<Tick>,
}

impl Boss {
    /// Creates a boss in its intro at `spawn`.
    ///
    /// The random source is seeded from the config seed mixed with the id, so
    /// two bosses sharing a config still diverge.
    pub fn new(id: AgentId, config: BossConfig, spawn: Pose, tick: Tick) -> ConfigResult<Self> {
        let tables = config.tables()?;
        let health = Health::new(config.max_health)?;
        Ok(Self {
            id,
            catalog: tables.catalog,
            phases: tables.phases,
            home: spawn,
            pose: spawn,
            machine: StateMachine::new(boss_transitions(), BossState::Intro, tick),
            health,
            phase: 1,
            awareness: Awareness::default(),
            cadence: PerceptionCadence::new(config.cadence.clone()),
            path: PathRequester::new(config.path_recompute_ticks),
            combat: CombatContext::default(),
            sequence: None,
            selector: Box::new(SeededSelector::new(config.seed ^ id.raw())),
            waypoint: 0,
            stun_until: 0,
            last_retreat_roll: None,
            retreat_point: None,
            died_at: None,
            config,
        })
    }

    /// Replaces the random source.
    #[must_use]
    pub fn with_selector(mut self, selector: Box<dyn PatternSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Raises the intro cue and applies the first phase's speed.
    pub fn announce(&self, ctx: &TickContext<'_>) {
        ctx.nav
            .set_speed_scale(self.id, self.phases.get(self.phase).speed_multiplier);
        ctx.cue(&Cue::new(self.id, CueEvent::Intro, ctx.tick).with_phase(self.phase));
    }

    /// Agent id.
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BossState {
        self.machine.current()
    }

    /// State machine, for history queries.
    #[must_use]
    pub fn machine(&self) -> &StateMachine<BossState> {
        &self.machine
    }

    /// Current phase index (1-based).
    #[must_use]
    pub fn phase(&self) -> u8 {
        self.phase
    }

    /// Phase table.
    #[must_use]
    pub fn phases(&self) -> &PhaseTable {
        &self.phases
    }

    /// Health pool.
    #[must_use]
    pub fn health(&self) -> &Health {
        &self.health
    }

    /// Last known pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Attack bookkeeping.
    #[must_use]
    pub fn combat(&self) -> &CombatContext {
        &self.combat
    }

    /// In-flight attack, if any.
    #[must_use]
    pub fn sequence(&self) -> Option<&AttackSequence> {
        self.sequence.as_ref()
    }

    /// What the boss believes about the target.
    #[must_use]
    pub fn awareness(&self) -> &Awareness {
        &self.awareness
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &BossConfig {
        &self.config
    }

    /// Whether the boss is dead.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.machine.current() == BossState::Dead
    }

    /// Tick the boss died on.
    #[must_use]
    pub fn died_at(&self) -> Option<Tick> {
        self.died_at
    }

    /// Builds a visibility request if one is due.
    ///
    /// Bosses in their intro or dead never ask.
    pub fn perception_request(
        &mut self,
        tick: Tick,
        target: &TargetSnapshot,
    ) -> Option<PerceptionRequest> {
        if matches!(self.state(), BossState::Intro | BossState::Dead) {
            return None;
        }
        let distance = self.pose.distance_to(target.position);
        self.cadence.poll(tick, distance).then_some(PerceptionRequest {
            agent: self.id,
            pose: self.pose,
            detection_radius: self.config.detection_radius,
            enqueued_at: tick,
        })
    }

    /// Advances the boss by one tick.
    pub fn step(&mut self, ctx: &TickContext<'_>, perception: Option<PerceptionResult>) {
        let state = self.machine.current();
        if state == BossState::Dead {
            return;
        }
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

        if state != BossState::PhaseTransition && self.health.is_depleted() {
            self.die(ctx);
            return;
        }
        if !matches!(state, BossState::Intro | BossState::PhaseTransition) {
            let derived = self.phases.phase_for_ratio(self.health.ratio());
            if derived > self.phase {
                self.enter_phase_transition(derived, ctx);
                return;
            }
        }

        match state {
            BossState::Intro => self.intro(ctx),
            BossState::Patrol => self.patrol(ctx, seen_now),
            BossState::Observing => self.observing(ctx),
            BossState::Approaching => self.approaching(ctx),
            BossState::Combat => self.combat_decision(ctx),
            BossState::Attacking => self.attacking(ctx),
            BossState::Retreating => self.retreating(ctx),
            BossState::PhaseTransition => self.phase_lockout(ctx),
            BossState::Stunned => self.stunned(ctx),
            BossState::Dead => {},
        }
    }

    /// Applies damage.
    ///
    /// Ignored during the intro and once dead. Death itself is resolved on
    /// the next step so a running phase transition can defer it.
    pub fn apply_damage(&mut self, amount: f32, ctx: &TickContext<'_>) -> DamageOutcome {
        let state = self.machine.current();
        if matches!(state, BossState::Intro | BossState::Dead) {
            return DamageOutcome::Ignored;
        }
        let outcome = self.health.apply_damage(amount);
        if outcome != DamageOutcome::Ignored {
            let hit_react = state == BossState::Attacking
                && self
                    .sequence
                    .as_ref()
                    .is_some_and(|seq| seq.stage == AttackStage::Recovery);
            ctx.cue(
                &Cue::new(self.id, CueEvent::Hit, ctx.tick)
                    .with_phase(self.phase)
                    .with_hit_react(hit_react),
            );
            trace!(
                "{} took {amount} damage, {:.0}% left",
                self.id,
                self.health.ratio() * 100.0
            );
        }
        outcome
    }

    /// Stuns the boss for `ticks`.
    ///
    /// Accepted from patrol, observing, approaching, combat, retreating, and
    /// from attacking during windup or recovery. A stun while already
    /// stunned extends it. Returns whether the stun took effect.
    pub fn stun(&mut self, ticks: Tick, ctx: &TickContext<'_>) -> bool {
        if ticks == 0 {
            return false;
        }
        let until = ctx.tick.saturating_add(ticks);
        match self.machine.current() {
            BossState::Stunned => {
                self.stun_until = self.stun_until.max(until);
                true
            },
            BossState::Attacking
                if self
                    .sequence
                    .as_ref()
                    .is_some_and(|seq| seq.stage == AttackStage::Strike) =>
            {
                false
            },
            BossState::Patrol
            | BossState::Observing
            | BossState::Approaching
            | BossState::Combat
            | BossState::Attacking
            | BossState::Retreating => {
                if !ctx.transition(self.id, &mut self.machine, BossState::Stunned) {
                    return false;
                }
                self.sequence = None;
                self.retreat_point = None;
                self.stun_until = until;
                ctx.nav.stop(self.id);
                ctx.nav.set_speed_scale(self.id, self.speed_multiplier());
                ctx.cue(&Cue::new(self.id, CueEvent::Stunned, ctx.tick).with_phase(self.phase));
                true
            },
            BossState::Intro | BossState::PhaseTransition | BossState::Dead => false,
        }
    }

    fn speed_multiplier(&self) -> f32 {
        self.phases.get(self.phase).speed_multiplier
    }

    fn die(&mut self, ctx: &TickContext<'_>) {
        if !ctx.transition(self.id, &mut self.machine, BossState::Dead) {
            return;
        }
        self.sequence = None;
        self.died_at = Some(ctx.tick);
        ctx.nav.stop(self.id);
        ctx.cue(&Cue::new(self.id, CueEvent::Death, ctx.tick).with_phase(self.phase));
        ctx.publish(AiEvent::AgentDied {
            agent: self.id,
            tick: ctx.tick,
        });
        info!("{} died in phase {} at tick {}", self.id, self.phase, ctx.tick);
    }

    fn enter_phase_transition(&mut self, to: u8, ctx: &TickContext<'_>) {
        if !ctx.transition(self.id, &mut self.machine, BossState::PhaseTransition) {
            return;
        }
        let from = self.phase;
        self.phase = to;
        self.sequence = None;
        self.retreat_point = None;
        ctx.nav.stop(self.id);
        ctx.nav.set_speed_scale(self.id, self.speed_multiplier());
        ctx.cue(&Cue::new(self.id, CueEvent::PhaseTransition, ctx.tick).with_phase(to));
        ctx.publish(AiEvent::PhaseChanged {
            agent: self.id,
            from,
            to,
            tick: ctx.tick,
        });
        info!("{} phase {from} -> {to} at tick {}", self.id, ctx.tick);
    }

    fn intro(&mut self, ctx: &TickContext<'_>) {
        if self.machine.ticks_in_state(ctx.tick) >= self.config.intro_ticks
            && ctx.transition(self.id, &mut self.machine, BossState::Patrol)
        {
            self.path.reset();
        }
    }

    fn patrol(&mut self, ctx: &TickContext<'_>, seen_now: bool) {
        if seen_now {
            if ctx.transition(self.id, &mut self.machine, BossState::Observing) {
                ctx.nav.stop(self.id);
                self.face_last_known();
                ctx.cue(&Cue::new(self.id, CueEvent::Spotted, ctx.tick));
            }
            return;
        }

        let epsilon = self.config.arrival_epsilon;
        let route = &self.config.patrol_route;
        if route.is_empty() {
            let home = self.home.position;
            if self.pose.distance_to(home) > epsilon {
                self.path.request(ctx.nav, self.id, home, ctx.tick);
            }
            return;
        }

        let mut waypoint = route[self.waypoint % route.len()];
        if self
            .path
            .arrived(ctx.nav, self.id, &self.pose, waypoint, epsilon)
        {
            self.waypoint = (self.waypoint + 1) % route.len();
            waypoint = route[self.waypoint];
            self.path.reset();
            trace!("{} heading to waypoint {}", self.id, self.waypoint);
        }
        self.path.request(ctx.nav, self.id, waypoint, ctx.tick);
    }

    fn observing(&mut self, ctx: &TickContext<'_>) {
        self.face_last_known();
        if self.machine.ticks_in_state(ctx.tick) < self.config.observe_dwell_ticks {
            return;
        }
        if ctx.transition(self.id, &mut self.machine, BossState::Approaching) {
            self.path.reset();
            if let Some(target) = self.awareness.last_known {
                self.path.request(ctx.nav, self.id, target, ctx.tick);
            }
        }
    }

    fn approaching(&mut self, ctx: &TickContext<'_>) {
        let Some(target) = self.awareness.last_known else {
            self.lose_target(ctx);
            return;
        };
        let distance = self.pose.distance_to(target);
        if self.awareness.visible && distance <= self.config.engage_radius {
            if ctx.transition(self.id, &mut self.machine, BossState::Combat) {
                ctx.nav.stop(self.id);
                self.face_last_known();
            }
        } else if !self.awareness.visible
            && self
                .path
                .arrived(ctx.nav, self.id, &self.pose, target, self.config.arrival_epsilon)
        {
            self.lose_target(ctx);
        } else {
            self.path.request(ctx.nav, self.id, target, ctx.tick);
        }
    }

    fn lose_target(&mut self, ctx: &TickContext<'_>) {
        if ctx.transition(self.id, &mut self.machine, BossState::Patrol) {
            ctx.cue(&Cue::new(self.id, CueEvent::LostTarget, ctx.tick));
            self.awareness.clear();
            self.path.reset();
        }
    }

    fn combat_decision(&mut self, ctx: &TickContext<'_>) {
        self.face_last_known();
        let distance = self
            .awareness
            .last_known
            .map_or(f32::INFINITY, |target| self.pose.distance_to(target));
        let leash = self.config.engage_radius * self.config.disengage_factor;

        if !self.awareness.visible || distance > leash {
            if ctx.transition(self.id, &mut self.machine, BossState::Approaching) {
                self.path.reset();
                if let Some(target) = self.awareness.last_known {
                    self.path.request(ctx.nav, self.id, target, ctx.tick);
                }
            }
            return;
        }

        if self.roll_retreat(ctx.tick) {
            self.enter_retreat(ctx);
            return;
        }

        let regular_ready = ctx.tick >= self.combat.ready_at;
        if (regular_ready || self.special_ready(ctx.tick))
            && self.start_attack(ctx, distance, regular_ready)
        {
            return;
        }
        // Nothing in reach: keep closing in.
        if regular_ready || distance > self.config.engage_radius {
            if let Some(target) = self.awareness.last_known {
                self.path.request(ctx.nav, self.id, target, ctx.tick);
            }
        }
    }

    fn special_ready(&self, tick: Tick) -> bool {
        self.phase == self.phases.final_index()
            && self
                .combat
                .special_ready(tick, self.config.special_cooldown_ticks)
    }

    fn roll_retreat(&mut self, tick: Tick) -> bool {
        let retreat = &self.config.retreat;
        if self.health.ratio() >= retreat.health_threshold {
            return false;
        }
        if let Some(last) = self.last_retreat_roll {
            if ticks_since(last, tick) < retreat.roll_interval_ticks {
                return false;
            }
        }
        self.last_retreat_roll = Some(tick);
        let roll = self.selector.chance(retreat.chance);
        debug!("{} retreat roll at tick {tick}: {roll}", self.id);
        roll
    }

    fn enter_retreat(&mut self, ctx: &TickContext<'_>) {
        if !ctx.transition(self.id, &mut self.machine, BossState::Retreating) {
            return;
        }
        let threat = self.awareness.last_known.unwrap_or(ctx.target.position);
        let mut away = (self.pose.position - threat).normalize_or_zero();
        away.y = 0.0;
        if away == Vec3::ZERO {
            away = -self.pose.facing;
        }
        let point = self.pose.position + away.normalize_or_zero() * self.config.retreat.distance;
        self.retreat_point = Some(point);
        ctx.nav.set_speed_scale(
            self.id,
            self.speed_multiplier() * self.config.retreat.speed_scale,
        );
        self.path.reset();
        self.path.request(ctx.nav, self.id, point, ctx.tick);
        ctx.cue(&Cue::new(self.id, CueEvent::Retreat, ctx.tick).with_phase(self.phase));
    }

    fn retreating(&mut self, ctx: &TickContext<'_>) {
        if self.machine.ticks_in_state(ctx.tick) >= self.config.retreat.duration_ticks {
            if ctx.transition(self.id, &mut self.machine, BossState::Approaching) {
                self.retreat_point = None;
                ctx.nav.set_speed_scale(self.id, self.speed_multiplier());
                self.path.reset();
                if let Some(target) = self.awareness.last_known {
                    self.path.request(ctx.nav, self.id, target, ctx.tick);
                }
            }
        } else if let Some(point) = self.retreat_point {
            self.path.request(ctx.nav, self.id, point, ctx.tick);
        }
    }

    fn start_attack(&mut self, ctx: &TickContext<'_>, distance: f32, regular_ready: bool) -> bool {
        let request = SelectionRequest {
            phase: self.phases.get(self.phase),
            final_phase: self.phase == self.phases.final_index(),
            tick: ctx.tick,
            special_cooldown: self.config.special_cooldown_ticks,
            regular_ready,
            distance,
        };
        let Some(pattern) =
            select_pattern(&self.catalog, &self.combat, request, self.selector.as_mut())
        else {
            return false;
        };
        if !ctx.transition(self.id, &mut self.machine, BossState::Attacking) {
            return false;
        }
        self.combat.record(pattern, ctx.tick);
        self.sequence = Some(AttackSequence::start(pattern, ctx.tick));
        ctx.nav.stop(self.id);
        ctx.cue(
            &Cue::new(self.id, CueEvent::AttackStart, ctx.tick)
                .with_pattern(&pattern.tag)
                .with_phase(self.phase),
        );
        debug!("{} starts '{}' at tick {}", self.id, pattern.tag, ctx.tick);
        true
    }

    fn attacking(&mut self, ctx: &TickContext<'_>) {
        let Some(sequence) = self.sequence.as_mut() else {
            ctx.transition(self.id, &mut self.machine, BossState::Combat);
            return;
        };
        let Some(pattern) = self.catalog.get(&sequence.pattern) else {
            self.sequence = None;
            ctx.transition(self.id, &mut self.machine, BossState::Combat);
            return;
        };

        let progress = sequence.advance(pattern, ctx.tick);
        if progress.strike_resolved {
            let distance = self.pose.distance_to(ctx.target.position);
            if distance <= pattern.range {
                ctx.cue(
                    &Cue::new(self.id, CueEvent::Strike, ctx.tick)
                        .with_pattern(&pattern.tag)
                        .with_phase(self.phase),
                );
                ctx.publish(AiEvent::StrikeLanded {
                    agent: self.id,
                    pattern: Some(pattern.tag.clone()),
                    damage: pattern.damage,
                    tick: ctx.tick,
                });
            } else {
                trace!(
                    "{} '{}' missed: target {distance:.1} away, range {}",
                    self.id,
                    pattern.tag,
                    pattern.range
                );
            }
        }
        if progress.finished {
            self.combat.ready_at = ctx.tick.saturating_add(pattern.cooldown_ticks);
            self.sequence = None;
            ctx.transition(self.id, &mut self.machine, BossState::Combat);
        }
    }

    fn phase_lockout(&mut self, ctx: &TickContext<'_>) {
        if self.machine.ticks_in_state(ctx.tick) >= self.config.phase_transition_ticks {
            ctx.transition(self.id, &mut self.machine, BossState::Combat);
        }
    }

    fn stunned(&mut self, ctx: &TickContext<'_>) {
        if ctx.tick >= self.stun_until {
            ctx.transition(self.id, &mut self.machine, BossState::Combat);
        }
    }

    fn face_last_known(&mut self) {
        if let Some(target) = self.awareness.last_known {
            self.pose = self.pose.facing_toward(target);
        }
    }
}
