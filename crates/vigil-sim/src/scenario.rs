//! In-process stand-ins for the host game and the scenario runner.
//!
//! Navigation walks agents in straight lines over flat ground, sight is
//! blocked by axis-aligned boxes, and cues are written to the log.

use crate::config::{CoverZone, Obstacle, SimConfig, TargetScript};
use ahash::AHashMap;
use anyhow::{Context, Result};
use glam::Vec3;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use vigil_ai::boss::BossState;
use vigil_ai::cues::{Cue, CueDispatcher};
use vigil_ai::events::AiEvent;
use vigil_ai::guard::GuardState;
use vigil_ai::ports::{
    CollisionQueryPort, CueChannel, CuePort, HitInfo, NavigationPort, TargetSample, TargetSource,
};
use vigil_ai::world::{AiPorts, AiWorld};
use vigil_common::{AgentId, Pose, PortError, PortResult, Tick};

// ============================================================================
// Navigation
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Body {
    pose: Pose,
    destination: Option<Vec3>,
    speed_scale: f32,
}

/// Straight-line movement over flat ground.
#[derive(Debug)]
pub struct FlatNavigation {
    speed: f32,
    obstacles: Vec<Obstacle>,
    bodies: Mutex<AHashMap<AgentId, Body>>,
}

impl FlatNavigation {
    /// Creates a navigator moving agents `speed` per tick.
    #[must_use]
    pub fn new(speed: f32, obstacles: Vec<Obstacle>) -> Self {
        Self {
            speed,
            obstacles,
            bodies: Mutex::new(AHashMap::new()),
        }
    }

    /// Moves every body one tick toward its destination.
    pub fn advance(&self) {
        for body in self.bodies.lock().values_mut() {
            let Some(destination) = body.destination else {
                continue;
            };
            let to_go = destination - body.pose.position;
            let step = self.speed * body.speed_scale;
            let next = if to_go.length() <= step {
                destination
            } else {
                body.pose.position + to_go.normalize_or_zero() * step
            };
            body.pose = body.pose.facing_toward(destination).moved_to(next);
        }
    }
}

impl NavigationPort for FlatNavigation {
    fn set_destination(&self, agent: AgentId, destination: Vec3) -> PortResult<()> {
        if self.obstacles.iter().any(|o| o.contains(destination)) {
            return Err(PortError::Unreachable);
        }
        match self.bodies.lock().get_mut(&agent) {
            Some(body) => {
                body.destination = Some(destination);
                Ok(())
            },
            None => Err(PortError::OffRoute),
        }
    }

    fn remaining_distance(&self, agent: AgentId) -> f32 {
        self.bodies.lock().get(&agent).map_or(0.0, |body| {
            body.destination
                .map_or(0.0, |d| body.pose.position.distance(d))
        })
    }

    fn has_arrived(&self, agent: AgentId) -> bool {
        self.remaining_distance(agent) <= f32::EPSILON
    }

    fn pose(&self, agent: AgentId) -> Option<Pose> {
        self.bodies.lock().get(&agent).map(|body| body.pose)
    }

    fn set_speed_scale(&self, agent: AgentId, scale: f32) {
        if let Some(body) = self.bodies.lock().get_mut(&agent) {
            body.speed_scale = scale;
        }
    }

    fn stop(&self, agent: AgentId) {
        if let Some(body) = self.bodies.lock().get_mut(&agent) {
            body.destination = None;
        }
    }

    fn attach(&self, agent: AgentId, pose: Pose) {
        self.bodies.lock().insert(
            agent,
            Body {
                pose,
                destination: None,
                speed_scale: 1.0,
            },
        );
    }

    fn detach(&self, agent: AgentId) {
        self.bodies.lock().remove(&agent);
    }
}

// ============================================================================
// Sight
// ============================================================================

/// Ray caster against a fixed set of boxes. The target has no collider, so
/// a clear segment reports no hit.
#[derive(Debug, Clone, Default)]
pub struct BoxRayCaster {
    obstacles: Vec<Obstacle>,
}

impl BoxRayCaster {
    /// Creates a caster over `obstacles`.
    #[must_use]
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }
}

/// Entry parameter in `[0, 1]` of the segment `origin + t * delta` into the
/// box, using the slab method.
fn segment_entry(origin: Vec3, delta: Vec3, obstacle: &Obstacle) -> Option<f32> {
    let mut t_min = 0.0_f32;
    let mut t_max = 1.0_f32;
    for axis in 0..3 {
        let (o, d) = (origin[axis], delta[axis]);
        let (lo, hi) = (obstacle.min[axis], obstacle.max[axis]);
        if d.abs() < f32::EPSILON {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let (a, b) = ((lo - o) / d, (hi - o) / d);
        t_min = t_min.max(a.min(b));
        t_max = t_max.min(a.max(b));
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

impl CollisionQueryPort for BoxRayCaster {
    fn raycast(&self, origin: Vec3, target: Vec3) -> PortResult<Option<HitInfo>> {
        let delta = target - origin;
        let nearest = self
            .obstacles
            .iter()
            .filter_map(|o| segment_entry(origin, delta, o))
            .min_by(f32::total_cmp);
        Ok(nearest.map(|t| HitInfo {
            point: origin + delta * t,
            distance: delta.length() * t,
            is_target: false,
        }))
    }
}

// ============================================================================
// Target
// ============================================================================

#[derive(Debug)]
struct Walker {
    position: Vec3,
    next: usize,
}

/// Target walking a waypoint loop, hidden inside cover zones.
#[derive(Debug)]
pub struct WaypointTarget {
    script: TargetScript,
    walker: Mutex<Walker>,
}

impl WaypointTarget {
    /// Starts the walk at the script's start position.
    #[must_use]
    pub fn new(script: TargetScript) -> Self {
        let walker = Walker {
            position: script.start,
            next: 0,
        };
        Self {
            script,
            walker: Mutex::new(walker),
        }
    }

    /// Walks one tick along the route.
    pub fn advance(&self) {
        let waypoints = &self.script.waypoints;
        if waypoints.is_empty() {
            return;
        }
        let mut walker = self.walker.lock();
        let goal = waypoints[walker.next % waypoints.len()];
        let to_go = goal - walker.position;
        if to_go.length() <= self.script.speed {
            walker.position = goal;
            walker.next = (walker.next + 1) % waypoints.len();
        } else {
            walker.position += to_go.normalize_or_zero() * self.script.speed;
        }
    }

    fn in_cover(zones: &[CoverZone], position: Vec3) -> bool {
        zones
            .iter()
            .any(|zone| zone.center.distance(position) <= zone.radius)
    }
}

impl TargetSource for WaypointTarget {
    fn sample(&self) -> TargetSample {
        let position = self.walker.lock().position;
        TargetSample {
            position,
            concealed: Self::in_cover(&self.script.cover, position),
        }
    }
}

// ============================================================================
// Cues
// ============================================================================

/// Writes cues to the log under the `vigil::cues` target.
#[derive(Debug, Clone, Copy)]
pub struct LoggedCues {
    channel: CueChannel,
}

impl LoggedCues {
    /// Sink for `channel`.
    #[must_use]
    pub fn new(channel: CueChannel) -> Self {
        Self { channel }
    }
}

impl CuePort for LoggedCues {
    fn cue(&self, cue: &Cue<'_>) {
        debug!(
            target: "vigil::cues",
            channel = ?self.channel,
            agent = %cue.agent,
            event = %cue.event,
            pattern = cue.pattern,
            phase = cue.phase,
            hit_react = cue.hit_react,
            tick = cue.tick,
            "cue"
        );
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Per-agent tallies collected from the event bus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentSummary {
    /// Transitions into each state
    pub entered: BTreeMap<String, u32>,
    /// Strikes that connected
    pub strikes: u32,
    /// Phase changes as `(from, to, tick)`
    pub phase_changes: Vec<(u8, u8, Tick)>,
    /// Tick of death
    pub died_at: Option<Tick>,
    /// Final state name, if the agent is still in the world
    pub final_state: Option<String>,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    /// Ticks run
    pub ticks: Tick,
    /// Visibility checks resolved
    pub checks: usize,
    /// Rays cast
    pub rays: u64,
    /// Largest queue left over after a tick
    pub peak_backlog: usize,
    /// Per-agent tallies keyed by agent id
    pub agents: BTreeMap<String, AgentSummary>,
}

/// A scenario wired to its in-process services.
pub struct Simulation {
    config: SimConfig,
    nav: Arc<FlatNavigation>,
    target: Arc<WaypointTarget>,
    world: AiWorld,
    summary: Summary,
}

impl Simulation {
    /// Builds the world and spawns every agent.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate().context("invalid scenario")?;
        let nav = Arc::new(FlatNavigation::new(config.agent_speed, config.obstacles.clone()));
        let target = Arc::new(WaypointTarget::new(config.target.clone()));
        let ports = AiPorts {
            nav: nav.clone(),
            rays: Arc::new(BoxRayCaster::new(config.obstacles.clone())),
            target: target.clone(),
            cues: CueDispatcher::new(
                Arc::new(LoggedCues::new(CueChannel::Animation)),
                Arc::new(LoggedCues::new(CueChannel::Audio)),
                Arc::new(LoggedCues::new(CueChannel::Haptic)),
            ),
        };
        let mut world = AiWorld::new(config.world.clone(), ports).context("invalid world config")?;

        for (i, guard) in config.guards.iter().enumerate() {
            world
                .spawn_guard(guard.config.clone(), Pose::at(guard.post))
                .with_context(|| format!("guard #{i}"))?;
        }
        for (i, boss) in config.bosses.iter().enumerate() {
            let boss_config = boss.resolve().with_context(|| format!("boss #{i} config"))?;
            world
                .spawn_boss(boss_config, Pose::at(boss.spawn))
                .with_context(|| format!("boss #{i}"))?;
        }
        info!(
            "Scenario ready: {} agents, {} obstacles",
            world.agent_count(),
            config.obstacles.len()
        );

        Ok(Self {
            config,
            nav,
            target,
            world,
            summary: Summary::default(),
        })
    }

    /// Runs one tick: scripted actions, target walk, AI tick, movement.
    pub fn step(&mut self) {
        let now = self.world.current_tick();
        for hit in self.config.hits.iter().filter(|h| h.tick == now) {
            let outcome = self.world.apply_damage(AgentId::from_raw(hit.agent), hit.amount);
            debug!("Scripted hit on agent#{} at tick {now}: {outcome:?}", hit.agent);
        }
        for stun in self.config.stuns.iter().filter(|s| s.tick == now) {
            let applied = self.world.stun(AgentId::from_raw(stun.agent), stun.ticks);
            debug!("Scripted stun on agent#{} at tick {now}: {applied}", stun.agent);
        }

        self.target.advance();
        let report = self.world.tick();
        self.nav.advance();

        self.summary.ticks = report.tick;
        self.summary.checks += report.perception.resolved;
        self.summary.rays += u64::from(report.perception.rays);
        self.summary.peak_backlog = self.summary.peak_backlog.max(report.perception.remaining);
        let events = self.world.events().drain();
        for event in events {
            self.record(event);
        }

        if self.config.report_every > 0 && report.tick % self.config.report_every == 0 {
            let chasing = self.world.guards_in(GuardState::Chasing).count();
            let fighting = self.world.bosses_in(BossState::Combat).count()
                + self.world.bosses_in(BossState::Attacking).count();
            info!(
                "tick {}: {} checks, backlog {}, {chasing} chasing, {fighting} engaged",
                report.tick,
                report.perception.resolved,
                report.perception.remaining
            );
        }
    }

    /// Runs the configured number of ticks and returns the tallies.
    pub fn run(mut self) -> Summary {
        for _ in 0..self.config.ticks {
            self.step();
        }
        for (id, agent) in self.world.agents() {
            self.summary
                .agents
                .entry(id.to_string())
                .or_default()
                .final_state = Some(agent.state_name().to_owned());
        }
        self.summary
    }

    fn agent(&mut self, id: AgentId) -> &mut AgentSummary {
        self.summary.agents.entry(id.to_string()).or_default()
    }

    fn record(&mut self, event: AiEvent) {
        match event {
            AiEvent::StateChanged { agent, to, .. } => {
                *self.agent(agent).entered.entry(to).or_default() += 1;
            },
            AiEvent::PhaseChanged {
                agent,
                from,
                to,
                tick,
            } => self.agent(agent).phase_changes.push((from, to, tick)),
            AiEvent::StrikeLanded { agent, .. } => self.agent(agent).strikes += 1,
            AiEvent::AgentDied { agent, tick } => self.agent(agent).died_at = Some(tick),
            AiEvent::TargetMoved { .. }
            | AiEvent::ConcealmentChanged { .. }
            | AiEvent::AgentDespawned { .. } => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BossSpawn, GuardSpawn, ScriptedHit};
    use vigil_ai::boss::BossConfig;
    use vigil_ai::guard::GuardConfig;

    fn wall() -> Obstacle {
        Obstacle {
            min: Vec3::new(4.0, 0.0, -1.0),
            max: Vec3::new(5.0, 3.0, 1.0),
        }
    }

    #[test]
    fn test_ray_blocked_by_box() {
        let rays = BoxRayCaster::new(vec![wall()]);
        let hit = rays
            .raycast(Vec3::new(0.0, 1.0, 0.0), Vec3::new(10.0, 1.0, 0.0))
            .expect("query")
            .expect("hit");
        assert!((hit.point.x - 4.0).abs() < 1e-4);
        assert!((hit.distance - 4.0).abs() < 1e-4);
        assert!(!hit.is_target);
    }

    #[test]
    fn test_ray_passes_over_box() {
        let rays = BoxRayCaster::new(vec![wall()]);
        let hit = rays
            .raycast(Vec3::new(0.0, 4.0, 0.0), Vec3::new(10.0, 4.0, 0.0))
            .expect("query");
        assert!(hit.is_none());
    }

    #[test]
    fn test_ray_stops_short_of_box() {
        let rays = BoxRayCaster::new(vec![wall()]);
        let hit = rays
            .raycast(Vec3::new(0.0, 1.0, 0.0), Vec3::new(3.0, 1.0, 0.0))
            .expect("query");
        assert!(hit.is_none());
    }

    #[test]
    fn test_navigation_walks_and_arrives() {
        let nav = FlatNavigation::new(1.0, vec![wall()]);
        let id = AgentId::from_raw(1);
        nav.attach(id, Pose::at(Vec3::ZERO));
        nav.set_destination(id, Vec3::new(0.0, 0.0, 2.5)).expect("route");
        nav.advance();
        assert!((nav.remaining_distance(id) - 1.5).abs() < 1e-5);
        nav.set_speed_scale(id, 2.0);
        nav.advance();
        assert!(nav.has_arrived(id));
        assert_eq!(
            nav.set_destination(id, Vec3::new(4.5, 1.0, 0.0)),
            Err(PortError::Unreachable)
        );
        assert_eq!(
            nav.set_destination(AgentId::from_raw(9), Vec3::ONE),
            Err(PortError::OffRoute)
        );
    }

    #[test]
    fn test_target_loops_and_hides() {
        let target = WaypointTarget::new(TargetScript {
            start: Vec3::ZERO,
            waypoints: vec![Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO],
            speed: 0.5,
            cover: vec![CoverZone {
                center: Vec3::new(1.0, 0.0, 0.0),
                radius: 0.25,
            }],
        });
        target.advance();
        assert!(!target.sample().concealed);
        target.advance();
        assert!(target.sample().concealed);
        target.advance();
        target.advance();
        assert_eq!(target.sample().position, Vec3::ZERO);
    }

    #[test]
    fn test_built_in_arena_runs() {
        let config = SimConfig {
            ticks: 400,
            ..SimConfig::default()
        };
        let summary = Simulation::new(config).expect("scenario").run();
        assert_eq!(summary.ticks, 400);
        assert!(summary.checks > 0);
        assert!(summary.rays >= summary.checks as u64);
        assert_eq!(summary.agents.len(), 3);
    }

    #[test]
    fn test_killing_blow_is_tallied() {
        let config = SimConfig {
            ticks: 20,
            guards: vec![GuardSpawn {
                post: Vec3::ZERO,
                config: GuardConfig {
                    max_health: Some(10.0),
                    ..GuardConfig::default()
                },
            }],
            bosses: Vec::new(),
            hits: vec![ScriptedHit {
                tick: 5,
                agent: 1,
                amount: 50.0,
            }],
            stuns: Vec::new(),
            ..SimConfig::default()
        };
        let summary = Simulation::new(config).expect("scenario").run();
        let guard = summary.agents.get("agent#1").expect("tallied");
        assert_eq!(guard.died_at, Some(5));
        assert_eq!(guard.final_state, None);
    }

    #[test]
    fn test_bad_boss_config_is_rejected() {
        let config = SimConfig {
            bosses: vec![BossSpawn {
                spawn: Vec3::ZERO,
                config_ron: None,
                config: BossConfig {
                    phases: Vec::new(),
                    ..BossConfig::default()
                },
            }],
            ..SimConfig::default()
        };
        assert!(Simulation::new(config).is_err());
    }
}
