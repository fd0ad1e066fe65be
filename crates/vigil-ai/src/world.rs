//! Tick orchestration over every agent in one simulation.
//!
//! An [`AiWorld`] owns its tracker, scheduler and event bus outright, so two
//! worlds never share state. Each tick runs in a fixed order:
//!
//! 1. the tracker re-samples the target
//! 2. agents whose cadence is due enqueue visibility requests
//! 3. the scheduler resolves up to its budget
//! 4. agents step in id order, each taking its own result if one is ready

use crate::boss::{Boss, BossConfig, BossState};
use crate::context::TickContext;
use crate::cues::CueDispatcher;
use crate::events::{AiEvent, EventBus};
use crate::guard::{Guard, GuardConfig, GuardState};
use crate::health::DamageOutcome;
use crate::perception::{PerceptionConfig, PerceptionScheduler, SchedulerReport};
use crate::ports::{CollisionQueryPort, NavigationPort, TargetSource};
use crate::tracker::{TargetTracker, TrackerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use vigil_common::{AgentId, AgentIdAllocator, ConfigResult, Pose, Tick};

/// World-level tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Perception budget and probe heights
    pub perception: PerceptionConfig,
    /// Target cache refresh
    pub tracker: TrackerConfig,
    /// Event bus capacity; zero picks the default
    pub event_capacity: usize,
}

impl WorldConfig {
    /// Validates nested configs.
    pub fn validate(&self) -> ConfigResult<()> {
        self.perception.validate()?;
        self.tracker.validate()
    }
}

/// External collaborators a world calls through.
#[derive(Clone)]
pub struct AiPorts {
    /// Navigation service
    pub nav: Arc<dyn NavigationPort>,
    /// Collision queries for the visibility probe
    pub rays: Arc<dyn CollisionQueryPort>,
    /// Live target
    pub target: Arc<dyn TargetSource>,
    /// Cue fan-out
    pub cues: CueDispatcher,
}

impl fmt::Debug for AiPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiPorts")
            .field("cues", &self.cues)
            .finish_non_exhaustive()
    }
}

/// Either archetype, by reference.
#[derive(Debug, Clone, Copy)]
pub enum AgentRef<'a> {
    /// A guard
    Guard(&'a Guard),
    /// A boss
    Boss(&'a Boss),
}

impl AgentRef<'_> {
    /// Current state name.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        use crate::fsm::StateTag;
        match self {
            Self::Guard(g) => g.state().name(),
            Self::Boss(b) => b.state().name(),
        }
    }

    /// Last known pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        match self {
            Self::Guard(g) => g.pose(),
            Self::Boss(b) => b.pose(),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number
    pub tick: Tick,
    /// Perception work
    pub perception: SchedulerReport,
    /// Guards stepped
    pub guards: usize,
    /// Living bosses stepped
    pub bosses: usize,
}

/// One independent simulation of AI agents.
#[derive(Debug)]
pub struct AiWorld {
    tick: Tick,
    ids: AgentIdAllocator,
    tracker: TargetTracker,
    scheduler: PerceptionScheduler,
    events: EventBus,
    ports: AiPorts,
    guards: BTreeMap<AgentId, Guard>,
    bosses: BTreeMap<AgentId, Boss>,
}

impl AiWorld {
    /// Creates a world at tick 0, sampling the target once.
    pub fn new(config: WorldConfig, ports: AiPorts) -> ConfigResult<Self> {
        config.validate()?;
        let events = if config.event_capacity == 0 {
            EventBus::default()
        } else {
            EventBus::new(config.event_capacity)
        };
        let tracker = TargetTracker::new(config.tracker, ports.target.as_ref(), 0)?
            .with_events(events.sender());
        let scheduler = PerceptionScheduler::new(config.perception)?;
        Ok(Self {
            tick: 0,
            ids: AgentIdAllocator::default(),
            tracker,
            scheduler,
            events,
            ports,
            guards: BTreeMap::new(),
            bosses: BTreeMap::new(),
        })
    }

    /// Last completed tick.
    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Target cache.
    #[must_use]
    pub fn tracker(&self) -> &TargetTracker {
        &self.tracker
    }

    /// Perception scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &PerceptionScheduler {
        &self.scheduler
    }

    /// Event bus; drain it to consume events.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Looks up a guard.
    #[must_use]
    pub fn guard(&self, id: AgentId) -> Option<&Guard> {
        self.guards.get(&id)
    }

    /// Looks up a boss.
    #[must_use]
    pub fn boss(&self, id: AgentId) -> Option<&Boss> {
        self.bosses.get(&id)
    }

    /// Looks up any agent.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<AgentRef<'_>> {
        self.guards
            .get(&id)
            .map(AgentRef::Guard)
            .or_else(|| self.bosses.get(&id).map(AgentRef::Boss))
    }

    /// Every agent in id order.
    pub fn agents(&self) -> impl Iterator<Item = (AgentId, AgentRef<'_>)> + '_ {
        let mut all: Vec<(AgentId, AgentRef<'_>)> = self
            .guards
            .iter()
            .map(|(id, g)| (*id, AgentRef::Guard(g)))
            .chain(self.bosses.iter().map(|(id, b)| (*id, AgentRef::Boss(b))))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all.into_iter()
    }

    /// Number of agents, dead bosses included.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.guards.len() + self.bosses.len()
    }

    /// Spawns a guard at `post`.
    pub fn spawn_guard(&mut self, config: GuardConfig, post: Pose) -> ConfigResult<AgentId> {
        let id = self.ids.next_id();
        let guard = Guard::new(id, config, post, self.tick)?;
        self.ports.nav.attach(id, post);
        self.scheduler.register(id);
        self.guards.insert(id, guard);
        info!("Spawned guard {id} at {:?}", post.position);
        Ok(id)
    }

    /// Spawns a boss at `spawn` and starts its intro.
    pub fn spawn_boss(&mut self, config: BossConfig, spawn: Pose) -> ConfigResult<AgentId> {
        let id = self.ids.next_id();
        let boss = Boss::new(id, config, spawn, self.tick)?;
        self.ports.nav.attach(id, spawn);
        self.scheduler.register(id);
        let ctx = TickContext {
            tick: self.tick,
            target: self.tracker.snapshot(),
            nav: self.ports.nav.as_ref(),
            cues: &self.ports.cues,
            events: &self.events,
        };
        boss.announce(&ctx);
        self.bosses.insert(id, boss);
        info!("Spawned boss {id} at {:?}", spawn.position);
        Ok(id)
    }

    /// Removes an agent, its pending request and its navigation handle.
    ///
    /// Unknown ids are a logged no-op.
    pub fn despawn(&mut self, id: AgentId) -> bool {
        let removed = self.guards.remove(&id).is_some() || self.bosses.remove(&id).is_some();
        if !removed {
            debug!("Despawn of unknown {id} ignored");
            return false;
        }
        self.scheduler.unregister(id);
        self.ports.nav.detach(id);
        self.events.publish(AiEvent::AgentDespawned {
            agent: id,
            tick: self.tick,
        });
        debug!("Despawned {id}");
        true
    }

    /// Damages an agent. Guards killed by the hit are despawned at once;
    /// bosses resolve death on their next step.
    pub fn apply_damage(&mut self, id: AgentId, amount: f32) -> DamageOutcome {
        let ctx = TickContext {
            tick: self.tick,
            target: self.tracker.snapshot(),
            nav: self.ports.nav.as_ref(),
            cues: &self.ports.cues,
            events: &self.events,
        };
        if let Some(guard) = self.guards.get_mut(&id) {
            let outcome = guard.apply_damage(amount, &ctx);
            if outcome == DamageOutcome::Depleted {
                self.despawn(id);
            }
            return outcome;
        }
        if let Some(boss) = self.bosses.get_mut(&id) {
            return boss.apply_damage(amount, &ctx);
        }
        debug!("Damage to unknown {id} ignored");
        DamageOutcome::Ignored
    }

    /// Stuns a boss. Returns whether the stun took effect.
    pub fn stun(&mut self, id: AgentId, ticks: Tick) -> bool {
        let ctx = TickContext {
            tick: self.tick,
            target: self.tracker.snapshot(),
            nav: self.ports.nav.as_ref(),
            cues: &self.ports.cues,
            events: &self.events,
        };
        match self.bosses.get_mut(&id) {
            Some(boss) => boss.stun(ticks, &ctx),
            None => {
                debug!("Stun of {id} ignored, not a boss");
                false
            },
        }
    }

    /// Runs one tick.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let tick = self.tick;

        self.tracker.update(tick, self.ports.target.as_ref());
        let target = self.tracker.snapshot();

        for guard in self.guards.values_mut() {
            if let Some(request) = guard.perception_request(tick, &target) {
                self.scheduler.request_check(request);
            }
        }
        for boss in self.bosses.values_mut() {
            if let Some(request) = boss.perception_request(tick, &target) {
                self.scheduler.request_check(request);
            }
        }
        let perception = self.scheduler.tick(tick, &target, self.ports.rays.as_ref());

        let ctx = TickContext {
            tick,
            target,
            nav: self.ports.nav.as_ref(),
            cues: &self.ports.cues,
            events: &self.events,
        };
        for (id, guard) in &mut self.guards {
            guard.step(&ctx, self.scheduler.take_result(*id));
        }
        let mut bosses = 0;
        for (id, boss) in &mut self.bosses {
            if boss.is_dead() {
                continue;
            }
            bosses += 1;
            boss.step(&ctx, self.scheduler.take_result(*id));
            if boss.is_dead() {
                self.scheduler.unregister(*id);
            }
        }

        TickReport {
            tick,
            perception,
            guards: self.guards.len(),
            bosses,
        }
    }

    /// Runs `ticks` ticks.
    pub fn run(&mut self, ticks: Tick) -> Vec<TickReport> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    /// Guards currently in `state`.
    pub fn guards_in(&self, state: GuardState) -> impl Iterator<Item = &Guard> + '_ {
        self.guards.values().filter(move |g| g.state() == state)
    }

    /// Bosses currently in `state`.
    pub fn bosses_in(&self, state: BossState) -> impl Iterator<Item = &Boss> + '_ {
        self.bosses.values().filter(move |b| b.state() == state)
    }
}
