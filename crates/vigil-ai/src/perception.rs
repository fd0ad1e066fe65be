//! Budgeted perception scheduling.
//!
//! Agents enqueue visibility requests; each tick the scheduler resolves at
//! most `max_checks_per_tick` of them in FIFO order and parks the answers in a
//! per-agent result slot. An agent has at most one request outstanding, so
//! with `n` live agents nobody waits longer than `ceil(n / max_checks_per_tick)`
//! ticks. Closer agents are checked more often by shortening their own
//! re-request interval ([`PerceptionCadence`]), never by reordering the queue.

use crate::ports::CollisionQueryPort;
use crate::tracker::TargetSnapshot;
use crate::visibility::{probe, ProbeConfig};
use ahash::{AHashMap, AHashSet};
use dashmap::DashMap;
use glam::Vec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};
use vigil_common::{
    ensure_non_negative, ensure_ticks, AgentId, ConfigError, ConfigResult, Pose, Tick,
};

/// Scheduler tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Most requests resolved per tick
    pub max_checks_per_tick: usize,
    /// Ray heights for the visibility probe
    pub probe: ProbeConfig,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            max_checks_per_tick: 16,
            probe: ProbeConfig::default(),
        }
    }
}

impl PerceptionConfig {
    /// Rejects a zero budget.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_checks_per_tick == 0 {
            return Err(ConfigError::ZeroTicks("max_checks_per_tick"));
        }
        self.probe.validate()
    }
}

/// A pending visibility question.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerceptionRequest {
    /// Requesting agent (back-reference only)
    pub agent: AgentId,
    /// Agent pose when the request was (last) made
    pub pose: Pose,
    /// Agent's detection radius
    pub detection_radius: f32,
    /// Tick of the first enqueue
    pub enqueued_at: Tick,
}

/// A resolved visibility answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerceptionResult {
    /// Whether the target was visible
    pub visible: bool,
    /// Target position from the snapshot used
    pub target_position: Vec3,
    /// Tick the answer was computed on
    pub tick: Tick,
}

/// Summary of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Requests resolved this tick
    pub resolved: usize,
    /// Requests still queued afterwards
    pub remaining: usize,
    /// Ray queries spent
    pub rays: u32,
}

#[derive(Debug, Default)]
struct RequestQueue {
    order: VecDeque<AgentId>,
    pending: AHashMap<AgentId, PerceptionRequest>,
    registered: AHashSet<AgentId>,
}

/// FIFO of visibility requests drained under a per-tick budget.
#[derive(Debug)]
pub struct PerceptionScheduler {
    config: PerceptionConfig,
    queue: Mutex<RequestQueue>,
    results: DashMap<AgentId, PerceptionResult>,
}

impl PerceptionScheduler {
    /// Creates a scheduler.
    pub fn new(config: PerceptionConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            queue: Mutex::new(RequestQueue::default()),
            results: DashMap::new(),
        })
    }

    /// Returns the scheduler configuration.
    #[must_use]
    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    /// Makes an agent eligible to request checks.
    pub fn register(&self, agent: AgentId) {
        self.queue.lock().registered.insert(agent);
    }

    /// Removes an agent, its pending request and its unread result together.
    pub fn unregister(&self, agent: AgentId) {
        let mut queue = self.queue.lock();
        queue.registered.remove(&agent);
        if queue.pending.remove(&agent).is_some() {
            queue.order.retain(|id| *id != agent);
        }
        self.results.remove(&agent);
    }

    /// Enqueues a request.
    ///
    /// Re-requesting before the previous request is drained replaces the pose
    /// and radius but keeps the original queue position.
    pub fn request_check(&self, request: PerceptionRequest) {
        let mut queue = self.queue.lock();
        if !queue.registered.contains(&request.agent) {
            debug!("Perception request from unknown {}, ignoring", request.agent);
            return;
        }
        if let Some(existing) = queue.pending.get_mut(&request.agent) {
            existing.pose = request.pose;
            existing.detection_radius = request.detection_radius;
            return;
        }
        queue.order.push_back(request.agent);
        queue.pending.insert(request.agent, request);
    }

    /// Number of queued requests.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.lock().order.len()
    }

    /// Whether `agent` has a request waiting.
    #[must_use]
    pub fn is_pending(&self, agent: AgentId) -> bool {
        self.queue.lock().pending.contains_key(&agent)
    }

    /// Resolves up to `max_checks_per_tick` requests against `target`.
    pub fn tick(
        &self,
        tick: Tick,
        target: &TargetSnapshot,
        rays: &dyn CollisionQueryPort,
    ) -> SchedulerReport {
        let batch: Vec<PerceptionRequest> = {
            let mut queue = self.queue.lock();
            let mut batch = Vec::with_capacity(self.config.max_checks_per_tick);
            while batch.len() < self.config.max_checks_per_tick {
                let Some(agent) = queue.order.pop_front() else {
                    break;
                };
                if let Some(request) = queue.pending.remove(&agent) {
                    batch.push(request);
                }
            }
            batch
        };

        let mut report = SchedulerReport::default();
        let mut answers = Vec::with_capacity(batch.len());
        for request in &batch {
            let outcome = probe(
                &request.pose,
                target,
                request.detection_radius,
                &self.config.probe,
                rays,
            );
            report.rays += outcome.rays();
            trace!(tick, agent = %request.agent, ?outcome, "perception resolved");
            answers.push((
                request.agent,
                PerceptionResult {
                    visible: outcome.is_visible(),
                    target_position: target.position,
                    tick,
                },
            ));
        }

        // Agents may have despawned while rays were being cast.
        let queue = self.queue.lock();
        for (agent, result) in answers {
            if queue.registered.contains(&agent) {
                self.results.insert(agent, result);
                report.resolved += 1;
            } else {
                debug!("Dropping perception result for despawned {agent}");
            }
        }
        report.remaining = queue.order.len();
        report
    }

    /// Takes the unread result for `agent`, if any.
    pub fn take_result(&self, agent: AgentId) -> Option<PerceptionResult> {
        self.results.remove(&agent).map(|(_, result)| result)
    }
}

/// Re-request interval tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Distance under which the near interval applies
    pub near_distance: f32,
    /// Ticks between requests while near the target
    pub near_interval: Tick,
    /// Ticks between requests while far from the target
    pub far_interval: Tick,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            near_distance: 20.0,
            near_interval: 1,
            far_interval: 6,
        }
    }
}

impl CadenceConfig {
    /// Same interval regardless of distance.
    #[must_use]
    pub fn every(ticks: Tick) -> Self {
        Self {
            near_distance: 0.0,
            near_interval: ticks,
            far_interval: ticks,
        }
    }

    /// Rejects zero intervals.
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_non_negative("near_distance", self.near_distance)?;
        ensure_ticks("near_interval", self.near_interval)?;
        ensure_ticks("far_interval", self.far_interval)
    }

    fn interval(&self, distance: f32) -> Tick {
        if distance <= self.near_distance {
            self.near_interval
        } else {
            self.far_interval
        }
    }
}

/// Per-agent re-request timer.
#[derive(Debug, Clone)]
pub struct PerceptionCadence {
    config: CadenceConfig,
    next_due: Tick,
}

impl PerceptionCadence {
    /// Creates a cadence that is due immediately.
    #[must_use]
    pub fn new(config: CadenceConfig) -> Self {
        Self { config, next_due: 0 }
    }

    /// Returns true and schedules the next request when one is due.
    pub fn poll(&mut self, tick: Tick, distance_to_target: f32) -> bool {
        if tick < self.next_due {
            return false;
        }
        self.next_due = tick.saturating_add(self.config.interval(distance_to_target));
        true
    }
}

/// What an agent believes about the target.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Awareness {
    /// Latest visibility answer
    pub visible: bool,
    /// Where the target was last seen
    pub last_known: Option<Vec3>,
    /// Tick of the last visible answer
    pub last_seen: Option<Tick>,
}

impl Awareness {
    /// Folds a fresh result in.
    pub fn absorb(&mut self, result: &PerceptionResult) {
        self.visible = result.visible;
        if result.visible {
            self.last_known = Some(result.target_position);
            self.last_seen = Some(result.tick);
        }
    }

    /// Forgets the target entirely.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
