//! Cached pose of the tracked target.
//!
//! The tracker is the only place agents read target state from. It refreshes
//! on a fixed tick interval and hands out copies, so agents ticked in parallel
//! never see a half-written snapshot.

use crate::events::AiEvent;
use crate::ports::TargetSource;
use crossbeam_channel::Sender;
use glam::Vec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;
use vigil_common::{ensure_non_negative, ensure_ticks, ticks_since, ConfigResult, Tick};

/// Tracker tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Ticks between re-samples of the live target
    pub refresh_interval: Tick,
    /// Displacement below which no move event is raised
    pub position_epsilon: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: 1,
            position_epsilon: 0.05,
        }
    }
}

impl TrackerConfig {
    /// Rejects zero intervals and negative epsilons.
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_ticks("refresh_interval", self.refresh_interval)?;
        ensure_non_negative("position_epsilon", self.position_epsilon)
    }
}

/// A copy of the target's cached state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Target feet position
    pub position: Vec3,
    /// Whether the target is concealed
    pub concealed: bool,
    /// Tick the snapshot was sampled on
    pub last_update: Tick,
}

/// Process-wide target cache, constructed explicitly and shared by handle.
#[derive(Debug)]
pub struct TargetTracker {
    config: TrackerConfig,
    snapshot: RwLock<TargetSnapshot>,
    events: Option<Sender<AiEvent>>,
}

impl TargetTracker {
    /// Creates a tracker, sampling the target immediately.
    pub fn new(config: TrackerConfig, source: &dyn TargetSource, tick: Tick) -> ConfigResult<Self> {
        config.validate()?;
        let sample = source.sample();
        Ok(Self {
            config,
            snapshot: RwLock::new(TargetSnapshot {
                position: sample.position,
                concealed: sample.concealed,
                last_update: tick,
            }),
            events: None,
        })
    }

    /// Publishes move and concealment events to `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: Sender<AiEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Returns the tracker configuration.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Re-samples the target if the refresh interval elapsed.
    ///
    /// Returns whether a re-sample happened.
    pub fn update(&self, tick: Tick, source: &dyn TargetSource) -> bool {
        let previous = *self.snapshot.read();
        if ticks_since(previous.last_update, tick) < self.config.refresh_interval {
            return false;
        }

        let sample = source.sample();
        let next = TargetSnapshot {
            position: sample.position,
            concealed: sample.concealed,
            last_update: tick,
        };
        *self.snapshot.write() = next;

        if previous.position.distance(next.position) > self.config.position_epsilon {
            trace!(tick, from = ?previous.position, to = ?next.position, "target moved");
            self.publish(AiEvent::TargetMoved {
                from: previous.position,
                to: next.position,
                tick,
            });
        }
        if previous.concealed != next.concealed {
            trace!(tick, concealed = next.concealed, "target concealment changed");
            self.publish(AiEvent::ConcealmentChanged {
                concealed: next.concealed,
                tick,
            });
        }
        true
    }

    /// Returns a copy of the last cached value.
    #[must_use]
    pub fn snapshot(&self) -> TargetSnapshot {
        *self.snapshot.read()
    }

    fn publish(&self, event: AiEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.try_send(event);
        }
    }
}
