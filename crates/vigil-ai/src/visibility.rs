//! Visibility probe.
//!
//! Staged from cheap to expensive:
//! 1. Distance rejection against the caller's detection radius
//! 2. Concealment rejection
//! 3. One eye-to-chest ray
//! 4. A 3x3 grid of ray pairs (observer heights x target heights)
//!
//! A clear single ray returns before the grid is touched.

use crate::ports::CollisionQueryPort;
use crate::tracker::TargetSnapshot;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::warn;
use vigil_common::{ensure_non_negative, ConfigResult, Pose};

/// Ray heights used by the probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Observer eye height for the single-ray test
    pub eye_height: f32,
    /// Target chest height for the single-ray test
    pub chest_height: f32,
    /// Observer heights sampled by the fallback grid
    pub observer_heights: [f32; 3],
    /// Target heights sampled by the fallback grid
    pub target_heights: [f32; 3],
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            eye_height: 1.6,
            chest_height: 1.2,
            observer_heights: [0.5, 1.1, 1.7],
            target_heights: [0.3, 1.0, 1.6],
        }
    }
}

impl ProbeConfig {
    /// Rejects negative heights.
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_non_negative("eye_height", self.eye_height)?;
        ensure_non_negative("chest_height", self.chest_height)?;
        for h in self.observer_heights {
            ensure_non_negative("observer_heights", h)?;
        }
        for h in self.target_heights {
            ensure_non_negative("target_heights", h)?;
        }
        Ok(())
    }
}

/// Why the probe answered the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Target beyond the detection radius; no rays cast
    OutOfRange,
    /// Target concealed; no rays cast
    Concealed,
    /// A ray reached the target
    Visible {
        /// Rays cast before the clear one, inclusive
        rays: u32,
    },
    /// Every ray was blocked
    Occluded {
        /// Rays cast
        rays: u32,
    },
}

impl ProbeOutcome {
    /// Whether the target was seen.
    #[must_use]
    pub const fn is_visible(self) -> bool {
        matches!(self, Self::Visible { .. })
    }

    /// Number of ray queries spent.
    #[must_use]
    pub const fn rays(self) -> u32 {
        match self {
            Self::OutOfRange | Self::Concealed => 0,
            Self::Visible { rays } | Self::Occluded { rays } => rays,
        }
    }
}

/// Answers whether an observer can see the target.
#[must_use]
pub fn is_visible(
    observer: &Pose,
    target: &TargetSnapshot,
    detection_radius: f32,
    config: &ProbeConfig,
    rays: &dyn CollisionQueryPort,
) -> bool {
    probe(observer, target, detection_radius, config, rays).is_visible()
}

/// Runs the staged probe and reports how it concluded.
pub fn probe(
    observer: &Pose,
    target: &TargetSnapshot,
    detection_radius: f32,
    config: &ProbeConfig,
    rays: &dyn CollisionQueryPort,
) -> ProbeOutcome {
    if observer.distance_to(target.position) > detection_radius {
        return ProbeOutcome::OutOfRange;
    }
    if target.concealed {
        return ProbeOutcome::Concealed;
    }

    let target_pose = Pose::at(target.position);
    let mut cast = 1;
    if ray_is_clear(
        rays,
        observer.raised(config.eye_height),
        target_pose.raised(config.chest_height),
    ) {
        return ProbeOutcome::Visible { rays: cast };
    }

    for observer_height in config.observer_heights {
        let origin = observer.raised(observer_height);
        for target_height in config.target_heights {
            cast += 1;
            if ray_is_clear(rays, origin, target_pose.raised(target_height)) {
                return ProbeOutcome::Visible { rays: cast };
            }
        }
    }
    ProbeOutcome::Occluded { rays: cast }
}

/// A ray counts as clear when nothing is hit or the first hit is the target.
/// A failed query counts as blocked.
fn ray_is_clear(rays: &dyn CollisionQueryPort, origin: Vec3, target: Vec3) -> bool {
    match rays.raycast(origin, target) {
        Ok(None) => true,
        Ok(Some(hit)) => hit.is_target,
        Err(e) => {
            warn!("Raycast failed, treating ray as blocked: {e}");
            false
        },
    }
}
