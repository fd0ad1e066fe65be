//! Poses in world space.
//!
//! The world is Y-up. Facing is a horizontal unit vector; a zero facing means
//! "unknown" and is treated as looking down +Z.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Position plus facing direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Feet position in world space
    pub position: Vec3,
    /// Horizontal facing direction (normalized, or zero if unknown)
    pub facing: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            facing: Vec3::Z,
        }
    }
}

impl Pose {
    /// Creates a pose from a position and facing.
    #[must_use]
    pub fn new(position: Vec3, facing: Vec3) -> Self {
        Self {
            position,
            facing: flatten(facing),
        }
    }

    /// Creates a pose at a position, facing +Z.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            facing: Vec3::Z,
        }
    }

    /// Straight-line distance to a point.
    #[must_use]
    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }

    /// Returns a copy of this pose turned to face `point`.
    ///
    /// Leaves facing unchanged when `point` is directly above or below.
    #[must_use]
    pub fn facing_toward(self, point: Vec3) -> Self {
        let dir = flatten(point - self.position);
        if dir == Vec3::ZERO {
            self
        } else {
            Self {
                facing: dir,
                ..self
            }
        }
    }

    /// Returns a copy of this pose at a new position, keeping facing.
    #[must_use]
    pub fn moved_to(self, position: Vec3) -> Self {
        Self { position, ..self }
    }

    /// Point offset straight up from the feet by `height`.
    #[must_use]
    pub fn raised(&self, height: f32) -> Vec3 {
        self.position + Vec3::Y * height
    }
}

/// Projects a direction onto the horizontal plane and normalizes it.
fn flatten(dir: Vec3) -> Vec3 {
    Vec3::new(dir.x, 0.0, dir.z).normalize_or_zero()
}
