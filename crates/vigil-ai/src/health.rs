//! Agent health pools.

use serde::{Deserialize, Serialize};
use vigil_common::{ensure_positive, ConfigResult};

/// Result of applying damage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Damage was not applied (agent invulnerable, dead or amount not positive)
    Ignored,
    /// Damage applied, agent still alive
    Hit {
        /// Health left
        remaining: f32,
    },
    /// This hit brought health to zero
    Depleted,
}

/// Current and maximum health.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    current: f32,
    max: f32,
}

impl Health {
    /// Creates a full health pool.
    pub fn new(max: f32) -> ConfigResult<Self> {
        ensure_positive("max_health", max)?;
        Ok(Self { current: max, max })
    }

    /// Current health.
    #[must_use]
    pub const fn current(&self) -> f32 {
        self.current
    }

    /// Maximum health.
    #[must_use]
    pub const fn max(&self) -> f32 {
        self.max
    }

    /// `current / max`, in [0, 1].
    #[must_use]
    pub fn ratio(&self) -> f32 {
        (self.current / self.max).clamp(0.0, 1.0)
    }

    /// Whether health reached zero.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }

    /// Subtracts `amount`, clamping at zero.
    pub fn apply_damage(&mut self, amount: f32) -> DamageOutcome {
        if amount.is_nan() || amount <= 0.0 || self.is_depleted() {
            return DamageOutcome::Ignored;
        }
        self.current = (self.current - amount).max(0.0);
        if self.is_depleted() {
            DamageOutcome::Depleted
        } else {
            DamageOutcome::Hit {
                remaining: self.current,
            }
        }
    }
}
