//! Health-driven combat phases.

use serde::{Deserialize, Serialize};
use vigil_common::{ensure_positive, ConfigError, ConfigResult};

/// One combat phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Health ratio at or below which this phase applies
    pub threshold: f32,
    /// Regular attack patterns allowed in this phase
    pub patterns: Vec<String>,
    /// Movement speed multiplier
    #[serde(default = "default_speed")]
    pub speed_multiplier: f32,
}

fn default_speed() -> f32 {
    1.0
}

impl Phase {
    /// Creates a phase.
    #[must_use]
    pub fn new(threshold: f32, patterns: &[&str], speed_multiplier: f32) -> Self {
        Self {
            threshold,
            patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
            speed_multiplier,
        }
    }
}

/// Validated list of phases ordered by descending threshold.
///
/// Phase indices are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTable {
    phases: Vec<Phase>,
}

impl PhaseTable {
    /// Validates thresholds and builds the table.
    ///
    /// Pattern references are checked separately against the catalog.
    pub fn new(phases: Vec<Phase>) -> ConfigResult<Self> {
        if phases.is_empty() {
            return Err(ConfigError::EmptyPhaseTable);
        }
        if phases.len() > usize::from(u8::MAX) {
            return Err(ConfigError::Parse(format!(
                "{} phases exceed the supported maximum",
                phases.len()
            )));
        }
        let mut previous: Option<f32> = None;
        for (i, phase) in phases.iter().enumerate() {
            let index = i + 1;
            if phase.threshold.is_nan() || phase.threshold <= 0.0 || phase.threshold > 1.0 {
                return Err(ConfigError::ThresholdOutOfRange {
                    index,
                    threshold: phase.threshold,
                });
            }
            if let Some(prev) = previous {
                if phase.threshold >= prev {
                    return Err(ConfigError::NonDescendingThreshold {
                        index,
                        threshold: phase.threshold,
                        previous: prev,
                    });
                }
            }
            if phase.patterns.is_empty() {
                return Err(ConfigError::EmptyPatternSet { index });
            }
            ensure_positive("speed_multiplier", phase.speed_multiplier)?;
            previous = Some(phase.threshold);
        }
        Ok(Self { phases })
    }

    /// Phase for a health ratio: the highest index whose threshold the ratio
    /// is at or below, or phase 1 when above every threshold.
    #[must_use]
    pub fn phase_for_ratio(&self, ratio: f32) -> u8 {
        self.phases
            .iter()
            .rposition(|phase| ratio <= phase.threshold)
            .map_or(1, |i| (i + 1) as u8)
    }

    /// Phase by 1-based index, clamped to the table.
    #[must_use]
    pub fn get(&self, index: u8) -> &Phase {
        let i = usize::from(index.max(1)) - 1;
        &self.phases[i.min(self.phases.len() - 1)]
    }

    /// Index of the last phase.
    #[must_use]
    pub fn final_index(&self) -> u8 {
        self.phases.len() as u8
    }

    /// Number of phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always false; a table holds at least one phase.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Phases in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Phase> {
        self.phases.iter()
    }
}
