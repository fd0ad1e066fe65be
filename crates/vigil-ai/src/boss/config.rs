//! Boss tunables, loaded from RON.

use super::pattern::{AttackPattern, PatternCatalog};
use super::phase::{Phase, PhaseTable};
use crate::perception::CadenceConfig;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use vigil_common::{
    ensure_at_least, ensure_positive, ensure_probability, ensure_ticks, ConfigError, ConfigResult,
    Tick,
};

/// Low-health retreat policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetreatConfig {
    /// Health ratio below which retreat rolls happen
    pub health_threshold: f32,
    /// Probability per roll
    pub chance: f32,
    /// Ticks between rolls while below the threshold
    pub roll_interval_ticks: Tick,
    /// Ticks spent retreating
    pub duration_ticks: Tick,
    /// How far to back away from the target
    pub distance: f32,
    /// Speed scale while retreating
    pub speed_scale: f32,
}

impl Default for RetreatConfig {
    fn default() -> Self {
        Self {
            health_threshold: 0.25,
            chance: 0.3,
            roll_interval_ticks: 10,
            duration_ticks: 40,
            distance: 8.0,
            speed_scale: 1.5,
        }
    }
}

impl RetreatConfig {
    fn validate(&self) -> ConfigResult<()> {
        ensure_probability("retreat.health_threshold", self.health_threshold)?;
        ensure_probability("retreat.chance", self.chance)?;
        ensure_ticks("retreat.roll_interval_ticks", self.roll_interval_ticks)?;
        ensure_ticks("retreat.duration_ticks", self.duration_ticks)?;
        ensure_positive("retreat.distance", self.distance)?;
        ensure_positive("retreat.speed_scale", self.speed_scale)
    }
}

/// Everything a boss needs at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BossConfig {
    /// Health pool
    pub max_health: f32,
    /// Visibility range
    pub detection_radius: f32,
    /// Distance at which the boss stops approaching and fights
    pub engage_radius: f32,
    /// Engage radius multiplier before combat falls back to approaching
    pub disengage_factor: f32,
    /// Non-interactive intro duration; zero skips straight to patrol
    pub intro_ticks: Tick,
    /// Ticks spent observing before approaching
    pub observe_dwell_ticks: Tick,
    /// Ticks between navigation requests
    pub path_recompute_ticks: Tick,
    /// Distance counted as arrived
    pub arrival_epsilon: f32,
    /// Cooldown of the special pool, independent of pattern cooldowns
    pub special_cooldown_ticks: Tick,
    /// Phase transition lockout
    pub phase_transition_ticks: Tick,
    /// Retreat policy
    pub retreat: RetreatConfig,
    /// Patrol waypoints; empty means hold position
    pub patrol_route: Vec<Vec3>,
    /// Pattern catalog
    pub patterns: Vec<AttackPattern>,
    /// Phase table, highest threshold first
    pub phases: Vec<Phase>,
    /// Perception re-request cadence
    pub cadence: CadenceConfig,
    /// Random seed, mixed with the agent id
    pub seed: u64,
}

impl Default for BossConfig {
    fn default() -> Self {
        Self {
            max_health: 1000.0,
            detection_radius: 25.0,
            engage_radius: 4.0,
            disengage_factor: 2.0,
            intro_ticks: 60,
            observe_dwell_ticks: 15,
            path_recompute_ticks: 10,
            arrival_epsilon: 0.75,
            special_cooldown_ticks: 300,
            phase_transition_ticks: 90,
            retreat: RetreatConfig::default(),
            patrol_route: Vec::new(),
            patterns: vec![
                AttackPattern::new("swipe", 40.0, [12, 4, 18], 4.5, 20),
                AttackPattern::new("slam", 70.0, [24, 6, 30], 5.0, 30),
                AttackPattern::new("charge", 55.0, [18, 10, 24], 8.0, 40),
                AttackPattern::new("sweep", 60.0, [16, 8, 24], 6.0, 30),
                AttackPattern::new("cataclysm", 150.0, [45, 12, 50], 12.0, 60).special(),
            ],
            phases: vec![
                Phase::new(1.0, &["swipe", "slam"], 1.0),
                Phase::new(0.6, &["swipe", "slam", "charge"], 1.2),
                Phase::new(0.3, &["slam", "charge", "sweep"], 1.4),
            ],
            cadence: CadenceConfig::default(),
            seed: 0x5EED,
        }
    }
}

/// Pattern catalog and phase table built from a validated [`BossConfig`].
#[derive(Debug, Clone)]
pub struct BossTables {
    /// Pattern catalog
    pub catalog: PatternCatalog,
    /// Phase table
    pub phases: PhaseTable,
}

impl BossConfig {
    /// Parses RON text and validates it.
    pub fn from_ron(text: &str) -> ConfigResult<Self> {
        let config: Self = ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty RON.
    pub fn to_ron(&self) -> ConfigResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks every field and cross-references.
    pub fn validate(&self) -> ConfigResult<()> {
        self.tables().map(|_| ())
    }

    /// Validates and builds the lookup tables.
    pub fn tables(&self) -> ConfigResult<BossTables> {
        ensure_positive("max_health", self.max_health)?;
        ensure_positive("detection_radius", self.detection_radius)?;
        ensure_positive("engage_radius", self.engage_radius)?;
        ensure_at_least("disengage_factor", self.disengage_factor, 1.0)?;
        ensure_positive("arrival_epsilon", self.arrival_epsilon)?;
        ensure_ticks("observe_dwell_ticks", self.observe_dwell_ticks)?;
        ensure_ticks("path_recompute_ticks", self.path_recompute_ticks)?;
        ensure_ticks("phase_transition_ticks", self.phase_transition_ticks)?;
        self.retreat.validate()?;
        self.cadence.validate()?;

        let catalog = PatternCatalog::new(self.patterns.clone())?;
        let phases = PhaseTable::new(self.phases.clone())?;
        for (i, phase) in phases.iter().enumerate() {
            for tag in &phase.patterns {
                match catalog.get(tag) {
                    None => {
                        return Err(ConfigError::UnknownPattern {
                            index: i + 1,
                            tag: tag.clone(),
                        })
                    },
                    Some(p) if p.special => {
                        return Err(ConfigError::SpecialInPhaseSet {
                            index: i + 1,
                            tag: tag.clone(),
                        })
                    },
                    Some(_) => {},
                }
            }
        }
        Ok(BossTables { catalog, phases })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let tables = BossConfig::default().tables().expect("default config");
        assert_eq!(tables.phases.len(), 3);
        assert_eq!(tables.catalog.specials().count(), 1);
    }

    #[test]
    fn test_ron_roundtrip() {
        let config = BossConfig::default();
        let text = config.to_ron().expect("serialize");
        let back = BossConfig::from_ron(&text).expect("parse");
        assert_eq!(back.phases, config.phases);
        assert_eq!(back.seed, config.seed);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let text = r#"(
            max_health: 500.0,
            intro_ticks: 0,
            phases: [
                (threshold: 1.0, patterns: ["swipe"]),
                (threshold: 0.5, patterns: ["slam"], speed_multiplier: 1.3),
            ],
        )"#;
        let config = BossConfig::from_ron(text).expect("parse");
        assert_eq!(config.max_health, 500.0);
        assert_eq!(config.phases[0].speed_multiplier, 1.0);
        assert_eq!(config.patterns.len(), BossConfig::default().patterns.len());
    }

    #[test]
    fn test_unknown_pattern_rejected() {
        let config = BossConfig {
            phases: vec![Phase::new(1.0, &["fireball"], 1.0)],
            ..BossConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownPattern {
                index: 1,
                tag: "fireball".into()
            })
        );
    }

    #[test]
    fn test_special_in_phase_set_rejected() {
        let config = BossConfig {
            phases: vec![Phase::new(1.0, &["cataclysm"], 1.0)],
            ..BossConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SpecialInPhaseSet { index: 1, .. })
        ));
    }

    #[test]
    fn test_malformed_ron_is_parse_error() {
        assert!(matches!(
            BossConfig::from_ron("(max_health: )"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_bad_retreat_chance_rejected() {
        let config = BossConfig {
            retreat: RetreatConfig {
                chance: 2.0,
                ..RetreatConfig::default()
            },
            ..BossConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
