//! Attack patterns and their staged execution.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use vigil_common::{
    ensure_non_negative, ensure_positive, ticks_since, ConfigError, ConfigResult, Tick,
};

/// A named three-stage attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackPattern {
    /// Unique tag
    pub tag: String,
    /// Damage applied at the end of the strike window
    pub damage: f32,
    /// Telegraph duration, no damage
    pub windup_ticks: Tick,
    /// Strike window duration
    pub strike_ticks: Tick,
    /// Lockout after the strike
    pub recovery_ticks: Tick,
    /// Reach of the strike
    pub range: f32,
    /// Ticks after recovery before the next attack may start
    pub cooldown_ticks: Tick,
    /// Special patterns are only drawn in the final phase
    #[serde(default)]
    pub special: bool,
}

impl AttackPattern {
    /// Creates a regular pattern.
    #[must_use]
    pub fn new(
        tag: &str,
        damage: f32,
        timings: [Tick; 3],
        range: f32,
        cooldown_ticks: Tick,
    ) -> Self {
        Self {
            tag: tag.to_string(),
            damage,
            windup_ticks: timings[0],
            strike_ticks: timings[1],
            recovery_ticks: timings[2],
            range,
            cooldown_ticks,
            special: false,
        }
    }

    /// Marks the pattern as special.
    #[must_use]
    pub fn special(mut self) -> Self {
        self.special = true;
        self
    }

    /// Checks damage and range.
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_non_negative("damage", self.damage)?;
        ensure_positive("range", self.range)
    }

    /// Duration of one stage.
    #[must_use]
    pub const fn stage_ticks(&self, stage: AttackStage) -> Tick {
        match stage {
            AttackStage::Windup => self.windup_ticks,
            AttackStage::Strike => self.strike_ticks,
            AttackStage::Recovery => self.recovery_ticks,
        }
    }
}

/// Attack sequence stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackStage {
    /// Telegraph; cancellable only by stun
    Windup,
    /// Damage resolves when this stage ends
    Strike,
    /// Locked; hits taken here allow a hit-react
    Recovery,
}

impl AttackStage {
    /// Stage name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Windup => "windup",
            Self::Strike => "strike",
            Self::Recovery => "recovery",
        }
    }
}

/// What advancing a sequence produced this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceProgress {
    /// The strike window closed this tick
    pub strike_resolved: bool,
    /// Recovery finished this tick
    pub finished: bool,
}

/// An in-flight attack as a `(stage, stage_start)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackSequence {
    /// Tag of the executing pattern
    pub pattern: String,
    /// Current stage
    pub stage: AttackStage,
    /// Tick the current stage began
    pub stage_start: Tick,
}

impl AttackSequence {
    /// Starts a sequence in windup at `tick`.
    #[must_use]
    pub fn start(pattern: &AttackPattern, tick: Tick) -> Self {
        Self {
            pattern: pattern.tag.clone(),
            stage: AttackStage::Windup,
            stage_start: tick,
        }
    }

    /// Advances through every stage whose duration has elapsed by `tick`.
    ///
    /// Zero-length stages complete on the same call. Stage starts advance by
    /// the stage duration rather than jumping to `tick`, so timing stays exact.
    pub fn advance(&mut self, pattern: &AttackPattern, tick: Tick) -> SequenceProgress {
        let mut progress = SequenceProgress::default();
        loop {
            let length = pattern.stage_ticks(self.stage);
            if ticks_since(self.stage_start, tick) < length {
                return progress;
            }
            self.stage_start += length;
            match self.stage {
                AttackStage::Windup => self.stage = AttackStage::Strike,
                AttackStage::Strike => {
                    progress.strike_resolved = true;
                    self.stage = AttackStage::Recovery;
                },
                AttackStage::Recovery => {
                    progress.finished = true;
                    return progress;
                },
            }
        }
    }
}

/// Validated set of patterns keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: Vec<AttackPattern>,
    by_tag: AHashMap<String, usize>,
}

impl PatternCatalog {
    /// Builds the catalog, rejecting duplicates and invalid entries.
    pub fn new(patterns: Vec<AttackPattern>) -> ConfigResult<Self> {
        let mut by_tag = AHashMap::with_capacity(patterns.len());
        for (i, pattern) in patterns.iter().enumerate() {
            pattern.validate()?;
            if by_tag.insert(pattern.tag.clone(), i).is_some() {
                return Err(ConfigError::DuplicatePattern(pattern.tag.clone()));
            }
        }
        Ok(Self { patterns, by_tag })
    }

    /// Looks up a pattern.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&AttackPattern> {
        self.by_tag.get(tag).map(|&i| &self.patterns[i])
    }

    /// Patterns flagged special.
    pub fn specials(&self) -> impl Iterator<Item = &AttackPattern> {
        self.patterns.iter().filter(|p| p.special)
    }

    /// Every pattern.
    pub fn iter(&self) -> impl Iterator<Item = &AttackPattern> {
        self.patterns.iter()
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_timing() {
        let pattern = AttackPattern::new("slam", 20.0, [2, 1, 3], 3.0, 5);
        let mut seq = AttackSequence::start(&pattern, 10);

        assert_eq!(seq.advance(&pattern, 11), SequenceProgress::default());
        assert_eq!(seq.stage, AttackStage::Windup);

        seq.advance(&pattern, 12);
        assert_eq!(seq.stage, AttackStage::Strike);
        assert_eq!(seq.stage_start, 12);

        let progress = seq.advance(&pattern, 13);
        assert!(progress.strike_resolved);
        assert!(!progress.finished);
        assert_eq!(seq.stage, AttackStage::Recovery);

        assert!(!seq.advance(&pattern, 15).finished);
        assert!(seq.advance(&pattern, 16).finished);
    }

    #[test]
    fn test_zero_length_stages_collapse() {
        let pattern = AttackPattern::new("jab", 5.0, [0, 0, 0], 2.0, 0);
        let mut seq = AttackSequence::start(&pattern, 4);
        let progress = seq.advance(&pattern, 4);
        assert!(progress.strike_resolved);
        assert!(progress.finished);
    }

    #[test]
    fn test_late_advance_catches_up() {
        let pattern = AttackPattern::new("slam", 20.0, [2, 1, 3], 3.0, 5);
        let mut seq = AttackSequence::start(&pattern, 0);
        let progress = seq.advance(&pattern, 100);
        assert!(progress.strike_resolved && progress.finished);
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let err = PatternCatalog::new(vec![
            AttackPattern::new("a", 1.0, [1, 1, 1], 1.0, 1),
            AttackPattern::new("a", 2.0, [1, 1, 1], 1.0, 1),
        ])
        .expect_err("duplicate");
        assert_eq!(err, ConfigError::DuplicatePattern("a".into()));
    }

    #[test]
    fn test_catalog_rejects_negative_damage() {
        let negative = AttackPattern::new("a", -1.0, [1, 1, 1], 1.0, 1);
        assert!(PatternCatalog::new(vec![negative]).is_err());
    }

    #[test]
    fn test_specials() {
        let catalog = PatternCatalog::new(vec![
            AttackPattern::new("a", 1.0, [1, 1, 1], 1.0, 1),
            AttackPattern::new("doom", 50.0, [4, 1, 4], 6.0, 1).special(),
        ])
        .expect("catalog");
        let specials: Vec<&str> = catalog.specials().map(|p| p.tag.as_str()).collect();
        assert_eq!(specials, vec!["doom"]);
        assert!(catalog.get("a").is_some());
        assert!(catalog.get("b").is_none());
    }
}
