//! Boss archetype: phases, attack patterns and the boss state machine.

pub mod config;
pub mod machine;
pub mod pattern;
pub mod phase;
pub mod selector;

pub use config::{BossConfig, BossTables, RetreatConfig};
pub use machine::{boss_transitions, Boss, BossState};
pub use pattern::{AttackPattern, AttackSequence, AttackStage, PatternCatalog, SequenceProgress};
pub use phase::{Phase, PhaseTable};
pub use selector::{
    select_pattern, CombatContext, PatternSelector, SeededSelector, SelectionRequest,
};
