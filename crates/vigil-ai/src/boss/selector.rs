//! Attack pattern selection.
//!
//! Randomness sits behind [`PatternSelector`] so a boss can be driven by a
//! seeded generator in tests and in the simulator alike.

use super::pattern::{AttackPattern, PatternCatalog};
use super::phase::Phase;
use std::fmt;
use vigil_common::{ticks_since, Tick};

/// Source of random choices for a boss.
pub trait PatternSelector: Send + fmt::Debug {
    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;

    /// Bernoulli trial with the given probability.
    fn chance(&mut self, probability: f32) -> bool;
}

/// [`PatternSelector`] backed by a seeded `fastrand` generator.
#[derive(Debug, Clone)]
pub struct SeededSelector {
    rng: fastrand::Rng,
}

impl SeededSelector {
    /// Creates a selector with a fixed seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl PatternSelector for SeededSelector {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.usize(..len.max(1))
    }

    fn chance(&mut self, probability: f32) -> bool {
        self.rng.f32() < probability
    }
}

/// Per-boss attack bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombatContext {
    /// Tag of the last executed pattern
    pub last_pattern: Option<String>,
    /// Tick the last attack started
    pub last_attack_tick: Option<Tick>,
    /// Tick the last special attack started
    pub last_special_tick: Option<Tick>,
    /// Earliest tick the next attack may start
    pub ready_at: Tick,
}

impl CombatContext {
    /// Whether the special cooldown has elapsed at `tick`.
    #[must_use]
    pub fn special_ready(&self, tick: Tick, special_cooldown: Tick) -> bool {
        self.last_special_tick
            .map_or(true, |last| ticks_since(last, tick) >= special_cooldown)
    }

    /// Records that `pattern` started at `tick`.
    pub fn record(&mut self, pattern: &AttackPattern, tick: Tick) {
        self.last_pattern = Some(pattern.tag.clone());
        self.last_attack_tick = Some(tick);
        if pattern.special {
            self.last_special_tick = Some(tick);
        }
    }
}

/// Inputs to one selection.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    /// Active phase
    pub phase: &'a Phase,
    /// Whether the active phase is the last one
    pub final_phase: bool,
    /// Current tick
    pub tick: Tick,
    /// Cooldown gating the special pool
    pub special_cooldown: Tick,
    /// Whether the normal attack cooldown has elapsed
    pub regular_ready: bool,
    /// Distance to the target; patterns that cannot reach it are skipped
    pub distance: f32,
}

/// Chooses the next pattern.
///
/// Candidates are the phase's regular set while the normal cooldown has
/// elapsed, plus every special pattern when the final phase is active and
/// the special cooldown has elapsed. The special cooldown does not wait on
/// the normal one. Patterns whose range is shorter than the distance to the
/// target are dropped, then the previous pattern is excluded unless it is
/// the only candidate left. The pick is uniform over what remains.
///
/// Returns `None` when nothing is ready or nothing reaches the target.
pub fn select_pattern<'c>(
    catalog: &'c PatternCatalog,
    combat: &CombatContext,
    request: SelectionRequest<'_>,
    selector: &mut dyn PatternSelector,
) -> Option<&'c AttackPattern> {
    let mut candidates: Vec<&AttackPattern> = Vec::new();
    if request.regular_ready {
        candidates.extend(
            request
                .phase
                .patterns
                .iter()
                .filter_map(|tag| catalog.get(tag)),
        );
    }
    if request.final_phase && combat.special_ready(request.tick, request.special_cooldown) {
        candidates.extend(catalog.specials());
    }
    candidates.retain(|p| p.range >= request.distance);

    let previous = combat.last_pattern.as_deref();
    let fresh: Vec<&AttackPattern> = candidates
        .iter()
        .copied()
        .filter(|p| Some(p.tag.as_str()) != previous)
        .collect();
    let pool = if fresh.is_empty() { candidates } else { fresh };
    if pool.is_empty() {
        return None;
    }
    Some(pool[selector.pick(pool.len())])
}
