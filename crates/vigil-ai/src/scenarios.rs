//! End-to-end runs through [`AiWorld`] with scripted services.

use crate::boss::{AttackPattern, BossConfig, BossState, Phase, RetreatConfig};
use crate::cues::CueDispatcher;
use crate::events::AiEvent;
use crate::guard::{GuardConfig, GuardState};
use crate::mock::{MockNavigation, RecordingCues, ScriptedRayCaster, ScriptedTarget};
use crate::perception::{CadenceConfig, PerceptionConfig};
use crate::ports::NullCuePort;
use crate::world::{AiPorts, AiWorld, WorldConfig};
use glam::Vec3;
use proptest::prelude::*;
use std::sync::Arc;
use vigil_common::{Pose, Tick};

struct Stage {
    nav: Arc<MockNavigation>,
    rays: Arc<ScriptedRayCaster>,
    target: Arc<ScriptedTarget>,
    recorder: Arc<RecordingCues>,
    world: AiWorld,
}

fn stage(target: Vec3, rays: ScriptedRayCaster) -> Stage {
    let nav = Arc::new(MockNavigation::new());
    let rays = Arc::new(rays);
    let target = Arc::new(ScriptedTarget::at(target));
    let recorder = Arc::new(RecordingCues::new());
    let ports = AiPorts {
        nav: nav.clone(),
        rays: rays.clone(),
        target: target.clone(),
        cues: CueDispatcher::new(
            recorder.clone(),
            Arc::new(NullCuePort),
            Arc::new(NullCuePort),
        ),
    };
    let config = WorldConfig {
        perception: PerceptionConfig {
            max_checks_per_tick: 8,
            ..PerceptionConfig::default()
        },
        ..WorldConfig::default()
    };
    Stage {
        nav,
        rays,
        target,
        recorder,
        world: AiWorld::new(config, ports).expect("world"),
    }
}

fn arena_boss() -> BossConfig {
    BossConfig {
        max_health: 100.0,
        detection_radius: 20.0,
        engage_radius: 3.0,
        intro_ticks: 0,
        observe_dwell_ticks: 1,
        path_recompute_ticks: 1,
        phase_transition_ticks: 10,
        patterns: vec![
            AttackPattern::new("jab", 5.0, [2, 1, 2], 3.0, 3),
            AttackPattern::new("hook", 8.0, [3, 1, 2], 3.0, 4),
        ],
        phases: vec![
            Phase::new(1.0, &["jab", "hook"], 1.0),
            Phase::new(0.7, &["jab", "hook"], 1.2),
            Phase::new(0.4, &["jab", "hook"], 1.4),
        ],
        cadence: CadenceConfig::every(1),
        ..BossConfig::default()
    }
}

#[test]
fn guard_closes_in_as_target_approaches() {
    let mut s = stage(Vec3::new(15.0, 0.0, 0.0), ScriptedRayCaster::clear());
    let id = s
        .world
        .spawn_guard(
            GuardConfig {
                detection_radius: 10.0,
                melee_radius: 2.0,
                observe_dwell_ticks: 1,
                cadence: CadenceConfig::every(1),
                ..GuardConfig::default()
            },
            Pose::at(Vec3::ZERO),
        )
        .expect("guard");

    let mut states = Vec::new();
    for x in [15.0, 12.0, 9.0, 5.0, 1.0] {
        s.target.set_position(Vec3::new(x, 0.0, 0.0));
        s.world.tick();
        states.push(s.world.guard(id).map(|g| g.state()));
    }
    assert_eq!(
        states,
        vec![
            Some(GuardState::Guarding),
            Some(GuardState::Guarding),
            Some(GuardState::Observing),
            Some(GuardState::Chasing),
            Some(GuardState::Attacking),
        ]
    );
    assert_eq!(s.nav.destination(id), None, "attacking freezes movement");
}

#[test]
fn boss_crossing_one_threshold_transitions_once() {
    let mut s = stage(Vec3::new(2.0, 0.0, 0.0), ScriptedRayCaster::clear());
    let id = s
        .world
        .spawn_boss(arena_boss(), Pose::at(Vec3::ZERO))
        .expect("boss");
    s.world.run(4);
    assert_eq!(s.world.boss(id).map(|b| b.state()), Some(BossState::Combat));

    s.world.apply_damage(id, 28.0);
    s.world.tick();
    assert_eq!(s.world.boss(id).map(|b| b.phase()), Some(1));

    s.world.apply_damage(id, 7.0);
    s.world.events().drain();
    s.recorder.clear();

    let entered = s.world.current_tick() + 1;
    let lockout = arena_boss().phase_transition_ticks;
    for _ in 0..lockout {
        s.world.tick();
        assert_eq!(
            s.world.boss(id).map(|b| b.state()),
            Some(BossState::PhaseTransition)
        );
    }
    assert!(s.recorder.cues_named("attack_start").is_empty());

    s.world.tick();
    assert_eq!(s.world.current_tick(), entered + lockout);
    assert_eq!(s.world.boss(id).map(|b| b.state()), Some(BossState::Combat));
    s.world.tick();

    let boss = s.world.boss(id).expect("boss");
    assert_eq!(boss.phase(), 2);
    assert_eq!(boss.state(), BossState::Attacking);
    let starts = s.recorder.cues_named("attack_start");
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].phase, Some(2));

    let changes: Vec<AiEvent> = s
        .world
        .events()
        .drain()
        .into_iter()
        .filter(|e| matches!(e, AiEvent::PhaseChanged { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![AiEvent::PhaseChanged {
            agent: id,
            from: 1,
            to: 2,
            tick: entered
        }]
    );
    let lockouts = boss
        .machine()
        .history()
        .filter(|r| r.to == BossState::PhaseTransition)
        .count();
    assert_eq!(lockouts, 1);
}

fn retreat_trace(seed: u64) -> Vec<(Tick, &'static str)> {
    use crate::fsm::StateTag;

    let mut s = stage(Vec3::new(2.0, 0.0, 0.0), ScriptedRayCaster::clear());
    let config = BossConfig {
        phases: vec![Phase::new(1.0, &["jab", "hook"], 1.0)],
        retreat: RetreatConfig {
            health_threshold: 0.5,
            chance: 0.5,
            roll_interval_ticks: 1,
            duration_ticks: 3,
            ..RetreatConfig::default()
        },
        seed,
        ..arena_boss()
    };
    let id = s.world.spawn_boss(config, Pose::at(Vec3::ZERO)).expect("boss");
    s.world.run(4);
    s.world.apply_damage(id, 60.0);
    for _ in 0..80 {
        s.world.tick();
        s.nav.advance_all(0.5);
    }
    s.world
        .boss(id)
        .map(|b| b.machine().history().map(|r| (r.tick, r.to.name())).collect())
        .unwrap_or_default()
}

#[test]
fn seeded_retreat_is_reproducible() {
    let first = retreat_trace(42);
    let second = retreat_trace(42);
    assert_eq!(first, second);
    assert!(first.iter().any(|(_, state)| *state == "retreating"));
}

#[test]
fn despawned_boss_stops_mid_attack() {
    let mut s = stage(Vec3::new(2.0, 0.0, 0.0), ScriptedRayCaster::clear());
    let boss = s
        .world
        .spawn_boss(arena_boss(), Pose::at(Vec3::ZERO))
        .expect("boss");
    let guard = s
        .world
        .spawn_guard(GuardConfig::default(), Pose::at(Vec3::new(-3.0, 0.0, 0.0)))
        .expect("guard");
    s.world.run(5);
    assert_eq!(s.world.boss(boss).map(|b| b.state()), Some(BossState::Attacking));

    assert!(s.world.despawn(boss));
    assert!(!s.world.despawn(boss));
    assert!(!s.nav.is_attached(boss));
    s.recorder.clear();
    s.world.run(10);
    assert!(s.recorder.for_agent(boss).is_empty());
    assert!(s.world.guard(guard).is_some());
    assert_eq!(s.world.agent_count(), 1);
}

#[test]
fn sight_check_stops_at_first_clear_ray() {
    let mut s = stage(Vec3::new(4.0, 0.0, 0.0), ScriptedRayCaster::clear_after(3));
    let id = s
        .world
        .spawn_guard(
            GuardConfig {
                cadence: CadenceConfig::every(1),
                ..GuardConfig::default()
            },
            Pose::at(Vec3::ZERO),
        )
        .expect("guard");
    let report = s.world.tick();
    assert_eq!(report.perception.resolved, 1);
    assert_eq!(report.perception.rays, 4);
    assert_eq!(s.rays.calls(), 4);
    assert!(s.world.guard(id).is_some_and(|g| g.awareness().visible));
}

#[test]
fn occluded_target_costs_every_ray() {
    let mut s = stage(Vec3::new(4.0, 0.0, 0.0), ScriptedRayCaster::blocked());
    s.world
        .spawn_guard(GuardConfig::default(), Pose::at(Vec3::ZERO))
        .expect("guard");
    let report = s.world.tick();
    assert_eq!(report.perception.rays, 10);
    assert_eq!(s.world.guards_in(GuardState::Guarding).count(), 1);
}

#[test]
fn concealed_target_is_never_chased() {
    let mut s = stage(Vec3::new(4.0, 0.0, 0.0), ScriptedRayCaster::clear());
    s.target.set_concealed(true);
    s.world
        .spawn_guard(
            GuardConfig {
                cadence: CadenceConfig::every(1),
                ..GuardConfig::default()
            },
            Pose::at(Vec3::ZERO),
        )
        .expect("guard");
    let reports = s.world.run(10);
    assert!(reports.iter().all(|r| r.perception.rays == 0));
    assert_eq!(s.world.guards_in(GuardState::Guarding).count(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn boss_phase_never_regresses(hits in prop::collection::vec((0.0f32..25.0, 1u64..6), 1..12)) {
        let mut s = stage(Vec3::new(2.0, 0.0, 0.0), ScriptedRayCaster::clear());
        let id = s.world.spawn_boss(arena_boss(), Pose::at(Vec3::ZERO)).expect("boss");
        s.world.run(4);

        let mut phase = 1;
        for (damage, gap) in hits {
            s.world.apply_damage(id, damage);
            for _ in 0..gap {
                s.world.tick();
                let now = s.world.boss(id).map_or(phase, |b| b.phase());
                prop_assert!(now >= phase);
                phase = now;
            }
        }
        for event in s.world.events().drain() {
            if let AiEvent::PhaseChanged { from, to, .. } = event {
                prop_assert!(to > from);
            }
        }
    }
}
