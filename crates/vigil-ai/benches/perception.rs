use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use vigil_ai::mock::ScriptedRayCaster;
use vigil_ai::{PerceptionConfig, PerceptionRequest, PerceptionScheduler, TargetSnapshot};
use vigil_common::{AgentId, Pose};

fn loaded_scheduler(agents: u64, budget: usize) -> PerceptionScheduler {
    let config = PerceptionConfig {
        max_checks_per_tick: budget,
        ..PerceptionConfig::default()
    };
    let scheduler = PerceptionScheduler::new(config).expect("valid config");
    for raw in 1..=agents {
        scheduler.register(AgentId::from_raw(raw));
    }
    scheduler
}

fn bench_scheduler_tick(c: &mut Criterion) {
    let target = TargetSnapshot {
        position: Vec3::new(5.0, 0.0, 5.0),
        concealed: false,
        last_update: 0,
    };
    let mut group = c.benchmark_group("perception/tick");
    for (agents, budget) in [(64u64, 16usize), (512, 32), (4096, 64)] {
        let scheduler = loaded_scheduler(agents, budget);
        let rays = ScriptedRayCaster::clear();
        let mut tick = 0;
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("agents={agents},budget={budget}")),
            &agents,
            |b, &agents| {
                b.iter(|| {
                    tick += 1;
                    for raw in 1..=agents {
                        scheduler.request_check(PerceptionRequest {
                            agent: AgentId::from_raw(raw),
                            pose: Pose::at(Vec3::new(raw as f32 % 20.0, 0.0, 0.0)),
                            detection_radius: 25.0,
                            enqueued_at: tick,
                        });
                    }
                    black_box(scheduler.tick(tick, &target, &rays));
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_scheduler_tick);
criterion_main!(benches);
