use criterion::{Criterion, criterion_group, criterion_main};
use glam::Vec2;
use granular_matter::boundary::{BoundarySnapshot, RigidBody};
use granular_matter::cpu::backend::CpuBackend;
use granular_matter::gpu::store::ParticleStore;
use granular_matter::{GranularSimulation, SimulationContext, SphSettings};

fn bench_frame(c: &mut Criterion) {
    let settings = SphSettings { dt: 0.004, domain_width: 20.0, ..SphSettings::demo_block() };
    let store = ParticleStore::block(&settings, Vec2::new(1.0, 0.2), 70, 20);
    let boundary = BoundarySnapshot::build(&[RigidBody::floor(0.1)], &settings);

    let mut ctx = SimulationContext::new(settings);
    let Ok(mut sim) = GranularSimulation::new(CpuBackend::new(), store, boundary) else {
        return;
    };

    c.bench_function("frame_1.4k", |b| b.iter(|| sim.frame(&mut ctx)));

    ctx.running = false;
    c.bench_function("paused_frame_1.4k", |b| b.iter(|| sim.frame(&mut ctx)));
}

fn bench_volume_map(c: &mut Criterion) {
    let settings = SphSettings::demo_block();
    let bodies = [RigidBody::floor(0.1), RigidBody::cuboid(Vec2::new(3.0, 2.0), Vec2::splat(0.5))];
    c.bench_function("volume_maps_demo_block", |b| b.iter(|| BoundarySnapshot::build(&bodies, &settings)));
}

criterion_group!(benches, bench_frame, bench_volume_map);
criterion_main!(benches);
