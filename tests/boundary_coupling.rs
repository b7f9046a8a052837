use glam::Vec2;
use granular_matter::boundary::{BoundarySnapshot, RigidBody};
use granular_matter::cpu::backend::CpuBackend;
use granular_matter::gpu::ffi::LrParticle;
use granular_matter::gpu::store::ParticleStore;
use granular_matter::{GranularSimulation, SimulationContext, SphSettings};

fn latest(sim: &mut GranularSimulation<CpuBackend>) -> Vec<LrParticle> {
    let slot = sim.latest_slot();
    sim.read_lr(slot).unwrap()
}

#[test]
fn disabled_floor_contributes_nothing() {
    // dt = 0 keeps positions fixed between frames
    let settings = SphSettings::demo_block();
    let store = ParticleStore::block(&settings, Vec2::new(2.0, 0.3), 10, 4);
    let boundary = BoundarySnapshot::build(&[RigidBody::floor(0.25)], &settings);
    let mut ctx = SimulationContext::new(settings.clone());
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, boundary.clone()).unwrap();

    sim.frame(&mut ctx).unwrap();
    let with_floor = latest(&mut sim);
    assert!(with_floor.iter().any(|p| p.boundary_density > 0.0));

    sim.set_boundary(boundary.with_body_enabled(0, false)).unwrap();
    sim.frame(&mut ctx).unwrap();
    let without_floor = latest(&mut sim);
    for (on, off) in with_floor.iter().zip(&without_floor) {
        assert_eq!(off.position, on.position);
        assert_eq!(off.boundary_density, 0.0);
        assert!((on.rho - on.boundary_density - off.rho).abs() < 1.0e-5);
    }

    sim.set_boundary(boundary.with_body_enabled(0, true)).unwrap();
    sim.frame(&mut ctx).unwrap();
    let restored = latest(&mut sim);
    for (a, b) in with_floor.iter().zip(&restored) {
        assert_eq!(a.rho, b.rho);
        assert_eq!(a.boundary_density, b.boundary_density);
    }
}

#[test]
fn disabled_body_matches_an_empty_scene() {
    let settings = SphSettings { dt: 0.004, ..SphSettings::demo_block() };
    let run = |boundary: BoundarySnapshot| {
        let store = ParticleStore::block(&settings, Vec2::new(2.0, 0.3), 10, 4);
        let mut ctx = SimulationContext::new(settings.clone());
        let mut sim = GranularSimulation::new(CpuBackend::new(), store, boundary).unwrap();
        for _ in 0..20 {
            sim.frame(&mut ctx).unwrap();
        }
        latest(&mut sim)
    };

    let disabled = run(BoundarySnapshot::build(&[RigidBody::floor(0.25).disabled()], &settings));
    let empty = run(BoundarySnapshot::default());
    let bytes = |lr: &[LrParticle]| bytemuck::cast_slice::<LrParticle, u8>(lr).to_vec();
    assert_eq!(bytes(&disabled), bytes(&empty));

    // the same floor switched on pushes back, so the runs diverge
    let enabled = run(BoundarySnapshot::build(&[RigidBody::floor(0.25)], &settings));
    assert_ne!(bytes(&enabled), bytes(&empty));
}

#[test]
fn block_settles_on_the_floor() {
    // raised above the domain clamp so only the volume map holds the block
    let floor = 1.0;
    let settings = SphSettings { dt: 0.004, ..SphSettings::demo_block() };
    let s = settings.particle_spacing;
    let (n_x, n_y) = (10, 10);
    let origin = Vec2::new(1.5 - 0.5 * n_x as f32 * s + 0.5 * s, floor + 0.5 * s);
    let store = ParticleStore::block(&settings, origin, n_x, n_y);
    let boundary = BoundarySnapshot::build(&[RigidBody::floor(floor)], &settings);

    let mut ctx = SimulationContext::new(settings.clone());
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, boundary).unwrap();
    for _ in 0..1500 {
        sim.frame(&mut ctx).unwrap();
    }

    let lr = latest(&mut sim);
    let n = lr.len() as f32;
    let speed = lr.iter().map(|p| Vec2::from_array(p.velocity).length()).sum::<f32>() / n;
    let rho = lr.iter().map(|p| p.rho).sum::<f32>() / n;
    assert!(speed < 0.05, "average speed {speed}");
    assert!((rho - settings.rest_density).abs() < 0.03 * settings.rest_density, "average density {rho}");
    let min_y = lr.iter().map(|p| p.position[1]).fold(f32::INFINITY, f32::min);
    assert!(min_y > floor - 0.1 * s, "lowest particle at {min_y}");
}
