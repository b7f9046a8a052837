use glam::Vec2;
use granular_matter::boundary::BoundarySnapshot;
use granular_matter::cpu::backend::CpuBackend;
use granular_matter::gpu::backend::{BufferRef, BufferRole, ComputeBackend, read_pod};
use granular_matter::gpu::ffi::ParticleGridEntry;
use granular_matter::gpu::sort::{cell_key, cell_of};
use granular_matter::gpu::store::ParticleStore;
use granular_matter::kernel::cubic;
use granular_matter::{GranularSimulation, SimulationContext, SphSettings};

// scattered particles, with dt = 0 so one frame only builds the grid and densities
fn scattered(count: usize, settings: &SphSettings) -> ParticleStore {
    let mut store = ParticleStore::block(settings, Vec2::ZERO, count, 1);
    let mut state = 7u32;
    let mut next = || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 8) as f32 / (1u32 << 24) as f32
    };
    for p in &mut store.lr {
        p.position = [next() * settings.domain_width, next() * settings.domain_height];
        p.predicted_position = p.position;
    }
    store
}

#[test]
fn init_grid_n() {
    let mut store = ParticleStore::new(0.12);
    store.init_grid(Vec2::ZERO, 10, 5, 1.5);
    assert_eq!(store.lr.len(), 50); // 10 * 5
    assert_eq!(store.lr[0].position, [0.0, 0.0]);
    assert_eq!(store.lr[1].position, [0.12, 0.0]);
    assert_eq!(store.lr[10].position, [0.0, 0.12]);
    assert_eq!(store.hr.len(), 250);
    assert_eq!(store.padded_count(), 64);
}

#[test]
fn sorted_grid_is_consistent() {
    let settings = SphSettings::demo_block();
    let store = scattered(1500, &settings);
    let positions: Vec<Vec2> = store.lr.iter().map(|p| Vec2::from_array(p.position)).collect();
    let padded = store.padded_count();
    assert_eq!(padded, 2048);

    let mut ctx = SimulationContext::new(settings.clone());
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, BoundarySnapshot::default()).unwrap();
    sim.frame(&mut ctx).unwrap();

    let entries: Vec<ParticleGridEntry> =
        read_pod(&sim.backend().read_buffer(BufferRef::new(0, BufferRole::GridEntries)).unwrap());
    let starts: Vec<u32> =
        read_pod(&sim.backend().read_buffer(BufferRef::new(0, BufferRole::StartingIndices)).unwrap());

    // sorted, padding last
    assert!(entries.windows(2).all(|w| w[0].cell_key <= w[1].cell_key));
    assert!(entries[..1500].iter().all(|e| !e.is_padding()));
    assert!(entries[1500..].iter().all(|e| e.is_padding()));

    // a permutation carrying the right keys
    let mut seen = vec![false; 1500];
    for e in &entries[..1500] {
        let i = e.particle_index as usize;
        assert!(!seen[i]);
        seen[i] = true;
        assert_eq!(e.cell_key, cell_key(cell_of(positions[i], settings.kernel_radius), padded));
    }

    for (key, &start) in starts.iter().enumerate() {
        if start == u32::MAX {
            assert!(entries.iter().all(|e| e.cell_key != key as u32));
            continue;
        }
        let start = start as usize;
        assert_eq!(entries[start].cell_key, key as u32);
        assert!(start == 0 || entries[start - 1].cell_key != key as u32);
    }
}

#[test]
fn hashed_neighbours_match_brute_force() {
    let settings = SphSettings::demo_block();
    let store = scattered(1000, &settings);
    let positions: Vec<Vec2> = store.lr.iter().map(|p| Vec2::from_array(p.position)).collect();

    let mut ctx = SimulationContext::new(settings.clone());
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, BoundarySnapshot::default()).unwrap();
    sim.frame(&mut ctx).unwrap();
    let lr = sim.read_lr(0).unwrap();

    for (i, p) in lr.iter().enumerate() {
        let expected: f32 = positions
            .iter()
            .map(|x| settings.mass * cubic(positions[i].distance(*x), settings.kernel_radius))
            .sum();
        assert!((p.rho - expected).abs() <= 1.0e-4 * expected, "particle {i}: {} vs {expected}", p.rho);
    }
}

#[test]
fn lattice_density_is_rest_density() {
    let mut settings = SphSettings::demo_block();
    settings.domain_width = 10.0;
    let s = settings.particle_spacing;
    let origin = Vec2::new(1.0, 0.5);
    let store = ParticleStore::block(&settings, origin, 20, 20);

    let mut ctx = SimulationContext::new(settings.clone());
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, BoundarySnapshot::default()).unwrap();
    sim.frame(&mut ctx).unwrap();
    let lr = sim.read_lr(0).unwrap();

    // particles whose support lies fully inside the block
    let lo = origin + Vec2::splat(settings.kernel_radius);
    let hi = origin + Vec2::splat(19.0 * s - settings.kernel_radius);
    let interior: Vec<f32> = lr
        .iter()
        .filter(|p| {
            let x = Vec2::from_array(p.position);
            x.cmpge(lo).all() && x.cmple(hi).all()
        })
        .map(|p| p.rho)
        .collect();
    assert!(interior.len() > 100);

    let average = interior.iter().sum::<f32>() / interior.len() as f32;
    assert!((average - settings.rest_density).abs() < 0.01 * settings.rest_density, "average = {average}");
    for p in &lr {
        assert!((p.volume * p.rho - settings.mass).abs() < 1.0e-6);
    }
}
