use glam::Vec2;
use granular_matter::boundary::{BoundarySnapshot, RigidBody, VolumeMap};
use granular_matter::cpu::backend::CpuBackend;
use granular_matter::gpu::backend::{BufferRef, BufferRole, Command, CommandList, ComputeBackend, Kernel};
use granular_matter::gpu::pipeline::{FrameInputs, FrameOrchestrator};
use granular_matter::gpu::profiler::Profiler;
use granular_matter::gpu::store::ParticleStore;
use granular_matter::{BackendError, GranularSimulation, SimulationContext, SimulationError, SphSettings};

fn scene(settings: &SphSettings) -> (ParticleStore, BoundarySnapshot) {
    let store = ParticleStore::block(settings, Vec2::new(2.0, 0.3), 8, 6);
    let boundary = BoundarySnapshot::build(&[RigidBody::floor(0.2)], settings);
    (store, boundary)
}

fn stepping_settings() -> SphSettings {
    SphSettings { dt: 0.004, ..SphSettings::demo_block() }
}

fn bytes<T: bytemuck::Pod>(data: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(data).to_vec()
}

/// Counts what reaches the backend.
struct Counting {
    inner: CpuBackend,
    submitted: Vec<CommandList>,
}

impl ComputeBackend for Counting {
    fn create_pipelines(&mut self, kernels: &[Kernel]) -> Result<(), BackendError> {
        self.inner.create_pipelines(kernels)
    }
    fn create_buffer(&mut self, buffer: BufferRef, size: usize) -> Result<(), BackendError> {
        self.inner.create_buffer(buffer, size)
    }
    fn destroy_buffer(&mut self, buffer: BufferRef) {
        self.inner.destroy_buffer(buffer)
    }
    fn write_buffer(&mut self, buffer: BufferRef, data: &[u8]) -> Result<(), BackendError> {
        self.inner.write_buffer(buffer, data)
    }
    fn read_buffer(&self, buffer: BufferRef) -> Result<Vec<u8>, BackendError> {
        self.inner.read_buffer(buffer)
    }
    fn upload_volume_maps(&mut self, maps: &[VolumeMap]) -> Result<(), BackendError> {
        self.inner.upload_volume_maps(maps)
    }
    fn submit(&mut self, commands: &CommandList) -> Result<(), BackendError> {
        self.submitted.push(commands.clone());
        self.inner.submit(commands)
    }
    fn wait(&mut self, slot: usize) -> Result<(), BackendError> {
        self.inner.wait(slot)
    }
    fn query_results(&mut self, slot: usize, count: u32) -> Option<Vec<u64>> {
        self.inner.query_results(slot, count)
    }
    fn timestamp_period(&self) -> f32 {
        self.inner.timestamp_period()
    }
}

#[test]
fn paused_frames_pass_particles_through_unchanged() {
    let settings = stepping_settings();
    let (store, boundary) = scene(&settings);
    let initial_lr = store.lr.clone();
    let initial_hr = store.hr.clone();

    let mut ctx = SimulationContext::paused(settings);
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, boundary).unwrap();
    for _ in 0..5 {
        sim.frame(&mut ctx).unwrap();
        let slot = sim.latest_slot();
        assert_eq!(bytes(&sim.read_lr(slot).unwrap()), bytes(&initial_lr));
        assert_eq!(bytes(&sim.read_hr(slot).unwrap()), bytes(&initial_hr));
    }
}

#[test]
fn single_step_advances_exactly_one_frame() {
    let settings = stepping_settings();
    let (store, boundary) = scene(&settings);
    let initial = store.lr.clone();

    let mut ctx = SimulationContext::paused(settings);
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, boundary).unwrap();

    ctx.single_step = true;
    sim.frame(&mut ctx).unwrap();
    assert!(!ctx.single_step);
    assert_eq!(sim.frame_index(), 1);
    let stepped = sim.read_lr(sim.latest_slot()).unwrap();
    assert!(stepped.iter().zip(&initial).any(|(a, b)| a.position != b.position));

    // HR particles follow the stepped parents
    let hr = sim.read_hr(sim.latest_slot()).unwrap();
    for h in &hr {
        let parent = &stepped[h.parent as usize];
        assert_eq!(h.velocity, parent.velocity);
        let expected = Vec2::from_array(parent.position) + Vec2::from_array(h.offset);
        assert!((Vec2::from_array(h.position) - expected).length() < 1.0e-6);
    }

    sim.frame(&mut ctx).unwrap();
    let held = sim.read_lr(sim.latest_slot()).unwrap();
    assert_eq!(held, stepped);
}

#[test]
fn pressure_solve_always_runs_the_configured_iterations() {
    for iterations in [1, 2, 4] {
        let settings = SphSettings { pressure_iterations: iterations, ..stepping_settings() };
        let (store, boundary) = scene(&settings);
        let backend = Counting { inner: CpuBackend::new(), submitted: Vec::new() };
        let mut ctx = SimulationContext::new(settings);
        let mut sim = GranularSimulation::new(backend, store, boundary).unwrap();
        for _ in 0..3 {
            sim.frame(&mut ctx).unwrap();
        }
        for list in &sim.backend().submitted {
            assert_eq!(list.count_dispatches(Kernel::IisphPressure), iterations as usize);
            assert_eq!(list.count_dispatches(Kernel::IisphCommit), iterations as usize);
            assert_eq!(list.count_dispatches(Kernel::Integrate), 1);
        }
    }
}

#[test]
fn missing_barrier_is_detected() {
    let settings = stepping_settings();
    let (store, boundary) = scene(&settings);
    let gpu = settings.to_gpu(store.particle_count(), store.padded_count(), boundary.body_count() as u32);
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, boundary).unwrap();

    let mut profiler = Profiler::default();
    let inputs = FrameInputs {
        slot: 0,
        previous_slot: 1,
        previous_committed: sim.store().committed(1),
        settings: gpu,
        pressure_iterations: 2,
        step: true,
    };
    let mut frame = FrameOrchestrator::record_frame(inputs, &mut profiler);

    // drop the barrier behind the density dispatch
    let density = frame
        .commands
        .commands
        .iter()
        .position(|c| matches!(c, Command::Dispatch(d) if d.kernel == Kernel::Density))
        .unwrap();
    assert!(matches!(frame.commands.commands.remove(density + 1), Command::Barrier(_)));

    let err = sim.backend_mut().submit(&frame.commands).unwrap_err();
    assert!(matches!(err, BackendError::Hazard { kernel: Kernel::IisphAdvection, .. }), "{err}");
}

#[test]
fn copy_from_the_previous_slot_waits_for_its_shaders() {
    let settings = stepping_settings();
    let (store, boundary) = scene(&settings);
    let gpu = settings.to_gpu(store.particle_count(), store.padded_count(), boundary.body_count() as u32);
    let mut ctx = SimulationContext::new(settings);
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, boundary).unwrap();
    sim.frame(&mut ctx).unwrap();

    let mut profiler = Profiler::default();
    let inputs = FrameInputs {
        slot: 1,
        previous_slot: 0,
        previous_committed: sim.store().committed(0),
        settings: gpu,
        pressure_iterations: 2,
        step: true,
    };
    let mut frame = FrameOrchestrator::record_frame(inputs, &mut profiler);
    let barrier = frame
        .commands
        .commands
        .iter()
        .position(|c| matches!(c, Command::Barrier(_)))
        .unwrap();
    frame.commands.commands.remove(barrier);

    let err = sim.backend_mut().submit(&frame.commands).unwrap_err();
    let committed = BufferRef::new(0, BufferRole::Lr(sim.store().committed(0)));
    assert!(matches!(err, BackendError::TransferHazard { buffer } if buffer == committed), "{err}");
}

#[test]
fn timings_arrive_once_the_slot_comes_back() {
    let settings = stepping_settings();
    let (store, boundary) = scene(&settings);
    let mut ctx = SimulationContext::new(settings);
    let mut sim = GranularSimulation::new(CpuBackend::new(), store, boundary).unwrap();

    let first = sim.frame(&mut ctx).unwrap();
    assert!(first.timings.is_none());
    sim.frame(&mut ctx).unwrap();
    let third = sim.frame(&mut ctx).unwrap();

    let timings = third.timings.unwrap();
    let labels: Vec<&str> = timings.iter().map(|(label, _)| label.as_str()).collect();
    assert_eq!(labels.first(), Some(&"copy"));
    assert!(labels.contains(&"density"));
    assert!(labels.contains(&"iisph pressure 1"));
    assert_eq!(labels.last(), Some(&"hr advection"));
}

#[test]
fn startup_failures_are_reported() {
    let settings = stepping_settings();
    let (store, boundary) = scene(&settings);
    let err = GranularSimulation::new(CpuBackend::rejecting(Kernel::Stress), store, boundary.clone())
        .err()
        .unwrap();
    assert!(matches!(err, SimulationError::Backend(BackendError::PipelineCreation(Kernel::Stress))));

    let err = GranularSimulation::new(CpuBackend::new(), ParticleStore::new(0.15), boundary)
        .err()
        .unwrap();
    assert!(matches!(err, SimulationError::EmptyScene));
}
