use bevy::prelude::*;
use glam::Vec2;

use crate::boundary::{BoundarySnapshot, RigidBody};
use crate::cpu::backend::CpuBackend;
use crate::gpu::buffers::{LatestRenderView, add_particle_buffer_systems};
use crate::gpu::profiler::FrameReport;
use crate::gpu::store::ParticleStore;
use crate::settings::{SimulationContext, SphSettings};
use crate::simulation::GranularSimulation;

/// Frames between two timing reports in the log.
const TIMING_LOG_INTERVAL: u32 = 240;

// ==================== resources ======================================

#[derive(Resource)]
pub struct Simulation(pub GranularSimulation<CpuBackend>);

#[derive(Resource, Default)]
pub struct LatestFrameReport(pub FrameReport);

/// Initial particle block and the rigid bodies of the scene.
#[derive(Resource, Clone, Debug)]
pub struct SceneDescription {
    pub block_origin: Vec2,
    pub block_size: (usize, usize),
    pub bodies: Vec<RigidBody>,
}

impl SceneDescription {
    /// A block of sand in a box with a floor and two walls.
    pub fn demo(settings: &SphSettings) -> Self {
        let w = settings.domain_width;
        let floor = 0.2;
        Self {
            block_origin: Vec2::new(0.3 * w, floor + 0.5 * settings.particle_spacing),
            block_size: (20, 12),
            bodies: vec![
                RigidBody::floor(floor),
                RigidBody::wall(Vec2::X, -floor),
                RigidBody::wall(-Vec2::X, w - floor),
            ],
        }
    }
}

/// Flips the enabled flag of one rigid body.
#[derive(Event, Clone, Copy, Debug)]
pub struct ToggleBody(pub usize);

// =====================================================================

// ========================== systems ==================================

fn init_simulation(
    mut commands: Commands,
    ctx: Res<SimulationContext>,
    scene: Res<SceneDescription>,
    mut exit: EventWriter<AppExit>,
) {
    let (n_x, n_y) = scene.block_size;
    let store = ParticleStore::block(&ctx.settings, scene.block_origin, n_x, n_y);
    let boundary = BoundarySnapshot::build(&scene.bodies, &ctx.settings);
    match GranularSimulation::new(CpuBackend::new(), store, boundary) {
        Ok(sim) => commands.insert_resource(Simulation(sim)),
        Err(err) => {
            error!("failed to start the granular simulation: {err}");
            exit.write(AppExit::error());
        }
    }
}

fn toggle_bodies(mut events: EventReader<ToggleBody>, sim: Option<ResMut<Simulation>>) {
    let Some(mut sim) = sim else {
        events.clear();
        return;
    };
    for ToggleBody(index) in events.read() {
        let Some(enabled) = sim.0.boundary().transforms().get(*index).map(|t| t.is_enabled()) else {
            warn!("no rigid body with index {index}");
            continue;
        };
        let snapshot = sim.0.boundary().with_body_enabled(*index, !enabled);
        if let Err(err) = sim.0.set_boundary(snapshot) {
            error!("failed to toggle rigid body {index}: {err}");
        }
    }
}

fn step_simulation(
    mut commands: Commands,
    time: Res<Time>,
    mut ctx: ResMut<SimulationContext>,
    sim: Option<ResMut<Simulation>>,
    mut report: ResMut<LatestFrameReport>,
) {
    let Some(mut sim) = sim else {
        return;
    };
    ctx.set_frame_time(time.delta_secs());
    match sim.0.frame(&mut ctx) {
        Ok(frame_report) => report.0 = frame_report,
        Err(err) => {
            error!("simulation frame failed, stopping: {err}");
            ctx.running = false;
            commands.remove_resource::<Simulation>();
        }
    }
}

fn publish_render_view(sim: Option<ResMut<Simulation>>, mut view: ResMut<LatestRenderView>) {
    let Some(mut sim) = sim else {
        return;
    };
    let slot = sim.0.latest_slot();
    match sim.0.render_view(slot) {
        Ok(latest) => view.0 = Some(latest),
        Err(err) => warn!("could not read back slot {slot}: {err}"),
    }
}

fn log_timings(report: Res<LatestFrameReport>, mut frames: Local<u32>) {
    *frames += 1;
    if *frames % TIMING_LOG_INTERVAL != 0 {
        return;
    }
    let Some(timings) = &report.0.timings else {
        return;
    };
    for (label, duration) in timings {
        info!("{label}: {:.3} ms", duration.as_secs_f64() * 1.0e3);
    }
    if let Some(total) = report.0.total() {
        info!("frame slot {}: {:.3} ms total", report.0.slot, total.as_secs_f64() * 1.0e3);
    }
}

// =====================================================================

// Plugin

pub struct GranularMatterPlugin {
    pub settings: SphSettings,
    pub scene: SceneDescription,
}

impl Default for GranularMatterPlugin {
    fn default() -> Self {
        let settings = SphSettings::demo_block();
        let scene = SceneDescription::demo(&settings);
        Self { settings, scene }
    }
}

impl Plugin for GranularMatterPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(SimulationContext::new(self.settings.clone()))
            .insert_resource(self.scene.clone())
            .init_resource::<LatestFrameReport>()
            .add_event::<ToggleBody>()
            .add_systems(Startup, init_simulation)
            .add_systems(
                Update,
                (toggle_bodies, step_simulation, publish_render_view, log_timings).chain(),
            );

        add_particle_buffer_systems(app);
    }
}
