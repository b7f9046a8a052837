use std::f32::consts::PI;

use bevy::prelude::Resource;
use glam::Vec2;

use crate::gpu::ffi::GpuSettings;

/// Number of in-flight frame slots.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Simulation constants, pushed to every stage each frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SphSettings {
    pub gravity: Vec2,
    pub rest_density: f32,
    pub kernel_radius: f32, // smoothing length, also the hash cell size
    pub particle_spacing: f32, // lattice spacing at init
    pub mass: f32,
    pub stiffness: f32, // shear modulus of the elastic stress predictor
    pub dt: f32,
    pub max_time_step: f32,
    pub domain_width: f32,
    pub domain_height: f32,
    pub angle_of_repose: f32, // radians
    pub viscosity: f32,
    pub cohesion_intensity: f32,
    pub max_cohesion: f32,
    pub air_drag: f32,
    pub relaxation: f32, // Jacobi omega
    pub pressure_iterations: u32,
}

impl Default for SphSettings {
    fn default() -> Self {
        let rest_density = 1.5;
        let particle_spacing = 0.15;
        Self {
            gravity: Vec2::new(0.0, -9.81),
            rest_density,
            kernel_radius: 0.3,
            particle_spacing,
            mass: rest_density * particle_spacing * particle_spacing,
            stiffness: 50.0,
            dt: 0.0,
            max_time_step: 1.0 / 120.0,
            domain_width: 60.0,
            domain_height: 30.0,
            angle_of_repose: 30.0 * PI / 180.0,
            viscosity: 0.25,
            cohesion_intensity: 0.0,
            max_cohesion: 0.0,
            air_drag: 0.0,
            relaxation: 0.5,
            pressure_iterations: 2,
        }
    }
}

impl SphSettings {
    /// Dry sand: steeper repose angle, no cohesion.
    pub fn sand() -> Self {
        Self {
            angle_of_repose: 34.0 * PI / 180.0,
            ..Self::default()
        }
    }

    /// Small closed box used by the demo scene and the benches.
    pub fn demo_block() -> Self {
        Self {
            domain_width: 6.0,
            domain_height: 4.0,
            ..Self::default()
        }
    }

    /// Keeps mass consistent with the lattice after changing spacing or rest density.
    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.particle_spacing = spacing;
        self.mass = self.rest_density * spacing * spacing;
        self
    }

    pub fn to_gpu(&self, particle_count: u32, padded_count: u32, body_count: u32) -> GpuSettings {
        GpuSettings {
            gravity: self.gravity.to_array(),
            rest_density: self.rest_density,
            kernel_radius: self.kernel_radius,
            mass: self.mass,
            stiffness: self.stiffness,
            dt: self.dt,
            domain_width: self.domain_width,
            domain_height: self.domain_height,
            tan_repose: self.angle_of_repose.tan(),
            viscosity: self.viscosity,
            cohesion: self.cohesion_intensity * self.max_cohesion,
            air_drag: self.air_drag,
            relaxation: self.relaxation,
            particle_count,
            padded_count,
            body_count,
            _pad: [0; 3],
        }
    }
}

/// The single writable settings instance plus the run controls.
#[derive(Resource, Clone, Debug)]
pub struct SimulationContext {
    pub settings: SphSettings,
    pub running: bool,
    pub single_step: bool,
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self::new(SphSettings::default())
    }
}

impl SimulationContext {
    pub fn new(settings: SphSettings) -> Self {
        Self { settings, running: true, single_step: false }
    }

    pub fn paused(settings: SphSettings) -> Self {
        Self { settings, running: false, single_step: false }
    }

    /// Physics runs when unpaused or when a single step was requested.
    pub fn should_step(&self) -> bool {
        self.running || self.single_step
    }

    /// Sets dt from a wall-clock delta.
    pub fn set_frame_time(&mut self, delta_secs: f32) {
        self.settings.dt = delta_secs.clamp(0.0, self.settings.max_time_step);
    }
}
