pub mod boundary;
pub mod error;
pub mod kernel;
pub mod plugin;
pub mod settings;
pub mod simulation;

pub mod cpu {
    pub mod backend;
    pub mod kernels;
}

pub mod gpu {
    pub mod backend;
    pub mod buffers;
    pub mod ffi;
    pub mod pipeline;
    pub mod profiler;
    pub mod sort;
    pub mod store;
}

pub use error::{BackendError, SimulationError};
pub use plugin::GranularMatterPlugin;
pub use settings::{SimulationContext, SphSettings};
pub use simulation::GranularSimulation;
