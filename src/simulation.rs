use bevy::log::{info, warn};

use crate::boundary::BoundarySnapshot;
use crate::error::{BackendError, SimulationError};
use crate::gpu::backend::{BufferRef, BufferRole, ComputeBackend, Kernel, read_pod};
use crate::gpu::ffi::{HrParticle, LrParticle, VolumeMapTransform};
use crate::gpu::pipeline::{FrameInputs, FrameOrchestrator};
use crate::gpu::profiler::{FrameReport, Profiler};
use crate::gpu::store::{ParticleStore, transform_buffer_size};
use crate::settings::{FRAMES_IN_FLIGHT, SimulationContext};

/// Committed state of one frame slot, as handed to a renderer.
#[derive(Clone, Debug, Default)]
pub struct RenderView {
    pub slot: usize,
    pub lr: Vec<LrParticle>,
    pub hr: Vec<HrParticle>,
    pub transforms: Vec<VolumeMapTransform>,
}

/// Drives the compute pipeline one frame at a time over a backend.
pub struct GranularSimulation<B: ComputeBackend> {
    backend: B,
    store: ParticleStore,
    boundary: BoundarySnapshot,
    profiler: Profiler,
    frame_index: u64,
}

impl<B: ComputeBackend> GranularSimulation<B> {
    /// Creates every pipeline and buffer. Any failure here is fatal.
    pub fn new(mut backend: B, mut store: ParticleStore, boundary: BoundarySnapshot) -> Result<Self, SimulationError> {
        if store.is_empty() {
            return Err(SimulationError::EmptyScene);
        }
        backend.create_pipelines(&Kernel::ALL)?;
        store.allocate(&mut backend, boundary.body_count())?;
        backend.upload_volume_maps(boundary.maps())?;
        info!(
            "granular simulation: {} LR / {} HR particles, {} padded, {} rigid bodies",
            store.particle_count(),
            store.hr_count(),
            store.padded_count(),
            boundary.body_count()
        );
        Ok(Self { backend, store, boundary, profiler: Profiler::default(), frame_index: 0 })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn boundary(&self) -> &BoundarySnapshot {
        &self.boundary
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Slot of the most recently submitted frame.
    pub fn latest_slot(&self) -> usize {
        ((self.frame_index + FRAMES_IN_FLIGHT as u64 - 1) % FRAMES_IN_FLIGHT as u64) as usize
    }

    /// Swaps the active-body snapshot, read by frames recorded from now on.
    pub fn set_boundary(&mut self, boundary: BoundarySnapshot) -> Result<(), SimulationError> {
        if !boundary.shares_maps(&self.boundary) {
            if boundary.body_count() != self.boundary.body_count() {
                for slot in 0..FRAMES_IN_FLIGHT {
                    self.backend.wait(slot)?;
                    let buffer = BufferRef::new(slot, BufferRole::VolumeMapTransforms);
                    self.backend.destroy_buffer(buffer);
                    self.backend.create_buffer(buffer, transform_buffer_size(boundary.body_count()))?;
                }
            }
            self.backend.upload_volume_maps(boundary.maps())?;
            info!("boundary replaced: {} rigid bodies", boundary.body_count());
        }
        self.boundary = boundary;
        Ok(())
    }

    /// Waits for the slot, records and submits one frame. Clears a pending
    /// single step once physics has been recorded.
    pub fn frame(&mut self, ctx: &mut SimulationContext) -> Result<FrameReport, SimulationError> {
        let slot = (self.frame_index % FRAMES_IN_FLIGHT as u64) as usize;
        let previous_slot = self.latest_slot();

        self.backend.wait(slot)?;
        let report = FrameReport { slot, timings: self.profiler.collect(slot, &mut self.backend) };

        self.write_transforms(slot)?;

        let settings = &ctx.settings;
        let inputs = FrameInputs {
            slot,
            previous_slot,
            previous_committed: self.store.committed(previous_slot),
            settings: settings.to_gpu(
                self.store.particle_count(),
                self.store.padded_count(),
                self.boundary.body_count() as u32,
            ),
            pressure_iterations: settings.pressure_iterations,
            step: ctx.should_step(),
        };
        let recorded = FrameOrchestrator::record_frame(inputs, &mut self.profiler);
        self.backend.submit(&recorded.commands)?;

        self.store.set_committed(slot, recorded.committed);
        ctx.single_step = false;
        self.frame_index += 1;
        Ok(report)
    }

    fn write_transforms(&mut self, slot: usize) -> Result<(), BackendError> {
        let mut transforms = self.boundary.transforms().to_vec();
        if transforms.is_empty() {
            transforms.push(VolumeMapTransform::new([0.0; 2], [1.0; 2]).enabled(false));
        }
        self.backend.write_buffer(
            BufferRef::new(slot, BufferRole::VolumeMapTransforms),
            bytemuck::cast_slice(&transforms),
        )
    }

    /// Committed LR particles of a slot. Blocks on the slot's fence.
    pub fn read_lr(&mut self, slot: usize) -> Result<Vec<LrParticle>, SimulationError> {
        self.backend.wait(slot)?;
        let ping = self.store.committed(slot);
        let bytes = self.backend.read_buffer(BufferRef::new(slot, BufferRole::Lr(ping)))?;
        Ok(read_pod(&bytes))
    }

    pub fn read_hr(&mut self, slot: usize) -> Result<Vec<HrParticle>, SimulationError> {
        self.backend.wait(slot)?;
        let bytes = self.backend.read_buffer(BufferRef::new(slot, BufferRole::Hr))?;
        Ok(read_pod(&bytes))
    }

    /// Read-only view of a slot, valid until the slot is recorded again.
    pub fn render_view(&mut self, slot: usize) -> Result<RenderView, SimulationError> {
        if slot >= FRAMES_IN_FLIGHT {
            warn!("render view requested for slot {slot}");
            return Err(BackendError::InvalidSlot(slot).into());
        }
        Ok(RenderView {
            slot,
            lr: self.read_lr(slot)?,
            hr: self.read_hr(slot)?,
            transforms: self.boundary.transforms().to_vec(),
        })
    }

    /// Releases every buffer and hands the backend back.
    pub fn into_backend(mut self) -> B {
        self.store.release(&mut self.backend, self.boundary.body_count());
        self.backend
    }
}
