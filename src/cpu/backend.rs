//! Reference backend running every kernel on the host.
//!
//! Submissions execute synchronously, so a slot's fence is signaled as soon as
//! `submit` returns. Writes become visible to later dispatches only through a
//! barrier; reading a buffer with an outstanding write is reported as a hazard
//! instead of silently working. Shader writes stay outstanding for transfers
//! across submissions until a compute-to-transfer barrier is recorded.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use bevy::log::{debug, info};

use crate::boundary::VolumeMap;
use crate::cpu::kernels::{StageContext, density, grid, iisph, integrate, stress};
use crate::error::BackendError;
use crate::gpu::backend::{
    Barrier, BufferRef, BufferRole, Command, CommandList, ComputeBackend, Dispatch, Kernel,
    PipelineStage, read_pod,
};
use crate::gpu::ffi::{HrParticle, LrParticle, ParticleGridEntry, PushConstants, VolumeMapTransform};
use crate::settings::FRAMES_IN_FLIGHT;

#[derive(Debug)]
pub struct CpuBackend {
    buffers: HashMap<BufferRef, Vec<u8>>,
    pipelines: HashSet<Kernel>,
    volume_maps: Vec<VolumeMap>,
    queries: [Vec<Option<u64>>; FRAMES_IN_FLIGHT],
    epoch: Instant,
    rejected: Option<Kernel>,
    /// Writes left outstanding by earlier submissions.
    unflushed: PendingWrites,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            pipelines: HashSet::new(),
            volume_maps: Vec::new(),
            queries: Default::default(),
            epoch: Instant::now(),
            rejected: None,
            unflushed: PendingWrites::default(),
        }
    }

    /// Backend whose pipeline creation fails for `kernel`.
    pub fn rejecting(kernel: Kernel) -> Self {
        Self { rejected: Some(kernel), ..Self::new() }
    }

    fn buffer(&self, buffer: BufferRef) -> Result<&Vec<u8>, BackendError> {
        self.buffers.get(&buffer).ok_or(BackendError::MissingBuffer(buffer))
    }

    fn typed<T: bytemuck::Pod>(&self, buffer: BufferRef) -> Result<Vec<T>, BackendError> {
        Ok(read_pod(self.buffer(buffer)?))
    }

    fn store<T: bytemuck::Pod>(&mut self, buffer: BufferRef, data: &[T]) -> Result<(), BackendError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let target = self.buffers.get_mut(&buffer).ok_or(BackendError::MissingBuffer(buffer))?;
        if target.len() != bytes.len() {
            return Err(BackendError::SizeMismatch { buffer, expected: target.len(), actual: bytes.len() });
        }
        target.copy_from_slice(bytes);
        Ok(())
    }

    fn timestamp(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn copy(&mut self, src: BufferRef, dst: BufferRef) -> Result<(), BackendError> {
        let data = self.buffer(src)?.clone();
        self.store(dst, &data)
    }

    fn execute(&mut self, slot: usize, dispatch: &Dispatch) -> Result<(), BackendError> {
        let kernel = dispatch.kernel;
        if dispatch.push_constants.len() != size_of::<PushConstants>() {
            return Err(BackendError::PushConstants(kernel));
        }
        let push: PushConstants = bytemuck::pod_read_unaligned(&dispatch.push_constants);
        let settings = &push.settings;

        let src = BufferRef::new(slot, BufferRole::Lr(dispatch.bindings.src));
        let dst = BufferRef::new(slot, BufferRole::Lr(dispatch.bindings.dst));
        let entries_ref = BufferRef::new(slot, BufferRole::GridEntries);
        let starts_ref = BufferRef::new(slot, BufferRole::StartingIndices);
        let hr_ref = BufferRef::new(slot, BufferRole::Hr);

        match kernel {
            Kernel::GridInit => {
                let particles: Vec<LrParticle> = self.typed(src)?;
                let mut entries: Vec<ParticleGridEntry> = self.typed(entries_ref)?;
                let mut starts: Vec<u32> = self.typed(starts_ref)?;
                grid::grid_init(settings, &particles, &mut entries, &mut starts);
                self.store(entries_ref, &entries)?;
                self.store(starts_ref, &starts)
            }
            Kernel::BitonicSort => {
                let mut entries: Vec<ParticleGridEntry> = self.typed(entries_ref)?;
                grid::bitonic_pass(&mut entries, push.sort, dispatch.workgroups[0]);
                self.store(entries_ref, &entries)
            }
            Kernel::StartingIndices => {
                let entries: Vec<ParticleGridEntry> = self.typed(entries_ref)?;
                let mut starts: Vec<u32> = self.typed(starts_ref)?;
                grid::starting_indices(&entries, &mut starts);
                self.store(starts_ref, &starts)
            }
            Kernel::Integrate => {
                let particles: Vec<LrParticle> = self.typed(src)?;
                let out = integrate::integrate(settings, &particles);
                self.store(dst, &out)
            }
            Kernel::IisphCommit => {
                let particles: Vec<LrParticle> = self.typed(src)?;
                let ctx = StageContext {
                    settings,
                    particles: &particles,
                    entries: &[],
                    starts: &[],
                    maps: &[],
                    transforms: &[],
                };
                let out = iisph::commit(&ctx);
                self.store(dst, &out)
            }
            Kernel::HrAdvection => {
                let particles: Vec<LrParticle> = self.typed(src)?;
                let mut hr: Vec<HrParticle> = self.typed(hr_ref)?;
                integrate::hr_advection(&particles, &mut hr);
                self.store(hr_ref, &hr)
            }
            _ => {
                let particles: Vec<LrParticle> = self.typed(src)?;
                let entries: Vec<ParticleGridEntry> = self.typed(entries_ref)?;
                let starts: Vec<u32> = self.typed(starts_ref)?;
                let transforms: Vec<VolumeMapTransform> =
                    self.typed(BufferRef::new(slot, BufferRole::VolumeMapTransforms))?;
                let ctx = StageContext {
                    settings,
                    particles: &particles,
                    entries: &entries,
                    starts: &starts,
                    maps: &self.volume_maps,
                    transforms: &transforms,
                };
                let out = match kernel {
                    Kernel::Density => density::density(&ctx),
                    Kernel::IisphAdvection => iisph::advection(&ctx),
                    Kernel::IisphDensityAdvection => iisph::density_advection(&ctx),
                    Kernel::IisphDijpj => iisph::dijpj(&ctx),
                    Kernel::IisphPressure => iisph::pressure(&ctx),
                    Kernel::Stress => stress::stress(&ctx),
                    _ => stress::internal_force(&ctx),
                };
                self.store(dst, &out)
            }
        }
    }
}

/// Writes not yet made visible, as (buffer, writing stage, reading stage).
#[derive(Debug, Default)]
struct PendingWrites(Vec<(BufferRef, PipelineStage, PipelineStage)>);

impl PendingWrites {
    fn record(&mut self, buffer: BufferRef, stage: PipelineStage) {
        self.0.push((buffer, stage, PipelineStage::ComputeShader));
        if stage == PipelineStage::ComputeShader {
            self.0.push((buffer, stage, PipelineStage::Transfer));
        }
    }

    fn apply(&mut self, barrier: &Barrier) {
        if barrier.src_access.has_write() {
            self.0.retain(|&(_, src, dst)| src != barrier.src_stage || dst != barrier.dst_stage);
        }
    }

    fn contains(&self, buffer: BufferRef, reader: PipelineStage) -> bool {
        self.0.iter().any(|&(b, _, dst)| b == buffer && dst == reader)
    }
}

impl ComputeBackend for CpuBackend {
    fn create_pipelines(&mut self, kernels: &[Kernel]) -> Result<(), BackendError> {
        for &kernel in kernels {
            if self.rejected == Some(kernel) {
                return Err(BackendError::PipelineCreation(kernel));
            }
            self.pipelines.insert(kernel);
        }
        info!("created {} host compute pipelines", self.pipelines.len());
        Ok(())
    }

    fn create_buffer(&mut self, buffer: BufferRef, size: usize) -> Result<(), BackendError> {
        if buffer.slot >= FRAMES_IN_FLIGHT {
            return Err(BackendError::InvalidSlot(buffer.slot));
        }
        debug!("buffer {:?}: {} bytes", buffer, size);
        self.buffers.insert(buffer, vec![0; size]);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferRef) {
        self.buffers.remove(&buffer);
    }

    fn write_buffer(&mut self, buffer: BufferRef, data: &[u8]) -> Result<(), BackendError> {
        self.store(buffer, data)
    }

    fn read_buffer(&self, buffer: BufferRef) -> Result<Vec<u8>, BackendError> {
        self.buffer(buffer).cloned()
    }

    fn upload_volume_maps(&mut self, maps: &[VolumeMap]) -> Result<(), BackendError> {
        self.volume_maps = maps.to_vec();
        Ok(())
    }

    fn submit(&mut self, commands: &CommandList) -> Result<(), BackendError> {
        let slot = commands.slot;
        if slot >= FRAMES_IN_FLIGHT {
            return Err(BackendError::InvalidSlot(slot));
        }
        let mut pending = std::mem::take(&mut self.unflushed);

        for command in &commands.commands {
            match command {
                Command::ResetQueries { first, count } => {
                    let queries = &mut self.queries[slot];
                    let end = (*first + *count) as usize;
                    if queries.len() < end {
                        queries.resize(end, None);
                    }
                    queries[*first as usize..end].fill(None);
                }
                Command::WriteTimestamp { query } => {
                    let now = self.timestamp();
                    let queries = &mut self.queries[slot];
                    if let Some(q) = queries.get_mut(*query as usize) {
                        *q = Some(now);
                    }
                }
                Command::CopyBuffer { src, dst } => {
                    if pending.contains(*src, PipelineStage::Transfer) {
                        return Err(BackendError::TransferHazard { buffer: *src });
                    }
                    self.copy(*src, *dst)?;
                    pending.record(*dst, PipelineStage::Transfer);
                }
                Command::Barrier(barrier) => pending.apply(barrier),
                Command::Dispatch(dispatch) => {
                    if !self.pipelines.contains(&dispatch.kernel) {
                        return Err(BackendError::MissingPipeline(dispatch.kernel));
                    }
                    for role in dispatch.kernel.reads(dispatch.bindings) {
                        let buffer = BufferRef::new(slot, role);
                        if pending.contains(buffer, PipelineStage::ComputeShader) {
                            return Err(BackendError::Hazard { kernel: dispatch.kernel, buffer });
                        }
                    }
                    self.execute(slot, dispatch)?;
                    for role in dispatch.kernel.writes(dispatch.bindings) {
                        pending.record(BufferRef::new(slot, role), PipelineStage::ComputeShader);
                    }
                }
            }
        }
        self.unflushed = pending;
        Ok(())
    }

    fn wait(&mut self, slot: usize) -> Result<(), BackendError> {
        if slot >= FRAMES_IN_FLIGHT {
            return Err(BackendError::InvalidSlot(slot));
        }
        Ok(())
    }

    fn query_results(&mut self, slot: usize, count: u32) -> Option<Vec<u64>> {
        self.queries.get(slot)?.get(..count as usize)?.iter().copied().collect()
    }

    fn timestamp_period(&self) -> f32 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::backend::{Bindings, Ping};
    use crate::gpu::ffi::BitonicSortParameters;
    use crate::settings::SphSettings;

    fn push() -> PushConstants {
        PushConstants {
            settings: SphSettings::default().to_gpu(4, 4, 0),
            sort: BitonicSortParameters::default(),
            _pad: [0; 2],
        }
    }

    fn backend_with_buffers() -> CpuBackend {
        let mut backend = CpuBackend::new();
        backend.create_pipelines(&Kernel::ALL).unwrap();
        for role in [BufferRole::Lr(Ping::A), BufferRole::Lr(Ping::B)] {
            backend.create_buffer(BufferRef::new(0, role), 4 * size_of::<LrParticle>()).unwrap();
        }
        backend.create_buffer(BufferRef::new(0, BufferRole::GridEntries), 4 * 8).unwrap();
        backend.create_buffer(BufferRef::new(0, BufferRole::StartingIndices), 4 * 4).unwrap();
        backend
    }

    #[test]
    fn reading_unbarriered_writes_is_a_hazard() {
        let mut backend = backend_with_buffers();
        let bindings = Bindings { src: Ping::A, dst: Ping::B };
        let mut commands = CommandList::new(0);
        commands.dispatch(Kernel::GridInit, bindings, &push(), [1, 1, 1]);
        commands.dispatch(Kernel::StartingIndices, bindings, &push(), [1, 1, 1]);
        let err = backend.submit(&commands).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Hazard { kernel: Kernel::StartingIndices, buffer }
                if buffer.role == BufferRole::GridEntries
        ));

        let mut commands = CommandList::new(0);
        commands.dispatch(Kernel::GridInit, bindings, &push(), [1, 1, 1]);
        commands.barrier(Barrier::COMPUTE);
        commands.dispatch(Kernel::StartingIndices, bindings, &push(), [1, 1, 1]);
        backend.submit(&commands).unwrap();
    }

    #[test]
    fn copies_wait_for_shader_writes_of_earlier_submissions() {
        let mut backend = backend_with_buffers();
        let bindings = Bindings { src: Ping::A, dst: Ping::B };
        let mut commands = CommandList::new(0);
        commands.dispatch(Kernel::Integrate, bindings, &push(), [1, 1, 1]);
        commands.barrier(Barrier::COMPUTE);
        backend.submit(&commands).unwrap();

        let written = BufferRef::new(0, BufferRole::Lr(Ping::B));
        let copy_back = |barrier: Option<Barrier>| {
            let mut commands = CommandList::new(0);
            if let Some(barrier) = barrier {
                commands.barrier(barrier);
            }
            commands.copy_buffer(written, BufferRef::new(0, BufferRole::Lr(Ping::A)));
            commands
        };
        let err = backend.submit(&copy_back(None)).unwrap_err();
        assert!(matches!(err, BackendError::TransferHazard { buffer } if buffer == written));

        // the failed submission left nothing outstanding, so write again
        let mut commands = CommandList::new(0);
        commands.dispatch(Kernel::Integrate, bindings, &push(), [1, 1, 1]);
        commands.barrier(Barrier::COMPUTE);
        backend.submit(&commands).unwrap();
        backend.submit(&copy_back(Some(Barrier::COMPUTE_TO_TRANSFER))).unwrap();
    }

    #[test]
    fn missing_pipeline_is_reported() {
        let err = CpuBackend::rejecting(Kernel::Stress).create_pipelines(&Kernel::ALL).unwrap_err();
        assert!(matches!(err, BackendError::PipelineCreation(Kernel::Stress)));
    }

    #[test]
    fn queries_need_every_timestamp() {
        let mut backend = backend_with_buffers();
        let mut commands = CommandList::new(0);
        commands.reset_queries(0, 4);
        commands.write_timestamp(0);
        commands.write_timestamp(1);
        backend.submit(&commands).unwrap();
        assert_eq!(backend.query_results(0, 2).map(|q| q.len()), Some(2));
        assert_eq!(backend.query_results(0, 3), None);
    }
}
