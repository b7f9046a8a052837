//! Records the per-frame compute sequence into a [`CommandList`].

use crate::gpu::backend::{Barrier, BufferRef, BufferRole, CommandList, Kernel, Ping};
use crate::gpu::ffi::{BitonicSortParameters, GpuSettings, PushConstants};
use crate::gpu::profiler::Profiler;
use crate::gpu::sort::{bitonic_schedule, sort_workgroups};
use crate::gpu::store::{HR_OFFSETS_PER_PARTICLE, PingPong};

pub const PARTICLE_WORKGROUP_SIZE: u32 = 256;

#[inline]
pub fn particle_workgroups(count: u32) -> [u32; 3] {
    [count.max(1).div_ceil(PARTICLE_WORKGROUP_SIZE), 1, 1]
}

/// Everything the orchestrator needs to know about the frame being recorded.
#[derive(Clone, Copy, Debug)]
pub struct FrameInputs {
    pub slot: usize,
    pub previous_slot: usize,
    /// Ping holding the previous slot's committed LR state.
    pub previous_committed: Ping,
    pub settings: GpuSettings,
    pub pressure_iterations: u32,
    /// Physics runs only when unpaused or single-stepping.
    pub step: bool,
}

#[derive(Clone, Debug)]
pub struct RecordedFrame {
    pub commands: CommandList,
    /// Ping holding this slot's result once the commands have executed.
    pub committed: Ping,
}

pub struct FrameOrchestrator<'a> {
    inputs: FrameInputs,
    profiler: &'a mut Profiler,
    commands: CommandList,
    arena: PingPong,
}

impl<'a> FrameOrchestrator<'a> {
    pub fn new(inputs: FrameInputs, profiler: &'a mut Profiler) -> Self {
        Self {
            inputs,
            profiler,
            commands: CommandList::new(inputs.slot),
            arena: PingPong::starting_at(Ping::A),
        }
    }

    /// Records one frame: pass-through copy, then the simulation stages.
    pub fn record_frame(inputs: FrameInputs, profiler: &'a mut Profiler) -> RecordedFrame {
        let mut frame = Self::new(inputs, profiler);
        frame.record_copy();
        if inputs.step {
            frame.record_spatial_hash();
            frame.record_solver();
        }
        RecordedFrame { commands: frame.commands, committed: frame.arena.current() }
    }

    fn push(&self, sort: BitonicSortParameters) -> PushConstants {
        PushConstants { settings: self.inputs.settings, sort, _pad: [0; 2] }
    }

    fn timestamp(&mut self, label: impl Into<String>) {
        self.profiler.timestamp(self.inputs.slot, &mut self.commands, label);
    }

    fn record_copy(&mut self) {
        let FrameInputs { slot, previous_slot, previous_committed, .. } = self.inputs;
        self.profiler.begin(slot, &mut self.commands);
        // the previous slot was written by another submission
        self.commands.barrier(Barrier::COMPUTE_TO_TRANSFER);
        self.commands.copy_buffer(
            BufferRef::new(previous_slot, BufferRole::Lr(previous_committed)),
            BufferRef::new(slot, BufferRole::Lr(Ping::A)),
        );
        self.commands.copy_buffer(
            BufferRef::new(previous_slot, BufferRole::Hr),
            BufferRef::new(slot, BufferRole::Hr),
        );
        self.commands.barrier(Barrier::TRANSFER_TO_COMPUTE);
        self.timestamp("copy");
    }

    /// Dispatch that only touches the grid buffers.
    fn grid_stage(&mut self, kernel: Kernel, sort: BitonicSortParameters, workgroups: [u32; 3]) {
        let push = self.push(sort);
        self.commands.dispatch(kernel, self.arena.bindings(), &push, workgroups);
        self.commands.barrier(Barrier::COMPUTE);
    }

    /// Dispatch that reads the current LR buffer and writes the other one.
    fn particle_stage(&mut self, kernel: Kernel, label: impl Into<String>) {
        let push = self.push(BitonicSortParameters::default());
        let bindings = self.arena.advance();
        let workgroups = particle_workgroups(self.inputs.settings.particle_count);
        self.commands.dispatch(kernel, bindings, &push, workgroups);
        self.commands.barrier(Barrier::COMPUTE);
        self.timestamp(label);
    }

    fn record_spatial_hash(&mut self) {
        let padded = self.inputs.settings.padded_count;

        self.grid_stage(Kernel::GridInit, BitonicSortParameters::default(), particle_workgroups(padded));
        self.timestamp(Kernel::GridInit.label());

        let sort_groups = [sort_workgroups(padded), 1, 1];
        for pass in bitonic_schedule(padded) {
            self.grid_stage(Kernel::BitonicSort, pass, sort_groups);
        }
        self.timestamp(Kernel::BitonicSort.label());

        self.grid_stage(Kernel::StartingIndices, BitonicSortParameters::default(), particle_workgroups(padded));
        self.timestamp(Kernel::StartingIndices.label());
    }

    fn record_solver(&mut self) {
        self.particle_stage(Kernel::Density, Kernel::Density.label());
        self.particle_stage(Kernel::IisphAdvection, Kernel::IisphAdvection.label());
        self.particle_stage(Kernel::IisphDensityAdvection, Kernel::IisphDensityAdvection.label());

        for iteration in 0..self.inputs.pressure_iterations {
            self.particle_stage(Kernel::IisphDijpj, format!("iisph dijpj {iteration}"));
            self.particle_stage(Kernel::IisphPressure, format!("iisph pressure {iteration}"));
            self.particle_stage(Kernel::IisphCommit, format!("iisph commit {iteration}"));
        }

        self.particle_stage(Kernel::Stress, Kernel::Stress.label());
        self.particle_stage(Kernel::InternalForce, Kernel::InternalForce.label());
        self.particle_stage(Kernel::Integrate, Kernel::Integrate.label());

        // HR particles are read from the committed LR buffer and written in place
        let push = self.push(BitonicSortParameters::default());
        let hr_count = self.inputs.settings.particle_count * HR_OFFSETS_PER_PARTICLE as u32;
        self.commands.dispatch(Kernel::HrAdvection, self.arena.bindings(), &push, particle_workgroups(hr_count));
        self.commands.barrier(Barrier::COMPUTE);
        self.timestamp(Kernel::HrAdvection.label());
    }
}
