//! Contract between the frame orchestrator and whatever executes the kernels.
//!
//! The orchestrator records a [`CommandList`] per frame slot; a backend creates
//! the buffers, runs the dispatches in order and signals the slot's fence.

use std::ops::BitOr;

use bytemuck::Pod;

use crate::boundary::VolumeMap;
use crate::error::BackendError;

/// Role of one of the two LR buffers of a frame slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Ping {
    #[default]
    A,
    B,
}

impl Ping {
    pub fn other(self) -> Self {
        match self {
            Ping::A => Ping::B,
            Ping::B => Ping::A,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Lr(Ping),
    Hr,
    GridEntries,
    StartingIndices,
    VolumeMapTransforms,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferRef {
    pub slot: usize,
    pub role: BufferRole,
}

impl BufferRef {
    pub fn new(slot: usize, role: BufferRole) -> Self {
        Self { slot, role }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    GridInit,
    BitonicSort,
    StartingIndices,
    Density,
    IisphAdvection,
    IisphDensityAdvection,
    IisphDijpj,
    IisphPressure,
    IisphCommit,
    Stress,
    InternalForce,
    Integrate,
    HrAdvection,
}

impl Kernel {
    pub const ALL: [Kernel; 13] = [
        Kernel::GridInit,
        Kernel::BitonicSort,
        Kernel::StartingIndices,
        Kernel::Density,
        Kernel::IisphAdvection,
        Kernel::IisphDensityAdvection,
        Kernel::IisphDijpj,
        Kernel::IisphPressure,
        Kernel::IisphCommit,
        Kernel::Stress,
        Kernel::InternalForce,
        Kernel::Integrate,
        Kernel::HrAdvection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Kernel::GridInit => "grid init",
            Kernel::BitonicSort => "bitonic sort",
            Kernel::StartingIndices => "starting indices",
            Kernel::Density => "density",
            Kernel::IisphAdvection => "iisph advection",
            Kernel::IisphDensityAdvection => "iisph density advection",
            Kernel::IisphDijpj => "iisph dijpj",
            Kernel::IisphPressure => "iisph pressure",
            Kernel::IisphCommit => "iisph commit",
            Kernel::Stress => "stress",
            Kernel::InternalForce => "internal force",
            Kernel::Integrate => "integrate",
            Kernel::HrAdvection => "hr advection",
        }
    }

    /// Whether the kernel reads LR particles through the spatial hash.
    fn uses_grid(&self) -> bool {
        !matches!(
            self,
            Kernel::GridInit
                | Kernel::BitonicSort
                | Kernel::StartingIndices
                | Kernel::IisphCommit
                | Kernel::Integrate
                | Kernel::HrAdvection
        )
    }

    pub fn reads(&self, bindings: Bindings) -> Vec<BufferRole> {
        match self {
            Kernel::GridInit => vec![BufferRole::Lr(bindings.src)],
            Kernel::BitonicSort | Kernel::StartingIndices => vec![BufferRole::GridEntries],
            Kernel::HrAdvection => vec![BufferRole::Lr(bindings.src), BufferRole::Hr],
            k if k.uses_grid() => vec![
                BufferRole::Lr(bindings.src),
                BufferRole::GridEntries,
                BufferRole::StartingIndices,
                BufferRole::VolumeMapTransforms,
            ],
            _ => vec![BufferRole::Lr(bindings.src)],
        }
    }

    pub fn writes(&self, bindings: Bindings) -> Vec<BufferRole> {
        match self {
            Kernel::GridInit => vec![BufferRole::GridEntries, BufferRole::StartingIndices],
            Kernel::BitonicSort => vec![BufferRole::GridEntries],
            Kernel::StartingIndices => vec![BufferRole::StartingIndices],
            Kernel::HrAdvection => vec![BufferRole::Hr],
            _ => vec![BufferRole::Lr(bindings.dst)],
        }
    }
}

/// LR buffers bound to a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bindings {
    pub src: Ping,
    pub dst: Ping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Transfer,
    ComputeShader,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessFlags(pub u32);

impl AccessFlags {
    pub const SHADER_READ: Self = Self(1);
    pub const SHADER_WRITE: Self = Self(1 << 1);
    pub const TRANSFER_READ: Self = Self(1 << 2);
    pub const TRANSFER_WRITE: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn has_write(self) -> bool {
        self.0 & (Self::SHADER_WRITE.0 | Self::TRANSFER_WRITE.0) != 0
    }
}

impl BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Barrier {
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

impl Barrier {
    /// Shader writes visible to the next dispatch.
    pub const COMPUTE: Self = Self {
        src_stage: PipelineStage::ComputeShader,
        dst_stage: PipelineStage::ComputeShader,
        src_access: AccessFlags(AccessFlags::SHADER_WRITE.0),
        dst_access: AccessFlags(AccessFlags::SHADER_READ.0 | AccessFlags::SHADER_WRITE.0),
    };

    /// Previous frames' shader writes visible to this frame's pass-through copy.
    pub const COMPUTE_TO_TRANSFER: Self = Self {
        src_stage: PipelineStage::ComputeShader,
        dst_stage: PipelineStage::Transfer,
        src_access: AccessFlags(AccessFlags::SHADER_WRITE.0),
        dst_access: AccessFlags(AccessFlags::TRANSFER_READ.0),
    };

    /// Buffer copies visible to the first dispatch of a frame.
    pub const TRANSFER_TO_COMPUTE: Self = Self {
        src_stage: PipelineStage::Transfer,
        dst_stage: PipelineStage::ComputeShader,
        src_access: AccessFlags(AccessFlags::TRANSFER_WRITE.0),
        dst_access: AccessFlags(AccessFlags::SHADER_READ.0 | AccessFlags::SHADER_WRITE.0),
    };
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dispatch {
    pub kernel: Kernel,
    pub bindings: Bindings,
    pub push_constants: Vec<u8>,
    pub workgroups: [u32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ResetQueries { first: u32, count: u32 },
    WriteTimestamp { query: u32 },
    CopyBuffer { src: BufferRef, dst: BufferRef },
    Dispatch(Dispatch),
    Barrier(Barrier),
}

/// Recorded compute work for one frame slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandList {
    pub slot: usize,
    pub commands: Vec<Command>,
}

impl CommandList {
    pub fn new(slot: usize) -> Self {
        Self { slot, commands: Vec::new() }
    }

    pub fn dispatch<P: Pod>(&mut self, kernel: Kernel, bindings: Bindings, push: &P, workgroups: [u32; 3]) {
        self.commands.push(Command::Dispatch(Dispatch {
            kernel,
            bindings,
            push_constants: bytemuck::bytes_of(push).to_vec(),
            workgroups,
        }));
    }

    pub fn barrier(&mut self, barrier: Barrier) {
        self.commands.push(Command::Barrier(barrier));
    }

    pub fn copy_buffer(&mut self, src: BufferRef, dst: BufferRef) {
        self.commands.push(Command::CopyBuffer { src, dst });
    }

    pub fn write_timestamp(&mut self, query: u32) {
        self.commands.push(Command::WriteTimestamp { query });
    }

    pub fn reset_queries(&mut self, first: u32, count: u32) {
        self.commands.push(Command::ResetQueries { first, count });
    }

    pub fn dispatches(&self) -> impl Iterator<Item = &Dispatch> {
        self.commands.iter().filter_map(|c| match c {
            Command::Dispatch(d) => Some(d),
            _ => None,
        })
    }

    pub fn count_dispatches(&self, kernel: Kernel) -> usize {
        self.dispatches().filter(|d| d.kernel == kernel).count()
    }
}

pub trait ComputeBackend {
    /// Builds one pipeline per kernel. Failure is fatal at startup.
    fn create_pipelines(&mut self, kernels: &[Kernel]) -> Result<(), BackendError>;

    fn create_buffer(&mut self, buffer: BufferRef, size: usize) -> Result<(), BackendError>;

    fn destroy_buffer(&mut self, buffer: BufferRef);

    fn write_buffer(&mut self, buffer: BufferRef, data: &[u8]) -> Result<(), BackendError>;

    /// Map, copy out and unmap.
    fn read_buffer(&self, buffer: BufferRef) -> Result<Vec<u8>, BackendError>;

    /// Replaces the sampled volume-map images.
    fn upload_volume_maps(&mut self, maps: &[VolumeMap]) -> Result<(), BackendError>;

    fn submit(&mut self, commands: &CommandList) -> Result<(), BackendError>;

    /// Blocks until the slot's last submission has completed.
    fn wait(&mut self, slot: usize) -> Result<(), BackendError>;

    /// Raw timestamps of a slot, `None` while the queries are not available.
    fn query_results(&mut self, slot: usize, count: u32) -> Option<Vec<u64>>;

    /// Nanoseconds per timestamp tick.
    fn timestamp_period(&self) -> f32;
}

/// Reinterprets mapped bytes as a typed vector.
pub fn read_pod<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}
