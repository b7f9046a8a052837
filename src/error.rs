use thiserror::Error;

use crate::gpu::backend::{BufferRef, Kernel};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to create compute pipeline for {0:?}")]
    PipelineCreation(Kernel),
    #[error("no pipeline was created for {0:?}")]
    MissingPipeline(Kernel),
    #[error("buffer {0:?} does not exist")]
    MissingBuffer(BufferRef),
    #[error("buffer {buffer:?} holds {expected} bytes, got {actual}")]
    SizeMismatch { buffer: BufferRef, expected: usize, actual: usize },
    #[error("frame slot {0} is out of range")]
    InvalidSlot(usize),
    #[error("{kernel:?} reads {buffer:?} before a barrier made earlier writes visible")]
    Hazard { kernel: Kernel, buffer: BufferRef },
    #[error("copy reads {buffer:?} before a barrier made shader writes visible to transfers")]
    TransferHazard { buffer: BufferRef },
    #[error("malformed push constants for {0:?}")]
    PushConstants(Kernel),
    #[error("queue submission failed: {0}")]
    Submission(String),
}

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("scene has no particles")]
    EmptyScene,
}
