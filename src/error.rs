use renderer::FramebufferStatus;

use crate::{collaborators::ProgramKind, targets::FramebufferRole};

/// Failure to create or reallocate a render target.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("{role} framebuffer incomplete ({status})")]
    IncompleteFramebuffer {
        role: FramebufferRole,
        status: FramebufferStatus,
    },
}

/// Error reported by a [crate::collaborators::ProgramLoader].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProgramLoadError(pub String);

impl From<renderer::DeviceError> for ProgramLoadError {
    fn from(err: renderer::DeviceError) -> Self {
        Self(err.to_string())
    }
}

/// Failure to construct a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("Shading needs {required} texture units, the device supports {available}")]
    TextureUnits { required: u32, available: u32 },
    #[error("Could not load the {} program: {source}", .kind.label())]
    Program {
        kind: ProgramKind,
        source: ProgramLoadError,
    },
}
