//! Render target lifecycle and pass orchestration for a clustered deferred renderer.
//!
//! [ClusteredDeferredPipeline] owns the geometry buffers and bloom targets, reallocates them when
//! the surface changes size and drives every pass of a frame through a [renderer::RenderDevice].

pub mod binding;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod frame;
pub mod kernel;
pub mod light_texture;
pub mod pipeline;
pub mod resize;
pub mod targets;

#[cfg(test)]
mod testing;

pub use collaborators::{Camera, ClusterBuilder, Light, LightDataSource, ProgramLoader, Scene};
pub use config::{ClusterGrid, PipelineConfig};
pub use error::{PipelineError, ProgramLoadError, ResourceError};
pub use light_texture::LightTexture;
pub use pipeline::{ClusteredDeferredPipeline, Collaborators};
pub use targets::GBufferLayout;
