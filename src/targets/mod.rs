//! Render targets owned by the pipeline.
//!
//! Every target set keeps its texture and framebuffer handles for its whole life. A resize only
//! reallocates the storage behind the handles, so attachments and bindings never have to be
//! re-established.

mod bloom;
mod gbuffer;

pub use bloom::BloomTargets;
pub use gbuffer::{GBufferAttachment, GBufferLayout, GeometryBuffers};

use glam::UVec2;
use renderer::{FramebufferId, RenderDevice, TextureDescriptor, TextureFormat, TextureId};

use crate::error::ResourceError;

/// Which framebuffer a [ResourceError] is about.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display)]
pub enum FramebufferRole {
    #[strum(to_string = "geometry buffers")]
    GeometryBuffers,
    #[strum(to_string = "bloom capture")]
    BloomCapture,
    #[strum(to_string = "bloom blur")]
    BloomBlur,
}

/// Format of every color target the pipeline renders into.
pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba32Float;

/// Create a nearest sampled color target with storage of `size`.
fn create_color_target<D: RenderDevice>(device: &mut D, label: String, size: UVec2) -> TextureId {
    let texture = device.create_texture(TextureDescriptor::render_target(label, COLOR_FORMAT));
    device.allocate_texture(texture, size);
    texture
}

/// Ask the device whether `framebuffer` can be rendered into.
fn validate<D: RenderDevice>(
    device: &D,
    framebuffer: FramebufferId,
    role: FramebufferRole,
) -> Result<(), ResourceError> {
    let status = device.framebuffer_status(framebuffer);
    if status.is_complete() {
        Ok(())
    } else {
        tracing::warn!("The {} framebuffer is {}", role, status);
        Err(ResourceError::IncompleteFramebuffer { role, status })
    }
}
