use glam::UVec2;

use crate::{
    Attachment, BufferDescriptor, BufferId, FramebufferId, FramebufferStatus, ProgramDescriptor,
    ProgramId, RenderTarget, ShaderId, TextureDescriptor, TextureFormat, TextureId, TextureUnit,
    Uniform, UniformValue,
};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Program uses an unknown shader ({0})")]
    UnknownShader(String),
}

bitflags::bitflags! {
    /// Which planes of the bound render target a clear touches.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

/// Limits the device enforces when checking framebuffers and binding textures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceLimits {
    pub max_color_attachments: u32,
    pub max_color_attachment_bytes_per_sample: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_units: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_color_attachments: 8,
            max_color_attachment_bytes_per_sample: 64,
            max_texture_dimension_2d: 8192,
            max_texture_units: 16,
        }
    }
}

impl DeviceLimits {
    pub fn from_wgpu(limits: &wgpu::Limits) -> Self {
        Self {
            max_color_attachments: limits.max_color_attachments,
            max_color_attachment_bytes_per_sample: limits.max_color_attachment_bytes_per_sample,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
            max_texture_units: limits.max_sampled_textures_per_shader_stage,
        }
    }
}

/// The command surface of a single rendering context.
///
/// Commands are consumed strictly in submission order. State set by one command (bound render
/// target, current program, texture units) stays in effect until it is replaced. Unknown handles
/// are ignored with a warning rather than reported as errors.
pub trait RenderDevice {
    fn limits(&self) -> DeviceLimits;

    /// Current size of the display surface.
    fn surface_size(&self) -> UVec2;

    fn surface_format(&self) -> TextureFormat;

    // Textures ------------------------------------------------------------------------------------

    /// Create a texture handle without storage. Storage is provided by [Self::allocate_texture].
    fn create_texture(&mut self, descriptor: TextureDescriptor) -> TextureId;

    /// (Re)allocate storage for `texture`. Previous contents are discarded. The handle and every
    /// framebuffer the texture is attached to stays valid.
    fn allocate_texture(&mut self, texture: TextureId, size: UVec2);

    /// Size of the texture's storage, `None` for unknown textures.
    fn texture_size(&self, texture: TextureId) -> Option<UVec2>;

    /// Upload float texels, row major. Only valid for float formats.
    fn write_texture(&mut self, texture: TextureId, data: &[f32]);

    fn destroy_texture(&mut self, texture: TextureId);

    // Framebuffers --------------------------------------------------------------------------------

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId;

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: TextureId,
    );

    /// Declare which color slots are written simultaneously, in fragment output order.
    fn set_draw_buffers(&mut self, framebuffer: FramebufferId, slots: &[u32]);

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;

    /// Texture attached to a slot, `None` if nothing is attached or the framebuffer is unknown.
    fn framebuffer_attachment(
        &self,
        framebuffer: FramebufferId,
        attachment: Attachment,
    ) -> Option<TextureId>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    // Buffers, shaders and programs ---------------------------------------------------------------

    fn create_buffer(&mut self, descriptor: BufferDescriptor, contents: &[u8]) -> BufferId;

    fn create_shader(&mut self, label: &str, source: &str) -> ShaderId;

    fn create_program(&mut self, descriptor: ProgramDescriptor) -> Result<ProgramId, DeviceError>;

    fn destroy_program(&mut self, program: ProgramId);

    // Frame commands ------------------------------------------------------------------------------

    fn begin_frame(&mut self);

    fn end_frame(&mut self);

    fn set_viewport(&mut self, size: UVec2);

    fn bind_render_target(&mut self, target: RenderTarget);

    fn clear(&mut self, flags: ClearFlags);

    fn use_program(&mut self, program: ProgramId);

    /// Set a uniform on the current program.
    fn set_uniform(&mut self, uniform: Uniform, value: UniformValue<'_>);

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId);

    /// Draw a quad covering the whole viewport with the current program.
    fn draw_fullscreen_quad(&mut self);

    /// Draw indexed geometry with the current program.
    fn draw_indexed(&mut self, vertices: BufferId, indices: BufferId, index_count: u32);
}
