use glam::UVec2;
use renderer::{
    Attachment, FramebufferId, RenderDevice, TextureDescriptor, TextureFormat, TextureId,
};

use super::{FramebufferRole, create_color_target, validate};
use crate::error::ResourceError;

/// A single color output of the geometry pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::AsRefStr, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum GBufferAttachment {
    Albedo,
    Normal,
    /// View space position. Left out of the reduced layout, where shading reconstructs it from
    /// depth.
    Position,
}

/// Which color outputs the geometry pass writes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum GBufferLayout {
    #[default]
    Full,
    Reduced,
}

impl GBufferLayout {
    /// The attachments, in color slot order.
    pub fn attachments(self) -> &'static [GBufferAttachment] {
        use GBufferAttachment as A;
        match self {
            Self::Full => &[A::Albedo, A::Normal, A::Position],
            Self::Reduced => &[A::Albedo, A::Normal],
        }
    }

    pub fn attachment_count(self) -> u32 {
        self.attachments().len() as u32
    }
}

/// The outputs of the geometry pass: a depth texture and one color texture per attachment of the
/// layout, all bound to a single framebuffer.
pub struct GeometryBuffers {
    layout: GBufferLayout,
    size: UVec2,
    framebuffer: FramebufferId,
    depth: TextureId,
    colors: Vec<TextureId>,
}

impl GeometryBuffers {
    pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth16Unorm;

    pub fn create<D: RenderDevice>(
        device: &mut D,
        size: UVec2,
        layout: GBufferLayout,
    ) -> Result<Self, ResourceError> {
        tracing::info!(
            "Creating geometry buffers ({}x{}, {} color attachments)",
            size.x,
            size.y,
            layout.attachment_count()
        );

        let framebuffer = device.create_framebuffer("geometry_buffers");

        let depth = device.create_texture(TextureDescriptor::render_target(
            "geometry_buffers_depth",
            Self::DEPTH_FORMAT,
        ));
        device.allocate_texture(depth, size);
        device.attach_texture(framebuffer, Attachment::Depth, depth);

        let colors: Vec<TextureId> = layout
            .attachments()
            .iter()
            .enumerate()
            .map(|(slot, attachment)| {
                let label = format!("geometry_buffers_{}", attachment.as_ref());
                let texture = create_color_target(device, label, size);
                device.attach_texture(framebuffer, Attachment::Color(slot as u32), texture);
                texture
            })
            .collect();

        let slots: Vec<u32> = (0..colors.len() as u32).collect();
        device.set_draw_buffers(framebuffer, &slots);

        let buffers = Self {
            layout,
            size,
            framebuffer,
            depth,
            colors,
        };

        if let Err(err) = validate(device, framebuffer, FramebufferRole::GeometryBuffers) {
            buffers.destroy(device);
            return Err(err);
        }

        Ok(buffers)
    }

    /// Reallocate every texture at `size`. Contents are discarded, handles stay the same.
    pub fn resize<D: RenderDevice>(
        &mut self,
        device: &mut D,
        size: UVec2,
    ) -> Result<(), ResourceError> {
        tracing::info!("Resizing geometry buffers ({}x{})", size.x, size.y);

        device.allocate_texture(self.depth, size);
        for texture in self.colors.iter() {
            device.allocate_texture(*texture, size);
        }
        self.size = size;

        validate(device, self.framebuffer, FramebufferRole::GeometryBuffers)
    }

    pub fn destroy<D: RenderDevice>(self, device: &mut D) {
        device.destroy_framebuffer(self.framebuffer);
        device.destroy_texture(self.depth);
        for texture in self.colors {
            device.destroy_texture(texture);
        }
    }

    pub fn layout(&self) -> GBufferLayout {
        self.layout
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }

    pub fn depth(&self) -> TextureId {
        self.depth
    }

    /// Color textures in slot order.
    pub fn colors(&self) -> &[TextureId] {
        &self.colors
    }

    /// Texture of a single attachment, `None` if the layout doesn't have it.
    pub fn color(&self, attachment: GBufferAttachment) -> Option<TextureId> {
        self.layout
            .attachments()
            .iter()
            .position(|a| *a == attachment)
            .map(|slot| self.colors[slot])
    }
}
