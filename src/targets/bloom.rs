use glam::UVec2;
use renderer::{Attachment, FramebufferId, RenderDevice, TextureId};

use super::{FramebufferRole, create_color_target, validate};
use crate::error::ResourceError;

/// Intermediate targets of the bloom post process.
///
/// Shading writes the lit image and its bright parts into the capture framebuffer, the blur pass
/// writes the blurred bright parts into the blur framebuffer.
pub struct BloomTargets {
    size: UVec2,
    capture: FramebufferId,
    blur: FramebufferId,
    rendered: TextureId,
    bright: TextureId,
    blurred: TextureId,
}

impl BloomTargets {
    pub fn create<D: RenderDevice>(device: &mut D, size: UVec2) -> Result<Self, ResourceError> {
        tracing::info!("Creating bloom targets ({}x{})", size.x, size.y);

        let capture = device.create_framebuffer("bloom_capture");
        let rendered = create_color_target(device, "bloom_rendered".to_string(), size);
        let bright = create_color_target(device, "bloom_bright".to_string(), size);
        device.attach_texture(capture, Attachment::Color(0), rendered);
        device.attach_texture(capture, Attachment::Color(1), bright);
        device.set_draw_buffers(capture, &[0, 1]);

        let blur = device.create_framebuffer("bloom_blur");
        let blurred = create_color_target(device, "bloom_blurred".to_string(), size);
        device.attach_texture(blur, Attachment::Color(0), blurred);
        device.set_draw_buffers(blur, &[0]);

        let targets = Self {
            size,
            capture,
            blur,
            rendered,
            bright,
            blurred,
        };

        if let Err(err) = targets.validate(device) {
            targets.destroy(device);
            return Err(err);
        }

        Ok(targets)
    }

    /// Reallocate all three textures at `size`. Contents are discarded, handles stay the same.
    pub fn resize<D: RenderDevice>(
        &mut self,
        device: &mut D,
        size: UVec2,
    ) -> Result<(), ResourceError> {
        tracing::info!("Resizing bloom targets ({}x{})", size.x, size.y);

        for texture in [self.rendered, self.bright, self.blurred] {
            device.allocate_texture(texture, size);
        }
        self.size = size;

        self.validate(device)
    }

    fn validate<D: RenderDevice>(&self, device: &D) -> Result<(), ResourceError> {
        validate(device, self.capture, FramebufferRole::BloomCapture)?;
        validate(device, self.blur, FramebufferRole::BloomBlur)
    }

    pub fn destroy<D: RenderDevice>(self, device: &mut D) {
        device.destroy_framebuffer(self.capture);
        device.destroy_framebuffer(self.blur);
        for texture in [self.rendered, self.bright, self.blurred] {
            device.destroy_texture(texture);
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// Framebuffer shading renders into: `rendered` in slot 0, `bright` in slot 1.
    pub fn capture_framebuffer(&self) -> FramebufferId {
        self.capture
    }

    /// Framebuffer the blur pass renders into.
    pub fn blur_framebuffer(&self) -> FramebufferId {
        self.blur
    }

    pub fn rendered(&self) -> TextureId {
        self.rendered
    }

    pub fn bright(&self) -> TextureId {
        self.bright
    }

    pub fn blurred(&self) -> TextureId {
        self.blurred
    }

    pub fn textures(&self) -> [TextureId; 3] {
        [self.rendered, self.bright, self.blurred]
    }
}
