use glam::UVec2;

use crate::{DeviceLimits, TextureFormat};

/// Handle to a framebuffer tracked by a [crate::RenderDevice].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct FramebufferId(pub generational_arena::Index);

/// A slot on a framebuffer a texture can be attached to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Attachment {
    Color(u32),
    Depth,
}

/// Where draw commands end up.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RenderTarget {
    /// The display surface.
    Surface,
    Framebuffer(FramebufferId),
}

/// Completeness of a framebuffer as reported by the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FramebufferStatus {
    Complete,
    /// An attached texture is missing, has no storage or has a format that can't be rendered
    /// into the slot it is attached to.
    IncompleteAttachment,
    /// Nothing is attached.
    MissingAttachment,
    /// Attached textures don't all have the same size.
    IncompleteDimensions,
    /// A declared draw buffer has no texture attached.
    IncompleteDrawBuffer,
    /// The combination is valid, but exceeds what the device supports.
    Unsupported,
}

impl FramebufferStatus {
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }
}

impl std::fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::IncompleteAttachment => "incomplete attachment",
            Self::MissingAttachment => "missing attachment",
            Self::IncompleteDimensions => "incomplete dimensions",
            Self::IncompleteDrawBuffer => "incomplete draw buffer",
            Self::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// What the device knows about a single attachment when checking completeness.
#[derive(Clone, Copy, Debug)]
pub struct AttachmentState {
    pub attachment: Attachment,
    /// `None` if the attached texture no longer exists.
    pub format: Option<TextureFormat>,
    pub size: UVec2,
}

/// Checks a set of attachments the same way for every backend.
pub fn check_completeness(
    attachments: &[AttachmentState],
    draw_buffers: &[u32],
    limits: &DeviceLimits,
) -> FramebufferStatus {
    if attachments.is_empty() {
        return FramebufferStatus::MissingAttachment;
    }

    let mut color_bytes = 0;
    let mut color_count = 0;

    for state in attachments {
        let Some(format) = state.format else {
            return FramebufferStatus::IncompleteAttachment;
        };

        if state.size.x == 0 || state.size.y == 0 {
            return FramebufferStatus::IncompleteAttachment;
        }

        match state.attachment {
            Attachment::Depth if !format.is_depth() => {
                return FramebufferStatus::IncompleteAttachment;
            }
            Attachment::Color(_) if format.is_depth() => {
                return FramebufferStatus::IncompleteAttachment;
            }
            Attachment::Color(slot) => {
                if slot >= limits.max_color_attachments {
                    return FramebufferStatus::Unsupported;
                }
                color_count += 1;
                color_bytes += format.bytes_per_texel();
            }
            Attachment::Depth => {}
        }

        if state.size.x > limits.max_texture_dimension_2d
            || state.size.y > limits.max_texture_dimension_2d
        {
            return FramebufferStatus::Unsupported;
        }
    }

    let first = attachments[0].size;
    if attachments.iter().any(|state| state.size != first) {
        return FramebufferStatus::IncompleteDimensions;
    }

    for slot in draw_buffers {
        let attached = attachments
            .iter()
            .any(|state| state.attachment == Attachment::Color(*slot));
        if !attached {
            return FramebufferStatus::IncompleteDrawBuffer;
        }
    }

    if color_count > limits.max_color_attachments
        || color_bytes > limits.max_color_attachment_bytes_per_sample
    {
        return FramebufferStatus::Unsupported;
    }

    FramebufferStatus::Complete
}
