use glam::UVec2;

/// Handle to a texture tracked by a [crate::RenderDevice].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TextureId(pub generational_arena::Index);

/// Renderer-owned texture formats.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    Rgba8UnormSrgb,
    Bgra8UnormSrgb,
    Rgba32Float,
    Depth16Unorm,
}

impl TextureFormat {
    /// Converts this format into `wgpu::TextureFormat`.
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            Self::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            Self::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            Self::Depth16Unorm => wgpu::TextureFormat::Depth16Unorm,
        }
    }

    /// Converts a `wgpu` format back into a renderer format, if it is one we know about.
    pub fn from_wgpu(format: wgpu::TextureFormat) -> Option<Self> {
        Some(match format {
            wgpu::TextureFormat::Rgba8UnormSrgb => Self::Rgba8UnormSrgb,
            wgpu::TextureFormat::Bgra8UnormSrgb => Self::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba32Float => Self::Rgba32Float,
            wgpu::TextureFormat::Depth16Unorm => Self::Depth16Unorm,
            _ => return None,
        })
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth16Unorm)
    }

    /// Size of a single texel in bytes.
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb => 4,
            Self::Rgba32Float => 16,
            Self::Depth16Unorm => 2,
        }
    }

    /// Number of `f32` components a CPU side upload has per texel, for formats that accept
    /// float uploads.
    pub fn float_components(self) -> Option<u32> {
        match self {
            Self::Rgba32Float => Some(4),
            _ => None,
        }
    }
}

/// Everything needed to create a texture, except its storage size, which is given separately
/// so that storage can be reallocated without recreating the texture handle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TextureDescriptor {
    pub label: String,
    pub format: TextureFormat,
}

impl TextureDescriptor {
    /// A texture that can be rendered into and sampled. Every texture is sampled nearest and
    /// clamped to its edges.
    pub fn render_target(label: impl Into<String>, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            format,
        }
    }
}

/// The number of `f32` values needed to fill a texture of `size` with `format`.
pub fn float_upload_len(format: TextureFormat, size: UVec2) -> Option<usize> {
    format
        .float_components()
        .map(|components| (components * size.x * size.y) as usize)
}
