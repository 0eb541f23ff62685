use std::borrow::Cow;

use glam::{Mat4, Vec2};

use crate::TextureFormat;

/// Handle to a shader module tracked by the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ShaderId(pub generational_arena::Index);

/// Handle to a shader program (a linked vertex + fragment stage with its output formats).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ProgramId(pub generational_arena::Index);

/// A numbered slot through which a program samples a bound texture.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TextureUnit(pub u32);

impl TextureUnit {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Every uniform a program in the pipeline can declare.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Uniform {
    ViewProjection,
    View,
    InverseView,
    ScreenSize,
    FieldOfView,
    GaussianKernel,
}

/// A value uploaded to a [Uniform].
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue<'a> {
    Float(f32),
    Vec2(Vec2),
    Mat4(Mat4),
    Floats(Cow<'a, [f32]>),
}

impl UniformValue<'_> {
    pub fn into_owned(self) -> UniformValue<'static> {
        match self {
            Self::Float(v) => UniformValue::Float(v),
            Self::Vec2(v) => UniformValue::Vec2(v),
            Self::Mat4(v) => UniformValue::Mat4(v),
            Self::Floats(v) => UniformValue::Floats(Cow::Owned(v.into_owned())),
        }
    }

    /// The value as tightly packed native endian bytes. Float arrays are packed 4 to a `vec4`,
    /// which is the layout [UniformLayout::push_array] reserves for them.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Float(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Vec2(v) => bytemuck::bytes_of(&v.to_array()).to_vec(),
            Self::Mat4(v) => bytemuck::bytes_of(&v.to_cols_array()).to_vec(),
            Self::Floats(v) => bytemuck::cast_slice(v.as_ref()).to_vec(),
        }
    }
}

/// Location of a single uniform inside a program's uniform block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UniformField {
    pub uniform: Uniform,
    pub offset: u64,
    pub size: u64,
}

/// Byte layout of a program's uniform block, following WGSL uniform address space alignment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    end: u64,
}

impl UniformLayout {
    /// Append a scalar, vector or matrix uniform.
    pub fn push(self, uniform: Uniform) -> Self {
        let (align, size) = match uniform {
            Uniform::ViewProjection | Uniform::View | Uniform::InverseView => (16, 64),
            Uniform::ScreenSize => (8, 8),
            Uniform::FieldOfView => (4, 4),
            // A kernel without a length is a single vec4.
            Uniform::GaussianKernel => (16, 16),
        };
        self.append(uniform, align, size)
    }

    /// Append an array of `len` floats, stored as `array<vec4<f32>, ceil(len / 4)>`.
    pub fn push_array(self, uniform: Uniform, len: u32) -> Self {
        let size = (len as u64).div_ceil(4) * 16;
        self.append(uniform, 16, size)
    }

    fn append(mut self, uniform: Uniform, align: u64, size: u64) -> Self {
        let offset = self.end.next_multiple_of(align);
        self.fields.push(UniformField {
            uniform,
            offset,
            size,
        });
        self.end = offset + size;
        self
    }

    pub fn field(&self, uniform: Uniform) -> Option<&UniformField> {
        self.fields.iter().find(|field| field.uniform == uniform)
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    /// Total size of the block, rounded up to 16 bytes.
    pub fn size(&self) -> u64 {
        self.end.next_multiple_of(16)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn to_wgpu(self) -> wgpu::VertexFormat {
        match self {
            Self::Float32x2 => wgpu::VertexFormat::Float32x2,
            Self::Float32x3 => wgpu::VertexFormat::Float32x3,
            Self::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub offset: u64,
    pub shader_location: u32,
}

/// Layout of the single interleaved vertex buffer a mesh program reads.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VertexLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    pub fn to_wgpu_attributes(&self) -> Vec<wgpu::VertexAttribute> {
        self.attributes
            .iter()
            .map(|attribute| wgpu::VertexAttribute {
                format: attribute.format.to_wgpu(),
                offset: attribute.offset,
                shader_location: attribute.shader_location,
            })
            .collect()
    }
}

/// Everything the device needs to build a program.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramDescriptor {
    pub label: String,
    pub shader: ShaderId,
    pub vertex_entry_point: String,
    pub fragment_entry_point: String,
    /// `None` for programs that draw a full-screen quad without vertex input.
    pub vertex_layout: Option<VertexLayout>,
    /// Formats of the color outputs, in draw buffer order.
    pub color_targets: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub uniforms: UniformLayout,
    /// Number of texture units the program samples from, starting at unit 0.
    pub texture_units: u32,
}
