//! Contracts of everything the pipeline drives, but doesn't own.

use glam::{Mat4, UVec2, Vec3};
use renderer::{
    ProgramDescriptor, ProgramId, ShaderId, TextureFormat, TextureId, Uniform, UniformLayout,
    VertexAttribute, VertexFormat, VertexLayout,
};

use crate::{
    binding::{BlurBindings, CompositeBindings, ShadingBindings},
    error::ProgramLoadError,
    frame::FrameState,
    targets::GBufferLayout,
};

pub trait Camera {
    /// Camera to world transform.
    fn world_transform(&self) -> Mat4;

    fn projection(&self) -> Mat4;

    /// Vertical field of view in degrees.
    fn fov_degrees(&self) -> f32;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub radius: f32,
    pub color: Vec3,
}

pub trait Scene<D> {
    /// Submit every mesh with `program` bound. The scene binds its own material textures.
    fn draw(&self, device: &mut D, program: ProgramId);

    fn lights(&self) -> &[Light];
}

/// Assigns lights to the clusters of the view frustum and keeps the result in a texture.
pub trait ClusterBuilder<D> {
    /// Rebuild the cluster data for this frame and return the texture holding it.
    fn update_clusters(&mut self, device: &mut D, frame: &FrameState, lights: &[Light])
    -> TextureId;

    /// Width (clusters) and height (pixels per cluster) of the cluster data texture.
    fn texture_size(&self) -> UVec2;

    fn max_lights_per_cluster(&self) -> u32;
}

/// Keeps the scene lights in a texture the shading pass can read.
pub trait LightDataSource<D> {
    fn update(&mut self, device: &mut D, lights: &[Light]) -> TextureId;
}

/// Compiles the shader source for a program and creates it on the device.
pub trait ProgramLoader<D> {
    fn load(&mut self, device: &mut D, request: &ProgramRequest)
    -> Result<ProgramId, ProgramLoadError>;
}

/// Which geometry pass shader is used.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GeometryVariant {
    /// Writes albedo, normal and position.
    WithPosition,
    /// Writes albedo and normal.
    NoPosition,
}

impl GeometryVariant {
    pub fn for_layout(layout: GBufferLayout) -> Self {
        match layout {
            GBufferLayout::Full => Self::WithPosition,
            GBufferLayout::Reduced => Self::NoPosition,
        }
    }
}

/// Which shading pass shader is used.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ShadingVariant {
    /// Reads position from the geometry buffers.
    Standard,
    /// Reconstructs position from depth.
    ReducedGBuffer,
    /// Writes the lit color and its bright parts to two targets.
    Bloom,
}

impl ShadingVariant {
    pub fn select(enable_bloom: bool, layout: GBufferLayout) -> Self {
        match (enable_bloom, layout) {
            (true, _) => Self::Bloom,
            (false, GBufferLayout::Reduced) => Self::ReducedGBuffer,
            (false, GBufferLayout::Full) => Self::Standard,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProgramKind {
    Geometry(GeometryVariant),
    Shading(ShadingVariant),
    BloomBlur,
    BloomComposite,
}

impl ProgramKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Geometry(GeometryVariant::WithPosition) => "geometry",
            Self::Geometry(GeometryVariant::NoPosition) => "geometry_no_position",
            Self::Shading(ShadingVariant::Standard) => "shading",
            Self::Shading(ShadingVariant::ReducedGBuffer) => "shading_no_position",
            Self::Shading(ShadingVariant::Bloom) => "shading_bloom",
            Self::BloomBlur => "bloom_blur",
            Self::BloomComposite => "bloom_composite",
        }
    }
}

/// Compile time constants the shading shader is specialized with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShaderDefines {
    pub num_lights: u32,
    pub num_gbuffers: u32,
    pub max_lights_per_cluster: u32,
    pub x_slices: u32,
    pub y_slices: u32,
    pub z_slices: u32,
    pub frustum_near_depth: f32,
    pub frustum_far_depth: f32,
    /// Width of the cluster data texture.
    pub texture_width: u32,
    /// Height of the cluster data texture.
    pub texture_height: u32,
}

impl ShaderDefines {
    /// Name and value of every define, the way a shader preprocessor takes them.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("NUM_LIGHTS", self.num_lights.to_string()),
            ("NUM_GBUFFERS", self.num_gbuffers.to_string()),
            ("MAX_LIGHTS_PER_CLUSTER", self.max_lights_per_cluster.to_string()),
            ("X_SLICES", self.x_slices.to_string()),
            ("Y_SLICES", self.y_slices.to_string()),
            ("Z_SLICES", self.z_slices.to_string()),
            ("FRUSTUM_NEAR_DEPTH", format!("{:?}", self.frustum_near_depth)),
            ("FRUSTUM_FAR_DEPTH", format!("{:?}", self.frustum_far_depth)),
            ("TEXTURE_WIDTH", self.texture_width.to_string()),
            ("TEXTURE_HEIGHT", self.texture_height.to_string()),
        ]
    }
}

/// Everything a [ProgramLoader] needs to know to build a program for the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramRequest {
    pub kind: ProgramKind,
    /// Only set for shading programs.
    pub defines: Option<ShaderDefines>,
    /// `None` for programs drawing a full-screen quad.
    pub vertex_layout: Option<VertexLayout>,
    pub color_targets: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub uniforms: UniformLayout,
    pub texture_units: u32,
}

impl ProgramRequest {
    /// Interleaved position, normal and uv, the input of the geometry pass.
    pub fn mesh_vertex_layout() -> VertexLayout {
        VertexLayout {
            array_stride: 32,
            attributes: vec![
                VertexAttribute {
                    format: VertexFormat::Float32x3,
                    offset: 0,
                    shader_location: 0,
                },
                VertexAttribute {
                    format: VertexFormat::Float32x3,
                    offset: 12,
                    shader_location: 1,
                },
                VertexAttribute {
                    format: VertexFormat::Float32x2,
                    offset: 24,
                    shader_location: 2,
                },
            ],
        }
    }

    pub fn geometry(
        layout: GBufferLayout,
        color_format: TextureFormat,
        depth: TextureFormat,
    ) -> Self {
        Self {
            kind: ProgramKind::Geometry(GeometryVariant::for_layout(layout)),
            defines: None,
            vertex_layout: Some(Self::mesh_vertex_layout()),
            color_targets: vec![color_format; layout.attachment_count() as usize],
            depth_format: Some(depth),
            uniforms: UniformLayout::default()
                .push(Uniform::ViewProjection)
                .push(Uniform::View),
            // Material albedo and normal maps.
            texture_units: 2,
        }
    }

    pub fn shading(
        variant: ShadingVariant,
        defines: ShaderDefines,
        bindings: &ShadingBindings,
        output_formats: Vec<TextureFormat>,
    ) -> Self {
        Self {
            kind: ProgramKind::Shading(variant),
            defines: Some(defines),
            vertex_layout: None,
            color_targets: output_formats,
            depth_format: None,
            uniforms: UniformLayout::default()
                .push(Uniform::ScreenSize)
                .push(Uniform::InverseView)
                .push(Uniform::FieldOfView),
            texture_units: bindings.required_units(),
        }
    }

    /// `kernel_weights` is the number of floats in the blur kernel.
    pub fn bloom_blur(
        bindings: &BlurBindings,
        kernel_weights: usize,
        output_format: TextureFormat,
    ) -> Self {
        Self {
            kind: ProgramKind::BloomBlur,
            defines: None,
            vertex_layout: None,
            color_targets: vec![output_format],
            depth_format: None,
            uniforms: UniformLayout::default()
                .push(Uniform::ScreenSize)
                .push_array(Uniform::GaussianKernel, kernel_weights as u32),
            texture_units: bindings.bright.index() + 1,
        }
    }

    pub fn bloom_composite(bindings: &CompositeBindings, output_format: TextureFormat) -> Self {
        Self {
            kind: ProgramKind::BloomComposite,
            defines: None,
            vertex_layout: None,
            color_targets: vec![output_format],
            depth_format: None,
            uniforms: UniformLayout::default(),
            texture_units: bindings.blurred.index() + 1,
        }
    }

    /// The device level descriptor for this request, using the conventional `vs_main` and
    /// `fs_main` entry points of `shader`.
    pub fn descriptor(&self, shader: ShaderId) -> ProgramDescriptor {
        ProgramDescriptor {
            label: self.kind.label().to_string(),
            shader,
            vertex_entry_point: "vs_main".to_string(),
            fragment_entry_point: "fs_main".to_string(),
            vertex_layout: self.vertex_layout.clone(),
            color_targets: self.color_targets.clone(),
            depth_format: self.depth_format,
            uniforms: self.uniforms.clone(),
            texture_units: self.texture_units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shading_variant_selection() {
        use GBufferLayout::*;
        assert_eq!(ShadingVariant::select(true, Full), ShadingVariant::Bloom);
        assert_eq!(ShadingVariant::select(true, Reduced), ShadingVariant::Bloom);
        assert_eq!(ShadingVariant::select(false, Full), ShadingVariant::Standard);
        assert_eq!(
            ShadingVariant::select(false, Reduced),
            ShadingVariant::ReducedGBuffer
        );
    }

    #[test]
    fn geometry_variant_follows_layout() {
        assert_eq!(
            GeometryVariant::for_layout(GBufferLayout::Full),
            GeometryVariant::WithPosition
        );
        assert_eq!(
            GeometryVariant::for_layout(GBufferLayout::Reduced),
            GeometryVariant::NoPosition
        );
    }

    #[test]
    fn geometry_request_writes_every_attachment() {
        let request = ProgramRequest::geometry(
            GBufferLayout::Reduced,
            TextureFormat::Rgba32Float,
            TextureFormat::Depth16Unorm,
        );
        assert_eq!(request.color_targets.len(), 2);
        assert_eq!(request.depth_format, Some(TextureFormat::Depth16Unorm));
        assert!(request.uniforms.field(Uniform::ViewProjection).is_some());
        assert!(request.uniforms.field(Uniform::View).is_some());
    }

    #[test]
    fn blur_request_reserves_the_whole_kernel() {
        let request = ProgramRequest::bloom_blur(
            &BlurBindings::default(),
            crate::kernel::GAUSSIAN_KERNEL_11.weights().len(),
            TextureFormat::Rgba32Float,
        );
        let field = request.uniforms.field(Uniform::GaussianKernel).unwrap();
        // 121 floats packed into 31 vec4s.
        assert_eq!(field.size, 31 * 16);
    }

    #[test]
    fn defines_are_named() {
        let defines = ShaderDefines {
            num_lights: 100,
            num_gbuffers: 3,
            max_lights_per_cluster: 100,
            x_slices: 15,
            y_slices: 15,
            z_slices: 15,
            frustum_near_depth: 0.1,
            frustum_far_depth: 1000.0,
            texture_width: 3375,
            texture_height: 26,
        };
        let pairs = defines.pairs();
        assert!(pairs.contains(&("NUM_GBUFFERS", "3".to_string())));
        assert!(pairs.contains(&("FRUSTUM_FAR_DEPTH", "1000.0".to_string())));
        assert!(pairs.contains(&("TEXTURE_WIDTH", "3375".to_string())));
    }
}
