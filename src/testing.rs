//! Stand-ins for the collaborators of the pipeline.

use glam::{Mat4, UVec2, Vec3};
use renderer::{
    BufferDescriptor, BufferId, BufferUsage, HeadlessDevice, ProgramId, RenderDevice,
    TextureDescriptor, TextureFormat, TextureId,
};

use crate::{
    collaborators::{Camera, ClusterBuilder, Light, ProgramKind, ProgramLoader, ProgramRequest, Scene},
    config::PipelineConfig,
    error::ProgramLoadError,
    frame::FrameState,
    light_texture::LightTexture,
    pipeline::{ClusteredDeferredPipeline, Collaborators},
};

pub struct TestCamera {
    pub world_transform: Mat4,
    pub projection: Mat4,
    pub fov_degrees: f32,
}

impl Default for TestCamera {
    fn default() -> Self {
        Self {
            world_transform: Mat4::from_translation(Vec3::new(0.0, 2.0, 10.0)),
            projection: Mat4::perspective_rh(45_f32.to_radians(), 4.0 / 3.0, 0.1, 1000.0),
            fov_degrees: 45.0,
        }
    }
}

impl Camera for TestCamera {
    fn world_transform(&self) -> Mat4 {
        self.world_transform
    }

    fn projection(&self) -> Mat4 {
        self.projection
    }

    fn fov_degrees(&self) -> f32 {
        self.fov_degrees
    }
}

/// A scene with a single mesh and a row of lights.
pub struct TestScene {
    vertices: BufferId,
    indices: BufferId,
    lights: Vec<Light>,
}

impl TestScene {
    pub fn new(device: &mut HeadlessDevice, light_count: usize) -> Self {
        let vertices = device.create_buffer(
            BufferDescriptor {
                label: "test_vertices".to_string(),
                usage: BufferUsage::Vertex,
            },
            &[0; 32 * 3],
        );
        let indices = device.create_buffer(
            BufferDescriptor {
                label: "test_indices".to_string(),
                usage: BufferUsage::Index,
            },
            &[0; 4 * 3],
        );
        let lights = (0..light_count)
            .map(|i| Light {
                position: Vec3::new(i as f32, 1.0, 0.0),
                radius: 5.0,
                color: Vec3::ONE,
            })
            .collect();

        Self {
            vertices,
            indices,
            lights,
        }
    }
}

impl Scene<HeadlessDevice> for TestScene {
    fn draw(&self, device: &mut HeadlessDevice, _program: ProgramId) {
        device.draw_indexed(self.vertices, self.indices, 3);
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }
}

/// Cluster data that never changes.
pub struct TestClusters {
    texture: TextureId,
    size: UVec2,
    pub updates: usize,
}

impl TestClusters {
    pub fn new(device: &mut HeadlessDevice, size: UVec2) -> Self {
        let texture = device.create_texture(TextureDescriptor::render_target(
            "cluster_data",
            TextureFormat::Rgba32Float,
        ));
        device.allocate_texture(texture, size);
        Self {
            texture,
            size,
            updates: 0,
        }
    }
}

impl ClusterBuilder<HeadlessDevice> for TestClusters {
    fn update_clusters(
        &mut self,
        _device: &mut HeadlessDevice,
        _frame: &FrameState,
        _lights: &[Light],
    ) -> TextureId {
        self.updates += 1;
        self.texture
    }

    fn texture_size(&self) -> UVec2 {
        self.size
    }

    fn max_lights_per_cluster(&self) -> u32 {
        self.size.y * 4 - 1
    }
}

/// Creates every requested program on the device and remembers the requests.
#[derive(Default)]
pub struct TestLoader {
    pub requests: Vec<ProgramRequest>,
    /// Fail when this kind of program is requested.
    pub fail: Option<ProgramKind>,
}

impl ProgramLoader<HeadlessDevice> for TestLoader {
    fn load(
        &mut self,
        device: &mut HeadlessDevice,
        request: &ProgramRequest,
    ) -> Result<ProgramId, ProgramLoadError> {
        self.requests.push(request.clone());

        if self.fail == Some(request.kind) {
            return Err(ProgramLoadError(format!("{} failed to compile", request.kind.label())));
        }

        let shader = device.create_shader(request.kind.label(), "");
        Ok(device.create_program(request.descriptor(shader))?)
    }
}

pub fn collaborators(device: &mut HeadlessDevice, num_lights: u32) -> Collaborators<HeadlessDevice> {
    Collaborators {
        clusters: Box::new(TestClusters::new(device, UVec2::new(15 * 15 * 15, 26))),
        lights: Box::new(LightTexture::new(device, num_lights)),
    }
}

/// A pipeline on a fresh device of `size`.
pub fn pipeline(
    size: UVec2,
    config: PipelineConfig,
) -> (HeadlessDevice, ClusteredDeferredPipeline<HeadlessDevice>, TestLoader) {
    let mut device = HeadlessDevice::new(size);
    let collaborators = collaborators(&mut device, config.num_lights);
    let mut loader = TestLoader::default();
    let pipeline = ClusteredDeferredPipeline::new(&mut device, config, collaborators, &mut loader)
        .map_err(|err| err.to_string())
        .unwrap();
    (device, pipeline, loader)
}
