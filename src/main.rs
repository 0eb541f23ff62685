use clap::Parser;
use clustered_deferred::{
    Camera, ClusterBuilder, ClusterGrid, ClusteredDeferredPipeline, Collaborators, GBufferLayout,
    Light, LightTexture, PipelineConfig, PipelineError, ProgramLoadError, ProgramLoader, Scene,
    collaborators::ProgramRequest, frame::FrameState,
};
use glam::{Mat4, UVec2, Vec3};
use renderer::{
    BufferDescriptor, BufferId, BufferUsage, HeadlessDevice, ProgramId, RenderDevice,
    TextureDescriptor, TextureFormat, TextureId,
};

fn parse_size(s: &str) -> Result<UVec2, String> {
    let (width, height) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s}"))?;
    let width = width.parse::<u32>().map_err(|err| err.to_string())?;
    let height = height.parse::<u32>().map_err(|err| err.to_string())?;
    Ok(UVec2::new(width, height))
}

/// Drive the clustered deferred pipeline on a headless device and report what it did.
#[derive(clap::Parser)]
struct Opts {
    /// Initial surface size.
    #[arg(long, default_value = "800x600", value_parser = parse_size)]
    size: UVec2,

    /// Change the surface to this size halfway through.
    #[arg(long, value_parser = parse_size)]
    resize_to: Option<UVec2>,

    /// Number of frames to render.
    #[arg(long, default_value_t = 4)]
    frames: u32,

    #[arg(long, default_value_t = 100)]
    lights: u32,

    /// Skip the bloom post process.
    #[arg(long)]
    no_bloom: bool,

    /// Leave positions out of the geometry buffers.
    #[arg(long)]
    reduced_gbuffer: bool,

    /// Log every pass and resource event.
    #[arg(short, long)]
    verbose: bool,
}

/// Circles the origin, one step per frame.
struct OrbitCamera {
    angle: f32,
    aspect: f32,
}

impl Camera for OrbitCamera {
    fn world_transform(&self) -> Mat4 {
        let eye = Vec3::new(self.angle.cos() * 20.0, 8.0, self.angle.sin() * 20.0);
        Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y).inverse()
    }

    fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees().to_radians(), self.aspect, 0.1, 1000.0)
    }

    fn fov_degrees(&self) -> f32 {
        75.0
    }
}

struct DemoScene {
    vertices: BufferId,
    indices: BufferId,
    lights: Vec<Light>,
}

impl DemoScene {
    fn new(device: &mut HeadlessDevice, light_count: u32) -> Self {
        // A single quad on the ground plane: position, normal, uv.
        #[rustfmt::skip]
        let vertices: [f32; 32] = [
            -10.0, 0.0, -10.0, 0.0, 1.0, 0.0, 0.0, 0.0,
             10.0, 0.0, -10.0, 0.0, 1.0, 0.0, 1.0, 0.0,
             10.0, 0.0,  10.0, 0.0, 1.0, 0.0, 1.0, 1.0,
            -10.0, 0.0,  10.0, 0.0, 1.0, 0.0, 0.0, 1.0,
        ];
        let indices: [u32; 6] = [0, 1, 2, 0, 2, 3];

        let vertices = device.create_buffer(
            BufferDescriptor {
                label: "ground_vertices".to_string(),
                usage: BufferUsage::Vertex,
            },
            bytemuck::cast_slice(&vertices),
        );
        let indices = device.create_buffer(
            BufferDescriptor {
                label: "ground_indices".to_string(),
                usage: BufferUsage::Index,
            },
            bytemuck::cast_slice(&indices),
        );

        let lights = (0..light_count)
            .map(|i| {
                let t = i as f32 / light_count.max(1) as f32 * std::f32::consts::TAU;
                Light {
                    position: Vec3::new(t.cos() * 8.0, 1.0, t.sin() * 8.0),
                    radius: 3.0,
                    color: Vec3::new(t.cos() * 0.5 + 0.5, t.sin() * 0.5 + 0.5, 1.0),
                }
            })
            .collect();

        Self {
            vertices,
            indices,
            lights,
        }
    }
}

impl Scene<HeadlessDevice> for DemoScene {
    fn draw(&self, device: &mut HeadlessDevice, _program: ProgramId) {
        device.draw_indexed(self.vertices, self.indices, 6);
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }
}

/// Puts every light in every cluster. The first float of a cluster holds its light count,
/// followed by the light indices.
struct EveryLightClusters {
    texture: TextureId,
    size: UVec2,
    max_lights_per_cluster: u32,
    uploaded: bool,
}

impl EveryLightClusters {
    fn new(device: &mut HeadlessDevice, grid: ClusterGrid, max_lights_per_cluster: u32) -> Self {
        let size = UVec2::new(grid.cluster_count(), (max_lights_per_cluster + 1).div_ceil(4));
        let texture = device.create_texture(TextureDescriptor::render_target(
            "cluster_data",
            TextureFormat::Rgba32Float,
        ));
        device.allocate_texture(texture, size);

        Self {
            texture,
            size,
            max_lights_per_cluster,
            uploaded: false,
        }
    }
}

impl ClusterBuilder<HeadlessDevice> for EveryLightClusters {
    fn update_clusters(
        &mut self,
        device: &mut HeadlessDevice,
        _frame: &FrameState,
        lights: &[Light],
    ) -> TextureId {
        if self.uploaded {
            return self.texture;
        }

        let count = lights.len().min(self.max_lights_per_cluster as usize);
        let elements = self.size.x as usize;
        let mut data = vec![0.0; elements * self.size.y as usize * 4];
        for cluster in 0..elements {
            for slot in 0..=count {
                let value = if slot == 0 { count } else { slot - 1 };
                let (pixel, component) = (slot / 4, slot % 4);
                data[4 * cluster + 4 * pixel * elements + component] = value as f32;
            }
        }

        device.write_texture(self.texture, &data);
        self.uploaded = true;
        self.texture
    }

    fn texture_size(&self) -> UVec2 {
        self.size
    }

    fn max_lights_per_cluster(&self) -> u32 {
        self.max_lights_per_cluster
    }
}

/// Creates programs from placeholder shaders; the headless device never runs them.
struct HeadlessLoader;

impl ProgramLoader<HeadlessDevice> for HeadlessLoader {
    fn load(
        &mut self,
        device: &mut HeadlessDevice,
        request: &ProgramRequest,
    ) -> Result<ProgramId, ProgramLoadError> {
        if let Some(defines) = &request.defines {
            for (name, value) in defines.pairs() {
                tracing::debug!("{}: #define {} {}", request.kind.label(), name, value);
            }
        }
        let shader = device.create_shader(request.kind.label(), "");
        Ok(device.create_program(request.descriptor(shader))?)
    }
}

fn run(opts: Opts) -> Result<(), PipelineError> {
    let mut device = HeadlessDevice::new(opts.size);

    let config = PipelineConfig {
        num_lights: opts.lights,
        enable_bloom: !opts.no_bloom,
        gbuffer_layout: if opts.reduced_gbuffer {
            GBufferLayout::Reduced
        } else {
            GBufferLayout::Full
        },
        ..Default::default()
    };

    let collaborators = Collaborators {
        clusters: Box::new(EveryLightClusters::new(&mut device, config.cluster_grid, 100)),
        lights: Box::new(LightTexture::new(&mut device, config.num_lights)),
    };

    let mut pipeline =
        ClusteredDeferredPipeline::new(&mut device, config, collaborators, &mut HeadlessLoader)?;
    let scene = DemoScene::new(&mut device, opts.lights);

    for frame in 0..opts.frames {
        if frame == opts.frames / 2 {
            if let Some(size) = opts.resize_to {
                tracing::info!("Surface resized to {}x{}", size.x, size.y);
                device.set_surface_size(size);
            }
        }

        let surface = device.surface_size();
        let camera = OrbitCamera {
            angle: frame as f32 * 0.1,
            aspect: surface.x.max(1) as f32 / surface.y.max(1) as f32,
        };
        pipeline.render(&mut device, &camera, &scene)?;
    }

    for (i, frame) in device.frames().iter().enumerate() {
        tracing::info!(
            "Frame {}: {} commands, {} draws",
            i,
            frame.len(),
            frame.iter().filter(|command| command.is_draw()).count()
        );
    }
    tracing::info!(
        "Targets at {}x{}, {} texture unit collisions",
        pipeline.size().x,
        pipeline.size().y,
        device.unit_collisions()
    );

    pipeline.destroy(&mut device);

    Ok(())
}

fn main() {
    let opts = Opts::parse();

    let level = if opts.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(err) = run(opts) {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}
