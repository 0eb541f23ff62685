//! The clustered deferred pipeline: geometry capture, light clustered shading and an optional
//! bloom post process, sequenced once per frame.

use std::borrow::Cow;

use glam::UVec2;
use renderer::{
    ClearFlags, ProgramId, RenderDevice, RenderTarget, TextureId, Uniform, UniformValue,
};

use crate::{
    binding::{BlurBindings, CompositeBindings, ShadingBindings, is_collision_free},
    collaborators::{
        Camera, ClusterBuilder, LightDataSource, ProgramLoader, ProgramRequest, Scene,
        ShaderDefines, ShadingVariant,
    },
    config::PipelineConfig,
    error::{PipelineError, ResourceError},
    frame::{FrameStage, FrameState},
    kernel::GAUSSIAN_KERNEL_11,
    resize::ResizeCoordinator,
    targets::{BloomTargets, COLOR_FORMAT, GeometryBuffers},
};

/// The collaborators that produce the light and cluster data shading reads.
pub struct Collaborators<D> {
    pub clusters: Box<dyn ClusterBuilder<D>>,
    pub lights: Box<dyn LightDataSource<D>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BloomPrograms {
    pub blur: ProgramId,
    pub composite: ProgramId,
}

/// Programs the pipeline was built with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Programs {
    pub geometry: ProgramId,
    pub shading: ProgramId,
    pub shading_variant: ShadingVariant,
    /// Only loaded when bloom is enabled.
    pub bloom: Option<BloomPrograms>,
}

impl Programs {
    /// Every program, in load order.
    pub fn ids(&self) -> Vec<ProgramId> {
        let mut ids = vec![self.geometry, self.shading];
        if let Some(bloom) = self.bloom {
            ids.extend([bloom.blur, bloom.composite]);
        }
        ids
    }

    fn destroy<D: RenderDevice>(self, device: &mut D) {
        for program in self.ids() {
            device.destroy_program(program);
        }
    }
}

/// Textures refreshed by the light collaborators for the current frame.
#[derive(Clone, Copy)]
struct LightInputs {
    light_data: TextureId,
    cluster_data: TextureId,
}

pub struct ClusteredDeferredPipeline<D> {
    config: PipelineConfig,
    resize: ResizeCoordinator,

    geometry_buffers: GeometryBuffers,
    bloom_targets: Option<BloomTargets>,

    shading_bindings: ShadingBindings,
    blur_bindings: BlurBindings,
    composite_bindings: CompositeBindings,

    programs: Programs,

    clusters: Box<dyn ClusterBuilder<D>>,
    lights: Box<dyn LightDataSource<D>>,
}

impl<D: RenderDevice> ClusteredDeferredPipeline<D> {
    pub fn new(
        device: &mut D,
        config: PipelineConfig,
        collaborators: Collaborators<D>,
        loader: &mut dyn ProgramLoader<D>,
    ) -> Result<Self, PipelineError> {
        config.check();

        let layout = config.gbuffer_layout;
        let shading_bindings = ShadingBindings::new(layout.attachment_count() as usize);
        let blur_bindings = BlurBindings::default();
        let composite_bindings = CompositeBindings::default();
        debug_assert!(is_collision_free(shading_bindings.units()));

        let required = shading_bindings.required_units();
        let available = device.limits().max_texture_units;
        if required > available {
            return Err(PipelineError::TextureUnits {
                required,
                available,
            });
        }

        let Collaborators { clusters, lights } = collaborators;

        let programs = Self::load_programs(
            device,
            &config,
            &*clusters,
            &shading_bindings,
            &blur_bindings,
            &composite_bindings,
            loader,
        )?;

        let size = device.surface_size().max(UVec2::ONE);

        let (geometry_buffers, bloom_targets) = match Self::create_targets(device, &config, size) {
            Ok(targets) => targets,
            Err(err) => {
                programs.destroy(device);
                return Err(err.into());
            }
        };

        Ok(Self {
            config,
            resize: ResizeCoordinator::new(size),
            geometry_buffers,
            bloom_targets,
            shading_bindings,
            blur_bindings,
            composite_bindings,
            programs,
            clusters,
            lights,
        })
    }

    fn create_targets(
        device: &mut D,
        config: &PipelineConfig,
        size: UVec2,
    ) -> Result<(GeometryBuffers, Option<BloomTargets>), ResourceError> {
        let geometry_buffers = GeometryBuffers::create(device, size, config.gbuffer_layout)?;

        if !config.enable_bloom {
            return Ok((geometry_buffers, None));
        }

        match BloomTargets::create(device, size) {
            Ok(bloom_targets) => Ok((geometry_buffers, Some(bloom_targets))),
            Err(err) => {
                geometry_buffers.destroy(device);
                Err(err)
            }
        }
    }

    /// Request every program from `loader`. If one fails, the programs loaded before it are
    /// destroyed.
    fn load_programs(
        device: &mut D,
        config: &PipelineConfig,
        clusters: &dyn ClusterBuilder<D>,
        shading_bindings: &ShadingBindings,
        blur_bindings: &BlurBindings,
        composite_bindings: &CompositeBindings,
        loader: &mut dyn ProgramLoader<D>,
    ) -> Result<Programs, PipelineError> {
        let mut loaded = Vec::new();

        let result = Self::request_programs(
            device,
            config,
            clusters,
            shading_bindings,
            blur_bindings,
            composite_bindings,
            &mut |device: &mut D, request: ProgramRequest| {
                tracing::debug!("Loading {} program", request.kind.label());
                let program =
                    loader
                        .load(device, &request)
                        .map_err(|source| PipelineError::Program {
                            kind: request.kind,
                            source,
                        })?;
                loaded.push(program);
                Ok(program)
            },
        );

        if result.is_err() {
            for program in loaded {
                device.destroy_program(program);
            }
        }

        result
    }

    fn request_programs(
        device: &mut D,
        config: &PipelineConfig,
        clusters: &dyn ClusterBuilder<D>,
        shading_bindings: &ShadingBindings,
        blur_bindings: &BlurBindings,
        composite_bindings: &CompositeBindings,
        load: &mut dyn FnMut(&mut D, ProgramRequest) -> Result<ProgramId, PipelineError>,
    ) -> Result<Programs, PipelineError> {
        let surface_format = device.surface_format();

        let layout = config.gbuffer_layout;

        let geometry = load(
            device,
            ProgramRequest::geometry(layout, COLOR_FORMAT, GeometryBuffers::DEPTH_FORMAT),
        )?;

        let cluster_texture = clusters.texture_size();
        let defines = ShaderDefines {
            num_lights: config.num_lights,
            num_gbuffers: layout.attachment_count(),
            max_lights_per_cluster: clusters.max_lights_per_cluster(),
            x_slices: config.cluster_grid.x,
            y_slices: config.cluster_grid.y,
            z_slices: config.cluster_grid.z,
            frustum_near_depth: config.frustum_near,
            frustum_far_depth: config.frustum_far,
            texture_width: cluster_texture.x,
            texture_height: cluster_texture.y,
        };

        let shading_variant = ShadingVariant::select(config.enable_bloom, layout);
        let shading_outputs = if config.enable_bloom {
            // Lit color and bright parts.
            vec![COLOR_FORMAT; 2]
        } else {
            vec![surface_format]
        };
        let shading = load(
            device,
            ProgramRequest::shading(shading_variant, defines, shading_bindings, shading_outputs),
        )?;

        let bloom = if config.enable_bloom {
            let blur = load(
                device,
                ProgramRequest::bloom_blur(
                    blur_bindings,
                    GAUSSIAN_KERNEL_11.weights().len(),
                    COLOR_FORMAT,
                ),
            )?;
            let composite = load(
                device,
                ProgramRequest::bloom_composite(composite_bindings, surface_format),
            )?;
            Some(BloomPrograms { blur, composite })
        } else {
            None
        };

        Ok(Programs {
            geometry,
            shading,
            shading_variant,
            bloom,
        })
    }

    /// Render one frame to the display surface.
    ///
    /// If the surface changed size since the last frame, every target is reallocated before
    /// anything is bound.
    pub fn render<C, S>(
        &mut self,
        device: &mut D,
        camera: &C,
        scene: &S,
    ) -> Result<(), ResourceError>
    where
        C: Camera + ?Sized,
        S: Scene<D> + ?Sized,
    {
        if let Some(size) = self.resize.poll(device.surface_size()) {
            self.reallocate(device, size)?;
        }
        debug_assert!(!self.resize.is_invalid());

        let frame = FrameState::new(camera, self.resize.allocated());

        device.begin_frame();

        let mut inputs = None;
        for stage in FrameStage::sequence(self.config.enable_bloom) {
            tracing::trace!("Frame stage: {}", stage);
            match stage {
                FrameStage::Geometry => self.geometry_pass(device, &frame, scene),
                FrameStage::LightRefresh => {
                    inputs = Some(self.refresh_lights(device, &frame, scene));
                }
                FrameStage::Shading => {
                    if let Some(inputs) = inputs {
                        self.shading_pass(device, &frame, inputs);
                    }
                }
                FrameStage::BloomBlur => self.blur_pass(device, &frame),
                FrameStage::BloomComposite => self.composite_pass(device),
            }
        }

        device.end_frame();

        Ok(())
    }

    fn geometry_pass<S: Scene<D> + ?Sized>(&self, device: &mut D, frame: &FrameState, scene: &S) {
        device.set_viewport(frame.viewport);
        device.bind_render_target(RenderTarget::Framebuffer(
            self.geometry_buffers.framebuffer(),
        ));
        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);

        device.use_program(self.programs.geometry);
        device.set_uniform(
            Uniform::ViewProjection,
            UniformValue::Mat4(frame.view_projection),
        );
        device.set_uniform(Uniform::View, UniformValue::Mat4(frame.view));

        scene.draw(device, self.programs.geometry);
    }

    fn refresh_lights<S: Scene<D> + ?Sized>(
        &mut self,
        device: &mut D,
        frame: &FrameState,
        scene: &S,
    ) -> LightInputs {
        let lights = scene.lights();
        let light_data = self.lights.update(device, lights);
        let cluster_data = self.clusters.update_clusters(device, frame, lights);
        LightInputs {
            light_data,
            cluster_data,
        }
    }

    fn shading_pass(&self, device: &mut D, frame: &FrameState, inputs: LightInputs) {
        let target = match &self.bloom_targets {
            Some(bloom) => RenderTarget::Framebuffer(bloom.capture_framebuffer()),
            None => RenderTarget::Surface,
        };
        device.bind_render_target(target);
        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);

        device.use_program(self.programs.shading);
        device.set_uniform(
            Uniform::ScreenSize,
            UniformValue::Vec2(frame.viewport.as_vec2()),
        );
        device.set_uniform(Uniform::InverseView, UniformValue::Mat4(frame.inverse_view));
        device.set_uniform(Uniform::FieldOfView, UniformValue::Float(frame.fov));

        let bindings = &self.shading_bindings;
        for (unit, texture) in bindings
            .gbuffers()
            .iter()
            .zip(self.geometry_buffers.colors())
        {
            device.bind_texture(*unit, *texture);
        }
        device.bind_texture(bindings.light_data, inputs.light_data);
        device.bind_texture(bindings.cluster_data, inputs.cluster_data);

        device.draw_fullscreen_quad();
    }

    fn blur_pass(&self, device: &mut D, frame: &FrameState) {
        let (Some(targets), Some(programs)) = (&self.bloom_targets, &self.programs.bloom) else {
            return;
        };

        device.bind_render_target(RenderTarget::Framebuffer(targets.blur_framebuffer()));
        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);

        device.use_program(programs.blur);
        device.bind_texture(self.blur_bindings.bright, targets.bright());
        device.set_uniform(
            Uniform::ScreenSize,
            UniformValue::Vec2(frame.viewport.as_vec2()),
        );
        device.set_uniform(
            Uniform::GaussianKernel,
            UniformValue::Floats(Cow::Borrowed(GAUSSIAN_KERNEL_11.weights())),
        );

        device.draw_fullscreen_quad();
    }

    fn composite_pass(&self, device: &mut D) {
        let (Some(targets), Some(programs)) = (&self.bloom_targets, &self.programs.bloom) else {
            return;
        };

        device.bind_render_target(RenderTarget::Surface);
        device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);

        device.use_program(programs.composite);
        device.bind_texture(self.composite_bindings.rendered, targets.rendered());
        device.bind_texture(self.composite_bindings.blurred, targets.blurred());

        device.draw_fullscreen_quad();
    }

    /// Reallocate every target at `width` x `height`. A size without area is ignored.
    pub fn resize(&mut self, device: &mut D, width: u32, height: u32) -> Result<(), ResourceError> {
        match self.resize.poll(UVec2::new(width, height)) {
            Some(size) => self.reallocate(device, size),
            None => Ok(()),
        }
    }

    /// Reallocate every target at `size`. When any of them fails the targets are left invalid,
    /// so the next frame or resize tries again before anything is drawn.
    fn reallocate(&mut self, device: &mut D, size: UVec2) -> Result<(), ResourceError> {
        let result = self.resize_targets(device, size);

        match result {
            Ok(()) => self.resize.acknowledge(size),
            Err(_) => self.resize.invalidate(),
        }

        result
    }

    fn resize_targets(&mut self, device: &mut D, size: UVec2) -> Result<(), ResourceError> {
        self.geometry_buffers.resize(device, size)?;
        if let Some(bloom) = self.bloom_targets.as_mut() {
            bloom.resize(device, size)?;
        }
        Ok(())
    }

    /// Release every target and program the pipeline owns.
    pub fn destroy(self, device: &mut D) {
        self.geometry_buffers.destroy(device);
        if let Some(bloom) = self.bloom_targets {
            bloom.destroy(device);
        }
        self.programs.destroy(device);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Size the targets were last successfully allocated at.
    pub fn size(&self) -> UVec2 {
        self.resize.allocated()
    }

    pub fn geometry_buffers(&self) -> &GeometryBuffers {
        &self.geometry_buffers
    }

    pub fn bloom_targets(&self) -> Option<&BloomTargets> {
        self.bloom_targets.as_ref()
    }

    pub fn shading_bindings(&self) -> &ShadingBindings {
        &self.shading_bindings
    }

    pub fn programs(&self) -> &Programs {
        &self.programs
    }
}
