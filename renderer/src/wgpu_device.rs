//! [RenderDevice] on top of `wgpu`.
//!
//! Framebuffers are sets of attachments, programs are render pipelines and texture units are
//! bindings of a bind group that is rebuilt for every draw. Commands are encoded into a single
//! command encoder per frame, one render pass per draw, and submitted in [RenderDevice::end_frame].
//!
//! Bind group conventions every program follows:
//! - group 0, binding 0: the uniform block described by [UniformLayout].
//! - group 1, binding `n`: the texture bound to unit `n`, sampled as unfilterable float.
//! - group 2, binding 0: a nearest, clamp-to-edge non-filtering sampler.

use generational_arena::Arena;
use glam::UVec2;
use wgpu::util::DeviceExt;

use crate::{
    Attachment, AttachmentState, BufferDescriptor, BufferId, ClearFlags, DeviceError,
    DeviceLimits, FramebufferId, FramebufferStatus, ProgramDescriptor, ProgramId, RenderDevice,
    RenderTarget, ShaderId, TextureDescriptor, TextureFormat, TextureId, TextureUnit, Uniform,
    UniformLayout, UniformValue, check_completeness,
};

/// Vertices emitted for a full-screen quad. The quad vertex shader derives positions from the
/// vertex index.
pub const FULLSCREEN_QUAD_VERTICES: u32 = 6;

enum Surface {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        format: TextureFormat,
        size: UVec2,
    },
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    surface_texture: Option<wgpu::SurfaceTexture>,
    surface_view: wgpu::TextureView,
}

struct TextureStorage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: UVec2,
}

struct TextureEntry {
    descriptor: TextureDescriptor,
    storage: Option<TextureStorage>,
}

struct FramebufferEntry {
    label: String,
    attachments: Vec<(Attachment, TextureId)>,
    draw_buffers: Vec<u32>,
}

struct ProgramEntry {
    label: String,
    pipeline: wgpu::RenderPipeline,
    uniforms: UniformLayout,
    uniform_data: Vec<u8>,
    uniforms_dirty: bool,
    uniform_buffer: Option<wgpu::Buffer>,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    sampler_bind_group: wgpu::BindGroup,
    texture_units: u32,
}

#[derive(Default)]
struct BindState {
    target: Option<RenderTarget>,
    pending_clear: Option<ClearFlags>,
    viewport: Option<UVec2>,
    program: Option<ProgramId>,
    units: Vec<Option<TextureId>>,
}

enum Draw {
    FullscreenQuad,
    Indexed {
        vertices: BufferId,
        indices: BufferId,
        index_count: u32,
    },
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: DeviceLimits,
    surface: Surface,
    sampler: wgpu::Sampler,

    textures: Arena<TextureEntry>,
    framebuffers: Arena<FramebufferEntry>,
    buffers: Arena<wgpu::Buffer>,
    shaders: Arena<wgpu::ShaderModule>,
    programs: Arena<ProgramEntry>,

    frame: Option<Frame>,
    state: BindState,
}

impl WgpuDevice {
    /// Create a device that presents to a window surface. The surface is configured here.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    ) -> Self {
        if TextureFormat::from_wgpu(config.format).is_none() {
            tracing::warn!("Surface format {:?} is not a renderer format", config.format);
        }
        surface.configure(&device, &config);
        Self::with_surface(device, queue, Surface::Window { surface, config })
    }

    /// Create a device that renders "surface" output into an owned texture.
    pub fn offscreen(
        device: wgpu::Device,
        queue: wgpu::Queue,
        size: UVec2,
        format: TextureFormat,
    ) -> Self {
        let texture = Self::create_offscreen_texture(&device, size, format);
        Self::with_surface(
            device,
            queue,
            Surface::Offscreen {
                texture,
                format,
                size,
            },
        )
    }

    fn with_surface(device: wgpu::Device, queue: wgpu::Queue, surface: Surface) -> Self {
        let limits = DeviceLimits::from_wgpu(&device.limits());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("render_target_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            limits,
            surface,
            sampler,
            textures: Arena::default(),
            framebuffers: Arena::default(),
            buffers: Arena::default(),
            shaders: Arena::default(),
            programs: Arena::default(),
            frame: None,
            state: BindState::default(),
        }
    }

    fn create_offscreen_texture(
        device: &wgpu::Device,
        size: UVec2,
        format: TextureFormat,
    ) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen_surface"),
            size: wgpu::Extent3d {
                width: size.x.max(1),
                height: size.y.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: format.to_wgpu(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Reconfigure the display surface after the window changed size.
    pub fn resize_surface(&mut self, size: UVec2) {
        match &mut self.surface {
            Surface::Window { surface, config } => {
                config.width = size.x.max(1);
                config.height = size.y.max(1);
                surface.configure(&self.device, config);
            }
            Surface::Offscreen {
                texture,
                format,
                size: current,
            } => {
                *texture = Self::create_offscreen_texture(&self.device, size, *format);
                *current = size;
            }
        }
    }

    /// The texture surface output is rendered into, for offscreen devices.
    pub fn offscreen_texture(&self) -> Option<&wgpu::Texture> {
        match &self.surface {
            Surface::Offscreen { texture, .. } => Some(texture),
            Surface::Window { .. } => None,
        }
    }

    fn acquire_surface(&mut self) -> Option<(Option<wgpu::SurfaceTexture>, wgpu::TextureView)> {
        match &self.surface {
            Surface::Window { surface, config } => {
                let surface_texture = match surface.get_current_texture() {
                    Ok(texture) => texture,
                    Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                        surface.configure(&self.device, config);
                        match surface.get_current_texture() {
                            Ok(texture) => texture,
                            Err(err) => {
                                tracing::warn!("Could not acquire surface texture ({err})");
                                return None;
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!("Could not acquire surface texture ({err})");
                        return None;
                    }
                };
                let view = surface_texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Some((Some(surface_texture), view))
            }
            Surface::Offscreen { texture, .. } => Some((
                None,
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
            )),
        }
    }

    /// Encode a render pass on the bound target. Without a draw, or when the draw can't be
    /// performed, the pass only performs the pending clear. The clear stays pending when the
    /// bound target can't be rendered into.
    fn encode_pass(&mut self, draw: Option<Draw>) {
        let Some(frame) = self.frame.as_mut() else {
            tracing::warn!("Render command outside of a frame");
            return;
        };
        let Some(target) = self.state.target else {
            tracing::warn!("Render command without a bound render target");
            return;
        };

        let (color_views, depth_view, target_size) = match target {
            RenderTarget::Surface => {
                let size = match &self.surface {
                    Surface::Window { config, .. } => UVec2::new(config.width, config.height),
                    Surface::Offscreen { size, .. } => *size,
                };
                (vec![&frame.surface_view], None, size)
            }
            RenderTarget::Framebuffer(id) => {
                let Some(framebuffer) = self.framebuffers.get(id.0) else {
                    tracing::warn!("Drawing into unknown framebuffer {:?}", id);
                    return;
                };

                let storage = |attachment: Attachment| {
                    framebuffer
                        .attachments
                        .iter()
                        .find(|(slot, _)| *slot == attachment)
                        .and_then(|(_, texture)| self.textures.get(texture.0))
                        .and_then(|entry| entry.storage.as_ref())
                };

                let colors: Option<Vec<&TextureStorage>> = framebuffer
                    .draw_buffers
                    .iter()
                    .map(|slot| storage(Attachment::Color(*slot)))
                    .collect();
                let Some(colors) = colors else {
                    tracing::warn!("Framebuffer {} is incomplete", framebuffer.label);
                    return;
                };

                let depth = storage(Attachment::Depth);
                let size = colors
                    .first()
                    .map(|storage| storage.size)
                    .or(depth.map(|storage| storage.size))
                    .unwrap_or(UVec2::ONE);

                (
                    colors.iter().map(|storage| &storage.view).collect(),
                    depth.map(|storage| &storage.view),
                    size,
                )
            }
        };

        // Resolve everything the draw needs before the pass borrows the encoder.
        let resolved = match draw {
            Some(draw) => 'resolve: {
                let Some(program) = self.state.program else {
                    tracing::warn!("Draw without a program");
                    break 'resolve None;
                };
                let Some(entry) = self.programs.get_mut(program.0) else {
                    tracing::warn!("Draw with unknown program {:?}", program);
                    break 'resolve None;
                };

                if entry.uniforms_dirty {
                    if let Some(uniform_buffer) = &entry.uniform_buffer {
                        let staging =
                            self.device
                                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                                    label: Some("uniform_staging"),
                                    contents: &entry.uniform_data,
                                    usage: wgpu::BufferUsages::COPY_SRC,
                                });
                        frame.encoder.copy_buffer_to_buffer(
                            &staging,
                            0,
                            uniform_buffer,
                            0,
                            entry.uniforms.size(),
                        );
                    }
                    entry.uniforms_dirty = false;
                }

                let mut views = Vec::with_capacity(entry.texture_units as usize);
                for unit in 0..entry.texture_units {
                    let view = self
                        .state
                        .units
                        .get(unit as usize)
                        .copied()
                        .flatten()
                        .and_then(|texture| self.textures.get(texture.0))
                        .and_then(|texture| texture.storage.as_ref())
                        .map(|storage| &storage.view);
                    let Some(view) = view else {
                        tracing::warn!("Program {} samples unbound unit {}", entry.label, unit);
                        break 'resolve None;
                    };
                    views.push(view);
                }

                let entries: Vec<wgpu::BindGroupEntry> = views
                    .iter()
                    .enumerate()
                    .map(|(binding, view)| wgpu::BindGroupEntry {
                        binding: binding as u32,
                        resource: wgpu::BindingResource::TextureView(view),
                    })
                    .collect();

                let texture_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("{}_textures", entry.label)),
                    layout: &entry.texture_layout,
                    entries: &entries,
                });

                Some((draw, &*entry, texture_bind_group))
            }
            None => None,
        };

        // The target is usable from here on, so a pending clear is always performed.
        let clear = match (self.state.pending_clear.take(), &resolved) {
            (Some(clear), _) => clear,
            (None, Some(_)) => ClearFlags::empty(),
            (None, None) => return,
        };
        let color_load = if clear.contains(ClearFlags::COLOR) {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if clear.contains(ClearFlags::DEPTH) {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .into_iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("render_pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_view.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let Some((draw, entry, texture_bind_group)) = resolved else {
            return;
        };

        if let Some(viewport) = self.state.viewport {
            let viewport = viewport.min(target_size);
            render_pass.set_viewport(0.0, 0.0, viewport.x as f32, viewport.y as f32, 0.0, 1.0);
        }

        render_pass.set_pipeline(&entry.pipeline);
        render_pass.set_bind_group(0, &entry.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &texture_bind_group, &[]);
        render_pass.set_bind_group(2, &entry.sampler_bind_group, &[]);

        match draw {
            Draw::FullscreenQuad => render_pass.draw(0..FULLSCREEN_QUAD_VERTICES, 0..1),
            Draw::Indexed {
                vertices,
                indices,
                index_count,
            } => {
                let (Some(vertex_buffer), Some(index_buffer)) =
                    (self.buffers.get(vertices.0), self.buffers.get(indices.0))
                else {
                    tracing::warn!("Indexed draw with unknown buffers");
                    return;
                };
                render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..index_count, 0, 0..1);
            }
        }
    }

    /// Perform a clear that no draw picked up.
    fn flush_clear(&mut self) {
        if self.state.pending_clear.is_some() {
            self.encode_pass(None);
        }
    }
}

impl RenderDevice for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn surface_size(&self) -> UVec2 {
        match &self.surface {
            Surface::Window { config, .. } => UVec2::new(config.width, config.height),
            Surface::Offscreen { size, .. } => *size,
        }
    }

    fn surface_format(&self) -> TextureFormat {
        match &self.surface {
            Surface::Window { config, .. } => {
                TextureFormat::from_wgpu(config.format).unwrap_or(TextureFormat::Bgra8UnormSrgb)
            }
            Surface::Offscreen { format, .. } => *format,
        }
    }

    fn create_texture(&mut self, descriptor: TextureDescriptor) -> TextureId {
        TextureId(self.textures.insert(TextureEntry {
            descriptor,
            storage: None,
        }))
    }

    fn allocate_texture(&mut self, texture: TextureId, size: UVec2) {
        let Some(entry) = self.textures.get_mut(texture.0) else {
            tracing::warn!("Allocating storage for unknown texture {:?}", texture);
            return;
        };

        let wgpu_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&entry.descriptor.label),
            size: wgpu::Extent3d {
                width: size.x.max(1),
                height: size.y.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: entry.descriptor.format.to_wgpu(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = wgpu_texture.create_view(&wgpu::TextureViewDescriptor::default());

        entry.storage = Some(TextureStorage {
            texture: wgpu_texture,
            view,
            size,
        });
    }

    fn texture_size(&self, texture: TextureId) -> Option<UVec2> {
        self.textures
            .get(texture.0)
            .and_then(|entry| entry.storage.as_ref())
            .map(|storage| storage.size)
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) {
        let Some(entry) = self.textures.get(texture.0) else {
            tracing::warn!("Writing to unknown texture {:?}", texture);
            return;
        };
        let Some(storage) = &entry.storage else {
            tracing::warn!("Writing to texture without storage ({})", entry.descriptor.label);
            return;
        };

        let format = entry.descriptor.format;
        if crate::float_upload_len(format, storage.size) != Some(data.len()) {
            tracing::warn!("Texture upload size mismatch for {}", entry.descriptor.label);
            return;
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(data),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(storage.size.x * format.bytes_per_texel()),
                rows_per_image: Some(storage.size.y),
            },
            wgpu::Extent3d {
                width: storage.size.x,
                height: storage.size.y,
                depth_or_array_layers: 1,
            },
        );
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        match self.textures.remove(texture.0) {
            Some(TextureEntry {
                storage: Some(storage),
                ..
            }) => storage.texture.destroy(),
            Some(_) => {}
            None => tracing::warn!("Destroying unknown texture {:?}", texture),
        }
    }

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId {
        FramebufferId(self.framebuffers.insert(FramebufferEntry {
            label: label.to_string(),
            attachments: Vec::default(),
            draw_buffers: Vec::default(),
        }))
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: TextureId,
    ) {
        let Some(entry) = self.framebuffers.get_mut(framebuffer.0) else {
            tracing::warn!("Attaching to unknown framebuffer {:?}", framebuffer);
            return;
        };
        entry.attachments.retain(|(slot, _)| *slot != attachment);
        entry.attachments.push((attachment, texture));
    }

    fn set_draw_buffers(&mut self, framebuffer: FramebufferId, slots: &[u32]) {
        let Some(entry) = self.framebuffers.get_mut(framebuffer.0) else {
            tracing::warn!("Setting draw buffers on unknown framebuffer {:?}", framebuffer);
            return;
        };
        entry.draw_buffers = slots.to_vec();
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(entry) = self.framebuffers.get(framebuffer.0) else {
            return FramebufferStatus::MissingAttachment;
        };

        let states: Vec<AttachmentState> = entry
            .attachments
            .iter()
            .map(|(attachment, texture)| {
                let texture = self.textures.get(texture.0);
                let storage = texture.and_then(|t| t.storage.as_ref());
                AttachmentState {
                    attachment: *attachment,
                    format: texture
                        .filter(|t| t.storage.is_some())
                        .map(|t| t.descriptor.format),
                    size: storage.map(|s| s.size).unwrap_or(UVec2::ZERO),
                }
            })
            .collect();

        check_completeness(&states, &entry.draw_buffers, &self.limits)
    }

    fn framebuffer_attachment(
        &self,
        framebuffer: FramebufferId,
        attachment: Attachment,
    ) -> Option<TextureId> {
        self.framebuffers.get(framebuffer.0).and_then(|entry| {
            entry
                .attachments
                .iter()
                .find(|(slot, _)| *slot == attachment)
                .map(|(_, texture)| *texture)
        })
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(framebuffer.0).is_none() {
            tracing::warn!("Destroying unknown framebuffer {:?}", framebuffer);
        }
    }

    fn create_buffer(&mut self, descriptor: BufferDescriptor, contents: &[u8]) -> BufferId {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&descriptor.label),
                contents,
                usage: descriptor.usage.to_wgpu(),
            });
        BufferId(self.buffers.insert(buffer))
    }

    fn create_shader(&mut self, label: &str, source: &str) -> ShaderId {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.to_string().into()),
            });
        ShaderId(self.shaders.insert(module))
    }

    fn create_program(&mut self, descriptor: ProgramDescriptor) -> Result<ProgramId, DeviceError> {
        let Some(module) = self.shaders.get(descriptor.shader.0) else {
            return Err(DeviceError::UnknownShader(descriptor.label));
        };
        let label = descriptor.label.as_str();

        let uniform_layout_entries: Vec<wgpu::BindGroupLayoutEntry> =
            if descriptor.uniforms.is_empty() {
                vec![]
            } else {
                vec![wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }]
            };
        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label}_uniforms_layout")),
                entries: &uniform_layout_entries,
            });

        let uniform_buffer = (!descriptor.uniforms.is_empty()).then(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{label}_uniforms")),
                size: descriptor.uniforms.size(),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let uniform_entries: Vec<wgpu::BindGroupEntry> = uniform_buffer
            .iter()
            .map(|buffer| wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}_uniforms")),
            layout: &uniform_layout,
            entries: &uniform_entries,
        });

        let texture_layout_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..descriptor
            .texture_units)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        let texture_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label}_textures_layout")),
                entries: &texture_layout_entries,
            });

        let sampler_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label}_sampler_layout")),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                }],
            });
        let sampler_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}_sampler")),
            layout: &sampler_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            }],
        });

        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label}_pipeline_layout")),
                bind_group_layouts: &[&uniform_layout, &texture_layout, &sampler_layout],
                push_constant_ranges: &[],
            });

        let vertex_attributes = descriptor
            .vertex_layout
            .as_ref()
            .map(|layout| layout.to_wgpu_attributes())
            .unwrap_or_default();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_layout
            .as_ref()
            .map(|layout| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &vertex_attributes,
            })
            .into_iter()
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .color_targets
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: format.to_wgpu(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(descriptor.vertex_entry_point.as_str()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &vertex_buffers,
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: descriptor
                    .depth_format
                    .map(|format| wgpu::DepthStencilState {
                        format: format.to_wgpu(),
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(descriptor.fragment_entry_point.as_str()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &targets,
                }),
                multiview: None,
                cache: None,
            });

        let uniform_data = vec![0; descriptor.uniforms.size() as usize];

        Ok(ProgramId(self.programs.insert(ProgramEntry {
            label: descriptor.label,
            pipeline,
            uniforms: descriptor.uniforms,
            uniform_data,
            uniforms_dirty: false,
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            sampler_bind_group,
            texture_units: descriptor.texture_units,
        })))
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if self.programs.remove(program.0).is_none() {
            tracing::warn!("Destroying unknown program {:?}", program);
        }
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    fn begin_frame(&mut self) {
        if self.frame.is_some() {
            tracing::warn!("Frame started while another frame is in progress");
            return;
        }

        let Some((surface_texture, surface_view)) = self.acquire_surface() else {
            return;
        };

        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });

        self.frame = Some(Frame {
            encoder,
            surface_texture,
            surface_view,
        });
        self.state = BindState::default();
    }

    fn end_frame(&mut self) {
        self.flush_clear();

        let Some(frame) = self.frame.take() else {
            return;
        };

        self.queue.submit(Some(frame.encoder.finish()));
        if let Some(surface_texture) = frame.surface_texture {
            surface_texture.present();
        }
        self.state = BindState::default();
    }

    fn set_viewport(&mut self, size: UVec2) {
        self.state.viewport = Some(size);
    }

    fn bind_render_target(&mut self, target: RenderTarget) {
        self.flush_clear();
        self.state.target = Some(target);
        self.state.units.clear();
    }

    fn clear(&mut self, flags: ClearFlags) {
        let pending = self.state.pending_clear.unwrap_or(ClearFlags::empty());
        self.state.pending_clear = Some(pending | flags);
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.get(program.0).is_none() {
            tracing::warn!("Using unknown program {:?}", program);
        }
        self.state.program = Some(program);
    }

    fn set_uniform(&mut self, uniform: Uniform, value: UniformValue<'_>) {
        let Some(entry) = self
            .state
            .program
            .and_then(|program| self.programs.get_mut(program.0))
        else {
            tracing::warn!("Setting uniform {:?} without a program", uniform);
            return;
        };

        let Some(field) = entry.uniforms.field(uniform).copied() else {
            tracing::warn!("Program {} does not declare uniform {:?}", entry.label, uniform);
            return;
        };

        let bytes = value.to_bytes();
        let len = bytes.len().min(field.size as usize);
        let offset = field.offset as usize;
        entry.uniform_data[offset..offset + len].copy_from_slice(&bytes[..len]);
        entry.uniforms_dirty = true;
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId) {
        let index = unit.index() as usize;
        if self.state.units.len() <= index {
            self.state.units.resize(index + 1, None);
        }
        self.state.units[index] = Some(texture);
    }

    fn draw_fullscreen_quad(&mut self) {
        self.encode_pass(Some(Draw::FullscreenQuad));
    }

    fn draw_indexed(&mut self, vertices: BufferId, indices: BufferId, index_count: u32) {
        self.encode_pass(Some(Draw::Indexed {
            vertices,
            indices,
            index_count,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: UVec2 = UVec2::new(64, 64);

    const SHADER: &str = r#"
@group(1) @binding(0) var source: texture_2d<f32>;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    return vec4<f32>(corners[index], 0.0, 1.0);
}

@fragment
fn fs_solid() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 1.0, 1.0);
}

@fragment
fn fs_copy(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {
    return textureLoad(source, vec2<i32>(position.xy), 0);
}
"#;

    /// A device rendering into an offscreen texture, `None` on machines without an adapter.
    fn offscreen_device() -> Option<WgpuDevice> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )?;
        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
                .ok()?;
        Some(WgpuDevice::offscreen(
            device,
            queue,
            SIZE,
            TextureFormat::Rgba8UnormSrgb,
        ))
    }

    struct TestPrograms {
        solid: ProgramId,
        copy: ProgramId,
    }

    fn create_programs(device: &mut WgpuDevice, solid_format: TextureFormat) -> TestPrograms {
        let shader = device.create_shader("test", SHADER);
        let descriptor = |label: &str, fragment: &str, format, uniforms, texture_units| {
            ProgramDescriptor {
                label: label.to_string(),
                shader,
                vertex_entry_point: "vs_main".to_string(),
                fragment_entry_point: fragment.to_string(),
                vertex_layout: None,
                color_targets: vec![format],
                depth_format: None,
                uniforms,
                texture_units,
            }
        };

        let solid = device
            .create_program(descriptor(
                "solid",
                "fs_solid",
                solid_format,
                UniformLayout::default(),
                0,
            ))
            .unwrap();
        let copy = device
            .create_program(descriptor(
                "copy",
                "fs_copy",
                TextureFormat::Rgba8UnormSrgb,
                UniformLayout::default().push(Uniform::ScreenSize),
                1,
            ))
            .unwrap();

        TestPrograms { solid, copy }
    }

    /// The first texel of the offscreen surface.
    fn read_surface(device: &WgpuDevice) -> [u8; 4] {
        let texture = device.offscreen_texture().unwrap();
        // 64 texels of 4 bytes, a multiple of the copy row alignment.
        let bytes_per_row = SIZE.x * 4;

        let buffer = device.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: (bytes_per_row * SIZE.y) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(SIZE.y),
                },
            },
            wgpu::Extent3d {
                width: SIZE.x,
                height: SIZE.y,
                depth_or_array_layers: 1,
            },
        );
        device.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        let _ = device.device.poll(wgpu::Maintain::Wait);

        let data = slice.get_mapped_range();
        [data[0], data[1], data[2], data[3]]
    }

    #[test]
    fn renders_through_a_framebuffer_to_the_surface() {
        let Some(mut device) = offscreen_device() else {
            eprintln!("No adapter available, skipping");
            return;
        };

        let scene = device.create_texture(TextureDescriptor::render_target(
            "scene",
            TextureFormat::Rgba32Float,
        ));
        device.allocate_texture(scene, SIZE);
        assert_eq!(device.texture_size(scene), Some(SIZE));

        let framebuffer = device.create_framebuffer("scene");
        device.attach_texture(framebuffer, Attachment::Color(0), scene);
        device.set_draw_buffers(framebuffer, &[0]);
        assert_eq!(
            device.framebuffer_status(framebuffer),
            FramebufferStatus::Complete
        );

        let programs = create_programs(&mut device, TextureFormat::Rgba32Float);

        device.begin_frame();
        device.set_viewport(SIZE);

        device.bind_render_target(RenderTarget::Framebuffer(framebuffer));
        device.clear(ClearFlags::COLOR);
        device.use_program(programs.solid);
        device.draw_fullscreen_quad();

        device.bind_render_target(RenderTarget::Surface);
        device.clear(ClearFlags::COLOR);
        device.use_program(programs.copy);
        device.set_uniform(Uniform::ScreenSize, UniformValue::Vec2(SIZE.as_vec2()));
        device.bind_texture(TextureUnit(0), scene);
        device.draw_fullscreen_quad();

        device.end_frame();

        assert_eq!(read_surface(&device), [255, 255, 255, 255]);

        device.destroy_program(programs.solid);
        device.destroy_program(programs.copy);
        device.destroy_framebuffer(framebuffer);
        device.destroy_texture(scene);
    }

    #[test]
    fn clear_is_kept_when_a_draw_is_dropped() {
        let Some(mut device) = offscreen_device() else {
            eprintln!("No adapter available, skipping");
            return;
        };

        let programs = create_programs(&mut device, TextureFormat::Rgba8UnormSrgb);

        device.begin_frame();
        device.bind_render_target(RenderTarget::Surface);
        device.use_program(programs.solid);
        device.draw_fullscreen_quad();
        device.end_frame();
        assert_eq!(read_surface(&device), [255, 255, 255, 255]);

        // The copy program samples unit 0, which is never bound, so its draw is dropped.
        device.begin_frame();
        device.bind_render_target(RenderTarget::Surface);
        device.clear(ClearFlags::COLOR);
        device.use_program(programs.copy);
        device.draw_fullscreen_quad();
        device.end_frame();
        assert_eq!(read_surface(&device), [0, 0, 0, 0]);
    }
}
