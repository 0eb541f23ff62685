//! A device without a GPU behind it.
//!
//! [HeadlessDevice] tracks every resource in arenas, checks framebuffers the way a driver would
//! and records each frame command into a log that can be inspected afterwards.

use generational_arena::Arena;
use glam::UVec2;

use crate::{
    Attachment, AttachmentState, BufferDescriptor, BufferId, ClearFlags, DeviceError, DeviceLimits,
    FramebufferId, FramebufferStatus, ProgramDescriptor, ProgramId, RenderDevice, RenderTarget,
    ShaderId, TextureDescriptor, TextureFormat, TextureId, TextureUnit, Uniform, UniformValue,
    check_completeness, float_upload_len,
};

/// A single recorded command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginFrame,
    EndFrame,
    AllocateTexture {
        texture: TextureId,
        size: UVec2,
    },
    WriteTexture {
        texture: TextureId,
        len: usize,
    },
    SetViewport(UVec2),
    BindRenderTarget(RenderTarget),
    Clear(ClearFlags),
    UseProgram(ProgramId),
    SetUniform {
        uniform: Uniform,
        value: UniformValue<'static>,
    },
    BindTexture {
        unit: TextureUnit,
        texture: TextureId,
    },
    DrawFullscreenQuad,
    DrawIndexed {
        vertices: BufferId,
        indices: BufferId,
        index_count: u32,
    },
}

impl Command {
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawFullscreenQuad | Self::DrawIndexed { .. })
    }
}

struct TextureEntry {
    descriptor: TextureDescriptor,
    size: Option<UVec2>,
    contents: Option<Vec<f32>>,
}

struct FramebufferEntry {
    label: String,
    attachments: Vec<(Attachment, TextureId)>,
    draw_buffers: Vec<u32>,
}

struct BufferEntry {
    _descriptor: BufferDescriptor,
    _len: usize,
}

struct ShaderEntry {
    _label: String,
}

struct ProgramEntry {
    descriptor: ProgramDescriptor,
}

pub struct HeadlessDevice {
    limits: DeviceLimits,
    surface_size: UVec2,
    surface_format: TextureFormat,

    textures: Arena<TextureEntry>,
    framebuffers: Arena<FramebufferEntry>,
    buffers: Arena<BufferEntry>,
    shaders: Arena<ShaderEntry>,
    programs: Arena<ProgramEntry>,

    commands: Vec<Command>,

    bound_target: Option<RenderTarget>,
    current_program: Option<ProgramId>,
    /// Units bound since the last draw or render target change.
    pending_units: Vec<TextureUnit>,
    unit_collisions: usize,
    in_frame: bool,
}

impl HeadlessDevice {
    pub fn new(surface_size: UVec2) -> Self {
        Self::with_limits(surface_size, DeviceLimits::default())
    }

    pub fn with_limits(surface_size: UVec2, limits: DeviceLimits) -> Self {
        Self {
            limits,
            surface_size,
            surface_format: TextureFormat::Bgra8UnormSrgb,
            textures: Arena::default(),
            framebuffers: Arena::default(),
            buffers: Arena::default(),
            shaders: Arena::default(),
            programs: Arena::default(),
            commands: Vec::default(),
            bound_target: None,
            current_program: None,
            pending_units: Vec::default(),
            unit_collisions: 0,
            in_frame: false,
        }
    }

    /// Simulate the window changing size.
    pub fn set_surface_size(&mut self, size: UVec2) {
        self.surface_size = size;
    }

    pub fn set_limits(&mut self, limits: DeviceLimits) {
        self.limits = limits;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Split the log into frames, each holding the commands between `BeginFrame` and `EndFrame`.
    pub fn frames(&self) -> Vec<&[Command]> {
        let mut frames = Vec::new();
        let mut start = None;
        for (i, command) in self.commands.iter().enumerate() {
            match command {
                Command::BeginFrame => start = Some(i + 1),
                Command::EndFrame => {
                    if let Some(s) = start.take() {
                        frames.push(&self.commands[s..i]);
                    }
                }
                _ => {}
            }
        }
        frames
    }

    /// Number of times a texture unit was bound twice without a draw in between.
    pub fn unit_collisions(&self) -> usize {
        self.unit_collisions
    }

    pub fn texture_descriptor(&self, texture: TextureId) -> Option<&TextureDescriptor> {
        self.textures.get(texture.0).map(|entry| &entry.descriptor)
    }

    /// The last data written with [RenderDevice::write_texture], cleared on reallocation.
    pub fn texture_contents(&self, texture: TextureId) -> Option<&[f32]> {
        self.textures
            .get(texture.0)
            .and_then(|entry| entry.contents.as_deref())
    }

    pub fn draw_buffers(&self, framebuffer: FramebufferId) -> Option<&[u32]> {
        self.framebuffers
            .get(framebuffer.0)
            .map(|entry| entry.draw_buffers.as_slice())
    }

    pub fn framebuffer_label(&self, framebuffer: FramebufferId) -> Option<&str> {
        self.framebuffers
            .get(framebuffer.0)
            .map(|entry| entry.label.as_str())
    }

    pub fn program_descriptor(&self, program: ProgramId) -> Option<&ProgramDescriptor> {
        self.programs.get(program.0).map(|entry| &entry.descriptor)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    fn record(&mut self, command: Command) {
        if !self.in_frame && command_needs_frame(&command) {
            tracing::warn!("{:?} recorded outside of a frame", command);
        }
        self.commands.push(command);
    }
}

fn command_needs_frame(command: &Command) -> bool {
    !matches!(
        command,
        Command::AllocateTexture { .. } | Command::WriteTexture { .. }
    )
}

impl RenderDevice for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn surface_size(&self) -> UVec2 {
        self.surface_size
    }

    fn surface_format(&self) -> TextureFormat {
        self.surface_format
    }

    fn create_texture(&mut self, descriptor: TextureDescriptor) -> TextureId {
        TextureId(self.textures.insert(TextureEntry {
            descriptor,
            size: None,
            contents: None,
        }))
    }

    fn allocate_texture(&mut self, texture: TextureId, size: UVec2) {
        let Some(entry) = self.textures.get_mut(texture.0) else {
            tracing::warn!("Allocating storage for unknown texture {:?}", texture);
            return;
        };
        entry.size = Some(size);
        entry.contents = None;
        self.record(Command::AllocateTexture { texture, size });
    }

    fn texture_size(&self, texture: TextureId) -> Option<UVec2> {
        self.textures.get(texture.0).and_then(|entry| entry.size)
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) {
        let Some(entry) = self.textures.get_mut(texture.0) else {
            tracing::warn!("Writing to unknown texture {:?}", texture);
            return;
        };

        let Some(size) = entry.size else {
            tracing::warn!("Writing to texture without storage ({})", entry.descriptor.label);
            return;
        };

        let expected = float_upload_len(entry.descriptor.format, size);
        if expected != Some(data.len()) {
            tracing::warn!(
                "Texture upload size mismatch for {} (expected {:?}, got {})",
                entry.descriptor.label,
                expected,
                data.len()
            );
            return;
        }

        entry.contents = Some(data.to_vec());
        self.record(Command::WriteTexture {
            texture,
            len: data.len(),
        });
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture.0).is_none() {
            tracing::warn!("Destroying unknown texture {:?}", texture);
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
                AttachmentState {
                    attachment: *attachment,
                    format: texture
                        .filter(|t| t.size.is_some())
                        .map(|t| t.descriptor.format),
                    size: texture.and_then(|t| t.size).unwrap_or(UVec2::ZERO),
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
        if self.bound_target == Some(RenderTarget::Framebuffer(framebuffer)) {
            self.bound_target = None;
        }
    }

    fn create_buffer(&mut self, descriptor: BufferDescriptor, contents: &[u8]) -> BufferId {
        BufferId(self.buffers.insert(BufferEntry {
            _descriptor: descriptor,
            _len: contents.len(),
        }))
    }

    fn create_shader(&mut self, label: &str, _source: &str) -> ShaderId {
        ShaderId(self.shaders.insert(ShaderEntry {
            _label: label.to_string(),
        }))
    }

    fn create_program(&mut self, descriptor: ProgramDescriptor) -> Result<ProgramId, DeviceError> {
        if self.shaders.get(descriptor.shader.0).is_none() {
            return Err(DeviceError::UnknownShader(descriptor.label));
        }
        Ok(ProgramId(self.programs.insert(ProgramEntry { descriptor })))
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if self.programs.remove(program.0).is_none() {
            tracing::warn!("Destroying unknown program {:?}", program);
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn begin_frame(&mut self) {
        if self.in_frame {
            tracing::warn!("Frame started while another frame is in progress");
        }
        self.in_frame = true;
        self.record(Command::BeginFrame);
    }

    fn end_frame(&mut self) {
        self.record(Command::EndFrame);
        self.in_frame = false;
        self.bound_target = None;
        self.current_program = None;
        self.pending_units.clear();
    }

    fn set_viewport(&mut self, size: UVec2) {
        self.record(Command::SetViewport(size));
    }

    fn bind_render_target(&mut self, target: RenderTarget) {
        if let RenderTarget::Framebuffer(framebuffer) = target {
            let status = self.framebuffer_status(framebuffer);
            if !status.is_complete() {
                tracing::warn!("Binding framebuffer {:?} that is {}", framebuffer, status);
            }
        }
        self.bound_target = Some(target);
        self.pending_units.clear();
        self.record(Command::BindRenderTarget(target));
    }

    fn clear(&mut self, flags: ClearFlags) {
        if self.bound_target.is_none() {
            tracing::warn!("Clear without a bound render target");
        }
        self.record(Command::Clear(flags));
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.get(program.0).is_none() {
            tracing::warn!("Using unknown program {:?}", program);
        }
        self.current_program = Some(program);
        self.record(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, uniform: Uniform, value: UniformValue<'_>) {
        match self
            .current_program
            .and_then(|program| self.programs.get(program.0))
        {
            Some(entry) if entry.descriptor.uniforms.field(uniform).is_none() => {
                tracing::warn!(
                    "Program {} does not declare uniform {:?}",
                    entry.descriptor.label,
                    uniform
                );
            }
            Some(_) => {}
            None => tracing::warn!("Setting uniform {:?} without a program", uniform),
        }
        self.record(Command::SetUniform {
            uniform,
            value: value.into_owned(),
        });
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId) {
        if unit.index() >= self.limits.max_texture_units {
            tracing::warn!("Texture unit {} exceeds device limits", unit.index());
        }
        if self.textures.get(texture.0).is_none() {
            tracing::warn!("Binding unknown texture {:?}", texture);
        }
        if self.pending_units.contains(&unit) {
            self.unit_collisions += 1;
        } else {
            self.pending_units.push(unit);
        }
        self.record(Command::BindTexture { unit, texture });
    }

    fn draw_fullscreen_quad(&mut self) {
        if self.bound_target.is_none() || self.current_program.is_none() {
            tracing::warn!("Full-screen draw without a render target or program");
        }
        self.pending_units.clear();
        self.record(Command::DrawFullscreenQuad);
    }

    fn draw_indexed(&mut self, vertices: BufferId, indices: BufferId, index_count: u32) {
        if self.buffers.get(vertices.0).is_none() || self.buffers.get(indices.0).is_none() {
            tracing::warn!("Indexed draw with unknown buffers");
        }
        self.pending_units.clear();
        self.record(Command::DrawIndexed {
            vertices,
            indices,
            index_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_texture(device: &mut HeadlessDevice, size: UVec2) -> TextureId {
        let texture = device.create_texture(TextureDescriptor::render_target(
            "color",
            TextureFormat::Rgba32Float,
        ));
        device.allocate_texture(texture, size);
        texture
    }

    #[test]
    fn texture_without_storage_makes_framebuffer_incomplete() {
        let mut device = HeadlessDevice::new(UVec2::new(64, 64));
        let texture = device.create_texture(TextureDescriptor::render_target(
            "color",
            TextureFormat::Rgba32Float,
        ));
        let framebuffer = device.create_framebuffer("fb");
        device.attach_texture(framebuffer, Attachment::Color(0), texture);
        device.set_draw_buffers(framebuffer, &[0]);

        assert_eq!(
            device.framebuffer_status(framebuffer),
            FramebufferStatus::IncompleteAttachment
        );

        device.allocate_texture(texture, UVec2::new(64, 64));
        assert_eq!(
            device.framebuffer_status(framebuffer),
            FramebufferStatus::Complete
        );
    }

    #[test]
    fn destroyed_texture_makes_framebuffer_incomplete() {
        let mut device = HeadlessDevice::new(UVec2::new(64, 64));
        let texture = color_texture(&mut device, UVec2::new(64, 64));
        let framebuffer = device.create_framebuffer("fb");
        device.attach_texture(framebuffer, Attachment::Color(0), texture);

        device.destroy_texture(texture);
        assert_eq!(
            device.framebuffer_status(framebuffer),
            FramebufferStatus::IncompleteAttachment
        );
    }

    #[test]
    fn reattaching_replaces_the_slot() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        let a = color_texture(&mut device, UVec2::new(8, 8));
        let b = color_texture(&mut device, UVec2::new(8, 8));
        let framebuffer = device.create_framebuffer("fb");
        device.attach_texture(framebuffer, Attachment::Color(0), a);
        device.attach_texture(framebuffer, Attachment::Color(0), b);

        assert_eq!(
            device.framebuffer_attachment(framebuffer, Attachment::Color(0)),
            Some(b)
        );
    }

    #[test]
    fn reallocation_discards_contents() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        let texture = color_texture(&mut device, UVec2::new(2, 1));
        device.write_texture(texture, &[1.0; 8]);
        assert_eq!(device.texture_contents(texture), Some(&[1.0; 8][..]));

        device.allocate_texture(texture, UVec2::new(4, 4));
        assert_eq!(device.texture_contents(texture), None);
        assert_eq!(device.texture_size(texture), Some(UVec2::new(4, 4)));
    }

    #[test]
    fn mismatched_upload_is_ignored() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        let texture = color_texture(&mut device, UVec2::new(2, 1));
        device.write_texture(texture, &[1.0; 3]);
        assert_eq!(device.texture_contents(texture), None);
    }

    #[test]
    fn unit_collisions_are_counted_per_draw() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        let texture = color_texture(&mut device, UVec2::new(8, 8));

        device.begin_frame();
        device.bind_render_target(RenderTarget::Surface);
        device.bind_texture(TextureUnit(0), texture);
        device.bind_texture(TextureUnit(1), texture);
        device.draw_fullscreen_quad();
        device.bind_texture(TextureUnit(0), texture);
        device.draw_fullscreen_quad();
        assert_eq!(device.unit_collisions(), 0);

        device.bind_texture(TextureUnit(0), texture);
        device.bind_texture(TextureUnit(0), texture);
        assert_eq!(device.unit_collisions(), 1);
        device.end_frame();
    }

    #[test]
    fn frames_are_split_from_the_log() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        for _ in 0..2 {
            device.begin_frame();
            device.bind_render_target(RenderTarget::Surface);
            device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
            device.end_frame();
        }

        let frames = device.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frames[1]);
        assert_eq!(frames[0].len(), 2);
    }
}
