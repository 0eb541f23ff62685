use glam::UVec2;
use renderer::{RenderDevice, TextureDescriptor, TextureFormat, TextureId};

use crate::collaborators::{Light, LightDataSource};

/// Scene lights packed into a float texture.
///
/// Each light is an element of two RGBA texels, stored one element per column:
/// - row 0: position x, y, z and radius.
/// - row 1: color r, g, b and 0.
pub struct LightTexture {
    texture: TextureId,
    capacity: u32,
    buffer: Vec<f32>,
}

impl LightTexture {
    pub const FORMAT: TextureFormat = TextureFormat::Rgba32Float;
    pub const PIXELS_PER_ELEMENT: u32 = 2;
    const COMPONENTS: u32 = 4;

    pub fn new<D: RenderDevice>(device: &mut D, capacity: u32) -> Self {
        tracing::info!("Creating light texture for {} lights", capacity);

        let texture =
            device.create_texture(TextureDescriptor::render_target("light_data", Self::FORMAT));
        let size = UVec2::new(capacity, Self::PIXELS_PER_ELEMENT);
        device.allocate_texture(texture, size);

        let len = (capacity * Self::PIXELS_PER_ELEMENT * Self::COMPONENTS) as usize;

        Self {
            texture,
            capacity,
            buffer: vec![0.0; len],
        }
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    /// Number of lights the texture holds.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The packed data uploaded with the last update.
    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    /// Index of the first float of `pixel` of element `index`.
    pub fn buffer_index(&self, index: u32, pixel: u32) -> usize {
        (Self::COMPONENTS * index + Self::COMPONENTS * pixel * self.capacity) as usize
    }

    /// Write `lights` into the buffer. Lights past the capacity are dropped, unused slots are
    /// zeroed.
    fn pack(&mut self, lights: &[Light]) {
        if lights.len() != self.capacity as usize {
            tracing::debug!(
                "Packing {} lights into a texture for {}",
                lights.len(),
                self.capacity
            );
        }

        self.buffer.fill(0.0);

        for (i, light) in lights.iter().take(self.capacity as usize).enumerate() {
            let i = i as u32;

            let p = self.buffer_index(i, 0);
            self.buffer[p..p + 3].copy_from_slice(&light.position.to_array());
            self.buffer[p + 3] = light.radius;

            let c = self.buffer_index(i, 1);
            self.buffer[c..c + 3].copy_from_slice(&light.color.to_array());
        }
    }

    pub fn destroy<D: RenderDevice>(self, device: &mut D) {
        device.destroy_texture(self.texture);
    }
}

impl<D: RenderDevice> LightDataSource<D> for LightTexture {
    fn update(&mut self, device: &mut D, lights: &[Light]) -> TextureId {
        self.pack(lights);
        device.write_texture(self.texture, &self.buffer);
        self.texture
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use renderer::HeadlessDevice;

    use super::*;

    fn light(i: u32) -> Light {
        let f = i as f32;
        Light {
            position: Vec3::new(f, f + 0.5, f + 0.25),
            radius: f + 2.0,
            color: Vec3::new(0.5 * f, 0.25 * f, 0.125 * f),
        }
    }

    #[test]
    fn packs_position_radius_and_color() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        let mut lights = LightTexture::new(&mut device, 3);
        assert_eq!(device.texture_size(lights.texture()), Some(UVec2::new(3, 2)));

        let scene: Vec<Light> = (0..3).map(light).collect();
        let texture = lights.update(&mut device, &scene);
        assert_eq!(texture, lights.texture());

        let data = device.texture_contents(texture).unwrap();
        assert_eq!(data.len(), 3 * 2 * 4);

        // Element 1, first pixel.
        assert_eq!(&data[4..8], &[1.0, 1.5, 1.25, 3.0]);
        // Element 1, second pixel lives one row (3 texels) further.
        assert_eq!(&data[16..20], &[0.5, 0.25, 0.125, 0.0]);
        assert_eq!(lights.buffer_index(2, 1), 20);
    }

    #[test]
    fn missing_lights_stay_zero() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        let mut lights = LightTexture::new(&mut device, 4);

        lights.update(&mut device, &[light(1)]);

        let buffer = lights.buffer();
        assert_eq!(&buffer[0..4], &[1.0, 1.5, 1.25, 3.0]);
        assert!(buffer[4..16].iter().all(|v| *v == 0.0));
        assert!(buffer[20..32].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn extra_lights_are_ignored() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        let mut lights = LightTexture::new(&mut device, 2);

        let scene: Vec<Light> = (0..5).map(light).collect();
        lights.update(&mut device, &scene);

        assert_eq!(lights.buffer().len(), 16);
        assert_eq!(lights.buffer()[lights.buffer_index(1, 0)], 1.0);
    }

    #[test]
    fn update_replaces_previous_lights() {
        let mut device = HeadlessDevice::new(UVec2::new(8, 8));
        let mut lights = LightTexture::new(&mut device, 2);

        lights.update(&mut device, &[light(1), light(2)]);
        lights.update(&mut device, &[light(3)]);

        assert_eq!(lights.buffer()[0], 3.0);
        assert_eq!(lights.buffer()[lights.buffer_index(1, 0)], 0.0);
    }
}
