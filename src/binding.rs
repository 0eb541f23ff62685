//! Texture unit assignment of every pass.
//!
//! Units are handed out consecutively from 0 in a fixed order and computed once, when the
//! pipeline is built. Shaders rely on the same order.

use renderer::TextureUnit;

/// Largest number of geometry buffers any layout uses.
pub const MAX_GBUFFERS: usize = 3;

/// Units of the shading pass: geometry buffers first, then light data, then cluster data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShadingBindings {
    pub gbuffers: [TextureUnit; MAX_GBUFFERS],
    pub gbuffer_count: usize,
    pub light_data: TextureUnit,
    pub cluster_data: TextureUnit,
}

impl ShadingBindings {
    /// Assign units for `gbuffer_count` geometry buffers. Counts above [MAX_GBUFFERS] are
    /// clamped.
    pub fn new(gbuffer_count: usize) -> Self {
        let gbuffer_count = gbuffer_count.min(MAX_GBUFFERS);

        let mut gbuffers = [TextureUnit(0); MAX_GBUFFERS];
        for (i, unit) in gbuffers.iter_mut().enumerate() {
            *unit = TextureUnit(i as u32);
        }

        let light_data = TextureUnit(gbuffer_count as u32);
        let cluster_data = light_data.next();

        Self {
            gbuffers,
            gbuffer_count,
            light_data,
            cluster_data,
        }
    }

    /// Units of the geometry buffers in use.
    pub fn gbuffers(&self) -> &[TextureUnit] {
        &self.gbuffers[..self.gbuffer_count]
    }

    /// Every unit the pass binds, in binding order.
    pub fn units(&self) -> impl Iterator<Item = TextureUnit> + '_ {
        self.gbuffers()
            .iter()
            .copied()
            .chain([self.light_data, self.cluster_data])
    }

    pub fn required_units(&self) -> u32 {
        self.gbuffer_count as u32 + 2
    }
}

/// Units of the blur pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlurBindings {
    pub bright: TextureUnit,
}

impl Default for BlurBindings {
    fn default() -> Self {
        Self {
            bright: TextureUnit(0),
        }
    }
}

/// Units of the composite pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CompositeBindings {
    pub rendered: TextureUnit,
    pub blurred: TextureUnit,
}

impl Default for CompositeBindings {
    fn default() -> Self {
        let rendered = TextureUnit(0);
        Self {
            rendered,
            blurred: rendered.next(),
        }
    }
}

/// `true` if no unit appears twice.
pub fn is_collision_free(units: impl IntoIterator<Item = TextureUnit>) -> bool {
    let mut seen = Vec::new();
    for unit in units {
        if seen.contains(&unit) {
            return false;
        }
        seen.push(unit);
    }
    true
}
