use crate::targets::GBufferLayout;

/// Number of cluster slices along each axis of the view frustum.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClusterGrid {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl ClusterGrid {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total number of clusters in the grid.
    pub fn cluster_count(&self) -> u32 {
        self.x * self.y * self.z
    }
}

impl Default for ClusterGrid {
    fn default() -> Self {
        Self::new(15, 15, 15)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub cluster_grid: ClusterGrid,
    /// Number of lights the light data texture holds.
    pub num_lights: u32,
    /// Run the bright-pass blur and composite after shading.
    pub enable_bloom: bool,
    pub gbuffer_layout: GBufferLayout,
    pub frustum_near: f32,
    pub frustum_far: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cluster_grid: ClusterGrid::default(),
            num_lights: 100,
            enable_bloom: true,
            gbuffer_layout: GBufferLayout::Full,
            frustum_near: 0.1,
            frustum_far: 1000.0,
        }
    }
}

impl PipelineConfig {
    /// Log anything about the configuration that is allowed, but probably not intended.
    pub fn check(&self) {
        if self.enable_bloom && self.gbuffer_layout == GBufferLayout::Reduced {
            tracing::warn!(
                "Bloom is enabled with a reduced geometry buffer layout, the bloom shading program expects positions"
            );
        }

        if self.num_lights == 0 {
            tracing::warn!("Pipeline configured without any lights");
        }

        if self.frustum_near >= self.frustum_far {
            tracing::warn!(
                "Frustum near depth ({}) is not in front of the far depth ({})",
                self.frustum_near,
                self.frustum_far
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_bloom_with_full_layout() {
        let config = PipelineConfig::default();
        assert!(config.enable_bloom);
        assert_eq!(config.gbuffer_layout, GBufferLayout::Full);
        assert_eq!(config.gbuffer_layout.attachment_count(), 3);
    }

    #[test]
    fn cluster_count() {
        assert_eq!(ClusterGrid::new(2, 3, 4).cluster_count(), 24);
    }
}
