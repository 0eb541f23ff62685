use glam::{Mat4, UVec2};

use crate::collaborators::Camera;

/// The passes of a frame, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::Display, strum::EnumIter)]
pub enum FrameStage {
    Geometry,
    LightRefresh,
    Shading,
    BloomBlur,
    BloomComposite,
}

impl FrameStage {
    pub fn is_bloom(self) -> bool {
        matches!(self, Self::BloomBlur | Self::BloomComposite)
    }

    /// The stages a frame runs through.
    pub fn sequence(enable_bloom: bool) -> impl Iterator<Item = FrameStage> {
        use strum::IntoEnumIterator;
        Self::iter().filter(move |stage| enable_bloom || !stage.is_bloom())
    }
}

/// Values derived from the camera once per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameState {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    /// The camera's world transform.
    pub inverse_view: Mat4,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub viewport: UVec2,
}

impl FrameState {
    pub fn new<C: Camera + ?Sized>(camera: &C, viewport: UVec2) -> Self {
        let inverse_view = camera.world_transform();
        let view = inverse_view.inverse();
        let projection = camera.projection();

        Self {
            view,
            projection,
            view_projection: projection * view,
            inverse_view,
            fov: camera.fov_degrees().to_radians(),
            viewport,
        }
    }
}
