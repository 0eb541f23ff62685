use glam::UVec2;

/// Tracks the size the render targets were last allocated at and notices when the viewport
/// no longer matches it.
#[derive(Debug)]
pub struct ResizeCoordinator {
    allocated: UVec2,
    /// Set when a reallocation failed part way. The targets may then be at mixed sizes and must
    /// be reallocated before they are used again.
    invalid: bool,
}

impl ResizeCoordinator {
    pub fn new(allocated: UVec2) -> Self {
        Self {
            allocated,
            invalid: false,
        }
    }

    /// Size the targets currently have.
    pub fn allocated(&self) -> UVec2 {
        self.allocated
    }

    /// Whether the targets must be reallocated before they can be used.
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// The size to reallocate to, if the targets no longer match `viewport`.
    ///
    /// A viewport without area (a minimized window) never asks for reallocation, unless the
    /// targets are invalid, in which case the last good size is asked for.
    pub fn poll(&self, viewport: UVec2) -> Option<UVec2> {
        if viewport.x == 0 || viewport.y == 0 {
            tracing::debug!(
                "Ignoring {}x{} viewport, keeping targets at {}x{}",
                viewport.x,
                viewport.y,
                self.allocated.x,
                self.allocated.y
            );
            return self.invalid.then_some(self.allocated);
        }

        (self.invalid || viewport != self.allocated).then_some(viewport)
    }

    /// Record that the targets were reallocated at `size`.
    pub fn acknowledge(&mut self, size: UVec2) {
        self.allocated = size;
        self.invalid = false;
    }

    /// Record that a reallocation failed. Every following poll asks for reallocation until one
    /// is acknowledged.
    pub fn invalidate(&mut self) {
        self.invalid = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_viewport() {
        let coordinator = ResizeCoordinator::new(UVec2::new(800, 600));
        assert_eq!(coordinator.poll(UVec2::new(800, 600)), None);
    }

    #[test]
    fn changed_viewport() {
        let mut coordinator = ResizeCoordinator::new(UVec2::new(800, 600));
        let size = UVec2::new(1024, 768);
        assert_eq!(coordinator.poll(size), Some(size));

        coordinator.acknowledge(size);
        assert_eq!(coordinator.poll(size), None);
        assert_eq!(coordinator.allocated(), size);
    }

    #[test]
    fn zero_area_viewport_is_ignored() {
        let coordinator = ResizeCoordinator::new(UVec2::new(800, 600));
        assert_eq!(coordinator.poll(UVec2::new(0, 600)), None);
        assert_eq!(coordinator.poll(UVec2::new(800, 0)), None);
        assert_eq!(coordinator.poll(UVec2::ZERO), None);
    }

    #[test]
    fn invalid_targets_are_reallocated_at_any_size() {
        let mut coordinator = ResizeCoordinator::new(UVec2::new(800, 600));
        coordinator.invalidate();
        assert!(coordinator.is_invalid());

        // Even the size the targets were last allocated at.
        let size = UVec2::new(800, 600);
        assert_eq!(coordinator.poll(size), Some(size));
        assert_eq!(coordinator.poll(UVec2::ZERO), Some(size));

        coordinator.acknowledge(size);
        assert!(!coordinator.is_invalid());
        assert_eq!(coordinator.poll(size), None);
    }
}
