/// Handle to a vertex or index buffer tracked by the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BufferId(pub generational_arena::Index);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BufferUsage {
    Vertex,
    /// `u32` indices.
    Index,
}

impl BufferUsage {
    pub fn to_wgpu(self) -> wgpu::BufferUsages {
        match self {
            Self::Vertex => wgpu::BufferUsages::VERTEX,
            Self::Index => wgpu::BufferUsages::INDEX,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BufferDescriptor {
    pub label: String,
    pub usage: BufferUsage,
}
