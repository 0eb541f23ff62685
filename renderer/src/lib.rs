//! A GL-like command surface over `wgpu` with textures, framebuffers and programs addressed by
//! handle.
//!
//! [RenderDevice] is implemented by [WgpuDevice] for real rendering and by [HeadlessDevice], which
//! records commands and validates framebuffers without a GPU.

mod buffers;
mod device;
mod framebuffers;
mod headless;
mod programs;
mod textures;
mod wgpu_device;

pub use buffers::*;
pub use device::*;
pub use framebuffers::*;
pub use headless::{Command, HeadlessDevice};
pub use programs::*;
pub use textures::*;
pub use wgpu_device::{FULLSCREEN_QUAD_VERTICES, WgpuDevice};
