//! Graphics backend boundary.
//!
//! Scene engines describe a frame as plain data ([`FrameDescription`]) and
//! talk to the GPU only through [`GraphicsBackend`]. The wgpu implementation
//! lives in [`renderer`]; tests use a recording fake.

pub mod mesh;
pub mod pipeline;
pub mod renderer;

use thiserror::Error;

use crate::camera::CameraUniforms;
use crate::lighting::LightingUniforms;
use crate::material::StandardMaterial;
use mesh::{MeshData, PointVertex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointsHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("graphics context has been released")]
    Released,
    #[error("no suitable graphics adapter")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(String),
    #[error("unknown resource handle")]
    UnknownHandle,
    #[error("mesh has {0} vertices, more than 16-bit indices can address")]
    MeshTooLarge(usize),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("frame readback failed: {0}")]
    Readback(String),
}

/// One mesh draw in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDraw {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub model: glam::Mat4,
}

/// One point field draw in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct PointsDraw {
    pub points: PointsHandle,
    pub model: glam::Mat4,
    pub size: f32,
    pub opacity: f32,
    pub additive: bool,
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone)]
pub struct FrameDescription {
    pub camera: CameraUniforms,
    pub lighting: LightingUniforms,
    /// RGBA; alpha 0 leaves the page showing through.
    pub clear_color: [f64; 4],
    pub meshes: Vec<MeshDraw>,
    pub points: Vec<PointsDraw>,
}

/// A rendering context that owns GPU resources behind handles.
///
/// Releasing a handle twice, or after [`GraphicsBackend::release_context`],
/// is a no-op.
pub trait GraphicsBackend {
    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle, RenderError>;

    fn upload_points(&mut self, points: &[PointVertex]) -> Result<PointsHandle, RenderError>;

    fn create_material(&mut self, material: &StandardMaterial) -> Result<MaterialHandle, RenderError>;

    /// Drawing-buffer size in physical pixels.
    fn resize(&mut self, width: u32, height: u32);

    fn render(&mut self, frame: &FrameDescription) -> Result<(), RenderError>;

    fn release_mesh(&mut self, handle: MeshHandle);

    fn release_points(&mut self, handle: PointsHandle);

    fn release_material(&mut self, handle: MaterialHandle);

    /// Drop the device and surface. Nothing can be drawn afterwards.
    fn release_context(&mut self);
}
