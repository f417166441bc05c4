//! Shared plumbing for the two scene engines: construction gating, viewport
//! sizing, frame assembly and the dispose-once resource set.

use thiserror::Error;

use crate::camera::PerspectiveCamera;
use crate::gpu::mesh::{MeshData, PointVertex};
use crate::gpu::{
    FrameDescription, GraphicsBackend, MaterialHandle, MeshDraw, MeshHandle, PointsDraw,
    PointsHandle, RenderError,
};
use crate::lighting::Lighting;
use crate::material::StandardMaterial;
use crate::scene_graph::SceneGraph;

/// Why a scene engine declined to start. Logged, never shown to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneUnavailable {
    #[error("no graphics runtime available")]
    NoGraphics,
    #[error("reduced motion preferred")]
    ReducedMotion,
    #[error("viewport {width}px is narrower than {min}px")]
    NarrowViewport { width: f64, min: f64 },
    #[error("graphics backend failed: {0}")]
    Backend(String),
}

impl From<RenderError> for SceneUnavailable {
    fn from(e: RenderError) -> Self {
        SceneUnavailable::Backend(e.to_string())
    }
}

/// What the host knows about the platform when a scene is requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSupport {
    pub has_graphics: bool,
    pub reduced_motion: bool,
    /// CSS pixels.
    pub viewport_width: f64,
}

impl SceneSupport {
    pub fn check(&self, min_width: f64) -> Result<(), SceneUnavailable> {
        if !self.has_graphics {
            return Err(SceneUnavailable::NoGraphics);
        }
        if self.reduced_motion {
            return Err(SceneUnavailable::ReducedMotion);
        }
        if self.viewport_width < min_width {
            return Err(SceneUnavailable::NarrowViewport {
                width: self.viewport_width,
                min: min_width,
            });
        }
        Ok(())
    }
}

/// Drawing area in CSS pixels plus the device pixel ratio in use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub pixel_ratio: f64,
}

impl Viewport {
    /// Size a viewport from a container, with a minimum height and a cap on
    /// the device pixel ratio.
    pub fn fit(width: f64, height: f64, min_height: f64, device_pixel_ratio: f64, max_ratio: f64) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(min_height).max(1.0),
            pixel_ratio: device_pixel_ratio.clamp(1.0, max_ratio),
        }
    }

    pub fn aspect(&self) -> f32 {
        (self.width / self.height) as f32
    }

    /// Drawing-buffer size in physical pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        (
            (self.width * self.pixel_ratio).round().max(1.0) as u32,
            (self.height * self.pixel_ratio).round().max(1.0) as u32,
        )
    }
}

/// Collect the visible contents of a scene into a frame.
pub fn describe_frame(
    scene: &SceneGraph,
    camera: &PerspectiveCamera,
    lighting: &Lighting,
    clear_color: [f64; 4],
) -> FrameDescription {
    let meshes = scene
        .meshes()
        .map(|(id, mesh)| MeshDraw {
            mesh: mesh.mesh,
            material: mesh.material,
            model: scene.world_matrix(id),
        })
        .collect();

    let points = scene
        .point_clouds()
        .map(|(id, cloud)| PointsDraw {
            points: cloud.points,
            model: scene.world_matrix(id),
            size: cloud.size,
            opacity: cloud.opacity,
            additive: cloud.additive,
        })
        .collect();

    FrameDescription {
        camera: camera.to_uniforms(),
        lighting: lighting.to_uniforms(),
        clear_color,
        meshes,
        points,
    }
}

/// The graphics context of one scene instance and everything created on it.
///
/// [`SceneResources::dispose`] releases each resource exactly once, then the
/// context; later calls do nothing.
pub struct SceneResources<B: GraphicsBackend> {
    backend: Option<B>,
    meshes: Vec<MeshHandle>,
    points: Vec<PointsHandle>,
    materials: Vec<MaterialHandle>,
}

impl<B: GraphicsBackend> SceneResources<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Some(backend),
            meshes: Vec::new(),
            points: Vec::new(),
            materials: Vec::new(),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.backend.is_none()
    }

    fn backend_mut(&mut self) -> Result<&mut B, RenderError> {
        self.backend.as_mut().ok_or(RenderError::Released)
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshHandle, RenderError> {
        let handle = self.backend_mut()?.upload_mesh(mesh)?;
        self.meshes.push(handle);
        Ok(handle)
    }

    pub fn upload_points(&mut self, points: &[PointVertex]) -> Result<PointsHandle, RenderError> {
        let handle = self.backend_mut()?.upload_points(points)?;
        self.points.push(handle);
        Ok(handle)
    }

    pub fn create_material(&mut self, material: &StandardMaterial) -> Result<MaterialHandle, RenderError> {
        let handle = self.backend_mut()?.create_material(material)?;
        self.materials.push(handle);
        Ok(handle)
    }

    /// Release one mesh ahead of disposal. Unknown handles are ignored.
    pub fn release_mesh(&mut self, handle: MeshHandle) {
        let Some(index) = self.meshes.iter().position(|h| *h == handle) else {
            return;
        };
        self.meshes.swap_remove(index);
        if let Some(backend) = self.backend.as_mut() {
            backend.release_mesh(handle);
        }
    }

    pub fn release_material(&mut self, handle: MaterialHandle) {
        let Some(index) = self.materials.iter().position(|h| *h == handle) else {
            return;
        };
        self.materials.swap_remove(index);
        if let Some(backend) = self.backend.as_mut() {
            backend.release_material(handle);
        }
    }

    pub fn resize(&mut self, viewport: &Viewport) {
        let (width, height) = viewport.physical_size();
        if let Some(backend) = self.backend.as_mut() {
            backend.resize(width, height);
        }
    }

    pub fn render(&mut self, frame: &FrameDescription) -> Result<(), RenderError> {
        self.backend_mut()?.render(frame)
    }

    /// Release geometry, then materials, then the context. Returns whether
    /// anything was released.
    pub fn dispose(&mut self) -> bool {
        let Some(mut backend) = self.backend.take() else {
            return false;
        };

        for handle in self.meshes.drain(..) {
            backend.release_mesh(handle);
        }
        for handle in self.points.drain(..) {
            backend.release_points(handle);
        }
        for handle in self.materials.drain(..) {
            backend.release_material(handle);
        }
        backend.release_context();
        log::debug!("Scene resources disposed");
        true
    }
}

impl<B: GraphicsBackend> Drop for SceneResources<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_gates() {
        let ok = SceneSupport { has_graphics: true, reduced_motion: false, viewport_width: 1024.0 };
        assert!(ok.check(680.0).is_ok());

        let narrow = SceneSupport { viewport_width: 600.0, ..ok };
        assert!(matches!(narrow.check(680.0), Err(SceneUnavailable::NarrowViewport { .. })));

        let calm = SceneSupport { reduced_motion: true, ..ok };
        assert_eq!(calm.check(680.0), Err(SceneUnavailable::ReducedMotion));

        let bare = SceneSupport { has_graphics: false, ..ok };
        assert_eq!(bare.check(680.0), Err(SceneUnavailable::NoGraphics));
    }

    #[test]
    fn test_viewport_fit() {
        let viewport = Viewport::fit(900.0, 200.0, 320.0, 3.0, 2.2);
        assert_eq!(viewport.height, 320.0);
        assert_eq!(viewport.pixel_ratio, 2.2);
        assert_eq!(viewport.physical_size(), (1980, 704));
    }
}
