//! Perspective camera.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
    pub position: Vec3,
    /// Point the camera looks at.
    pub target: Vec3,
    pub up: Vec3,
}

impl PerspectiveCamera {
    /// A camera at `position` looking down -Z.
    pub fn new(fov: f32, near: f32, far: f32, position: Vec3) -> Self {
        Self {
            fov,
            near,
            far,
            aspect: 1.0,
            position,
            target: position + Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }

    pub fn look_at(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn to_uniforms(&self) -> CameraUniforms {
        let view = self.view_matrix();
        let projection = self.projection_matrix();
        CameraUniforms {
            view_proj: (projection * view).to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            position: [self.position.x, self.position.y, self.position.z, 1.0],
        }
    }
}

/// GPU-ready camera data. 208 bytes.
///
/// View and projection are also kept apart so point billboards can be
/// expanded in view space.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub position: [f32; 4],
}

impl CameraUniforms {
    pub fn view_projection_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = PerspectiveCamera::new(34.0, 0.1, 60.0, Vec3::new(0.0, 0.2, 9.2));
        let clip = camera.to_uniforms().view_projection_matrix()
            * glam::Vec4::new(0.0, 0.2, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn test_aspect_ignores_empty_size() {
        let mut camera = PerspectiveCamera::new(45.0, 0.1, 50.0, Vec3::ZERO);
        camera.set_aspect(800.0, 400.0);
        assert_eq!(camera.aspect, 2.0);
        camera.set_aspect(800.0, 0.0);
        assert_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn test_uniforms_size() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 208);
    }
}
