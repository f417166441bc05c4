//! Damped orbit controls for the detail viewer.
//!
//! The camera sits on a sphere around a fixed target. Dragging and
//! auto-rotation add angular velocity, which is bled off by the damping
//! factor every update; the wheel scales the radius. Panning is not
//! supported.

use std::f32::consts::PI;

use glam::Vec3;

use crate::camera::PerspectiveCamera;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitSettings {
    pub damping: f32,
    pub auto_rotate: bool,
    /// 1.0 is one revolution per minute.
    pub auto_rotate_speed: f32,
    pub rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Radius factor per wheel notch.
    pub zoom_step: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            damping: 0.05,
            auto_rotate: true,
            auto_rotate_speed: 0.8,
            rotate_speed: 1.0,
            min_distance: 2.0,
            max_distance: 5.0,
            zoom_step: 0.95,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrbitControls {
    settings: OrbitSettings,
    target: Vec3,
    radius: f32,
    /// Azimuth around +Y, measured from +Z.
    theta: f32,
    /// Polar angle from +Y.
    phi: f32,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    drag_from: Option<(f64, f64)>,
}

impl OrbitControls {
    /// Start from the camera's current position relative to `target`.
    pub fn new(camera: &PerspectiveCamera, target: Vec3, settings: OrbitSettings) -> Self {
        let offset = camera.position - target;
        let radius = offset.length().max(EPS);
        let theta = offset.x.atan2(offset.z);
        let phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        Self {
            settings,
            target,
            radius,
            theta,
            phi,
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            drag_from: None,
        }
    }

    pub fn settings(&self) -> &OrbitSettings {
        &self.settings
    }

    pub fn distance(&self) -> f32 {
        self.radius
    }

    pub fn azimuth(&self) -> f32 {
        self.theta
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_from.is_some()
    }

    /// Angular speed of auto-rotation in radians per second.
    pub fn auto_rotate_rate(&self) -> f32 {
        2.0 * PI / 60.0 * self.settings.auto_rotate_speed
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.drag_from = Some((x, y));
    }

    /// Drag by client pixels. `element_height` scales a full-height drag to
    /// one revolution.
    pub fn pointer_move(&mut self, x: f64, y: f64, element_height: f64) {
        let Some((from_x, from_y)) = self.drag_from else {
            return;
        };
        self.drag_from = Some((x, y));
        if element_height <= 0.0 {
            return;
        }

        let dx = (x - from_x) as f32;
        let dy = (y - from_y) as f32;
        let per_pixel = 2.0 * PI * self.settings.rotate_speed / element_height as f32;
        self.delta_theta -= dx * per_pixel;
        self.delta_phi -= dy * per_pixel;
    }

    pub fn pointer_up(&mut self) {
        self.drag_from = None;
    }

    /// Positive `delta_y` (scrolling down) moves the camera away.
    pub fn wheel(&mut self, delta_y: f64) {
        if delta_y > 0.0 {
            self.scale /= self.settings.zoom_step;
        } else if delta_y < 0.0 {
            self.scale *= self.settings.zoom_step;
        }
    }

    /// Apply pending motion over `dt` seconds and place the camera.
    pub fn update(&mut self, camera: &mut PerspectiveCamera, dt: f32) {
        if self.settings.auto_rotate && !self.is_dragging() {
            self.delta_theta -= self.auto_rotate_rate() * dt;
        }

        let damping = self.settings.damping;
        self.theta += self.delta_theta * damping;
        self.phi += self.delta_phi * damping;
        self.phi = self.phi.clamp(EPS, PI - EPS);

        self.radius = (self.radius * self.scale).clamp(self.settings.min_distance, self.settings.max_distance);
        self.scale = 1.0;

        self.delta_theta *= 1.0 - damping;
        self.delta_phi *= 1.0 - damping;

        let sin_phi = self.phi.sin();
        let offset = Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        );
        camera.position = self.target + offset;
        camera.target = self.target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer_camera() -> PerspectiveCamera {
        PerspectiveCamera::new(45.0, 0.1, 50.0, Vec3::new(0.0, 1.2, 3.2)).look_at(Vec3::ZERO)
    }

    #[test]
    fn test_starts_from_camera_position() {
        let camera = viewer_camera();
        let controls = OrbitControls::new(&camera, Vec3::ZERO, OrbitSettings::default());
        assert!((controls.distance() - camera.position.length()).abs() < 1e-5);
        assert!(controls.azimuth().abs() < 1e-6);
    }

    #[test]
    fn test_distance_clamped() {
        let mut camera = viewer_camera();
        let mut controls = OrbitControls::new(&camera, Vec3::ZERO, OrbitSettings::default());

        for _ in 0..100 {
            controls.wheel(1.0);
            controls.update(&mut camera, 0.016);
        }
        assert!((controls.distance() - 5.0).abs() < 1e-5);

        for _ in 0..100 {
            controls.wheel(-1.0);
            controls.update(&mut camera, 0.016);
        }
        assert!((controls.distance() - 2.0).abs() < 1e-5);
        assert!((camera.position.length() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_auto_rotate_advances_azimuth() {
        let mut camera = viewer_camera();
        let mut controls = OrbitControls::new(&camera, Vec3::ZERO, OrbitSettings::default());
        let start = controls.azimuth();
        for _ in 0..60 {
            controls.update(&mut camera, 1.0 / 60.0);
        }
        assert!(controls.azimuth() < start);
        assert!((controls.auto_rotate_rate() - 2.0 * PI / 60.0 * 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_drag_without_press_is_ignored() {
        let mut camera = viewer_camera();
        let settings = OrbitSettings { auto_rotate: false, ..Default::default() };
        let mut controls = OrbitControls::new(&camera, Vec3::ZERO, settings);

        controls.pointer_move(100.0, 0.0, 400.0);
        controls.update(&mut camera, 0.016);
        assert!(controls.azimuth().abs() < 1e-6);

        controls.pointer_down(0.0, 0.0);
        controls.pointer_move(100.0, 0.0, 400.0);
        controls.pointer_up();
        controls.update(&mut camera, 0.016);
        assert!(controls.azimuth() < 0.0);
    }
}
