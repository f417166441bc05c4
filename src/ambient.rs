//! Ambient backdrop: slowly tumbling glowing shapes over a drifting point
//! field, tilted toward the pointer.
//!
//! The engine is independent of the workflow. It is built once when the page
//! loads, advanced by the host once per animation frame with the elapsed time,
//! and torn down with [`AmbientScene::dispose`].

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::camera::PerspectiveCamera;
use crate::config::SceneConfig;
use crate::engine::{describe_frame, SceneResources, SceneSupport, SceneUnavailable, Viewport};
use crate::geometry;
use crate::gpu::{GraphicsBackend, RenderError};
use crate::lighting::{AmbientLight, Fog, Lighting, PointLight};
use crate::material::{Color, StandardMaterial};
use crate::point_field::{self, PointFieldConfig, SceneRng};
use crate::scene_graph::{self, EntityId, MeshInstance, PointCloud, SceneEntity, SceneGraph, Transform};

pub const SHAPE_COUNT: usize = 12;
pub const PALETTE: [u32; 4] = [0x8c7cff, 0x31d2ff, 0xff6d6d, 0x4be3c1];
const FOG_COLOR: u32 = 0x07071d;
const TILT_LERP: f32 = 0.06;
const BOB_AMPLITUDE: f32 = 0.38;
const POINTS_SPIN: f32 = 0.0009;

/// Per-shape animation parameters, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMotion {
    pub entity: EntityId,
    pub spin: f32,
    pub wobble: f32,
    pub phase: f32,
    pub base_y: f32,
}

/// Pointer position inside the scene container, in client pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerArea {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Target tilt for a pointer at client position `(x, y)`.
pub fn tilt_for_pointer(x: f64, y: f64, area: &PointerArea) -> Vec2 {
    if area.width <= 0.0 || area.height <= 0.0 {
        return Vec2::ZERO;
    }
    let nx = ((x - area.left) / area.width).clamp(0.0, 1.0) as f32;
    let ny = ((y - area.top) / area.height).clamp(0.0, 1.0) as f32;
    Vec2::new((nx - 0.5) * 0.8, (0.5 - ny) * 0.45)
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

pub struct AmbientScene<B: GraphicsBackend> {
    scene: SceneGraph,
    group: EntityId,
    shapes: Vec<ShapeMotion>,
    points: EntityId,
    camera: PerspectiveCamera,
    lighting: Lighting,
    target_tilt: Vec2,
    viewport: Viewport,
    resources: SceneResources<B>,
}

impl<B: GraphicsBackend> AmbientScene<B> {
    pub fn new(
        support: &SceneSupport,
        backend: B,
        viewport: Viewport,
        config: &SceneConfig,
    ) -> Result<Self, SceneUnavailable> {
        support.check(config.min_viewport_width)?;

        let mut resources = SceneResources::new(backend);
        let mut scene = SceneGraph::new();
        let mut rng = SceneRng::new(config.seed.unwrap_or(0));

        let group = scene.create_group(None);
        let shapes = Self::create_shapes(&mut scene, &mut resources, &mut rng, group)?;
        let points = Self::create_points(&mut scene, &mut resources, &mut rng)?;

        let mut ambient = Self {
            scene,
            group,
            shapes,
            points,
            camera: PerspectiveCamera::new(34.0, 0.1, 60.0, Vec3::new(0.0, 0.2, 9.2)),
            lighting: Self::lights(),
            target_tilt: Vec2::ZERO,
            viewport,
            resources,
        };
        ambient.resize(viewport);

        log::info!(
            "Ambient scene ready: {} shapes, {} entities",
            ambient.shapes.len(),
            ambient.scene.len()
        );
        Ok(ambient)
    }

    fn create_shapes(
        scene: &mut SceneGraph,
        resources: &mut SceneResources<B>,
        rng: &mut SceneRng,
        group: EntityId,
    ) -> Result<Vec<ShapeMotion>, RenderError> {
        let meshes = [
            resources.upload_mesh(&geometry::icosahedron(1.1))?,
            resources.upload_mesh(&geometry::octahedron(1.05))?,
            resources.upload_mesh(&geometry::torus_knot(0.8, 0.26, 64, 8))?,
        ];

        let mut shapes = Vec::with_capacity(SHAPE_COUNT);
        for index in 0..SHAPE_COUNT {
            let color = Color::from_hex(PALETTE[index % PALETTE.len()]);
            let material = resources.create_material(&StandardMaterial::glowing(color, 0.3, 0.3, 0.3))?;

            let position = scene_graph::Vec3::new(
                rng.range(-5.0..5.0),
                rng.range(-2.1..2.1),
                rng.range(-1.5..4.5),
            );
            let rotation = scene_graph::Vec3::new(rng.range(0.0..PI), rng.range(0.0..PI), rng.range(0.0..PI));
            let scale = scene_graph::Vec3::splat(rng.range(0.4..1.2));

            let entity = scene.insert(
                SceneEntity::Mesh(MeshInstance {
                    mesh: meshes[index % meshes.len()],
                    material,
                    transform: Transform { position, rotation, scale },
                    visible: true,
                }),
                Some(group),
            );

            shapes.push(ShapeMotion {
                entity,
                spin: rng.range(0.15..0.35),
                wobble: rng.range(0.2..0.45),
                phase: rng.range(0.0..PI * 2.0),
                base_y: position.y,
            });
        }
        Ok(shapes)
    }

    fn create_points(
        scene: &mut SceneGraph,
        resources: &mut SceneResources<B>,
        rng: &mut SceneRng,
    ) -> Result<EntityId, RenderError> {
        let config = PointFieldConfig::default();
        let handle = resources.upload_points(&point_field::scatter(&config, rng))?;

        Ok(scene.insert(
            SceneEntity::Points(PointCloud {
                points: handle,
                size: config.size,
                opacity: config.opacity,
                additive: true,
                transform: Transform::default(),
                visible: true,
            }),
            None,
        ))
    }

    fn lights() -> Lighting {
        let point = |hex, intensity, distance, decay, position| PointLight {
            color: Color::from_hex(hex),
            intensity,
            distance,
            decay,
            position,
        };

        Lighting {
            ambient: Some(AmbientLight {
                color: Color::from_hex(0x8888ff),
                intensity: 0.6,
            }),
            hemisphere: None,
            points: vec![
                point(0x8c7cff, 12.0, 14.0, 1.6, Vec3::new(-4.5, 2.5, 4.5)),
                point(0x31d2ff, 8.0, 16.0, 1.4, Vec3::new(5.0, -1.4, 5.8)),
                point(0xff6d6d, 6.0, 18.0, 1.6, Vec3::new(0.0, 3.6, -3.6)),
            ],
            fog: Some(Fog {
                color: Color::from_hex(FOG_COLOR),
                density: 0.08,
            }),
        }
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn shapes(&self) -> &[ShapeMotion] {
        &self.shapes
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn target_tilt(&self) -> Vec2 {
        self.target_tilt
    }

    pub fn is_disposed(&self) -> bool {
        self.resources.is_disposed()
    }

    pub fn backend(&self) -> Option<&B> {
        self.resources.backend()
    }

    /// Current yaw/pitch of the shape group.
    pub fn group_rotation(&self) -> (f32, f32) {
        self.scene
            .get(self.group)
            .map(|g| (g.transform().rotation.y, g.transform().rotation.x))
            .unwrap_or_default()
    }

    pub fn points_opacity(&self) -> f32 {
        match self.scene.get(self.points) {
            Some(SceneEntity::Points(cloud)) => cloud.opacity,
            _ => 0.0,
        }
    }

    pub fn pointer_move(&mut self, x: f64, y: f64, area: &PointerArea) {
        self.target_tilt = tilt_for_pointer(x, y, area);
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.camera.set_aspect(viewport.width as f32, viewport.height as f32);
        self.resources.resize(&viewport);
    }

    /// Advance every transform to `elapsed` seconds since start.
    pub fn animate(&mut self, elapsed: f64) {
        let t = elapsed as f32;

        if let Some(group) = self.scene.transform_mut(self.group) {
            group.rotation.y = lerp(group.rotation.y, self.target_tilt.x + t * 0.12, TILT_LERP);
            group.rotation.x = lerp(group.rotation.x, self.target_tilt.y + (t * 0.45).sin() * 0.22, TILT_LERP);
        }

        for (index, shape) in self.shapes.iter().enumerate() {
            if let Some(transform) = self.scene.transform_mut(shape.entity) {
                transform.rotation.x += 0.004 + shape.spin * 0.006;
                transform.rotation.y -= 0.003 + (index % 5) as f32 * 0.001;
                transform.position.y = shape.base_y + (t * shape.wobble + shape.phase).sin() * BOB_AMPLITUDE;
            }
        }

        if let Some(SceneEntity::Points(cloud)) = self.scene.get_mut(self.points) {
            cloud.transform.rotation.y += POINTS_SPIN;
            cloud.opacity = 0.65 + (t * 0.45).sin() * 0.1;
        }
    }

    /// Animate and draw one frame. A disposed scene does nothing.
    pub fn frame(&mut self, elapsed: f64) -> Result<(), RenderError> {
        if self.resources.is_disposed() {
            return Ok(());
        }
        self.animate(elapsed);
        let frame = describe_frame(&self.scene, &self.camera, &self.lighting, [0.0, 0.0, 0.0, 0.0]);
        self.resources.render(&frame)
    }

    /// Release every geometry and material, then the context. Idempotent.
    pub fn dispose(&mut self) -> bool {
        let released = self.resources.dispose();
        if released {
            self.scene.clear();
            self.shapes.clear();
            log::info!("Ambient scene disposed");
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tilt_from_pointer() {
        let area = PointerArea { left: 100.0, top: 50.0, width: 200.0, height: 100.0 };
        let centre = tilt_for_pointer(200.0, 100.0, &area);
        assert!(centre.length() < 1e-6);

        let corner = tilt_for_pointer(100.0, 50.0, &area);
        assert!((corner.x + 0.4).abs() < 1e-6);
        assert!((corner.y - 0.225).abs() < 1e-6);

        // Outside the container clamps to the edge
        let outside = tilt_for_pointer(1000.0, 1000.0, &area);
        assert!((outside.x - 0.4).abs() < 1e-6);
        assert!((outside.y + 0.225).abs() < 1e-6);
    }

    #[test]
    fn test_tilt_empty_area() {
        let area = PointerArea { left: 0.0, top: 0.0, width: 0.0, height: 0.0 };
        assert_eq!(tilt_for_pointer(5.0, 5.0, &area), Vec2::ZERO);
    }
}
