//! Detail viewer: one external model under a hemisphere light, turned by
//! damped orbit controls.
//!
//! The model arrives asynchronously. Until then the viewer renders an empty
//! scene; a model delivered after disposal is dropped.

use std::f32::consts::PI;

use glam::Vec3;

use crate::camera::PerspectiveCamera;
use crate::engine::{describe_frame, SceneResources, SceneSupport, SceneUnavailable, Viewport};
use crate::gpu::{GraphicsBackend, RenderError};
use crate::lighting::{HemisphereLight, Lighting};
use crate::material::{Color, StandardMaterial};
use crate::mesh_asset::MeshAsset;
use crate::orbit::{OrbitControls, OrbitSettings};
use crate::scene_graph::{self, EntityId, MeshInstance, SceneEntity, SceneGraph, Transform};

/// Longest frame step fed to the controls, so a backgrounded tab does not
/// spin the model on return.
const MAX_STEP: f64 = 0.1;

pub struct DetailViewer<B: GraphicsBackend> {
    scene: SceneGraph,
    camera: PerspectiveCamera,
    lighting: Lighting,
    controls: OrbitControls,
    model: Option<EntityId>,
    last_frame: Option<f64>,
    viewport: Viewport,
    resources: SceneResources<B>,
}

impl<B: GraphicsBackend> DetailViewer<B> {
    /// Only a missing graphics runtime declines; the viewer is opened on
    /// demand, so narrow viewports and reduced motion still get it.
    pub fn new(support: &SceneSupport, backend: B, viewport: Viewport) -> Result<Self, SceneUnavailable> {
        if !support.has_graphics {
            return Err(SceneUnavailable::NoGraphics);
        }

        let camera = PerspectiveCamera::new(45.0, 0.1, 50.0, Vec3::new(0.0, 1.2, 3.2)).look_at(Vec3::ZERO);
        let controls = OrbitControls::new(&camera, Vec3::ZERO, OrbitSettings::default());

        let lighting = Lighting {
            hemisphere: Some(HemisphereLight {
                sky: Color::from_hex(0xffffff),
                ground: Color::from_hex(0x444444),
                intensity: 1.2,
            }),
            ..Default::default()
        };

        let mut viewer = Self {
            scene: SceneGraph::new(),
            camera,
            lighting,
            controls,
            model: None,
            last_frame: None,
            viewport,
            resources: SceneResources::new(backend),
        };
        viewer.resize(viewport);
        Ok(viewer)
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.resources.is_disposed()
    }

    pub fn backend(&self) -> Option<&B> {
        self.resources.backend()
    }

    /// Insert a loaded asset, turned half a revolution to face the camera.
    /// Replaces any previous model and releases its mesh and material.
    pub fn set_model(&mut self, asset: &MeshAsset) -> Result<(), RenderError> {
        if self.resources.is_disposed() {
            log::debug!("Viewer disposed, dropping asset {}", asset.name);
            return Err(RenderError::Released);
        }

        let mesh = self.resources.upload_mesh(&asset.mesh)?;
        let material = self.resources.create_material(&StandardMaterial {
            metalness: 0.1,
            roughness: 0.6,
            ..Default::default()
        })?;

        if let Some(previous) = self.model.take() {
            if let Some(SceneEntity::Mesh(old)) = self.scene.get(previous) {
                let (old_mesh, old_material) = (old.mesh, old.material);
                self.resources.release_mesh(old_mesh);
                self.resources.release_material(old_material);
            }
            self.scene.destroy(previous);
        }

        let transform = Transform {
            rotation: scene_graph::Vec3::new(0.0, PI, 0.0),
            ..Default::default()
        };
        self.model = Some(self.scene.insert(
            SceneEntity::Mesh(MeshInstance {
                mesh,
                material,
                transform,
                visible: true,
            }),
            None,
        ));

        log::info!("Viewer model '{}': {} triangles", asset.name, asset.triangle_count());
        Ok(())
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.camera.set_aspect(viewport.width as f32, viewport.height as f32);
        self.resources.resize(&viewport);
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.controls.pointer_down(x, y);
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) {
        self.controls.pointer_move(x, y, self.viewport.height);
    }

    pub fn pointer_up(&mut self) {
        self.controls.pointer_up();
    }

    pub fn wheel(&mut self, delta_y: f64) {
        self.controls.wheel(delta_y);
    }

    /// Update the controls and draw. `now` is in seconds.
    pub fn frame(&mut self, now: f64) -> Result<(), RenderError> {
        if self.resources.is_disposed() {
            return Ok(());
        }

        let dt = match self.last_frame {
            Some(last) => (now - last).clamp(0.0, MAX_STEP),
            None => 0.0,
        };
        self.last_frame = Some(now);

        self.controls.update(&mut self.camera, dt as f32);
        let frame = describe_frame(&self.scene, &self.camera, &self.lighting, [0.0, 0.0, 0.0, 0.0]);
        self.resources.render(&frame)
    }

    /// Release the model, its material and the context. Idempotent.
    pub fn dispose(&mut self) -> bool {
        let released = self.resources.dispose();
        if released {
            self.scene.clear();
            self.model = None;
            log::info!("Detail viewer disposed");
        }
        released
    }
}
