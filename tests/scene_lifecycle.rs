//! Scene engine lifecycle against a recording backend.
//!
//! Run with: cargo test --test scene_lifecycle

use std::cell::RefCell;
use std::rc::Rc;

use moodmusic::ambient::{AmbientScene, PointerArea, SHAPE_COUNT};
use moodmusic::config::SceneConfig;
use moodmusic::engine::{SceneSupport, SceneUnavailable, Viewport};
use moodmusic::gpu::mesh::{MeshData, PointVertex};
use moodmusic::gpu::{
    FrameDescription, GraphicsBackend, MaterialHandle, MeshHandle, PointsHandle, RenderError,
};
use moodmusic::material::StandardMaterial;
use moodmusic::mesh_asset::MeshAsset;
use moodmusic::viewer::DetailViewer;

#[derive(Debug, Default)]
struct Ledger {
    next: u32,
    meshes: u32,
    points: u32,
    materials: u32,
    released_meshes: u32,
    released_points: u32,
    released_materials: u32,
    contexts_released: u32,
    frames: u32,
    last_size: (u32, u32),
    last_frame_meshes: usize,
}

/// Counts every call; the ledger outlives the backend so tests can inspect it
/// after disposal.
struct RecordingBackend {
    ledger: Rc<RefCell<Ledger>>,
}

impl RecordingBackend {
    fn new() -> (Self, Rc<RefCell<Ledger>>) {
        let ledger = Rc::new(RefCell::new(Ledger::default()));
        (Self { ledger: ledger.clone() }, ledger)
    }

    fn issue(&self) -> u32 {
        let mut ledger = self.ledger.borrow_mut();
        ledger.next += 1;
        ledger.next
    }
}

impl GraphicsBackend for RecordingBackend {
    fn upload_mesh(&mut self, _mesh: &MeshData) -> Result<MeshHandle, RenderError> {
        let id = self.issue();
        self.ledger.borrow_mut().meshes += 1;
        Ok(MeshHandle(id))
    }

    fn upload_points(&mut self, _points: &[PointVertex]) -> Result<PointsHandle, RenderError> {
        let id = self.issue();
        self.ledger.borrow_mut().points += 1;
        Ok(PointsHandle(id))
    }

    fn create_material(&mut self, _material: &StandardMaterial) -> Result<MaterialHandle, RenderError> {
        let id = self.issue();
        self.ledger.borrow_mut().materials += 1;
        Ok(MaterialHandle(id))
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.ledger.borrow_mut().last_size = (width, height);
    }

    fn render(&mut self, frame: &FrameDescription) -> Result<(), RenderError> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.frames += 1;
        ledger.last_frame_meshes = frame.meshes.len();
        Ok(())
    }

    fn release_mesh(&mut self, _handle: MeshHandle) {
        self.ledger.borrow_mut().released_meshes += 1;
    }

    fn release_points(&mut self, _handle: PointsHandle) {
        self.ledger.borrow_mut().released_points += 1;
    }

    fn release_material(&mut self, _handle: MaterialHandle) {
        self.ledger.borrow_mut().released_materials += 1;
    }

    fn release_context(&mut self) {
        self.ledger.borrow_mut().contexts_released += 1;
    }
}

fn desktop() -> SceneSupport {
    SceneSupport {
        has_graphics: true,
        reduced_motion: false,
        viewport_width: 1280.0,
    }
}

fn viewport() -> Viewport {
    Viewport::fit(960.0, 540.0, 320.0, 2.0, 2.2)
}

fn seeded() -> SceneConfig {
    SceneConfig {
        seed: Some(7),
        ..SceneConfig::default()
    }
}

const TRIANGLE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

#[test]
fn test_ambient_builds_full_scene() {
    let (backend, ledger) = RecordingBackend::new();
    let scene = AmbientScene::new(&desktop(), backend, viewport(), &seeded()).unwrap();

    assert_eq!(scene.shapes().len(), SHAPE_COUNT);
    let ledger = ledger.borrow();
    assert_eq!(ledger.meshes, 3);
    assert_eq!(ledger.materials, SHAPE_COUNT as u32);
    assert_eq!(ledger.points, 1);
    assert_eq!(ledger.last_size, (1920, 1080));
}

#[test]
fn test_ambient_declines_narrow_viewport() {
    let (backend, ledger) = RecordingBackend::new();
    let support = SceneSupport {
        viewport_width: 600.0,
        ..desktop()
    };

    let result = AmbientScene::new(&support, backend, viewport(), &seeded());
    assert!(matches!(result, Err(SceneUnavailable::NarrowViewport { .. })));
    assert_eq!(ledger.borrow().meshes, 0);
}

#[test]
fn test_ambient_declines_reduced_motion() {
    let (backend, _ledger) = RecordingBackend::new();
    let support = SceneSupport {
        reduced_motion: true,
        ..desktop()
    };

    let result = AmbientScene::new(&support, backend, viewport(), &seeded());
    assert_eq!(result.err(), Some(SceneUnavailable::ReducedMotion));
}

#[test]
fn test_ambient_dispose_releases_once() {
    let (backend, ledger) = RecordingBackend::new();
    let mut scene = AmbientScene::new(&desktop(), backend, viewport(), &seeded()).unwrap();

    scene.frame(0.016).unwrap();
    assert!(scene.dispose());
    assert!(!scene.dispose());
    assert!(scene.is_disposed());

    let ledger = ledger.borrow();
    assert_eq!(ledger.released_meshes, 3);
    assert_eq!(ledger.released_points, 1);
    assert_eq!(ledger.released_materials, SHAPE_COUNT as u32);
    assert_eq!(ledger.contexts_released, 1);
}

#[test]
fn test_ambient_frames_stop_after_dispose() {
    let (backend, ledger) = RecordingBackend::new();
    let mut scene = AmbientScene::new(&desktop(), backend, viewport(), &seeded()).unwrap();

    scene.frame(0.5).unwrap();
    assert_eq!(ledger.borrow().last_frame_meshes, SHAPE_COUNT);

    scene.dispose();
    scene.frame(1.0).unwrap();
    assert_eq!(ledger.borrow().frames, 1);
}

#[test]
fn test_ambient_pointer_tilts_group() {
    let (backend, _ledger) = RecordingBackend::new();
    let mut scene = AmbientScene::new(&desktop(), backend, viewport(), &seeded()).unwrap();
    let area = PointerArea {
        left: 0.0,
        top: 0.0,
        width: 960.0,
        height: 540.0,
    };

    scene.pointer_move(960.0, 0.0, &area);
    for _ in 0..120 {
        scene.animate(0.0);
    }

    let (yaw, pitch) = scene.group_rotation();
    assert!(yaw > 0.3, "yaw {}", yaw);
    assert!(pitch > 0.1, "pitch {}", pitch);
}

#[test]
fn test_same_seed_same_layout() {
    let (a, _) = RecordingBackend::new();
    let (b, _) = RecordingBackend::new();
    let first = AmbientScene::new(&desktop(), a, viewport(), &seeded()).unwrap();
    let second = AmbientScene::new(&desktop(), b, viewport(), &seeded()).unwrap();

    assert_eq!(first.shapes(), second.shapes());
}

#[test]
fn test_viewer_opens_on_narrow_viewport() {
    let (backend, _ledger) = RecordingBackend::new();
    let support = SceneSupport {
        viewport_width: 360.0,
        reduced_motion: true,
        ..desktop()
    };

    assert!(DetailViewer::new(&support, backend, viewport()).is_ok());
}

#[test]
fn test_viewer_needs_graphics() {
    let (backend, _ledger) = RecordingBackend::new();
    let support = SceneSupport {
        has_graphics: false,
        ..desktop()
    };

    let result = DetailViewer::new(&support, backend, viewport());
    assert_eq!(result.err(), Some(SceneUnavailable::NoGraphics));
}

#[test]
fn test_viewer_model_lifecycle() {
    let (backend, ledger) = RecordingBackend::new();
    let mut viewer = DetailViewer::new(&desktop(), backend, viewport()).unwrap();
    let asset = MeshAsset::from_obj("triangle.obj", TRIANGLE_OBJ).unwrap();

    viewer.frame(0.0).unwrap();
    assert_eq!(ledger.borrow().last_frame_meshes, 0);

    viewer.set_model(&asset).unwrap();
    assert!(viewer.has_model());
    viewer.frame(0.016).unwrap();
    assert_eq!(ledger.borrow().last_frame_meshes, 1);

    assert!(viewer.dispose());
    assert!(!viewer.dispose());
    {
        let ledger = ledger.borrow();
        assert_eq!(ledger.released_meshes, 1);
        assert_eq!(ledger.released_materials, 1);
        assert_eq!(ledger.contexts_released, 1);
    }

    assert_eq!(viewer.set_model(&asset), Err(RenderError::Released));
    assert!(!viewer.has_model());
}

#[test]
fn test_viewer_replacing_model_releases_previous() {
    let (backend, ledger) = RecordingBackend::new();
    let mut viewer = DetailViewer::new(&desktop(), backend, viewport()).unwrap();
    let asset = MeshAsset::from_obj("triangle.obj", TRIANGLE_OBJ).unwrap();

    for _ in 0..5 {
        viewer.set_model(&asset).unwrap();
    }
    viewer.frame(0.0).unwrap();
    {
        let ledger = ledger.borrow();
        assert_eq!(ledger.meshes, 5);
        assert_eq!(ledger.released_meshes, 4);
        assert_eq!(ledger.released_materials, 4);
        assert_eq!(ledger.last_frame_meshes, 1);
    }

    viewer.dispose();
    let ledger = ledger.borrow();
    assert_eq!(ledger.released_meshes, 5);
    assert_eq!(ledger.released_materials, 5);
}

#[test]
fn test_viewer_auto_rotates() {
    let (backend, _ledger) = RecordingBackend::new();
    let mut viewer = DetailViewer::new(&desktop(), backend, viewport()).unwrap();

    let before = viewer.controls().azimuth();
    for frame in 0..60 {
        viewer.frame(frame as f64 / 60.0).unwrap();
    }
    assert!((viewer.controls().azimuth() - before).abs() > 0.01);
}
