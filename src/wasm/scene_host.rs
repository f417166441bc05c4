//! Drives a scene engine from `requestAnimationFrame` and owns its DOM
//! listeners, so disposal can tear all of it down in one place.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{EventTarget, HtmlCanvasElement};

use crate::ambient::AmbientScene;
use crate::engine::Viewport;
use crate::gpu::renderer::WgpuBackend;
use crate::gpu::RenderError;
use crate::viewer::DetailViewer;

/// What the host needs from a scene engine.
pub trait HostedScene {
    /// `now` is in seconds.
    fn frame(&mut self, now: f64) -> Result<(), RenderError>;

    fn resize(&mut self, viewport: Viewport);

    fn dispose(&mut self) -> bool;
}

impl HostedScene for AmbientScene<WgpuBackend> {
    fn frame(&mut self, now: f64) -> Result<(), RenderError> {
        AmbientScene::frame(self, now)
    }

    fn resize(&mut self, viewport: Viewport) {
        AmbientScene::resize(self, viewport)
    }

    fn dispose(&mut self) -> bool {
        AmbientScene::dispose(self)
    }
}

impl HostedScene for DetailViewer<WgpuBackend> {
    fn frame(&mut self, now: f64) -> Result<(), RenderError> {
        DetailViewer::frame(self, now)
    }

    fn resize(&mut self, viewport: Viewport) {
        DetailViewer::resize(self, viewport)
    }

    fn dispose(&mut self) -> bool {
        DetailViewer::dispose(self)
    }
}

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

struct Listener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

pub struct SceneHost<S: HostedScene + 'static> {
    scene: Rc<RefCell<S>>,
    canvas: HtmlCanvasElement,
    frame_callback: FrameCallback,
    frame_id: Rc<Cell<Option<i32>>>,
    listeners: RefCell<Vec<Listener>>,
    start: f64,
    disposed: Cell<bool>,
}

fn request_frame(callback: &FrameCallback) -> Option<i32> {
    let window = web_sys::window()?;
    let callback = callback.borrow();
    let closure = callback.as_ref()?;
    window
        .request_animation_frame(closure.as_ref().unchecked_ref())
        .ok()
}

/// Size a viewport from the canvas's layout box.
pub fn canvas_viewport(canvas: &HtmlCanvasElement, min_height: f64, max_ratio: f64) -> Viewport {
    let ratio = web_sys::window().map(|w| w.device_pixel_ratio()).unwrap_or(1.0);
    let viewport = Viewport::fit(
        canvas.client_width() as f64,
        canvas.client_height() as f64,
        min_height,
        ratio,
        max_ratio,
    );
    let (width, height) = viewport.physical_size();
    canvas.set_width(width);
    canvas.set_height(height);
    viewport
}

impl<S: HostedScene + 'static> SceneHost<S> {
    pub fn new(scene: S, canvas: HtmlCanvasElement, start: f64) -> Rc<Self> {
        Rc::new(Self {
            scene: Rc::new(RefCell::new(scene)),
            canvas,
            frame_callback: Rc::new(RefCell::new(None)),
            frame_id: Rc::new(Cell::new(None)),
            listeners: RefCell::new(Vec::new()),
            start,
            disposed: Cell::new(false),
        })
    }

    pub fn scene(&self) -> Rc<RefCell<S>> {
        self.scene.clone()
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Start the frame loop. Each frame receives seconds since `start`.
    pub fn run(&self) {
        let scene = self.scene.clone();
        let callback = self.frame_callback.clone();
        let frame_id = self.frame_id.clone();
        let start = self.start;

        *self.frame_callback.borrow_mut() = Some(Closure::new(move |timestamp: f64| {
            let elapsed = (timestamp / 1000.0 - start).max(0.0);
            if let Err(e) = scene.borrow_mut().frame(elapsed) {
                log::warn!("Scene frame failed, stopping loop: {}", e);
                frame_id.set(None);
                return;
            }
            frame_id.set(request_frame(&callback));
        }));

        self.frame_id.set(request_frame(&self.frame_callback));
    }

    /// Attach a DOM listener that lives until disposal.
    pub fn listen(&self, target: &EventTarget, event: &'static str, handler: impl FnMut(web_sys::Event) + 'static) {
        let callback = Closure::<dyn FnMut(web_sys::Event)>::new(handler);
        if let Err(e) = target.add_event_listener_with_callback(event, callback.as_ref().unchecked_ref()) {
            log::warn!("Could not listen for {}: {:?}", event, e);
            return;
        }
        self.listeners.borrow_mut().push(Listener {
            target: target.clone(),
            event,
            callback,
        });
    }

    /// Stop the loop, detach listeners, then release the scene. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        if let (Some(window), Some(id)) = (web_sys::window(), self.frame_id.take()) {
            let _ = window.cancel_animation_frame(id);
        }
        self.frame_callback.borrow_mut().take();

        for listener in self.listeners.borrow_mut().drain(..) {
            let _ = listener
                .target
                .remove_event_listener_with_callback(listener.event, listener.callback.as_ref().unchecked_ref());
        }

        self.scene.borrow_mut().dispose();
    }
}
