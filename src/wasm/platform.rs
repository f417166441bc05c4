//! Browser implementations of the platform traits: camera, share sheet,
//! clipboard and file reading.

use js_sys::{Array, Function, Object, Promise, Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlVideoElement};

use crate::capture::RgbaFrame;
use crate::error::CameraError;
use crate::media::{CameraConstraints, MediaDevices, MediaStream};
use crate::session::SharePlatform;
use crate::workflow::ShareRequest;

fn set(target: &Object, key: &str, value: impl Into<JsValue>) -> Result<(), JsValue> {
    Reflect::set(target, &JsValue::from_str(key), &value.into()).map(|_| ())
}

fn describe(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            Reflect::get(err, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", err))
}

/// Call `target[method](...args)` and await the returned promise.
async fn call_async(target: &JsValue, method: &str, args: &Array) -> Result<JsValue, JsValue> {
    let function: Function = Reflect::get(target, &JsValue::from_str(method))?.dyn_into()?;
    let promise: Promise = function.apply(target, args)?.dyn_into()?;
    JsFuture::from(promise).await
}

fn navigator() -> Result<web_sys::Navigator, JsValue> {
    web_sys::window()
        .map(|w| w.navigator())
        .ok_or_else(|| JsValue::from_str("no window"))
}

/// Build `{ video: { width: { ideal }, height: { ideal }, facingMode }, audio: false }`.
fn constraints_object(constraints: &CameraConstraints) -> Result<Object, JsValue> {
    let ideal = |value: u32| -> Result<Object, JsValue> {
        let obj = Object::new();
        set(&obj, "ideal", value)?;
        Ok(obj)
    };

    let video = Object::new();
    set(&video, "width", ideal(constraints.ideal_width)?)?;
    set(&video, "height", ideal(constraints.ideal_height)?)?;
    set(&video, "facingMode", constraints.facing_mode.as_str())?;

    let root = Object::new();
    set(&root, "video", video)?;
    set(&root, "audio", false)?;
    Ok(root)
}

fn camera_error(err: &JsValue) -> CameraError {
    let name = Reflect::get(err, &JsValue::from_str("name"))
        .ok()
        .and_then(|n| n.as_string())
        .unwrap_or_default();
    match name.as_str() {
        "NotAllowedError" | "SecurityError" => CameraError::PermissionDenied,
        "NotFoundError" | "OverconstrainedError" => CameraError::NoDevice,
        "NotReadableError" | "AbortError" => CameraError::Busy,
        _ => CameraError::Other(describe(err)),
    }
}

/// `getUserMedia` bound to the page's preview video and scratch canvas.
pub struct WebCamera {
    video: HtmlVideoElement,
    canvas: HtmlCanvasElement,
}

impl WebCamera {
    pub fn new(video: HtmlVideoElement, canvas: HtmlCanvasElement) -> Self {
        Self { video, canvas }
    }
}

impl MediaDevices for WebCamera {
    type Stream = WebStream;

    async fn open(&self, constraints: &CameraConstraints) -> Result<WebStream, CameraError> {
        let media_devices = navigator()
            .and_then(|n| n.media_devices())
            .map_err(|_| CameraError::Unsupported)?;
        let request = constraints_object(constraints)
            .map_err(|e| CameraError::Other(describe(&e)))?
            .unchecked_into::<web_sys::MediaStreamConstraints>();

        let promise = media_devices
            .get_user_media_with_constraints(&request)
            .map_err(|e| camera_error(&e))?;
        let stream: web_sys::MediaStream = JsFuture::from(promise)
            .await
            .map_err(|e| camera_error(&e))?
            .dyn_into()
            .map_err(|e| CameraError::Other(describe(&e)))?;

        let mut bound = WebStream {
            stream,
            video: self.video.clone(),
            canvas: self.canvas.clone(),
        };
        bound.video.set_src_object(Some(&bound.stream));
        match self.video.play() {
            Ok(playing) => {
                if let Err(e) = JsFuture::from(playing).await {
                    bound.stop_tracks();
                    return Err(CameraError::Other(describe(&e)));
                }
            }
            Err(e) => {
                bound.stop_tracks();
                return Err(CameraError::Other(describe(&e)));
            }
        }
        Ok(bound)
    }
}

pub struct WebStream {
    stream: web_sys::MediaStream,
    video: HtmlVideoElement,
    canvas: HtmlCanvasElement,
}

impl MediaStream for WebStream {
    fn stop_tracks(&mut self) {
        for track in self.stream.get_tracks().iter() {
            if let Ok(track) = track.dyn_into::<web_sys::MediaStreamTrack>() {
                track.stop();
            }
        }
        self.video.set_src_object(None);
    }

    fn frame(&mut self) -> Option<RgbaFrame> {
        let (width, height) = (self.video.video_width(), self.video.video_height());
        if width == 0 || height == 0 {
            return None;
        }

        self.canvas.set_width(width);
        self.canvas.set_height(height);
        let context: CanvasRenderingContext2d = self.canvas.get_context("2d").ok()??.dyn_into().ok()?;
        context.draw_image_with_html_video_element(&self.video, 0.0, 0.0).ok()?;
        let image = context
            .get_image_data(0.0, 0.0, width as f64, height as f64)
            .ok()?;
        Some(RgbaFrame::new(width, height, image.data().0))
    }
}

/// `navigator.share` with a `navigator.clipboard` fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebShare;

impl SharePlatform for WebShare {
    fn can_share(&self) -> bool {
        navigator()
            .map(|n| Reflect::has(&n, &JsValue::from_str("share")).unwrap_or(false))
            .unwrap_or(false)
    }

    async fn share(&self, request: &ShareRequest) -> Result<(), String> {
        let navigator = navigator().map_err(|e| describe(&e))?;
        let data = Object::new();
        set(&data, "title", request.title.as_str()).map_err(|e| describe(&e))?;
        set(&data, "text", request.text.as_str()).map_err(|e| describe(&e))?;
        set(&data, "url", request.url.as_str()).map_err(|e| describe(&e))?;

        call_async(&navigator, "share", &Array::of1(&data))
            .await
            .map(|_| ())
            .map_err(|e| describe(&e))
    }

    async fn copy_text(&self, text: &str) -> Result<(), String> {
        let navigator = navigator().map_err(|e| describe(&e))?;
        let clipboard = Reflect::get(&navigator, &JsValue::from_str("clipboard")).map_err(|e| describe(&e))?;
        if clipboard.is_undefined() {
            return Err("clipboard unavailable".to_string());
        }

        call_async(&clipboard, "writeText", &Array::of1(&JsValue::from_str(text)))
            .await
            .map(|_| ())
            .map_err(|e| describe(&e))
    }
}

/// Read a picked or dropped file into memory.
pub async fn read_file(file: &web_sys::File) -> Result<Vec<u8>, String> {
    let buffer = JsFuture::from(file.array_buffer()).await.map_err(|e| describe(&e))?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

pub fn prefers_reduced_motion(window: &web_sys::Window) -> bool {
    window
        .match_media("(prefers-reduced-motion: reduce)")
        .ok()
        .flatten()
        .map(|query| query.matches())
        .unwrap_or(false)
}

/// WebGPU is the only graphics backend compiled for the browser.
pub fn has_webgpu(window: &web_sys::Window) -> bool {
    Reflect::has(&window.navigator(), &JsValue::from_str("gpu")).unwrap_or(false)
}

/// Seconds since page load.
pub fn now_seconds() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now() / 1000.0)
        .unwrap_or(0.0)
}
