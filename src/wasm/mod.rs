//! Browser shell.
//!
//! [`start_app`] wires the page controls to a [`Session`], repaints the page
//! from the controller's [`WorkflowView`] after every change and hosts the
//! ambient backdrop on `#heroScene`. [`create_model_viewer`] mounts a detail
//! viewer on any canvas that names an OBJ asset in `data-src`.

mod platform;
mod scene_host;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, EventTarget, HtmlCanvasElement, HtmlElement, HtmlInputElement,
    HtmlTextAreaElement, HtmlVideoElement, Window,
};

use crate::ambient::{AmbientScene, PointerArea};
use crate::api::{ApiBase, HttpAnalysisService};
use crate::capture::FileMeta;
use crate::config::{ClientConfig, SceneConfig};
use crate::countdown::CountdownPhase;
use crate::display::{ResultView, EMPTY_TRACKS_TEXT};
use crate::engine::SceneSupport;
use crate::gpu::renderer::WgpuBackend;
use crate::mesh_asset::fetch_obj;
use crate::session::{Command, Effect, Session};
use crate::viewer::DetailViewer;
use crate::workflow::{Focus, Notice, NoticeKind, Stage, WorkflowView};

use platform::{has_webgpu, now_seconds, prefers_reduced_motion, read_file, WebCamera, WebShare};
use scene_host::{canvas_viewport, SceneHost};

type WebSession = Session<HttpAnalysisService, WebCamera, WebShare>;
type AmbientHost = SceneHost<AmbientScene<WgpuBackend>>;
type ViewerHost = SceneHost<DetailViewer<WgpuBackend>>;

const TICK_MS: i32 = 250;
const TOAST_FADE_MS: i32 = 260;
const MOOD_BUSY_TEXT: &str = " Curating...";

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("no window"))
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn as_html(el: &Element) -> Option<&HtmlElement> {
    el.dyn_ref::<HtmlElement>()
}

fn set_hidden(el: &Option<Element>, hidden: bool) {
    if let Some(el) = el.as_ref().and_then(as_html) {
        el.set_hidden(hidden);
    }
}

fn set_disabled(el: &Option<Element>, disabled: bool) {
    if let Some(el) = el {
        let _ = el.toggle_attribute_with_force("disabled", disabled);
    }
}

fn set_text(el: &Option<Element>, text: &str) {
    if let Some(el) = el {
        if el.text_content().as_deref() != Some(text) {
            el.set_text_content(Some(text));
        }
    }
}

fn set_class(el: &Option<Element>, class: &str, on: bool) {
    if let Some(el) = el {
        let _ = el.class_list().toggle_with_force(class, on);
    }
}

fn set_style(el: &Option<Element>, property: &str, value: &str) {
    if let Some(el) = el.as_ref().and_then(as_html) {
        let _ = el.style().set_property(property, value);
    }
}

/// Service-supplied links are only followed when they are plain web URLs.
fn safe_href(url: &str) -> &str {
    if url.starts_with("https://") || url.starts_with("http://") {
        url
    } else {
        "#"
    }
}

fn smooth_center() -> web_sys::ScrollIntoViewOptions {
    let options = web_sys::ScrollIntoViewOptions::new();
    options.set_behavior(web_sys::ScrollBehavior::Smooth);
    options.set_block(web_sys::ScrollLogicalPosition::Center);
    options
}

fn focus_without_scroll(el: &Option<Element>) {
    if let Some(el) = el.as_ref().and_then(as_html) {
        let options = web_sys::FocusOptions::new();
        options.set_prevent_scroll(true);
        let _ = el.focus_with_options(&options);
    }
}

fn after(ms: i32, callback: impl FnOnce() + 'static) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let callback = Closure::once_into_js(callback);
    let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), ms);
}

fn file_meta(file: &web_sys::File) -> FileMeta {
    FileMeta::new(file.name(), file.type_(), file.size() as u64)
}

/// Handles to the page elements the shell reads or repaints. Markup may omit
/// any of them.
struct Page {
    document: Document,
    body: Option<Element>,

    upload_section: Option<Element>,
    loading_section: Option<Element>,
    results_section: Option<Element>,

    video: Option<Element>,
    start_camera: Option<Element>,
    capture_photo: Option<Element>,
    upload_area: Option<Element>,
    file_input: Option<Element>,
    browse_btn: Option<Element>,
    preview_container: Option<Element>,
    preview_image: Option<Element>,

    analyze_btn: Option<Element>,
    retake_btn: Option<Element>,
    try_again_btn: Option<Element>,
    share_btn: Option<Element>,

    mood_box_section: Option<Element>,
    mood_box_activator: Option<Element>,
    mood_input: Option<Element>,
    mood_submit: Option<Element>,

    countdown: Option<Element>,
    countdown_bubble: Option<Element>,
    countdown_seconds: Option<Element>,
    countdown_subtitle: Option<Element>,
    countdown_progress: Option<Element>,
    steps: [Option<Element>; 3],

    emotion_icon: Option<Element>,
    emotion_title: Option<Element>,
    emotion_description: Option<Element>,
    confidence_fill: Option<Element>,
    confidence_text: Option<Element>,
    emotion_breakdown: Option<Element>,
    songs_grid: Option<Element>,
    curator_summary: Option<Element>,

    /// Last result painted, so the cards only rebuild when it changes.
    painted: RefCell<Option<ResultView>>,
}

impl Page {
    fn new(document: Document) -> Self {
        let by_id = |id: &str| document.get_element_by_id(id);
        Self {
            body: document.body().map(Element::from),

            upload_section: by_id("uploadSection"),
            loading_section: by_id("loadingSection"),
            results_section: by_id("resultsSection"),

            video: by_id("video"),
            start_camera: by_id("startCamera"),
            capture_photo: by_id("capturePhoto"),
            upload_area: by_id("uploadArea"),
            file_input: by_id("fileInput"),
            browse_btn: by_id("browseBtn"),
            preview_container: by_id("previewContainer"),
            preview_image: by_id("previewImage"),

            analyze_btn: by_id("analyzeBtn"),
            retake_btn: by_id("retakeBtn"),
            try_again_btn: by_id("tryAgainBtn"),
            share_btn: by_id("shareBtn"),

            mood_box_section: by_id("moodBoxSection"),
            mood_box_activator: by_id("moodBoxActivator"),
            mood_input: by_id("moodInput"),
            mood_submit: by_id("moodSubmit"),

            countdown: by_id("loadingCountdown"),
            countdown_bubble: by_id("countdownBubble"),
            countdown_seconds: by_id("countdownSeconds"),
            countdown_subtitle: by_id("countdownSubtitle"),
            countdown_progress: by_id("countdownProgress"),
            steps: [by_id("step1"), by_id("step2"), by_id("step3")],

            emotion_icon: by_id("emotionIcon"),
            emotion_title: by_id("emotionTitle"),
            emotion_description: by_id("emotionDescription"),
            confidence_fill: by_id("confidenceFill"),
            confidence_text: by_id("confidenceText"),
            emotion_breakdown: by_id("emotionBreakdown"),
            songs_grid: by_id("songsGrid"),
            curator_summary: by_id("curatorSummary"),

            painted: RefCell::new(None),
            document,
        }
    }

    fn create(&self, tag: &str, class: &str) -> Result<Element, JsValue> {
        let el = self.document.create_element(tag)?;
        if !class.is_empty() {
            el.set_class_name(class);
        }
        Ok(el)
    }

    fn mood_text(&self) -> String {
        let Some(el) = &self.mood_input else {
            return String::new();
        };
        if let Some(area) = el.dyn_ref::<HtmlTextAreaElement>() {
            area.value()
        } else if let Some(input) = el.dyn_ref::<HtmlInputElement>() {
            input.value()
        } else {
            String::new()
        }
    }

    fn set_mood_text(&self, text: &str) {
        let Some(el) = &self.mood_input else {
            return;
        };
        if let Some(area) = el.dyn_ref::<HtmlTextAreaElement>() {
            area.set_value(text);
        } else if let Some(input) = el.dyn_ref::<HtmlInputElement>() {
            input.set_value(text);
        }
    }

    fn picked_file(&self) -> Option<web_sys::File> {
        let input = self.file_input.as_ref()?.dyn_ref::<HtmlInputElement>()?;
        input.files()?.get(0)
    }

    fn clear_file_input(&self) {
        if let Some(input) = self.file_input.as_ref().and_then(|el| el.dyn_ref::<HtmlInputElement>()) {
            input.set_value("");
        }
    }

    fn render(&self, view: &WorkflowView) {
        set_hidden(&self.upload_section, view.stage != Stage::Upload);
        set_hidden(&self.loading_section, view.stage != Stage::Loading);
        set_hidden(&self.results_section, view.stage != Stage::Results);

        set_class(&self.video, "active", view.camera_active);
        set_disabled(&self.start_camera, !view.start_camera_enabled);
        set_disabled(&self.capture_photo, !view.capture_enabled);

        match &view.preview {
            Some(src) => {
                if let Some(img) = &self.preview_image {
                    if img.get_attribute("src").as_deref() != Some(src.as_str()) {
                        let _ = img.set_attribute("src", src);
                    }
                }
                set_hidden(&self.preview_container, false);
            }
            None => set_hidden(&self.preview_container, true),
        }
        set_disabled(&self.analyze_btn, !view.submit_enabled);

        self.render_mood_box(view);
        self.render_countdown(view);

        for (step, active) in self.steps.iter().zip(view.loading_steps) {
            set_class(step, "active", active);
        }

        match &view.result {
            Some(result) => {
                if self.painted.borrow().as_ref() != Some(result) {
                    if let Err(e) = self.render_result(result) {
                        log::warn!("Could not render results: {:?}", e);
                    }
                    *self.painted.borrow_mut() = Some(result.clone());
                }
            }
            None => {
                self.painted.borrow_mut().take();
            }
        }

        match &view.curator_summary {
            Some(text) => {
                set_text(&self.curator_summary, text);
                set_hidden(&self.curator_summary, false);
            }
            None => {
                set_text(&self.curator_summary, "");
                set_hidden(&self.curator_summary, true);
            }
        }
    }

    fn render_mood_box(&self, view: &WorkflowView) {
        set_class(&self.body, "mood-box-open", view.mood_box_open);
        if let Some(section) = &self.mood_box_section {
            let _ = section.set_attribute("aria-hidden", if view.mood_box_open { "false" } else { "true" });
        }
        if let Some(activator) = &self.mood_box_activator {
            let _ = activator.set_attribute("aria-pressed", if view.mood_box_open { "true" } else { "false" });
        }
        set_class(&self.mood_box_activator, "triggered", view.mood_box_open);

        let Some(submit) = self.mood_submit.as_ref().and_then(as_html) else {
            return;
        };
        let busy = submit.class_list().contains("loading");
        if busy == view.mood_submit_busy {
            return;
        }
        set_disabled(&self.mood_submit, view.mood_submit_busy);
        set_class(&self.mood_submit, "loading", view.mood_submit_busy);

        let dataset = submit.dataset();
        if view.mood_submit_busy {
            if dataset.get("originalText").is_none() {
                let _ = dataset.set("originalText", &submit.inner_html());
            }
            submit.set_text_content(None);
            if let Ok(spinner) = self.create("i", "fas fa-circle-notch fa-spin") {
                let _ = submit.append_child(&spinner);
            }
            let _ = submit.append_with_str_1(MOOD_BUSY_TEXT);
        } else if let Some(original) = dataset.get("originalText") {
            submit.set_inner_html(&original);
        }
    }

    fn render_countdown(&self, view: &WorkflowView) {
        let countdown = &view.countdown;
        set_hidden(&self.countdown, !countdown.visible);
        if let Some(container) = self.countdown.as_ref().and_then(as_html) {
            let state = match countdown.phase {
                CountdownPhase::Idle => "idle",
                CountdownPhase::Running => "running",
                CountdownPhase::Overtime => "overtime",
                CountdownPhase::Done => "done",
            };
            let _ = container.dataset().set("state", state);
        }

        set_text(&self.countdown_seconds, &countdown.digits());
        set_text(&self.countdown_subtitle, countdown.caption);
        set_style(
            &self.countdown_bubble,
            "--countdown-angle",
            &format!("{}deg", countdown.angle_deg),
        );
        set_style(
            &self.countdown_progress,
            "width",
            &format!("{}%", countdown.progress_pct),
        );
    }

    fn render_result(&self, result: &ResultView) -> Result<(), JsValue> {
        if let Some(icon) = &self.emotion_icon {
            icon.set_text_content(None);
            icon.append_child(&self.create("i", &format!("fas {}", result.icon))?)?;
        }
        set_text(&self.emotion_title, &result.title);
        set_text(&self.emotion_description, &result.description);
        set_style(&self.confidence_fill, "width", &format!("{}%", result.confidence_pct));
        set_text(&self.confidence_text, &result.confidence_text);

        if let Some(breakdown) = &self.emotion_breakdown {
            breakdown.set_text_content(None);
            for label in &result.breakdown {
                let chip = self.create("span", "chip")?;
                chip.set_text_content(Some(label));
                breakdown.append_child(&chip)?;
            }
        }
        set_hidden(&self.emotion_breakdown, result.breakdown.is_empty());

        if let Some(grid) = &self.songs_grid {
            grid.set_text_content(None);
            if result.tracks.is_empty() {
                let empty = self.create("p", "song-reason")?;
                empty.set_text_content(Some(EMPTY_TRACKS_TEXT));
                grid.append_child(&empty)?;
            }
            for track in &result.tracks {
                grid.append_child(&self.song_card(track)?)?;
            }
        }
        Ok(())
    }

    fn song_card(&self, track: &crate::display::TrackCard) -> Result<Element, JsValue> {
        let card = self.create("div", "song-card")?;
        if let Some(card) = as_html(&card) {
            card.style()
                .set_property("animation-delay", &format!("{}ms", track.delay_ms))?;
        }

        let header = self.create("div", "song-header")?;
        let icon = self.create("div", "song-icon")?;
        icon.append_child(&self.create("i", "fas fa-music")?)?;
        let info = self.create("div", "song-info")?;
        let title = self.create("h4", "")?;
        title.set_text_content(Some(&track.title));
        let artist = self.create("div", "artist")?;
        artist.set_text_content(Some(&track.artist));
        info.append_child(&title)?;
        info.append_child(&artist)?;
        header.append_child(&icon)?;
        header.append_child(&info)?;

        let reason = self.create("div", "song-reason")?;
        reason.set_text_content(Some(&track.reason));

        let links = self.create("div", "song-links")?;
        for (class, brand, label, href) in [
            ("btn youtube-btn", "fab fa-youtube", " YouTube", &track.youtube),
            ("btn spotify-btn", "fab fa-spotify", " Spotify", &track.spotify),
        ] {
            let link = self.create("a", class)?;
            link.set_attribute("href", safe_href(href))?;
            link.set_attribute("target", "_blank")?;
            link.set_attribute("rel", "noopener")?;
            link.append_child(&self.create("i", brand)?)?;
            link.append_with_str_1(label)?;
            links.append_child(&link)?;
        }

        card.append_child(&header)?;
        card.append_child(&reason)?;
        card.append_child(&links)?;
        Ok(card)
    }

    fn toast(&self, notice: &Notice, lifetime_ms: u32) {
        let kind = match notice.kind {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
            NoticeKind::Info => "info",
        };
        let Ok(toast) = self.create("div", &format!("notification notification-{}", kind)) else {
            return;
        };
        let _ = toast.set_attribute("role", "status");
        toast.set_text_content(Some(&notice.message));
        let Some(body) = &self.body else {
            return;
        };
        if body.append_child(&toast).is_err() {
            return;
        }

        after(lifetime_ms as i32, move || {
            let _ = toast.class_list().add_1("notification-leaving");
            after(TOAST_FADE_MS, move || toast.remove());
        });
    }

    fn focus(&self, focus: Focus) {
        match focus {
            Focus::MoodInput => {
                if let Some(el) = self.mood_input.as_ref().and_then(as_html) {
                    let _ = el.focus();
                }
            }
            Focus::SubmitButton => {
                if let Some(container) = &self.preview_container {
                    container.scroll_into_view_with_scroll_into_view_options(&smooth_center());
                }
                if let Some(el) = self.analyze_btn.as_ref().and_then(as_html) {
                    let _ = el.focus();
                }
            }
        }
    }

    /// Focus the mood input after the box has opened, then bring it on screen.
    fn focus_mood_box(page: &Rc<Page>, delay_ms: u32) {
        if delay_ms == 0 {
            page.focus(Focus::MoodInput);
            return;
        }
        let page = page.clone();
        after(delay_ms as i32, move || {
            focus_without_scroll(&page.mood_input);
            if let Some(section) = &page.mood_box_section {
                section.scroll_into_view_with_scroll_into_view_options(&smooth_center());
            }
        });
    }
}

struct Listener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

struct App {
    session: WebSession,
    page: Rc<Page>,
    config: ClientConfig,
    ambient: RefCell<Option<Rc<AmbientHost>>>,
    listeners: RefCell<Vec<Listener>>,
    ticker: RefCell<Option<(i32, Closure<dyn FnMut()>)>>,
}

impl App {
    fn listen(
        self: &Rc<Self>,
        target: &EventTarget,
        event: &'static str,
        mut handler: impl FnMut(&Rc<App>, web_sys::Event) + 'static,
    ) {
        let app: Weak<App> = Rc::downgrade(self);
        let callback = Closure::<dyn FnMut(web_sys::Event)>::new(move |event: web_sys::Event| {
            if let Some(app) = app.upgrade() {
                handler(&app, event);
            }
        });
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

    /// Dispatch `command` on a click of `el`, if the element exists.
    fn on_click(self: &Rc<Self>, el: &Option<Element>, command: impl Fn() -> Command + 'static) {
        if let Some(el) = el {
            self.listen(el, "click", move |app, _| app.dispatch(command()));
        }
    }

    fn dispatch(self: &Rc<Self>, command: Command) {
        let app = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let effect = app.session.dispatch(command).await;
            app.apply(effect);
        });
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::FocusMoodInput { delay_ms } => Page::focus_mood_box(&self.page, delay_ms),
            Effect::FillMoodInput(text) => {
                self.page.set_mood_text(&text);
                self.page.focus(Focus::MoodInput);
            }
            Effect::ReadFile(token) => log::debug!("Unclaimed file read {:?}", token),
        }
    }

    /// Validate a picked or dropped file, then read it if it was accepted.
    fn select_file(self: &Rc<Self>, file: web_sys::File) {
        let app = self.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let meta = file_meta(&file);
            let Effect::ReadFile(token) = app.session.dispatch(Command::SelectFile(meta.clone())).await else {
                return;
            };
            let command = match read_file(&file).await {
                Ok(bytes) => Command::FileLoaded { token, meta, bytes },
                Err(reason) => Command::FileFailed { token, reason },
            };
            app.session.dispatch(command).await;
        });
    }

    fn reset(self: &Rc<Self>) {
        self.page.clear_file_input();
        self.dispatch(Command::Reset);
        if let Some(window) = web_sys::window() {
            let options = web_sys::ScrollToOptions::new();
            options.set_top(0.0);
            options.set_behavior(web_sys::ScrollBehavior::Smooth);
            window.scroll_to_with_scroll_to_options(&options);
        }
    }

    fn attach(self: &Rc<Self>, window: &Window) {
        let page = self.page.clone();

        self.on_click(&page.start_camera, || Command::StartCamera);
        self.on_click(&page.capture_photo, || Command::CapturePhoto);
        self.on_click(&page.analyze_btn, || Command::SubmitImage);
        self.on_click(&page.share_btn, || Command::Share);
        self.on_click(&page.mood_box_activator, || Command::OpenMoodBox);

        for button in [&page.retake_btn, &page.try_again_btn].into_iter().flatten() {
            self.listen(button, "click", |app, _| app.reset());
        }

        if let Some(submit) = &page.mood_submit {
            self.listen(submit, "click", |app, _| {
                let text = app.page.mood_text();
                app.dispatch(Command::SubmitMood(text));
            });
        }
        if let Some(input) = &page.mood_input {
            self.listen(input, "keydown", |app, event| {
                let Some(key) = event.dyn_ref::<web_sys::KeyboardEvent>() else {
                    return;
                };
                if key.ctrl_key() && key.key() == "Enter" {
                    event.prevent_default();
                    let text = app.page.mood_text();
                    app.dispatch(Command::SubmitMood(text));
                }
            });
        }
        if let Ok(chips) = page.document.query_selector_all("[data-mood-preset]") {
            for index in 0..chips.length() {
                let Some(chip) = chips.item(index).and_then(|n| n.dyn_into::<Element>().ok()) else {
                    continue;
                };
                let preset = chip.get_attribute("data-mood-preset").unwrap_or_default();
                if preset.is_empty() {
                    continue;
                }
                self.listen(&chip, "click", move |app, _| {
                    app.dispatch(Command::ApplyMoodPreset(preset.clone()));
                });
            }
        }

        let browse_targets = [&page.browse_btn, &page.upload_area];
        for target in browse_targets.into_iter().flatten() {
            self.listen(target, "click", |app, event| {
                event.stop_propagation();
                if let Some(input) = app.page.file_input.as_ref().and_then(as_html) {
                    input.click();
                }
            });
        }
        if let Some(input) = &page.file_input {
            self.listen(input, "change", |app, _| {
                if let Some(file) = app.page.picked_file() {
                    app.select_file(file);
                }
            });
        }
        if let Some(area) = &page.upload_area {
            for event in ["dragenter", "dragover"] {
                self.listen(area, event, |app, event| {
                    event.prevent_default();
                    event.stop_propagation();
                    set_class(&app.page.upload_area, "dragover", true);
                });
            }
            self.listen(area, "dragleave", |app, event| {
                event.prevent_default();
                event.stop_propagation();
                set_class(&app.page.upload_area, "dragover", false);
            });
            self.listen(area, "drop", |app, event| {
                event.prevent_default();
                event.stop_propagation();
                set_class(&app.page.upload_area, "dragover", false);
                let file = event
                    .dyn_ref::<web_sys::DragEvent>()
                    .and_then(|drag| drag.data_transfer())
                    .and_then(|transfer| transfer.files())
                    .and_then(|files| files.get(0));
                if let Some(file) = file {
                    app.select_file(file);
                }
            });
        }

        self.listen(window, "beforeunload", |app, _| app.teardown());

        let app = Rc::downgrade(self);
        let tick = Closure::<dyn FnMut()>::new(move || {
            if let Some(app) = app.upgrade() {
                app.session.tick();
            }
        });
        match window.set_interval_with_callback_and_timeout_and_arguments_0(tick.as_ref().unchecked_ref(), TICK_MS) {
            Ok(id) => *self.ticker.borrow_mut() = Some((id, tick)),
            Err(e) => log::warn!("Countdown ticker unavailable: {:?}", e),
        }
    }

    async fn start_ambient(self: &Rc<Self>, window: &Window) {
        let Some(canvas) = self
            .page
            .document
            .get_element_by_id("heroScene")
            .and_then(|el| el.dyn_into::<HtmlCanvasElement>().ok())
        else {
            return;
        };

        let scene_config = &self.config.scene;
        let support = SceneSupport {
            has_graphics: has_webgpu(window),
            reduced_motion: prefers_reduced_motion(window),
            viewport_width: window.inner_width().ok().and_then(|w| w.as_f64()).unwrap_or(0.0),
        };

        match self.build_ambient(&canvas, &support, scene_config).await {
            Ok(host) => {
                *self.ambient.borrow_mut() = Some(host);
            }
            Err(reason) => {
                log::info!("Ambient scene unavailable: {}", reason);
                if let Some(parent) = canvas.parent_element() {
                    let _ = parent.class_list().add_1("hero-3d-disabled");
                }
            }
        }
    }

    async fn build_ambient(
        &self,
        canvas: &HtmlCanvasElement,
        support: &SceneSupport,
        config: &SceneConfig,
    ) -> Result<Rc<AmbientHost>, String> {
        // Gate before touching the GPU
        support.check(config.min_viewport_width).map_err(|e| e.to_string())?;

        let mut config = config.clone();
        if config.seed.is_none() {
            config.seed = Some((js_sys::Math::random() * u32::MAX as f64) as u64);
        }

        let viewport = canvas_viewport(canvas, config.min_ambient_height, config.ambient_max_pixel_ratio);
        let backend = WgpuBackend::new_for_canvas(canvas.clone())
            .await
            .map_err(|e| e.to_string())?;
        let scene = AmbientScene::new(support, backend, viewport, &config).map_err(|e| e.to_string())?;

        let host = SceneHost::new(scene, canvas.clone(), now_seconds());
        let window = web_sys::window().ok_or("no window")?;

        let resize_host = Rc::downgrade(&host);
        let (min_height, max_ratio) = (config.min_ambient_height, config.ambient_max_pixel_ratio);
        host.listen(&window, "resize", move |_| {
            if let Some(host) = resize_host.upgrade() {
                let viewport = canvas_viewport(host.canvas(), min_height, max_ratio);
                host.scene().borrow_mut().resize(viewport);
            }
        });

        let pointer_host = Rc::downgrade(&host);
        host.listen(&window, "pointermove", move |event| {
            let (Some(host), Some(pointer)) = (pointer_host.upgrade(), event.dyn_ref::<web_sys::PointerEvent>()) else {
                return;
            };
            let container = host.canvas().parent_element().unwrap_or_else(|| host.canvas().clone().into());
            let rect = container.get_bounding_client_rect();
            let area = PointerArea {
                left: rect.left(),
                top: rect.top(),
                width: rect.width(),
                height: rect.height(),
            };
            host.scene()
                .borrow_mut()
                .pointer_move(pointer.client_x() as f64, pointer.client_y() as f64, &area);
        });

        host.run();
        Ok(host)
    }

    fn teardown(self: &Rc<Self>) {
        if let Some((id, _)) = self.ticker.borrow_mut().take() {
            if let Some(window) = web_sys::window() {
                window.clear_interval_with_handle(id);
            }
        }
        let listeners = self.listeners.take();
        for listener in &listeners {
            let _ = listener
                .target
                .remove_event_listener_with_callback(listener.event, listener.callback.as_ref().unchecked_ref());
        }
        // One of these may be the handler running right now
        after(0, move || drop(listeners));

        let ambient = self.ambient.take();
        if let Some(host) = ambient {
            host.dispose();
        }
        self.dispatch(Command::Teardown);
    }
}

/// Handle returned to the page. Dropping it detaches nothing; call
/// [`MoodMusicApp::dispose`] to tear the page down explicitly.
#[wasm_bindgen]
pub struct MoodMusicApp {
    inner: Rc<App>,
}

#[wasm_bindgen]
impl MoodMusicApp {
    /// Current view model as JSON.
    #[wasm_bindgen(js_name = viewJson)]
    pub fn view_json(&self) -> Result<String, JsValue> {
        let controller = self.inner.session.controller();
        let view = controller.borrow().view(now_seconds());
        serde_json::to_string(&view).map_err(js_error)
    }

    #[wasm_bindgen(getter, js_name = ambientRunning)]
    pub fn ambient_running(&self) -> bool {
        self.inner
            .ambient
            .borrow()
            .as_ref()
            .is_some_and(|host| !host.is_disposed())
    }

    pub fn dispose(&self) {
        self.inner.teardown();
    }
}

/// Bind the page. `config_json` optionally overrides any subset of the
/// client configuration.
#[wasm_bindgen]
pub async fn start_app(config_json: Option<String>) -> Result<MoodMusicApp, JsValue> {
    init_panic_hook();

    let config = match config_json.as_deref() {
        Some(json) => ClientConfig::from_json(json).map_err(js_error)?,
        None => ClientConfig::default(),
    };

    let window = window()?;
    let document = window.document().ok_or_else(|| JsValue::from_str("no document"))?;
    let location = window.location();
    let base = ApiBase::from_location(
        &location.protocol()?,
        &location.hostname()?,
        &location.port()?,
        config.service_port,
    );
    log::info!("MoodMusic talking to {}", base.as_str());

    let video: HtmlVideoElement = document
        .get_element_by_id("video")
        .ok_or_else(|| JsValue::from_str("missing #video"))?
        .dyn_into()?;
    let canvas: HtmlCanvasElement = document
        .get_element_by_id("canvas")
        .ok_or_else(|| JsValue::from_str("missing #canvas"))?
        .dyn_into()?;

    let page = Rc::new(Page::new(document));
    let controller = crate::workflow::WorkflowController::new(config.clone(), prefers_reduced_motion(&window));
    let mut session = Session::new(
        controller,
        HttpAnalysisService::new(base),
        WebCamera::new(video, canvas),
        WebShare,
        now_seconds,
    );
    session.set_page_url(location.href()?);

    let shared = session.controller();
    let painter = page.clone();
    let notice_ms = config.notice_ms;
    session.set_on_change(move || {
        let (view, notices, focus) = {
            let mut controller = shared.borrow_mut();
            (controller.view(now_seconds()), controller.drain_notices(), controller.take_focus())
        };
        painter.render(&view);
        for notice in &notices {
            painter.toast(notice, notice_ms);
        }
        if let Some(focus) = focus {
            painter.focus(focus);
        }
    });

    let app = Rc::new(App {
        session,
        page,
        config,
        ambient: RefCell::new(None),
        listeners: RefCell::new(Vec::new()),
        ticker: RefCell::new(None),
    });

    {
        let view = app.session.controller().borrow().view(now_seconds());
        app.page.render(&view);
    }
    app.attach(&window);
    app.start_ambient(&window).await;

    Ok(MoodMusicApp { inner: app })
}

/// A detail viewer mounted on one canvas.
#[wasm_bindgen]
pub struct ModelViewer {
    host: Rc<ViewerHost>,
}

#[wasm_bindgen]
impl ModelViewer {
    #[wasm_bindgen(getter)]
    pub fn loaded(&self) -> bool {
        self.host.scene().borrow().has_model()
    }

    pub fn dispose(&self) {
        self.host.dispose();
    }
}

fn viewer_listeners(host: &Rc<ViewerHost>, window: &Window, max_ratio: f64) {
    let canvas: EventTarget = host.canvas().clone().into();

    let weak = Rc::downgrade(host);
    host.listen(&canvas, "pointerdown", move |event| {
        let (Some(host), Some(pointer)) = (weak.upgrade(), event.dyn_ref::<web_sys::PointerEvent>()) else {
            return;
        };
        let _ = host.canvas().set_pointer_capture(pointer.pointer_id());
        host.scene()
            .borrow_mut()
            .pointer_down(pointer.client_x() as f64, pointer.client_y() as f64);
    });

    let weak = Rc::downgrade(host);
    host.listen(&canvas, "pointermove", move |event| {
        let (Some(host), Some(pointer)) = (weak.upgrade(), event.dyn_ref::<web_sys::PointerEvent>()) else {
            return;
        };
        host.scene()
            .borrow_mut()
            .pointer_move(pointer.client_x() as f64, pointer.client_y() as f64);
    });

    for event in ["pointerup", "pointercancel"] {
        let weak = Rc::downgrade(host);
        host.listen(&canvas, event, move |_| {
            if let Some(host) = weak.upgrade() {
                host.scene().borrow_mut().pointer_up();
            }
        });
    }

    let weak = Rc::downgrade(host);
    host.listen(&canvas, "wheel", move |event| {
        let (Some(host), Some(wheel)) = (weak.upgrade(), event.dyn_ref::<web_sys::WheelEvent>()) else {
            return;
        };
        event.prevent_default();
        host.scene().borrow_mut().wheel(wheel.delta_y());
    });

    let weak = Rc::downgrade(host);
    host.listen(window, "resize", move |_| {
        if let Some(host) = weak.upgrade() {
            let viewport = canvas_viewport(host.canvas(), 1.0, max_ratio);
            host.scene().borrow_mut().resize(viewport);
        }
    });
}

/// Mount a detail viewer on `canvas` and load the OBJ named by its
/// `data-src` attribute. The viewer renders immediately; the model appears
/// once it has loaded.
#[wasm_bindgen]
pub async fn create_model_viewer(canvas: HtmlCanvasElement) -> Result<ModelViewer, JsValue> {
    init_panic_hook();

    let window = window()?;
    let src = canvas
        .dataset()
        .get("src")
        .filter(|src| !src.trim().is_empty())
        .ok_or_else(|| JsValue::from_str("canvas has no data-src"))?;
    let url = web_sys::Url::new_with_base(&src, &window.location().href()?)?.href();

    let support = SceneSupport {
        has_graphics: has_webgpu(&window),
        reduced_motion: prefers_reduced_motion(&window),
        viewport_width: window.inner_width()?.as_f64().unwrap_or(0.0),
    };
    let max_ratio = SceneConfig::default().viewer_max_pixel_ratio;
    let viewport = canvas_viewport(&canvas, 1.0, max_ratio);
    let backend = WgpuBackend::new_for_canvas(canvas.clone()).await.map_err(js_error)?;
    let viewer = DetailViewer::new(&support, backend, viewport).map_err(js_error)?;

    let host = SceneHost::new(viewer, canvas, now_seconds());
    viewer_listeners(&host, &window, max_ratio);
    host.run();

    let loading = Rc::downgrade(&host);
    wasm_bindgen_futures::spawn_local(async move {
        let asset = match fetch_obj(&url).await {
            Ok(asset) => asset,
            Err(e) => {
                log::warn!("Model {} unavailable: {}", url, e);
                return;
            }
        };
        let Some(host) = loading.upgrade() else {
            return;
        };
        if host.is_disposed() {
            return;
        }
        if let Err(e) = host.scene().borrow_mut().set_model(&asset) {
            log::warn!("Could not show model {}: {}", url, e);
        }
    });

    Ok(ModelViewer { host })
}
