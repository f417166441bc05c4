//! The workflow controller: one owned state machine per page session.
//!
//! ```text
//!   Upload --submit--> Loading --success--> Results
//!     ^                   |                    |
//!     +------failure------+                    |
//!     +--------------------reset---------------+
//! ```
//!
//! The controller never awaits anything. Operations that start asynchronous
//! work (camera, file read, network) hand back a [`SessionToken`]; the host
//! performs the work and reports back with that token. A report whose token is
//! no longer current (the user reset, or started something newer) is
//! discarded, so a stale completion can never resurrect an old result.

use serde::Serialize;

use crate::analysis::AnalysisResult;
use crate::api::AnalysisRequest;
use crate::capture::{CapturedImage, FileMeta};
use crate::config::ClientConfig;
use crate::countdown::{CountdownDisplay, CountdownPhase, CountdownTimer};
use crate::display::{curator_summary, share_digest, ResultView, SHARE_TITLE};
use crate::error::{CameraError, InputError, ServiceError};
use crate::media::{CameraConstraints, CameraGuard, MediaStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Upload,
    Loading,
    Results,
}

/// Identifies one asynchronous operation started by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Where keyboard focus should move next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    MoodInput,
    SubmitButton,
}

/// A network request the host must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub token: SessionToken,
    pub request: AnalysisRequest,
}

/// What happened to a reported completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied(Stage),
    Discarded,
}

/// Text to hand to the platform share sheet or clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub title: String,
    pub text: String,
    pub url: String,
}

impl ShareRequest {
    /// Clipboard variant: text followed by the page link.
    pub fn clipboard_text(&self) -> String {
        format!("{}\n{}", self.text, self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    ShareCancelled,
    Copied,
    CopyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Image,
    Mood,
}

#[derive(Debug, Clone)]
struct InFlight {
    token: SessionToken,
    kind: RequestKind,
    failure_text: &'static str,
}

/// Everything the page needs to repaint, serializable for the web shell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowView {
    pub stage: Stage,
    pub camera_active: bool,
    pub start_camera_enabled: bool,
    pub capture_enabled: bool,
    pub preview: Option<String>,
    pub submit_enabled: bool,
    pub mood_submit_busy: bool,
    pub mood_box_open: bool,
    pub countdown: CountdownDisplay,
    pub loading_steps: [bool; 3],
    pub result: Option<ResultView>,
    pub curator_summary: Option<String>,
}

pub const CAMERA_LIVE: &str = "Camera live! Center your face and hit capture.";
pub const CAMERA_FAILED: &str = "Unable to access camera. Try uploading a photo instead.";
pub const CAMERA_WARMING_UP: &str = "Camera still warming up. Give it a second!";
pub const CAPTURE_FAILED: &str = "Could not capture a photo. Try again.";
pub const NOTHING_TO_SHARE: &str = "Analyze a photo first.";
pub const SHARE_CANCELLED: &str = "Sharing cancelled.";
pub const COPIED: &str = "Playlist copied to clipboard!";
pub const COPY_FAILED: &str = "Could not copy link.";

pub struct WorkflowController<S: MediaStream> {
    config: ClientConfig,
    reduced_motion: bool,
    stage: Stage,
    camera: CameraGuard<S>,
    image: Option<CapturedImage>,
    result: Option<AnalysisResult>,
    summary: Option<String>,
    countdown: CountdownTimer,
    loading_started: Option<f64>,
    next_token: u64,
    in_flight: Option<InFlight>,
    pending_camera: Option<SessionToken>,
    pending_file: Option<SessionToken>,
    mood_box_open: bool,
    focus: Option<Focus>,
    notices: Vec<Notice>,
}

impl<S: MediaStream> WorkflowController<S> {
    pub fn new(config: ClientConfig, reduced_motion: bool) -> Self {
        Self {
            config,
            reduced_motion,
            stage: Stage::Upload,
            camera: CameraGuard::new(),
            image: None,
            result: None,
            summary: None,
            countdown: CountdownTimer::new(),
            loading_started: None,
            next_token: 1,
            in_flight: None,
            pending_camera: None,
            pending_file: None,
            mood_box_open: false,
            focus: None,
            notices: Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn image(&self) -> Option<&CapturedImage> {
        self.image.as_ref()
    }

    /// Last successful result, kept for sharing.
    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn countdown(&self) -> &CountdownTimer {
        &self.countdown
    }

    pub fn camera_active(&self) -> bool {
        self.camera.is_active()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn mood_box_open(&self) -> bool {
        self.mood_box_open
    }

    /// Which of the three loading step indicators are lit at `now`.
    pub fn loading_steps(&self, now: f64) -> [bool; 3] {
        let mut steps = [false; 3];
        if self.stage != Stage::Loading {
            return steps;
        }
        if let Some(start) = self.loading_started {
            let step = self.config.loading_step_ms as f64 / 1000.0;
            for (index, lit) in steps.iter_mut().enumerate() {
                *lit = now - start >= step * (index + 1) as f64;
            }
        }
        steps
    }

    pub fn view(&self, now: f64) -> WorkflowView {
        let result = match (self.stage, &self.result) {
            (Stage::Results, Some(result)) => Some(ResultView::from_result(result)),
            _ => None,
        };
        let mood_busy = matches!(&self.in_flight, Some(f) if f.kind == RequestKind::Mood);

        WorkflowView {
            stage: self.stage,
            camera_active: self.camera.is_active(),
            start_camera_enabled: !self.camera.is_active(),
            capture_enabled: self.camera.is_active(),
            preview: self.image.as_ref().map(|image| image.data_url().to_string()),
            submit_enabled: self.image.is_some() && self.in_flight.is_none(),
            mood_submit_busy: mood_busy,
            mood_box_open: self.mood_box_open,
            countdown: self.countdown.display().clone(),
            loading_steps: self.loading_steps(now),
            result,
            curator_summary: self.summary.clone(),
        }
    }

    /// Notices raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn take_focus(&mut self) -> Option<Focus> {
        self.focus.take()
    }

    fn notify(&mut self, kind: NoticeKind, message: impl Into<String>) {
        let notice = Notice::new(kind, message);
        log::debug!("Notice ({:?}): {}", notice.kind, notice.message);
        self.notices.push(notice);
    }

    fn issue_token(&mut self) -> SessionToken {
        let token = SessionToken(self.next_token);
        self.next_token += 1;
        token
    }

    // ------------------------------------------------------------------------
    // Mood box
    // ------------------------------------------------------------------------

    /// Reveal the mood box. Returns the delay in milliseconds after which the
    /// host should focus the input (longer on first open, to let it animate in).
    /// No focus is queued here; the delayed focus belongs to the caller.
    pub fn open_mood_box(&mut self) -> u32 {
        let already_open = self.mood_box_open;
        self.mood_box_open = true;
        if already_open {
            120
        } else {
            620
        }
    }

    /// A preset chip was clicked; the host copies `preset` into the input and
    /// focuses it.
    pub fn apply_mood_preset(&mut self, preset: &str) -> String {
        preset.to_string()
    }

    // ------------------------------------------------------------------------
    // Camera
    // ------------------------------------------------------------------------

    /// Prepare a camera request. Any live session is released first.
    pub fn start_camera(&mut self) -> Option<(SessionToken, CameraConstraints)> {
        if self.stage != Stage::Upload {
            return None;
        }
        self.camera.release();
        let token = self.issue_token();
        self.pending_camera = Some(token);
        Some((token, CameraConstraints::from(&self.config.capture)))
    }

    /// The platform delivered a stream for `token`.
    pub fn camera_opened(&mut self, token: SessionToken, mut stream: S) -> Completion {
        if self.pending_camera != Some(token) || self.stage != Stage::Upload {
            log::warn!("Discarding camera stream for stale request {:?}", token);
            stream.stop_tracks();
            return Completion::Discarded;
        }
        self.pending_camera = None;
        self.camera.install(stream);
        self.notify(NoticeKind::Success, CAMERA_LIVE);
        Completion::Applied(self.stage)
    }

    pub fn camera_failed(&mut self, token: SessionToken, error: &CameraError) -> Completion {
        if self.pending_camera != Some(token) {
            return Completion::Discarded;
        }
        self.pending_camera = None;
        log::warn!("Camera unavailable: {}", error);
        self.notify(NoticeKind::Error, CAMERA_FAILED);
        Completion::Applied(self.stage)
    }

    /// Snapshot the live frame into the held image and release the camera.
    pub fn capture_photo(&mut self) -> Result<(), CameraError> {
        let frame = match self.camera.snapshot() {
            Ok(frame) => frame,
            Err(CameraError::NotReady) => {
                self.notify(NoticeKind::Info, CAMERA_WARMING_UP);
                return Err(CameraError::NotReady);
            }
            Err(e) => {
                log::warn!("Capture ignored: {}", e);
                return Err(e);
            }
        };

        match CapturedImage::from_frame(&frame, self.config.capture.jpeg_quality) {
            Ok(image) => {
                self.image = Some(image);
                self.camera.release();
                self.focus = Some(Focus::SubmitButton);
                Ok(())
            }
            Err(e) => {
                log::error!("Capture failed: {}", e);
                self.notify(NoticeKind::Error, CAPTURE_FAILED);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // File upload
    // ------------------------------------------------------------------------

    /// Validate a picked file. On success the host reads it and calls
    /// [`Self::file_loaded`] with the returned token.
    pub fn select_file(&mut self, meta: &FileMeta) -> Result<SessionToken, InputError> {
        if let Err(e) = meta.validate(self.config.max_upload_bytes) {
            self.notify(NoticeKind::Error, e.to_string());
            return Err(e);
        }
        let token = self.issue_token();
        self.pending_file = Some(token);
        Ok(token)
    }

    pub fn file_loaded(&mut self, token: SessionToken, meta: &FileMeta, bytes: &[u8]) -> Completion {
        if self.pending_file != Some(token) || self.stage != Stage::Upload {
            log::warn!("Discarding file read for stale request {:?}", token);
            return Completion::Discarded;
        }
        self.pending_file = None;

        match CapturedImage::from_file(meta, bytes) {
            Ok(image) => {
                self.image = Some(image);
                self.focus = Some(Focus::SubmitButton);
            }
            Err(e) => self.notify(NoticeKind::Error, e.to_string()),
        }
        Completion::Applied(self.stage)
    }

    pub fn file_failed(&mut self, token: SessionToken, reason: &str) -> Completion {
        if self.pending_file != Some(token) {
            return Completion::Discarded;
        }
        self.pending_file = None;
        let error = InputError::Unreadable(reason.to_string());
        log::warn!("File read failed: {}", reason);
        self.notify(NoticeKind::Error, error.to_string());
        Completion::Applied(self.stage)
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Send the held image for analysis.
    pub fn submit_image(&mut self, now: f64) -> Option<Submission> {
        if self.in_flight.is_some() {
            log::debug!("Submit ignored, a request is already in flight");
            return None;
        }
        let Some(image) = self.image.as_ref() else {
            self.notify(NoticeKind::Error, InputError::NoImage.to_string());
            return None;
        };
        let request = AnalysisRequest::Image {
            data_url: image.data_url().to_string(),
        };
        Some(self.begin_loading(RequestKind::Image, request, now))
    }

    /// Ask for a playlist from a free-text mood.
    pub fn submit_mood(&mut self, text: &str, now: f64) -> Option<Submission> {
        if self.in_flight.is_some() {
            log::debug!("Submit ignored, a request is already in flight");
            return None;
        }
        let text = text.trim();
        if text.is_empty() {
            self.notify(NoticeKind::Error, InputError::EmptyMood.to_string());
            self.focus = Some(Focus::MoodInput);
            return None;
        }
        let request = AnalysisRequest::Mood { text: text.to_string() };
        Some(self.begin_loading(RequestKind::Mood, request, now))
    }

    fn begin_loading(&mut self, kind: RequestKind, request: AnalysisRequest, now: f64) -> Submission {
        let token = self.issue_token();
        self.in_flight = Some(InFlight {
            token,
            kind,
            failure_text: request.failure_text(),
        });
        self.stage = Stage::Loading;
        self.loading_started = Some(now);
        self.countdown
            .start(self.config.countdown_seconds, self.reduced_motion, now);
        log::info!("Submission {:?} started ({})", token, request.path());
        Submission { token, request }
    }

    /// Feed the countdown. Returns `None` once it no longer needs ticks.
    pub fn tick(&mut self, now: f64) -> Option<CountdownDisplay> {
        self.countdown.tick(now)
    }

    /// The request for `token` finished.
    pub fn complete(
        &mut self,
        token: SessionToken,
        outcome: Result<AnalysisResult, ServiceError>,
    ) -> Completion {
        let current = match &self.in_flight {
            Some(flight) if flight.token == token && self.stage == Stage::Loading => flight.clone(),
            _ => {
                log::warn!("Discarding stale completion {:?}", token);
                return Completion::Discarded;
            }
        };
        self.in_flight = None;
        self.loading_started = None;

        match outcome {
            Ok(result) => {
                log::info!("Submission {:?} succeeded: {}", token, result.emotion);
                self.countdown.mark_done();
                self.summary = curator_summary(&result.curator_summary, &result.description);
                self.result = Some(result);
                self.stage = Stage::Results;
            }
            Err(e) => {
                log::error!("Submission {:?} failed: {}", token, e);
                let message = e
                    .service_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| current.failure_text.to_string());
                self.notify(NoticeKind::Error, message);
                self.countdown.stop();
                self.summary = None;
                self.stage = Stage::Upload;
            }
        }
        Completion::Applied(self.stage)
    }

    // ------------------------------------------------------------------------
    // Reset, share, teardown
    // ------------------------------------------------------------------------

    /// Back to a clean Upload stage from anywhere. Outstanding work is
    /// orphaned: its completion will no longer match.
    pub fn reset(&mut self) {
        self.camera.release();
        self.pending_camera = None;
        self.pending_file = None;
        self.image = None;
        self.result = None;
        self.summary = None;
        self.countdown.stop();
        self.loading_started = None;
        if let Some(flight) = self.in_flight.take() {
            log::info!("Reset orphaned submission {:?}", flight.token);
        }
        self.stage = Stage::Upload;
    }

    /// Compose the share text for the last result.
    pub fn share(&mut self, page_url: &str) -> Option<ShareRequest> {
        let Some(result) = self.result.as_ref() else {
            self.notify(NoticeKind::Info, NOTHING_TO_SHARE);
            return None;
        };
        Some(ShareRequest {
            title: SHARE_TITLE.to_string(),
            text: share_digest(result),
            url: page_url.to_string(),
        })
    }

    pub fn share_finished(&mut self, outcome: ShareOutcome) {
        match outcome {
            ShareOutcome::Shared => {}
            ShareOutcome::ShareCancelled => self.notify(NoticeKind::Info, SHARE_CANCELLED),
            ShareOutcome::Copied => self.notify(NoticeKind::Success, COPIED),
            ShareOutcome::CopyFailed => self.notify(NoticeKind::Error, COPY_FAILED),
        }
    }

    /// The page is going away: let go of hardware.
    pub fn teardown(&mut self) {
        self.camera.release();
        self.pending_camera = None;
        self.countdown.stop();
    }

    /// Phase of the countdown, for invariants in tests and logs.
    pub fn countdown_phase(&self) -> CountdownPhase {
        self.countdown.phase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::decode_body;
    use crate::capture::RgbaFrame;
    use std::cell::Cell;
    use std::rc::Rc;

    struct TestStream {
        stops: Rc<Cell<u32>>,
        ready: bool,
    }

    impl MediaStream for TestStream {
        fn stop_tracks(&mut self) {
            self.stops.set(self.stops.get() + 1);
        }

        fn frame(&mut self) -> Option<RgbaFrame> {
            self.ready.then(|| RgbaFrame::new(2, 2, vec![128; 16]))
        }
    }

    fn controller() -> WorkflowController<TestStream> {
        WorkflowController::new(ClientConfig::default(), false)
    }

    fn with_image(ctrl: &mut WorkflowController<TestStream>) {
        let meta = FileMeta::new("me.png", "image/png", 4);
        let token = ctrl.select_file(&meta).unwrap();
        ctrl.file_loaded(token, &meta, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_submit_without_image() {
        let mut ctrl = controller();
        assert!(ctrl.submit_image(0.0).is_none());
        assert_eq!(ctrl.stage(), Stage::Upload);
        assert_eq!(ctrl.drain_notices()[0].message, "Choose or capture a photo first.");
    }

    #[test]
    fn test_success_marks_done_then_results() {
        let mut ctrl = controller();
        with_image(&mut ctrl);
        let submission = ctrl.submit_image(0.0).unwrap();
        assert_eq!(ctrl.stage(), Stage::Loading);
        assert!(ctrl.is_busy());
        assert!(!ctrl.view(0.0).submit_enabled);

        let result = decode_body(r#"{"emotion":"happy"}"#, "").unwrap();
        assert_eq!(ctrl.complete(submission.token, Ok(result)), Completion::Applied(Stage::Results));
        assert_eq!(ctrl.countdown_phase(), CountdownPhase::Done);
        assert!(ctrl.view(1.0).result.is_some());
    }

    #[test]
    fn test_failure_returns_to_upload() {
        let mut ctrl = controller();
        let submission = ctrl.submit_mood("gloomy", 0.0).unwrap();
        ctrl.tick(3.0);
        ctrl.complete(submission.token, Err(ServiceError::Transport("offline".into())));

        assert_eq!(ctrl.stage(), Stage::Upload);
        assert_ne!(ctrl.countdown_phase(), CountdownPhase::Done);
        assert!(!ctrl.countdown().display().visible);
        let notices = ctrl.drain_notices();
        assert_eq!(notices[0].message, "Could not build a playlist. Try again.");
        assert_eq!(notices[0].kind, NoticeKind::Error);
    }

    #[test]
    fn test_concurrent_submission_rejected() {
        let mut ctrl = controller();
        assert!(ctrl.submit_mood("one", 0.0).is_some());
        assert!(ctrl.submit_mood("two", 0.5).is_none());
    }

    #[test]
    fn test_stale_completion_after_reset() {
        let mut ctrl = controller();
        let first = ctrl.submit_mood("first", 0.0).unwrap();
        ctrl.reset();
        let second = ctrl.submit_mood("second", 1.0).unwrap();

        let stale = decode_body(r#"{"emotion":"angry"}"#, "first").unwrap();
        assert_eq!(ctrl.complete(first.token, Ok(stale)), Completion::Discarded);
        assert_eq!(ctrl.stage(), Stage::Loading);

        let fresh = decode_body(r#"{"emotion":"happy"}"#, "second").unwrap();
        ctrl.complete(second.token, Ok(fresh));
        assert_eq!(ctrl.result().unwrap().emotion, "happy");
    }

    #[test]
    fn test_empty_mood_focuses_input() {
        let mut ctrl = controller();
        assert!(ctrl.submit_mood("   ", 0.0).is_none());
        assert_eq!(ctrl.take_focus(), Some(Focus::MoodInput));
        assert_eq!(ctrl.stage(), Stage::Upload);
    }

    #[test]
    fn test_camera_capture_flow() {
        let stops = Rc::new(Cell::new(0));
        let mut ctrl = controller();
        let (token, constraints) = ctrl.start_camera().unwrap();
        assert_eq!(constraints.ideal_width, 720);

        ctrl.camera_opened(token, TestStream { stops: stops.clone(), ready: false });
        assert!(ctrl.camera_active());
        assert_eq!(ctrl.drain_notices()[0].message, CAMERA_LIVE);

        assert_eq!(ctrl.capture_photo(), Err(CameraError::NotReady));
        assert_eq!(ctrl.drain_notices()[0].kind, NoticeKind::Info);
        assert!(ctrl.image().is_none());
    }

    #[test]
    fn test_capture_releases_camera() {
        let stops = Rc::new(Cell::new(0));
        let mut ctrl = controller();
        let (token, _) = ctrl.start_camera().unwrap();
        ctrl.camera_opened(token, TestStream { stops: stops.clone(), ready: true });

        assert!(ctrl.capture_photo().is_ok());
        assert!(ctrl.image().is_some());
        assert!(!ctrl.camera_active());
        assert_eq!(stops.get(), 1);
        assert_eq!(ctrl.take_focus(), Some(Focus::SubmitButton));
    }

    #[test]
    fn test_late_camera_stream_is_released() {
        let stops = Rc::new(Cell::new(0));
        let mut ctrl = controller();
        let (token, _) = ctrl.start_camera().unwrap();
        ctrl.reset();

        let outcome = ctrl.camera_opened(token, TestStream { stops: stops.clone(), ready: true });
        assert_eq!(outcome, Completion::Discarded);
        assert_eq!(stops.get(), 1);
        assert!(!ctrl.camera_active());
    }

    #[test]
    fn test_camera_failure_keeps_upload() {
        let mut ctrl = controller();
        let (token, _) = ctrl.start_camera().unwrap();
        ctrl.camera_failed(token, &CameraError::PermissionDenied);
        assert_eq!(ctrl.stage(), Stage::Upload);
        assert!(!ctrl.camera_active());
        assert_eq!(ctrl.drain_notices()[0].message, CAMERA_FAILED);
    }

    #[test]
    fn test_loading_steps_light_up() {
        let mut ctrl = controller();
        ctrl.submit_mood("ok", 10.0).unwrap();
        assert_eq!(ctrl.loading_steps(10.5), [false, false, false]);
        assert_eq!(ctrl.loading_steps(11.0), [true, false, false]);
        assert_eq!(ctrl.loading_steps(12.8), [true, true, true]);
        ctrl.reset();
        assert_eq!(ctrl.loading_steps(12.8), [false, false, false]);
    }

    #[test]
    fn test_share_requires_result() {
        let mut ctrl = controller();
        assert!(ctrl.share("https://mood.example/").is_none());
        assert_eq!(ctrl.drain_notices()[0].message, NOTHING_TO_SHARE);
        assert_eq!(ctrl.stage(), Stage::Upload);
    }

    #[test]
    fn test_mood_box_focus_delay() {
        let mut ctrl = controller();
        assert_eq!(ctrl.open_mood_box(), 620);
        assert_eq!(ctrl.open_mood_box(), 120);
        assert!(ctrl.mood_box_open());
        assert_eq!(ctrl.take_focus(), None);
    }
}
