//! End-to-end workflow scenarios through the session, with scripted
//! platform and service fakes.
//!
//! Run with: cargo test --test workflow_scenarios

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use moodmusic::analysis::AnalysisResult;
use moodmusic::api::{interpret_response, AnalysisRequest, AnalysisService};
use moodmusic::capture::{FileMeta, RgbaFrame};
use moodmusic::config::ClientConfig;
use moodmusic::countdown::{CountdownPhase, CAPTION_READY};
use moodmusic::error::{CameraError, ServiceError};
use moodmusic::media::{CameraConstraints, MediaDevices, MediaStream};
use moodmusic::session::{Command, Effect, Session, SharePlatform};
use moodmusic::workflow::{
    Completion, Focus, Notice, NoticeKind, ShareRequest, Stage, WorkflowController, CAMERA_FAILED,
    CAMERA_LIVE, COPIED, NOTHING_TO_SHARE,
};

// ============================================================================
// Fakes
// ============================================================================

/// Answers each request with the next scripted `(status, body)`.
#[derive(Default)]
struct ScriptedService {
    replies: RefCell<VecDeque<(u16, String)>>,
    requests: RefCell<Vec<AnalysisRequest>>,
}

impl ScriptedService {
    fn replying(status: u16, body: &str) -> Self {
        let service = Self::default();
        service.replies.borrow_mut().push_back((status, body.to_string()));
        service
    }
}

impl AnalysisService for ScriptedService {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ServiceError> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self.replies.borrow_mut().pop_front();
        match reply {
            Some((status, body)) => interpret_response(status, &body, request),
            None => Err(ServiceError::Transport("connection refused".to_string())),
        }
    }
}

struct FakeStream {
    stops: Rc<Cell<u32>>,
    ready: bool,
}

impl MediaStream for FakeStream {
    fn stop_tracks(&mut self) {
        self.stops.set(self.stops.get() + 1);
    }

    fn frame(&mut self) -> Option<RgbaFrame> {
        self.ready.then(|| RgbaFrame::new(4, 3, vec![200; 4 * 3 * 4]))
    }
}

struct FakeCamera {
    stops: Rc<Cell<u32>>,
    refuse: Option<CameraError>,
    ready: bool,
    requested: RefCell<Vec<CameraConstraints>>,
}

impl FakeCamera {
    fn working() -> Self {
        Self {
            stops: Rc::new(Cell::new(0)),
            refuse: None,
            ready: true,
            requested: RefCell::new(Vec::new()),
        }
    }

    fn denied() -> Self {
        Self {
            refuse: Some(CameraError::PermissionDenied),
            ..Self::working()
        }
    }
}

impl MediaDevices for FakeCamera {
    type Stream = FakeStream;

    async fn open(&self, constraints: &CameraConstraints) -> Result<FakeStream, CameraError> {
        self.requested.borrow_mut().push(constraints.clone());
        match &self.refuse {
            Some(e) => Err(e.clone()),
            None => Ok(FakeStream {
                stops: self.stops.clone(),
                ready: self.ready,
            }),
        }
    }
}

#[derive(Default)]
struct RecordingShare {
    sheet: bool,
    shared: RefCell<Vec<ShareRequest>>,
    copied: RefCell<Vec<String>>,
}

impl SharePlatform for RecordingShare {
    fn can_share(&self) -> bool {
        self.sheet
    }

    async fn share(&self, request: &ShareRequest) -> Result<(), String> {
        self.shared.borrow_mut().push(request.clone());
        Ok(())
    }

    async fn copy_text(&self, text: &str) -> Result<(), String> {
        self.copied.borrow_mut().push(text.to_string());
        Ok(())
    }
}

type TestSession = Session<ScriptedService, FakeCamera, RecordingShare>;

struct Harness {
    session: TestSession,
    clock: Rc<Cell<f64>>,
    changes: Rc<Cell<u32>>,
}

impl Harness {
    fn new(service: ScriptedService, camera: FakeCamera, share: RecordingShare) -> Self {
        Self::with_motion(service, camera, share, false)
    }

    fn with_motion(service: ScriptedService, camera: FakeCamera, share: RecordingShare, reduced: bool) -> Self {
        let clock = Rc::new(Cell::new(100.0));
        let changes = Rc::new(Cell::new(0));

        let now = clock.clone();
        let controller = WorkflowController::new(ClientConfig::default(), reduced);
        let mut session = Session::new(controller, service, camera, share, move || now.get());
        session.set_page_url("https://moodmusic.example/");

        let counter = changes.clone();
        session.set_on_change(move || counter.set(counter.get() + 1));

        Self { session, clock, changes }
    }

    fn run(&self, command: Command) -> Effect {
        pollster::block_on(self.session.dispatch(command))
    }

    fn stage(&self) -> Stage {
        self.session.controller().borrow().stage()
    }

    fn notices(&self) -> Vec<Notice> {
        self.session.controller().borrow_mut().drain_notices()
    }

    /// Pick and read a small PNG file.
    fn upload(&self) {
        let meta = FileMeta::new("selfie.png", "image/png", 8);
        let Effect::ReadFile(token) = self.run(Command::SelectFile(meta.clone())) else {
            panic!("file was not accepted");
        };
        self.run(Command::FileLoaded {
            token,
            meta,
            bytes: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
        });
    }
}

fn service_ok(body: &str) -> ScriptedService {
    ScriptedService::replying(200, body)
}

const HAPPY: &str = r#"{
    "emotion": "happy",
    "description": "Bright and open",
    "confidence": 87.6,
    "all_emotions": {"happy": 87.6, "neutral": 9.1, "sad": 3.3},
    "songs": [
        {"title": "Good as Hell", "artist": "Lizzo", "reason": "Pure joy",
         "youtube_link": "https://youtube.com/watch?v=1", "spotify_search": "https://open.spotify.com/search/1"},
        {"title": "Walking on Sunshine", "artist": "Katrina and the Waves"},
        {"title": "Happy", "artist": "Pharrell Williams"},
        {"title": "Dancing Queen", "artist": "ABBA"}
    ],
    "curator_summary": "Sunny picks for a sunny face."
}"#;

// ============================================================================
// Upload validation
// ============================================================================

#[test]
fn test_rejects_non_image_file() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    let effect = h.run(Command::SelectFile(FileMeta::new("notes.pdf", "application/pdf", 1024)));

    assert_eq!(effect, Effect::None);
    assert_eq!(h.stage(), Stage::Upload);
    assert_eq!(
        h.notices(),
        vec![Notice::new(NoticeKind::Error, "Please choose an image file (jpg, png, heic).")]
    );
    assert!(h.session.controller().borrow().image().is_none());
}

#[test]
fn test_rejects_oversized_file() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    let effect = h.run(Command::SelectFile(FileMeta::new("huge.jpg", "image/jpeg", 5 * 1024 * 1024 + 1)));

    assert_eq!(effect, Effect::None);
    assert_eq!(
        h.notices(),
        vec![Notice::new(NoticeKind::Error, "Image is too large. Keep it under 5MB.")]
    );
}

#[test]
fn test_exact_limit_is_accepted() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    let effect = h.run(Command::SelectFile(FileMeta::new("edge.jpg", "image/jpeg", 5 * 1024 * 1024)));

    assert!(matches!(effect, Effect::ReadFile(_)));
    assert!(h.notices().is_empty());
}

#[test]
fn test_loaded_file_becomes_preview() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    h.upload();

    let view = h.session.controller().borrow().view(h.clock.get());
    assert!(view.preview.as_deref().unwrap().starts_with("data:image/png;base64,"));
    assert!(view.submit_enabled);
    assert_eq!(h.session.controller().borrow_mut().take_focus(), Some(Focus::SubmitButton));
}

#[test]
fn test_read_for_replaced_selection_is_dropped() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());
    let first = FileMeta::new("first.png", "image/png", 4);
    let second = FileMeta::new("second.png", "image/png", 4);

    let Effect::ReadFile(stale) = h.run(Command::SelectFile(first.clone())) else {
        panic!("first file rejected");
    };
    let Effect::ReadFile(_current) = h.run(Command::SelectFile(second)) else {
        panic!("second file rejected");
    };
    h.run(Command::FileLoaded {
        token: stale,
        meta: first,
        bytes: vec![1, 2, 3, 4],
    });

    assert!(h.session.controller().borrow().image().is_none());
}

#[test]
fn test_submit_without_image() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    h.run(Command::SubmitImage);

    assert_eq!(h.stage(), Stage::Upload);
    assert_eq!(h.notices(), vec![Notice::new(NoticeKind::Error, "Choose or capture a photo first.")]);
    assert!(h.session.service().requests.borrow().is_empty());
}

// ============================================================================
// Submissions
// ============================================================================

#[test]
fn test_photo_analysis_success() {
    let h = Harness::new(service_ok(HAPPY), FakeCamera::working(), RecordingShare::default());
    h.upload();

    h.run(Command::SubmitImage);

    assert_eq!(h.stage(), Stage::Results);
    let requests = h.session.service().requests.borrow();
    assert!(matches!(&requests[0], AnalysisRequest::Image { data_url } if data_url.starts_with("data:image/png")));

    let controller = h.session.controller();
    let controller = controller.borrow();
    assert_eq!(controller.countdown_phase(), CountdownPhase::Done);
    let view = controller.view(h.clock.get());
    assert_eq!(view.countdown.caption, CAPTION_READY);
    assert_eq!(view.countdown.progress_pct, 100.0);

    let result = view.result.unwrap();
    assert_eq!(result.title, "Your Mood: Happy");
    assert_eq!(result.icon, "fa-face-grin-stars");
    assert_eq!(result.confidence_pct, 88);
    assert_eq!(result.confidence_text, "88% confident");
    assert_eq!(result.breakdown, vec!["happy: 87.6%", "neutral: 9.1%", "sad: 3.3%"]);
    assert_eq!(result.tracks.len(), 4);
    assert_eq!(result.tracks[1].reason, "Handpicked for your vibe.");
    assert_eq!(result.tracks[1].youtube, "#");
    assert_eq!(result.tracks[3].delay_ms, 360);
    assert_eq!(view.curator_summary.as_deref(), Some("Sunny picks for a sunny face."));
}

#[test]
fn test_mood_success_fills_defaults() {
    let h = Harness::new(
        service_ok(r#"{"songs":[{"title":"Holocene"}]}"#),
        FakeCamera::working(),
        RecordingShare::default(),
    );

    h.run(Command::SubmitMood("  quiet rainy sunday  ".to_string()));

    assert_eq!(h.stage(), Stage::Results);
    assert_eq!(
        h.session.service().requests.borrow()[0],
        AnalysisRequest::Mood {
            text: "quiet rainy sunday".to_string()
        }
    );

    let controller = h.session.controller();
    let controller = controller.borrow();
    let result = controller.result().unwrap();
    assert_eq!(result.emotion, "neutral");
    assert_eq!(result.description, "quiet rainy sunday");
    assert_eq!(result.confidence, 0.0);
    assert!(result.breakdown.is_empty());
    assert_eq!(result.tracks[0].artist, "Unknown artist");

    let view = controller.view(h.clock.get());
    assert_eq!(view.result.unwrap().icon, "fa-face-meh");
    // The description stands in for the missing summary
    assert_eq!(view.curator_summary.as_deref(), Some("quiet rainy sunday"));
}

#[test]
fn test_empty_mood_asks_for_input() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    let effect = h.run(Command::SubmitMood("   ".to_string()));

    assert_eq!(effect, Effect::FocusMoodInput { delay_ms: 0 });
    assert_eq!(h.stage(), Stage::Upload);
    assert_eq!(
        h.notices(),
        vec![Notice::new(NoticeKind::Error, "Type a few words about your mood first.")]
    );
}

#[test]
fn test_service_rejection_shows_its_message() {
    let h = Harness::new(
        ScriptedService::replying(400, r#"{"error":"No face detected"}"#),
        FakeCamera::working(),
        RecordingShare::default(),
    );
    h.upload();

    h.run(Command::SubmitImage);

    assert_eq!(h.stage(), Stage::Upload);
    assert_eq!(h.notices(), vec![Notice::new(NoticeKind::Error, "No face detected")]);

    let controller = h.session.controller();
    let controller = controller.borrow();
    assert_ne!(controller.countdown_phase(), CountdownPhase::Done);
    let view = controller.view(h.clock.get());
    assert!(!view.countdown.visible);
    assert_eq!(view.curator_summary, None);
    // The photo is kept for another try
    assert!(view.submit_enabled);
}

#[test]
fn test_error_field_wins_over_success_status() {
    let h = Harness::new(
        service_ok(r#"{"emotion":"happy","error":"Quota exceeded"}"#),
        FakeCamera::working(),
        RecordingShare::default(),
    );

    h.run(Command::SubmitMood("hyped".to_string()));

    assert_eq!(h.stage(), Stage::Upload);
    assert_eq!(h.notices(), vec![Notice::new(NoticeKind::Error, "Quota exceeded")]);
}

#[test]
fn test_status_without_message_uses_generic_text() {
    let h = Harness::new(
        ScriptedService::replying(502, "<html>Bad Gateway</html>"),
        FakeCamera::working(),
        RecordingShare::default(),
    );

    h.run(Command::SubmitMood("stressed".to_string()));

    assert_eq!(
        h.notices(),
        vec![Notice::new(NoticeKind::Error, "Could not build a playlist. Try again.")]
    );
    assert!(!h.session.controller().borrow().view(h.clock.get()).mood_submit_busy);
}

#[test]
fn test_transport_failure_uses_generic_text() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());
    h.upload();

    h.run(Command::SubmitImage);

    assert_eq!(h.stage(), Stage::Upload);
    assert_eq!(
        h.notices(),
        vec![Notice::new(NoticeKind::Error, "Mood analysis failed. Please try again.")]
    );
}

#[test]
fn test_every_change_is_published() {
    let h = Harness::new(service_ok(HAPPY), FakeCamera::working(), RecordingShare::default());

    h.run(Command::SubmitMood("sunny".to_string()));

    // Entering Loading, then the result
    assert!(h.changes.get() >= 2);
}

// ============================================================================
// Countdown and stale completions
// ============================================================================

#[test]
fn test_reduced_motion_shortens_countdown() {
    let mut controller: WorkflowController<FakeStream> = WorkflowController::new(ClientConfig::default(), true);

    controller.submit_mood("calm", 10.0).unwrap();

    let view = controller.view(10.0);
    assert_eq!(view.countdown.phase, CountdownPhase::Running);
    assert_eq!(view.countdown.remaining, 12);
    assert_eq!(view.countdown.digits(), "12");
}

#[test]
fn test_countdown_runs_into_overtime() {
    let mut controller: WorkflowController<FakeStream> = WorkflowController::new(ClientConfig::default(), false);
    controller.submit_mood("calm", 0.0).unwrap();

    let halfway = controller.tick(9.0).unwrap();
    assert_eq!(halfway.remaining, 9);
    assert_eq!(controller.loading_steps(9.0), [true, true, true]);

    let over = controller.tick(18.5).unwrap();
    assert_eq!(over.phase, CountdownPhase::Overtime);
    assert_eq!(over.remaining, 0);
    assert_eq!(controller.tick(25.0), None);
}

#[test]
fn test_completion_after_reset_is_discarded() {
    let mut controller: WorkflowController<FakeStream> = WorkflowController::new(ClientConfig::default(), false);
    let submission = controller.submit_mood("restless", 0.0).unwrap();

    controller.reset();
    let late = moodmusic::analysis::decode_body(HAPPY, "restless").unwrap();
    let completion = controller.complete(submission.token, Ok(late));

    assert_eq!(completion, Completion::Discarded);
    assert_eq!(controller.stage(), Stage::Upload);
    assert!(controller.result().is_none());
    assert!(controller.drain_notices().is_empty());
}

#[test]
fn test_second_submit_while_loading_is_ignored() {
    let mut controller: WorkflowController<FakeStream> = WorkflowController::new(ClientConfig::default(), false);

    assert!(controller.submit_mood("one", 0.0).is_some());
    assert!(controller.submit_mood("two", 0.5).is_none());
    assert!(controller.is_busy());
}

// ============================================================================
// Camera
// ============================================================================

#[test]
fn test_camera_capture_releases_stream() {
    let camera = FakeCamera::working();
    let stops = camera.stops.clone();
    let h = Harness::new(ScriptedService::default(), camera, RecordingShare::default());

    h.run(Command::StartCamera);
    assert_eq!(h.notices(), vec![Notice::new(NoticeKind::Success, CAMERA_LIVE)]);
    assert!(h.session.controller().borrow().camera_active());

    h.run(Command::CapturePhoto);

    let controller = h.session.controller();
    let controller = controller.borrow();
    assert!(!controller.camera_active());
    assert_eq!(stops.get(), 1);
    assert_eq!(controller.image().unwrap().mime(), "image/jpeg");
}

#[test]
fn test_camera_requests_configured_constraints() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    h.run(Command::StartCamera);

    let requested = h.session.devices_requested();
    assert_eq!(requested, vec![CameraConstraints::default()]);
}

#[test]
fn test_camera_denied_reports_and_stays() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::denied(), RecordingShare::default());

    h.run(Command::StartCamera);

    assert_eq!(h.notices(), vec![Notice::new(NoticeKind::Error, CAMERA_FAILED)]);
    assert_eq!(h.stage(), Stage::Upload);
    assert!(!h.session.controller().borrow().camera_active());
}

#[test]
fn test_capture_before_first_frame() {
    let camera = FakeCamera {
        ready: false,
        ..FakeCamera::working()
    };
    let h = Harness::new(ScriptedService::default(), camera, RecordingShare::default());

    h.run(Command::StartCamera);
    h.notices();
    h.run(Command::CapturePhoto);

    assert_eq!(h.notices()[0].kind, NoticeKind::Info);
    assert!(h.session.controller().borrow().camera_active());
}

#[test]
fn test_teardown_stops_camera_once() {
    let camera = FakeCamera::working();
    let stops = camera.stops.clone();
    let h = Harness::new(ScriptedService::default(), camera, RecordingShare::default());

    h.run(Command::StartCamera);
    h.run(Command::Teardown);
    h.run(Command::Teardown);

    assert_eq!(stops.get(), 1);
}

#[test]
fn test_reset_releases_camera_and_image() {
    let camera = FakeCamera::working();
    let stops = camera.stops.clone();
    let h = Harness::new(ScriptedService::default(), camera, RecordingShare::default());
    h.upload();
    h.run(Command::StartCamera);

    h.run(Command::Reset);

    let view = h.session.controller().borrow().view(h.clock.get());
    assert_eq!(stops.get(), 1);
    assert!(!view.camera_active);
    assert_eq!(view.preview, None);
}

// ============================================================================
// Mood box and sharing
// ============================================================================

#[test]
fn test_mood_box_focus_delays() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    assert_eq!(h.run(Command::OpenMoodBox), Effect::FocusMoodInput { delay_ms: 620 });
    assert_eq!(h.run(Command::OpenMoodBox), Effect::FocusMoodInput { delay_ms: 120 });
    assert!(h.session.controller().borrow().view(h.clock.get()).mood_box_open);
}

#[test]
fn test_preset_fills_input() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    let effect = h.run(Command::ApplyMoodPreset("Need a focus boost".to_string()));

    assert_eq!(effect, Effect::FillMoodInput("Need a focus boost".to_string()));
}

#[test]
fn test_share_before_result() {
    let h = Harness::new(ScriptedService::default(), FakeCamera::working(), RecordingShare::default());

    h.run(Command::Share);

    assert_eq!(h.notices(), vec![Notice::new(NoticeKind::Info, NOTHING_TO_SHARE)]);
}

#[test]
fn test_share_copies_digest_without_share_sheet() {
    let h = Harness::new(service_ok(HAPPY), FakeCamera::working(), RecordingShare::default());
    h.run(Command::SubmitMood("sunny".to_string()));
    h.notices();

    h.run(Command::Share);

    assert_eq!(h.notices(), vec![Notice::new(NoticeKind::Success, COPIED)]);
    let copied = h.session.share_copied();
    assert_eq!(copied.len(), 1);
    let text = &copied[0];
    assert!(text.starts_with("MoodMusic decoded my vibe as happy. Bright and open\nTop picks:\n"));
    assert!(text.contains("1. Good as Hell – Lizzo"));
    assert!(text.contains("3. Happy – Pharrell Williams"));
    assert!(!text.contains("Dancing Queen"));
    assert!(text.ends_with("\nhttps://moodmusic.example/"));
}

#[test]
fn test_share_sheet_preferred() {
    let share = RecordingShare {
        sheet: true,
        ..RecordingShare::default()
    };
    let h = Harness::new(service_ok(HAPPY), FakeCamera::working(), share);
    h.run(Command::SubmitMood("sunny".to_string()));
    h.notices();

    h.run(Command::Share);

    assert!(h.notices().is_empty());
    assert!(h.session.share_copied().is_empty());
}

/// Read back what the fakes recorded.
trait Recorded {
    fn devices_requested(&self) -> Vec<CameraConstraints>;
    fn share_copied(&self) -> Vec<String>;
}

impl Recorded for TestSession {
    fn devices_requested(&self) -> Vec<CameraConstraints> {
        self.devices().requested.borrow().clone()
    }

    fn share_copied(&self) -> Vec<String> {
        self.share_platform().copied.borrow().clone()
    }
}
