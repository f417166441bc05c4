//! Command dispatch around the workflow controller.
//!
//! Every raw input event becomes one [`Command`]. [`Session::dispatch`] applies
//! it to the controller and performs the asynchronous side effects (camera,
//! network, share sheet). The controller sits behind `Rc<RefCell<_>>` and is
//! only ever borrowed between awaits, so a second command (say, a reset) can
//! run while a request is still in flight.

use std::cell::RefCell;
use std::rc::Rc;

use crate::api::AnalysisService;
use crate::capture::FileMeta;
use crate::countdown::CountdownDisplay;
use crate::media::{acquire, MediaDevices};
use crate::workflow::{
    Completion, Focus, SessionToken, ShareOutcome, ShareRequest, Submission, WorkflowController,
};

/// One user intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartCamera,
    CapturePhoto,
    /// A file was picked; it is validated before anything is read.
    SelectFile(FileMeta),
    FileLoaded {
        token: SessionToken,
        meta: FileMeta,
        bytes: Vec<u8>,
    },
    FileFailed {
        token: SessionToken,
        reason: String,
    },
    SubmitImage,
    SubmitMood(String),
    Reset,
    Share,
    ApplyMoodPreset(String),
    OpenMoodBox,
    Teardown,
}

/// Follow-up work only the host can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Read the picked file and answer with `FileLoaded` or `FileFailed`.
    ReadFile(SessionToken),
    /// Focus the mood input after this many milliseconds.
    FocusMoodInput { delay_ms: u32 },
    /// Replace the mood input text.
    FillMoodInput(String),
}

/// Platform share sheet and clipboard.
#[allow(async_fn_in_trait)]
pub trait SharePlatform {
    fn can_share(&self) -> bool;

    async fn share(&self, request: &ShareRequest) -> Result<(), String>;

    async fn copy_text(&self, text: &str) -> Result<(), String>;
}

/// Neither a share sheet nor a clipboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoShare;

impl SharePlatform for NoShare {
    fn can_share(&self) -> bool {
        false
    }

    async fn share(&self, _request: &ShareRequest) -> Result<(), String> {
        Err("share sheet unavailable".to_string())
    }

    async fn copy_text(&self, _text: &str) -> Result<(), String> {
        Err("clipboard unavailable".to_string())
    }
}

pub type SharedController<D> = Rc<RefCell<WorkflowController<<D as MediaDevices>::Stream>>>;

pub struct Session<A, D, P>
where
    A: AnalysisService,
    D: MediaDevices,
    P: SharePlatform,
{
    controller: SharedController<D>,
    service: A,
    devices: D,
    share: P,
    clock: Box<dyn Fn() -> f64>,
    page_url: String,
    on_change: Option<Box<dyn Fn()>>,
}

impl<A, D, P> Session<A, D, P>
where
    A: AnalysisService,
    D: MediaDevices,
    P: SharePlatform,
{
    /// `clock` returns the current time in seconds.
    pub fn new(
        controller: WorkflowController<D::Stream>,
        service: A,
        devices: D,
        share: P,
        clock: impl Fn() -> f64 + 'static,
    ) -> Self {
        Self {
            controller: Rc::new(RefCell::new(controller)),
            service,
            devices,
            share,
            clock: Box::new(clock),
            page_url: String::new(),
            on_change: None,
        }
    }

    pub fn controller(&self) -> SharedController<D> {
        self.controller.clone()
    }

    pub fn service(&self) -> &A {
        &self.service
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn share_platform(&self) -> &P {
        &self.share
    }

    pub fn set_page_url(&mut self, url: impl Into<String>) {
        self.page_url = url.into();
    }

    /// Called after every state change, with no borrow held.
    pub fn set_on_change(&mut self, callback: impl Fn() + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub fn now(&self) -> f64 {
        (self.clock)()
    }

    fn changed(&self) {
        if let Some(callback) = &self.on_change {
            callback();
        }
    }

    /// Advance the countdown. Returns `None` once it has stopped ticking.
    pub fn tick(&self) -> Option<CountdownDisplay> {
        let now = self.now();
        let display = self.controller.borrow_mut().tick(now);
        if display.is_some() {
            self.changed();
        }
        display
    }

    pub async fn dispatch(&self, command: Command) -> Effect {
        log::debug!("Dispatch {:?}", CommandName(&command));

        match command {
            Command::StartCamera => {
                self.start_camera().await;
                Effect::None
            }
            Command::CapturePhoto => {
                // Failures are already reported as notices
                let _ = self.controller.borrow_mut().capture_photo();
                self.changed();
                Effect::None
            }
            Command::SelectFile(meta) => {
                let ticket = self.controller.borrow_mut().select_file(&meta);
                self.changed();
                match ticket {
                    Ok(token) => Effect::ReadFile(token),
                    Err(_) => Effect::None,
                }
            }
            Command::FileLoaded { token, meta, bytes } => {
                self.controller.borrow_mut().file_loaded(token, &meta, &bytes);
                self.changed();
                Effect::None
            }
            Command::FileFailed { token, reason } => {
                self.controller.borrow_mut().file_failed(token, &reason);
                self.changed();
                Effect::None
            }
            Command::SubmitImage => {
                let now = self.now();
                let submission = self.controller.borrow_mut().submit_image(now);
                self.changed();
                if let Some(submission) = submission {
                    self.run(submission).await;
                }
                Effect::None
            }
            Command::SubmitMood(text) => {
                let now = self.now();
                let submission = self.controller.borrow_mut().submit_mood(&text, now);
                self.changed();
                match submission {
                    Some(submission) => {
                        self.run(submission).await;
                        Effect::None
                    }
                    None => {
                        let focus = self.controller.borrow_mut().take_focus();
                        if focus == Some(Focus::MoodInput) {
                            Effect::FocusMoodInput { delay_ms: 0 }
                        } else {
                            Effect::None
                        }
                    }
                }
            }
            Command::Reset => {
                self.controller.borrow_mut().reset();
                self.changed();
                Effect::None
            }
            Command::Share => {
                self.share().await;
                Effect::None
            }
            Command::ApplyMoodPreset(preset) => {
                let text = self.controller.borrow_mut().apply_mood_preset(&preset);
                Effect::FillMoodInput(text)
            }
            Command::OpenMoodBox => {
                let delay_ms = self.controller.borrow_mut().open_mood_box();
                self.changed();
                Effect::FocusMoodInput { delay_ms }
            }
            Command::Teardown => {
                self.controller.borrow_mut().teardown();
                Effect::None
            }
        }
    }

    async fn start_camera(&self) {
        let request = self.controller.borrow_mut().start_camera();
        let Some((token, constraints)) = request else {
            return;
        };
        self.changed();

        let opened = acquire(&self.devices, &constraints).await;

        let completion = {
            let mut controller = self.controller.borrow_mut();
            match opened {
                Ok(stream) => controller.camera_opened(token, stream),
                Err(e) => controller.camera_failed(token, &e),
            }
        };
        if completion != Completion::Discarded {
            self.changed();
        }
    }

    async fn run(&self, submission: Submission) {
        let outcome = self.service.analyze(&submission.request).await;
        let completion = self.controller.borrow_mut().complete(submission.token, outcome);
        if completion != Completion::Discarded {
            self.changed();
        }
    }

    async fn share(&self) {
        let request = self.controller.borrow_mut().share(&self.page_url);
        let Some(request) = request else {
            self.changed();
            return;
        };

        let outcome = if self.share.can_share() {
            match self.share.share(&request).await {
                Ok(()) => ShareOutcome::Shared,
                Err(e) => {
                    log::info!("Share sheet dismissed: {}", e);
                    ShareOutcome::ShareCancelled
                }
            }
        } else {
            match self.share.copy_text(&request.clipboard_text()).await {
                Ok(()) => ShareOutcome::Copied,
                Err(e) => {
                    log::warn!("Clipboard write failed: {}", e);
                    ShareOutcome::CopyFailed
                }
            }
        };

        self.controller.borrow_mut().share_finished(outcome);
        self.changed();
    }
}

/// Logs a command without dumping file contents.
struct CommandName<'a>(&'a Command);

impl std::fmt::Debug for CommandName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            Command::StartCamera => "StartCamera",
            Command::CapturePhoto => "CapturePhoto",
            Command::SelectFile(_) => "SelectFile",
            Command::FileLoaded { .. } => "FileLoaded",
            Command::FileFailed { .. } => "FileFailed",
            Command::SubmitImage => "SubmitImage",
            Command::SubmitMood(_) => "SubmitMood",
            Command::Reset => "Reset",
            Command::Share => "Share",
            Command::ApplyMoodPreset(_) => "ApplyMoodPreset",
            Command::OpenMoodBox => "OpenMoodBox",
            Command::Teardown => "Teardown",
        };
        f.write_str(name)
    }
}
