//! Camera resource guard.
//!
//! A hardware video stream is an exclusive, leak-prone resource: while it is
//! held the camera light stays on and other applications cannot open the
//! device. [`CameraGuard`] owns at most one stream and stops every track
//! exactly once, whether through [`CameraGuard::release`] or on drop.

use crate::capture::RgbaFrame;
use crate::config::CaptureConfig;
use crate::error::CameraError;

/// Stream request sent to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub facing_mode: String,
}

impl From<&CaptureConfig> for CameraConstraints {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            ideal_width: config.ideal_width,
            ideal_height: config.ideal_height,
            facing_mode: config.facing_mode.clone(),
        }
    }
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

/// A live, bound and playing video stream.
pub trait MediaStream {
    /// Stop every underlying track. Called at most once per stream.
    fn stop_tracks(&mut self);

    /// The most recent decoded frame, or `None` while the video has no
    /// dimensions yet.
    fn frame(&mut self) -> Option<RgbaFrame>;
}

/// Platform camera access.
#[allow(async_fn_in_trait)]
pub trait MediaDevices {
    type Stream: MediaStream;

    /// Open a stream and bind it to the preview. Must not leave anything bound
    /// when it fails.
    async fn open(&self, constraints: &CameraConstraints) -> Result<Self::Stream, CameraError>;
}

/// Request a camera stream. Failures are logged here and handed back for the
/// caller to report.
pub async fn acquire<D: MediaDevices>(
    devices: &D,
    constraints: &CameraConstraints,
) -> Result<D::Stream, CameraError> {
    log::info!(
        "Requesting camera {}x{} facing '{}'",
        constraints.ideal_width,
        constraints.ideal_height,
        constraints.facing_mode
    );
    devices.open(constraints).await.map_err(|e| {
        log::error!("Camera error: {}", e);
        e
    })
}

/// Holds the single active camera session, if any.
#[derive(Debug)]
pub struct CameraGuard<S: MediaStream> {
    stream: Option<S>,
}

impl<S: MediaStream> CameraGuard<S> {
    pub fn new() -> Self {
        Self { stream: None }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Take ownership of a freshly acquired stream. Any previous stream is
    /// released first so two sessions never coexist.
    pub fn install(&mut self, stream: S) {
        self.release();
        self.stream = Some(stream);
    }

    /// Grab the current frame from the live stream.
    pub fn snapshot(&mut self) -> Result<RgbaFrame, CameraError> {
        let stream = self.stream.as_mut().ok_or(CameraError::NoSession)?;
        match stream.frame() {
            Some(frame) if frame.width > 0 && frame.height > 0 => Ok(frame),
            _ => Err(CameraError::NotReady),
        }
    }

    /// Stop all tracks and forget the stream. Returns whether anything was
    /// released; calling it with nothing held is a no-op.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop_tracks();
                log::debug!("Camera stream released");
                true
            }
            None => false,
        }
    }
}

impl<S: MediaStream> Default for CameraGuard<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MediaStream> Drop for CameraGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Camera access for hosts without one (the native CLI).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

/// Stream type of [`NoCamera`]; never constructed.
#[derive(Debug)]
pub enum NoStream {}

impl MediaStream for NoStream {
    fn stop_tracks(&mut self) {
        match *self {}
    }

    fn frame(&mut self) -> Option<RgbaFrame> {
        match *self {}
    }
}

impl MediaDevices for NoCamera {
    type Stream = NoStream;

    async fn open(&self, _constraints: &CameraConstraints) -> Result<NoStream, CameraError> {
        Err(CameraError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeStream {
        stops: Rc<Cell<u32>>,
        width: u32,
    }

    impl MediaStream for FakeStream {
        fn stop_tracks(&mut self) {
            self.stops.set(self.stops.get() + 1);
        }

        fn frame(&mut self) -> Option<RgbaFrame> {
            Some(RgbaFrame::new(self.width, self.width, vec![0; (self.width * self.width * 4) as usize]))
        }
    }

    fn fake(width: u32) -> (FakeStream, Rc<Cell<u32>>) {
        let stops = Rc::new(Cell::new(0));
        (FakeStream { stops: stops.clone(), width }, stops)
    }

    #[test]
    fn test_release_is_idempotent() {
        let (stream, stops) = fake(2);
        let mut guard = CameraGuard::new();
        guard.install(stream);

        assert!(guard.release());
        assert!(!guard.release());
        assert_eq!(stops.get(), 1);
        assert!(!guard.is_active());
    }

    #[test]
    fn test_install_replaces_previous_stream() {
        let (first, first_stops) = fake(2);
        let (second, second_stops) = fake(2);
        let mut guard = CameraGuard::new();
        guard.install(first);
        guard.install(second);
        assert_eq!(first_stops.get(), 1);
        assert_eq!(second_stops.get(), 0);
    }

    #[test]
    fn test_drop_releases() {
        let (stream, stops) = fake(2);
        {
            let mut guard = CameraGuard::new();
            guard.install(stream);
        }
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn test_snapshot_requires_frame() {
        let mut guard: CameraGuard<FakeStream> = CameraGuard::new();
        assert_eq!(guard.snapshot().unwrap_err(), CameraError::NoSession);

        let (warming_up, _) = fake(0);
        guard.install(warming_up);
        assert_eq!(guard.snapshot().unwrap_err(), CameraError::NotReady);
    }

    #[test]
    fn test_no_camera_is_unsupported() {
        let result = pollster::block_on(acquire(&NoCamera, &CameraConstraints::default()));
        assert!(matches!(result, Err(CameraError::Unsupported)));
    }
}
