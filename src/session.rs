// Session module for the camera lifecycle and the controls that follow it

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};

use crate::capture::{MediaCapture, SharedStream, StreamConstraints, VideoSurface};
use crate::error::Result;

/// Caption of the start control
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartCaption {
    Start,
    Restart,
}

impl StartCaption {
    pub fn text(self) -> &'static str {
        match self {
            StartCaption::Start => "Start Camera",
            StartCaption::Restart => "Restart Camera",
        }
    }
}

/// Enablement and captions of the booth controls.
///
/// Capture and reset are enabled exactly while a session is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Controls {
    pub start_caption: StartCaption,
    pub capture_enabled: bool,
    pub reset_enabled: bool,
}

impl Controls {
    pub fn idle() -> Self {
        Self {
            start_caption: StartCaption::Start,
            capture_enabled: false,
            reset_enabled: false,
        }
    }

    pub fn active() -> Self {
        Self {
            start_caption: StartCaption::Restart,
            capture_enabled: true,
            reset_enabled: true,
        }
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// One acquired camera stream, from successful start until teardown
pub struct Session {
    id: u64,
    stream: SharedStream,
}

impl Session {
    /// Binds the stream to the surface and starts playback
    pub async fn init(id: u64, stream: SharedStream, surface: &mut VideoSurface) -> Result<Self> {
        let session = Self { id, stream };
        surface.bind(session.stream.clone());
        if let Err(e) = surface.play().await {
            session.teardown(surface);
            return Err(e);
        }
        Ok(session)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn live_tracks(&self) -> usize {
        self.stream.borrow().live_tracks()
    }

    /// Stops every track and clears the surface
    pub fn teardown(self, surface: &mut VideoSurface) {
        surface.pause();
        surface.detach();
        // Drop stops the tracks
        drop(self);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stream.borrow_mut().stop_tracks();
        debug!(session = self.id, "session released");
    }
}

/// Owns camera acquisition and release plus the control state
pub struct SessionController {
    capture: Box<dyn MediaCapture>,
    constraints: StreamConstraints,
    surface: VideoSurface,
    session: Option<Session>,
    controls: Controls,
    next_id: u64,
}

impl SessionController {
    pub fn new(capture: Box<dyn MediaCapture>, constraints: StreamConstraints) -> Self {
        Self {
            capture,
            constraints,
            surface: VideoSurface::new(),
            session: None,
            controls: Controls::idle(),
            next_id: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.session.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn surface(&self) -> &VideoSurface {
        &self.surface
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Acquires a camera stream and starts showing it.
    ///
    /// A running session is released before the new stream is requested, so
    /// a failed restart leaves the controller idle with controls disabled.
    pub async fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            info!("restarting camera session");
            self.release();
        }

        let stream = self.capture.request_stream(&self.constraints).await?;
        let stream: SharedStream = Rc::new(RefCell::new(stream));

        let id = self.next_id;
        self.next_id += 1;
        let session = Session::init(id, stream, &mut self.surface).await?;

        info!(session = id, "camera session active");
        self.session = Some(session);
        self.controls = Controls::active();
        Ok(())
    }

    /// Stops the session if any and returns controls to their initial state
    pub fn reset(&mut self) {
        if self.session.is_some() {
            info!("resetting camera session");
        }
        self.release();
    }

    fn release(&mut self) {
        self.controls = Controls::idle();
        match self.session.take() {
            Some(session) => session.teardown(&mut self.surface),
            None => {
                self.surface.pause();
                self.surface.detach();
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.release();
    }
}
