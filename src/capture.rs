// Capture module for stream acquisition, stream handles and the display surface

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::CameraConfig;
use crate::error::Result;
use crate::models::Frame;

/// Which camera the stream should prefer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// What the session asks the capture backend for
#[derive(Clone, Debug, PartialEq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub audio: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamConstraints {
    /// Video-only, user-facing stream at the configured format
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            facing: FacingMode::User,
            audio: false,
            width: config.width,
            height: config.height,
            fps: config.fps,
        }
    }
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

/// A live media stream. Whoever releases it must call `stop_tracks`.
pub trait MediaStream {
    /// Starts delivering frames
    fn start_playback(&mut self) -> Result<()>;

    /// Grabs the most recent frame
    fn read_frame(&mut self) -> Result<Frame>;

    /// Stops every track; safe to call more than once
    fn stop_tracks(&mut self);

    /// Number of tracks still running
    fn live_tracks(&self) -> usize;
}

/// Acquires media streams from a device.
///
/// Camera backends are not `Send`, so streams stay on the booth thread.
#[async_trait(?Send)]
pub trait MediaCapture {
    async fn request_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>>;
}

/// Stream handle shared between its owning session and the display surface
pub type SharedStream = Rc<RefCell<Box<dyn MediaStream>>>;

/// The video element: shows the bound stream and hands out frames for analysis
#[derive(Default)]
pub struct VideoSurface {
    source: Option<SharedStream>,
    playing: bool,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a stream; playback does not start until `play`
    pub fn bind(&mut self, stream: SharedStream) {
        self.playing = false;
        self.source = Some(stream);
    }

    /// Starts playback of the bound stream
    pub async fn play(&mut self) -> Result<()> {
        let Some(source) = &self.source else {
            warn!("play requested with no stream bound");
            return Ok(());
        };
        source.borrow_mut().start_playback()?;
        tokio::task::yield_now().await;
        self.playing = true;
        debug!("video surface playing");
        Ok(())
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn detach(&mut self) {
        self.playing = false;
        self.source = None;
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// The frame currently on screen, if something is playing
    pub fn snapshot(&self) -> Option<Result<Frame>> {
        if !self.playing {
            return None;
        }
        self.source
            .as_ref()
            .map(|source| source.borrow_mut().read_frame())
    }
}
