// In-crate fakes for the capture and detection collaborators

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::capture::{MediaCapture, MediaStream, StreamConstraints};
use crate::detection::ExpressionDetector;
use crate::error::{BoothError, Result};
use crate::models::{DetectionResult, ExpressionScores, FaceExpressions, Frame};

#[derive(Default)]
struct StreamFlags {
    playing: Cell<bool>,
    live: Cell<bool>,
    broken: Cell<bool>,
    /// Live track count visible from other threads
    tracker: Option<Arc<AtomicUsize>>,
}

/// Observes a `FakeStream` after it has been handed away
#[derive(Clone)]
pub struct FakeStreamProbe(Rc<StreamFlags>);

impl FakeStreamProbe {
    pub fn playing(&self) -> bool {
        self.0.playing.get()
    }

    pub fn live(&self) -> bool {
        self.0.live.get()
    }
}

pub struct FakeStream {
    flags: Rc<StreamFlags>,
}

impl FakeStream {
    pub fn new() -> (Self, FakeStreamProbe) {
        Self::tracked(None)
    }

    fn tracked(tracker: Option<Arc<AtomicUsize>>) -> (Self, FakeStreamProbe) {
        if let Some(tracker) = &tracker {
            tracker.fetch_add(1, Ordering::SeqCst);
        }
        let flags = Rc::new(StreamFlags {
            tracker,
            ..StreamFlags::default()
        });
        flags.live.set(true);
        (
            Self {
                flags: flags.clone(),
            },
            FakeStreamProbe(flags),
        )
    }

    fn broken(tracker: Option<Arc<AtomicUsize>>) -> (Self, FakeStreamProbe) {
        let (stream, probe) = Self::tracked(tracker);
        stream.flags.broken.set(true);
        (stream, probe)
    }
}

impl MediaStream for FakeStream {
    fn start_playback(&mut self) -> Result<()> {
        if self.flags.broken.get() {
            return Err(BoothError::CameraInit("stream not working".to_string()));
        }
        self.flags.playing.set(true);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.flags.live.get() {
            return Err(BoothError::FrameProcessing("stopped".to_string()));
        }
        Ok(Frame::new(vec![0; 4 * 2 * 3], 4, 2))
    }

    fn stop_tracks(&mut self) {
        if self.flags.live.replace(false) {
            if let Some(tracker) = &self.flags.tracker {
                tracker.fetch_sub(1, Ordering::SeqCst);
            }
        }
        self.flags.playing.set(false);
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.flags.live.get())
    }
}

/// What the next stream request does
#[derive(Clone, Copy, Debug)]
pub enum StreamOutcome {
    Grant,
    Deny,
    Unavailable,
    BrokenPlayback,
}

#[derive(Default)]
struct CaptureLog {
    outcomes: VecDeque<StreamOutcome>,
    requests: Vec<StreamConstraints>,
    probes: Vec<FakeStreamProbe>,
    tracker: Option<Arc<AtomicUsize>>,
}

/// Scripted camera; clones share the same script and log
#[derive(Clone, Default)]
pub struct FakeCapture {
    log: Rc<RefCell<CaptureLog>>,
}

impl FakeCapture {
    pub fn new(outcomes: Vec<StreamOutcome>) -> Self {
        let capture = Self::default();
        capture.log.borrow_mut().outcomes = outcomes.into();
        capture
    }

    /// Like `new`, also counting live tracks in `tracker`
    pub fn with_tracker(outcomes: Vec<StreamOutcome>, tracker: Arc<AtomicUsize>) -> Self {
        let capture = Self::new(outcomes);
        capture.log.borrow_mut().tracker = Some(tracker);
        capture
    }

    pub fn requests(&self) -> Vec<StreamConstraints> {
        self.log.borrow().requests.clone()
    }

    pub fn streams_issued(&self) -> usize {
        self.log.borrow().probes.len()
    }

    /// Tracks still running across every stream handed out
    pub fn live_tracks(&self) -> usize {
        self.log.borrow().probes.iter().filter(|p| p.live()).count()
    }
}

#[async_trait(?Send)]
impl MediaCapture for FakeCapture {
    async fn request_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>> {
        let mut log = self.log.borrow_mut();
        log.requests.push(constraints.clone());
        let outcome = log.outcomes.pop_front().unwrap_or(StreamOutcome::Deny);
        let tracker = log.tracker.clone();
        let (stream, probe) = match outcome {
            StreamOutcome::Grant => FakeStream::tracked(tracker),
            StreamOutcome::BrokenPlayback => FakeStream::broken(tracker),
            StreamOutcome::Deny => return Err(BoothError::CameraAccessDenied),
            StreamOutcome::Unavailable => {
                return Err(BoothError::CameraUnavailable("no device".to_string()))
            }
        };
        log.probes.push(probe);
        Ok(Box::new(stream))
    }
}

enum Scripted {
    Result(DetectionResult),
    Failure(String),
    Panic(String),
}

/// Scripted detector counting model loads and detection calls
#[derive(Default)]
pub struct FakeDetector {
    results: Mutex<VecDeque<Scripted>>,
    load_failures: AtomicUsize,
    loads: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next `detect` call
    pub fn push(&self, result: DetectionResult) {
        self.results.lock().unwrap().push_back(Scripted::Result(result));
    }

    pub fn push_failure(&self, message: &str) {
        self.results
            .lock()
            .unwrap()
            .push_back(Scripted::Failure(message.to_string()));
    }

    /// Makes the next `detect` call panic
    pub fn push_panic(&self, message: &str) {
        self.results
            .lock()
            .unwrap()
            .push_back(Scripted::Panic(message.to_string()));
    }

    /// Makes the next `n` model loads fail
    pub fn fail_loads(&self, n: usize) {
        self.load_failures.store(n, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExpressionDetector for FakeDetector {
    async fn load_models(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.load_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.load_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BoothError::ModelLoad("weights missing".to_string()));
        }
        Ok(())
    }

    async fn detect(&self, _frame: &Frame) -> Result<DetectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Result(result)) => Ok(result),
            Some(Scripted::Failure(message)) => Err(BoothError::FaceDetection(message)),
            Some(Scripted::Panic(message)) => panic!("{message}"),
            None => Ok(DetectionResult::empty()),
        }
    }
}

/// One face with the given `(label, score)` pairs in order
pub fn face(scores: &[(&str, f64)]) -> FaceExpressions {
    FaceExpressions::new(scores.iter().copied().collect::<ExpressionScores>())
}
