// Booth module for sequencing start, capture and reset on the booth thread

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::detection::{DetectionGateway, ExpressionDetector, PendingCapture};
use crate::error::{BoothError, Result};
use crate::models::{DetectionResult, Frame};
use crate::render::{OutputPanel, ResultRenderer, ANALYSIS_FAILED_MESSAGE};
use crate::session::{Controls, SessionController, SessionState};

/// Shown when the camera cannot be opened
pub const CAMERA_NOTICE: &str = "Could not access camera. Please check permissions.";

/// Shown when the expression models fail to load
pub const MODELS_NOTICE: &str = "Could not load expression models.";

/// A blocking message the user has to acknowledge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}

/// Identifies one capture request.
///
/// `epoch` changes on every start and reset; `seq` on every capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureTicket {
    pub epoch: u64,
    pub seq: u64,
}

/// A capture in flight: the ticket plus the pending analysis
pub struct CaptureJob {
    pub ticket: CaptureTicket,
    pending: PendingCapture,
}

impl CaptureJob {
    /// Runs the analysis; a panicking detector comes back as an error under the same ticket
    pub async fn run(self) -> (CaptureTicket, Result<DetectionResult>) {
        let outcome = match AssertUnwindSafe(self.pending.run()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(BoothError::FaceDetection(format!(
                    "Detector panicked: {reason}"
                )))
            }
        };
        (self.ticket, outcome)
    }
}

/// Snapshot of everything the window draws
#[derive(Clone, Debug, PartialEq)]
pub struct BoothView {
    pub state: SessionState,
    pub controls: Controls,
    pub output: OutputPanel,
    pub notice: Option<Notice>,
}

impl Default for BoothView {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            controls: Controls::idle(),
            output: OutputPanel::default(),
            notice: None,
        }
    }
}

pub struct Booth {
    controller: SessionController,
    gateway: Arc<DetectionGateway>,
    renderer: ResultRenderer,
    output: OutputPanel,
    notice: Option<Notice>,
    epoch: u64,
    seq: u64,
    latest: Option<CaptureTicket>,
}

impl Booth {
    pub fn new(controller: SessionController, detector: Arc<dyn ExpressionDetector>) -> Self {
        Self {
            controller,
            gateway: Arc::new(DetectionGateway::new(detector)),
            renderer: ResultRenderer::new(),
            output: OutputPanel::default(),
            notice: None,
            epoch: 0,
            seq: 0,
            latest: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    pub fn controls(&self) -> Controls {
        self.controller.controls()
    }

    pub fn output(&self) -> &OutputPanel {
        &self.output
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn view(&self) -> BoothView {
        BoothView {
            state: self.state(),
            controls: self.controls(),
            output: self.output.clone(),
            notice: self.notice.clone(),
        }
    }

    /// Any capture issued before this point can no longer render
    fn invalidate_captures(&mut self) {
        self.epoch += 1;
        self.latest = None;
    }

    /// Starts, or restarts, the camera session
    pub async fn start(&mut self) {
        self.invalidate_captures();
        self.output.clear();

        if let Err(e) = self.gateway.ensure_models().await {
            error!("Cannot start without models: {}", e);
            self.controller.reset();
            self.notice = Some(Notice {
                message: MODELS_NOTICE.to_string(),
            });
            return;
        }

        if let Err(e) = self.controller.start().await {
            error!("Error accessing camera: {}", e);
            self.notice = Some(Notice {
                message: CAMERA_NOTICE.to_string(),
            });
        }
    }

    /// Stops the camera and clears the output; safe to call at any time
    pub fn reset(&mut self) {
        self.invalidate_captures();
        self.controller.reset();
        self.output.clear();
    }

    /// Same release as `reset`, for process teardown
    pub fn teardown(&mut self) {
        if self.controller.is_active() {
            info!("tearing down active session");
        }
        self.reset();
    }

    /// Grabs the current frame and hands back the analysis to run.
    ///
    /// Returns `None` when no session is active. A newer capture supersedes
    /// an older one still in flight.
    pub fn begin_capture(&mut self) -> Option<CaptureJob> {
        if !self.controller.is_active() {
            warn!("capture requested without an active session");
            return None;
        }

        match self
            .gateway
            .prepare(self.controller.surface(), &mut self.output)
        {
            Ok(pending) => {
                self.seq += 1;
                let ticket = CaptureTicket {
                    epoch: self.epoch,
                    seq: self.seq,
                };
                self.latest = Some(ticket);
                debug!(?ticket, "capture started");
                Some(CaptureJob { ticket, pending })
            }
            Err(e) => {
                error!("Failed to capture frame: {}", e);
                self.renderer
                    .render_failure(ANALYSIS_FAILED_MESSAGE, &mut self.output);
                None
            }
        }
    }

    /// Renders a finished capture. Returns false if the outcome was stale and dropped.
    pub fn finish_capture(
        &mut self,
        ticket: CaptureTicket,
        outcome: Result<DetectionResult>,
    ) -> bool {
        if self.latest != Some(ticket) {
            debug!(?ticket, current_epoch = self.epoch, "dropping stale capture result");
            return false;
        }
        self.latest = None;

        match outcome {
            Ok(result) => self.renderer.render(&result, &mut self.output),
            Err(e) => {
                error!("Expression analysis failed: {}", e);
                self.renderer
                    .render_failure(ANALYSIS_FAILED_MESSAGE, &mut self.output);
            }
        }
        true
    }

    /// The frame currently on screen, for the live preview
    pub fn preview_frame(&self) -> Option<Frame> {
        match self.controller.surface().snapshot()? {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("preview frame unavailable: {}", e);
                None
            }
        }
    }
}

impl Drop for Booth {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Requests the window sends to the booth
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Capture,
    Reset,
    DismissNotice,
    Shutdown,
}

/// Channels the booth loop publishes on
pub struct BoothOutputs {
    pub view: watch::Sender<BoothView>,
    pub frames: watch::Sender<Option<Frame>>,
}

/// Drives the booth until `Shutdown` arrives or every sender is gone
pub async fn run_booth(
    mut booth: Booth,
    mut commands: mpsc::UnboundedReceiver<Command>,
    outputs: BoothOutputs,
    preview_interval: Duration,
) {
    let mut captures: JoinSet<(CaptureTicket, Result<DetectionResult>)> = JoinSet::new();
    let mut preview = tokio::time::interval(preview_interval);
    preview.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    outputs.view.send_replace(booth.view());

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                debug!(?command, "booth command");
                match command {
                    Command::Start => {
                        captures.abort_all();
                        booth.start().await;
                    }
                    Command::Capture => {
                        if let Some(job) = booth.begin_capture() {
                            captures.spawn(job.run());
                        }
                    }
                    Command::Reset => {
                        captures.abort_all();
                        booth.reset();
                        outputs.frames.send_replace(None);
                    }
                    Command::DismissNotice => booth.dismiss_notice(),
                    Command::Shutdown => break,
                }
            }
            Some(joined) = captures.join_next() => {
                match joined {
                    Ok((ticket, outcome)) => {
                        booth.finish_capture(ticket, outcome);
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!("Capture task stopped: {}", e),
                }
            }
            _ = preview.tick() => {
                let frame = booth.preview_frame();
                if frame.is_some() || outputs.frames.borrow().is_some() {
                    outputs.frames.send_replace(frame);
                }
                continue;
            }
        }
        outputs.view.send_replace(booth.view());
    }

    captures.abort_all();
    booth.teardown();
    outputs.view.send_replace(booth.view());
    outputs.frames.send_replace(None);
    info!("booth stopped");
}

/// The window's side of a running booth. Dropping it shuts the booth down.
pub struct BoothHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<BoothView>,
    frames: watch::Receiver<Option<Frame>>,
    thread: Option<JoinHandle<()>>,
}

impl BoothHandle {
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!(?command, "booth is no longer running");
        }
    }

    pub fn view(&self) -> BoothView {
        self.view.borrow().clone()
    }

    /// The newest preview frame, if it changed since the last call
    pub fn take_frame(&mut self) -> Option<Option<Frame>> {
        match self.frames.has_changed() {
            Ok(true) => Some(self.frames.borrow_and_update().clone()),
            _ => None,
        }
    }

    pub fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("booth thread panicked");
            }
        }
    }
}

impl Drop for BoothHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds the booth on its own thread and starts driving it.
///
/// `build` runs on the booth thread, so camera backends that cannot move
/// between threads are fine.
pub fn spawn_booth<F>(build: F, preview_interval: Duration) -> Result<BoothHandle>
where
    F: FnOnce() -> Result<Booth> + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(BoothView::default());
    let (frame_tx, frame_rx) = watch::channel(None);

    let thread = std::thread::Builder::new()
        .name("booth".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to build booth runtime: {}", e);
                    return;
                }
            };
            let booth = match build() {
                Ok(booth) => booth,
                Err(e) => {
                    error!("Failed to build booth: {}", e);
                    return;
                }
            };
            let outputs = BoothOutputs {
                view: view_tx,
                frames: frame_tx,
            };
            runtime.block_on(run_booth(booth, command_rx, outputs, preview_interval));
        })
        .map_err(BoothError::Io)?;

    Ok(BoothHandle {
        commands: command_tx,
        view: view_rx,
        frames: frame_rx,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StreamConstraints;
    use crate::render::{OutputContent, NO_FACE_MESSAGE};
    use crate::testing::{face, FakeCapture, FakeDetector, StreamOutcome};

    fn booth(outcomes: Vec<StreamOutcome>) -> (Booth, FakeCapture, Arc<FakeDetector>) {
        let capture = FakeCapture::new(outcomes);
        let detector = Arc::new(FakeDetector::new());
        let controller =
            SessionController::new(Box::new(capture.clone()), StreamConstraints::default());
        (Booth::new(controller, detector.clone()), capture, detector)
    }

    fn dominant(booth: &Booth) -> &str {
        match booth.output().content() {
            OutputContent::Card(card) => &card.dominant.label,
            other => panic!("expected a result card, got {other:?}"),
        }
    }

    async fn capture(booth: &mut Booth) -> bool {
        let job = booth.begin_capture().expect("capture should start");
        let (ticket, outcome) = job.run().await;
        booth.finish_capture(ticket, outcome)
    }

    #[tokio::test]
    async fn start_capture_renders_first_face_only() {
        let (mut booth, _, detector) = booth(vec![StreamOutcome::Grant]);
        detector.push(DetectionResult::new(vec![
            face(&[("happy", 0.82), ("sad", 0.10), ("neutral", 0.08)]),
            face(&[("angry", 0.95), ("happy", 0.05)]),
        ]));

        booth.start().await;
        assert_eq!(booth.state(), SessionState::Active);
        assert!(booth.notice().is_none());

        assert!(capture(&mut booth).await);
        assert_eq!(dominant(&booth), "happy");
        assert!(!booth.output().busy());
        assert_eq!(detector.calls(), 1);
    }

    #[tokio::test]
    async fn empty_detection_shows_no_face_message() {
        let (mut booth, _, _) = booth(vec![StreamOutcome::Grant]);
        booth.start().await;
        assert!(capture(&mut booth).await);
        assert_eq!(
            booth.output().content(),
            &OutputContent::Message(NO_FACE_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn camera_denial_raises_notice_and_stays_idle() {
        let (mut booth, _, _) = booth(vec![StreamOutcome::Deny]);
        booth.start().await;

        assert_eq!(booth.state(), SessionState::Idle);
        assert_eq!(booth.controls(), Controls::idle());
        assert_eq!(booth.notice().unwrap().message, CAMERA_NOTICE);
        assert!(booth.begin_capture().is_none());

        booth.dismiss_notice();
        assert!(booth.notice().is_none());
    }

    #[tokio::test]
    async fn retry_after_denial_succeeds() {
        let (mut booth, _, _) = booth(vec![StreamOutcome::Deny, StreamOutcome::Grant]);
        booth.start().await;
        booth.start().await;
        assert_eq!(booth.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn model_failure_blocks_start_without_touching_camera() {
        let (mut booth, capture, detector) = booth(vec![StreamOutcome::Grant]);
        detector.fail_loads(1);
        booth.start().await;

        assert_eq!(booth.state(), SessionState::Idle);
        assert_eq!(booth.notice().unwrap().message, MODELS_NOTICE);
        assert!(capture.requests().is_empty());
    }

    #[tokio::test]
    async fn detection_failure_clears_busy_and_keeps_session() {
        let (mut booth, _, detector) = booth(vec![StreamOutcome::Grant]);
        detector.push_failure("inference crashed");
        booth.start().await;

        assert!(capture(&mut booth).await);
        assert!(!booth.output().busy());
        assert_eq!(
            booth.output().content(),
            &OutputContent::Failure(ANALYSIS_FAILED_MESSAGE.to_string())
        );
        assert_eq!(booth.state(), SessionState::Active);

        // Recoverable: the next capture renders normally
        detector.push(DetectionResult::new(vec![face(&[("sad", 0.6)])]));
        assert!(capture(&mut booth).await);
        assert_eq!(dominant(&booth), "sad");
    }

    #[tokio::test]
    async fn reset_during_capture_discards_the_result() {
        let (mut booth, capture, detector) = booth(vec![StreamOutcome::Grant]);
        detector.push(DetectionResult::new(vec![face(&[("happy", 1.0)])]));
        booth.start().await;

        let job = booth.begin_capture().unwrap();
        assert!(booth.output().busy());
        booth.reset();

        let (ticket, outcome) = job.run().await;
        assert!(!booth.finish_capture(ticket, outcome));
        assert_eq!(booth.output(), &OutputPanel::default());
        assert_eq!(booth.controls(), Controls::idle());
        assert_eq!(capture.live_tracks(), 0);
    }

    #[tokio::test]
    async fn restart_during_capture_discards_the_result() {
        let (mut booth, _, detector) =
            booth(vec![StreamOutcome::Grant, StreamOutcome::Grant]);
        detector.push(DetectionResult::new(vec![face(&[("happy", 1.0)])]));
        booth.start().await;

        let job = booth.begin_capture().unwrap();
        booth.start().await;
        let (ticket, outcome) = job.run().await;

        assert!(!booth.finish_capture(ticket, outcome));
        assert_eq!(booth.state(), SessionState::Active);
        assert_eq!(booth.output().content(), &OutputContent::Empty);
    }

    #[tokio::test]
    async fn newer_capture_supersedes_older_one() {
        let (mut booth, _, detector) = booth(vec![StreamOutcome::Grant]);
        detector.push(DetectionResult::new(vec![face(&[("sad", 1.0)])]));
        detector.push(DetectionResult::new(vec![face(&[("happy", 1.0)])]));
        booth.start().await;

        let first = booth.begin_capture().unwrap();
        let second = booth.begin_capture().unwrap();
        let (old_ticket, old_outcome) = first.run().await;
        let (new_ticket, new_outcome) = second.run().await;

        assert!(!booth.finish_capture(old_ticket, old_outcome));
        assert!(booth.output().busy());
        assert!(booth.finish_capture(new_ticket, new_outcome));
        assert_eq!(dominant(&booth), "happy");
    }

    #[tokio::test]
    async fn panicking_capture_keeps_its_ticket() {
        let (mut booth, _, detector) = booth(vec![StreamOutcome::Grant]);
        detector.push_panic("detector blew up");
        booth.start().await;

        let job = booth.begin_capture().unwrap();
        let issued = job.ticket;
        let (ticket, outcome) = job.run().await;
        assert_eq!(ticket, issued);
        assert!(matches!(&outcome, Err(e) if e.to_string().contains("detector blew up")));

        assert!(booth.finish_capture(ticket, outcome));
        assert!(!booth.output().busy());
        assert_eq!(
            booth.output().content(),
            &OutputContent::Failure(ANALYSIS_FAILED_MESSAGE.to_string())
        );
        assert_eq!(booth.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn superseded_capture_panicking_does_not_drop_newer_result() {
        let (mut booth, _, detector) = booth(vec![StreamOutcome::Grant]);
        detector.push_panic("older capture failed");
        detector.push(DetectionResult::new(vec![face(&[("happy", 0.9)])]));
        booth.start().await;

        let first = booth.begin_capture().unwrap();
        let second = booth.begin_capture().unwrap();
        let (old_ticket, old_outcome) = first.run().await;
        assert!(!booth.finish_capture(old_ticket, old_outcome));
        assert!(booth.output().busy());

        let (new_ticket, new_outcome) = second.run().await;
        assert!(booth.finish_capture(new_ticket, new_outcome));
        assert_eq!(dominant(&booth), "happy");
    }

    #[tokio::test]
    async fn loop_renders_newest_capture_after_older_one_panics() {
        let (booth, _, detector) = booth(vec![StreamOutcome::Grant]);
        detector.push_panic("older capture failed");
        detector.push(DetectionResult::new(vec![face(&[("happy", 0.9)])]));

        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, mut view_rx) = watch::channel(BoothView::default());
        let (frame_tx, _frame_rx) = watch::channel(None);
        let outputs = BoothOutputs {
            view: view_tx,
            frames: frame_tx,
        };

        tx.send(Command::Start).unwrap();
        tx.send(Command::Capture).unwrap();
        tx.send(Command::Capture).unwrap();
        let driver = run_booth(booth, rx, outputs, Duration::from_millis(5));
        let checker = async {
            let view = tokio::time::timeout(
                Duration::from_secs(5),
                view_rx.wait_for(|v| {
                    !v.output.busy() && matches!(v.output.content(), OutputContent::Card(_))
                }),
            )
            .await
            .expect("newest capture should render")
            .unwrap()
            .clone();
            match view.output.content() {
                OutputContent::Card(card) => assert_eq!(card.dominant.label, "happy"),
                other => panic!("expected a result card, got {other:?}"),
            }
            tx.send(Command::Shutdown).unwrap();
        };
        tokio::join!(driver, checker);
        assert_eq!(detector.calls(), 2);
    }

    #[tokio::test]
    async fn start_clears_previous_result() {
        let (mut booth, _, detector) =
            booth(vec![StreamOutcome::Grant, StreamOutcome::Grant]);
        detector.push(DetectionResult::new(vec![face(&[("happy", 1.0)])]));
        booth.start().await;
        capture(&mut booth).await;
        assert!(matches!(booth.output().content(), OutputContent::Card(_)));

        booth.start().await;
        assert_eq!(booth.output().content(), &OutputContent::Empty);
    }

    #[tokio::test]
    async fn reset_always_lands_in_initial_controls() {
        let (mut booth, capture, _) = booth(vec![StreamOutcome::Grant]);
        booth.reset();
        assert_eq!(booth.controls(), Controls::idle());

        booth.start().await;
        booth.reset();
        booth.reset();
        assert_eq!(booth.controls(), Controls::idle());
        assert_eq!(booth.controls().start_caption.text(), "Start Camera");
        assert_eq!(capture.live_tracks(), 0);
    }

    #[tokio::test]
    async fn dropping_the_booth_releases_the_camera() {
        let (mut booth, capture, _) = booth(vec![StreamOutcome::Grant]);
        booth.start().await;
        assert_eq!(capture.live_tracks(), 1);
        drop(booth);
        assert_eq!(capture.live_tracks(), 0);
    }

    #[tokio::test]
    async fn preview_frames_only_while_active() {
        let (mut booth, _, _) = booth(vec![StreamOutcome::Grant]);
        assert!(booth.preview_frame().is_none());
        booth.start().await;
        assert!(booth.preview_frame().is_some());
        booth.reset();
        assert!(booth.preview_frame().is_none());
    }

    #[tokio::test]
    async fn loop_processes_commands_and_publishes_views() {
        let (booth, capture, detector) = booth(vec![StreamOutcome::Grant]);
        detector.push(DetectionResult::new(vec![face(&[("surprised", 0.7)])]));

        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, mut view_rx) = watch::channel(BoothView::default());
        let (frame_tx, _frame_rx) = watch::channel(None);
        let outputs = BoothOutputs {
            view: view_tx,
            frames: frame_tx,
        };

        tx.send(Command::Start).unwrap();
        tx.send(Command::Capture).unwrap();
        let driver = run_booth(booth, rx, outputs, Duration::from_millis(5));
        let checker = async {
            let view = view_rx
                .wait_for(|v| matches!(v.output.content(), OutputContent::Card(_)))
                .await
                .unwrap()
                .clone();
            assert_eq!(view.state, SessionState::Active);
            assert_eq!(view.controls, Controls::active());
            tx.send(Command::Shutdown).unwrap();
        };
        tokio::join!(driver, checker);

        assert_eq!(view_rx.borrow().state, SessionState::Idle);
        assert_eq!(capture.live_tracks(), 0);
    }

    #[test]
    fn dropping_the_handle_releases_the_camera() {
        let live = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let tracker = live.clone();
        let handle = spawn_booth(
            move || {
                let capture = FakeCapture::with_tracker(vec![StreamOutcome::Grant], tracker);
                let controller =
                    SessionController::new(Box::new(capture), StreamConstraints::default());
                Ok(Booth::new(controller, Arc::new(FakeDetector::new())))
            },
            Duration::from_millis(5),
        )
        .unwrap();

        handle.send(Command::Start);
        let mut active = false;
        for _ in 0..500 {
            if handle.view().state == SessionState::Active {
                active = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(active, "booth never became active");
        assert_eq!(live.load(std::sync::atomic::Ordering::SeqCst), 1);

        drop(handle);
        assert_eq!(live.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
