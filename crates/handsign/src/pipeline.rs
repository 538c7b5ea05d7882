//! The per-frame tracking and classification loop.
//!
//! A [`Session`] owns the tracker and the classifier and moves between two phases:
//!
//! - [`Phase::AwaitingInit`]: every frame, the [`RegionSource`] is asked for a region to track.
//!   Once one is available, the tracker is initialized on it and the session starts tracking.
//! - [`Phase::Tracking`]: every frame, the tracker is updated. On success, the classification
//!   window is derived from the tracked rectangle, preprocessed, and classified. On failure, the
//!   session keeps tracking and keeps the last prediction; with
//!   [`RedetectPolicy::AfterFailures`] it reinitializes from the region source after enough
//!   consecutive failures.
//!
//! [`ControlSignal::StopTracking`] returns the session to [`Phase::AwaitingInit`], and
//! [`ControlSignal::Quit`] ends [`Session::run`]. Both are only observed between cycles.

use std::sync::Arc;

use handsign_image::{Image, Rect};
use serde::Deserialize;

use crate::{
    classify::{ClassDistribution, Classifier, OnnxClassifier},
    config::{ClassifierBundle, SessionConfig},
    control::{ControlSignal, Controls},
    detection::{best_region, CnnRegionDetector, RegionDetector},
    error::PipelineError,
    nn::tensor::Tensor,
    preprocess::Preprocessor,
    timer::{FpsCounter, Timer},
    tracker::{MilTracker, TrackerParams},
    video::FrameSource,
    window::WindowOffsets,
    worker::{promise, Promise, PromiseHandle, Worker},
};

/// Phase of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No region is being tracked.
    AwaitingInit,
    /// The tracker follows a region.
    Tracking,
}

/// Where tracking regions come from.
pub enum RegionSource {
    /// A fixed region, eg. selected manually.
    Fixed(Rect),
    /// The most confident region found by a detector.
    Detector(Box<dyn RegionDetector>),
    /// A fixed region to start tracking from, and a detector to reinitialize with after tracking
    /// failures.
    FixedThenDetector {
        region: Rect,
        detector: Box<dyn RegionDetector>,
    },
}

impl RegionSource {
    /// Finds the region to start tracking on while awaiting initialization.
    fn initial(&mut self, frame: &Image) -> anyhow::Result<Option<Rect>> {
        match self {
            RegionSource::Fixed(rect) | RegionSource::FixedThenDetector { region: rect, .. } => {
                Ok(Some(*rect))
            }
            RegionSource::Detector(detector) => detect(&mut **detector, frame),
        }
    }

    /// Finds the region to restart tracking on after repeated failures.
    fn redetect(&mut self, frame: &Image) -> anyhow::Result<Option<Rect>> {
        match self {
            RegionSource::Fixed(rect) => Ok(Some(*rect)),
            RegionSource::Detector(detector)
            | RegionSource::FixedThenDetector { detector, .. } => detect(&mut **detector, frame),
        }
    }

    fn timers(&self) -> Vec<&Timer> {
        match self {
            RegionSource::Fixed(_) => Vec::new(),
            RegionSource::Detector(detector)
            | RegionSource::FixedThenDetector { detector, .. } => detector.timers(),
        }
    }
}

fn detect(detector: &mut dyn RegionDetector, frame: &Image) -> anyhow::Result<Option<Rect>> {
    Ok(best_region(&detector.detect(frame)?))
}

/// What to do when tracking keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedetectPolicy {
    /// Keep tracking no matter how often updates fail.
    #[default]
    Never,
    /// Reinitialize from the region source after this many consecutive failed updates.
    AfterFailures(u32),
}

impl RedetectPolicy {
    /// Returns whether `consecutive_failures` failed updates call for reinitialization.
    pub fn triggers(self, consecutive_failures: u32) -> bool {
        match self {
            RedetectPolicy::Never => false,
            RedetectPolicy::AfterFailures(n) => consecutive_failures >= n,
        }
    }
}

/// Where classifier inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// On the calling thread, as part of each cycle.
    #[default]
    Inline,
    /// On a dedicated worker thread. At most one inference is in flight; its result is applied at
    /// the start of a later cycle, and windows arriving while it runs are not classified.
    Worker,
}

/// The most likely gesture class of a classified window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class_id: usize,
    pub probability: f32,
}

/// State carried from one cycle to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    /// The tracker's current estimate.
    pub tracked: Option<Rect>,
    /// The latest prediction. Survives failed updates and skipped windows.
    pub prediction: Option<Prediction>,
    /// Whether the last tracker update succeeded.
    pub tracking_ok: bool,
}

/// What happened during one cycle. Everything needed to draw an overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Index of the frame in the session, starting at 0.
    pub frame_index: u64,
    /// Phase at the end of the cycle.
    pub phase: Phase,
    /// Whether the tracker was (re)initialized on this frame.
    pub started: bool,
    pub tracked: Option<Rect>,
    /// Confidence of the tracker update, if one happened.
    pub confidence: Option<f32>,
    /// The classification window, if a valid one could be derived.
    pub window: Option<Rect>,
    /// Whether this frame's tracker update succeeded. `true` on the frame tracking starts.
    pub tracking_ok: bool,
    pub window_valid: bool,
    pub prediction: Option<Prediction>,
}

/// Behavior settings of a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub tracker: TrackerParams,
    pub window: WindowOffsets,
    pub redetect: RedetectPolicy,
    pub inference: InferenceMode,
    /// [`Session::run`] stops after this many frames.
    pub max_frames: Option<u64>,
}

impl From<&SessionConfig> for SessionOptions {
    fn from(cfg: &SessionConfig) -> Self {
        Self {
            tracker: cfg.tracker.clone(),
            window: cfg.window,
            redetect: cfg.redetect,
            inference: cfg.inference,
            max_frames: cfg.max_frames,
        }
    }
}

type Job = (Tensor, Promise<anyhow::Result<ClassDistribution>>);

enum Inference {
    Inline(Box<dyn Classifier>),
    Worker(Worker<Job>),
}

/// A tracking and classification session.
pub struct Session {
    tracker: MilTracker,
    offsets: WindowOffsets,
    preprocessor: Preprocessor,
    inference: Inference,
    num_classes: usize,
    pending: Option<PromiseHandle<anyhow::Result<ClassDistribution>>>,
    region_source: RegionSource,
    redetect: RedetectPolicy,
    max_frames: Option<u64>,
    phase: Phase,
    state: PipelineState,
    consecutive_failures: u32,
    frame_index: u64,
    t_track: Timer,
    t_preprocess: Timer,
    t_infer: Arc<Timer>,
}

impl Session {
    /// Creates a session.
    ///
    /// Fails with [`PipelineError::ShapeMismatch`] if `preprocessor` does not produce the tensors
    /// `classifier` expects, and with [`PipelineError::InvalidConfig`] if the options are invalid.
    pub fn new(
        options: SessionOptions,
        classifier: Box<dyn Classifier>,
        preprocessor: Preprocessor,
        region_source: RegionSource,
    ) -> anyhow::Result<Self> {
        options
            .tracker
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(format!("[tracker]: {e}")))?;
        if preprocessor.tensor_shape() != classifier.input_shape() {
            return Err(PipelineError::ShapeMismatch {
                expected: classifier.input_shape().to_vec(),
                actual: preprocessor.tensor_shape().to_vec(),
            }
            .into());
        }
        let num_classes = classifier.num_classes();
        if num_classes == 0 {
            return Err(PipelineError::InvalidConfig("classifier has no classes".into()).into());
        }

        let t_infer = Arc::new(Timer::new("infer"));
        let inference = match options.inference {
            InferenceMode::Inline => Inference::Inline(classifier),
            InferenceMode::Worker => {
                let t_infer = t_infer.clone();
                Inference::Worker(
                    Worker::builder()
                        .name("classifier")
                        .capacity(1)
                        .spawn(move |(tensor, promise): Job| {
                            promise.fulfill(t_infer.time(|| classifier.infer(&tensor)));
                        })?,
                )
            }
        };

        Ok(Self {
            tracker: MilTracker::new(options.tracker),
            offsets: options.window,
            preprocessor,
            inference,
            num_classes,
            pending: None,
            region_source,
            redetect: options.redetect,
            max_frames: options.max_frames,
            phase: Phase::AwaitingInit,
            state: PipelineState::default(),
            consecutive_failures: 0,
            frame_index: 0,
            t_track: Timer::new("track"),
            t_preprocess: Timer::new("preprocess"),
            t_infer,
        })
    }

    /// Loads all models named by `cfg` and creates a session from them.
    ///
    /// A fixed `region` seeds tracking, and a configured detector is used whenever no fixed region
    /// applies (initially without `region`, and for reinitialization). Fails if neither is
    /// configured, or if any model fails to load.
    pub fn from_config(cfg: &SessionConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let detector: Option<Box<dyn RegionDetector>> = match &cfg.detector {
            Some(settings) => Some(Box::new(CnnRegionDetector::load(settings)?)),
            None => None,
        };
        let region_source = match (cfg.region, detector) {
            (Some(region), Some(detector)) => RegionSource::FixedThenDetector { region, detector },
            (Some(region), None) => RegionSource::Fixed(region),
            (None, Some(detector)) => RegionSource::Detector(detector),
            (None, None) => {
                return Err(PipelineError::InvalidConfig(
                    "either an initial `region` or a `[detector]` has to be configured".into(),
                )
                .into())
            }
        };

        let bundle = ClassifierBundle::load(&cfg.classifier)?;
        let classifier = OnnxClassifier::load(&bundle)?;
        let preprocessor = Preprocessor::new(bundle.preprocess, bundle.input_resolution());
        Self::new(
            cfg.into(),
            Box::new(classifier),
            preprocessor,
            region_source,
        )
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Returns the per-stage timers, including the region detector's.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_track, &self.t_preprocess, &*self.t_infer]
            .into_iter()
            .chain(self.region_source.timers())
    }

    /// Drops the tracker and waits for a new initial region.
    pub fn stop_tracking(&mut self) {
        if self.phase == Phase::Tracking {
            log::info!("tracking stopped");
        }
        self.tracker.reset();
        self.phase = Phase::AwaitingInit;
        self.state = PipelineState::default();
        self.pending = None;
        self.consecutive_failures = 0;
    }

    fn start_tracking(&mut self, frame: &Image, rect: Rect) -> anyhow::Result<()> {
        self.tracker.initialize(frame, rect)?;
        log::info!("tracking started at {:?}", self.tracker.rect());
        self.phase = Phase::Tracking;
        self.state = PipelineState {
            tracked: self.tracker.rect(),
            prediction: None,
            tracking_ok: true,
        };
        // A result still in flight belongs to the previous region.
        self.pending = None;
        self.consecutive_failures = 0;
        Ok(())
    }

    /// Processes one frame.
    ///
    /// Tracking failures and invalid windows are reported, not returned as errors. Errors are
    /// structural (classifier misbehaving, detector or tracker failing) and end the session.
    pub fn cycle(&mut self, frame: &Image) -> anyhow::Result<CycleReport> {
        let frame_index = self.frame_index;
        self.frame_index += 1;

        self.poll_inference()?;

        let mut report = CycleReport {
            frame_index,
            phase: self.phase,
            started: false,
            tracked: None,
            confidence: None,
            window: None,
            tracking_ok: false,
            window_valid: false,
            prediction: None,
        };

        match self.phase {
            Phase::AwaitingInit => match self.region_source.initial(frame)? {
                Some(rect) => {
                    self.start_tracking(frame, rect)?;
                    report.started = true;
                    report.tracking_ok = true;
                }
                None => log::debug!("frame {frame_index}: no region to track yet"),
            },
            Phase::Tracking => {
                let outcome = self.t_track.time(|| self.tracker.update(frame))?;
                report.confidence = Some(outcome.confidence);
                report.tracking_ok = outcome.ok;
                self.state.tracked = Some(outcome.rect);
                self.state.tracking_ok = outcome.ok;

                if outcome.ok {
                    self.consecutive_failures = 0;
                    match self.offsets.window(outcome.rect, frame.resolution()) {
                        Ok(window) => {
                            report.window = Some(window);
                            report.window_valid = true;
                            self.classify(frame, window)?;
                        }
                        Err(e) => log::warn!("frame {frame_index}: not classifying: {e}"),
                    }
                } else {
                    self.consecutive_failures += 1;
                    log::warn!(
                        "frame {frame_index}: tracking failure (confidence {:.3}, {} in a row)",
                        outcome.confidence,
                        self.consecutive_failures
                    );
                    if self.redetect.triggers(self.consecutive_failures) {
                        match self.region_source.redetect(frame)? {
                            Some(rect) => {
                                log::info!(
                                    "reinitializing after {} failed updates",
                                    self.consecutive_failures
                                );
                                self.start_tracking(frame, rect)?;
                                report.started = true;
                            }
                            None => log::debug!("no region found for reinitialization"),
                        }
                    }
                }
            }
        }

        report.phase = self.phase;
        report.tracked = self.state.tracked;
        report.prediction = self.state.prediction;
        log::debug!(
            "frame {}: {:?} tracked={:?} ok={} window={:?} prediction={:?}",
            frame_index,
            report.phase,
            report.tracked,
            report.tracking_ok,
            report.window,
            report.prediction,
        );
        Ok(report)
    }

    fn classify(&mut self, frame: &Image, window: Rect) -> anyhow::Result<()> {
        if self.pending.is_some() {
            log::trace!("classifier busy, skipping window {window:?}");
            return Ok(());
        }

        let tensor = self.t_preprocess.time(|| self.preprocessor.run(frame, window));
        match &mut self.inference {
            Inference::Inline(classifier) => {
                let dist = self.t_infer.time(|| classifier.infer(&tensor))?;
                self.apply(dist)?;
            }
            Inference::Worker(worker) => {
                let (promise, handle) = promise();
                worker.send((tensor, promise));
                self.pending = Some(handle);
            }
        }
        Ok(())
    }

    /// Applies a finished worker inference, if there is one.
    fn poll_inference(&mut self) -> anyhow::Result<()> {
        let Some(handle) = &mut self.pending else {
            return Ok(());
        };
        match handle.poll() {
            None => Ok(()),
            Some(result) => {
                self.pending = None;
                self.apply_result(result)
            }
        }
    }

    /// Waits for the inference in flight, if any, and applies its result.
    pub fn finish(&mut self) -> anyhow::Result<()> {
        match self.pending.take() {
            Some(handle) => self.apply_result(handle.block()),
            None => Ok(()),
        }
    }

    fn apply_result<E>(
        &mut self,
        result: Result<anyhow::Result<ClassDistribution>, E>,
    ) -> anyhow::Result<()> {
        match result {
            Ok(dist) => self.apply(dist?),
            Err(_) => anyhow::bail!("classifier worker exited unexpectedly"),
        }
    }

    fn apply(&mut self, dist: ClassDistribution) -> anyhow::Result<()> {
        if dist.len() != self.num_classes {
            return Err(PipelineError::ClassCountMismatch {
                expected: self.num_classes,
                actual: dist.len(),
            }
            .into());
        }
        log::trace!("class distribution: {:?}", dist);
        if let Some((class_id, probability)) = dist.max_class() {
            self.state.prediction = Some(Prediction {
                class_id,
                probability,
            });
        }
        Ok(())
    }

    /// Runs cycles until `source` ends, [`ControlSignal::Quit`] is received, or the configured
    /// frame limit is reached.
    ///
    /// `sink` is called with every frame and its report. Returns the final pipeline state, after
    /// any inference still in flight has completed.
    pub fn run<S, F>(
        &mut self,
        mut source: S,
        controls: &mut Controls,
        mut sink: F,
    ) -> anyhow::Result<PipelineState>
    where
        S: FrameSource,
        F: FnMut(&Image, &CycleReport) -> anyhow::Result<()>,
    {
        let mut fps = FpsCounter::new("pipeline");
        let mut frames = 0;
        'session: loop {
            while let Some(signal) = controls.poll() {
                match signal {
                    ControlSignal::StopTracking => self.stop_tracking(),
                    ControlSignal::Quit => {
                        log::info!("quit requested");
                        break 'session;
                    }
                }
            }
            if self.max_frames.map_or(false, |max| frames >= max) {
                log::info!("frame limit of {frames} reached");
                break;
            }

            let Some(frame) = source.next_frame()? else {
                log::info!("end of stream after {frames} frames");
                break;
            };
            frames += 1;

            let report = self.cycle(&frame)?;
            sink(&frame, &report)?;

            fps.tick_with(self.timers().chain(source.timers()));
        }

        self.finish()?;
        Ok(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use handsign_image::Resolution;

    use super::*;
    use crate::{detection::Detection, preprocess::PreprocessParams, test};

    const REFERENCE: Rect = Rect::from_top_left(200, 150, 100, 100);
    const DIST: [f32; 5] = [0.05, 0.71, 0.10, 0.02, 0.12];

    struct StubClassifier {
        output: Vec<f32>,
        num_classes: usize,
        calls: Arc<AtomicUsize>,
    }

    impl Classifier for StubClassifier {
        fn input_shape(&self) -> [usize; 4] {
            [1, 1, 48, 48]
        }

        fn num_classes(&self) -> usize {
            self.num_classes
        }

        fn infer(&self, tensor: &Tensor) -> anyhow::Result<ClassDistribution> {
            crate::classify::check_input_shape(self.input_shape(), tensor)?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone().into())
        }
    }

    fn stub() -> (Box<dyn Classifier>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let classifier = StubClassifier {
            output: DIST.to_vec(),
            num_classes: DIST.len(),
            calls: calls.clone(),
        };
        (Box::new(classifier), calls)
    }

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(PreprocessParams::default(), Resolution::new(48, 48))
    }

    fn session(
        options: SessionOptions,
        region_source: RegionSource,
    ) -> (Session, Arc<AtomicUsize>) {
        let (classifier, calls) = stub();
        let session = Session::new(options, classifier, preprocessor(), region_source).unwrap();
        (session, calls)
    }

    fn frames(n: usize) -> std::vec::IntoIter<Image> {
        vec![test::textured_frame().clone(); n].into_iter()
    }

    #[test]
    fn starts_tracking_on_fixed_region() {
        let (mut session, calls) =
            session(SessionOptions::default(), RegionSource::Fixed(REFERENCE));
        assert_eq!(session.phase(), Phase::AwaitingInit);

        let report = session.cycle(test::textured_frame()).unwrap();
        assert!(report.started);
        assert_eq!(report.phase, Phase::Tracking);
        assert_eq!(report.tracked, Some(REFERENCE));
        assert_eq!(report.prediction, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn static_scene_is_classified() {
        let (mut session, calls) =
            session(SessionOptions::default(), RegionSource::Fixed(REFERENCE));
        session.cycle(test::textured_frame()).unwrap();

        for i in 1..4 {
            let report = session.cycle(test::textured_frame()).unwrap();
            assert_eq!(report.frame_index, i);
            assert!(report.tracking_ok);
            assert!(report.window_valid);
            assert!(report.tracked.unwrap().iou(&REFERENCE) >= 0.8);
            assert_eq!(
                report.prediction,
                Some(Prediction {
                    class_id: 1,
                    probability: 0.71
                })
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn oversized_window_keeps_previous_prediction() {
        // The derived window is 500 pixels tall, more than the frame's 480.
        let tall = Rect::from_top_left(100, 100, 200, 250);
        let (mut session, calls) = session(SessionOptions::default(), RegionSource::Fixed(tall));
        session.cycle(test::textured_frame()).unwrap();

        let previous = Prediction {
            class_id: 3,
            probability: 0.4,
        };
        session.state.prediction = Some(previous);
        for _ in 0..2 {
            let report = session.cycle(test::textured_frame()).unwrap();
            assert!(!report.window_valid);
            assert_eq!(report.window, None);
            assert_eq!(report.prediction, Some(previous));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn waits_for_detector() {
        struct LateDetector(usize);
        impl RegionDetector for LateDetector {
            fn detect(&mut self, _: &Image) -> anyhow::Result<Vec<Detection>> {
                self.0 += 1;
                Ok(match self.0 {
                    1 | 2 => Vec::new(),
                    _ => vec![
                        Detection::new(0.6, Rect::from_top_left(10, 10, 50, 50)),
                        Detection::new(0.9, REFERENCE),
                    ],
                })
            }
        }

        let (mut session, _) = session(
            SessionOptions::default(),
            RegionSource::Detector(Box::new(LateDetector(0))),
        );
        for _ in 0..2 {
            let report = session.cycle(test::textured_frame()).unwrap();
            assert_eq!(report.phase, Phase::AwaitingInit);
            assert!(!report.started);
            assert_eq!(report.tracked, None);
        }
        let report = session.cycle(test::textured_frame()).unwrap();
        assert!(report.started);
        assert_eq!(report.tracked, Some(REFERENCE));
    }

    #[test]
    fn stop_and_quit_between_cycles() {
        let (mut session, _) =
            session(SessionOptions::default(), RegionSource::Fixed(REFERENCE));
        let (sender, mut controls) = Controls::channel();
        let mut reports = Vec::new();
        session
            .run(frames(10), &mut controls, |_, report| {
                match report.frame_index {
                    2 => sender.send(ControlSignal::StopTracking)?,
                    4 => sender.send(ControlSignal::Quit)?,
                    _ => {}
                }
                reports.push(report.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(reports.len(), 5);
        let started = reports.iter().map(|r| r.started).collect::<Vec<_>>();
        assert_eq!(started, [true, false, false, true, false]);
        // The restart discarded the previous prediction.
        assert_eq!(reports[3].prediction, None);
        assert!(reports[4].prediction.is_some());
    }

    #[test]
    fn frame_limit() {
        let options = SessionOptions {
            max_frames: Some(3),
            ..Default::default()
        };
        let (mut session, _) = session(options, RegionSource::Fixed(REFERENCE));
        let mut count = 0;
        session
            .run(frames(10), &mut Controls::none(), |_, _| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn worker_inference() {
        let options = SessionOptions {
            inference: InferenceMode::Worker,
            ..Default::default()
        };
        let (mut session, calls) = session(options, RegionSource::Fixed(REFERENCE));
        let state = session
            .run(frames(5), &mut Controls::none(), |_, _| Ok(()))
            .unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(
            state.prediction,
            Some(Prediction {
                class_id: 1,
                probability: 0.71
            })
        );
    }

    /// Options under which every update on a flat frame fails: featureless patches score exactly
    /// 0, which is a confidence of 0.5.
    fn strict(redetect: RedetectPolicy) -> SessionOptions {
        SessionOptions {
            tracker: TrackerParams {
                confidence_threshold: 0.75,
                ..Default::default()
            },
            redetect,
            ..Default::default()
        }
    }

    #[test]
    fn featureless_scene_is_classified() {
        let start = Rect::from_top_left(50, 50, 100, 100);
        let (mut session, calls) = session(SessionOptions::default(), RegionSource::Fixed(start));
        let frame = test::flat_frame();
        session.cycle(&frame).unwrap();

        for _ in 0..3 {
            let report = session.cycle(&frame).unwrap();
            assert!(report.tracking_ok, "{report:?}");
            assert_eq!(report.tracked, Some(start));
            assert_eq!(report.window, Some(Rect::from_top_left(50, 0, 100, 120)));
            assert_eq!(report.prediction.map(|p| p.class_id), Some(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn tracking_failure_keeps_prediction() {
        let (mut session, calls) = session(
            strict(RedetectPolicy::Never),
            RegionSource::Fixed(REFERENCE),
        );
        let frame = test::flat_frame();
        session.cycle(&frame).unwrap();

        let previous = Prediction {
            class_id: 2,
            probability: 0.6,
        };
        session.state.prediction = Some(previous);
        for _ in 0..4 {
            let report = session.cycle(&frame).unwrap();
            assert_eq!(report.phase, Phase::Tracking);
            assert!(!report.started);
            assert!(!report.tracking_ok);
            assert_eq!(report.confidence, Some(0.5));
            assert_eq!(report.tracked, Some(REFERENCE));
            assert_eq!(report.window, None);
            assert_eq!(report.prediction, Some(previous));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!session.state().tracking_ok);
    }

    #[test]
    fn reinitializes_after_failures() {
        let (mut session, _) = session(
            strict(RedetectPolicy::AfterFailures(2)),
            RegionSource::Fixed(REFERENCE),
        );
        let frame = test::flat_frame();
        let reports = (0..5)
            .map(|_| session.cycle(&frame).unwrap())
            .collect::<Vec<_>>();

        let started = reports.iter().map(|r| r.started).collect::<Vec<_>>();
        assert_eq!(started, [true, false, true, false, true]);
        let ok = reports.iter().map(|r| r.tracking_ok).collect::<Vec<_>>();
        // The restarting frames report their own failed update.
        assert_eq!(ok, [true, false, false, false, false]);
        assert!(reports.iter().all(|r| r.phase == Phase::Tracking));
    }

    #[test]
    fn fixed_region_then_detector() {
        struct CountingDetector {
            calls: Arc<AtomicUsize>,
            timer: Timer,
        }
        impl RegionDetector for CountingDetector {
            fn detect(&mut self, _: &Image) -> anyhow::Result<Vec<Detection>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Detection::new(0.8, Rect::from_top_left(400, 300, 60, 60))])
            }

            fn timers(&self) -> Vec<&Timer> {
                vec![&self.timer]
            }
        }

        let detections = Arc::new(AtomicUsize::new(0));
        let detector = CountingDetector {
            calls: detections.clone(),
            timer: Timer::new("detect"),
        };
        let (mut session, _) = session(
            strict(RedetectPolicy::AfterFailures(1)),
            RegionSource::FixedThenDetector {
                region: REFERENCE,
                detector: Box::new(detector),
            },
        );
        assert_eq!(session.timers().count(), 4);

        let frame = test::flat_frame();
        let report = session.cycle(&frame).unwrap();
        assert_eq!(report.tracked, Some(REFERENCE));
        assert_eq!(detections.load(Ordering::SeqCst), 0);

        let report = session.cycle(&frame).unwrap();
        assert!(report.started);
        assert_eq!(report.tracked, Some(Rect::from_top_left(400, 300, 60, 60)));
        assert_eq!(detections.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn redetect_policy() {
        assert!(!RedetectPolicy::Never.triggers(1000));
        assert!(!RedetectPolicy::AfterFailures(3).triggers(2));
        assert!(RedetectPolicy::AfterFailures(3).triggers(3));
    }

    #[test]
    fn preprocessing_must_match_classifier() {
        let (classifier, _) = stub();
        let err = Session::new(
            SessionOptions::default(),
            classifier,
            Preprocessor::new(PreprocessParams::default(), Resolution::new(32, 32)),
            RegionSource::Fixed(REFERENCE),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn class_count_drift_is_fatal() {
        let classifier = StubClassifier {
            output: vec![0.5, 0.5],
            num_classes: 5,
            calls: Arc::default(),
        };
        let mut session = Session::new(
            SessionOptions::default(),
            Box::new(classifier),
            preprocessor(),
            RegionSource::Fixed(REFERENCE),
        )
        .unwrap();
        session.cycle(test::textured_frame()).unwrap();
        let err = session.cycle(test::textured_frame()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ClassCountMismatch {
                expected: 5,
                actual: 2
            })
        ));
    }

    #[test]
    fn region_outside_frame_is_fatal() {
        let (mut session, _) = session(
            SessionOptions::default(),
            RegionSource::Fixed(Rect::from_top_left(1000, 1000, 50, 50)),
        );
        assert!(session.cycle(test::textured_frame()).is_err());
    }
}
