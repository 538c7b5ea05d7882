//! Session configuration and classifier bundles.
//!
//! Both are TOML files. Relative paths inside a file are resolved against the directory that
//! contains it, so a configuration directory can be moved around as a whole.
//!
//! A session configuration looks like this (only `classifier` is required):
//!
//! ```toml
//! frames = "frames"
//! classifier = "model/gesture.toml"
//! region = { x = 220, y = 180, width = 120, height = 120 }
//! inference = "worker"
//! redetect = { after_failures = 30 }
//!
//! [detector]
//! model = "model/hand.onnx"
//! threshold = 0.6
//!
//! [tracker]
//! search_radius = 30.0
//!
//! [window]
//! top = 1.3
//! bottom = 0.7
//! ```
//!
//! A classifier bundle describes the classifier network together with the exact preprocessing it
//! was trained with:
//!
//! ```toml
//! format_version = 1
//! model = "gesture.onnx"
//! num_classes = 5
//! input_width = 48
//! input_height = 48
//!
//! [preprocess]
//! threshold = 140
//! channel = "blue"
//! downscale_ratio = 0.23
//! ```

use std::path::{Path, PathBuf};

use handsign_image::{Rect, Resolution};
use serde::Deserialize;

use crate::{
    error::{Artifact, PipelineError},
    pipeline::{InferenceMode, RedetectPolicy},
    preprocess::PreprocessParams,
    tracker::TrackerParams,
    window::WindowOffsets,
};

const DEFAULT_FRAMES_DIR: &str = "frames";
const DEFAULT_DETECTOR_THRESHOLD: f32 = 0.5;
const DEFAULT_DETECTOR_IOU: f32 = 0.3;

/// The only classifier bundle format this version understands.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    frames: Option<PathBuf>,
    classifier: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
    region: Option<RegionConfigFile>,
    tracker: Option<TrackerParams>,
    window: Option<WindowOffsets>,
    redetect: Option<RedetectPolicy>,
    inference: Option<InferenceMode>,
    max_frames: Option<u64>,
    annotate: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    model: PathBuf,
    threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionConfigFile {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

/// Settings for the CNN region detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub model: PathBuf,
    /// Minimum confidence of a detection.
    pub threshold: f32,
    /// Overlap above which detections are merged.
    pub iou_threshold: f32,
}

/// Everything a tracking session needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory containing the input frames.
    pub frames: PathBuf,
    /// Path to the classifier bundle manifest.
    pub classifier: PathBuf,
    pub detector: Option<DetectorSettings>,
    /// Initial tracking region. When a detector is configured as well, it is only used to
    /// reinitialize tracking.
    pub region: Option<Rect>,
    pub tracker: TrackerParams,
    pub window: WindowOffsets,
    pub redetect: RedetectPolicy,
    pub inference: InferenceMode,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    /// Directory to write annotated frames to.
    pub annotate: Option<PathBuf>,
}

impl SessionConfig {
    /// Creates a configuration with default settings for everything but the classifier.
    pub fn new(classifier: impl Into<PathBuf>) -> Self {
        Self {
            frames: PathBuf::from(DEFAULT_FRAMES_DIR),
            classifier: classifier.into(),
            detector: None,
            region: None,
            tracker: TrackerParams::default(),
            window: WindowOffsets::default(),
            redetect: RedetectPolicy::default(),
            inference: InferenceMode::default(),
            max_frames: None,
            annotate: None,
        }
    }

    /// Reads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let cfg = Self::from_toml(&raw, base)?;
        log::debug!("loaded session config from {}: {:?}", path.display(), cfg);
        Ok(cfg)
    }

    /// Parses and validates a configuration, resolving relative paths against `base`.
    pub fn from_toml(raw: &str, base: &Path) -> anyhow::Result<Self> {
        let file: SessionConfigFile = toml::from_str(raw)
            .map_err(|e| PipelineError::InvalidConfig(format!("invalid config file: {e}")))?;
        let cfg = Self::from_file(file, base)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SessionConfigFile, base: &Path) -> anyhow::Result<Self> {
        let classifier = file.classifier.ok_or_else(|| {
            PipelineError::InvalidConfig("`classifier` bundle path is required".into())
        })?;
        let mut cfg = Self::new(base.join(classifier));
        cfg.frames = base.join(file.frames.unwrap_or_else(|| DEFAULT_FRAMES_DIR.into()));
        cfg.detector = file.detector.map(|det| DetectorSettings {
            model: base.join(det.model),
            threshold: det.threshold.unwrap_or(DEFAULT_DETECTOR_THRESHOLD),
            iou_threshold: det.iou_threshold.unwrap_or(DEFAULT_DETECTOR_IOU),
        });
        cfg.region = file
            .region
            .map(|r| Rect::from_top_left(r.x, r.y, r.width, r.height));
        cfg.tracker = file.tracker.unwrap_or_default();
        cfg.window = file.window.unwrap_or_default();
        cfg.redetect = file.redetect.unwrap_or_default();
        cfg.inference = file.inference.unwrap_or_default();
        cfg.max_frames = file.max_frames;
        cfg.annotate = file.annotate.map(|dir| base.join(dir));
        Ok(cfg)
    }

    /// Checks the configuration for out-of-range or inconsistent values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.tracker
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(format!("[tracker]: {e}")))?;

        let WindowOffsets { top, bottom } = self.window;
        if !top.is_finite() || !bottom.is_finite() || top + bottom <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "[window] offsets must be finite and span a positive height, \
                 got top={top}, bottom={bottom}"
            ))
            .into());
        }
        if let Some(region) = self.region {
            if region.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "`region` must not be empty, got {region:?}"
                ))
                .into());
            }
        }
        if let Some(det) = &self.detector {
            if !(0.0..=1.0).contains(&det.threshold) || !(0.0..=1.0).contains(&det.iou_threshold) {
                return Err(PipelineError::InvalidConfig(format!(
                    "[detector] thresholds must be in [0, 1], got threshold={}, iou_threshold={}",
                    det.threshold, det.iou_threshold
                ))
                .into());
            }
        }
        if let RedetectPolicy::AfterFailures(0) = self.redetect {
            return Err(PipelineError::InvalidConfig(
                "`redetect.after_failures` must be at least 1".into(),
            )
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BundleFile {
    format_version: u32,
    model: PathBuf,
    #[serde(default)]
    output: usize,
    num_classes: usize,
    input_width: u32,
    input_height: u32,
    preprocess: PreprocessParams,
}

/// A classifier network together with the preprocessing it expects.
#[derive(Debug, Clone)]
pub struct ClassifierBundle {
    /// Directory containing the manifest.
    pub(crate) dir: PathBuf,
    pub format_version: u32,
    /// Network file, relative to the manifest.
    pub model: PathBuf,
    /// Index of the network output holding the class probabilities.
    pub output: usize,
    pub num_classes: usize,
    pub input_width: u32,
    pub input_height: u32,
    pub preprocess: PreprocessParams,
}

impl ClassifierBundle {
    /// Reads a bundle manifest.
    ///
    /// Failures are reported as [`PipelineError::ModelLoad`] for the manifest.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let err = |reason: String| {
            PipelineError::model_load(Artifact::ClassifierManifest, path, reason)
        };

        let raw = std::fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml(&raw, dir).map_err(|e| match e.downcast::<PipelineError>() {
            Ok(PipelineError::InvalidConfig(msg)) => err(msg).into(),
            Ok(other) => other.into(),
            Err(e) => err(e.to_string()).into(),
        })
    }

    /// Parses a bundle manifest located in `dir`.
    pub fn from_toml(raw: &str, dir: &Path) -> anyhow::Result<Self> {
        let file: BundleFile = toml::from_str(raw)?;
        if file.format_version != BUNDLE_FORMAT_VERSION {
            return Err(PipelineError::InvalidConfig(format!(
                "unsupported bundle format version {} (expected {})",
                file.format_version, BUNDLE_FORMAT_VERSION
            ))
            .into());
        }
        if file.num_classes == 0 {
            return Err(
                PipelineError::InvalidConfig("`num_classes` must be at least 1".into()).into(),
            );
        }
        if file.input_width == 0 || file.input_height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "input size must not be empty, got {}x{}",
                file.input_width, file.input_height
            ))
            .into());
        }
        file.preprocess.validate()?;

        Ok(Self {
            dir: dir.to_path_buf(),
            format_version: file.format_version,
            model: file.model,
            output: file.output,
            num_classes: file.num_classes,
            input_width: file.input_width,
            input_height: file.input_height,
            preprocess: file.preprocess,
        })
    }

    /// Returns the resolved path of the network file.
    pub fn model_path(&self) -> PathBuf {
        self.dir.join(&self.model)
    }

    pub fn input_resolution(&self) -> Resolution {
        Resolution::new(self.input_width, self.input_height)
    }

    /// The classifier's input tensor shape, `[1, 1, height, width]`.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, 1, self.input_height as usize, self.input_width as usize]
    }
}

#[cfg(test)]
mod tests {
    use handsign_image::Channel;

    use super::*;

    const BUNDLE: &str = r#"
        format_version = 1
        model = "gesture.onnx"
        num_classes = 5
        input_width = 48
        input_height = 48

        [preprocess]
        threshold = 140
        channel = "blue"
        downscale_ratio = 0.23
    "#;

    #[test]
    fn minimal_session_config() {
        let cfg = SessionConfig::from_toml(
            r#"classifier = "model/gesture.toml""#,
            Path::new("/etc/handsign"),
        )
        .unwrap();
        assert_eq!(cfg.classifier, Path::new("/etc/handsign/model/gesture.toml"));
        assert_eq!(cfg.frames, Path::new("/etc/handsign/frames"));
        assert_eq!(cfg.tracker, TrackerParams::default());
        assert_eq!(cfg.window, WindowOffsets::default());
        assert_eq!(cfg.redetect, RedetectPolicy::Never);
        assert_eq!(cfg.inference, InferenceMode::Inline);
        assert!(cfg.detector.is_none());
        assert!(cfg.region.is_none());
    }

    #[test]
    fn full_session_config() {
        let cfg = SessionConfig::from_toml(
            r#"
            frames = "/data/frames"
            classifier = "gesture.toml"
            region = { x = 50, y = 60, width = 100, height = 90 }
            inference = "worker"
            redetect = { after_failures = 30 }
            max_frames = 200
            annotate = "out"

            [detector]
            model = "hand.onnx"

            [tracker]
            search_radius = 30.0

            [window]
            top = 1.0
            "#,
            Path::new("cfg"),
        )
        .unwrap();
        assert_eq!(cfg.frames, Path::new("/data/frames"));
        assert_eq!(cfg.region, Some(Rect::from_top_left(50, 60, 100, 90)));
        assert_eq!(cfg.inference, InferenceMode::Worker);
        assert_eq!(cfg.redetect, RedetectPolicy::AfterFailures(30));
        assert_eq!(cfg.max_frames, Some(200));
        assert_eq!(cfg.annotate.as_deref(), Some(Path::new("cfg/out")));
        let det = cfg.detector.unwrap();
        assert_eq!(det.model, Path::new("cfg/hand.onnx"));
        assert_eq!(det.threshold, DEFAULT_DETECTOR_THRESHOLD);
        assert_eq!(cfg.tracker.search_radius, 30.0);
        assert_eq!(cfg.tracker.num_features, 250);
        assert_eq!(cfg.window.top, 1.0);
        assert_eq!(cfg.window.bottom, 0.7);
    }

    #[test]
    fn session_config_errors() {
        for raw in [
            "",
            r#"classifier = "c.toml"
               unknown = 1"#,
            r#"classifier = "c.toml"
               region = { x = 0, y = 0, width = 0, height = 10 }"#,
            r#"classifier = "c.toml"
               redetect = { after_failures = 0 }"#,
            r#"classifier = "c.toml"
               [tracker]
               num_selected = 500"#,
            r#"classifier = "c.toml"
               [window]
               top = -1.0
               bottom = 0.5"#,
        ] {
            let err = SessionConfig::from_toml(raw, Path::new("")).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<PipelineError>(),
                    Some(PipelineError::InvalidConfig(_))
                ),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn bundle_manifest() {
        let bundle = ClassifierBundle::from_toml(BUNDLE, Path::new("model")).unwrap();
        assert_eq!(bundle.model_path(), Path::new("model/gesture.onnx"));
        assert_eq!(bundle.input_shape(), [1, 1, 48, 48]);
        assert_eq!(bundle.input_resolution(), Resolution::new(48, 48));
        assert_eq!(bundle.num_classes, 5);
        assert_eq!(bundle.output, 0);
        assert_eq!(bundle.preprocess.channel, Channel::Blue);
        assert_eq!(bundle.preprocess, PreprocessParams::default());
    }

    #[test]
    fn bundle_rejects_unknown_version() {
        let raw = BUNDLE.replace("format_version = 1", "format_version = 2");
        let err = ClassifierBundle::from_toml(&raw, Path::new("")).unwrap_err();
        assert!(err.to_string().contains("format version 2"), "{err}");
    }

    #[test]
    fn bundle_requires_preprocessing() {
        let raw = BUNDLE.split("[preprocess]").next().unwrap();
        assert!(ClassifierBundle::from_toml(raw, Path::new("")).is_err());
    }

    #[test]
    fn missing_bundle_names_manifest() {
        let err = ClassifierBundle::load("/nonexistent/gesture.toml").unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::ModelLoad { artifact, .. }) => {
                assert_eq!(*artifact, Artifact::ClassifierManifest)
            }
            _ => panic!("unexpected error: {err}"),
        }
    }
}
