//! Coarse hand region detection.
//!
//! A [`RegionDetector`] proposes rectangles that likely contain a hand. The pipeline uses the most
//! confident one to seed the tracker, either when a session starts without a fixed region or when
//! tracking has failed for too long.

pub mod nms;

use handsign_image::{Channel, Image, Rect, Resolution};

use crate::{
    config::DetectorSettings,
    error::{Artifact, PipelineError},
    nn::{tensor::Tensor, NeuralNetwork},
    num::TotalF32,
    timer::Timer,
};

use self::nms::NonMaxSuppression;

/// A detected hand region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Confidence between 0.0 and 1.0.
    pub confidence: f32,
    pub rect: Rect,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self { confidence, rect }
    }
}

/// Something that finds hand-like regions in a frame.
pub trait RegionDetector {
    /// Returns all candidate regions in `frame`, possibly none.
    fn detect(&mut self, frame: &Image) -> anyhow::Result<Vec<Detection>>;

    /// Stage timers reported alongside the pipeline's frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

/// Returns the rectangle of the most confident detection.
pub fn best_region(detections: &[Detection]) -> Option<Rect> {
    detections
        .iter()
        .max_by_key(|det| TotalF32(det.confidence))
        .map(|det| det.rect)
}

/// A single-class CNN detector.
///
/// The network takes one `[1, 3, H, W]` RGB input with values in `[0, 1]` and produces one
/// `[1, N, 5]` output whose rows are `(x_center, y_center, width, height, score)`, with
/// coordinates relative to the input size. Frames are stretched to the input size, so the
/// coordinates map back to the frame by scaling alone.
pub struct CnnRegionDetector {
    network: NeuralNetwork,
    input: Resolution,
    threshold: f32,
    nms: NonMaxSuppression,
    t_infer: Timer,
    t_nms: Timer,
}

impl CnnRegionDetector {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    /// Loads the detector network configured in `settings`.
    ///
    /// Failures are reported as [`PipelineError::ModelLoad`].
    pub fn load(settings: &DetectorSettings) -> anyhow::Result<Self> {
        let path = &settings.model;
        let mut this = NeuralNetwork::from_path(path)
            .and_then(|loader| loader.load())
            .and_then(Self::new)
            .map_err(|e| PipelineError::model_load(Artifact::Detector, path, format!("{e:#}")))?;
        this.set_threshold(settings.threshold);
        this.nms_mut().set_iou_thresh(settings.iou_threshold);
        log::info!(
            "loaded region detector from '{}' (input {})",
            path.display(),
            this.input
        );
        Ok(this)
    }

    /// Wraps a loaded network, checking its input and output shapes.
    pub fn new(network: NeuralNetwork) -> anyhow::Result<Self> {
        let (Some(input), Some(output)) = (network.inputs().first(), network.outputs().first())
        else {
            anyhow::bail!("detector network needs an input and an output");
        };
        let input_res = match *input.shape() {
            [1, 3, h, w] if h > 0 && w > 0 => Resolution::new(w as u32, h as u32),
            _ => anyhow::bail!(
                "detector input must have shape [1, 3, H, W], got {:?}",
                input.shape()
            ),
        };
        if !matches!(*output.shape(), [1, _, 5]) {
            anyhow::bail!(
                "detector output must have shape [1, N, 5], got {:?}",
                output.shape()
            );
        }

        Ok(Self {
            network,
            input: input_res,
            threshold: Self::DEFAULT_THRESHOLD,
            nms: NonMaxSuppression::new(),
            t_infer: Timer::new("detect"),
            t_nms: Timer::new("nms"),
        })
    }

    pub fn input_resolution(&self) -> Resolution {
        self.input
    }

    #[inline]
    pub fn set_threshold(&mut self, thresh: f32) {
        self.threshold = thresh;
    }

    pub fn nms_mut(&mut self) -> &mut NonMaxSuppression {
        &mut self.nms
    }
}

impl RegionDetector for CnnRegionDetector {
    fn detect(&mut self, frame: &Image) -> anyhow::Result<Vec<Detection>> {
        let input = input_tensor(frame, self.input);
        let outputs = self.t_infer.time(|| self.network.estimate(&input.into()))?;
        log::trace!("detector output: {:?}", outputs);

        let mut detections = decode(&outputs[0], self.threshold, frame.resolution());
        let detections = self
            .t_nms
            .time(|| self.nms.process(&mut detections).collect::<Vec<_>>());
        log::debug!("{} hand region candidates", detections.len());
        Ok(detections)
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_infer, &self.t_nms]
    }
}

/// Stretches `frame` to `input` with nearest-neighbor sampling and converts it to NCHW RGB.
fn input_tensor(frame: &Image, input: Resolution) -> Tensor {
    let (fw, fh) = (u64::from(frame.width()), u64::from(frame.height()));
    let (iw, ih) = (u64::from(input.width()), u64::from(input.height()));
    Tensor::from_array_shape_fn(
        [1, 3, input.height() as usize, input.width() as usize],
        |[_, c, y, x]| {
            let sx = (x as u64 * fw / iw) as u32;
            let sy = (y as u64 * fh / ih) as u32;
            f32::from(frame.get(sx, sy).channel(Channel::ALL[c])) / 255.0
        },
    )
}

/// Extracts all rows of a `[1, N, 5]` output scoring at least `threshold`.
fn decode(output: &Tensor, threshold: f32, frame: Resolution) -> Vec<Detection> {
    let (fw, fh) = (frame.width() as f32, frame.height() as f32);
    output
        .index([0])
        .iter()
        .filter_map(|row| {
            let &[cx, cy, w, h, score] = row.as_slice() else {
                return None;
            };
            if !(score >= threshold) || !(w > 0.0 && h > 0.0) {
                return None;
            }
            let rect = Rect::from_center(
                (cx * fw).round() as i32,
                (cy * fh).round() as i32,
                (w * fw).round() as u32,
                (h * fh).round() as u32,
            );
            let clipped = rect.intersection(&frame.rect())?;
            Some(Detection::new(score, clipped))
        })
        .collect()
}
