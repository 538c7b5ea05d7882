//! Classifier input normalization.
//!
//! The classifier was trained on binarized, downscaled single-channel crops. This module
//! reproduces that exact transformation:
//!
//! 1. split the window into its color channels,
//! 2. apply an inverted binary threshold (`v < cutoff` becomes 255, everything else 0),
//! 3. keep one channel,
//! 4. downscale by a fixed ratio with bicubic interpolation,
//! 5. resample to the classifier's input size with bilinear interpolation.
//!
//! The result is a `[1, 1, H, W]` tensor holding values 0 to 255. No further normalization
//! happens. Changing any of these steps silently invalidates the classifier's weights, which is
//! why the parameters travel with the classifier in its bundle manifest.

use handsign_image::{AsImageView, Channel, GrayImage, Interpolation, Rect, Resolution};
use serde::Deserialize;

use crate::{error::PipelineError, nn::tensor::Tensor};

/// Preprocessing parameters the classifier was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessParams {
    /// Threshold cutoff on a 0-255 scale.
    pub threshold: u8,
    /// The channel the classifier sees.
    pub channel: Channel,
    /// Downscaling factor applied before resampling to the input size.
    pub downscale_ratio: f32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            threshold: 140,
            channel: Channel::Blue,
            downscale_ratio: 0.23,
        }
    }
}

impl PreprocessParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.downscale_ratio > 0.0 && self.downscale_ratio.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "downscale ratio must be a positive number, got {}",
                self.downscale_ratio
            )));
        }
        Ok(())
    }
}

/// Turns classification windows into classifier input tensors.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    params: PreprocessParams,
    input: Resolution,
}

impl Preprocessor {
    /// Creates a preprocessor producing tensors of `input` size.
    pub fn new(params: PreprocessParams, input: Resolution) -> Self {
        Self { params, input }
    }

    pub fn params(&self) -> &PreprocessParams {
        &self.params
    }

    pub fn input_resolution(&self) -> Resolution {
        self.input
    }

    /// Shape of the produced tensors: `[1, 1, height, width]`.
    pub fn tensor_shape(&self) -> [usize; 4] {
        [1, 1, self.input.height() as usize, self.input.width() as usize]
    }

    /// Runs steps 1 to 3: returns the binarized working channel of `window`.
    ///
    /// The threshold works on each channel independently, so only the selected one is computed.
    pub fn binarize<V: AsImageView>(&self, frame: &V, window: Rect) -> GrayImage {
        frame
            .as_view()
            .view(window)
            .channel(self.params.channel)
            .threshold_binary_inv(self.params.threshold)
    }

    /// Runs all steps on the `window` area of `frame`.
    pub fn run<V: AsImageView>(&self, frame: &V, window: Rect) -> Tensor {
        let binary = self.binarize(frame, window);
        let small = binary.scale(self.params.downscale_ratio, Interpolation::Cubic);
        let input = small.resize(self.input, Interpolation::Linear);
        Tensor::from_array_shape_fn(self.tensor_shape(), |[_, _, y, x]| {
            f32::from(input.get(x as u32, y as u32))
        })
    }
}

#[cfg(test)]
mod tests {
    use handsign_image::{Color, Image};

    use super::*;
    use crate::test;

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(PreprocessParams::default(), Resolution::new(48, 48))
    }

    #[test]
    fn deterministic() {
        let frame = test::textured_frame();
        let window = Rect::from_top_left(50, 0, 100, 120);
        let a = preprocessor().run(frame, window);
        let b = preprocessor().run(frame, window);
        assert_eq!(a.shape(), &[1, 1, 48, 48]);
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn threshold_boundary() {
        let frame = Image::from_fn((2, 1), |x, _| match x {
            0 => Color::from_rgb8(0, 0, 139),
            _ => Color::from_rgb8(0, 0, 140),
        });
        let binary = preprocessor().binarize(&frame, frame.rect());
        assert_eq!(binary.data(), &[255, 0]);
    }

    #[test]
    fn selects_configured_channel() {
        // Dark blue, bright red.
        let frame = Image::filled((100, 100), Color::from_rgb8(250, 0, 10));
        let blue = preprocessor().run(&frame, frame.rect());
        assert!(blue.data().iter().all(|&v| v == 255.0));

        let red = Preprocessor::new(
            PreprocessParams {
                channel: Channel::Red,
                ..Default::default()
            },
            Resolution::new(48, 48),
        )
        .run(&frame, frame.rect());
        assert!(red.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn values_stay_in_pixel_range() {
        let tensor = preprocessor().run(
            test::textured_frame(),
            Rect::from_top_left(0, 0, 640, 480),
        );
        assert!(tensor.data().iter().all(|v| (0.0..=255.0).contains(v)));
    }

    #[test]
    fn tiny_windows_still_produce_full_tensors() {
        let frame = test::textured_frame();
        let tensor = preprocessor().run(frame, Rect::from_top_left(10, 10, 2, 3));
        assert_eq!(tensor.shape(), &[1, 1, 48, 48]);
    }

    #[test]
    fn rejects_bad_ratio() {
        let params = PreprocessParams {
            downscale_ratio: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
