//! Gesture classification.

use std::fmt;

use crate::{
    config::ClassifierBundle,
    error::{Artifact, PipelineError},
    nn::{tensor::Tensor, NeuralNetwork},
};

/// Per-class probabilities returned by a [`Classifier`].
#[derive(Clone, PartialEq)]
pub struct ClassDistribution {
    probabilities: Vec<f32>,
}

impl ClassDistribution {
    pub fn new(probabilities: Vec<f32>) -> Self {
        Self { probabilities }
    }

    /// Returns the number of classes.
    #[inline]
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    #[inline]
    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    /// Returns the most likely class and its probability.
    ///
    /// Ties go to the lowest class index. Non-finite entries are never selected. Returns [`None`]
    /// if no entry is finite.
    pub fn max_class(&self) -> Option<(usize, f32)> {
        self.probabilities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .fold(None, |best, (class, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((class, p)),
            })
    }
}

impl fmt::Debug for ClassDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.probabilities).finish()
    }
}

impl From<Vec<f32>> for ClassDistribution {
    fn from(probabilities: Vec<f32>) -> Self {
        Self::new(probabilities)
    }
}

/// A trained gesture classifier.
///
/// Classifiers are stateless: the same tensor always produces the same distribution. They are
/// [`Send`] so that inference can be moved to a worker thread.
pub trait Classifier: Send {
    /// The tensor shape accepted by [`Classifier::infer`], `[1, 1, height, width]`.
    fn input_shape(&self) -> [usize; 4];

    /// The number of classes in every returned [`ClassDistribution`].
    fn num_classes(&self) -> usize;

    /// Classifies a preprocessed window.
    ///
    /// Fails with [`PipelineError::ShapeMismatch`] if `tensor` does not have
    /// [`Classifier::input_shape`].
    fn infer(&self, tensor: &Tensor) -> anyhow::Result<ClassDistribution>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn input_shape(&self) -> [usize; 4] {
        (**self).input_shape()
    }

    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn infer(&self, tensor: &Tensor) -> anyhow::Result<ClassDistribution> {
        (**self).infer(tensor)
    }
}

/// Checks a tensor against a classifier's input shape.
pub(crate) fn check_input_shape(expected: [usize; 4], tensor: &Tensor) -> anyhow::Result<()> {
    if tensor.shape() != expected {
        return Err(PipelineError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: tensor.shape().to_vec(),
        }
        .into());
    }
    Ok(())
}

/// A classifier backed by an ONNX network.
pub struct OnnxClassifier {
    network: NeuralNetwork,
    input_shape: [usize; 4],
    num_classes: usize,
}

impl OnnxClassifier {
    /// Loads the network referenced by a classifier bundle.
    ///
    /// The network must take a single `[1, 1, input_height, input_width]` input, and its selected
    /// output must hold exactly `num_classes` values. Any failure is reported as
    /// [`PipelineError::ModelLoad`] or [`PipelineError::ClassCountMismatch`].
    pub fn load(bundle: &ClassifierBundle) -> anyhow::Result<Self> {
        let path = bundle.model_path();
        let network = NeuralNetwork::from_path(&path)
            .and_then(|loader| loader.with_output_selection([bundle.output]).load())
            .map_err(|e| PipelineError::model_load(Artifact::Classifier, &path, format!("{e:#}")))?;
        let this = Self::from_network(network, bundle.input_shape(), bundle.num_classes)
            .map_err(|e| match e.downcast::<PipelineError>() {
                Ok(e) => anyhow::Error::from(e),
                Err(e) => PipelineError::model_load(Artifact::Classifier, &path, e).into(),
            })?;
        log::info!(
            "loaded gesture classifier from '{}' ({} classes, input {:?})",
            path.display(),
            this.num_classes,
            this.input_shape,
        );
        Ok(this)
    }

    /// Wraps an already loaded network.
    pub fn from_network(
        network: NeuralNetwork,
        input_shape: [usize; 4],
        num_classes: usize,
    ) -> anyhow::Result<Self> {
        if network.inputs().len() != 1 {
            anyhow::bail!(
                "classifier network must have 1 input, this one has {}",
                network.inputs().len()
            );
        }
        let input = &network.inputs()[0];
        if input.shape() != input_shape {
            return Err(PipelineError::ShapeMismatch {
                expected: input_shape.to_vec(),
                actual: input.shape().to_vec(),
            }
            .into());
        }
        let Some(output) = network.outputs().first() else {
            anyhow::bail!("classifier network has no outputs");
        };
        let actual = output.shape().iter().product::<usize>();
        if actual != num_classes {
            return Err(PipelineError::ClassCountMismatch {
                expected: num_classes,
                actual,
            }
            .into());
        }

        Ok(Self {
            network,
            input_shape,
            num_classes,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn infer(&self, tensor: &Tensor) -> anyhow::Result<ClassDistribution> {
        check_input_shape(self.input_shape, tensor)?;
        let outputs = self.network.estimate(&tensor.clone().into())?;
        let probabilities = outputs[0].data().to_vec();
        if probabilities.len() != self.num_classes {
            return Err(PipelineError::ClassCountMismatch {
                expected: self.num_classes,
                actual: probabilities.len(),
            }
            .into());
        }
        Ok(ClassDistribution::new(probabilities))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::preprocess::PreprocessParams;

    use super::*;

    #[test]
    fn max_class_picks_most_likely() {
        let dist = ClassDistribution::new(vec![0.05, 0.71, 0.10, 0.02, 0.12]);
        assert_eq!(dist.max_class(), Some((1, 0.71)));
    }

    #[test]
    fn max_class_ties_go_to_lowest_index() {
        let dist = ClassDistribution::new(vec![0.1, 0.4, 0.4, 0.1]);
        assert_eq!(dist.max_class(), Some((1, 0.4)));
    }

    #[test]
    fn max_class_of_empty_distribution() {
        assert_eq!(ClassDistribution::new(Vec::new()).max_class(), None);
    }

    #[test]
    fn max_class_skips_non_finite() {
        let dist = ClassDistribution::new(vec![0.2, 0.7, f32::NAN]);
        assert_eq!(dist.max_class(), Some((1, 0.7)));
        let dist = ClassDistribution::new(vec![f32::NAN, 0.1, f32::INFINITY]);
        assert_eq!(dist.max_class(), Some((1, 0.1)));
        assert_eq!(ClassDistribution::new(vec![f32::NAN]).max_class(), None);
    }

    #[test]
    fn input_shape_check() {
        let ok = Tensor::from_array_shape_fn([1, 1, 48, 48], |_| 0.0);
        check_input_shape([1, 1, 48, 48], &ok).unwrap();

        let bad = Tensor::from_array_shape_fn([1, 1, 32, 48], |_| 0.0);
        let err = check_input_shape([1, 1, 48, 48], &bad).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn missing_model_is_a_load_error() {
        let bundle = ClassifierBundle {
            dir: PathBuf::from("/nonexistent"),
            format_version: 1,
            model: PathBuf::from("gesture.onnx"),
            output: 0,
            num_classes: 5,
            input_width: 48,
            input_height: 48,
            preprocess: PreprocessParams::default(),
        };
        let err = OnnxClassifier::load(&bundle).err().unwrap();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::ModelLoad { artifact, path, .. }) => {
                assert_eq!(*artifact, Artifact::Classifier);
                assert_eq!(path, &PathBuf::from("/nonexistent/gesture.onnx"));
            }
            _ => panic!("unexpected error: {err}"),
        }
    }
}
