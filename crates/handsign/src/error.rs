//! Structural pipeline failures.
//!
//! These are the failures a caller has to be able to tell apart. They are returned wrapped in an
//! [`anyhow::Error`] and can be recovered with [`anyhow::Error::downcast_ref`]. Transient
//! conditions (tracking loss, an oversized window) are not errors and never show up here.

use std::{fmt, path::PathBuf};

/// Which model artifact failed to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Classifier,
    ClassifierManifest,
    Detector,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Artifact::Classifier => "classifier model",
            Artifact::ClassifierManifest => "classifier manifest",
            Artifact::Detector => "detector model",
        })
    }
}

#[derive(Debug)]
pub enum PipelineError {
    /// A model or manifest could not be read or parsed. Always fatal at startup.
    ModelLoad {
        artifact: Artifact,
        path: PathBuf,
        reason: String,
    },
    /// A tensor handed to (or produced by) a network does not have the configured shape.
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// The classifier produced a different number of classes than its manifest declares.
    ClassCountMismatch { expected: usize, actual: usize },
    /// A configuration value is out of range or inconsistent.
    InvalidConfig(String),
}

impl PipelineError {
    pub(crate) fn model_load(
        artifact: Artifact,
        path: impl Into<PathBuf>,
        reason: impl fmt::Display,
    ) -> Self {
        PipelineError::ModelLoad {
            artifact,
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::ModelLoad {
                artifact,
                path,
                reason,
            } => write!(
                f,
                "failed to load {artifact} from '{}': {reason}",
                path.display()
            ),
            PipelineError::ShapeMismatch { expected, actual } => write!(
                f,
                "tensor shape mismatch: expected {expected:?}, got {actual:?}"
            ),
            PipelineError::ClassCountMismatch { expected, actual } => write!(
                f,
                "classifier returned {actual} classes, but {expected} are configured"
            ),
            PipelineError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_load_names_artifact_and_path() {
        let err =
            PipelineError::model_load(Artifact::Classifier, "model/gesture.onnx", "no such file");
        assert_eq!(
            err.to_string(),
            "failed to load classifier model from 'model/gesture.onnx': no such file"
        );
    }

    #[test]
    fn downcast_through_anyhow() {
        let err = anyhow::Error::from(PipelineError::ShapeMismatch {
            expected: vec![1, 1, 48, 48],
            actual: vec![1, 1, 32, 32],
        });
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ShapeMismatch { .. })
        ));
    }
}
