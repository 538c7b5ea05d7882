//! Neural network inference.
//!
//! Networks are loaded from ONNX files and executed on the CPU with [`tract_onnx`]. Both the
//! gesture classifier and the CNN region detector are built on top of [`NeuralNetwork`].

pub mod tensor;

use std::{borrow::Cow, ops::Index, path::Path, sync::Arc};

use tensor::Tensor;
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::error::PipelineError;

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Neural network loader.
pub struct Loader<'a> {
    model_data: Cow<'a, [u8]>,
    outputs: Option<Vec<usize>>,
}

impl<'a> Loader<'a> {
    fn new(data: Cow<'a, [u8]>) -> Self {
        Self {
            model_data: data,
            outputs: None,
        }
    }

    /// Only compute the specified outputs during inference.
    ///
    /// This takes a list of network output indices. The [`Outputs`] returned from
    /// [`NeuralNetwork::estimate`] will then contain just the chosen tensors, in the given order.
    /// Classifiers exported with auxiliary heads use this to select their probability output.
    pub fn with_output_selection<O>(mut self, outputs: O) -> Self
    where
        O: Into<Vec<usize>>,
    {
        self.outputs = Some(outputs.into());
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed or incomplete, if it uses unimplemented
    /// operations, or if any input or output has a symbolic (not fully known) shape.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)?
            .into_optimized()?;
        let outputs = graph.output_outlets()?;
        let selected_outputs = match self.outputs {
            Some(indices) => indices
                .iter()
                .map(|&i| {
                    outputs.get(i).copied().ok_or_else(|| {
                        anyhow::anyhow!(
                            "output index {i} out of range (network has {} outputs)",
                            outputs.len()
                        )
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => outputs.to_vec(),
        };
        let plan = SimplePlan::new_for_outputs(graph, &selected_outputs)?;

        let model = plan.model();
        let mut inputs = Vec::new();
        for (id, outlet) in model.input_outlets()?.iter().enumerate() {
            inputs.push(TensorInfo::new(
                &model.node(outlet.node).name,
                model.input_fact(id)?,
            )?);
        }
        let mut outputs = Vec::new();
        for (id, outlet) in model.output_outlets()?.iter().enumerate() {
            outputs.push(TensorInfo::new(
                &model.node(outlet.node).name,
                model.output_fact(id)?,
            )?);
        }

        log::debug!(
            "loaded network; inputs: {:?}; outputs: {:?}",
            inputs,
            outputs
        );

        Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
            plan,
            inputs,
            outputs,
        })))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    plan: Model,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl NeuralNetwork {
    /// Reads a pre-trained model from an ONNX file path.
    ///
    /// The path must have an `.onnx` extension.
    pub fn from_path<'a, P: AsRef<Path>>(path: P) -> anyhow::Result<Loader<'a>> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl<'a>(path: &Path) -> anyhow::Result<Loader<'a>> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!("neural network file must have `.onnx` extension"),
        }

        let model_data = std::fs::read(path)?;
        Ok(Loader::new(model_data.into()))
    }

    /// Reads a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8]) -> Loader<'_> {
        Loader::new(raw.into())
    }

    /// Returns information about the network's inputs, in order.
    ///
    /// To perform inference, a tensor of matching shape has to be provided for each input.
    pub fn inputs(&self) -> &[TensorInfo] {
        &self.0.inputs
    }

    /// Returns information about the network's (selected) outputs, in order.
    pub fn outputs(&self) -> &[TensorInfo] {
        &self.0.outputs
    }

    /// Runs the network on a set of [`Inputs`], returning the estimated [`Outputs`].
    ///
    /// Fails with [`PipelineError::ShapeMismatch`] if the number or shapes of `inputs` do not
    /// match the network's inputs.
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &Inputs) -> anyhow::Result<Outputs> {
        if inputs.len() != self.inputs().len() {
            anyhow::bail!(
                "network takes {} inputs, but {} were provided",
                self.inputs().len(),
                inputs.len()
            );
        }
        for (info, tensor) in self.inputs().iter().zip(inputs.iter()) {
            if info.shape() != tensor.shape() {
                return Err(PipelineError::ShapeMismatch {
                    expected: info.shape().to_vec(),
                    actual: tensor.shape().to_vec(),
                }
                .into());
            }
        }

        let values = inputs
            .iter()
            .map(|t| Ok(TValue::from_const(Arc::new(t.to_tract()?))))
            .collect::<anyhow::Result<TVec<_>>>()?;
        let outputs = self.0.plan.run(values)?;
        let inner = outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect::<anyhow::Result<TVec<_>>>()?;
        Ok(Outputs { inner })
    }
}

/// Name and shape of a network input or output.
#[derive(Debug, Clone)]
pub struct TensorInfo {
    name: String,
    shape: Vec<usize>,
}

impl TensorInfo {
    fn new(name: &str, fact: &TypedFact) -> anyhow::Result<Self> {
        let shape = fact.shape.as_concrete().ok_or_else(|| {
            anyhow::anyhow!(
                "network tensor '{name}' has symbolic shape {:?}",
                fact.shape
            )
        })?;
        Ok(Self {
            name: name.to_string(),
            shape: shape.to_vec(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's (selected) output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

/// List of input tensors for neural network inference.
#[derive(Debug)]
pub struct Inputs {
    inner: TVec<Tensor>,
}

impl Inputs {
    /// Returns the number of input tensors stored in `self`.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.inner.iter()
    }
}

impl From<Tensor> for Inputs {
    fn from(t: Tensor) -> Self {
        Self { inner: tvec![t] }
    }
}

impl FromIterator<Tensor> for Inputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_onnx_paths() {
        let err = NeuralNetwork::from_path("model/train_iter_2000.caffemodel")
            .err()
            .unwrap();
        assert!(err.to_string().contains(".onnx"), "{err}");
    }

    #[test]
    fn rejects_garbage_model_data() {
        assert!(NeuralNetwork::from_onnx(b"definitely not protobuf")
            .load()
            .is_err());
    }

    #[test]
    fn inputs_from_tensors() {
        let inputs: Inputs = [Tensor::from([1.0]), Tensor::from([2.0, 3.0])]
            .into_iter()
            .collect();
        assert_eq!(inputs.len(), 2);
        assert!(!inputs.is_empty());
    }
}
