//! Model formats the guard can serve.

use std::path::Path;

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensorError, SafeTensors};

use crate::{PredictError, ReloadError};

/// A loaded classifier producing class probabilities.
pub trait Scorer: Send + Sync {
    /// Number of features expected per input.
    fn input_len(&self) -> usize;

    fn class_count(&self) -> usize;

    /// Returns one probability per class, summing to one.
    fn probabilities(&self, features: &[f32]) -> Result<Vec<f32>, PredictError>;
}

/// Builds a [`Scorer`] from a model file on local storage.
///
/// Loading is blocking and runs off the async runtime.
pub trait ScorerLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn Scorer>, ReloadError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelFormatError {
    #[error(transparent)]
    Safetensors(#[from] SafeTensorError),

    #[error("tensor `{name}` has dtype {dtype:?}, expected F32")]
    Dtype { name: &'static str, dtype: Dtype },

    #[error("tensor `{name}` has unexpected shape {shape:?}")]
    Shape {
        name: &'static str,
        shape: Vec<usize>,
    },

    #[error("model has no classes")]
    Empty,
}

const WEIGHT: &str = "weight";
const BIAS: &str = "bias";

/// Single dense layer followed by softmax.
///
/// Stored as `safetensors` with an F32 `weight` of shape `[classes, inputs]`
/// and an F32 `bias` of shape `[classes]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseClassifier {
    weight: Vec<f32>,
    bias: Vec<f32>,
    inputs: usize,
}

impl DenseClassifier {
    /// `weight` is row-major, one row of `inputs` values per class.
    pub fn new(weight: Vec<f32>, bias: Vec<f32>, inputs: usize) -> Result<Self, ModelFormatError> {
        if bias.is_empty() || inputs == 0 {
            return Err(ModelFormatError::Empty);
        }
        if weight.len() != bias.len() * inputs {
            return Err(ModelFormatError::Shape {
                name: WEIGHT,
                shape: vec![weight.len()],
            });
        }
        Ok(Self {
            weight,
            bias,
            inputs,
        })
    }

    pub fn from_safetensors(bytes: &[u8]) -> Result<Self, ModelFormatError> {
        let tensors = SafeTensors::deserialize(bytes)?;

        let weight = tensors.tensor(WEIGHT)?;
        let bias = tensors.tensor(BIAS)?;
        check_f32(WEIGHT, &weight)?;
        check_f32(BIAS, &bias)?;

        let (classes, inputs) = match *weight.shape() {
            [classes, inputs] => (classes, inputs),
            _ => {
                return Err(ModelFormatError::Shape {
                    name: WEIGHT,
                    shape: weight.shape().to_vec(),
                });
            }
        };
        if bias.shape() != [classes] {
            return Err(ModelFormatError::Shape {
                name: BIAS,
                shape: bias.shape().to_vec(),
            });
        }

        Self::new(
            bytemuck::pod_collect_to_vec(weight.data()),
            bytemuck::pod_collect_to_vec(bias.data()),
            inputs,
        )
    }

    pub fn to_safetensors(&self) -> Result<Vec<u8>, ModelFormatError> {
        let classes = self.bias.len();
        let weight = TensorView::new(
            Dtype::F32,
            vec![classes, self.inputs],
            bytemuck::cast_slice(&self.weight),
        )?;
        let bias = TensorView::new(Dtype::F32, vec![classes], bytemuck::cast_slice(&self.bias))?;

        Ok(safetensors::serialize([(WEIGHT, weight), (BIAS, bias)], &None)?)
    }
}

fn check_f32(name: &'static str, tensor: &TensorView<'_>) -> Result<(), ModelFormatError> {
    match tensor.dtype() {
        Dtype::F32 => Ok(()),
        dtype => Err(ModelFormatError::Dtype { name, dtype }),
    }
}

impl Scorer for DenseClassifier {
    fn input_len(&self) -> usize {
        self.inputs
    }

    fn class_count(&self) -> usize {
        self.bias.len()
    }

    fn probabilities(&self, features: &[f32]) -> Result<Vec<f32>, PredictError> {
        if features.len() != self.inputs {
            return Err(PredictError::InputLength {
                expected: self.inputs,
                actual: features.len(),
            });
        }

        let logits: Vec<f32> = self
            .weight
            .chunks_exact(self.inputs)
            .zip(&self.bias)
            .map(|(row, bias)| {
                row.iter()
                    .zip(features)
                    .map(|(weight, feature)| weight * feature)
                    .sum::<f32>()
                    + bias
            })
            .collect();

        Ok(softmax(&logits))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|logit| (logit - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|value| value / total).collect()
}

/// Loads [`DenseClassifier`]s from `.safetensors` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsLoader;

impl ScorerLoader for SafetensorsLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Scorer>, ReloadError> {
        let bytes = std::fs::read(path).map_err(|source| ReloadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let classifier =
            DenseClassifier::from_safetensors(&bytes).map_err(|source| ReloadError::InvalidModel {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Box::new(classifier))
    }
}
