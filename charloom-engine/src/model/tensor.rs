//! Plain tensor values exchanged with the recurrent model

use std::collections::HashMap;

/// Token indices shaped `[1, len]` (batch of one)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence {
    ids: Vec<i64>,
}

impl TokenSequence {
    pub fn new(ids: Vec<i64>) -> Self {
        Self { ids }
    }

    /// Build from vocabulary indices.
    pub fn from_indices(indices: &[usize]) -> Self {
        Self {
            ids: indices.iter().map(|&i| i as i64).collect(),
        }
    }

    /// A single-token step input
    pub fn single(index: usize) -> Self {
        Self::from_indices(&[index])
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn shape(&self) -> [usize; 2] {
        [1, self.ids.len()]
    }
}

/// Recurrent hidden state shaped `[layers, 1, hidden]`.
///
/// Replaced wholesale after every step; never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentState {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl RecurrentState {
    /// All-zero state for the start of a session
    pub fn zeros(layers: usize, hidden_size: usize) -> Self {
        let shape = [layers, 1, hidden_size];
        Self {
            shape,
            data: vec![0.0; layers * hidden_size],
        }
    }

    /// Wrap a float tensor returned by the model.
    ///
    /// Returns `None` unless the tensor is rank 3 with batch size 1 and its
    /// data length matches the shape.
    pub fn from_tensor(tensor: FloatTensor) -> Option<Self> {
        let [layers, batch, hidden] = <[usize; 3]>::try_from(tensor.shape.as_slice()).ok()?;
        if batch != 1 || layers.checked_mul(hidden) != Some(tensor.data.len()) {
            return None;
        }
        Some(Self {
            shape: [layers, batch, hidden],
            data: tensor.data,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Row-major f32 tensor with an explicit shape
#[derive(Debug, Clone, PartialEq)]
pub struct FloatTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl FloatTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Number of elements `shape` describes, or `None` if that overflows
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// True when `data` holds exactly as many elements as `shape` describes
    pub fn is_consistent(&self) -> bool {
        self.element_count() == Some(self.data.len())
    }
}

impl From<RecurrentState> for FloatTensor {
    fn from(state: RecurrentState) -> Self {
        Self {
            shape: state.shape.to_vec(),
            data: state.data,
        }
    }
}

/// Outputs of one model call, keyed by output name
#[derive(Debug, Clone, Default)]
pub struct ModelOutputs {
    tensors: HashMap<String, FloatTensor>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, tensor: FloatTensor) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: FloatTensor) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Remove and return the named output.
    pub fn take(&mut self, name: &str) -> Option<FloatTensor> {
        self.tensors.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_sequence_shape() {
        let seq = TokenSequence::from_indices(&[4, 1, 9]);
        assert_eq!(seq.shape(), [1, 3]);
        assert_eq!(seq.ids(), &[4, 1, 9]);
        assert_eq!(TokenSequence::single(2).shape(), [1, 1]);
    }

    #[test]
    fn test_zero_state() {
        let state = RecurrentState::zeros(2, 512);
        assert_eq!(state.shape(), [2, 1, 512]);
        assert_eq!(state.data().len(), 1024);
        assert!(state.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_state_from_tensor_checks_shape() {
        let ok = FloatTensor::new(vec![2, 1, 3], vec![0.5; 6]);
        assert_eq!(RecurrentState::from_tensor(ok).unwrap().shape(), [2, 1, 3]);

        let wrong_rank = FloatTensor::new(vec![2, 3], vec![0.5; 6]);
        assert!(RecurrentState::from_tensor(wrong_rank).is_none());

        let wrong_batch = FloatTensor::new(vec![1, 2, 3], vec![0.5; 6]);
        assert!(RecurrentState::from_tensor(wrong_batch).is_none());

        let short = FloatTensor::new(vec![2, 1, 3], vec![0.5; 5]);
        assert!(RecurrentState::from_tensor(short).is_none());

        let huge = FloatTensor::new(vec![2, 1, usize::MAX / 2 + 1], vec![0.5; 4]);
        assert!(RecurrentState::from_tensor(huge).is_none());
    }

    #[test]
    fn test_element_count_overflow() {
        let tensor = FloatTensor::new(vec![1, 2, usize::MAX / 2 + 1], vec![0.0; 4]);
        assert_eq!(tensor.element_count(), None);
        assert!(!tensor.is_consistent());
        assert_eq!(FloatTensor::new(vec![1, 2, 3], vec![0.0; 6]).element_count(), Some(6));
    }

    #[test]
    fn test_outputs_take() {
        let mut outputs =
            ModelOutputs::new().with("output", FloatTensor::new(vec![1, 1, 1], vec![0.0]));
        assert!(outputs.take("hidden").is_none());
        assert!(outputs.take("output").is_some());
        assert!(outputs.take("output").is_none());
    }
}
