//! One inference step: model call, last-timestep extraction, sampling, decoding

use super::{FloatTensor, ModelSignature, RecurrentModel, RecurrentState, TokenSequence};
use crate::error::{GenerationError, Result};
use crate::sampler::Sampler;
use crate::vocab::Vocabulary;

/// Result of a successful step
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Sampled vocabulary index
    pub index: usize,
    /// Decoded character
    pub ch: char,
    /// State to feed into the next step
    pub hidden: RecurrentState,
}

/// Extract the logits of the final timestep for batch 0.
///
/// `logits` must be shaped `[1, seq_len, vocab]` with `vocab > 0`.
pub fn last_timestep<'a>(
    logits: &'a FloatTensor,
    seq_len: usize,
    name: &str,
) -> Result<&'a [f32]> {
    let rank_error = || {
        GenerationError::malformed(name, format!("expected rank 3, got shape {:?}", logits.shape))
    };
    let [batch, len, vocab_size] =
        <[usize; 3]>::try_from(logits.shape.as_slice()).map_err(|_| rank_error())?;

    if batch != 1 {
        return Err(GenerationError::malformed(name, format!("batch size {} != 1", batch)));
    }
    if len != seq_len || len == 0 {
        return Err(GenerationError::malformed(
            name,
            format!("sequence length {} does not match input length {}", len, seq_len),
        ));
    }
    if vocab_size == 0 {
        return Err(GenerationError::malformed(name, "empty vocabulary axis"));
    }
    // Also rules out shapes whose element count overflows
    if !logits.is_consistent() {
        return Err(GenerationError::malformed(
            name,
            format!("{} values for shape {:?}", logits.data.len(), logits.shape),
        ));
    }

    let start = (len - 1) * vocab_size;
    Ok(&logits.data[start..start + vocab_size])
}

/// Binds a model to the vocabulary and signature it was exported with.
pub struct InferenceStep<'a> {
    model: &'a dyn RecurrentModel,
    signature: &'a ModelSignature,
    vocab: &'a Vocabulary,
}

impl<'a> InferenceStep<'a> {
    pub fn new(
        model: &'a dyn RecurrentModel,
        signature: &'a ModelSignature,
        vocab: &'a Vocabulary,
    ) -> Self {
        Self {
            model,
            signature,
            vocab,
        }
    }

    /// Run the model once and sample the next character.
    ///
    /// # Errors
    /// Fails if the model call fails, an expected output is missing, or an
    /// output has the wrong shape.
    pub fn run(
        &self,
        input: &TokenSequence,
        hidden: &RecurrentState,
        sampler: &mut Sampler,
    ) -> Result<StepOutput> {
        let mut outputs = self.model.run(input, hidden)?;

        let logits_name = &self.signature.logits_output_name;
        let hidden_name = &self.signature.hidden_output_name;

        let logits = outputs
            .take(logits_name)
            .ok_or_else(|| GenerationError::MissingOutput(logits_name.clone()))?;
        let new_hidden = outputs
            .take(hidden_name)
            .ok_or_else(|| GenerationError::MissingOutput(hidden_name.clone()))?;

        let new_hidden = RecurrentState::from_tensor(new_hidden)
            .filter(|state| state.shape() == hidden.shape())
            .ok_or_else(|| {
                GenerationError::malformed(
                    hidden_name,
                    format!("expected shape {:?}", hidden.shape()),
                )
            })?;

        let last = last_timestep(&logits, input.len(), logits_name)?;
        if last.len() != self.vocab.len() {
            tracing::debug!(
                "Model vocabulary axis ({}) differs from loaded vocabulary ({})",
                last.len(),
                self.vocab.len()
            );
        }

        let index = sampler.sample(last);
        let ch = self.vocab.decode(index);
        tracing::trace!("Sampled index {} ({:?})", index, ch);

        Ok(StepOutput {
            index,
            ch,
            hidden: new_hidden,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelOutputs;
    use crate::sampler::{SamplingConfig, Temperature};

    /// Returns fixed logits favouring one index and echoes a constant state.
    struct Favour {
        index: usize,
        vocab_size: usize,
        hidden_value: f32,
    }

    impl RecurrentModel for Favour {
        fn run(&self, input: &TokenSequence, hidden: &RecurrentState) -> Result<ModelOutputs> {
            let len = input.len();
            let mut data = vec![-50.0; len * self.vocab_size];
            for t in 0..len {
                data[t * self.vocab_size + self.index] = 50.0;
            }
            let [layers, _, width] = hidden.shape();
            Ok(ModelOutputs::new()
                .with("output", FloatTensor::new(vec![1, len, self.vocab_size], data))
                .with(
                    "hidden",
                    FloatTensor::new(
                        vec![layers, 1, width],
                        vec![self.hidden_value; layers * width],
                    ),
                ))
        }
    }

    fn vocab() -> Vocabulary {
        Vocabulary::from_pairs([(' ', 0), ('a', 1), ('b', 2)]).unwrap()
    }

    fn sampler() -> Sampler {
        Sampler::new(&SamplingConfig {
            temperature: Temperature::DEFAULT,
            seed: Some(0),
        })
    }

    fn small_signature() -> ModelSignature {
        ModelSignature {
            num_layers: 2,
            hidden_size: 4,
            ..ModelSignature::default()
        }
    }

    #[test]
    fn test_last_timestep_offset() {
        let logits = FloatTensor::new(vec![1, 3, 2], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(last_timestep(&logits, 3, "output").unwrap(), &[4.0, 5.0]);
    }

    #[test]
    fn test_last_timestep_rejects_bad_shapes() {
        let rank2 = FloatTensor::new(vec![3, 2], vec![0.0; 6]);
        assert!(last_timestep(&rank2, 3, "output").is_err());

        let batch2 = FloatTensor::new(vec![2, 3, 1], vec![0.0; 6]);
        assert!(last_timestep(&batch2, 3, "output").is_err());

        let wrong_len = FloatTensor::new(vec![1, 2, 3], vec![0.0; 6]);
        assert!(last_timestep(&wrong_len, 3, "output").is_err());

        let short = FloatTensor::new(vec![1, 3, 2], vec![0.0; 5]);
        assert!(last_timestep(&short, 3, "output").is_err());
    }

    #[test]
    fn test_last_timestep_rejects_overflowing_shape() {
        let huge = FloatTensor::new(vec![1, 2, usize::MAX / 2 + 1], vec![0.0; 4]);
        let err = last_timestep(&huge, 2, "output").unwrap_err();
        assert!(matches!(err, GenerationError::MalformedOutput { name, .. } if name == "output"));
    }

    #[test]
    fn test_overflowing_hidden_shape_is_malformed() {
        struct Huge;
        impl RecurrentModel for Huge {
            fn run(&self, _: &TokenSequence, _: &RecurrentState) -> Result<ModelOutputs> {
                Ok(ModelOutputs::new()
                    .with("output", FloatTensor::new(vec![1, 1, 3], vec![0.0; 3]))
                    .with("hidden", FloatTensor::new(vec![2, 1, usize::MAX / 2 + 1], vec![0.0; 8])))
            }
        }
        let signature = small_signature();
        let vocab = vocab();
        let step = InferenceStep::new(&Huge, &signature, &vocab);
        let err = step
            .run(&TokenSequence::single(1), &signature.initial_state(), &mut sampler())
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedOutput { name, .. } if name == "hidden"));
    }

    #[test]
    fn test_step_samples_and_replaces_state() {
        let model = Favour {
            index: 2,
            vocab_size: 3,
            hidden_value: 0.25,
        };
        let signature = small_signature();
        let vocab = vocab();
        let step = InferenceStep::new(&model, &signature, &vocab);

        let input = TokenSequence::from_indices(&vocab.encode("ab a"));
        let out = step
            .run(&input, &signature.initial_state(), &mut sampler())
            .unwrap();
        assert_eq!(out.index, 2);
        assert_eq!(out.ch, 'b');
        assert_eq!(out.hidden.shape(), [2, 1, 4]);
        assert!(out.hidden.data().iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_missing_output() {
        struct LogitsOnly;
        impl RecurrentModel for LogitsOnly {
            fn run(&self, _: &TokenSequence, _: &RecurrentState) -> Result<ModelOutputs> {
                Ok(ModelOutputs::new()
                    .with("output", FloatTensor::new(vec![1, 1, 3], vec![0.0; 3])))
            }
        }
        let signature = small_signature();
        let vocab = vocab();
        let step = InferenceStep::new(&LogitsOnly, &signature, &vocab);
        let err = step
            .run(&TokenSequence::single(1), &signature.initial_state(), &mut sampler())
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingOutput(name) if name == "hidden"));
    }

    #[test]
    fn test_hidden_shape_change_is_malformed() {
        struct Shrinks;
        impl RecurrentModel for Shrinks {
            fn run(&self, _: &TokenSequence, _: &RecurrentState) -> Result<ModelOutputs> {
                Ok(ModelOutputs::new()
                    .with("output", FloatTensor::new(vec![1, 1, 3], vec![0.0; 3]))
                    .with("hidden", FloatTensor::new(vec![1, 1, 4], vec![0.0; 4])))
            }
        }
        let signature = small_signature();
        let vocab = vocab();
        let step = InferenceStep::new(&Shrinks, &signature, &vocab);
        let err = step
            .run(&TokenSequence::single(1), &signature.initial_state(), &mut sampler())
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedOutput { .. }));
    }
}
