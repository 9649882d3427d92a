//! ONNX evaluation of the exported recurrent model
//!
//! Uses candle's pure-Rust ONNX interpreter, so no native runtime is needed.
//! Enable with the `onnx` feature flag.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};

use super::{
    FloatTensor, ModelOutputs, ModelSignature, RecurrentModel, RecurrentState, TokenSequence,
};
use crate::error::{GenerationError, Result};

fn invocation(e: candle_core::Error) -> GenerationError {
    GenerationError::ModelInvocation(e.into())
}

/// Convert a candle tensor to an owned f32 tensor.
fn to_float_tensor(tensor: &Tensor) -> candle_core::Result<FloatTensor> {
    let shape = tensor.dims().to_vec();
    let data = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
    Ok(FloatTensor::new(shape, data))
}

/// Recurrent model loaded from an `.onnx` file
pub struct OnnxModel {
    proto: candle_onnx::onnx::ModelProto,
    input_name: String,
    hidden_input_name: String,
    device: Device,
}

impl OnnxModel {
    /// Load an ONNX model whose inputs are named as in `signature`.
    pub fn from_file<P: AsRef<Path>>(path: P, signature: &ModelSignature) -> Result<Self> {
        let path = path.as_ref();
        let proto =
            candle_onnx::read_file(path).map_err(|e| GenerationError::ModelLoad(e.into()))?;

        if let Some(graph) = proto.graph.as_ref() {
            let inputs: Vec<&str> = graph.input.iter().map(|i| i.name.as_str()).collect();
            let outputs: Vec<&str> = graph.output.iter().map(|o| o.name.as_str()).collect();
            tracing::info!("Model inputs: {:?}, outputs: {:?}", inputs, outputs);
            for expected in [&signature.input_name, &signature.hidden_input_name] {
                if !inputs.contains(&expected.as_str()) {
                    return Err(GenerationError::ModelLoad(
                        format!("model has no input named '{}'", expected).into(),
                    ));
                }
            }
        }

        tracing::info!("Loaded ONNX model from {}", path.display());
        Ok(Self {
            proto,
            input_name: signature.input_name.clone(),
            hidden_input_name: signature.hidden_input_name.clone(),
            device: Device::Cpu,
        })
    }
}

impl RecurrentModel for OnnxModel {
    fn run(&self, input: &TokenSequence, hidden: &RecurrentState) -> Result<ModelOutputs> {
        let tokens = Tensor::from_vec(input.ids().to_vec(), input.shape().to_vec(), &self.device)
            .map_err(invocation)?;
        let state = Tensor::from_vec(hidden.data().to_vec(), hidden.shape().to_vec(), &self.device)
            .map_err(invocation)?;

        let mut feeds = HashMap::new();
        feeds.insert(self.input_name.clone(), tokens);
        feeds.insert(self.hidden_input_name.clone(), state);

        let results = candle_onnx::simple_eval(&self.proto, feeds).map_err(invocation)?;

        let mut outputs = ModelOutputs::new();
        for (name, tensor) in &results {
            outputs.insert(name.clone(), to_float_tensor(tensor).map_err(invocation)?);
        }
        Ok(outputs)
    }
}
