use crate::{error::Error, network::Network};
use ndarray::{Array4, ArrayD};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::path::Path;
use tracing::info;

fn runtime_error<E: std::fmt::Display>(error: E) -> Error {
    Error::Inference(error.to_string())
}

/// ONNX Runtime session with one image input.
pub(super) struct OnnxNetwork {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
}

impl OnnxNetwork {
    pub(super) fn load(path: &Path) -> Result<Self, Error> {
        let session = Session::builder()
            .map_err(runtime_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime_error)?
            .commit_from_file(path)
            .map_err(|e| Error::RuntimeUnavailable(format!("{}: {}", path.display(), e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| Error::RuntimeUnavailable(format!("{}: model has no inputs", path.display())))?;
        let output_names = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect::<Vec<_>>();

        info!(
            message = "loaded onnx model",
            path = %path.display(),
            input = %input_name,
            outputs = output_names.len()
        );

        Ok(Self {
            session,
            input_name,
            output_names,
        })
    }
}

impl Network for OnnxNetwork {
    fn output_tensor_count(&self) -> usize {
        self.output_names.len()
    }

    fn invoke(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, Error> {
        let input_tensor = Tensor::from_array(input).map_err(runtime_error)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(runtime_error)?;

        self.output_names
            .iter()
            .map(|name| {
                let output: ndarray::ArrayViewD<f32> = outputs[name.as_str()]
                    .try_extract_array()
                    .map_err(runtime_error)?;
                Ok(output.to_owned())
            })
            .collect()
    }
}
