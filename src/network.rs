use crate::{backend::BackendKind, error::Error};
use ndarray::{Array4, ArrayD};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

#[cfg(feature = "onnx")]
mod onnx;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            _ => Err(Error::ParseDevice(s.to_owned())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        })
    }
}

/// A loaded model.
///
/// Takes a single NCHW `f32` tensor and returns the model's raw output tensors
/// in declaration order. Implementations are not expected to be thread safe,
/// hence `&mut self`.
pub trait Network {
    /// Number of output tensors every `invoke` returns.
    fn output_tensor_count(&self) -> usize;

    fn invoke(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, Error>;
}

/// What a backend asks the resolver for.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRequest<'a> {
    pub backend: BackendKind,
    pub model_name: &'a str,
    pub device: Device,
    pub weights_path: Option<&'a Path>,
}

/// Turns a model name into something that can run.
///
/// Locating, downloading and retrying are the resolver's business; callers
/// only see a loaded [`Network`] or an error.
pub trait ArtifactResolver {
    fn cuda_available(&self) -> bool {
        false
    }

    fn resolve(&self, request: &ArtifactRequest<'_>) -> Result<Box<dyn Network + Send>, Error>;
}

/// Resolves `<dir>/<model_name>.onnx`, or an explicit weights path.
#[derive(Debug, Clone)]
pub struct WeightsDirResolver {
    dir: PathBuf,
}

impl WeightsDirResolver {
    pub fn new<P>(dir: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { dir: dir.into() }
    }

    pub fn artifact_path(&self, request: &ArtifactRequest<'_>) -> PathBuf {
        request.weights_path.map_or_else(
            || self.dir.join(format!("{}.onnx", request.model_name)),
            Path::to_path_buf,
        )
    }
}

impl ArtifactResolver for WeightsDirResolver {
    #[instrument(name = "WeightsDirResolver::resolve", skip(self), level = "debug")]
    fn resolve(&self, request: &ArtifactRequest<'_>) -> Result<Box<dyn Network + Send>, Error> {
        let path = self.artifact_path(request);
        if !path.is_file() {
            return Err(Error::ArtifactNotFound {
                model_name: request.model_name.to_owned(),
                path,
            });
        }
        debug!(path = %path.display(), "found model artifact");
        load_network(&path, request)
    }
}

#[cfg(feature = "onnx")]
fn load_network(path: &Path, _request: &ArtifactRequest<'_>) -> Result<Box<dyn Network + Send>, Error> {
    Ok(Box::new(onnx::OnnxNetwork::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_network(_path: &Path, request: &ArtifactRequest<'_>) -> Result<Box<dyn Network + Send>, Error> {
    Err(Error::RuntimeUnavailable(format!(
        "{} (built without the onnx feature)",
        request.model_name
    )))
}
