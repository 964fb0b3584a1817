use crate::backend::BackendKind;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("model artifact for {model_name} not found at {path:?}")]
    ArtifactNotFound { model_name: String, path: PathBuf },

    #[error("no inference runtime available to load {0}")]
    RuntimeUnavailable(String),

    #[error("no usable pose backend: requested {requested}, fallback {fallback:?} also failed")]
    BackendUnavailable {
        requested: String,
        fallback: BackendKind,
        #[source]
        source: Box<Error>,
    },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("expected {0} output tensors, got {1}")]
    GetExpectedNumOutputs(usize, usize),

    #[error("failed to reshape output tensor {index} with shape {shape:?}")]
    ReshapeOutput {
        index: usize,
        shape: Vec<usize>,
        #[source]
        source: ndarray::ShapeError,
    },

    #[error("expected {expected} values per detection row, got {got}")]
    GetDetectionRowWidth { expected: usize, got: usize },

    #[error("output tensors disagree on the number of instances: {0:?}")]
    InstanceCountMismatch(Vec<usize>),

    #[error("expected {expected} heatmap channels, got {got}")]
    GetHeatmapChannels { expected: usize, got: usize },

    #[error("expected {expected} keypoints per pose, got {got}")]
    GetKeypointCount { expected: usize, got: usize },

    #[error("failed to convert usize value to keypoint kind: {0}")]
    ConvertUSizeToKeypointKind(usize),

    #[error("failed to construct NotNan from f32: {1}")]
    ConstructNotNan(#[source] ordered_float::FloatIsNan, f32),

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("failed to convert value to u32")]
    ConvertToU32,

    #[error("region {width}x{height} is smaller than the minimum of {min}px per side")]
    DegenerateRegion { width: u32, height: u32, min: u32 },

    #[error("image buffer of {len} bytes does not match {width}x{height} RGB")]
    ImageBufferSize { width: u32, height: u32, len: usize },

    #[error("failed to open image: {1:?}")]
    OpenImage(#[source] ::image::ImageError, PathBuf),

    #[error("failed to read config file: {1:?}")]
    ReadConfig(#[source] std::io::Error, PathBuf),

    #[error("failed to parse config file: {1:?}")]
    ParseConfig(#[source] toml::de::Error, PathBuf),

    #[error("unknown device: {0} (expected cpu or cuda)")]
    ParseDevice(String),

    #[error("failed to parse box {0:?}: expected x1,y1,x2,y2[@group_id]")]
    ParseBox(String),
}
