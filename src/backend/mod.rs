use crate::{
    config::PoseConfig,
    error::Error,
    geometry::{BBox, PixelRegion},
    image::Image,
    network::{ArtifactRequest, ArtifactResolver, Network},
    pose::Pose,
};
use ndarray::{Array4, ArrayD, ArrayView, Axis, Dimension};
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

pub mod dense;
pub mod heatmap;
mod nms;
pub mod top_down;

pub(crate) use nms::{decreasing_arg_sort, non_max_suppression};

/// Model family a backend implements; decides pre- and post-processing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Detector that reports boxes, scores and keypoints with discrete visibility.
    Dense,
    /// Single-stage detector on a letterboxed canvas, one row per candidate.
    TopDown,
    /// Per-person heatmap regressor; needs a person box to crop around.
    Heatmap,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Dense
    }
}

impl BackendKind {
    pub fn expected_output_tensors(self) -> usize {
        match self {
            Self::Dense => 3,
            Self::TopDown | Self::Heatmap => 1,
        }
    }

    /// Validate that the model has the expected number of output tensors.
    pub fn validate_output_tensor_count(self, output_tensor_count: usize) -> Result<(), Error> {
        let expected_output_tensors = self.expected_output_tensors();
        if output_tensor_count != expected_output_tensors {
            Err(Error::GetExpectedNumOutputs(
                expected_output_tensors,
                output_tensor_count,
            ))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dense => "dense",
            Self::TopDown => "top_down",
            Self::Heatmap => "heatmap",
        })
    }
}

pub const DEFAULT_MODEL_NAME: &str = "generic_detector";
const DEFAULT_HEATMAP_MODEL_NAME: &str = "rtmpose_s";

const REGISTRY: &[(&str, BackendKind)] = &[
    (DEFAULT_MODEL_NAME, BackendKind::Dense),
    ("keypointrcnn_resnet50_fpn", BackendKind::Dense),
    ("yolov7_w6_pose", BackendKind::TopDown),
    ("yolov8n_pose", BackendKind::TopDown),
    ("rtmpose_tiny", BackendKind::Heatmap),
    ("rtmpose_s", BackendKind::Heatmap),
    ("rtmpose_m", BackendKind::Heatmap),
    ("rtmpose_l", BackendKind::Heatmap),
];

/// A configured model name resolved against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub kind: BackendKind,
    pub model_name: String,
}

impl ModelSelection {
    pub fn fallback() -> Self {
        Self {
            kind: BackendKind::default(),
            model_name: DEFAULT_MODEL_NAME.to_owned(),
        }
    }

    /// Map a configured model name to a backend.
    ///
    /// Unknown heatmap-family names select the small heatmap model; unknown
    /// names containing both `yolo` and `pose` are treated as top-down
    /// detectors; anything else gets the default detector.
    pub fn lookup(model_name: &str) -> Self {
        let name = model_name.trim();
        if let Some(&(canonical, kind)) = REGISTRY.iter().find(|(known, _)| *known == name) {
            return Self {
                kind,
                model_name: canonical.to_owned(),
            };
        }

        if name.starts_with("rtmpose") {
            warn!(
                message = "unknown heatmap model, using default size",
                requested = name,
                using = DEFAULT_HEATMAP_MODEL_NAME
            );
            Self {
                kind: BackendKind::Heatmap,
                model_name: DEFAULT_HEATMAP_MODEL_NAME.to_owned(),
            }
        } else if name.starts_with("yolo") && name.contains("pose") {
            Self {
                kind: BackendKind::TopDown,
                model_name: name.to_owned(),
            }
        } else {
            warn!(
                message = "unknown pose model, using default",
                requested = name,
                using = DEFAULT_MODEL_NAME
            );
            Self::fallback()
        }
    }
}

/// A pose backend.
///
/// `detect` and `detect_region` surface every failure; `infer_full` and
/// `infer_region` are the forms the pipeline uses and never fail, logging the
/// error and yielding nothing instead.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// All poses in the image, best first.
    fn detect(&mut self, image: &Image) -> Result<Vec<Pose>, Error>;

    /// The best pose inside `region`, in full-image coordinates.
    fn detect_region(&mut self, image: &Image, region: &PixelRegion) -> Result<Option<Pose>, Error>;

    fn infer_full(&mut self, image: &Image) -> Vec<Pose> {
        match self.detect(image) {
            Ok(poses) => {
                debug!(backend = %self.kind(), poses = poses.len(), "full image inference");
                poses
            }
            Err(e) => {
                error!(backend = %self.kind(), error = %e, "full image inference failed");
                Vec::new()
            }
        }
    }

    fn infer_region(&mut self, image: &Image, bbox: &BBox) -> Vec<Pose> {
        let region = match bbox.to_region(image.width(), image.height()) {
            Ok(region) => region,
            Err(e) => {
                debug!(?bbox, error = %e, "skipping region");
                return Vec::new();
            }
        };
        match self.detect_region(image, &region) {
            Ok(pose) => pose.into_iter().collect(),
            Err(e) => {
                error!(backend = %self.kind(), ?region, error = %e, "region inference failed");
                Vec::new()
            }
        }
    }
}

/// The configured backend.
pub enum Adapter {
    Dense(dense::Adapter),
    TopDown(top_down::Adapter),
    Heatmap(heatmap::Adapter),
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Adapter").field(&self.kind()).finish()
    }
}

impl Adapter {
    /// Resolve the selected model and wrap it in the matching backend.
    #[instrument(name = "Adapter::load", skip(config, resolver), fields(model_name = %selection.model_name))]
    pub fn load<R>(selection: &ModelSelection, config: &PoseConfig, resolver: &R) -> Result<Self, Error>
    where
        R: ArtifactResolver + ?Sized,
    {
        let request = ArtifactRequest {
            backend: selection.kind,
            model_name: &selection.model_name,
            device: config.device,
            weights_path: config.advanced.weights_path.as_deref(),
        };
        let network = resolver.resolve(&request)?;
        selection
            .kind
            .validate_output_tensor_count(network.output_tensor_count())?;

        info!(
            message = "loaded pose backend",
            backend = %selection.kind,
            device = %config.device
        );

        Ok(match selection.kind {
            BackendKind::Dense => Self::Dense(dense::Adapter::new(network)),
            BackendKind::TopDown => Self::TopDown(top_down::Adapter::new(
                network,
                top_down::Params::from(config),
            )),
            BackendKind::Heatmap => Self::Heatmap(heatmap::Adapter::new(
                network,
                heatmap::Params::from(config),
            )),
        })
    }
}

impl Backend for Adapter {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Dense(_) => BackendKind::Dense,
            Self::TopDown(_) => BackendKind::TopDown,
            Self::Heatmap(_) => BackendKind::Heatmap,
        }
    }

    fn detect(&mut self, image: &Image) -> Result<Vec<Pose>, Error> {
        match self {
            Self::Dense(b) => b.detect(image),
            Self::TopDown(b) => b.detect(image),
            Self::Heatmap(b) => b.detect(image),
        }
    }

    fn detect_region(&mut self, image: &Image, region: &PixelRegion) -> Result<Option<Pose>, Error> {
        match self {
            Self::Dense(b) => b.detect_region(image, region),
            Self::TopDown(b) => b.detect_region(image, region),
            Self::Heatmap(b) => b.detect_region(image, region),
        }
    }
}

/// Run the network and check it produced the number of outputs `kind` decodes.
fn invoke(
    network: &mut (dyn Network + Send),
    kind: BackendKind,
    input: Array4<f32>,
) -> Result<Vec<ArrayD<f32>>, Error> {
    let outputs = network.invoke(input)?;
    kind.validate_output_tensor_count(outputs.len())?;
    Ok(outputs)
}

/// View output `index` with dimensionality `D`, dropping leading batch axes of
/// length one.
fn output_view<D>(outputs: &[ArrayD<f32>], index: usize) -> Result<ArrayView<'_, f32, D>, Error>
where
    D: Dimension,
{
    let output = outputs
        .get(index)
        .ok_or(Error::GetExpectedNumOutputs(index + 1, outputs.len()))?;
    let mut view = output.view();
    if let Some(ndim) = D::NDIM {
        while view.ndim() > ndim && view.shape().first() == Some(&1) {
            view = view.index_axis_move(Axis(0), 0);
        }
    }
    view.into_dimensionality::<D>()
        .map_err(|source| Error::ReshapeOutput {
            index,
            shape: output.shape().to_vec(),
            source,
        })
}

/// Order poses by decreasing score; equal scores keep their input order.
fn sort_by_score(poses: Vec<Pose>) -> Result<Vec<Pose>, Error> {
    let scores = poses.iter().map(|pose| pose.score).collect::<Vec<_>>();
    let mut order = vec![0; scores.len()];
    decreasing_arg_sort(&scores, &mut order)?;

    let mut slots = poses.into_iter().map(Some).collect::<Vec<_>>();
    Ok(order
        .into_iter()
        .filter_map(|i| slots.get_mut(i).and_then(Option::take))
        .collect())
}
