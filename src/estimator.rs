use crate::{
    backend::{Adapter, Backend, BackendKind, ModelSelection},
    config::{AdvancedParams, PoseConfig},
    error::Error,
    filter::ResultFilter,
    image::Image,
    network::{ArtifactResolver, Device},
    pose::Pose,
    reconcile::{KnownBox, Reconciler},
    shapes::{self, GenericShape},
};
use tracing::{error, info, instrument, warn};

/// Detect, reconcile, filter, project.
///
/// Construction resolves the model once; if the configured model cannot be
/// loaded the default detector is used instead. Entry points never fail:
/// inference problems are logged and produce no shapes.
#[derive(Debug)]
pub struct PoseEstimator {
    config: PoseConfig,
    backend: Adapter,
    reconciler: Reconciler,
    filter: ResultFilter,
}

impl PoseEstimator {
    #[instrument(name = "PoseEstimator::new", skip_all, fields(model_name = %config.model_name))]
    pub fn new<R>(config: PoseConfig, resolver: &R) -> Result<Self, Error>
    where
        R: ArtifactResolver + ?Sized,
    {
        let mut config = config.sanitized();
        if config.device == Device::Cuda && !resolver.cuda_available() {
            warn!("CUDA requested but unavailable, using cpu");
            config.device = Device::Cpu;
        }

        let selection = ModelSelection::lookup(&config.model_name);
        let (backend, selection) = match Adapter::load(&selection, &config, resolver) {
            Ok(backend) => (backend, selection),
            Err(e) => {
                let fallback = ModelSelection::fallback();
                if fallback == selection {
                    return Err(Error::BackendUnavailable {
                        requested: selection.model_name,
                        fallback: fallback.kind,
                        source: Box::new(e),
                    });
                }
                warn!(
                    message = "pose model unavailable, falling back to default",
                    requested = %selection.model_name,
                    fallback = %fallback.model_name,
                    error = %e
                );
                // an explicit weights path belongs to the requested model
                let fallback_config = PoseConfig {
                    advanced: AdvancedParams {
                        weights_path: None,
                        ..config.advanced.clone()
                    },
                    ..config.clone()
                };
                let backend = Adapter::load(&fallback, &fallback_config, resolver).map_err(|source| {
                    Error::BackendUnavailable {
                        requested: selection.model_name.clone(),
                        fallback: fallback.kind,
                        source: Box::new(source),
                    }
                })?;
                (backend, fallback)
            }
        };
        config.model_name = selection.model_name;

        info!(
            message = "pose estimator ready",
            model_name = %config.model_name,
            backend = %backend.kind(),
            device = %config.device
        );

        Ok(Self {
            filter: ResultFilter::from(&config),
            reconciler: Reconciler::default(),
            backend,
            config,
        })
    }

    /// Settings in effect, including the model actually loaded.
    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Filtered poses over the whole image, best first.
    pub fn detect_poses(&mut self, image: &Image) -> Vec<Pose> {
        self.filter.apply(self.backend.infer_full(image))
    }

    #[instrument(
        name = "PoseEstimator::detect",
        skip(self, image),
        fields(width = image.width(), height = image.height())
    )]
    pub fn detect(&mut self, image: &Image, start_group_id: i64) -> Vec<GenericShape> {
        let poses = self.detect_poses(image);
        info!(message = "detected poses", poses = poses.len());
        shapes::project(&poses, start_group_id, self.config.draw_skeleton)
    }

    /// Detect inside known person boxes.
    ///
    /// Auto-assigned group ids start at the first box's group id when it has
    /// one, otherwise at `default_group_id`.
    #[instrument(
        name = "PoseEstimator::detect_from_boxes",
        skip(self, image, boxes),
        fields(boxes = boxes.len())
    )]
    pub fn detect_from_boxes(
        &mut self,
        image: &Image,
        boxes: &[KnownBox],
        default_group_id: i64,
    ) -> Vec<GenericShape> {
        let start_group_id = boxes
            .first()
            .and_then(|known| known.group_id)
            .unwrap_or(default_group_id);
        if boxes.is_empty() || !self.config.use_detection_results {
            return self.detect(image, start_group_id);
        }

        let poses = self
            .filter
            .apply(self.reconciler.reconcile(image, boxes, &mut self.backend));
        info!(message = "detected poses", poses = poses.len());
        shapes::project(&poses, start_group_id, self.config.draw_skeleton)
    }
}

/// Build an estimator for a single image and run it.
///
/// Construction failures are logged and yield no shapes.
pub fn estimate_poses<R>(
    image: &Image,
    boxes: &[KnownBox],
    config: PoseConfig,
    resolver: &R,
    start_group_id: i64,
) -> Vec<GenericShape>
where
    R: ArtifactResolver + ?Sized,
{
    match PoseEstimator::new(config, resolver) {
        Ok(mut estimator) => estimator.detect_from_boxes(image, boxes, start_group_id),
        Err(e) => {
            error!(message = "pose estimation unavailable", error = %e);
            Vec::new()
        }
    }
}
