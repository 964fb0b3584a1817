//! Model stand-ins for unit tests.
use crate::{
    error::Error,
    geometry::BBox,
    network::{ArtifactRequest, ArtifactResolver, Device, Network},
    pose::{Pose, NUM_KEYPOINTS},
};
use ndarray::{Array1, Array2, Array3, Array4, ArrayD};
use std::{cell::RefCell, collections::HashMap, path::PathBuf};

/// Network whose outputs come from a closure.
pub(crate) struct FnNetwork<F> {
    output_tensor_count: usize,
    invoke: F,
}

impl<F> Network for FnNetwork<F>
where
    F: FnMut(Array4<f32>) -> Result<Vec<ArrayD<f32>>, Error>,
{
    fn output_tensor_count(&self) -> usize {
        self.output_tensor_count
    }

    fn invoke(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, Error> {
        (self.invoke)(input)
    }
}

pub(crate) fn network<F>(output_tensor_count: usize, invoke: F) -> Box<dyn Network + Send>
where
    F: FnMut(Array4<f32>) -> Result<Vec<ArrayD<f32>>, Error> + Send + 'static,
{
    Box::new(FnNetwork {
        output_tensor_count,
        invoke,
    })
}

type Factory = Box<dyn Fn() -> Box<dyn Network + Send>>;

/// Resolver that hands out networks registered by model name.
pub(crate) struct StaticResolver {
    factories: HashMap<String, Factory>,
    cuda: bool,
    requests: RefCell<Vec<(String, Device)>>,
}

impl StaticResolver {
    pub(crate) fn new() -> Self {
        Self {
            factories: HashMap::new(),
            cuda: false,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn with<F>(mut self, model_name: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Network + Send> + 'static,
    {
        self.factories
            .insert(model_name.to_owned(), Box::new(factory));
        self
    }

    pub(crate) fn with_cuda(mut self) -> Self {
        self.cuda = true;
        self
    }

    /// Model names and devices asked for so far.
    pub(crate) fn requests(&self) -> Vec<(String, Device)> {
        self.requests.borrow().clone()
    }
}

impl ArtifactResolver for StaticResolver {
    fn cuda_available(&self) -> bool {
        self.cuda
    }

    fn resolve(&self, request: &ArtifactRequest<'_>) -> Result<Box<dyn Network + Send>, Error> {
        self.requests
            .borrow_mut()
            .push((request.model_name.to_owned(), request.device));
        self.factories
            .get(request.model_name)
            .map(|factory| factory())
            .ok_or_else(|| Error::ArtifactNotFound {
                model_name: request.model_name.to_owned(),
                path: PathBuf::from(request.model_name),
            })
    }
}

/// Pose with every keypoint at `keypoint_score`, laid out in a column
/// starting at `(x, y)`.
pub(crate) fn uniform_pose(x: f32, y: f32, score: f32, keypoint_score: f32) -> Pose {
    let rows = (0..NUM_KEYPOINTS).map(|i| (x, y + i as f32 * 10.0, keypoint_score));
    match Pose::from_rows(rows, score) {
        Ok(pose) => pose,
        Err(e) => panic!("bad test pose: {}", e),
    }
}

/// Dense detector outputs for `(box, score, visibility)` instances, with the
/// keypoints spread over each box.
pub(crate) fn dense_outputs(instances: &[(BBox, f32, f32)]) -> Vec<ArrayD<f32>> {
    let n = instances.len();
    let mut boxes = Array2::<f32>::zeros((n, 4));
    let mut scores = Array1::<f32>::zeros(n);
    let mut keypoints = Array3::<f32>::zeros((n, NUM_KEYPOINTS, 3));
    for (i, (bbox, score, visibility)) in instances.iter().enumerate() {
        boxes[(i, 0)] = bbox.x1;
        boxes[(i, 1)] = bbox.y1;
        boxes[(i, 2)] = bbox.x2;
        boxes[(i, 3)] = bbox.y2;
        scores[i] = *score;
        for k in 0..NUM_KEYPOINTS {
            let t = k as f32 / (NUM_KEYPOINTS - 1) as f32;
            keypoints[(i, k, 0)] = bbox.x1 + t * bbox.width();
            keypoints[(i, k, 1)] = bbox.y1 + t * bbox.height();
            keypoints[(i, k, 2)] = *visibility;
        }
    }
    vec![boxes.into_dyn(), scores.into_dyn(), keypoints.into_dyn()]
}
