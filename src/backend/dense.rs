//! Detectors that report instance boxes, scores and keypoints directly.
//!
//! Outputs, in order:
//!
//! * boxes `(N, 4)` as `x1, y1, x2, y2`
//! * scores `(N)`
//! * keypoints `(N, 17, 3)` as `x, y, visibility` where visibility is 0, 1 or 2
use super::{invoke, output_view, sort_by_score, Backend, BackendKind};
use crate::{
    error::Error,
    geometry::{BBox, PixelRegion},
    image::Image,
    network::Network,
    pose::{visibility_to_confidence, Point, Pose, NUM_KEYPOINTS},
};
use ndarray::{Axis, Ix1, Ix2, Ix3};

pub struct Adapter {
    network: Box<dyn Network + Send>,
}

impl Adapter {
    pub(super) fn new(network: Box<dyn Network + Send>) -> Self {
        Self { network }
    }

    fn run(&mut self, image: &Image) -> Result<Vec<Pose>, Error> {
        let outputs = invoke(self.network.as_mut(), BackendKind::Dense, image.to_tensor())?;
        let boxes = output_view::<Ix2>(&outputs, 0)?;
        let scores = output_view::<Ix1>(&outputs, 1)?;
        let keypoints = output_view::<Ix3>(&outputs, 2)?;

        let (num_instances, box_width) = boxes.dim();
        let (keypoint_instances, num_keypoints, keypoint_width) = keypoints.dim();
        if num_instances != scores.len() || num_instances != keypoint_instances {
            return Err(Error::InstanceCountMismatch(vec![
                num_instances,
                scores.len(),
                keypoint_instances,
            ]));
        }
        if box_width != 4 {
            return Err(Error::GetDetectionRowWidth {
                expected: 4,
                got: box_width,
            });
        }
        if num_keypoints != NUM_KEYPOINTS {
            return Err(Error::GetKeypointCount {
                expected: NUM_KEYPOINTS,
                got: num_keypoints,
            });
        }
        if keypoint_width != 3 {
            return Err(Error::GetDetectionRowWidth {
                expected: 3,
                got: keypoint_width,
            });
        }

        let mut poses = Vec::with_capacity(num_instances);
        for (i, (instance, bbox)) in keypoints
            .axis_iter(Axis(0))
            .zip(boxes.axis_iter(Axis(0)))
            .enumerate()
        {
            let rows = instance
                .axis_iter(Axis(0))
                .map(|kp| (kp[0], kp[1], visibility_to_confidence(kp[2])));
            poses.push(
                Pose::from_rows(rows, scores[i])?
                    .with_bbox(BBox::new(bbox[0], bbox[1], bbox[2], bbox[3])),
            );
        }

        sort_by_score(poses)
    }
}

impl Backend for Adapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Dense
    }

    fn detect(&mut self, image: &Image) -> Result<Vec<Pose>, Error> {
        self.run(image)
    }

    fn detect_region(&mut self, image: &Image, region: &PixelRegion) -> Result<Option<Pose>, Error> {
        let origin = Point::new(region.x as f32, region.y as f32);
        let best = self.run(&image.crop(region))?.into_iter().next();
        Ok(best.map(|pose| pose.map_points(|p| p + origin)))
    }
}
