//! Single-stage detectors that run on a letterboxed square canvas.
//!
//! One output of shape `(N, 57)`, optionally with a leading batch axis. Each row
//! is `cx, cy, w, h, objectness, class score` followed by 17 `x, y, confidence`
//! triples, all in canvas pixels.
use super::{invoke, non_max_suppression, output_view, Backend, BackendKind};
use crate::{
    config::PoseConfig,
    error::Error,
    geometry::{BBox, PixelRegion},
    image::Image,
    letterbox::{letterbox, unletterbox_crop},
    network::Network,
    pose::{Point, Pose, NUM_KEYPOINTS},
};
use ndarray::{s, Axis, Ix2};
use tracing::trace;

const BOX_COLUMNS: usize = 6;
pub const ROW_WIDTH: usize = BOX_COLUMNS + 3 * NUM_KEYPOINTS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    pub img_size: u32,
    pub stride: u32,
    pub conf_threshold: f32,
    pub nms_iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&PoseConfig> for Params {
    fn from(config: &PoseConfig) -> Self {
        Self {
            img_size: config.advanced.img_size,
            stride: config.advanced.stride,
            conf_threshold: config.conf_threshold,
            nms_iou_threshold: config.advanced.nms_iou_threshold,
            max_detections: config.advanced.nms_max_detections,
        }
    }
}

pub struct Adapter {
    network: Box<dyn Network + Send>,
    params: Params,
}

impl Adapter {
    pub(super) fn new(network: Box<dyn Network + Send>, params: Params) -> Self {
        Self { network, params }
    }

    /// Detect on `image`, which sits at `origin` in the frame being annotated.
    fn run(&mut self, image: &Image, origin: Point) -> Result<Vec<Pose>, Error> {
        let Params {
            img_size,
            stride,
            conf_threshold,
            nms_iou_threshold,
            max_detections,
        } = self.params;

        let (canvas, transform) = letterbox(image, img_size, stride);
        let outputs = invoke(self.network.as_mut(), BackendKind::TopDown, canvas.to_tensor())?;
        let rows = output_view::<Ix2>(&outputs, 0)?;
        if rows.ncols() != ROW_WIDTH {
            return Err(Error::GetDetectionRowWidth {
                expected: ROW_WIDTH,
                got: rows.ncols(),
            });
        }

        let mut candidates = Vec::new();
        let mut boxes = Vec::new();
        let mut scores = Vec::new();
        for (i, row) in rows.axis_iter(Axis(0)).enumerate() {
            let score = row[4] * row[5];
            // NaN scores fail this comparison too
            if score >= conf_threshold {
                candidates.push(i);
                boxes.push(BBox::from_center(row[0], row[1], row[2], row[3]));
                scores.push(score);
            }
        }
        trace!(rows = rows.nrows(), candidates = candidates.len());

        let keep = non_max_suppression(&boxes, &scores, nms_iou_threshold, max_detections)?;
        keep.into_iter()
            .map(|k| -> Result<Pose, Error> {
                let row = rows.row(candidates[k]);
                let keypoints = row.slice(s![BOX_COLUMNS..]);
                let triples = keypoints
                    .exact_chunks(3)
                    .into_iter()
                    .map(|kp| (kp[0], kp[1], kp[2]));
                Ok(Pose::from_rows(triples, scores[k])?
                    .with_bbox(boxes[k])
                    .map_points(|p| unletterbox_crop(p, &transform, origin)))
            })
            .collect()
    }
}

impl Backend for Adapter {
    fn kind(&self) -> BackendKind {
        BackendKind::TopDown
    }

    fn detect(&mut self, image: &Image) -> Result<Vec<Pose>, Error> {
        self.run(image, Point::default())
    }

    fn detect_region(&mut self, image: &Image, region: &PixelRegion) -> Result<Option<Pose>, Error> {
        let origin = Point::new(region.x as f32, region.y as f32);
        Ok(self.run(&image.crop(region), origin)?.into_iter().next())
    }
}
