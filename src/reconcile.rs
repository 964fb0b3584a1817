use crate::{backend::Backend, error::Error, geometry::BBox, image::Image, pose::Pose};
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// A full-image pose is attributed to a box only above this overlap.
pub const MATCH_IOU_THRESHOLD: f32 = 0.3;

/// A person box that already exists in the annotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnownBox {
    pub bbox: BBox,
    pub group_id: Option<i64>,
}

impl KnownBox {
    pub fn new(bbox: BBox, group_id: Option<i64>) -> Self {
        Self { bbox, group_id }
    }
}

/// `x1,y1,x2,y2` with an optional `@group_id` suffix.
impl FromStr for KnownBox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_error = || Error::ParseBox(s.to_owned());
        let (coords, group_id) = match s.split_once('@') {
            Some((coords, id)) => (coords, Some(id.trim().parse::<i64>().map_err(|_| parse_error())?)),
            None => (s, None),
        };
        let values = coords
            .split(',')
            .map(|v| v.trim().parse::<f32>().map_err(|_| parse_error()))
            .collect::<Result<Vec<_>, _>>()?;
        match values.as_slice() {
            &[x1, y1, x2, y2] if values.iter().all(|v| v.is_finite()) => {
                Ok(Self::new(BBox::new(x1, y1, x2, y2), group_id))
            }
            _ => Err(parse_error()),
        }
    }
}

/// Turns known person boxes into poses.
///
/// Each box first gets a region detection. When that comes back empty the
/// box is matched against a full-image detection, which runs at most once per
/// call. Poses found for a box carry its group id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciler {
    match_iou_threshold: f32,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            match_iou_threshold: MATCH_IOU_THRESHOLD,
        }
    }
}

/// Index and IoU of the pose overlapping `bbox` most; ties keep the earlier pose.
fn best_match(poses: &[Pose], bbox: &BBox) -> Option<(usize, f32)> {
    poses
        .iter()
        .enumerate()
        .filter_map(|(i, pose)| pose.extent().map(|extent| (i, extent.iou(bbox))))
        .fold(None, |best, (i, iou)| match best {
            Some((_, best_iou)) if best_iou >= iou => best,
            _ => Some((i, iou)),
        })
}

impl Reconciler {
    pub fn new(match_iou_threshold: f32) -> Self {
        Self {
            match_iou_threshold,
        }
    }

    #[instrument(name = "Reconciler::reconcile", skip_all, fields(boxes = known_boxes.len()))]
    pub fn reconcile<B>(&self, image: &Image, known_boxes: &[KnownBox], backend: &mut B) -> Vec<Pose>
    where
        B: Backend + ?Sized,
    {
        if known_boxes.is_empty() {
            return backend.infer_full(image);
        }

        let mut full: Option<Vec<Pose>> = None;
        let mut poses = Vec::with_capacity(known_boxes.len());

        for known in known_boxes {
            if let Err(e) = known.bbox.to_region(image.width(), image.height()) {
                debug!(bbox = ?known.bbox, error = %e, "skipping known box");
                continue;
            }

            if let Some(mut pose) = backend.infer_region(image, &known.bbox).into_iter().next() {
                pose.group_id = known.group_id;
                poses.push(pose);
                continue;
            }

            let full_poses = full.get_or_insert_with(|| backend.infer_full(image));
            match best_match(full_poses, &known.bbox) {
                Some((index, iou)) if iou > self.match_iou_threshold => {
                    let mut pose = full_poses[index].clone();
                    pose.group_id = known.group_id;
                    poses.push(pose);
                }
                best => {
                    debug!(bbox = ?known.bbox, best_iou = ?best.map(|(_, iou)| iou), "no pose for known box");
                }
            }
        }

        if poses.is_empty() {
            info!("no known box produced a pose, using full image detection");
            return full.unwrap_or_else(|| backend.infer_full(image));
        }
        poses
    }
}

#[cfg(test)]
mod tests {
    use super::{best_match, KnownBox, Reconciler};
    use crate::{
        backend::{Backend, BackendKind},
        error::Error,
        geometry::{BBox, PixelRegion},
        image::Image,
        pose::Pose,
        testing,
    };
    use assert_approx_eq::assert_approx_eq;

    /// Backend with canned answers that counts its calls.
    struct Scripted {
        region: Option<Pose>,
        full: Vec<Pose>,
        region_calls: usize,
        full_calls: usize,
    }

    impl Scripted {
        fn new(region: Option<Pose>, full: Vec<Pose>) -> Self {
            Self {
                region,
                full,
                region_calls: 0,
                full_calls: 0,
            }
        }
    }

    impl Backend for Scripted {
        fn kind(&self) -> BackendKind {
            BackendKind::Dense
        }

        fn detect(&mut self, _: &Image) -> Result<Vec<Pose>, Error> {
            self.full_calls += 1;
            Ok(self.full.clone())
        }

        fn detect_region(&mut self, _: &Image, _: &PixelRegion) -> Result<Option<Pose>, Error> {
            self.region_calls += 1;
            Ok(self.region.clone())
        }
    }

    fn image() -> Image {
        Image::filled(640, 480, [0; 3])
    }

    /// Pose whose detector box is `bbox`.
    fn pose_in(bbox: BBox, score: f32) -> Pose {
        testing::uniform_pose(bbox.x1, bbox.y1, score, 0.9).with_bbox(bbox)
    }

    #[test]
    fn parses_boxes_with_and_without_group() {
        let known = "100,50,300,400@7".parse::<KnownBox>().unwrap();
        assert_eq!(known.bbox, BBox::new(100.0, 50.0, 300.0, 400.0));
        assert_eq!(known.group_id, Some(7));

        let known = " 1.5, 2, 30, 40 ".parse::<KnownBox>().unwrap();
        assert_eq!(known.group_id, None);
        assert_approx_eq!(known.bbox.x1, 1.5);

        assert!("1,2,3".parse::<KnownBox>().is_err());
        assert!("1,2,3,4@x".parse::<KnownBox>().is_err());
        assert!("1,2,inf,4".parse::<KnownBox>().is_err());
    }

    #[test]
    fn region_hit_inherits_group_id() {
        let mut backend = Scripted::new(Some(testing::uniform_pose(120.0, 60.0, 0.9, 0.9)), vec![]);
        let boxes = [KnownBox::new(BBox::new(100.0, 50.0, 300.0, 400.0), Some(7))];
        let poses = Reconciler::default().reconcile(&image(), &boxes, &mut backend);
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].group_id, Some(7));
        assert_eq!(backend.full_calls, 0);
    }

    #[test]
    fn fallback_matches_above_threshold_only() {
        let known = BBox::new(0.0, 0.0, 100.0, 100.0);
        // a 35x100 box inside the known box has IoU 0.35
        let matched = pose_in(BBox::new(0.0, 0.0, 35.0, 100.0), 0.9);
        let mut backend = Scripted::new(None, vec![matched]);
        let boxes = [
            KnownBox::new(known, Some(3)),
            KnownBox::new(BBox::new(300.0, 300.0, 400.0, 400.0), Some(4)),
        ];
        let poses = Reconciler::default().reconcile(&image(), &boxes, &mut backend);
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].group_id, Some(3));
        // full image detection is memoized across boxes
        assert_eq!(backend.full_calls, 1);
        assert_eq!(backend.region_calls, 2);

        // IoU 0.25
        let unmatched = pose_in(BBox::new(0.0, 0.0, 25.0, 100.0), 0.9);
        let mut backend = Scripted::new(None, vec![unmatched]);
        let poses = Reconciler::default().reconcile(&image(), &boxes, &mut backend);
        assert!(poses.iter().all(|pose| pose.group_id != Some(3)));
    }

    #[test]
    fn overlapping_boxes_each_get_a_copy_of_the_match() {
        let pose = pose_in(BBox::new(0.0, 0.0, 100.0, 100.0), 0.9);
        let mut backend = Scripted::new(None, vec![pose]);
        let boxes = [
            KnownBox::new(BBox::new(0.0, 0.0, 100.0, 100.0), Some(3)),
            // IoU 0.82 with the same pose
            KnownBox::new(BBox::new(10.0, 0.0, 110.0, 100.0), Some(4)),
        ];
        let poses = Reconciler::default().reconcile(&image(), &boxes, &mut backend);
        let groups = poses.iter().map(|pose| pose.group_id).collect::<Vec<_>>();
        assert_eq!(groups, vec![Some(3), Some(4)]);
        assert_eq!(poses[0].keypoints, poses[1].keypoints);
        assert_eq!(backend.full_calls, 1);
    }

    #[test]
    fn best_match_prefers_earlier_on_tie() {
        let bbox = BBox::new(0.0, 0.0, 100.0, 100.0);
        let poses = vec![pose_in(bbox, 0.9), pose_in(bbox, 0.8)];
        let (index, iou) = best_match(&poses, &bbox).unwrap();
        assert_eq!(index, 0);
        assert_approx_eq!(iou, 1.0);
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let mut backend = Scripted::new(Some(testing::uniform_pose(0.0, 0.0, 0.9, 0.9)), vec![]);
        let boxes = [
            KnownBox::new(BBox::new(100.0, 100.0, 105.0, 300.0), Some(1)),
            KnownBox::new(BBox::new(100.0, 50.0, 300.0, 400.0), Some(2)),
        ];
        let poses = Reconciler::default().reconcile(&image(), &boxes, &mut backend);
        assert_eq!(backend.region_calls, 1);
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].group_id, Some(2));
    }

    #[test]
    fn nothing_found_falls_back_to_full_detection() {
        let full = vec![pose_in(BBox::new(500.0, 300.0, 600.0, 450.0), 0.8)];
        let mut backend = Scripted::new(None, full);
        let boxes = [KnownBox::new(BBox::new(0.0, 0.0, 100.0, 100.0), Some(9))];
        let poses = Reconciler::default().reconcile(&image(), &boxes, &mut backend);
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].group_id, None);
        assert_eq!(backend.full_calls, 1);
    }

    #[test]
    fn no_boxes_means_full_detection() {
        let full = vec![
            pose_in(BBox::new(0.0, 0.0, 50.0, 50.0), 0.9),
            pose_in(BBox::new(100.0, 0.0, 150.0, 50.0), 0.8),
        ];
        let mut backend = Scripted::new(None, full);
        let poses = Reconciler::default().reconcile(&image(), &[], &mut backend);
        assert_eq!(poses.len(), 2);
        assert_eq!(backend.region_calls, 0);
    }
}
