use crate::{error::Error, geometry::BBox};
use num_traits::FromPrimitive;
use std::ops::Add;

/// The 17 joints of the canonical keypoint schema, in output order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, num_derive::FromPrimitive)]
pub enum KeypointKind {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

pub const NUM_KEYPOINTS: usize = 17;

impl KeypointKind {
    pub fn idx(self) -> usize {
        self as usize
    }

    pub fn from_idx(index: usize) -> Result<Self, Error> {
        Self::from_usize(index).ok_or(Error::ConvertUSizeToKeypointKind(index))
    }

    /// Label used for point shapes and limb names.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        self + Self::new(dx, dy)
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::Output {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Keypoint {
    pub kind: KeypointKind,
    pub point: Point,
    pub score: f32,
}

impl Keypoint {
    /// A keypoint is drawn at all only when its confidence is strictly positive.
    pub fn is_present(&self) -> bool {
        self.score > 0.0
    }
}

pub type Keypoints = [Keypoint; NUM_KEYPOINTS];

/// Map a discrete 0/1/2 (not visible / occluded / visible) flag onto `[0, 1]`.
pub fn visibility_to_confidence(visibility: f32) -> f32 {
    if visibility > 0.0 {
        (visibility / 2.0).min(1.0)
    } else {
        0.0
    }
}

/// One detected instance.
///
/// Coordinates are always in original-image pixels. `bbox` is the detector's own
/// instance box when the backend reports one; `group_id` is set only when the
/// pose was produced for an externally supplied box.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub keypoints: Keypoints,
    pub score: f32,
    pub bbox: Option<BBox>,
    pub group_id: Option<i64>,
}

impl Pose {
    /// Build a pose from `(x, y, confidence)` rows in schema order.
    pub fn from_rows<I>(rows: I, score: f32) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (f32, f32, f32)>,
    {
        let mut keypoints = [Keypoint {
            kind: KeypointKind::Nose,
            point: Point::default(),
            score: 0.0,
        }; NUM_KEYPOINTS];

        let mut count = 0;
        for (index, (x, y, score)) in rows.into_iter().enumerate() {
            let slot = keypoints.get_mut(index).ok_or(Error::GetKeypointCount {
                expected: NUM_KEYPOINTS,
                got: index + 1,
            })?;
            *slot = Keypoint {
                kind: KeypointKind::from_idx(index)?,
                point: Point::new(x, y),
                score,
            };
            count = index + 1;
        }
        if count != NUM_KEYPOINTS {
            return Err(Error::GetKeypointCount {
                expected: NUM_KEYPOINTS,
                got: count,
            });
        }

        Ok(Self {
            keypoints,
            score,
            bbox: None,
            group_id: None,
        })
    }

    pub fn with_bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn get(&self, kind: KeypointKind) -> &Keypoint {
        &self.keypoints[kind.idx()]
    }

    /// Number of keypoints at or above `threshold`.
    pub fn visible_keypoints(&self, threshold: f32) -> usize {
        self.keypoints
            .iter()
            .filter(|keypoint| keypoint.score >= threshold)
            .count()
    }

    /// Apply `f` to every keypoint location and to the instance box.
    pub fn map_points<F>(mut self, f: F) -> Self
    where
        F: Fn(Point) -> Point,
    {
        for keypoint in self.keypoints.iter_mut() {
            keypoint.point = f(keypoint.point);
        }
        self.bbox = self.bbox.map(|bbox| {
            let top_left = f(Point::new(bbox.x1, bbox.y1));
            let bottom_right = f(Point::new(bbox.x2, bbox.y2));
            BBox::new(top_left.x, top_left.y, bottom_right.x, bottom_right.y)
        });
        self
    }

    /// Spatial extent used for overlap matching: the detector's box when known,
    /// otherwise the bounds of the present keypoints.
    pub fn extent(&self) -> Option<BBox> {
        if self.bbox.is_some() {
            return self.bbox;
        }
        let mut present = self.keypoints.iter().filter(|k| k.is_present());
        let first = present.next()?.point;
        let (x1, y1, x2, y2) = present.fold(
            (first.x, first.y, first.x, first.y),
            |(x1, y1, x2, y2), keypoint| {
                let Point { x, y } = keypoint.point;
                (x1.min(x), y1.min(y), x2.max(x), y2.max(y))
            },
        );
        Some(BBox::new(x1, y1, x2, y2))
    }
}

pub mod constants {
    use crate::pose::KeypointKind::{self, *};

    /// Limb segments drawn between joints.
    pub const SKELETON: [(KeypointKind, KeypointKind); 18] = [
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
        (Nose, LeftEye),
        (Nose, RightEye),
        (LeftEye, LeftEar),
        (RightEye, RightEar),
        (Nose, LeftShoulder),
        (Nose, RightShoulder),
    ];
}
