//! Conversion of poses into annotation shapes, and the reverse lookup of
//! person boxes from existing annotations.
use crate::{
    geometry::BBox,
    pose::{constants::SKELETON, Keypoint, Pose},
    reconcile::KnownBox,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    Point,
    Line,
    Rectangle,
    Polygon,
    Circle,
    Linestrip,
}

/// Toolkit-neutral annotation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericShape {
    pub label: String,
    pub points: Vec<[f32; 2]>,
    pub group_id: Option<i64>,
    pub shape_type: ShapeType,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl GenericShape {
    fn new(label: String, points: Vec<[f32; 2]>, group_id: i64, shape_type: ShapeType) -> Self {
        Self {
            label,
            points,
            group_id: Some(group_id),
            shape_type,
            flags: BTreeMap::new(),
        }
    }
}

fn xy(keypoint: &Keypoint) -> [f32; 2] {
    [keypoint.point.x, keypoint.point.y]
}

/// One point shape per present keypoint and, with `draw_skeleton`, one line
/// per skeleton edge whose endpoints are both present.
///
/// Pose `i` is grouped under its own group id when it has one, otherwise
/// under `start_group_id + i`.
pub fn project(poses: &[Pose], start_group_id: i64, draw_skeleton: bool) -> Vec<GenericShape> {
    let mut shapes = Vec::new();
    for (i, pose) in poses.iter().enumerate() {
        let group_id = pose.group_id.unwrap_or(start_group_id + i as i64);

        shapes.extend(
            pose.keypoints
                .iter()
                .filter(|keypoint| keypoint.is_present())
                .map(|keypoint| {
                    GenericShape::new(
                        keypoint.kind.name().to_owned(),
                        vec![xy(keypoint)],
                        group_id,
                        ShapeType::Point,
                    )
                }),
        );

        if draw_skeleton {
            shapes.extend(SKELETON.iter().filter_map(|&(a, b)| {
                let (start, end) = (pose.get(a), pose.get(b));
                if start.is_present() && end.is_present() {
                    Some(GenericShape::new(
                        format!("limb_{}_{}", a.name(), b.name()),
                        vec![xy(start), xy(end)],
                        group_id,
                        ShapeType::Line,
                    ))
                } else {
                    None
                }
            }));
        }
    }
    shapes
}

/// Person rectangles already in an annotation, as boxes to detect inside.
pub fn person_boxes(shapes: &[GenericShape]) -> Vec<KnownBox> {
    shapes
        .iter()
        .filter(|shape| {
            shape.shape_type == ShapeType::Rectangle && shape.label.eq_ignore_ascii_case("person")
        })
        .filter_map(|shape| match shape.points.as_slice() {
            [[xa, ya], [xb, yb], ..] => Some(KnownBox::new(
                BBox::new(*xa, *ya, *xb, *yb),
                shape.group_id,
            )),
            _ => None,
        })
        .collect()
}

/// First group id not used by any shape.
pub fn next_group_id(shapes: &[GenericShape]) -> i64 {
    shapes
        .iter()
        .filter_map(|shape| shape.group_id)
        .max()
        .map_or(0, |max| max + 1)
}
