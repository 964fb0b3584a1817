use crate::{error::Error, geometry::BBox};
use ordered_float::NotNan;
use std::cmp::Reverse;

/// Fill `indices` with the positions of `scores` ordered from highest to lowest.
pub(crate) fn decreasing_arg_sort(scores: &[f32], indices: &mut [usize]) -> Result<(), Error> {
    let keys = scores
        .iter()
        .map(|&score| NotNan::new(score).map_err(|e| Error::ConstructNotNan(e, score)))
        .collect::<Result<Vec<_>, _>>()?;
    indices.iter_mut().enumerate().for_each(|(i, dst)| {
        *dst = i;
    });
    indices.sort_by_key(|&i| Reverse(keys[i]));
    Ok(())
}

/// Greedy non-maximum suppression.
///
/// Returns indices into `boxes` of the kept candidates, best first. A candidate
/// is dropped when its IoU with an already kept box exceeds `iou_threshold`.
pub(crate) fn non_max_suppression(
    boxes: &[BBox],
    scores: &[f32],
    iou_threshold: f32,
    max_detections: usize,
) -> Result<Vec<usize>, Error> {
    let mut order = vec![0; scores.len()];
    decreasing_arg_sort(scores, &mut order)?;

    let mut keep: Vec<usize> = Vec::new();
    for i in order {
        if keep.len() >= max_detections {
            break;
        }
        let candidate = &boxes[i];
        if keep
            .iter()
            .all(|&k| boxes[k].iou(candidate) <= iou_threshold)
        {
            keep.push(i);
        }
    }
    Ok(keep)
}
