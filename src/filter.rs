use crate::{config::PoseConfig, pose::Pose};
use tracing::debug;

/// Instance score, then visible keypoint count, then a cap on the number of
/// poses. Input order is kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultFilter {
    conf_threshold: f32,
    keypoint_threshold: f32,
    min_keypoints: usize,
    max_poses: usize,
}

impl ResultFilter {
    pub fn new(conf_threshold: f32, keypoint_threshold: f32, min_keypoints: usize, max_poses: usize) -> Self {
        Self {
            conf_threshold,
            keypoint_threshold,
            // a pose with nothing visible is never kept
            min_keypoints: min_keypoints.max(1),
            max_poses,
        }
    }

    pub fn apply(&self, poses: Vec<Pose>) -> Vec<Pose> {
        let candidates = poses.len();
        let kept = poses
            .into_iter()
            .filter(|pose| pose.score >= self.conf_threshold)
            .filter(|pose| pose.visible_keypoints(self.keypoint_threshold) >= self.min_keypoints)
            .take(self.max_poses)
            .collect::<Vec<_>>();
        debug!(candidates, kept = kept.len(), "filtered poses");
        kept
    }
}

impl From<&PoseConfig> for ResultFilter {
    fn from(config: &PoseConfig) -> Self {
        Self::new(
            config.conf_threshold,
            config.keypoint_threshold,
            config.min_keypoints,
            config.max_poses,
        )
    }
}
