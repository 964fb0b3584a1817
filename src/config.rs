use crate::{backend::DEFAULT_MODEL_NAME, error::Error, network::Device, pose::NUM_KEYPOINTS};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

const DEFAULT_CONF_THRESHOLD: f32 = 0.5;
const DEFAULT_KEYPOINT_THRESHOLD: f32 = 0.2;
const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.45;

/// Settings for one estimator; read-only once the estimator is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub model_name: String,
    pub device: Device,
    /// Minimum instance score.
    pub conf_threshold: f32,
    /// Minimum confidence for a keypoint to count as visible.
    pub keypoint_threshold: f32,
    pub max_poses: usize,
    pub min_keypoints: usize,
    pub draw_skeleton: bool,
    /// Use the boxes passed to `detect_from_boxes` at all.
    pub use_detection_results: bool,
    pub advanced: AdvancedParams,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_owned(),
            device: Device::Cpu,
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            keypoint_threshold: DEFAULT_KEYPOINT_THRESHOLD,
            max_poses: 20,
            min_keypoints: 5,
            draw_skeleton: true,
            use_detection_results: true,
            advanced: AdvancedParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedParams {
    /// Letterbox canvas side for single-stage detectors.
    pub img_size: u32,
    pub stride: u32,
    pub nms_iou_threshold: f32,
    /// Candidates kept by NMS, before any pose filtering.
    pub nms_max_detections: usize,
    pub heatmap_input_width: u32,
    pub heatmap_input_height: u32,
    /// Load weights from here instead of the resolver's default location.
    pub weights_path: Option<PathBuf>,
}

impl Default for AdvancedParams {
    fn default() -> Self {
        Self {
            img_size: 640,
            stride: 32,
            nms_iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
            nms_max_detections: 300,
            heatmap_input_width: 192,
            heatmap_input_height: 256,
            weights_path: None,
        }
    }
}

/// Explicit per-call settings layered over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub model_name: Option<String>,
    pub device: Option<Device>,
    pub conf_threshold: Option<f32>,
    pub keypoint_threshold: Option<f32>,
    pub max_poses: Option<usize>,
    pub min_keypoints: Option<usize>,
    pub draw_skeleton: Option<bool>,
    pub use_detection_results: Option<bool>,
    pub weights_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    pose_estimation: PoseConfig,
}

fn clamp_unit(name: &'static str, value: f32, default: f32) -> f32 {
    let clamped = if value.is_nan() {
        default
    } else {
        value.clamp(0.0, 1.0)
    };
    // NaN never compares equal, so it is always reported
    if clamped != value {
        warn!(message = "clamped out of range setting", setting = name, value, clamped);
    }
    clamped
}

fn clamp_count(name: &'static str, value: usize, min: usize, max: usize) -> usize {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(message = "clamped out of range setting", setting = name, value, clamped);
    }
    clamped
}

impl PoseConfig {
    /// Read the `[pose_estimation]` table of a TOML file.
    pub fn load<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| Error::ReadConfig(e, path.to_path_buf()))?;
        Self::from_toml_str(&content).map_err(|e| Error::ParseConfig(e, path.to_path_buf()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.pose_estimation.sanitized())
    }

    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        let overrides = overrides.clone();
        if let Some(model_name) = overrides.model_name {
            self.model_name = model_name;
        }
        if let Some(device) = overrides.device {
            self.device = device;
        }
        if let Some(conf_threshold) = overrides.conf_threshold {
            self.conf_threshold = conf_threshold;
        }
        if let Some(keypoint_threshold) = overrides.keypoint_threshold {
            self.keypoint_threshold = keypoint_threshold;
        }
        if let Some(max_poses) = overrides.max_poses {
            self.max_poses = max_poses;
        }
        if let Some(min_keypoints) = overrides.min_keypoints {
            self.min_keypoints = min_keypoints;
        }
        if let Some(draw_skeleton) = overrides.draw_skeleton {
            self.draw_skeleton = draw_skeleton;
        }
        if let Some(use_detection_results) = overrides.use_detection_results {
            self.use_detection_results = use_detection_results;
        }
        if overrides.weights_path.is_some() {
            self.advanced.weights_path = overrides.weights_path;
        }
        self.sanitized()
    }

    /// Bring every setting into its valid range instead of failing.
    pub fn sanitized(mut self) -> Self {
        self.conf_threshold = clamp_unit("conf_threshold", self.conf_threshold, DEFAULT_CONF_THRESHOLD);
        self.keypoint_threshold = clamp_unit(
            "keypoint_threshold",
            self.keypoint_threshold,
            DEFAULT_KEYPOINT_THRESHOLD,
        );
        self.min_keypoints = clamp_count("min_keypoints", self.min_keypoints, 1, NUM_KEYPOINTS);
        self.max_poses = clamp_count("max_poses", self.max_poses, 1, usize::MAX);

        let advanced = &mut self.advanced;
        advanced.stride = advanced.stride.max(1);
        advanced.img_size = advanced.img_size.max(advanced.stride);
        advanced.nms_max_detections = advanced.nms_max_detections.max(1);
        advanced.heatmap_input_width = advanced.heatmap_input_width.max(1);
        advanced.heatmap_input_height = advanced.heatmap_input_height.max(1);
        advanced.nms_iou_threshold = clamp_unit(
            "nms_iou_threshold",
            advanced.nms_iou_threshold,
            DEFAULT_NMS_IOU_THRESHOLD,
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigOverrides, PoseConfig};
    use crate::{error::Error, network::Device};
    use assert_approx_eq::assert_approx_eq;
    use std::path::PathBuf;

    #[test]
    fn defaults() {
        let config = PoseConfig::default();
        assert_eq!(config.model_name, "generic_detector");
        assert_eq!(config.device, Device::Cpu);
        assert_approx_eq!(config.conf_threshold, 0.5);
        assert_approx_eq!(config.keypoint_threshold, 0.2);
        assert_eq!(config.max_poses, 20);
        assert_eq!(config.min_keypoints, 5);
        assert!(config.draw_skeleton);
        assert!(config.use_detection_results);
        assert_eq!(config.advanced.img_size, 640);
        assert_eq!(config.advanced.nms_max_detections, 300);
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = PoseConfig::from_toml_str(
            r#"
            [pose_estimation]
            model_name = "rtmpose_m"
            device = "cuda"
            draw_skeleton = false

            [pose_estimation.advanced]
            img_size = 960
            "#,
        )
        .unwrap();
        assert_eq!(config.model_name, "rtmpose_m");
        assert_eq!(config.device, Device::Cuda);
        assert!(!config.draw_skeleton);
        assert_eq!(config.max_poses, 20);
        assert_eq!(config.advanced.img_size, 960);
        assert_eq!(config.advanced.stride, 32);

        assert_eq!(PoseConfig::from_toml_str("").unwrap(), PoseConfig::default());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = PoseConfig::from_toml_str(
            r#"
            [pose_estimation]
            conf_threshold = 1.5
            keypoint_threshold = -0.3
            min_keypoints = 0
            max_poses = 0

            [pose_estimation.advanced]
            img_size = 8
            stride = 0
            "#,
        )
        .unwrap();
        assert_approx_eq!(config.conf_threshold, 1.0);
        assert_approx_eq!(config.keypoint_threshold, 0.0);
        assert_eq!(config.min_keypoints, 1);
        assert_eq!(config.max_poses, 1);
        assert_eq!(config.advanced.stride, 1);
        assert_eq!(config.advanced.img_size, 8);

        let config = PoseConfig {
            conf_threshold: f32::NAN,
            min_keypoints: 40,
            ..PoseConfig::default()
        }
        .sanitized();
        assert_approx_eq!(config.conf_threshold, 0.5);
        assert_eq!(config.min_keypoints, 17);
    }

    #[test]
    fn overrides_win_over_file() {
        let config = PoseConfig::default().with_overrides(&ConfigOverrides {
            model_name: Some("yolov7_w6_pose".to_owned()),
            max_poses: Some(3),
            min_keypoints: Some(0),
            weights_path: Some(PathBuf::from("/tmp/yolo.onnx")),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.model_name, "yolov7_w6_pose");
        assert_eq!(config.max_poses, 3);
        assert_eq!(config.min_keypoints, 1);
        assert_eq!(
            config.advanced.weights_path,
            Some(PathBuf::from("/tmp/yolo.onnx"))
        );
        assert_approx_eq!(config.conf_threshold, 0.5);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            PoseConfig::load("/nonexistent/labelpose.toml"),
            Err(Error::ReadConfig(_, _))
        ));
    }
}
