//! Human pose estimation for image annotation.
//!
//! An [`estimator::PoseEstimator`] runs one of several keypoint detector
//! families over an image, optionally guided by person boxes that already
//! exist in the annotation, and returns labelled point and limb shapes.

pub mod backend;
pub mod config;
pub mod error;
pub mod estimator;
pub mod filter;
pub mod geometry;
pub mod image;
pub mod letterbox;
pub mod network;
pub mod pose;
pub mod reconcile;
pub mod shapes;

#[cfg(test)]
mod testing;

pub use crate::{
    config::{ConfigOverrides, PoseConfig},
    error::Error,
    estimator::{estimate_poses, PoseEstimator},
    network::{ArtifactResolver, Device, WeightsDirResolver},
    reconcile::KnownBox,
    shapes::GenericShape,
};
