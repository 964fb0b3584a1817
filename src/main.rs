use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use labelpose::{
    image::Image, ConfigOverrides, Device, GenericShape, KnownBox, PoseConfig, PoseEstimator,
    WeightsDirResolver,
};
use serde::Serialize;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use structopt::StructOpt;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Images to estimate poses in.
    #[structopt(required = true)]
    images: Vec<PathBuf>,

    /// TOML file with a [pose_estimation] table.
    #[structopt(short, long)]
    config: Option<PathBuf>,

    /// Directory holding <model_name>.onnx weights.
    #[structopt(short, long, default_value = "weights")]
    weights_dir: PathBuf,

    #[structopt(short, long)]
    model_name: Option<String>,

    /// cpu or cuda.
    #[structopt(short, long)]
    device: Option<Device>,

    /// Minimum instance score.
    #[structopt(long)]
    conf_threshold: Option<f32>,

    /// Minimum confidence for a keypoint to count as visible.
    #[structopt(long)]
    keypoint_threshold: Option<f32>,

    #[structopt(long)]
    max_poses: Option<usize>,

    #[structopt(long)]
    min_keypoints: Option<usize>,

    /// Emit keypoints only, without limb lines.
    #[structopt(long)]
    no_skeleton: bool,

    /// Known person box, x1,y1,x2,y2[@group_id]. May be repeated.
    #[structopt(short, long = "box")]
    boxes: Vec<KnownBox>,

    /// First group id for poses not tied to a known box.
    #[structopt(short, long, default_value = "0")]
    start_group_id: i64,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(long)]
    show_progress: bool,
}

#[derive(Serialize)]
struct Annotation<'a> {
    image: &'a Path,
    shapes: Vec<GenericShape>,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .with(opt.log_level),
    )?;

    let config = match &opt.config {
        Some(path) => PoseConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PoseConfig::default(),
    }
    .with_overrides(&ConfigOverrides {
        model_name: opt.model_name,
        device: opt.device,
        conf_threshold: opt.conf_threshold,
        keypoint_threshold: opt.keypoint_threshold,
        max_poses: opt.max_poses,
        min_keypoints: opt.min_keypoints,
        draw_skeleton: if opt.no_skeleton { Some(false) } else { None },
        ..ConfigOverrides::default()
    });

    let resolver = WeightsDirResolver::new(opt.weights_dir);
    let mut estimator =
        PoseEstimator::new(config, &resolver).context("failed to construct pose estimator")?;

    let pb = if opt.show_progress {
        let pb = ProgressBar::new(opt.images.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40}] {pos}/{len} {wide_msg}"),
        );
        pb.set_prefix("poses");
        Some(pb)
    } else {
        None
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0_usize;
    for path in &opt.images {
        if let Some(pb) = pb.as_ref() {
            pb.set_message(path.display().to_string());
        }

        match Image::open(path) {
            Ok(image) => {
                let shapes = estimator.detect_from_boxes(&image, &opt.boxes, opt.start_group_id);
                info!(
                    message = "annotated image",
                    image = %path.display(),
                    shapes = shapes.len()
                );
                serde_json::to_writer(
                    &mut out,
                    &Annotation {
                        image: path,
                        shapes,
                    },
                )?;
                writeln!(out)?;
            }
            Err(e) => {
                failed += 1;
                warn!(message = "skipping image", image = %path.display(), error = %e);
            }
        }

        if let Some(pb) = pb.as_ref() {
            pb.inc(1);
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message(format!("{} images, {} skipped", opt.images.len(), failed));
    }
    Ok(())
}
