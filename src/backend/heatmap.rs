//! Heatmap regressors that estimate one person from a crop around a box.
//!
//! One output of shape `(17, H, W)`, optionally with a leading batch axis:
//! a confidence map per keypoint over the resized crop.
use super::{invoke, output_view, Backend, BackendKind};
use crate::{
    config::PoseConfig,
    error::Error,
    geometry::{BBox, PixelRegion},
    image::Image,
    network::Network,
    pose::{Pose, NUM_KEYPOINTS},
};
use ndarray::{ArrayView2, Ix3};
use num_traits::ToPrimitive;
use tracing::debug;

/// Crops are taken this much larger than the person box.
pub const BOX_PADDING: f32 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    pub input_width: u32,
    pub input_height: u32,
}

impl From<&PoseConfig> for Params {
    fn from(config: &PoseConfig) -> Self {
        Self {
            input_width: config.advanced.heatmap_input_width.max(1),
            input_height: config.advanced.heatmap_input_height.max(1),
        }
    }
}

pub struct Adapter {
    network: Box<dyn Network + Send>,
    params: Params,
}

/// Padded, aspect-corrected crop window around `hint`, clipped to the image.
fn crop_window(hint: &BBox, params: &Params, width: u32, height: u32) -> Result<PixelRegion, Error> {
    let (cx, cy) = hint.center();
    let aspect = params.input_width as f32 / params.input_height as f32;
    let mut w = hint.width() * BOX_PADDING;
    let mut h = hint.height() * BOX_PADDING;
    if w > h * aspect {
        h = w / aspect;
    } else {
        w = h * aspect;
    }
    let window = BBox::from_center(cx, cy, w, h);

    let x1 = window.x1.max(0.0).floor().to_u32().ok_or(Error::ConvertToU32)?;
    let y1 = window.y1.max(0.0).floor().to_u32().ok_or(Error::ConvertToU32)?;
    let x2 = window
        .x2
        .min(width as f32)
        .ceil()
        .to_u32()
        .ok_or(Error::ConvertToU32)?
        .min(width);
    let y2 = window
        .y2
        .min(height as f32)
        .ceil()
        .to_u32()
        .ok_or(Error::ConvertToU32)?
        .min(height);

    if x2 <= x1 || y2 <= y1 {
        return Err(Error::DegenerateRegion {
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
            min: 1,
        });
    }
    Ok(PixelRegion {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    })
}

/// Location and value of the hottest cell, nudged a quarter cell toward the
/// hotter neighbour along each axis.
fn locate_peak(heatmap: ArrayView2<f32>) -> Result<(f32, f32, f32), Error> {
    let (rows, cols) = heatmap.dim();
    let mut best: Option<(usize, usize, f32)> = None;
    for ((y, x), &value) in heatmap.indexed_iter() {
        match best {
            Some((_, _, peak)) if !(value > peak) => {}
            _ if value.is_nan() => {}
            _ => best = Some((x, y, value)),
        }
    }

    let (x, y, peak) = match best {
        Some(best) => best,
        None => return Ok((0.0, 0.0, 0.0)),
    };

    let mut fx = x.to_f32().ok_or(Error::ConvertToF32)?;
    let mut fy = y.to_f32().ok_or(Error::ConvertToF32)?;
    if x > 0 && x + 1 < cols {
        let diff = heatmap[(y, x + 1)] - heatmap[(y, x - 1)];
        if diff > 0.0 {
            fx += 0.25;
        } else if diff < 0.0 {
            fx -= 0.25;
        }
    }
    if y > 0 && y + 1 < rows {
        let diff = heatmap[(y + 1, x)] - heatmap[(y - 1, x)];
        if diff > 0.0 {
            fy += 0.25;
        } else if diff < 0.0 {
            fy -= 0.25;
        }
    }
    Ok((fx, fy, peak))
}

impl Adapter {
    pub(super) fn new(network: Box<dyn Network + Send>, params: Params) -> Self {
        Self { network, params }
    }

    fn run(&mut self, image: &Image, hint: &BBox) -> Result<Option<Pose>, Error> {
        let window = crop_window(hint, &self.params, image.width(), image.height())?;
        let crop = image
            .crop(&window)
            .resize(self.params.input_width, self.params.input_height);
        let outputs = invoke(self.network.as_mut(), BackendKind::Heatmap, crop.to_tensor())?;
        let heatmaps = output_view::<Ix3>(&outputs, 0)?;

        let (channels, rows, cols) = heatmaps.dim();
        if channels != NUM_KEYPOINTS {
            return Err(Error::GetHeatmapChannels {
                expected: NUM_KEYPOINTS,
                got: channels,
            });
        }
        if rows == 0 || cols == 0 {
            debug!(?window, "empty heatmap");
            return Ok(None);
        }

        let scale_x = window.width as f32 / cols.to_f32().ok_or(Error::ConvertToF32)?;
        let scale_y = window.height as f32 / rows.to_f32().ok_or(Error::ConvertToF32)?;
        let keypoints = heatmaps
            .outer_iter()
            .map(|heatmap| {
                let (x, y, peak) = locate_peak(heatmap)?;
                Ok((
                    window.x as f32 + (x + 0.5) * scale_x,
                    window.y as f32 + (y + 0.5) * scale_y,
                    peak.clamp(0.0, 1.0),
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let score = keypoints.iter().map(|&(_, _, c)| c).sum::<f32>() / NUM_KEYPOINTS as f32;
        Ok(Some(Pose::from_rows(keypoints, score)?))
    }
}

impl Backend for Adapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Heatmap
    }

    /// Without a person box the whole frame is treated as one person.
    fn detect(&mut self, image: &Image) -> Result<Vec<Pose>, Error> {
        let full = PixelRegion::full(image.width(), image.height()).as_bbox();
        Ok(self.run(image, &full)?.into_iter().collect())
    }

    fn detect_region(&mut self, image: &Image, region: &PixelRegion) -> Result<Option<Pose>, Error> {
        self.run(image, &region.as_bbox())
    }
}

#[cfg(test)]
mod tests {
    use super::{crop_window, locate_peak, Adapter, Params};
    use crate::{
        backend::Backend,
        error::Error,
        geometry::{BBox, PixelRegion},
        image::Image,
        pose::NUM_KEYPOINTS,
        testing,
    };
    use assert_approx_eq::assert_approx_eq;
    use ndarray::{Array2, Array3, ArrayD, IxDyn};

    fn params() -> Params {
        Params {
            input_width: 192,
            input_height: 256,
        }
    }

    #[test]
    fn crop_window_pads_and_fixes_aspect() {
        // 100x100 pads to 125x125, then grows to 125 / 0.75 tall for a 3:4 input
        let window = crop_window(
            &BBox::new(200.0, 200.0, 300.0, 300.0),
            &params(),
            1000,
            1000,
        )
        .unwrap();
        assert_eq!(window.width, 126);
        assert_eq!(window.height, 168);

        let clipped = crop_window(&BBox::new(0.0, 0.0, 100.0, 400.0), &params(), 640, 480).unwrap();
        assert_eq!((clipped.x, clipped.y), (0, 0));
        assert!(clipped.y + clipped.height <= 480);
    }

    #[test]
    fn peak_shifts_toward_hotter_neighbour() {
        let mut heatmap = Array2::<f32>::zeros((8, 8));
        heatmap[(3, 4)] = 0.9;
        heatmap[(3, 5)] = 0.5;
        heatmap[(2, 4)] = 0.2;
        let (x, y, peak) = locate_peak(heatmap.view()).unwrap();
        assert_approx_eq!(x, 4.25);
        assert_approx_eq!(y, 2.75);
        assert_approx_eq!(peak, 0.9);

        // at the border there is no neighbour to compare against
        let mut edge = Array2::<f32>::zeros((4, 4));
        edge[(0, 0)] = 0.4;
        let (x, y, _) = locate_peak(edge.view()).unwrap();
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn all_nan_heatmap_has_no_peak() {
        let heatmap = Array2::<f32>::from_elem((4, 4), f32::NAN);
        assert_eq!(locate_peak(heatmap.view()).unwrap(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn region_pose_lands_inside_window() {
        let mut maps = Array3::<f32>::zeros((NUM_KEYPOINTS, 64, 48));
        for k in 0..NUM_KEYPOINTS {
            maps[(k, 32, 24)] = 1.5;
        }
        let out = vec![maps.into_dyn().insert_axis(ndarray::Axis(0))];
        let mut adapter = Adapter::new(
            testing::network(1, move |input| {
                assert_eq!(input.shape(), &[1, 3, 256, 192]);
                Ok(out.clone())
            }),
            params(),
        );
        let region = PixelRegion {
            x: 100,
            y: 50,
            width: 200,
            height: 350,
        };
        let image = Image::filled(640, 480, [0; 3]);
        let pose = adapter.detect_region(&image, &region).unwrap().unwrap();
        let window = crop_window(&region.as_bbox(), &params(), 640, 480).unwrap();

        for keypoint in pose.keypoints.iter() {
            assert!(keypoint.point.x >= window.x as f32);
            assert!(keypoint.point.x <= (window.x + window.width) as f32);
            assert!(keypoint.point.y >= window.y as f32);
            assert!(keypoint.point.y <= (window.y + window.height) as f32);
            // peaks above one are clamped
            assert_approx_eq!(keypoint.score, 1.0);
        }
        assert_approx_eq!(pose.score, 1.0);
        assert_eq!(adapter.detect(&image).unwrap().len(), 1);
    }

    #[test]
    fn wrong_channel_count_is_an_error() {
        let mut adapter = Adapter::new(
            testing::network(1, |_| Ok(vec![ArrayD::zeros(IxDyn(&[18, 8, 6]))])),
            params(),
        );
        assert!(matches!(
            adapter.detect(&Image::filled(64, 64, [0; 3])),
            Err(Error::GetHeatmapChannels {
                expected: NUM_KEYPOINTS,
                got: 18
            })
        ));
    }
}
