use crate::error::Error;

/// Boxes smaller than this on either side after clamping carry too little of a
/// person to detect anything in.
pub const MIN_REGION_SIDE: u32 = 10;

/// Axis-aligned box in original-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    /// Construct a box from two opposite corners in any order.
    pub fn new(xa: f32, ya: f32, xb: f32, yb: f32) -> Self {
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        }
    }

    /// Construct from center/size form.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Intersection over union. Boxes that merely touch, or that have no area,
    /// have an IoU of zero.
    pub fn iou(&self, other: &Self) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }

        let intersection = (ix2 - ix1) * (iy2 - iy1);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Snap to integer pixels inside a `width` x `height` image.
    ///
    /// Corners are truncated and clamped to the last valid row/column; a
    /// result under [`MIN_REGION_SIDE`] on either side is rejected. The far
    /// edge is exclusive, so a box reaching the border drops the image's last
    /// row or column.
    pub fn to_region(&self, width: u32, height: u32) -> Result<PixelRegion, Error> {
        let clamp = |value: f32, size: u32| -> u32 {
            let max = size.saturating_sub(1);
            if value.is_nan() || value <= 0.0 {
                0
            } else {
                (value as u32).min(max)
            }
        };

        let x1 = clamp(self.x1, width);
        let y1 = clamp(self.y1, height);
        let x2 = clamp(self.x2, width);
        let y2 = clamp(self.y2, height);

        let region = PixelRegion {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
        };

        if region.width < MIN_REGION_SIDE || region.height < MIN_REGION_SIDE {
            Err(Error::DegenerateRegion {
                width: region.width,
                height: region.height,
                min: MIN_REGION_SIDE,
            })
        } else {
            Ok(region)
        }
    }
}

/// Integer sub-rectangle of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRegion {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn as_bbox(&self) -> BBox {
        BBox::new(
            self.x as f32,
            self.y as f32,
            (self.x + self.width) as f32,
            (self.y + self.height) as f32,
        )
    }
}
