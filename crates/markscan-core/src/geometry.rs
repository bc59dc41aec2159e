use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Errors for malformed geometric inputs. These indicate caller bugs, not scan noise.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("region has non-positive or non-finite size ({width}x{height})")]
    EmptyRegion { width: f32, height: f32 },
    #[error("region at ({x}, {y}) is non-finite")]
    NonFiniteRegion { x: f32, y: f32 },
    #[error("region does not overlap the {width}x{height} image")]
    OutsideImage { width: usize, height: usize },
    #[error("image buffer does not match its dimensions ({width}x{height})")]
    InvalidImage { width: usize, height: usize },
    #[error("blob size range is empty (min={min}, max={max})")]
    InvalidSizeRange { min: usize, max: usize },
}

/// Axis-aligned rectangle in image-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Integer pixel rectangle `[x0, x1) × [y0, y1)`, always non-empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl PixelRect {
    #[inline]
    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }
}

impl Region {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Reject zero-area or non-finite regions.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Err(GeometryError::NonFiniteRegion {
                x: self.x,
                y: self.y,
            });
        }
        if !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
        {
            return Err(GeometryError::EmptyRegion {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Smallest region covering both `self` and `other`.
    pub fn union(&self, other: &Region) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    /// Clip to the pixel grid of a `width × height` image.
    ///
    /// Includes every pixel the region touches; fails when nothing is left.
    pub fn pixel_bounds(&self, width: usize, height: usize) -> Result<PixelRect, GeometryError> {
        self.validate()?;
        let x0 = self.x.floor().max(0.0) as usize;
        let y0 = self.y.floor().max(0.0) as usize;
        let x1 = (self.right().ceil().max(0.0) as usize).min(width);
        let y1 = (self.bottom().ceil().max(0.0) as usize).min(height);
        if x0 >= x1 || y0 >= y1 {
            return Err(GeometryError::OutsideImage { width, height });
        }
        Ok(PixelRect { x0, y0, x1, y1 })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerId {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl CornerId {
    /// TL, TR, BR, BL.
    pub const ALL: [CornerId; 4] = [
        CornerId::TopLeft,
        CornerId::TopRight,
        CornerId::BottomRight,
        CornerId::BottomLeft,
    ];
}

/// Four ordered page corners (fiducial centroids, ideal or detected).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub tl: Point2<f32>,
    pub tr: Point2<f32>,
    pub br: Point2<f32>,
    pub bl: Point2<f32>,
}

impl Corners {
    pub fn from_array(pts: [Point2<f32>; 4]) -> Self {
        Self {
            tl: pts[0],
            tr: pts[1],
            br: pts[2],
            bl: pts[3],
        }
    }

    /// TL, TR, BR, BL order, matching [`CornerId::ALL`].
    pub fn to_array(&self) -> [Point2<f32>; 4] {
        [self.tl, self.tr, self.br, self.bl]
    }

    pub fn get(&self, id: CornerId) -> Point2<f32> {
        match id {
            CornerId::TopLeft => self.tl,
            CornerId::TopRight => self.tr,
            CornerId::BottomRight => self.br,
            CornerId::BottomLeft => self.bl,
        }
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::from_array(self.to_array().map(|p| Point2::new(p.x + dx, p.y + dy)))
    }
}
