//! Connected-component search for dark marks inside a bounded region.

use crate::{GeometryError, Region, RgbaImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// How the darkness threshold for blob membership is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DarkThreshold {
    /// Pixels with luminance strictly below this value are dark.
    Fixed(f32),
    /// `min(cap, mean_luma(region) * factor)`, robust to exposure changes.
    Adaptive { cap: f32, factor: f32 },
}

impl DarkThreshold {
    fn resolve(&self, mean_luma: f32) -> f32 {
        match *self {
            DarkThreshold::Fixed(t) => t,
            DarkThreshold::Adaptive { cap, factor } => cap.min(mean_luma * factor),
        }
    }
}

/// Which blob to return when several pass the filters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobSelection {
    Largest,
    /// Smallest Euclidean distance from the centroid to this image point.
    NearestTo(Point2<f32>),
}

/// Parameters of one bounded blob search.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobSearch {
    pub region: Region,
    pub threshold: DarkThreshold,
    /// Inclusive pixel-count range.
    pub min_size: usize,
    pub max_size: usize,
    pub selection: BlobSelection,
    /// Reject blobs whose bounding box is more elongated than this (long / short side).
    pub max_aspect_ratio: Option<f32>,
}

/// A 4-connected component of dark pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub pixel_count: usize,
    /// Mean of member pixel centers, in image coordinates.
    pub centroid: Point2<f32>,
    /// Tight pixel bounding box in image coordinates.
    pub bbox: Region,
    /// Threshold that was actually applied.
    pub threshold: f32,
}

impl Blob {
    pub fn aspect_ratio(&self) -> f32 {
        let long = self.bbox.width.max(self.bbox.height);
        let short = self.bbox.width.min(self.bbox.height);
        long / short
    }
}

/// Find one dark blob in `search.region`.
///
/// `Ok(None)` means nothing passed the size/shape filters, which is a normal
/// outcome (unmarked area, missing fiducial). Errors are reserved for
/// malformed input.
pub fn find_blob(
    img: &RgbaImageView<'_>,
    search: &BlobSearch,
) -> Result<Option<Blob>, GeometryError> {
    if !img.is_consistent() {
        return Err(GeometryError::InvalidImage {
            width: img.width,
            height: img.height,
        });
    }
    if search.min_size > search.max_size {
        return Err(GeometryError::InvalidSizeRange {
            min: search.min_size,
            max: search.max_size,
        });
    }
    let px = search.region.pixel_bounds(img.width, img.height)?;
    let (w, h) = (px.width(), px.height());

    // Local luminance, one entry per pixel; NaN marks transparent pixels.
    let mut luma = vec![f32::NAN; w * h];
    let mut sum = 0.0f64;
    let mut opaque = 0usize;
    for y in 0..h {
        for x in 0..w {
            if let Some(l) = img.luma(px.x0 + x, px.y0 + y) {
                luma[y * w + x] = l;
                sum += l as f64;
                opaque += 1;
            }
        }
    }
    if opaque == 0 {
        return Ok(None);
    }
    let mean = (sum / opaque as f64) as f32;
    let threshold = search.threshold.resolve(mean);
    let is_dark = |i: usize| luma[i] < threshold;

    let mut visited = vec![false; w * h];
    let mut stack: Vec<usize> = Vec::new();
    let mut best: Option<(Blob, f32)> = None;

    for start in 0..w * h {
        if visited[start] || !is_dark(start) {
            continue;
        }
        visited[start] = true;
        stack.push(start);

        let mut count = 0usize;
        let (mut sx, mut sy) = (0.0f64, 0.0f64);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0usize, 0usize);

        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            count += 1;
            sx += x as f64;
            sy += y as f64;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            let mut visit = |j: usize| {
                if !visited[j] && is_dark(j) {
                    visited[j] = true;
                    stack.push(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < w {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - w);
            }
            if y + 1 < h {
                visit(i + w);
            }
        }

        if count < search.min_size || count > search.max_size {
            continue;
        }

        let blob = Blob {
            pixel_count: count,
            centroid: Point2::new(
                (px.x0 as f64 + sx / count as f64 + 0.5) as f32,
                (px.y0 as f64 + sy / count as f64 + 0.5) as f32,
            ),
            bbox: Region::new(
                (px.x0 + min_x) as f32,
                (px.y0 + min_y) as f32,
                (max_x - min_x + 1) as f32,
                (max_y - min_y + 1) as f32,
            ),
            threshold,
        };
        if let Some(max_ratio) = search.max_aspect_ratio {
            if blob.aspect_ratio() > max_ratio {
                continue;
            }
        }

        // Lower score wins.
        let score = match search.selection {
            BlobSelection::Largest => -(count as f32),
            BlobSelection::NearestTo(target) => (blob.centroid - target).norm(),
        };
        if best.as_ref().map_or(true, |(_, s)| score < *s) {
            best = Some((blob, score));
        }
    }

    Ok(best.map(|(b, _)| b))
}
