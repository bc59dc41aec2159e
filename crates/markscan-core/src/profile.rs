//! 1-D darkness projections and weighted peak extraction.

use crate::{GeometryError, Region, RgbaImageView};
use serde::{Deserialize, Serialize};

/// Which direction a profile runs along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// One value per image column (x); ink is summed down each column.
    Columns,
    /// One value per image row (y); ink is summed across each row.
    Rows,
}

/// One peak of a projection profile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Intensity-weighted centroid, in profile indices.
    pub position: f32,
    /// Sum of profile values over the run.
    pub mass: f32,
    /// Run extent `[start, end)` in profile indices.
    pub start: usize,
    pub end: usize,
}

/// Count dark pixels (luminance below `dark_threshold`) along `axis`.
///
/// The profile covers the part of `region` inside the image; index 0 is the
/// first clipped column/row. Transparent pixels never count.
pub fn projection_profile(
    img: &RgbaImageView<'_>,
    region: &Region,
    axis: Axis,
    dark_threshold: f32,
) -> Result<Vec<f32>, GeometryError> {
    if !img.is_consistent() {
        return Err(GeometryError::InvalidImage {
            width: img.width,
            height: img.height,
        });
    }
    let px = region.pixel_bounds(img.width, img.height)?;
    let mut profile = match axis {
        Axis::Columns => vec![0.0f32; px.width()],
        Axis::Rows => vec![0.0f32; px.height()],
    };

    for y in px.y0..px.y1 {
        for x in px.x0..px.x1 {
            let Some(l) = img.luma(x, y) else {
                continue;
            };
            if l < dark_threshold {
                let idx = match axis {
                    Axis::Columns => x - px.x0,
                    Axis::Rows => y - px.y0,
                };
                profile[idx] += 1.0;
            }
        }
    }
    Ok(profile)
}

/// Find runs strictly above `max * ratio` and return their weighted centroids.
///
/// Peaks come back in ascending position. A run still open at the end of the
/// profile is closed and emitted; an empty or all-zero profile has no peaks.
pub fn find_peaks(profile: &[f32], ratio: f32) -> Vec<Peak> {
    let max = profile.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = max * ratio;

    let mut peaks = Vec::new();
    let mut run: Option<(usize, f64, f64)> = None; // (start, Σ i·v, Σ v)

    for (i, &v) in profile.iter().enumerate() {
        if v > threshold {
            let (start, wsum, sum) = run.unwrap_or((i, 0.0, 0.0));
            run = Some((start, wsum + i as f64 * v as f64, sum + v as f64));
        } else if let Some((start, wsum, sum)) = run.take() {
            peaks.push(close_run(start, i, wsum, sum));
        }
    }
    if let Some((start, wsum, sum)) = run {
        peaks.push(close_run(start, profile.len(), wsum, sum));
    }
    peaks
}

fn close_run(start: usize, end: usize, wsum: f64, sum: f64) -> Peak {
    let position = if sum > 0.0 {
        wsum / sum
    } else {
        0.5 * (start + end - 1) as f64
    };
    Peak {
        position: position as f32,
        mass: sum as f32,
        start,
        end,
    }
}
