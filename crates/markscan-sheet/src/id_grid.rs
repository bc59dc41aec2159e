//! Student-ID grids: `digits` columns of `values` bubbles each.

use markscan_core::{GeometryError, Region, RgbaImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::decode::classify_student_marks;
use crate::sampling::{
    across, along, bubble_roi, ensure_consistent, positions_from_peaks, sample_rois, strip_peaks,
    uniform_centers, BubblePositions, BubbleSample, SpacingSource,
};
use crate::{DetectionResult, IdGridLayout, MarkSheetConfig, MarkSheetError};

/// Width of each candidate timing strip, as a fraction of the digit-axis extent.
const STRIP_FRACTION: f32 = 0.15;
/// Score bonus for strips at the grid edge, where timing marks are printed.
const EDGE_BONUS: f32 = 0.1;

/// Decoded ID grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdReading {
    /// One result per digit, value indices.
    pub digits: Vec<DetectionResult>,
    /// Samples per digit, indexed by value.
    pub samples: Vec<Vec<BubbleSample>>,
    /// Value-axis centers shared by all digits.
    pub spacing: BubblePositions,
    pub dark_threshold: f32,
}

impl IdReading {
    /// The ID as a string, when every digit has exactly one mark.
    ///
    /// Value indices 0 to 9 are digits and 10 to 35 are `a` to `z`;
    /// `IdGridLayout::validate` caps `values` at 36.
    pub fn value(&self) -> Option<String> {
        self.digits
            .iter()
            .map(|d| {
                let v = d.single()?;
                char::from_digit(u32::try_from(v).ok()?, 36)
            })
            .collect()
    }
}

fn regularity(centers: &[f32]) -> f32 {
    let gaps: Vec<f32> = centers.windows(2).map(|w| w[1] - w[0]).collect();
    if gaps.is_empty() {
        return 1.0;
    }
    let mean = gaps.iter().sum::<f32>() / gaps.len() as f32;
    if mean <= 0.0 {
        return 0.0;
    }
    let var = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f32>() / gaps.len() as f32;
    (1.0 - var.sqrt() / mean).max(0.0)
}

/// Candidate strips along the value axis: leading edge, trailing edge, center.
fn candidate_strips(region: &Region, layout: &IdGridLayout) -> [(Region, bool); 3] {
    let (d0, dlen) = across(region, layout.orientation);
    let (v0, vlen) = along(region, layout.orientation);
    let w = dlen * STRIP_FRACTION;
    let starts = [(d0, true), (d0 + dlen - w, true), (d0 + 0.5 * (dlen - w), false)];
    starts.map(|(s, edge)| {
        let strip = match layout.orientation {
            crate::Orientation::Vertical => Region::new(s, v0, w, vlen),
            crate::Orientation::Horizontal => Region::new(v0, s, vlen, w),
        };
        (strip, edge)
    })
}

fn value_positions(
    img: &RgbaImageView<'_>,
    region: &Region,
    layout: &IdGridLayout,
    cfg: &MarkSheetConfig,
) -> Result<BubblePositions, GeometryError> {
    let (v0, vlen) = along(region, layout.orientation);
    let mut best: Option<(f32, BubblePositions)> = None;

    for (strip, edge) in candidate_strips(region, layout) {
        let peaks = match strip_peaks(img, &strip, layout.orientation, cfg) {
            Ok(peaks) => peaks,
            Err(GeometryError::OutsideImage { .. }) => continue,
            Err(e) => return Err(e),
        };
        let inside = peaks
            .iter()
            .filter(|(p, _)| *p >= v0 && *p < v0 + vlen)
            .count();
        if inside != layout.values {
            continue;
        }
        let positions = positions_from_peaks(&peaks, v0, vlen, layout.values, layout.values);
        let score = regularity(&positions.centers) + if edge { EDGE_BONUS } else { 0.0 };
        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, positions));
        }
    }

    Ok(match best {
        Some((score, positions)) => {
            log::debug!("id grid timing strip accepted, score {score:.3}");
            positions
        }
        None => BubblePositions {
            centers: uniform_centers(v0, vlen, layout.values),
            pitch: vlen / layout.values as f32,
            source: SpacingSource::Uniform,
        },
    })
}

/// Decode a student-ID grid; each digit is read winner-take-all.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip(img, cfg), fields(digits = layout.digits))
)]
pub fn decode_id_grid(
    img: &RgbaImageView<'_>,
    region: &Region,
    layout: &IdGridLayout,
    cfg: &MarkSheetConfig,
) -> Result<IdReading, MarkSheetError> {
    layout.validate()?;
    cfg.validate()?;
    region.validate()?;
    ensure_consistent(img)?;

    let spacing = value_positions(img, region, layout, cfg)?;
    let (d0, dlen) = across(region, layout.orientation);
    let seg = dlen / layout.digits as f32;

    let mut rois = Vec::with_capacity(layout.digits * layout.values);
    for d in 0..layout.digits {
        let cross_start = d0 + d as f32 * seg;
        let cross_center = cross_start + 0.5 * seg;
        for &c in &spacing.centers {
            let center = match layout.orientation {
                crate::Orientation::Vertical => Point2::new(cross_center, c),
                crate::Orientation::Horizontal => Point2::new(c, cross_center),
            };
            let roi = bubble_roi(c, spacing.pitch, cross_start, seg, layout.orientation);
            rois.push((center, roi));
        }
    }

    let (all, dark_threshold) = sample_rois(img, &rois, cfg);
    let samples: Vec<Vec<BubbleSample>> = all
        .chunks(layout.values)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .map(|(i, s)| BubbleSample { index: i, ..*s })
                .collect()
        })
        .collect();
    let digits: Vec<DetectionResult> = samples
        .iter()
        .map(|col| {
            let fills: Vec<f32> = col.iter().map(|s| s.fill_ratio).collect();
            classify_student_marks(&fills, cfg)
        })
        .collect();

    log::debug!("id grid digits {digits:?}");
    Ok(IdReading {
        digits,
        samples,
        spacing,
        dark_threshold,
    })
}
