//! Bubble center placement and per-bubble sampling.

use markscan_core::{find_peaks, projection_profile, GeometryError, Region, RgbaImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::threshold::resolve_threshold;
use crate::{BubbleLayout, DarknessThreshold, MarkSheetConfig, MarkSheetError, Orientation};

/// Where the bubble centers came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingSource {
    /// Equal segments across the answer region.
    Uniform,
    /// Every center taken from reference-strip peaks.
    Reference,
    /// Uniform slots, some snapped to nearby reference peaks.
    Partial,
}

/// Bubble centers along the layout axis, in image coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BubblePositions {
    pub centers: Vec<f32>,
    /// Typical center-to-center distance; sets the sampling window.
    pub pitch: f32,
    pub source: SpacingSource,
}

/// One sampled bubble.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BubbleSample {
    pub index: usize,
    pub center: Point2<f32>,
    pub roi: Region,
    /// Fraction of opaque ROI pixels darker than the threshold.
    pub fill_ratio: f32,
    /// Mean luminance of opaque ROI pixels; `None` when the ROI has no data.
    pub mean_luma: Option<f32>,
    pub pixel_count: usize,
}

/// `(start, extent)` of `region` along / across the bubble axis.
pub(crate) fn along(region: &Region, orientation: Orientation) -> (f32, f32) {
    match orientation {
        Orientation::Horizontal => (region.x, region.width),
        Orientation::Vertical => (region.y, region.height),
    }
}

pub(crate) fn across(region: &Region, orientation: Orientation) -> (f32, f32) {
    match orientation {
        Orientation::Horizontal => (region.y, region.height),
        Orientation::Vertical => (region.x, region.width),
    }
}

pub(crate) fn uniform_centers(start: f32, extent: f32, n: usize) -> Vec<f32> {
    let seg = extent / n as f32;
    (0..n).map(|i| start + (i as f32 + 0.5) * seg).collect()
}

fn median_spacing(centers: &[f32]) -> Option<f32> {
    let mut gaps: Vec<f32> = centers.windows(2).map(|w| w[1] - w[0]).collect();
    if gaps.is_empty() {
        return None;
    }
    gaps.sort_by(|a, b| a.total_cmp(b));
    Some(gaps[gaps.len() / 2])
}

/// Reject views whose buffer does not match their dimensions.
pub(crate) fn ensure_consistent(img: &RgbaImageView<'_>) -> Result<(), GeometryError> {
    if img.is_consistent() {
        Ok(())
    } else {
        Err(GeometryError::InvalidImage {
            width: img.width,
            height: img.height,
        })
    }
}

/// Luminance threshold for dark-pixel counting inside `region`.
pub(crate) fn region_threshold(
    img: &RgbaImageView<'_>,
    region: &Region,
    cfg: &MarkSheetConfig,
) -> Result<f32, GeometryError> {
    match cfg.darkness {
        DarknessThreshold::Fixed(t) => Ok(t),
        DarknessThreshold::Otsu => {
            ensure_consistent(img)?;
            let px = region.pixel_bounds(img.width, img.height)?;
            let mut samples = Vec::with_capacity(px.area());
            for y in px.y0..px.y1 {
                for x in px.x0..px.x1 {
                    if let Some(l) = img.luma(x, y) {
                        samples.push(l);
                    }
                }
            }
            Ok(resolve_threshold(cfg, &samples))
        }
    }
}

/// Peak positions (image coordinates) and masses of a strip's projection.
pub(crate) fn strip_peaks(
    img: &RgbaImageView<'_>,
    strip: &Region,
    orientation: Orientation,
    cfg: &MarkSheetConfig,
) -> Result<Vec<(f32, f32)>, GeometryError> {
    let threshold = region_threshold(img, strip, cfg)?;
    let profile = projection_profile(img, strip, orientation.profile_axis(), threshold)?;
    let px = strip.pixel_bounds(img.width, img.height)?;
    let origin = match orientation {
        Orientation::Horizontal => px.x0,
        Orientation::Vertical => px.y0,
    } as f32;
    Ok(find_peaks(&profile, cfg.peak_ratio)
        .into_iter()
        .map(|p| (origin + p.position + 0.5, p.mass))
        .collect())
}

/// Turn reference peaks into exactly `n` centers over `[start, start + extent)`.
pub(crate) fn positions_from_peaks(
    peaks: &[(f32, f32)],
    start: f32,
    extent: f32,
    n: usize,
    min_viable: usize,
) -> BubblePositions {
    let seg = extent / n as f32;
    let uniform = uniform_centers(start, extent, n);
    let mut inside: Vec<(f32, f32)> = peaks
        .iter()
        .copied()
        .filter(|(p, _)| *p >= start && *p < start + extent)
        .collect();

    if inside.len() < min_viable.max(1) {
        return BubblePositions {
            centers: uniform,
            pitch: seg,
            source: SpacingSource::Uniform,
        };
    }

    if inside.len() >= n {
        // Keep the heaviest n peaks, back in positional order.
        inside.sort_by(|a, b| b.1.total_cmp(&a.1));
        inside.truncate(n);
        let mut centers: Vec<f32> = inside.into_iter().map(|(p, _)| p).collect();
        centers.sort_by(|a, b| a.total_cmp(b));
        let pitch = median_spacing(&centers).unwrap_or(seg);
        return BubblePositions {
            centers,
            pitch,
            source: SpacingSource::Reference,
        };
    }

    let centers = uniform
        .iter()
        .map(|&slot| {
            inside
                .iter()
                .map(|(p, _)| *p)
                .filter(|p| (p - slot).abs() <= 0.5 * seg)
                .min_by(|a, b| (a - slot).abs().total_cmp(&(b - slot).abs()))
                .unwrap_or(slot)
        })
        .collect();
    BubblePositions {
        centers,
        pitch: seg,
        source: SpacingSource::Partial,
    }
}

/// Locate the bubble centers of one question.
///
/// With a reference strip, its projection peaks give the centers (handles
/// unevenly printed bubbles); too few peaks fall back to equal segments.
pub fn bubble_centers(
    img: &RgbaImageView<'_>,
    answer: &Region,
    reference: Option<&Region>,
    layout: &BubbleLayout,
    cfg: &MarkSheetConfig,
) -> Result<BubblePositions, MarkSheetError> {
    layout.validate()?;
    answer.validate()?;
    ensure_consistent(img)?;
    let n = layout.option_count;
    let (start, extent) = along(answer, layout.orientation);

    let Some(reference) = reference else {
        return Ok(BubblePositions {
            centers: uniform_centers(start, extent, n),
            pitch: extent / n as f32,
            source: SpacingSource::Uniform,
        });
    };

    let peaks = strip_peaks(img, reference, layout.orientation, cfg)?;
    let min_viable = (n as f32 * cfg.min_viable_peak_fraction).ceil() as usize;
    let positions = positions_from_peaks(&peaks, start, extent, n, min_viable);
    if positions.source == SpacingSource::Uniform {
        log::debug!(
            "reference strip gave {} peaks for {} options; using uniform spacing",
            peaks.len(),
            n
        );
    }
    Ok(positions)
}

/// Sampling window of one bubble: the center half of its pitch along the
/// axis, and the center half of `[cross_start, cross_start + cross_extent)`.
pub(crate) fn bubble_roi(
    center: f32,
    pitch: f32,
    cross_start: f32,
    cross_extent: f32,
    orientation: Orientation,
) -> Region {
    let a0 = center - 0.25 * pitch;
    let c0 = cross_start + 0.25 * cross_extent;
    let (len_a, len_c) = (0.5 * pitch, 0.5 * cross_extent);
    match orientation {
        Orientation::Horizontal => Region::new(a0, c0, len_a, len_c),
        Orientation::Vertical => Region::new(c0, a0, len_c, len_a),
    }
}

fn roi_lumas(img: &RgbaImageView<'_>, roi: &Region) -> Vec<f32> {
    let Ok(px) = roi.pixel_bounds(img.width, img.height) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(px.area());
    for y in px.y0..px.y1 {
        let cy = y as f32 + 0.5;
        if cy < roi.y || cy >= roi.bottom() {
            continue;
        }
        for x in px.x0..px.x1 {
            let cx = x as f32 + 0.5;
            if cx < roi.x || cx >= roi.right() {
                continue;
            }
            if let Some(l) = img.luma(x, y) {
                out.push(l);
            }
        }
    }
    out
}

/// Sample every ROI and measure fill ratio and brightness.
///
/// Transparent pixels (outside the scanned page) are skipped. Returns the
/// samples and the darkness threshold that was applied. `img` must be
/// consistent.
pub(crate) fn sample_rois(
    img: &RgbaImageView<'_>,
    rois: &[(Point2<f32>, Region)],
    cfg: &MarkSheetConfig,
) -> (Vec<BubbleSample>, f32) {
    let lumas: Vec<Vec<f32>> = rois.iter().map(|(_, roi)| roi_lumas(img, roi)).collect();
    let threshold = match cfg.darkness {
        DarknessThreshold::Fixed(t) => t,
        DarknessThreshold::Otsu => resolve_threshold(cfg, &lumas.concat()),
    };

    let samples = rois
        .iter()
        .zip(lumas.iter())
        .enumerate()
        .map(|(index, ((center, roi), values))| {
            let n = values.len();
            let dark = values.iter().filter(|&&l| l < threshold).count();
            BubbleSample {
                index,
                center: *center,
                roi: *roi,
                fill_ratio: if n > 0 { dark as f32 / n as f32 } else { 0.0 },
                mean_luma: (n > 0).then(|| values.iter().sum::<f32>() / n as f32),
                pixel_count: n,
            }
        })
        .collect();
    (samples, threshold)
}

/// Sample the bubbles of one question at the given positions.
pub fn sample_bubbles(
    img: &RgbaImageView<'_>,
    answer: &Region,
    positions: &BubblePositions,
    orientation: Orientation,
    cfg: &MarkSheetConfig,
) -> Result<(Vec<BubbleSample>, f32), MarkSheetError> {
    answer.validate()?;
    ensure_consistent(img)?;
    let (cross_start, cross_extent) = across(answer, orientation);
    let cross_center = cross_start + 0.5 * cross_extent;
    let rois: Vec<(Point2<f32>, Region)> = positions
        .centers
        .iter()
        .map(|&c| {
            let center = match orientation {
                Orientation::Horizontal => Point2::new(c, cross_center),
                Orientation::Vertical => Point2::new(cross_center, c),
            };
            let roi = bubble_roi(c, positions.pitch, cross_start, cross_extent, orientation);
            (center, roi)
        })
        .collect();
    Ok(sample_rois(img, &rois, cfg))
}
