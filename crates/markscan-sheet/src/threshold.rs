//! Thresholding utilities for bubble sampling.

use crate::{DarknessThreshold, MarkSheetConfig};

/// Threshold for samples with no ink: nothing is darker than it.
pub(crate) const NO_INK: f32 = 0.0;

/// Resolve the luminance threshold for a set of samples.
pub(crate) fn resolve_threshold(cfg: &MarkSheetConfig, samples: &[f32]) -> f32 {
    match cfg.darkness {
        DarknessThreshold::Fixed(t) => t,
        DarknessThreshold::Otsu => {
            let bytes: Vec<u8> = samples
                .iter()
                .map(|&l| l.round().clamp(0.0, 255.0) as u8)
                .collect();
            let t = otsu_threshold_from_samples(&bytes);
            let Some((dark, bright)) = class_means(&bytes, t) else {
                return NO_INK;
            };
            if bright - dark < cfg.min_diff {
                log::debug!("otsu classes {dark:.1}/{bright:.1} too close; no ink");
                return NO_INK;
            }
            // Otsu puts `t` itself in the dark class.
            (t as f32 + 0.5).min(cfg.max_ink_luma)
        }
    }
}

/// Means of the `<= t` and `> t` classes, when both are populated.
fn class_means(samples: &[u8], t: u8) -> Option<(f32, f32)> {
    let (mut dark, mut n_dark, mut bright, mut n_bright) = (0u64, 0u64, 0u64, 0u64);
    for &v in samples {
        if v <= t {
            dark += v as u64;
            n_dark += 1;
        } else {
            bright += v as u64;
            n_bright += 1;
        }
    }
    (n_dark > 0 && n_bright > 0)
        .then(|| (dark as f32 / n_dark as f32, bright as f32 / n_bright as f32))
}

/// Compute Otsu threshold from a set of sample intensities.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let mut min_v = 255u8;
    let mut max_v = 0u8;
    for &v in samples {
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    let nonzero_bins = hist.iter().filter(|&&h| h > 0).count();
    if nonzero_bins <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total: f64 = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += (t as f64) * (h as f64);
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otsu_splits_bimodal_samples() {
        let mut samples = vec![20u8; 50];
        samples.extend(vec![25u8; 10]);
        samples.extend(vec![230u8; 200]);
        samples.extend(vec![235u8; 40]);
        let t = otsu_threshold_from_samples(&samples);
        assert!((25..230).contains(&t), "threshold {t}");
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(otsu_threshold_from_samples(&[]), 127);
        assert_eq!(otsu_threshold_from_samples(&[9, 9, 9]), 9);
        assert_eq!(otsu_threshold_from_samples(&[0, 200]), 100);
    }

    fn otsu() -> MarkSheetConfig {
        MarkSheetConfig {
            darkness: DarknessThreshold::Otsu,
            ..MarkSheetConfig::default()
        }
    }

    #[test]
    fn resolved_otsu_separates_ink_from_paper() {
        let samples: Vec<f32> = [10.0f32, 12.0, 15.0, 240.0, 245.0, 250.0].repeat(4);
        let t = resolve_threshold(&otsu(), &samples);
        assert!(t > 15.0 && t < 240.0, "threshold {t}");
        let fixed = MarkSheetConfig {
            darkness: DarknessThreshold::Fixed(99.0),
            ..MarkSheetConfig::default()
        };
        assert_eq!(resolve_threshold(&fixed, &samples), 99.0);
    }

    #[test]
    fn otsu_is_capped_below_printed_outlines() {
        // Outlines at 200 on 250 paper: a real split, but not ink.
        let samples: Vec<f32> = [200.0f32, 250.0, 250.0].repeat(10);
        assert_eq!(resolve_threshold(&otsu(), &samples), 128.0);
    }

    #[test]
    fn low_contrast_region_has_no_ink() {
        let samples: Vec<f32> = [240.0f32, 244.0, 247.0, 250.0].repeat(10);
        assert_eq!(resolve_threshold(&otsu(), &samples), NO_INK);
        assert_eq!(resolve_threshold(&otsu(), &[]), NO_INK);
        assert_eq!(resolve_threshold(&otsu(), &[90.0, 90.0]), NO_INK);
    }
}
