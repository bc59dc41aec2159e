use markscan_core::{Region, RgbaImageView};
use serde::{Deserialize, Serialize};

use crate::sampling::{bubble_centers, sample_bubbles, BubblePositions, BubbleSample};
use crate::{BubbleLayout, DetectionResult, MarkSheetConfig, MarkSheetError};

/// Decoded question with the measurements behind the decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkSheetReading {
    pub result: DetectionResult,
    pub bubbles: Vec<BubbleSample>,
    pub spacing: BubblePositions,
    /// Luminance threshold used for fill ratios.
    pub dark_threshold: f32,
}

impl MarkSheetReading {
    pub fn fill_ratios(&self) -> Vec<f32> {
        self.bubbles.iter().map(|b| b.fill_ratio).collect()
    }
}

/// Winner-take-all over per-bubble fill ratios.
///
/// Bubbles below `min_fill_ratio` are unmarked. Two or more bubbles at or
/// above it are always reported together. A lone filled bubble wins only when
/// it beats the fullest unfilled one by `winner_margin`; otherwise both are
/// reported.
pub fn classify_student_marks(fills: &[f32], cfg: &MarkSheetConfig) -> DetectionResult {
    let filled: Vec<usize> = (0..fills.len())
        .filter(|&i| fills[i] >= cfg.min_fill_ratio)
        .collect();
    let best = match filled.len() {
        0 => return DetectionResult::NoMark,
        1 => filled[0],
        _ => return DetectionResult::from_marked(filled),
    };

    let top = fills[best];
    let runner_up = fills
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != best)
        .map(|(_, &f)| f)
        .fold(0.0f32, f32::max);
    if top > runner_up * cfg.winner_margin {
        return DetectionResult::Single(best);
    }

    DetectionResult::from_marked(
        (0..fills.len())
            .filter(|&i| i == best || fills[i] * cfg.winner_margin >= top)
            .collect(),
    )
}

/// Master-sheet classification against the brightest bubble.
///
/// A bubble is marked when it is darker than `baseline * fill_threshold_ratio`
/// and at least `min_diff` below the baseline. Bubbles without data are never
/// marked.
pub fn classify_answer_key(lumas: &[Option<f32>], cfg: &MarkSheetConfig) -> DetectionResult {
    let Some(baseline) = lumas.iter().flatten().copied().reduce(f32::max) else {
        return DetectionResult::NoMark;
    };
    let cutoff = baseline * cfg.fill_threshold_ratio;
    DetectionResult::from_marked(
        lumas
            .iter()
            .enumerate()
            .filter_map(|(i, l)| {
                let l = (*l)?;
                (l < cutoff && baseline - l >= cfg.min_diff).then_some(i)
            })
            .collect(),
    )
}

fn read_bubbles(
    img: &RgbaImageView<'_>,
    answer: &Region,
    reference: Option<&Region>,
    layout: &BubbleLayout,
    cfg: &MarkSheetConfig,
) -> Result<(Vec<BubbleSample>, BubblePositions, f32), MarkSheetError> {
    cfg.validate()?;
    let spacing = bubble_centers(img, answer, reference, layout, cfg)?;
    let (bubbles, dark_threshold) = sample_bubbles(img, answer, &spacing, layout.orientation, cfg)?;
    Ok((bubbles, spacing, dark_threshold))
}

/// Decode a student's answer to one question.
///
/// `img` must already be in template coordinates (see `markscan-fiducial`).
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip(img, cfg), fields(options = layout.option_count))
)]
pub fn decode_marksheet(
    img: &RgbaImageView<'_>,
    answer: &Region,
    reference: Option<&Region>,
    layout: &BubbleLayout,
    cfg: &MarkSheetConfig,
) -> Result<MarkSheetReading, MarkSheetError> {
    let (bubbles, spacing, dark_threshold) = read_bubbles(img, answer, reference, layout, cfg)?;
    let fills: Vec<f32> = bubbles.iter().map(|b| b.fill_ratio).collect();
    let result = classify_student_marks(&fills, cfg);
    log::debug!("fills {fills:?} -> {result:?}");
    Ok(MarkSheetReading {
        result,
        bubbles,
        spacing,
        dark_threshold,
    })
}

/// Read the correct answer of one question from a master sheet.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip(img, cfg), fields(options = layout.option_count))
)]
pub fn detect_answer_key(
    img: &RgbaImageView<'_>,
    answer: &Region,
    reference: Option<&Region>,
    layout: &BubbleLayout,
    cfg: &MarkSheetConfig,
) -> Result<MarkSheetReading, MarkSheetError> {
    let (bubbles, spacing, dark_threshold) = read_bubbles(img, answer, reference, layout, cfg)?;
    let lumas: Vec<Option<f32>> = bubbles.iter().map(|b| b.mean_luma).collect();
    let result = classify_answer_key(&lumas, cfg);
    log::debug!("key lumas {lumas:?} -> {result:?}");
    Ok(MarkSheetReading {
        result,
        bubbles,
        spacing,
        dark_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DarknessThreshold, Orientation, SpacingSource};
    use markscan_core::RgbaImage;

    fn cfg() -> MarkSheetConfig {
        MarkSheetConfig::default()
    }

    /// 4 bubbles on a 400×100 strip, centers at x = 50 + 100·i.
    fn bubble_row(filled: &[usize]) -> RgbaImage {
        let mut img = RgbaImage::filled(400, 100, 250);
        for i in 0..4i64 {
            let level = if filled.contains(&(i as usize)) { 20 } else { 200 };
            img.fill_rect(30 + 100 * i, 30, 40, 40, level);
        }
        img
    }

    #[test]
    fn clear_winner_is_single() {
        assert_eq!(
            classify_student_marks(&[0.1, 0.1, 0.9, 0.1], &cfg()),
            DetectionResult::Single(2)
        );
    }

    #[test]
    fn two_equal_marks_are_ambiguous() {
        assert_eq!(
            classify_student_marks(&[0.85, 0.85, 0.1, 0.1], &cfg()),
            DetectionResult::Multiple(vec![0, 1])
        );
    }

    #[test]
    fn blank_question_has_no_mark() {
        let r = classify_student_marks(&[0.1, 0.2, 0.05, 0.3], &cfg());
        assert_eq!(r, DetectionResult::NoMark);
        assert_eq!(r.sentinel(), -1);
        assert_eq!(classify_student_marks(&[], &cfg()), DetectionResult::NoMark);
    }

    #[test]
    fn filled_bubbles_are_never_auto_resolved() {
        assert_eq!(
            classify_student_marks(&[0.6, 0.56, 0.0], &cfg()),
            DetectionResult::Multiple(vec![0, 1])
        );
        // Unequal fills: the lighter mark still clears min_fill_ratio.
        assert_eq!(
            classify_student_marks(&[0.7, 0.6, 0.0, 0.0], &cfg()),
            DetectionResult::Multiple(vec![0, 1])
        );
        assert_eq!(
            classify_student_marks(&[0.95, 0.0, 0.36, 0.0], &cfg()),
            DetectionResult::Multiple(vec![0, 2])
        );
    }

    #[test]
    fn unfilled_runner_up_within_margin_is_ambiguous() {
        // 0.36 is not more than 1.1 × 0.34.
        assert_eq!(
            classify_student_marks(&[0.34, 0.36, 0.0], &cfg()),
            DetectionResult::Multiple(vec![0, 1])
        );
        // 0.5 > 1.1 × 0.3: the smudge on option 0 is ignored.
        assert_eq!(
            classify_student_marks(&[0.3, 0.5, 0.0], &cfg()),
            DetectionResult::Single(1)
        );
    }

    #[test]
    fn single_option_question() {
        assert_eq!(classify_student_marks(&[0.5], &cfg()), DetectionResult::Single(0));
    }

    #[test]
    fn answer_key_uses_brightest_baseline() {
        let lumas = [Some(220.0), Some(90.0), Some(215.0), Some(200.0)];
        assert_eq!(classify_answer_key(&lumas, &cfg()), DetectionResult::Single(1));

        // Darker than 80 % of baseline but not by min_diff.
        let faint = [Some(100.0), Some(79.0)];
        let c = MarkSheetConfig {
            min_diff: 30.0,
            ..cfg()
        };
        assert_eq!(classify_answer_key(&faint, &c), DetectionResult::NoMark);

        assert_eq!(
            classify_answer_key(&[Some(230.0), Some(40.0), None, Some(50.0)], &c),
            DetectionResult::Multiple(vec![1, 3])
        );
        assert_eq!(classify_answer_key(&[None, None], &c), DetectionResult::NoMark);
    }

    #[test]
    fn decodes_filled_bubble_in_row() {
        let img = bubble_row(&[1]);
        let layout = BubbleLayout::new(4, Orientation::Horizontal, 1);
        let answer = Region::new(0.0, 0.0, 400.0, 100.0);
        let reading =
            decode_marksheet(&img.view(), &answer, None, &layout, &cfg()).expect("decode");
        assert_eq!(reading.result, DetectionResult::Single(1));
        assert_eq!(reading.spacing.source, SpacingSource::Uniform);
        assert_eq!(reading.result.is_correct(layout.correct_index), Some(true));
        let fills = reading.fill_ratios();
        assert!((fills[1] - 0.64).abs() < 1e-3, "{fills:?}");
        assert_eq!(fills[0], 0.0);
    }

    #[test]
    fn decodes_vertical_column_with_otsu() {
        // Same row, transposed.
        let row = bubble_row(&[3]);
        let mut img = RgbaImage::filled(100, 400, 0);
        for y in 0..100 {
            for x in 0..400 {
                img.put_pixel(y, x, row.view().pixel(x, y));
            }
        }
        let layout = BubbleLayout::new(4, Orientation::Vertical, 0);
        let c = MarkSheetConfig {
            darkness: DarknessThreshold::Otsu,
            ..cfg()
        };
        let reading = decode_marksheet(
            &img.view(),
            &Region::new(0.0, 0.0, 100.0, 400.0),
            None,
            &layout,
            &c,
        )
        .expect("decode");
        assert_eq!(reading.result, DetectionResult::Single(3));
        assert_eq!(reading.result.is_correct(0), Some(false));
    }

    #[test]
    fn lighter_second_mark_is_still_reported() {
        let mut img = bubble_row(&[0]);
        // Half-filled bubble 2: fill 0.4 against 0.64.
        img.fill_rect(230, 30, 40, 25, 20);
        let reading = decode_marksheet(
            &img.view(),
            &Region::new(0.0, 0.0, 400.0, 100.0),
            None,
            &BubbleLayout::new(4, Orientation::Horizontal, 0),
            &cfg(),
        )
        .expect("decode");
        assert_eq!(reading.result, DetectionResult::Multiple(vec![0, 2]));
        assert_eq!(reading.result.is_correct(0), None);
    }

    #[test]
    fn blank_row_under_otsu_has_no_mark() {
        let img = bubble_row(&[]);
        let c = MarkSheetConfig {
            darkness: DarknessThreshold::Otsu,
            ..cfg()
        };
        let reading = decode_marksheet(
            &img.view(),
            &Region::new(0.0, 0.0, 400.0, 100.0),
            None,
            &BubbleLayout::new(4, Orientation::Horizontal, 0),
            &c,
        )
        .expect("decode");
        assert_eq!(reading.result, DetectionResult::NoMark);
        assert!(reading.fill_ratios().iter().all(|&f| f == 0.0));
    }

    #[test]
    fn inconsistent_view_is_an_error() {
        let data = vec![250u8; 400];
        let view = RgbaImageView {
            width: 100,
            height: 100,
            data: &data,
        };
        let err = decode_marksheet(
            &view,
            &Region::new(0.0, 0.0, 100.0, 100.0),
            None,
            &BubbleLayout::new(4, Orientation::Horizontal, 0),
            &cfg(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MarkSheetError::Geometry(markscan_core::GeometryError::InvalidImage { .. })
        ));
    }

    #[test]
    fn master_sheet_key_is_detected() {
        let img = bubble_row(&[2]);
        let layout = BubbleLayout::new(4, Orientation::Horizontal, 0);
        let reading = detect_answer_key(
            &img.view(),
            &Region::new(0.0, 0.0, 400.0, 100.0),
            None,
            &layout,
            &cfg(),
        )
        .expect("key");
        assert_eq!(reading.result, DetectionResult::Single(2));
    }

    #[test]
    fn invalid_layout_is_an_error() {
        let img = bubble_row(&[]);
        let err = decode_marksheet(
            &img.view(),
            &Region::new(0.0, 0.0, 400.0, 100.0),
            None,
            &BubbleLayout::new(0, Orientation::Horizontal, 0),
            &cfg(),
        )
        .unwrap_err();
        assert_eq!(err, MarkSheetError::InvalidOptionCount);
    }
}
