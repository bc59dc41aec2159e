//! Synthetic scan: a template page shifted by 15 px, graded with and without
//! fiducial alignment.

use approx::assert_abs_diff_eq;
use markscan::core::{solve_homography, warp_region, Corners, PixelCache, Region, RgbaImage, Sampling};
use markscan::fiducial::FiducialDetector;
use markscan::sheet::{decode_marksheet, MarkSheetConfig};
use markscan::{
    grade_batch, AnswerTemplate, BubbleLayout, DetectionResult, IdGridLayout, ImageKey,
    InMemoryImage, Orientation, PageAlignment, PageGrader, QuestionKind, QuestionOutcome,
    QuestionTemplate,
};
use nalgebra::Point2;

const SHIFT: i64 = 15;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ideal_corners() -> Corners {
    Corners::from_array([
        Point2::new(50.0, 50.0),
        Point2::new(950.0, 50.0),
        Point2::new(950.0, 1350.0),
        Point2::new(50.0, 1350.0),
    ])
}

/// Answer row: 4 options, 15 px pitch, at x 300..360, y 600..680.
fn answer_region() -> Region {
    Region::new(300.0, 600.0, 60.0, 80.0)
}

/// Student ID: 2 digits × 10 values at x 600..700, y 800..1100.
fn id_region() -> Region {
    Region::new(600.0, 800.0, 100.0, 300.0)
}

/// 1000×1400 page with 20×20 corner marks, bubble 1 filled and ID "37".
fn render_page(shift: i64) -> RgbaImage {
    let mut img = RgbaImage::filled(1000, 1400, 245);
    for (x, y) in [(40, 40), (940, 40), (940, 1340), (40, 1340)] {
        img.fill_rect(x + shift, y + shift, 20, 20, 0);
    }
    // Bubble 1 of the answer row is centered at x = 322.5.
    img.fill_rect(317 + shift, 602 + shift, 11, 76, 10);
    for (digit, value) in [(0i64, 3i64), (1, 7)] {
        let cx = 625 + 50 * digit;
        let cy = 815 + 30 * value;
        img.fill_rect(cx - 15 + shift, cy - 10 + shift, 30, 20, 10);
    }
    img
}

fn template() -> AnswerTemplate {
    AnswerTemplate {
        ideal_corners: Some(ideal_corners()),
        fiducial: Default::default(),
        marksheet: MarkSheetConfig::default(),
        sampling: Sampling::Nearest,
        questions: vec![
            QuestionTemplate {
                id: "q1".into(),
                region: answer_region(),
                reference: None,
                kind: QuestionKind::Marksheet {
                    layout: BubbleLayout::new(4, Orientation::Horizontal, 1),
                },
            },
            QuestionTemplate {
                id: "student_id".into(),
                region: id_region(),
                reference: None,
                kind: QuestionKind::IdGrid {
                    layout: IdGridLayout::new(2),
                },
            },
        ],
    }
}

fn marksheet_detection(outcome: &QuestionOutcome) -> &DetectionResult {
    match outcome {
        QuestionOutcome::Marksheet { detection, .. } => detection,
        QuestionOutcome::IdGrid { .. } => panic!("expected a mark-sheet outcome"),
    }
}

#[test]
fn fiducials_follow_the_shift() {
    init_logger();
    let page = render_page(SHIFT);
    let detection = FiducialDetector::default()
        .detect(&page.view())
        .expect("detect");
    let detected = detection.corners().expect("all four marks");
    for (d, i) in detected.to_array().iter().zip(ideal_corners().to_array()) {
        assert_abs_diff_eq!(d.x, i.x + SHIFT as f32, epsilon = 0.5);
        assert_abs_diff_eq!(d.y, i.y + SHIFT as f32, epsilon = 0.5);
    }
}

#[test]
fn warp_recovers_answer_that_naive_crop_misreads() {
    init_logger();
    let page = render_page(SHIFT);
    let view = page.view();
    let cfg = MarkSheetConfig::default();
    let layout = BubbleLayout::new(4, Orientation::Horizontal, 1);
    let local = Region::new(0.0, 0.0, 60.0, 80.0);

    let detected = FiducialDetector::default()
        .detect(&view)
        .expect("detect")
        .corners()
        .expect("all four marks");
    // Template → page, so warping samples the scan at template coordinates.
    let h = solve_homography(&ideal_corners().to_array(), &detected.to_array()).expect("solve");
    let rectified = warp_region(&view, &h, &answer_region(), Sampling::Nearest).expect("warp");
    let reading = decode_marksheet(&rectified.view(), &local, None, &layout, &cfg).expect("decode");
    assert_eq!(reading.result, DetectionResult::Single(1));

    let naive = markscan::core::crop_region(&view, &answer_region()).expect("crop");
    let misread = decode_marksheet(&naive.view(), &local, None, &layout, &cfg).expect("decode");
    assert_ne!(misread.result, DetectionResult::Single(1));
    assert_eq!(misread.result, DetectionResult::Single(2));
}

#[test]
fn grader_aligns_shifted_page() {
    init_logger();
    let t = template();
    let grader = PageGrader::new(&t).expect("grader");
    let page = render_page(SHIFT);
    let report = grader
        .grade_page(&ImageKey::new("shifted.png"), &page.view())
        .expect("grade");

    let PageAlignment::Rectified {
        h_page_from_template,
        ..
    } = &report.alignment
    else {
        panic!("page should be rectified: {:?}", report.alignment);
    };
    let p = h_page_from_template.apply(Point2::new(500.0, 700.0));
    assert_abs_diff_eq!(p.x, 515.0, epsilon = 0.5);
    assert_abs_diff_eq!(p.y, 715.0, epsilon = 0.5);

    let q1 = report.question("q1").expect("q1");
    assert_eq!(marksheet_detection(&q1.outcome), &DetectionResult::Single(1));
    assert_eq!(report.student_id(), Some("37"));
    assert!(report.flagged().is_empty());
}

#[test]
fn unaligned_grading_misreads_shifted_page() {
    init_logger();
    let t = template();
    let grader = PageGrader::new(&t).expect("grader").without_alignment();
    let page = render_page(SHIFT);
    let report = grader
        .grade_page(&ImageKey::new("shifted.png"), &page.view())
        .expect("grade");
    assert!(!report.alignment.is_rectified());
    let q1 = report.question("q1").expect("q1");
    assert_eq!(marksheet_detection(&q1.outcome), &DetectionResult::Single(2));
}

#[test]
fn batch_shares_decoded_pages() {
    init_logger();
    let t = template();
    let grader = PageGrader::new(&t).expect("grader");
    let pages = vec![
        InMemoryImage::new("clean.png", render_page(0)),
        InMemoryImage::new("shifted.png", render_page(SHIFT)),
        InMemoryImage::new("clean.png", render_page(0)),
    ];
    let cache = PixelCache::new(2);
    let reports = grade_batch(&grader, &pages, &cache).expect("batch");
    assert_eq!(cache.load_count(), 2);
    for r in &reports {
        assert_eq!(
            marksheet_detection(&r.question("q1").expect("q1").outcome),
            &DetectionResult::Single(1)
        );
        assert_eq!(r.student_id(), Some("37"));
    }
    cache.clear();
    assert!(cache.is_empty());
}

#[cfg(feature = "rayon")]
#[test]
fn parallel_batch_keeps_input_order() {
    init_logger();
    let t = template();
    let grader = PageGrader::new(&t).expect("grader");
    let pages: Vec<InMemoryImage> = (0..6)
        .map(|i| InMemoryImage::new(format!("page_{i}.png"), render_page(i * 3)))
        .collect();
    let cache = PixelCache::new(8);
    let reports = markscan::grade_batch_par(&grader, &pages, &cache).expect("batch");
    let keys: Vec<&str> = reports.iter().map(|r| r.image.as_str()).collect();
    assert_eq!(
        keys,
        ["page_0.png", "page_1.png", "page_2.png", "page_3.png", "page_4.png", "page_5.png"]
    );
    assert!(reports.iter().all(|r| r.alignment.is_rectified()));
}
