//! Bubble-sheet decoding on rectified answer regions.
//!
//! This crate focuses on:
//! - locating bubble centers (reference-strip peaks or uniform spacing),
//! - measuring per-bubble fill ratio and brightness,
//! - classifying student marks (winner-take-all) and master-sheet answer keys
//!   (brightest-bubble baseline),
//! - student-ID grids, one digit per column.
//!
//! It does **not** align pages. It expects an image whose coordinates already
//! match the template (a warped crop from `markscan-fiducial`, or the page
//! itself when alignment is unavailable).

mod decode;
mod id_grid;
mod layout;
mod params;
mod sampling;
mod threshold;

pub use decode::{
    classify_answer_key, classify_student_marks, decode_marksheet, detect_answer_key,
    MarkSheetReading,
};
pub use id_grid::{decode_id_grid, IdReading};
pub use layout::{BubbleLayout, DetectionResult, IdGridLayout, MarkSheetError, Orientation};
pub use params::{DarknessThreshold, MarkSheetConfig};
pub use sampling::{bubble_centers, sample_bubbles, BubblePositions, BubbleSample, SpacingSource};
