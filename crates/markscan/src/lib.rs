//! High-level facade crate for the `markscan-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of the underlying geometry, fiducial and sheet crates,
//! - answer templates and page reports as JSON,
//! - a page grading pipeline (align → rectify each region → decode) with
//!   batch helpers sharing one decoded buffer per page,
//! - (feature `image`) adapters from the `image` crate and file-backed sources.
//!
//! ## Quickstart
//!
//! ```no_run
//! use markscan::{grade_batch, AnswerTemplate, FileImage, PageGrader};
//! use markscan::core::PixelCache;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = AnswerTemplate::load_json("template.json")?;
//! let grader = PageGrader::new(&template)?;
//! let pages = [FileImage::new("scan_001.png"), FileImage::new("scan_002.png")];
//! let cache = PixelCache::default();
//!
//! for report in grade_batch(&grader, &pages, &cache)? {
//!     println!("{}: {} flagged", report.image, report.flagged().len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `markscan::core`: images, regions, profiles, blobs, homographies, warps, cache.
//! - `markscan::fiducial`: corner-mark detection and page alignment.
//! - `markscan::sheet`: bubble decoding, answer keys, ID grids.
//! - `markscan::detect` (feature `image`): conversions from `image` buffers.

pub use markscan_core as core;
pub use markscan_fiducial as fiducial;
pub use markscan_sheet as sheet;

pub use markscan_core::{Corners, ImageKey, Region, RgbaImage, Sampling};
pub use markscan_fiducial::{AlignmentFailure, PageAlignment};
pub use markscan_sheet::{BubbleLayout, DetectionResult, IdGridLayout, Orientation};

mod grade;
mod report;
mod template;

pub use grade::{
    grade_batch, grade_batch_with, GradeError, ImageSource, InMemoryImage, KeyDetection,
    PageGrader,
};
#[cfg(feature = "rayon")]
pub use grade::grade_batch_par;
pub use report::{PageReport, QuestionOutcome, QuestionReport};
pub use template::{AnswerTemplate, QuestionKind, QuestionTemplate, TemplateIoError};

#[cfg(feature = "image")]
pub mod detect;
#[cfg(feature = "image")]
pub use detect::FileImage;
