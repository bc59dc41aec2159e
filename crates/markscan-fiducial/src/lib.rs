//! Corner fiducial detection and page alignment.
//!
//! Design:
//! - Search each page-corner quadrant independently for one dark square mark.
//! - Pick the blob nearest the page's geometric corner in that quadrant.
//! - With all four marks found, solve the template → page homography.
//! - Otherwise report *why* alignment is unavailable so callers fall back to
//!   plain cropping instead of aborting the run.

mod alignment;
mod detector;
mod params;

pub use alignment::{align_page, extract_region, AlignmentFailure, PageAlignment};
pub use detector::{FiducialDetection, FiducialDetector, QuadrantResult};
pub use params::FiducialDetectionConfig;

use markscan_core::GeometryError;

/// Errors returned by the fiducial detector. All of them are caller bugs.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FiducialError {
    #[error("invalid fiducial config: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
