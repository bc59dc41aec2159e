use markscan_core::{
    crop_region, warp_region, CornerId, Corners, GeometryError, Homography, HomographyError,
    Region, RgbaImage, RgbaImageView, Sampling,
};
use serde::{Deserialize, Serialize};

use crate::{FiducialDetection, FiducialDetector, FiducialError};

/// Why a page could not be rectified. Never fatal for a grading run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AlignmentFailure {
    /// The template carries no ideal corners.
    NoTemplateCorners,
    MarksNotFound { missing: Vec<CornerId> },
    DegenerateHomography,
    /// Alignment was switched off by the caller.
    Disabled,
}

/// Outcome of aligning one scanned page against the template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageAlignment {
    Rectified {
        detected: Corners,
        /// Template coordinates → page coordinates (solved with src = ideal, dst = detected).
        h_page_from_template: Homography,
    },
    Unaligned { failure: AlignmentFailure },
}

impl PageAlignment {
    pub fn is_rectified(&self) -> bool {
        matches!(self, PageAlignment::Rectified { .. })
    }

    pub fn homography(&self) -> Option<&Homography> {
        match self {
            PageAlignment::Rectified {
                h_page_from_template,
                ..
            } => Some(h_page_from_template),
            PageAlignment::Unaligned { .. } => None,
        }
    }

    /// Classify a finished fiducial search against the template corners.
    pub fn from_detection(detection: &FiducialDetection, ideal: &Corners) -> Self {
        let Some(detected) = detection.corners() else {
            return PageAlignment::Unaligned {
                failure: AlignmentFailure::MarksNotFound {
                    missing: detection.missing(),
                },
            };
        };
        // Inverse sampling direction: template (ideal) → page (detected).
        match Homography::from_corners(ideal, &detected) {
            Ok(h) => PageAlignment::Rectified {
                detected,
                h_page_from_template: h,
            },
            Err(HomographyError::Degenerate { .. } | HomographyError::NonFinite) => {
                PageAlignment::Unaligned {
                    failure: AlignmentFailure::DegenerateHomography,
                }
            }
            // Four corners on both sides; the count cannot mismatch.
            Err(HomographyError::InvalidCorrespondences { .. }) => PageAlignment::Unaligned {
                failure: AlignmentFailure::DegenerateHomography,
            },
        }
    }
}

/// Detect the page's fiducials and solve the template → page homography.
///
/// Missing marks and singular systems come back as
/// [`PageAlignment::Unaligned`]; only malformed input is an error.
pub fn align_page(
    page: &RgbaImageView<'_>,
    ideal: &Corners,
    detector: &FiducialDetector,
) -> Result<PageAlignment, FiducialError> {
    let detection = detector.detect(page)?;
    let alignment = PageAlignment::from_detection(&detection, ideal);
    if let PageAlignment::Unaligned { failure } = &alignment {
        log::warn!("page alignment unavailable ({failure:?}); falling back to direct crop");
    }
    Ok(alignment)
}

/// Extract a template-space region from the page: warped through the
/// alignment when available, otherwise a direct crop at the same coordinates.
pub fn extract_region(
    page: &RgbaImageView<'_>,
    alignment: &PageAlignment,
    region: &Region,
    sampling: Sampling,
) -> Result<RgbaImage, GeometryError> {
    match alignment.homography() {
        Some(h) => warp_region(page, h, region, sampling),
        None => crop_region(page, region),
    }
}
