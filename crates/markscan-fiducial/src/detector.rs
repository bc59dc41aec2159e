use markscan_core::{
    find_blob, Blob, BlobSearch, BlobSelection, CornerId, Corners, DarkThreshold, GeometryError,
    Region, RgbaImageView,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{FiducialDetectionConfig, FiducialError};

/// Search outcome for one page-corner quadrant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadrantResult {
    pub corner: CornerId,
    pub search_region: Region,
    pub blob: Option<Blob>,
}

/// All four quadrant searches of one page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiducialDetection {
    pub page_width: usize,
    pub page_height: usize,
    /// TL, TR, BR, BL.
    pub quadrants: [QuadrantResult; 4],
}

impl FiducialDetection {
    /// Mark centroids, only when every quadrant produced a blob.
    pub fn corners(&self) -> Option<Corners> {
        let mut pts = [Point2::origin(); 4];
        for (dst, q) in pts.iter_mut().zip(self.quadrants.iter()) {
            *dst = q.blob?.centroid;
        }
        Some(Corners::from_array(pts))
    }

    pub fn missing(&self) -> Vec<CornerId> {
        self.quadrants
            .iter()
            .filter(|q| q.blob.is_none())
            .map(|q| q.corner)
            .collect()
    }
}

/// Per-quadrant corner-mark detector.
#[derive(Clone, Debug, Default)]
pub struct FiducialDetector {
    config: FiducialDetectionConfig,
}

impl FiducialDetector {
    pub fn new(config: FiducialDetectionConfig) -> Result<Self, FiducialError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FiducialDetectionConfig {
        &self.config
    }

    /// Search region and target point of one quadrant.
    pub fn quadrant(&self, corner: CornerId, width: usize, height: usize) -> (Region, Point2<f32>) {
        let (w, h) = (width as f32, height as f32);
        let mw = (w * self.config.search_margin_ratio).max(1.0);
        let mh = (h * self.config.search_margin_ratio).max(1.0);
        match corner {
            CornerId::TopLeft => (Region::new(0.0, 0.0, mw, mh), Point2::new(0.0, 0.0)),
            CornerId::TopRight => (Region::new(w - mw, 0.0, mw, mh), Point2::new(w, 0.0)),
            CornerId::BottomRight => (Region::new(w - mw, h - mh, mw, mh), Point2::new(w, h)),
            CornerId::BottomLeft => (Region::new(0.0, h - mh, mw, mh), Point2::new(0.0, h)),
        }
    }

    /// Run all four quadrant searches on a page.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "info", skip(self, page), fields(width = page.width, height = page.height))
    )]
    pub fn detect(&self, page: &RgbaImageView<'_>) -> Result<FiducialDetection, FiducialError> {
        if page.width == 0 || page.height == 0 || !page.is_consistent() {
            return Err(GeometryError::InvalidImage {
                width: page.width,
                height: page.height,
            }
            .into());
        }

        let mut quadrants = CornerId::ALL.map(|corner| QuadrantResult {
            corner,
            search_region: Region::new(0.0, 0.0, 1.0, 1.0),
            blob: None,
        });
        for q in quadrants.iter_mut() {
            let (region, target) = self.quadrant(q.corner, page.width, page.height);
            let area = region.width * region.height;
            let max_size =
                ((area * self.config.max_blob_area_fraction) as usize).max(self.config.min_blob_size);
            let search = BlobSearch {
                region,
                threshold: DarkThreshold::Adaptive {
                    cap: self.config.brightness_cap,
                    factor: self.config.brightness_factor,
                },
                min_size: self.config.min_blob_size,
                max_size,
                selection: BlobSelection::NearestTo(target),
                max_aspect_ratio: None,
            };
            q.search_region = region;
            q.blob = find_blob(page, &search)?;
            match &q.blob {
                Some(b) => log::debug!(
                    "fiducial {:?}: {} px at ({:.1}, {:.1})",
                    q.corner,
                    b.pixel_count,
                    b.centroid.x,
                    b.centroid.y
                ),
                None => log::debug!("fiducial {:?}: no mark in {:?}", q.corner, region),
            }
        }

        Ok(FiducialDetection {
            page_width: page.width,
            page_height: page.height,
            quadrants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markscan_core::RgbaImage;

    fn page_with_marks(w: usize, h: usize, dx: i64, dy: i64) -> RgbaImage {
        let mut page = RgbaImage::filled(w, h, 240);
        let (wi, hi) = (w as i64, h as i64);
        for (x, y) in [(40, 40), (wi - 60, 40), (wi - 60, hi - 60), (40, hi - 60)] {
            page.fill_rect(x + dx, y + dy, 20, 20, 0);
        }
        page
    }

    #[test]
    fn finds_all_four_marks() {
        let page = page_with_marks(400, 560, 0, 0);
        let det = FiducialDetector::default()
            .detect(&page.view())
            .expect("valid page");
        let c = det.corners().expect("all marks");
        assert!((c.tl - Point2::new(50.0, 50.0)).norm() < 1e-4);
        assert!((c.tr - Point2::new(350.0, 50.0)).norm() < 1e-4);
        assert!((c.br - Point2::new(350.0, 510.0)).norm() < 1e-4);
        assert!((c.bl - Point2::new(50.0, 510.0)).norm() < 1e-4);
    }

    #[test]
    fn shifted_marks_follow_the_shift() {
        let page = page_with_marks(400, 560, 15, 15);
        let det = FiducialDetector::default()
            .detect(&page.view())
            .expect("valid page");
        let c = det.corners().expect("all marks");
        assert!((c.tl - Point2::new(65.0, 65.0)).norm() < 1e-4);
        assert!((c.br - Point2::new(365.0, 525.0)).norm() < 1e-4);
    }

    #[test]
    fn missing_mark_is_reported_not_an_error() {
        let mut page = page_with_marks(400, 560, 0, 0);
        page.fill_rect(340, 500, 20, 20, 240); // erase BR
        let det = FiducialDetector::default()
            .detect(&page.view())
            .expect("valid page");
        assert!(det.corners().is_none());
        assert_eq!(det.missing(), vec![CornerId::BottomRight]);
    }

    #[test]
    fn prefers_mark_nearest_the_corner() {
        let mut page = page_with_marks(400, 560, 0, 0);
        page.fill_rect(70, 70, 24, 24, 0); // larger decoy further in
        let det = FiducialDetector::default()
            .detect(&page.view())
            .expect("valid page");
        let tl = det.quadrants[0].blob.expect("tl").centroid;
        assert!((tl - Point2::new(50.0, 50.0)).norm() < 1e-4);
    }

    #[test]
    fn empty_page_is_an_error() {
        let page = RgbaImage::new(0, 0);
        assert!(FiducialDetector::default().detect(&page.view()).is_err());
    }
}
