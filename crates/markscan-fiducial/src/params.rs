use serde::{Deserialize, Serialize};

use crate::FiducialError;

/// Tunables for corner-mark search.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiducialDetectionConfig {
    /// Quadrant size as a fraction of page width/height (0.25..0.30 typical).
    pub search_margin_ratio: f32,
    /// Absolute pixel-area floor; marks can be tiny on low-DPI scans.
    pub min_blob_size: usize,
    /// Upper blob area as a fraction of the quadrant area, rejects borders and large dark regions.
    pub max_blob_area_fraction: f32,
    /// Adaptive threshold factor applied to the quadrant's mean luminance.
    pub brightness_factor: f32,
    /// Upper bound of the adaptive threshold.
    pub brightness_cap: f32,
}

impl Default for FiducialDetectionConfig {
    fn default() -> Self {
        Self {
            search_margin_ratio: 0.25,
            min_blob_size: 20,
            max_blob_area_fraction: 0.25,
            brightness_factor: 0.7,
            brightness_cap: 128.0,
        }
    }
}

impl FiducialDetectionConfig {
    pub fn validate(&self) -> Result<(), FiducialError> {
        if !(self.search_margin_ratio > 0.0 && self.search_margin_ratio <= 0.5) {
            return Err(FiducialError::InvalidConfig(
                "search_margin_ratio must be in (0, 0.5]",
            ));
        }
        if self.min_blob_size == 0 {
            return Err(FiducialError::InvalidConfig("min_blob_size must be positive"));
        }
        if !(self.max_blob_area_fraction > 0.0 && self.max_blob_area_fraction <= 1.0) {
            return Err(FiducialError::InvalidConfig(
                "max_blob_area_fraction must be in (0, 1]",
            ));
        }
        if !(self.brightness_factor > 0.0 && self.brightness_cap > 0.0) {
            return Err(FiducialError::InvalidConfig(
                "brightness_factor and brightness_cap must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: FiducialDetectionConfig =
            serde_json::from_str(r#"{"search_margin_ratio": 0.3}"#).expect("parse");
        assert_eq!(cfg.search_margin_ratio, 0.3);
        assert_eq!(cfg.brightness_factor, 0.7);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn out_of_range_margin_is_rejected() {
        let cfg = FiducialDetectionConfig {
            search_margin_ratio: 0.8,
            ..FiducialDetectionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
