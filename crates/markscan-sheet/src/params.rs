use serde::{Deserialize, Serialize};

use crate::MarkSheetError;

/// How a pixel is judged "dark" when computing fill ratios and profiles.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DarknessThreshold {
    /// Luminance strictly below this value is ink.
    Fixed(f32),
    /// Otsu threshold over all sampled pixels of the region, capped at
    /// `max_ink_luma`. A split whose classes differ by less than `min_diff`
    /// means the region holds no ink.
    Otsu,
}

/// Mark-sheet decoder configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkSheetConfig {
    /// Answer-key mode: a bubble is marked when darker than `baseline * ratio`.
    pub fill_threshold_ratio: f32,
    /// Answer-key mode: and at least this many luminance units below baseline.
    pub min_diff: f32,
    /// Student mode: minimum fill ratio for a bubble to count as marked.
    pub min_fill_ratio: f32,
    /// Student mode: the winner must exceed the runner-up by this factor.
    pub winner_margin: f32,
    pub darkness: DarknessThreshold,
    /// Otsu mode: the threshold never exceeds this luminance, so printed
    /// outlines on a blank region are not counted as ink.
    pub max_ink_luma: f32,
    /// Reference-strip peaks must exceed `max * peak_ratio`.
    pub peak_ratio: f32,
    /// Below `ceil(option_count * fraction)` peaks the reference strip is ignored.
    pub min_viable_peak_fraction: f32,
}

impl Default for MarkSheetConfig {
    fn default() -> Self {
        Self {
            fill_threshold_ratio: 0.80,
            min_diff: 30.0,
            min_fill_ratio: 0.35,
            winner_margin: 1.1,
            darkness: DarknessThreshold::Fixed(128.0),
            max_ink_luma: 128.0,
            peak_ratio: 0.5,
            min_viable_peak_fraction: 0.5,
        }
    }
}

impl MarkSheetConfig {
    pub fn validate(&self) -> Result<(), MarkSheetError> {
        if !(self.fill_threshold_ratio > 0.0 && self.fill_threshold_ratio <= 1.0) {
            return Err(MarkSheetError::InvalidConfig(
                "fill_threshold_ratio must be in (0, 1]",
            ));
        }
        if !(self.min_diff >= 0.0) {
            return Err(MarkSheetError::InvalidConfig("min_diff must be non-negative"));
        }
        if !(self.min_fill_ratio > 0.0 && self.min_fill_ratio <= 1.0) {
            return Err(MarkSheetError::InvalidConfig("min_fill_ratio must be in (0, 1]"));
        }
        if !(self.winner_margin >= 1.0) {
            return Err(MarkSheetError::InvalidConfig("winner_margin must be >= 1"));
        }
        if !(self.max_ink_luma > 0.0 && self.max_ink_luma <= 255.0) {
            return Err(MarkSheetError::InvalidConfig("max_ink_luma must be in (0, 255]"));
        }
        if !(self.peak_ratio > 0.0 && self.peak_ratio < 1.0) {
            return Err(MarkSheetError::InvalidConfig("peak_ratio must be in (0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.min_viable_peak_fraction) {
            return Err(MarkSheetError::InvalidConfig(
                "min_viable_peak_fraction must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_overridable() {
        assert!(MarkSheetConfig::default().validate().is_ok());
        let cfg: MarkSheetConfig =
            serde_json::from_str(r#"{"winner_margin": 1.5, "darkness": "otsu"}"#).expect("parse");
        assert_eq!(cfg.winner_margin, 1.5);
        assert_eq!(cfg.darkness, DarknessThreshold::Otsu);
        assert_eq!(cfg.min_diff, 30.0);

        let fixed: MarkSheetConfig =
            serde_json::from_str(r#"{"darkness": {"fixed": 100.0}}"#).expect("parse");
        assert_eq!(fixed.darkness, DarknessThreshold::Fixed(100.0));
    }

    #[test]
    fn margin_below_one_is_rejected() {
        let cfg = MarkSheetConfig {
            winner_margin: 0.9,
            ..MarkSheetConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
