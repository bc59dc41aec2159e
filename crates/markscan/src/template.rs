//! Answer templates: where the questions are and how to read them.

use markscan_core::{Corners, Region, Sampling};
use markscan_fiducial::FiducialDetectionConfig;
use markscan_sheet::{BubbleLayout, IdGridLayout, MarkSheetConfig, MarkSheetError};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::{GradeError, KeyDetection};

#[derive(thiserror::Error, Debug)]
pub enum TemplateIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// How a question region is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionKind {
    Marksheet { layout: BubbleLayout },
    IdGrid { layout: IdGridLayout },
}

/// One question in template coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionTemplate {
    pub id: String,
    pub region: Region,
    /// Printed strip whose ink marks the bubble positions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Region>,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl QuestionTemplate {
    /// Region covering the answer and its reference strip.
    pub fn bounds(&self) -> Region {
        match &self.reference {
            Some(r) => self.region.union(r),
            None => self.region,
        }
    }
}

/// Answer template for one exam form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerTemplate {
    /// Fiducial centroids on the blank template; without them pages are
    /// read unaligned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_corners: Option<Corners>,
    #[serde(default)]
    pub fiducial: FiducialDetectionConfig,
    #[serde(default)]
    pub marksheet: MarkSheetConfig,
    #[serde(default)]
    pub sampling: Sampling,
    pub questions: Vec<QuestionTemplate>,
}

impl AnswerTemplate {
    /// Load a JSON template from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TemplateIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this template to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TemplateIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check every config, region and layout.
    pub fn validate(&self) -> Result<(), GradeError> {
        self.fiducial.validate()?;
        self.marksheet.validate()?;
        for q in &self.questions {
            let invalid = |source: MarkSheetError| GradeError::InvalidQuestion {
                id: q.id.clone(),
                source,
            };
            q.region.validate().map_err(|e| invalid(e.into()))?;
            if let Some(r) = &q.reference {
                r.validate().map_err(|e| invalid(e.into()))?;
            }
            match &q.kind {
                QuestionKind::Marksheet { layout } => layout.validate().map_err(invalid)?,
                QuestionKind::IdGrid { layout } => layout.validate().map_err(invalid)?,
            }
        }
        Ok(())
    }

    pub fn question(&self, id: &str) -> Option<&QuestionTemplate> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Store detected answer-key indices as each question's `correct_index`.
    ///
    /// Only single detections are applied; returns how many questions changed.
    pub fn apply_key(&mut self, key: &[KeyDetection]) -> usize {
        let mut applied = 0;
        for k in key {
            let Some(index) = k.detection.single() else {
                continue;
            };
            let Some(q) = self.questions.iter_mut().find(|q| q.id == k.id) else {
                continue;
            };
            if let QuestionKind::Marksheet { layout } = &mut q.kind {
                if index < layout.option_count {
                    layout.correct_index = index;
                    applied += 1;
                }
            }
        }
        applied
    }
}
