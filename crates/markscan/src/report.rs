use markscan_core::ImageKey;
use markscan_fiducial::PageAlignment;
use markscan_sheet::{DetectionResult, SpacingSource};
use serde::{Deserialize, Serialize};

/// What was read from one question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionOutcome {
    Marksheet {
        detection: DetectionResult,
        /// `None` when the answer is ambiguous and needs review.
        correct: Option<bool>,
        fill_ratios: Vec<f32>,
        spacing: SpacingSource,
    },
    IdGrid {
        digits: Vec<DetectionResult>,
        value: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionReport {
    pub id: String,
    #[serde(flatten)]
    pub outcome: QuestionOutcome,
}

impl QuestionReport {
    /// Multiple marks anywhere in the question.
    pub fn is_ambiguous(&self) -> bool {
        match &self.outcome {
            QuestionOutcome::Marksheet { detection, .. } => detection.is_ambiguous(),
            QuestionOutcome::IdGrid { digits, .. } => digits.iter().any(|d| d.is_ambiguous()),
        }
    }
}

/// Result of grading one scanned page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub image: ImageKey,
    pub alignment: PageAlignment,
    pub questions: Vec<QuestionReport>,
}

impl PageReport {
    pub fn question(&self, id: &str) -> Option<&QuestionReport> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Ids of questions the grader has to look at.
    pub fn flagged(&self) -> Vec<&str> {
        self.questions
            .iter()
            .filter(|q| q.is_ambiguous())
            .map(|q| q.id.as_str())
            .collect()
    }

    /// The decoded student ID, from the first ID grid that read cleanly.
    pub fn student_id(&self) -> Option<&str> {
        self.questions.iter().find_map(|q| match &q.outcome {
            QuestionOutcome::IdGrid {
                value: Some(v), ..
            } => Some(v.as_str()),
            _ => None,
        })
    }
}
