use markscan_core::{Axis, GeometryError};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Errors for malformed decoder inputs (caller bugs, never scan noise).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MarkSheetError {
    #[error("option count must be at least 1")]
    InvalidOptionCount,
    #[error("correct index {index} out of range for {option_count} options")]
    CorrectIndexOutOfRange { index: usize, option_count: usize },
    #[error("invalid id grid: {0}")]
    InvalidIdGrid(&'static str),
    #[error("invalid mark-sheet config: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Direction in which a question's bubbles are laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// One row, left to right.
    #[default]
    Horizontal,
    /// One column, top to bottom.
    Vertical,
}

impl Orientation {
    /// Profile axis whose index runs along the bubbles.
    pub fn profile_axis(self) -> Axis {
        match self {
            Orientation::Horizontal => Axis::Columns,
            Orientation::Vertical => Axis::Rows,
        }
    }
}

/// Geometry and key of one multiple-choice question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BubbleLayout {
    pub option_count: usize,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub correct_index: usize,
}

impl BubbleLayout {
    pub fn new(option_count: usize, orientation: Orientation, correct_index: usize) -> Self {
        Self {
            option_count,
            orientation,
            correct_index,
        }
    }

    pub fn validate(&self) -> Result<(), MarkSheetError> {
        if self.option_count == 0 {
            return Err(MarkSheetError::InvalidOptionCount);
        }
        if self.correct_index >= self.option_count {
            return Err(MarkSheetError::CorrectIndexOutOfRange {
                index: self.correct_index,
                option_count: self.option_count,
            });
        }
        Ok(())
    }
}

fn default_values() -> usize {
    10
}

/// Student-ID grid: `digits` groups of `values` bubbles each.
///
/// With `Vertical` orientation each digit is a column and its values run
/// top to bottom (the usual printed layout); `Horizontal` swaps the axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGridLayout {
    pub digits: usize,
    #[serde(default = "default_values")]
    pub values: usize,
    #[serde(default = "vertical")]
    pub orientation: Orientation,
}

fn vertical() -> Orientation {
    Orientation::Vertical
}

impl IdGridLayout {
    /// One bubble per alphanumeric character (`0-9`, `a-z`).
    pub const MAX_VALUES: usize = 36;

    pub fn new(digits: usize) -> Self {
        Self {
            digits,
            values: default_values(),
            orientation: Orientation::Vertical,
        }
    }

    pub fn validate(&self) -> Result<(), MarkSheetError> {
        if self.digits == 0 {
            return Err(MarkSheetError::InvalidIdGrid("digits must be at least 1"));
        }
        if self.values < 2 {
            return Err(MarkSheetError::InvalidIdGrid("values must be at least 2"));
        }
        if self.values > Self::MAX_VALUES {
            return Err(MarkSheetError::InvalidIdGrid("values must be at most 36"));
        }
        Ok(())
    }
}

/// Outcome of reading one bubble group.
///
/// Serialized as `-1` (no mark), an index, or an index array (multiple marks).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionResult {
    NoMark,
    Single(usize),
    /// Several bubbles are marked; needs manual review.
    Multiple(Vec<usize>),
}

impl DetectionResult {
    pub const NO_MARK_SENTINEL: i64 = -1;

    /// Build from marked indices (sorted, deduplicated).
    pub fn from_marked(mut marked: Vec<usize>) -> Self {
        marked.sort_unstable();
        marked.dedup();
        match marked.len() {
            0 => DetectionResult::NoMark,
            1 => DetectionResult::Single(marked[0]),
            _ => DetectionResult::Multiple(marked),
        }
    }

    /// Index for a single mark, `-1` otherwise.
    pub fn sentinel(&self) -> i64 {
        match self {
            DetectionResult::Single(i) => *i as i64,
            _ => Self::NO_MARK_SENTINEL,
        }
    }

    pub fn single(&self) -> Option<usize> {
        match self {
            DetectionResult::Single(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, DetectionResult::Multiple(_))
    }

    /// Compare against the key: a blank answer is wrong, an ambiguous one is
    /// undecided (`None`) and left to the grader.
    pub fn is_correct(&self, correct_index: usize) -> Option<bool> {
        match self {
            DetectionResult::NoMark => Some(false),
            DetectionResult::Single(i) => Some(*i == correct_index),
            DetectionResult::Multiple(_) => None,
        }
    }
}

impl Serialize for DetectionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DetectionResult::NoMark => serializer.serialize_i64(Self::NO_MARK_SENTINEL),
            DetectionResult::Single(i) => serializer.serialize_u64(*i as u64),
            DetectionResult::Multiple(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DetectionResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Index(i64),
            Many(Vec<usize>),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Index(Self::NO_MARK_SENTINEL) => Ok(DetectionResult::NoMark),
            Repr::Index(i) if i >= 0 => Ok(DetectionResult::Single(i as usize)),
            Repr::Index(i) => Err(de::Error::custom(format!("invalid bubble index {i}"))),
            Repr::Many(v) => Ok(DetectionResult::Multiple(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_validation() {
        assert!(BubbleLayout::new(4, Orientation::Horizontal, 3).validate().is_ok());
        assert_eq!(
            BubbleLayout::new(0, Orientation::Horizontal, 0).validate(),
            Err(MarkSheetError::InvalidOptionCount)
        );
        assert!(matches!(
            BubbleLayout::new(4, Orientation::Vertical, 4).validate(),
            Err(MarkSheetError::CorrectIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn detection_result_json_forms() {
        let cases = [
            (DetectionResult::NoMark, "-1"),
            (DetectionResult::Single(2), "2"),
            (DetectionResult::Multiple(vec![0, 3]), "[0,3]"),
        ];
        for (value, json) in cases {
            assert_eq!(serde_json::to_string(&value).expect("serialize"), json);
            let back: DetectionResult = serde_json::from_str(json).expect("deserialize");
            assert_eq!(back, value);
        }
        assert!(serde_json::from_str::<DetectionResult>("-3").is_err());
    }

    #[test]
    fn sentinel_and_correctness() {
        assert_eq!(DetectionResult::NoMark.sentinel(), -1);
        assert_eq!(DetectionResult::Single(1).is_correct(1), Some(true));
        assert_eq!(DetectionResult::NoMark.is_correct(1), Some(false));
        assert_eq!(DetectionResult::Multiple(vec![1, 2]).is_correct(1), None);
        assert_eq!(
            DetectionResult::from_marked(vec![3, 1, 3]),
            DetectionResult::Multiple(vec![1, 3])
        );
    }

    #[test]
    fn id_grid_defaults_to_ten_values() {
        let g: IdGridLayout = serde_json::from_str(r#"{"digits": 7}"#).expect("parse");
        assert_eq!(g, IdGridLayout::new(7));
        assert!(IdGridLayout::new(0).validate().is_err());
    }
}
