//! Page grading: align, rectify each question region, decode.

use std::ops::ControlFlow;
use std::sync::Arc;

use markscan_core::{GeometryError, ImageKey, PixelCache, Region, RgbaImage, RgbaImageView};
use markscan_fiducial::{
    align_page, extract_region, AlignmentFailure, FiducialDetector, FiducialError, PageAlignment,
};
use markscan_sheet::{
    decode_id_grid, decode_marksheet, detect_answer_key, DetectionResult, MarkSheetError,
};
use serde::{Deserialize, Serialize};

use crate::{AnswerTemplate, PageReport, QuestionKind, QuestionOutcome, QuestionReport};
use crate::{QuestionTemplate, TemplateIoError};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the grading pipeline. Unreadable marks are not errors.
#[derive(thiserror::Error, Debug)]
pub enum GradeError {
    #[error("question `{id}`: {source}")]
    InvalidQuestion {
        id: String,
        #[source]
        source: MarkSheetError,
    },
    #[error("failed to load image `{key}`: {message}")]
    Load { key: ImageKey, message: String },
    #[cfg(feature = "image")]
    #[error("failed to decode image `{key}`")]
    Decode {
        key: ImageKey,
        #[source]
        source: ::image::ImageError,
    },
    #[error(transparent)]
    Fiducial(#[from] FiducialError),
    #[error(transparent)]
    MarkSheet(#[from] MarkSheetError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Template(#[from] TemplateIoError),
}

/// Where page pixels come from.
pub trait ImageSource {
    /// Stable handle used for caching and reports.
    fn key(&self) -> ImageKey;
    fn load(&self) -> Result<RgbaImage, GradeError>;
}

/// An already-decoded page.
#[derive(Clone, Debug)]
pub struct InMemoryImage {
    pub key: ImageKey,
    pub image: RgbaImage,
}

impl InMemoryImage {
    pub fn new(key: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            key: ImageKey::new(key),
            image,
        }
    }
}

impl ImageSource for InMemoryImage {
    fn key(&self) -> ImageKey {
        self.key.clone()
    }

    fn load(&self) -> Result<RgbaImage, GradeError> {
        Ok(self.image.clone())
    }
}

/// Answer key read from a master sheet for one question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyDetection {
    pub id: String,
    pub detection: DetectionResult,
}

/// Grades pages against one template.
#[derive(Clone, Debug)]
pub struct PageGrader<'t> {
    template: &'t AnswerTemplate,
    detector: FiducialDetector,
    align: bool,
}

impl<'t> PageGrader<'t> {
    /// Validate the template and build the fiducial detector.
    pub fn new(template: &'t AnswerTemplate) -> Result<Self, GradeError> {
        template.validate()?;
        Ok(Self {
            template,
            detector: FiducialDetector::new(template.fiducial)?,
            align: true,
        })
    }

    /// Read every region at its template coordinates without alignment.
    pub fn without_alignment(mut self) -> Self {
        self.align = false;
        self
    }

    pub fn template(&self) -> &AnswerTemplate {
        self.template
    }

    /// Locate the page's fiducials; falls back to `Unaligned` when unavailable.
    pub fn align(&self, page: &RgbaImageView<'_>) -> Result<PageAlignment, GradeError> {
        if !self.align {
            return Ok(PageAlignment::Unaligned {
                failure: AlignmentFailure::Disabled,
            });
        }
        let Some(ideal) = &self.template.ideal_corners else {
            log::warn!("template has no ideal corners; reading page unaligned");
            return Ok(PageAlignment::Unaligned {
                failure: AlignmentFailure::NoTemplateCorners,
            });
        };
        Ok(align_page(page, ideal, &self.detector)?)
    }

    /// Rectify a question's answer and reference area.
    ///
    /// Returns the crop with both regions moved into crop coordinates.
    fn extract(
        &self,
        page: &RgbaImageView<'_>,
        alignment: &PageAlignment,
        q: &QuestionTemplate,
    ) -> Result<(RgbaImage, Region, Option<Region>), GradeError> {
        let bounds = q.bounds();
        let crop = extract_region(page, alignment, &bounds, self.template.sampling)?;
        let answer = q.region.translate(-bounds.x, -bounds.y);
        let reference = q.reference.map(|r| r.translate(-bounds.x, -bounds.y));
        Ok((crop, answer, reference))
    }

    fn grade_question(
        &self,
        page: &RgbaImageView<'_>,
        alignment: &PageAlignment,
        q: &QuestionTemplate,
    ) -> Result<QuestionReport, GradeError> {
        let (crop, answer, reference) = self.extract(page, alignment, q)?;
        let view = crop.view();
        let cfg = &self.template.marksheet;
        let outcome = match &q.kind {
            QuestionKind::Marksheet { layout } => {
                let reading = decode_marksheet(&view, &answer, reference.as_ref(), layout, cfg)?;
                QuestionOutcome::Marksheet {
                    correct: reading.result.is_correct(layout.correct_index),
                    fill_ratios: reading.fill_ratios(),
                    spacing: reading.spacing.source,
                    detection: reading.result,
                }
            }
            QuestionKind::IdGrid { layout } => {
                let reading = decode_id_grid(&view, &answer, layout, cfg)?;
                QuestionOutcome::IdGrid {
                    value: reading.value(),
                    digits: reading.digits,
                }
            }
        };
        Ok(QuestionReport {
            id: q.id.clone(),
            outcome,
        })
    }

    /// Grade one decoded page.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, key, page), fields(key = %key, width = page.width, height = page.height))
    )]
    pub fn grade_page(
        &self,
        key: &ImageKey,
        page: &RgbaImageView<'_>,
    ) -> Result<PageReport, GradeError> {
        let alignment = self.align(page)?;
        let questions = self
            .template
            .questions
            .iter()
            .map(|q| self.grade_question(page, &alignment, q))
            .collect::<Result<Vec<_>, _>>()?;
        let report = PageReport {
            image: key.clone(),
            alignment,
            questions,
        };
        let flagged = report.flagged();
        if !flagged.is_empty() {
            log::info!("{key}: ambiguous answers in {flagged:?}");
        }
        Ok(report)
    }

    /// Read the answer key from a master sheet (mark-sheet questions only).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, page), fields(width = page.width, height = page.height))
    )]
    pub fn detect_key(&self, page: &RgbaImageView<'_>) -> Result<Vec<KeyDetection>, GradeError> {
        let alignment = self.align(page)?;
        let mut key = Vec::new();
        for q in &self.template.questions {
            let QuestionKind::Marksheet { layout } = &q.kind else {
                continue;
            };
            let (crop, answer, reference) = self.extract(page, &alignment, q)?;
            let reading = detect_answer_key(
                &crop.view(),
                &answer,
                reference.as_ref(),
                layout,
                &self.template.marksheet,
            )?;
            if !matches!(reading.result, DetectionResult::Single(_)) {
                log::warn!("answer key for `{}` is {:?}", q.id, reading.result);
            }
            key.push(KeyDetection {
                id: q.id.clone(),
                detection: reading.result,
            });
        }
        Ok(key)
    }

    fn grade_source<S: ImageSource>(
        &self,
        source: &S,
        cache: &PixelCache,
    ) -> Result<PageReport, GradeError> {
        let key = source.key();
        let page: Arc<RgbaImage> = cache.get_or_try_insert_with(&key, || source.load())?;
        self.grade_page(&key, &page.view())
    }
}

/// Grade `sources` in order, decoding each page once through `cache`.
///
/// Stops at the first malformed input.
pub fn grade_batch<S: ImageSource>(
    grader: &PageGrader<'_>,
    sources: &[S],
    cache: &PixelCache,
) -> Result<Vec<PageReport>, GradeError> {
    grade_batch_with(grader, sources, cache, |_| ControlFlow::Continue(()))
}

/// Like [`grade_batch`], calling `on_page` after each page; `Break` stops
/// the batch and returns the reports gathered so far.
pub fn grade_batch_with<S, F>(
    grader: &PageGrader<'_>,
    sources: &[S],
    cache: &PixelCache,
    mut on_page: F,
) -> Result<Vec<PageReport>, GradeError>
where
    S: ImageSource,
    F: FnMut(&PageReport) -> ControlFlow<()>,
{
    let mut reports = Vec::with_capacity(sources.len());
    for source in sources {
        let report = grader.grade_source(source, cache)?;
        let flow = on_page(&report);
        reports.push(report);
        if flow.is_break() {
            log::info!("batch stopped after {} of {} pages", reports.len(), sources.len());
            break;
        }
    }
    Ok(reports)
}

/// Grade `sources` on the rayon pool; reports keep input order.
#[cfg(feature = "rayon")]
pub fn grade_batch_par<S: ImageSource + Sync>(
    grader: &PageGrader<'_>,
    sources: &[S],
    cache: &PixelCache,
) -> Result<Vec<PageReport>, GradeError> {
    use rayon::prelude::*;

    sources
        .par_iter()
        .map(|source| grader.grade_source(source, cache))
        .collect()
}
