//! Region Router: dispatch each region to exactly one recognizer.
//!
//! Dispatch is the exhaustive [`Route`] match from [`RegionClass::route`].
//! Every recognizer call runs inside a fault boundary: a timeout, error
//! capture and panic capture. A failing region becomes [`RegionOutcome::Failed`] and the page
//! carries on with its remaining regions.

use crate::document::{Page, Region};
use crate::error::{PageError, RegionError};
use crate::labels::{RegionClass, Route};
use crate::output::{RecognitionResult, Score};
use crate::pipeline::encode::encode_png;
use crate::pipeline::recognize::{FormulaRecognizer, TextLine, TextRecognizer};
use crate::storage::ArtifactStore;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What routing one region produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    /// A result entry for the page's `layout_dets`.
    Recognized(RecognitionResult),
    /// A figure crop written to the artifact store at this location.
    Exported(String),
    /// Nothing to emit: table region, unknown class, or no text found.
    Skipped,
    /// The recognizer or artifact write failed; the region is dropped.
    Failed(PageError),
}

/// Artifact name for a figure crop; `page_no` is 0-based, the name is 1-based.
pub fn figure_artifact_name(stem: &str, page_no: usize, region: &Region) -> String {
    let (x1, y1, x2, y2) = region.bbox.pixel_bounds();
    format!("{stem}/page_{}_figure_{x1}_{y1}_{x2}_{y2}.png", page_no + 1)
}

/// Join lines with single spaces; score is the best line confidence.
pub fn merge_text_lines(lines: &[TextLine]) -> Option<(String, Score)> {
    if lines.is_empty() {
        return None;
    }
    let text = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let best = lines
        .iter()
        .filter_map(|l| l.confidence)
        .max_by(|a, b| a.total_cmp(b));
    Some((text, best.map(Score::from).unwrap_or(Score::UNSCORED)))
}

pub struct RegionRouter {
    text: Arc<dyn TextRecognizer>,
    formula: Arc<dyn FormulaRecognizer>,
    artifacts: Arc<dyn ArtifactStore>,
    timeout: Duration,
}

impl RegionRouter {
    pub fn new(
        text: Arc<dyn TextRecognizer>,
        formula: Arc<dyn FormulaRecognizer>,
        artifacts: Arc<dyn ArtifactStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            text,
            formula,
            artifacts,
            timeout,
        }
    }

    /// Route one region of `page`. Never returns an error.
    pub async fn route(&self, page: &Page, region: &Region, stem: &str) -> RegionOutcome {
        match region.class.route() {
            Route::TextOcr => self.text_ocr(page, region).await,
            Route::FormulaOcr => self.formula_ocr(page, region).await,
            Route::FigureExport => self.export_figure(page, region, stem).await,
            Route::DeferredToTablePass | Route::Drop => RegionOutcome::Skipped,
        }
    }

    async fn text_ocr(&self, page: &Page, region: &Region) -> RegionOutcome {
        let result = match page.crop(&region.bbox) {
            Some(crop) => self.guarded(self.text.recognize_text(&crop)).await,
            None => Err(RegionError::EmptyCrop),
        };
        match result {
            Ok(lines) => match merge_text_lines(&lines) {
                Some((text, score)) => {
                    RegionOutcome::Recognized(entry(region.class, region, text, score))
                }
                None => {
                    debug!(
                        "Page {}: no text in {} region",
                        page.index,
                        region.class.category_type()
                    );
                    RegionOutcome::Skipped
                }
            },
            Err(e) => failed(page, region, e),
        }
    }

    async fn formula_ocr(&self, page: &Page, region: &Region) -> RegionOutcome {
        let result = match page.crop(&region.bbox) {
            Some(crop) => self.guarded(self.formula.recognize_formula(&crop)).await,
            None => Err(RegionError::EmptyCrop),
        };
        match result {
            Ok(latex) => {
                RegionOutcome::Recognized(entry(region.class, region, latex, Score::UNSCORED))
            }
            Err(e) => failed(page, region, e),
        }
    }

    async fn export_figure(&self, page: &Page, region: &Region, stem: &str) -> RegionOutcome {
        let name = figure_artifact_name(stem, page.index, region);
        let Some(crop) = page.crop(&region.bbox) else {
            return failed(page, region, RegionError::EmptyCrop);
        };
        let png = match encode_png(&crop) {
            Ok(png) => png,
            Err(e) => return artifact_failed(name, e.to_string()),
        };
        match self.artifacts.write_artifact(&name, png).await {
            Ok(location) => {
                debug!("Page {}: figure exported to {}", page.index, location);
                RegionOutcome::Exported(location)
            }
            Err(e) => artifact_failed(name, e.to_string()),
        }
    }

    async fn guarded<T>(
        &self,
        fut: impl Future<Output = Result<T, RegionError>>,
    ) -> Result<T, RegionError> {
        let caught = AssertUnwindSafe(fut).catch_unwind();
        match tokio::time::timeout(self.timeout, caught).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(RegionError::Backend(format!(
                "recognizer panicked: {}",
                panic_message(payload.as_ref())
            ))),
            Err(_) => Err(RegionError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn entry(class: RegionClass, region: &Region, text: String, score: Score) -> RecognitionResult {
    RecognitionResult {
        category_type: class.category_type(),
        poly: region.bbox.polygon(),
        text,
        score,
    }
}

fn failed(page: &Page, region: &Region, e: RegionError) -> RegionOutcome {
    let err = PageError::Region {
        page: page.index,
        category_type: region.class.category_type(),
        poly: region.bbox.polygon(),
        detail: e.to_string(),
    };
    warn!("{}", err);
    RegionOutcome::Failed(err)
}

fn artifact_failed(name: String, detail: String) -> RegionOutcome {
    let err = PageError::Artifact { name, detail };
    warn!("{}", err);
    RegionOutcome::Failed(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BoundingBox;

    #[test]
    fn merge_joins_with_spaces_and_takes_max() {
        let lines = vec![
            TextLine::new("Annual", 0.71),
            TextLine::new("Report", 0.93),
            TextLine::new("2024", 0.88),
        ];
        let (text, score) = merge_text_lines(&lines).unwrap();
        assert_eq!(text, "Annual Report 2024");
        assert_eq!(score, Score::from(0.93));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload = std::panic::catch_unwind(|| panic!("backend blew up")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "backend blew up");
        let payload = std::panic::catch_unwind(|| panic!("page {}", 3)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "page 3");
    }

    #[test]
    fn failed_outcomes_compare_by_error() {
        let err = PageError::TableExtraction {
            detail: "x".into(),
        };
        assert_eq!(
            RegionOutcome::Failed(err.clone()),
            RegionOutcome::Failed(err)
        );
        assert_ne!(RegionOutcome::Skipped, RegionOutcome::Exported("a.png".into()));
    }

    #[test]
    fn merge_without_confidences_is_unscored() {
        let lines = vec![TextLine {
            text: "x".into(),
            confidence: None,
        }];
        assert_eq!(merge_text_lines(&lines).unwrap().1, Score::UNSCORED);
        assert!(merge_text_lines(&[]).is_none());
    }

    #[test]
    fn figure_names_are_one_based() {
        let region = Region {
            bbox: BoundingBox::new(10.4, 20.0, 300.9, 200.0).unwrap(),
            class: RegionClass::Figure,
            confidence: 0.9,
        };
        assert_eq!(
            figure_artifact_name("report", 0, &region),
            "report/page_1_figure_10_20_300_200.png"
        );
    }
}
