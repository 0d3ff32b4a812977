//! Page Aggregator: reading order, dedup and the final [`PageResult`].
//!
//! Regions are visited in ascending top edge (`y1`); the sort is stable so
//! ties keep detector order. Text-OCR results share one seen-set per page:
//! the first occurrence of a string wins across all text-bearing classes.
//! Formula results are never deduplicated.

use crate::document::{Page, Region};
use crate::error::PageError;
use crate::labels::RegionClass;
use crate::output::{PageInfo, PageResult, RecognitionResult};
use crate::pipeline::route::RegionOutcome;
use image::RgbImage;
use std::collections::HashSet;
use tracing::debug;

/// Indices into `regions` in reading order.
pub fn reading_order(regions: &[Region]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..regions.len()).collect();
    order.sort_by(|&a, &b| regions[a].bbox.y1.total_cmp(&regions[b].bbox.y1));
    order
}

/// Per-page counters reported back to the run's stats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTally {
    pub entries_emitted: usize,
    pub duplicates_suppressed: usize,
    pub figures_exported: usize,
    pub regions_failed: usize,
}

/// Collects routed outcomes for one page.
#[derive(Debug)]
pub struct PageAggregator {
    page_info: PageInfo,
    entries: Vec<RecognitionResult>,
    seen: HashSet<String>,
    failures: Vec<PageError>,
    tally: PageTally,
}

impl PageAggregator {
    pub fn new(page: &Page) -> Self {
        Self {
            page_info: PageInfo {
                page_no: page.index,
                height: page.height(),
                width: page.width(),
            },
            entries: Vec::new(),
            seen: HashSet::new(),
            failures: Vec::new(),
            tally: PageTally::default(),
        }
    }

    /// Record the outcome of routing one region of class `class`.
    pub fn push(&mut self, class: RegionClass, outcome: RegionOutcome) {
        match outcome {
            RegionOutcome::Recognized(result) => {
                if class.is_text_bearing() && !self.seen.insert(result.text.clone()) {
                    debug!(
                        "Page {}: duplicate text suppressed: {:?}",
                        self.page_info.page_no, result.text
                    );
                    self.tally.duplicates_suppressed += 1;
                    return;
                }
                self.tally.entries_emitted += 1;
                self.entries.push(result);
            }
            RegionOutcome::Exported(_) => self.tally.figures_exported += 1,
            RegionOutcome::Skipped => {}
            RegionOutcome::Failed(err) => {
                if matches!(err, PageError::Region { .. }) {
                    self.tally.regions_failed += 1;
                }
                self.failures.push(err);
            }
        }
    }

    /// Record a non-region failure (detection, preview write).
    pub fn record_failure(&mut self, err: PageError) {
        self.failures.push(err);
    }

    pub fn finish(self, preview: Option<RgbImage>) -> (PageResult, Vec<PageError>, PageTally) {
        let result = PageResult {
            layout_dets: self.entries,
            page_info: self.page_info,
            preview,
        };
        (result, self.failures, self.tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BoundingBox;
    use crate::output::Score;

    fn region_at(y1: f32) -> Region {
        Region {
            bbox: BoundingBox::new(0.0, y1, 10.0, y1 + 5.0).unwrap(),
            class: RegionClass::PlainText,
            confidence: 0.9,
        }
    }

    fn result(category: &str, text: &str) -> RecognitionResult {
        RecognitionResult {
            category_type: category.into(),
            poly: vec![],
            text: text.into(),
            score: Score::from(0.9),
        }
    }

    fn page() -> Page {
        Page::new(3, RgbImage::new(40, 60))
    }

    #[test]
    fn reading_order_is_stable_by_top_edge() {
        let regions = vec![region_at(50.0), region_at(10.0), region_at(50.0), region_at(0.0)];
        assert_eq!(reading_order(&regions), vec![3, 1, 0, 2]);
    }

    #[test]
    fn page_info_comes_from_page() {
        let (result, failures, _) = PageAggregator::new(&page()).finish(None);
        assert_eq!(
            result.page_info,
            PageInfo {
                page_no: 3,
                height: 60,
                width: 40
            }
        );
        assert!(result.layout_dets.is_empty());
        assert!(failures.is_empty());
    }

    #[test]
    fn dedup_spans_text_classes() {
        let mut agg = PageAggregator::new(&page());
        agg.push(
            RegionClass::Title,
            RegionOutcome::Recognized(result("title", "Report")),
        );
        agg.push(
            RegionClass::PlainText,
            RegionOutcome::Recognized(result("plain_text", "Report")),
        );
        agg.push(
            RegionClass::PlainText,
            RegionOutcome::Recognized(result("plain_text", "Body")),
        );
        let (page, _, tally) = agg.finish(None);
        let texts: Vec<_> = page.layout_dets.iter().map(|r| r.category_type.as_str()).collect();
        assert_eq!(texts, vec!["title", "plain_text"]);
        assert_eq!(tally.duplicates_suppressed, 1);
        assert_eq!(tally.entries_emitted, 2);
    }

    #[test]
    fn formulas_are_not_deduplicated() {
        let mut agg = PageAggregator::new(&page());
        for _ in 0..2 {
            agg.push(
                RegionClass::IsolatedFormula,
                RegionOutcome::Recognized(result("isolated_formula", "x")),
            );
        }
        let (page, _, _) = agg.finish(None);
        assert_eq!(page.layout_dets.len(), 2);
    }

    #[test]
    fn failures_and_exports_are_counted() {
        let mut agg = PageAggregator::new(&page());
        agg.push(RegionClass::Figure, RegionOutcome::Exported("f.png".into()));
        agg.push(
            RegionClass::PlainText,
            RegionOutcome::Failed(PageError::Region {
                page: 3,
                category_type: "plain_text".into(),
                poly: vec![],
                detail: "boom".into(),
            }),
        );
        agg.push(RegionClass::Table, RegionOutcome::Skipped);
        let (page, failures, tally) = agg.finish(None);
        assert!(page.layout_dets.is_empty());
        assert_eq!(failures.len(), 1);
        assert_eq!(tally.figures_exported, 1);
        assert_eq!(tally.regions_failed, 1);
    }
}
