//! Output types: the persisted layout record and per-run statistics.
//!
//! [`DocumentResult`] serialises to the canonical interchange shape consumed
//! by the editor UI and downstream indexers:
//!
//! ```text
//! [
//!   { "layout_dets": [ {"category_type", "poly", "text", "score"}, … ],
//!     "page_info":   {"page_no", "height", "width"} },
//!   …
//! ]
//! ```
//!
//! Field names, polygon order and the `"-"` marker for unscored entries are a
//! compatibility contract. Inside the crate an unscored entry is
//! `Score(None)`; the dash only exists on the wire.

use crate::error::PageError;
use image::RgbImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire form of an unscored entry.
pub const UNSCORED_MARKER: &str = "-";

/// Recognition confidence, or `None` for recognizers that do not emit one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Score(pub Option<f64>);

impl Score {
    pub const UNSCORED: Score = Score(None);

    pub fn value(self) -> Option<f64> {
        self.0
    }

    pub fn is_scored(self) -> bool {
        self.0.is_some()
    }
}

impl From<f64> for Score {
    fn from(v: f64) -> Self {
        Score(Some(v))
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(v) => s.serialize_f64(v),
            None => s.serialize_str(UNSCORED_MARKER),
        }
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        match serde_json::Value::deserialize(d)? {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Score::from)
                .ok_or_else(|| D::Error::custom("score is not representable as f64")),
            serde_json::Value::Null => Ok(Score::UNSCORED),
            serde_json::Value::String(s) if s == UNSCORED_MARKER => Ok(Score::UNSCORED),
            serde_json::Value::String(s) => s
                .parse::<f64>()
                .map(Score::from)
                .map_err(|_| D::Error::custom(format!("invalid score '{s}'"))),
            other => Err(D::Error::custom(format!("invalid score {other}"))),
        }
    }
}

/// One entry of a page's `layout_dets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub category_type: String,
    /// Eight numbers, clockwise from top-left; empty for table-pass entries.
    pub poly: Vec<i32>,
    pub text: String,
    pub score: Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Always the 0-based page index in the document.
    pub page_no: usize,
    pub height: u32,
    pub width: u32,
}

/// Results for one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub layout_dets: Vec<RecognitionResult>,
    pub page_info: PageInfo,
    /// Annotated preview; kept in memory only, written out as an artifact.
    #[serde(skip)]
    pub preview: Option<RgbImage>,
}

/// The canonical persisted record: one [`PageResult`] per page, in page order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentResult {
    pub pages: Vec<PageResult>,
}

impl DocumentResult {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Total `layout_dets` entries across all pages.
    pub fn entry_count(&self) -> usize {
        self.pages.iter().map(|p| p.layout_dets.len()).sum()
    }
}

/// Counters and timings for one processed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_pages: usize,
    /// Regions above the confidence floor across all pages.
    pub regions_detected: usize,
    /// `layout_dets` entries produced by routing (table entries excluded).
    pub entries_emitted: usize,
    /// Text results dropped because the same text already appeared on the page.
    pub duplicates_suppressed: usize,
    pub figures_exported: usize,
    /// Regions dropped by a recognizer failure or timeout.
    pub regions_failed: usize,
    pub tables_merged: usize,
    /// Tables returned for page indices that do not exist.
    pub tables_discarded: usize,
    pub render_duration_ms: u64,
    pub recognition_duration_ms: u64,
    pub table_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything one run produces for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutput {
    pub result: DocumentResult,
    /// Non-fatal failures, in the order they happened.
    pub failures: Vec<PageError>,
    pub stats: ProcessingStats,
}

/// PDF metadata extracted without running any model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DocumentResult {
        DocumentResult {
            pages: vec![PageResult {
                layout_dets: vec![
                    RecognitionResult {
                        category_type: "title".into(),
                        poly: vec![1, 2, 3, 2, 3, 4, 1, 4],
                        text: "Report".into(),
                        score: Score::from(0.5),
                    },
                    RecognitionResult {
                        category_type: "isolated_formula".into(),
                        poly: vec![1, 5, 3, 5, 3, 9, 1, 9],
                        text: "E = mc^2".into(),
                        score: Score::UNSCORED,
                    },
                ],
                page_info: PageInfo {
                    page_no: 0,
                    height: 100,
                    width: 80,
                },
                preview: None,
            }],
        }
    }

    #[test]
    fn serialises_to_interchange_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!([{
                "layout_dets": [
                    {"category_type": "title", "poly": [1,2,3,2,3,4,1,4], "text": "Report", "score": 0.5},
                    {"category_type": "isolated_formula", "poly": [1,5,3,5,3,9,1,9], "text": "E = mc^2", "score": "-"}
                ],
                "page_info": {"page_no": 0, "height": 100, "width": 80}
            }])
        );
    }

    #[test]
    fn parses_editor_output() {
        let json = r#"[{"layout_dets":[
            {"category_type":"table","poly":[],"text":"a\tb\n","score":"-"},
            {"category_type":"plain_text","poly":[0,0,1,0,1,1,0,1],"text":"x","score":0.91}
        ],"page_info":{"page_no":0,"height":10,"width":10}}]"#;
        let doc = DocumentResult::from_json(json).unwrap();
        let dets = &doc.pages[0].layout_dets;
        assert_eq!(dets[0].score, Score::UNSCORED);
        assert_eq!(dets[1].score.value(), Some(0.91));
        assert!(doc.pages[0].preview.is_none());
        assert_eq!(doc.entry_count(), 2);
    }

    #[test]
    fn rejects_garbage_score() {
        let err = serde_json::from_str::<Score>(r#""high""#).unwrap_err();
        assert!(err.to_string().contains("invalid score"));
        assert_eq!(serde_json::from_str::<Score>("null").unwrap(), Score::UNSCORED);
    }
}
