//! The closed set of layout classes and the class-id lookup table.
//!
//! The detector emits integer class ids. [`CLASS_LABELS`] maps the ten known
//! ids to a [`RegionClass`]; anything outside the table resolves to
//! [`RegionClass::Unknown`] instead of failing, because the table can trail
//! the model's class count.
//!
//! [`RegionClass::route`] is an exhaustive match: adding a variant does not
//! compile until it has been given a [`Route`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Class ids `0..=9` in detector order. Immutable for the life of the process.
pub const CLASS_LABELS: [RegionClass; 10] = [
    RegionClass::Title,
    RegionClass::PlainText,
    RegionClass::AbandonedText,
    RegionClass::Figure,
    RegionClass::FigureCaption,
    RegionClass::Table,
    RegionClass::TableCaption,
    RegionClass::TableFootnote,
    RegionClass::IsolatedFormula,
    RegionClass::FormulaCaption,
];

/// A detected layout element's class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionClass {
    Title,
    PlainText,
    AbandonedText,
    Figure,
    FigureCaption,
    Table,
    TableCaption,
    TableFootnote,
    IsolatedFormula,
    FormulaCaption,
    /// Any class id outside [`CLASS_LABELS`].
    Unknown,
}

/// Which recognizer capability a region is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Crop, run text OCR, emit joined lines with the best line confidence.
    TextOcr,
    /// Crop, run formula recognition, emit LaTeX with no score.
    FormulaOcr,
    /// Crop and write to the artifact store; no result entry.
    FigureExport,
    /// Tables come from the whole-document table pass, not from the region.
    DeferredToTablePass,
    /// No recognizer; the region is dropped.
    Drop,
}

impl RegionClass {
    /// Resolve a detector class id through [`CLASS_LABELS`].
    pub fn from_class_id(id: i64) -> Self {
        usize::try_from(id)
            .ok()
            .and_then(|i| CLASS_LABELS.get(i).copied())
            .unwrap_or(RegionClass::Unknown)
    }

    /// The class id of a known class; `None` for [`RegionClass::Unknown`].
    pub fn class_id(self) -> Option<usize> {
        CLASS_LABELS.iter().position(|c| *c == self)
    }

    /// Human-readable label as drawn on previews, e.g. `"Plain Text"`.
    pub fn display_name(self) -> &'static str {
        match self {
            RegionClass::Title => "Title",
            RegionClass::PlainText => "Plain Text",
            RegionClass::AbandonedText => "Abandoned Text",
            RegionClass::Figure => "Figure",
            RegionClass::FigureCaption => "Figure Caption",
            RegionClass::Table => "Table",
            RegionClass::TableCaption => "Table Caption",
            RegionClass::TableFootnote => "Table Footnote",
            RegionClass::IsolatedFormula => "Isolated Formula",
            RegionClass::FormulaCaption => "Formula Caption",
            RegionClass::Unknown => "Unknown",
        }
    }

    /// Lowercase, space→underscore form used as `category_type` in results.
    pub fn category_type(self) -> String {
        self.display_name().to_lowercase().replace(' ', "_")
    }

    pub fn route(self) -> Route {
        match self {
            RegionClass::Title
            | RegionClass::PlainText
            | RegionClass::AbandonedText
            | RegionClass::FigureCaption
            | RegionClass::TableCaption
            | RegionClass::TableFootnote
            | RegionClass::FormulaCaption => Route::TextOcr,
            RegionClass::IsolatedFormula => Route::FormulaOcr,
            RegionClass::Figure => Route::FigureExport,
            RegionClass::Table => Route::DeferredToTablePass,
            RegionClass::Unknown => Route::Drop,
        }
    }

    /// True for classes whose results take part in per-page text dedup.
    pub fn is_text_bearing(self) -> bool {
        self.route() == Route::TextOcr
    }
}

impl fmt::Display for RegionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
