//! Table Merge Stage: whole-document table pass, merged by page index.
//!
//! The table pass is independent of detected regions. It yields one
//! [`Table`] per page, in page order; table `i` is appended to page `i` as a
//! `"table"` entry with an empty polygon and no score. Tables beyond the last
//! page are discarded and pages without a table are left alone.

use crate::document::Document;
use crate::error::TableExtractionError;
use crate::output::{DocumentResult, RecognitionResult, Score};
use crate::pipeline::llm::VlmClient;
use crate::pipeline::postprocess::{clean_text, extract_json};
use crate::prompts::TABLE_EXTRACTION_PROMPT;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const TABLE_CATEGORY: &str = "table";

/// Written for a missing cell.
pub const MISSING_CELL: &str = "nan";

/// A header row plus body rows; `None` cells are missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }

    /// Serialise as tab-separated values: header line, then one line per row.
    ///
    /// Missing cells are `nan`. A field containing a tab, quote or line break
    /// is wrapped in double quotes with inner quotes doubled. Headerless
    /// tables get positional column names `0, 1, …`; short rows are padded
    /// with missing cells. An empty table serialises to an empty string.
    pub fn to_tsv(&self) -> String {
        match self.write_tsv() {
            Ok(text) => text,
            Err(e) => {
                warn!("TSV serialisation failed: {}", e);
                String::new()
            }
        }
    }

    fn write_tsv(&self) -> Result<String, csv::Error> {
        let width = if self.columns.is_empty() {
            self.rows.iter().map(Vec::len).max().unwrap_or(0)
        } else {
            self.columns.len()
        };
        if width == 0 {
            return Ok(String::new());
        }
        let header: Vec<String> = if self.columns.is_empty() {
            (0..width).map(|i| i.to_string()).collect()
        } else {
            self.columns.clone()
        };

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        wtr.write_record(&header)?;
        for row in &self.rows {
            wtr.write_record((0..width).map(|i| match row.get(i) {
                Some(Some(cell)) => cell.as_str(),
                _ => MISSING_CELL,
            }))?;
        }
        let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The result entry appended to a page.
    pub fn to_entry(&self) -> RecognitionResult {
        RecognitionResult {
            category_type: TABLE_CATEGORY.to_string(),
            poly: Vec::new(),
            text: self.to_tsv(),
            score: Score::UNSCORED,
        }
    }
}

/// Whole-document table-extraction capability.
///
/// Runs under the table timeout, which only fires at an `.await`;
/// blocking inference belongs in `tokio::task::spawn_blocking`.
#[async_trait]
pub trait TableExtractor: Send + Sync {
    /// One table per page, in page order.
    async fn extract_tables(&self, document: &Document) -> Result<Vec<Table>, TableExtractionError>;
}

/// Append table `i` to page `i`. Returns `(merged, discarded)`.
pub fn merge_tables(result: &mut DocumentResult, tables: Vec<Table>) -> (usize, usize) {
    let page_count = result.pages.len();
    let mut merged = 0;
    let mut discarded = 0;
    for (i, table) in tables.into_iter().enumerate() {
        match result.pages.get_mut(i) {
            Some(page) => {
                page.layout_dets.push(table.to_entry());
                merged += 1;
            }
            None => discarded += 1,
        }
    }
    if discarded > 0 {
        warn!(
            "Table pass returned {} tables for {} pages; {} discarded",
            merged + discarded,
            page_count,
            discarded
        );
    }
    (merged, discarded)
}

/// Table pass that asks a vision LLM for the main table on each page.
pub struct VlmTableExtractor {
    client: Arc<VlmClient>,
}

impl VlmTableExtractor {
    pub fn new(client: Arc<VlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableExtractor for VlmTableExtractor {
    async fn extract_tables(&self, document: &Document) -> Result<Vec<Table>, TableExtractionError> {
        let mut tables = Vec::with_capacity(document.page_count());
        for page in &document.pages {
            let answer = self
                .client
                .ask(TABLE_EXTRACTION_PROMPT, &page.image)
                .await
                .map_err(|e| TableExtractionError::Backend(format!("page {}: {e}", page.index)))?;
            let table = parse_table(&answer)?;
            debug!(
                "Page {}: table {}x{}",
                page.index,
                table.rows.len(),
                table.columns.len()
            );
            tables.push(table);
        }
        Ok(tables)
    }
}

#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    columns: Vec<Value>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

fn cell(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(clean_text(&s)),
        other => Some(other.to_string()),
    }
}

fn parse_table(answer: &str) -> Result<Table, TableExtractionError> {
    let json = extract_json(answer)
        .ok_or_else(|| TableExtractionError::MalformedResponse("no JSON object in answer".into()))?;
    let raw: RawTable = serde_json::from_str(&json)
        .map_err(|e| TableExtractionError::MalformedResponse(e.to_string()))?;
    Ok(Table {
        columns: raw
            .columns
            .into_iter()
            .map(|c| cell(c).unwrap_or_default())
            .collect(),
        rows: raw
            .rows
            .into_iter()
            .map(|r| r.into_iter().map(cell).collect())
            .collect(),
    })
}
