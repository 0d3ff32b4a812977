//! # edgequake-layout
//!
//! Turn PDFs and page images into structured, editable layout records.
//!
//! ## Why this crate?
//!
//! Plain text extraction loses what a page *looks like*: which block is a
//! title, where a formula sits, which crop is a figure. This crate rasterises
//! every page, detects its layout regions, recognises each region with the
//! right backend (text OCR, formula OCR, figure export, table extraction) and
//! emits one JSON record per page that a reviewer can correct and save back.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Input      classify by extension, check %PDF magic
//!  ├─ 2. Render     rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Detect     region boxes + class ids, confidence floor
//!  ├─ 4. Route      text → OCR, formula → LaTeX, figure → PNG artifact
//!  ├─ 5. Aggregate  reading order, duplicate-text suppression
//!  ├─ 6. Tables     whole-document pass merged per page as TSV
//!  └─ 7. Output     DocumentResult JSON + annotated previews
//! ```
//!
//! Every model-backed stage sits behind a trait ([`LayoutDetector`],
//! [`TextRecognizer`], [`FormulaRecognizer`], [`TableExtractor`]). The
//! defaults call a vision LLM through `edgequake-llm`; tests and embedders
//! can plug in their own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_layout::{DocumentPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let pipeline = DocumentPipeline::from_config(PipelineConfig::default())?;
//!     let output = pipeline.process_path("document.pdf").await?;
//!     println!("{}", output.result.to_json_pretty()?);
//!     eprintln!("{} pages, {} failures", output.stats.total_pages, output.failures.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2layout` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-layout = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod labels;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchReport, BatchRunner, FileReport, FileStatus};
pub use config::{AnnotationStyle, PipelineConfig, PipelineConfigBuilder};
pub use document::{BoundingBox, Document, Page, Region};
pub use error::{
    DetectionError, DocumentOpenError, LayoutError, PageError, RegionError, StoreError,
    TableExtractionError,
};
pub use labels::{RegionClass, CLASS_LABELS};
pub use output::{
    DocumentMetadata, DocumentResult, PageInfo, PageResult, ProcessingOutput, ProcessingStats,
    RecognitionResult, Score,
};
pub use pipeline::detect::{LayoutDetector, RawDetection};
pub use pipeline::recognize::{FormulaRecognizer, TextLine, TextRecognizer};
pub use pipeline::tables::{Table, TableExtractor};
pub use process::{inspect, DocumentPipeline, DocumentPipelineBuilder};
pub use progress::{LayoutProgressCallback, NoopProgressCallback, ProgressCallback};
pub use storage::{
    ArtifactStore, FsArtifactStore, FsResultStore, MemoryArtifactStore, ResultStore,
};
