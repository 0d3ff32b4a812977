//! Single-document orchestration: rasterise, detect, route, aggregate, merge.
//!
//! [`DocumentPipeline`] owns the backends for one configuration and can be
//! reused across documents. Pages are processed strictly in order and, within
//! a page, regions strictly in reading order. Only the returned
//! [`ProcessingOutput`] leaves the pipeline; the in-memory [`Document`] is
//! dropped when processing ends.
//!
//! Fatal problems (unsupported type, unreadable file) are `Err`. Everything
//! else degrades: a failed detection yields an empty page, a failed region is
//! dropped, a failed table pass skips the merge, and each is recorded in
//! [`ProcessingOutput::failures`].

use crate::config::PipelineConfig;
use crate::document::{Document, Page};
use crate::error::{DetectionError, LayoutError, PageError, TableExtractionError};
use crate::output::{DocumentMetadata, DocumentResult, ProcessingOutput, ProcessingStats};
use crate::pipeline::aggregate::{reading_order, PageAggregator};
use crate::pipeline::annotate::{annotate_page, load_font};
use crate::pipeline::detect::{resolve_regions, LayoutDetector, VlmLayoutDetector};
use crate::pipeline::encode::encode_png;
use crate::pipeline::input::{self, InputKind};
use crate::pipeline::llm::VlmClient;
use crate::pipeline::recognize::{
    FormulaRecognizer, TextRecognizer, VlmFormulaRecognizer, VlmTextRecognizer,
};
use crate::pipeline::render;
use crate::pipeline::route::{panic_message, RegionRouter};
use crate::pipeline::tables::{merge_tables, TableExtractor, VlmTableExtractor};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::storage::{atomic_write, validate_key, ArtifactStore, FsArtifactStore};
use ab_glyph::FontVec;
use futures::FutureExt;
use image::RgbImage;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Artifact name for a page preview; `page_no` is 0-based, the name is 1-based.
pub fn preview_artifact_name(stem: &str, page_no: usize) -> String {
    format!("{stem}/page_{}_annotated.png", page_no + 1)
}

/// Runs the full layout pipeline over documents.
///
/// # Example
/// ```rust,no_run
/// use edgequake_layout::{DocumentPipeline, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = DocumentPipeline::from_config(PipelineConfig::default())?;
/// let output = pipeline.process_path("report.pdf").await?;
/// println!("{}", output.result.to_json_pretty()?);
/// # Ok(())
/// # }
/// ```
pub struct DocumentPipeline {
    config: PipelineConfig,
    detector: Arc<dyn LayoutDetector>,
    router: RegionRouter,
    tables: Option<Arc<dyn TableExtractor>>,
    artifacts: Arc<dyn ArtifactStore>,
    progress: ProgressCallback,
    font: Option<FontVec>,
}

impl DocumentPipeline {
    pub fn builder(config: PipelineConfig) -> DocumentPipelineBuilder {
        DocumentPipelineBuilder {
            config,
            detector: None,
            text: None,
            formula: None,
            tables: None,
            artifacts: None,
            progress: None,
        }
    }

    /// Vision-LLM backends for every stage and a filesystem artifact store.
    pub fn from_config(config: PipelineConfig) -> Result<Self, LayoutError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classify, rasterise and process the file at `path`.
    pub async fn process_path(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ProcessingOutput, LayoutError> {
        let path = path.as_ref();
        info!("Processing {}", path.display());

        let input = input::resolve_input(path)?;
        let render_start = Instant::now();
        let document = render::load_document(&input, &self.config).await?;
        let render_ms = render_start.elapsed().as_millis() as u64;
        info!(
            "Rasterised {} pages in {}ms",
            document.page_count(),
            render_ms
        );

        let mut output = self.process_document(document).await;
        output.stats.render_duration_ms = render_ms;
        output.stats.total_duration_ms += render_ms;
        Ok(output)
    }

    /// Process an already rasterised document.
    ///
    /// Always returns one page entry per page, with `page_no` equal to the
    /// page's index.
    pub async fn process_document(&self, mut document: Document) -> ProcessingOutput {
        let start = Instant::now();
        let stem = document.stem();
        let total_pages = document.page_count();
        self.progress.on_document_start(document.source(), total_pages);

        let mut stats = ProcessingStats {
            total_pages,
            ..Default::default()
        };
        let mut failures = Vec::new();
        let mut pages = Vec::with_capacity(total_pages);

        let recognition_start = Instant::now();
        for page in &mut document.pages {
            let detection = self.detect(page).await;
            let page = &*page;
            stats.regions_detected += page.regions.len();

            let mut agg = PageAggregator::new(page);
            if let Err(err) = detection {
                agg.record_failure(err);
            }

            for idx in reading_order(&page.regions) {
                let region = &page.regions[idx];
                let outcome = self.router.route(page, region, &stem).await;
                agg.push(region.class, outcome);
            }

            let preview = if self.config.save_previews {
                let preview = annotate_page(
                    &page.image,
                    &page.regions,
                    &self.config.annotation,
                    self.font.as_ref(),
                );
                if let Err(err) = self.write_preview(&stem, page.index, &preview).await {
                    agg.record_failure(err);
                }
                Some(preview)
            } else {
                None
            };

            let (page_result, page_failures, tally) = agg.finish(preview);
            debug!(
                "Page {}: {} entries, {} duplicates, {} figures, {} failed regions",
                page.index,
                page_result.layout_dets.len(),
                tally.duplicates_suppressed,
                tally.figures_exported,
                tally.regions_failed
            );
            stats.entries_emitted += tally.entries_emitted;
            stats.duplicates_suppressed += tally.duplicates_suppressed;
            stats.figures_exported += tally.figures_exported;
            stats.regions_failed += tally.regions_failed;
            failures.extend(page_failures);

            self.progress.on_page_complete(
                page.index + 1,
                total_pages,
                page_result.layout_dets.len(),
            );
            pages.push(page_result);
        }
        stats.recognition_duration_ms = recognition_start.elapsed().as_millis() as u64;

        let mut result = DocumentResult { pages };

        if let Some(extractor) = &self.tables {
            let table_start = Instant::now();
            let secs = self.config.table_timeout_secs;
            let pass = AssertUnwindSafe(extractor.extract_tables(&document)).catch_unwind();
            let extracted = match tokio::time::timeout(Duration::from_secs(secs), pass).await {
                Ok(Ok(r)) => r,
                Ok(Err(payload)) => Err(TableExtractionError::Backend(format!(
                    "extractor panicked: {}",
                    panic_message(payload.as_ref())
                ))),
                Err(_) => Err(TableExtractionError::Timeout { secs }),
            };
            match extracted {
                Ok(tables) => {
                    let (merged, discarded) = merge_tables(&mut result, tables);
                    stats.tables_merged = merged;
                    stats.tables_discarded = discarded;
                }
                Err(e) => {
                    let err = PageError::TableExtraction {
                        detail: e.to_string(),
                    };
                    warn!("{}", err);
                    failures.push(err);
                }
            }
            stats.table_duration_ms = table_start.elapsed().as_millis() as u64;
        }

        stats.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Processed {}: {} pages, {} entries, {} tables, {} failures in {}ms",
            document.source().display(),
            stats.total_pages,
            result.entry_count(),
            stats.tables_merged,
            failures.len(),
            stats.total_duration_ms
        );

        ProcessingOutput {
            result,
            failures,
            stats,
        }
    }

    /// Process `input` and write the JSON result to `output_path` atomically.
    pub async fn process_to_file(
        &self,
        input: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
    ) -> Result<ProcessingStats, LayoutError> {
        let output = self.process_path(input).await?;
        let path = output_path.as_ref();
        let json = output
            .result
            .to_json_pretty()
            .map_err(|e| LayoutError::Internal(format!("serialise result: {e}")))?;
        atomic_write(path, json.as_bytes())
            .await
            .map_err(|source| LayoutError::OutputWriteFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(output.stats)
    }

    /// Process an in-memory file named `filename` (its extension decides the
    /// media type) via a managed temp directory.
    pub async fn process_from_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ProcessingOutput, LayoutError> {
        validate_key(filename)?;
        let dir = tempfile::tempdir().map_err(|e| LayoutError::Internal(format!("tempdir: {e}")))?;
        let path = dir.path().join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| LayoutError::Internal(format!("tempfile write: {e}")))?;
        // `dir` is removed when it drops after processing.
        self.process_path(&path).await
    }

    async fn detect(&self, page: &mut Page) -> Result<(), PageError> {
        let secs = self.config.detection_timeout_secs;
        let pass = AssertUnwindSafe(self.detector.detect(page)).catch_unwind();
        let detected = match tokio::time::timeout(Duration::from_secs(secs), pass).await {
            Ok(Ok(r)) => r,
            Ok(Err(payload)) => Err(DetectionError::Backend(format!(
                "detector panicked: {}",
                panic_message(payload.as_ref())
            ))),
            Err(_) => Err(DetectionError::Timeout { secs }),
        };
        match detected {
            Ok(raw) => {
                let raw_count = raw.len();
                page.regions = resolve_regions(
                    raw,
                    self.config.confidence_floor,
                    page.width(),
                    page.height(),
                );
                debug!(
                    "Page {}: {} of {} detections kept",
                    page.index,
                    page.regions.len(),
                    raw_count
                );
                Ok(())
            }
            Err(e) => {
                page.regions.clear();
                let err = PageError::Detection {
                    page: page.index,
                    detail: e.to_string(),
                };
                warn!("{}", err);
                Err(err)
            }
        }
    }

    async fn write_preview(
        &self,
        stem: &str,
        page_no: usize,
        preview: &RgbImage,
    ) -> Result<(), PageError> {
        let name = preview_artifact_name(stem, page_no);
        let written = match encode_png(preview) {
            Ok(png) => self
                .artifacts
                .write_artifact(&name, png)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        written.map(|_| ()).map_err(|detail| {
            let err = PageError::Artifact { name, detail };
            warn!("{}", err);
            err
        })
    }
}

/// Builder for [`DocumentPipeline`]. Any backend left unset falls back to the
/// vision-LLM implementation, resolved once from the config's provider chain.
pub struct DocumentPipelineBuilder {
    config: PipelineConfig,
    detector: Option<Arc<dyn LayoutDetector>>,
    text: Option<Arc<dyn TextRecognizer>>,
    formula: Option<Arc<dyn FormulaRecognizer>>,
    tables: Option<Arc<dyn TableExtractor>>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    progress: Option<ProgressCallback>,
}

impl DocumentPipelineBuilder {
    pub fn detector(mut self, detector: Arc<dyn LayoutDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn text_recognizer(mut self, text: Arc<dyn TextRecognizer>) -> Self {
        self.text = Some(text);
        self
    }

    pub fn formula_recognizer(mut self, formula: Arc<dyn FormulaRecognizer>) -> Self {
        self.formula = Some(formula);
        self
    }

    /// Ignored when `extract_tables` is off in the config.
    pub fn table_extractor(mut self, tables: Arc<dyn TableExtractor>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn artifact_store(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn progress_callback(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> Result<DocumentPipeline, LayoutError> {
        let mut vlm = LazyClient {
            config: &self.config,
            client: None,
        };

        let detector = match self.detector {
            Some(d) => d,
            None => Arc::new(VlmLayoutDetector::new(vlm.get()?)),
        };
        let text = match self.text {
            Some(t) => t,
            None => Arc::new(VlmTextRecognizer::new(vlm.get()?)),
        };
        let formula = match self.formula {
            Some(f) => f,
            None => Arc::new(VlmFormulaRecognizer::new(vlm.get()?)),
        };
        let tables = match (self.config.extract_tables, self.tables) {
            (false, _) => None,
            (true, Some(t)) => Some(t),
            (true, None) => {
                let extractor: Arc<dyn TableExtractor> =
                    Arc::new(VlmTableExtractor::new(vlm.get()?));
                Some(extractor)
            }
        };
        let artifacts = self
            .artifacts
            .unwrap_or_else(|| Arc::new(FsArtifactStore::new(self.config.artifact_dir.clone())));
        let font = self
            .config
            .annotation
            .font_path
            .as_deref()
            .and_then(load_font);

        let router = RegionRouter::new(
            text,
            formula,
            Arc::clone(&artifacts),
            Duration::from_secs(self.config.region_timeout_secs),
        );

        Ok(DocumentPipeline {
            config: self.config,
            detector,
            router,
            tables,
            artifacts,
            progress: self
                .progress
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
            font,
        })
    }
}

/// Resolves the provider only if some backend actually needs it.
struct LazyClient<'a> {
    config: &'a PipelineConfig,
    client: Option<Arc<VlmClient>>,
}

impl LazyClient<'_> {
    fn get(&mut self) -> Result<Arc<VlmClient>, LayoutError> {
        if let Some(client) = &self.client {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(VlmClient::from_config(self.config)?);
        self.client = Some(Arc::clone(&client));
        Ok(client)
    }
}

/// Extract document metadata without running any model.
///
/// Raster images report a single page and no PDF fields.
pub async fn inspect(
    path: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentMetadata, LayoutError> {
    match input::resolve_input(path.as_ref())? {
        InputKind::Pdf(pdf) => render::extract_metadata(&pdf, password).await,
        InputKind::Image(_) => Ok(DocumentMetadata {
            page_count: 1,
            ..Default::default()
        }),
    }
}
