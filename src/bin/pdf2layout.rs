//! CLI binary for edgequake-layout.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one document or a batch, and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_layout::{
    inspect, AnnotationStyle, BatchRunner, DocumentPipeline, FileStatus, FsResultStore,
    LayoutProgressCallback, PipelineConfig, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar counting pages (single document) or files (batch).
struct CliProgressCallback {
    bar: ProgressBar,
    unit: &'static str,
}

impl CliProgressCallback {
    fn new(unit: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening input…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar, unit })
    }

    fn activate_bar(&self, total: usize, prefix: &'static str) {
        let template = format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}",
            self.unit
        );
        let progress_style = ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix(prefix);
        self.bar.reset_eta();
    }
}

impl LayoutProgressCallback for CliProgressCallback {
    fn on_document_start(&self, path: &Path, total_pages: usize) {
        self.activate_bar(total_pages, "Analysing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{} ({total_pages} pages)", path.display()))
        ));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, entries: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{entries:>3} entries")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files, "Batch");
    }

    fn on_file_processed(&self, _processed: usize, _total_files: usize, path: &Path) {
        self.bar.set_message(path.display().to_string());
        self.bar.inc(1);
    }

    fn on_file_failed(&self, path: &Path, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), path.display(), red(&msg)));
    }

    fn on_batch_finished(&self, processed: usize, failed: usize, cancelled: bool) {
        self.bar.finish_and_clear();
        let mark = if cancelled || failed > 0 {
            cyan("⚠")
        } else {
            green("✔")
        };
        eprintln!(
            "{} {} files processed  ({} failed{})",
            mark,
            bold(&processed.to_string()),
            failed,
            if cancelled { ", cancelled" } else { "" }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Layout JSON for one document (stdout)
  pdf2layout report.pdf

  # Write to a file, previews and figures under ./artifacts
  pdf2layout report.pdf -o report.json

  # Batch into a result store, two files at a time
  pdf2layout --store results --project q3 -c 2 a.pdf b.pdf scan.png

  # Skip the table pass and previews
  pdf2layout --no-tables --no-previews report.pdf

  # Use a specific model
  pdf2layout --model gpt-4.1 --provider openai report.pdf

  # Inspect PDF metadata (no API key needed)
  pdf2layout --inspect-only report.pdf

SUPPORTED INPUTS:
  .pdf (rasterised page by page), .png .jpg .jpeg (one page)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise ./ or the system library)
"#;

/// Detect layout regions in PDFs and images and recognise their content.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2layout",
    version,
    about = "Layout analysis and recognition for PDFs and images using Vision LLMs",
    long_about = "Rasterise documents, detect layout regions (titles, text, formulas, figures, \
tables), recognise each region and emit the page-ordered layout JSON consumed by the editor.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF or image files.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Write the layout JSON to this file (single input only).
    #[arg(short, long, env = "PDF2LAYOUT_OUTPUT")]
    output: Option<PathBuf>,

    /// Result store directory; results go to <store>/<project>/<file>.json.
    #[arg(long, env = "PDF2LAYOUT_STORE")]
    store: Option<PathBuf>,

    /// Project key inside the result store.
    #[arg(long, env = "PDF2LAYOUT_PROJECT", default_value = "default")]
    project: String,

    /// Directory for annotated previews and figure crops.
    #[arg(long, env = "PDF2LAYOUT_ARTIFACTS", default_value = "artifacts")]
    artifacts_dir: PathBuf,

    /// Rasterisation scale factor (0.5–6.0).
    #[arg(long, env = "PDF2LAYOUT_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Maximum rendered edge in pixels.
    #[arg(long, env = "PDF2LAYOUT_MAX_PIXELS", default_value_t = 6000)]
    max_pixels: u32,

    /// Detection confidence floor (0–1).
    #[arg(long, env = "PDF2LAYOUT_CONF", default_value_t = 0.25)]
    conf: f32,

    /// Skip the whole-document table pass.
    #[arg(long, env = "PDF2LAYOUT_NO_TABLES")]
    no_tables: bool,

    /// Do not write annotated page previews.
    #[arg(long, env = "PDF2LAYOUT_NO_PREVIEWS")]
    no_previews: bool,

    /// TrueType font for preview labels.
    #[arg(long, env = "PDF2LAYOUT_FONT")]
    font: Option<PathBuf>,

    /// Per-region recognizer timeout in seconds.
    #[arg(long, env = "PDF2LAYOUT_REGION_TIMEOUT", default_value_t = 60)]
    region_timeout: u64,

    /// Per-page detection timeout in seconds.
    #[arg(long, env = "PDF2LAYOUT_DETECTION_TIMEOUT", default_value_t = 120)]
    detection_timeout: u64,

    /// Table pass timeout in seconds.
    #[arg(long, env = "PDF2LAYOUT_TABLE_TIMEOUT", default_value_t = 300)]
    table_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2LAYOUT_PASSWORD")]
    password: Option<String>,

    /// Vision model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDF2LAYOUT_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2LAYOUT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per LLM call.
    #[arg(long, env = "PDF2LAYOUT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Files processed at once in batch mode.
    #[arg(short, long, env = "PDF2LAYOUT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Print run statistics / batch report as JSON on stdout.
    #[arg(long, env = "PDF2LAYOUT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2LAYOUT_NO_PROGRESS")]
    no_progress: bool,

    /// Print document metadata only, no analysis.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2LAYOUT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2LAYOUT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs are suppressed while the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for input in &cli.inputs {
            let meta = inspect(input, cli.password.as_deref())
                .await
                .with_context(|| format!("Failed to inspect {}", input.display()))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
            } else {
                println!("File:         {}", input.display());
                if let Some(ref t) = meta.title {
                    println!("Title:        {}", t);
                }
                if let Some(ref a) = meta.author {
                    println!("Author:       {}", a);
                }
                if let Some(ref s) = meta.subject {
                    println!("Subject:      {}", s);
                }
                println!("Pages:        {}", meta.page_count);
                if !meta.pdf_version.is_empty() {
                    println!("PDF Version:  {}", meta.pdf_version);
                }
                if let Some(ref p) = meta.producer {
                    println!("Producer:     {}", p);
                }
                if let Some(ref c) = meta.creator {
                    println!("Creator:      {}", c);
                }
            }
        }
        return Ok(());
    }

    let batch_mode = cli.inputs.len() > 1 || cli.store.is_some();
    if batch_mode && cli.output.is_some() {
        bail!("--output takes a single input; use --store for batches");
    }

    let config = build_config(&cli)?;
    let progress: Option<Arc<CliProgressCallback>> = show_progress
        .then(|| CliProgressCallback::new(if batch_mode { "files" } else { "pages" }));

    let mut builder = DocumentPipeline::builder(config);
    if let (false, Some(cb)) = (batch_mode, &progress) {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }
    let pipeline = builder.build().context("Failed to set up pipeline")?;

    if batch_mode {
        run_batch(&cli, pipeline, progress).await
    } else {
        run_single(&cli, &pipeline, progress).await
    }
}

async fn run_single(
    cli: &Cli,
    pipeline: &DocumentPipeline,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<()> {
    let input = &cli.inputs[0];
    let output = pipeline
        .process_path(input)
        .await
        .with_context(|| format!("Processing {} failed", input.display()))?;
    if let Some(cb) = &progress {
        cb.bar.finish_and_clear();
    }

    if let Some(ref output_path) = cli.output {
        let json = output
            .result
            .to_json_pretty()
            .context("Failed to serialise result")?;
        let tmp = output_path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, output_path))
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
    } else if !cli.json {
        let json = output
            .result
            .to_json_pretty()
            .context("Failed to serialise result")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    }

    if cli.json {
        let json =
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        let s = &output.stats;
        let mark = if output.failures.is_empty() {
            green("✔")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{}  {} pages  {} entries  {} figures  {} tables  {}ms{}",
            mark,
            s.total_pages,
            output.result.entry_count(),
            s.figures_exported,
            s.tables_merged,
            s.total_duration_ms,
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
        for failure in &output.failures {
            eprintln!("   {} {}", red("✗"), dim(&failure.to_string()));
        }
    }
    Ok(())
}

async fn run_batch(
    cli: &Cli,
    pipeline: DocumentPipeline,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<()> {
    let store_dir = cli.store.clone().unwrap_or_else(|| PathBuf::from("results"));
    let mut runner = BatchRunner::new(Arc::new(pipeline))
        .result_store(Arc::new(FsResultStore::new(&store_dir)), cli.project.clone())
        .concurrency(cli.concurrency);
    if let Some(cb) = progress {
        runner = runner.progress_callback(cb as ProgressCallback);
    }

    // Ctrl-C stops the batch before the next file starts.
    let cancel = runner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = runner.run(cli.inputs.clone()).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        for file in &report.files {
            match &file.status {
                FileStatus::Succeeded { stats, failures } => eprintln!(
                    "  {} {}  {} pages  {} failures  {}ms",
                    green("✓"),
                    file.path.display(),
                    stats.total_pages,
                    failures.len(),
                    stats.total_duration_ms
                ),
                FileStatus::Failed { error } => {
                    eprintln!("  {} {}  {}", red("✗"), file.path.display(), red(error))
                }
                FileStatus::Cancelled => {
                    eprintln!("  {} {}  cancelled", dim("-"), file.path.display())
                }
            }
        }
        eprintln!(
            "Results in {}",
            bold(&store_dir.join(&cli.project).display().to_string())
        );
    }

    if report.failed > 0 && report.succeeded == 0 {
        bail!("all {} files failed", report.failed);
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let annotation = AnnotationStyle {
        font_path: cli.font.clone(),
        ..Default::default()
    };

    let mut builder = PipelineConfig::builder()
        .scale_factor(cli.scale)
        .max_rendered_pixels(cli.max_pixels)
        .confidence_floor(cli.conf)
        .region_timeout_secs(cli.region_timeout)
        .detection_timeout_secs(cli.detection_timeout)
        .table_timeout_secs(cli.table_timeout)
        .extract_tables(!cli.no_tables)
        .save_previews(!cli.no_previews)
        .artifact_dir(cli.artifacts_dir.clone())
        .annotation(annotation)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }

    builder.build().context("Invalid configuration")
}
