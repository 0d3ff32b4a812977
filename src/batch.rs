//! Batch driver: many files through one [`DocumentPipeline`].
//!
//! Files run with bounded concurrency (sequential by default). Each finished
//! file bumps a processed counter that only ever increases, whether the file
//! succeeded or failed; a fatal error or panic in one file never stops its
//! siblings.
//! Results are persisted through an optional [`ResultStore`] keyed by
//! `(project, file name)`.
//!
//! Cancellation is cooperative: set the flag from [`BatchRunner::cancel_flag`]
//! and files that have not started yet are skipped. A file already in flight
//! runs to completion.

use crate::error::PageError;
use crate::output::ProcessingStats;
use crate::pipeline::route::panic_message;
use crate::process::DocumentPipeline;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::storage::ResultStore;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Outcome of one file in a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded {
        stats: ProcessingStats,
        failures: Vec<PageError>,
    },
    Failed {
        error: String,
    },
    /// Not started because the batch was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Summary of a batch run, files in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
    pub files: Vec<FileReport>,
}

pub struct BatchRunner {
    pipeline: Arc<DocumentPipeline>,
    store: Option<Arc<dyn ResultStore>>,
    project: String,
    concurrency: usize,
    progress: ProgressCallback,
    cancel: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<DocumentPipeline>) -> Self {
        Self {
            pipeline,
            store: None,
            project: "default".to_string(),
            concurrency: 1,
            progress: Arc::new(NoopProgressCallback),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Persist each result under `project`.
    pub fn result_store(mut self, store: Arc<dyn ResultStore>, project: impl Into<String>) -> Self {
        self.store = Some(store);
        self.project = project.into();
        self
    }

    /// Files processed at once. Clamped to 1–32.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.clamp(1, 32);
        self
    }

    pub fn progress_callback(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Set to `true` to stop before the next file starts.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub async fn run(&self, paths: Vec<PathBuf>) -> BatchReport {
        let start = Instant::now();
        let total = paths.len();
        info!(
            "Batch of {} files, concurrency {}",
            total, self.concurrency
        );
        self.progress.on_batch_start(total);

        let mut report = BatchReport::default();
        let mut outcomes = stream::iter(paths)
            .map(|path| async move {
                if self.cancel.load(Ordering::SeqCst) {
                    return FileReport {
                        path,
                        status: FileStatus::Cancelled,
                    };
                }
                let status = self.process_one(&path).await;
                FileReport { path, status }
            })
            .buffered(self.concurrency);

        while let Some(file) = outcomes.next().await {
            match &file.status {
                FileStatus::Succeeded { .. } => report.succeeded += 1,
                FileStatus::Failed { error } => {
                    report.failed += 1;
                    self.progress.on_file_failed(&file.path, error);
                }
                FileStatus::Cancelled => {
                    report.cancelled = true;
                    report.files.push(file);
                    continue;
                }
            }
            report.processed += 1;
            self.progress
                .on_file_processed(report.processed, total, &file.path);
            report.files.push(file);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        if report.cancelled {
            warn!(
                "Batch cancelled after {} of {} files",
                report.processed, total
            );
        }
        info!(
            "Batch finished: {} succeeded, {} failed in {}ms",
            report.succeeded, report.failed, report.duration_ms
        );
        self.progress
            .on_batch_finished(report.processed, report.failed, report.cancelled);
        report
    }

    async fn process_one(&self, path: &Path) -> FileStatus {
        let run = AssertUnwindSafe(self.pipeline.process_path(path)).catch_unwind();
        let output = match run.await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("{}: {}", path.display(), e);
                return FileStatus::Failed {
                    error: e.to_string(),
                };
            }
            Err(payload) => {
                let error = format!("panicked: {}", panic_message(payload.as_ref()));
                error!("{}: {}", path.display(), error);
                return FileStatus::Failed { error };
            }
        };

        if let Some(store) = &self.store {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Err(e) = store.save(&self.project, &filename, &output.result).await {
                error!("{}: result not saved: {}", path.display(), e);
                return FileStatus::Failed {
                    error: e.to_string(),
                };
            }
        }

        FileStatus::Succeeded {
            stats: output.stats,
            failures: output.failures,
        }
    }
}
