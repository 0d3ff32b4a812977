//! Progress-callback trait for page and batch events.
//!
//! Pass an [`Arc<dyn LayoutProgressCallback>`] to
//! [`crate::process::DocumentPipeline`] or [`crate::batch::BatchRunner`] to
//! receive events as work completes. Callers can forward them to a channel,
//! a server-sent-event stream or a terminal progress bar without the library
//! knowing how the host communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_layout::LayoutProgressCallback;
//! use std::path::Path;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl LayoutProgressCallback for Counter {
//!     fn on_file_processed(&self, processed: usize, total: usize, path: &Path) {
//!         self.0.store(processed, Ordering::SeqCst);
//!         eprintln!("{processed}/{total}: {}", path.display());
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline and the batch driver as work completes.
///
/// All methods have default no-op implementations. With batch concurrency
/// above one, file-level events may arrive from different tasks, but
/// `processed` counts passed to [`Self::on_file_processed`] are always
/// strictly increasing.
pub trait LayoutProgressCallback: Send + Sync {
    /// Called once before the first page of a document is detected.
    fn on_document_start(&self, path: &Path, total_pages: usize) {
        let _ = (path, total_pages);
    }

    /// Called after a page has been aggregated.
    ///
    /// `page_num` is 1-indexed; `entries` is the page's `layout_dets` length
    /// before tables are merged.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, entries: usize) {
        let _ = (page_num, total_pages, entries);
    }

    /// Called once before a batch starts.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called after each file succeeds or fails; `processed` counts both.
    fn on_file_processed(&self, processed: usize, total_files: usize, path: &Path) {
        let _ = (processed, total_files, path);
    }

    /// Called when a file fails fatally; siblings keep going.
    fn on_file_failed(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// Terminal event. `cancelled` is true if the batch stopped early.
    fn on_batch_finished(&self, processed: usize, failed: usize, cancelled: bool) {
        let _ = (processed, failed, cancelled);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl LayoutProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn LayoutProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        processed: Mutex<Vec<usize>>,
        failed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl LayoutProgressCallback for TrackingCallback {
        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _entries: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_processed(&self, processed: usize, _total_files: usize, _path: &Path) {
            self.processed.lock().unwrap().push(processed);
        }

        fn on_file_failed(&self, _path: &Path, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_finished(&self, processed: usize, _failed: usize, _cancelled: bool) {
            self.finished.store(processed, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_start(Path::new("a.pdf"), 3);
        cb.on_page_complete(1, 3, 12);
        cb.on_batch_start(2);
        cb.on_file_processed(1, 2, Path::new("a.pdf"));
        cb.on_file_failed(Path::new("b.pdf"), "boom");
        cb.on_batch_finished(2, 1, false);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_page_complete(1, 2, 5);
        tracker.on_page_complete(2, 2, 0);
        tracker.on_file_processed(1, 2, Path::new("a.pdf"));
        tracker.on_file_failed(Path::new("b.pdf"), "corrupt");
        tracker.on_file_processed(2, 2, Path::new("b.pdf"));
        tracker.on_batch_finished(2, 1, false);

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(*tracker.processed.lock().unwrap(), vec![1, 2]);
        assert_eq!(tracker.failed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
    }
}
