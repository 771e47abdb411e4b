//! Progress-callback trait for batch conversion events.
//!
//! Inject an `Arc<dyn BatchProgress>` via
//! [`crate::config::EngineConfigBuilder::progress_callback`] to receive events
//! as [`crate::engine::ConversionEngine::batch_convert`] works through a
//! directory.
//!
//! # Example
//!
//! ```rust
//! use docconv::{BatchProgress, EngineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgress for CountingCallback {
//!     fn on_file_complete(&self, file: &str, index: usize, total: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{file} done ({done}/{total})");
//!     }
//! }
//!
//! let config = EngineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the engine as a batch processes each file.
///
/// Files are converted concurrently, so `on_file_start`, `on_file_complete`
/// and `on_file_error` may be called from several tasks at once.
/// Implementations must protect shared mutable state (e.g. `Mutex`,
/// `AtomicUsize`). All methods default to no-ops.
pub trait BatchProgress: Send + Sync {
    /// Called once, after the input directory was listed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file's conversion starts.
    ///
    /// `index` is the file's 0-based position in file-name order.
    fn on_file_start(&self, file: &str, index: usize, total_files: usize) {
        let _ = (file, index, total_files);
    }

    /// Called when a file converted successfully.
    fn on_file_complete(&self, file: &str, index: usize, total_files: usize) {
        let _ = (file, index, total_files);
    }

    /// Called when a file failed.
    fn on_file_error(&self, file: &str, index: usize, total_files: usize, error: &str) {
        let _ = (file, index, total_files, error);
    }

    /// Called once, after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl BatchProgress for NoopProgress {}

/// The type stored in [`crate::config::EngineConfig`].
pub type BatchProgressCallback = Arc<dyn BatchProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        total: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl BatchProgress for TrackingCallback {
        fn on_batch_start(&self, total_files: usize) {
            self.total.store(total_files, Ordering::SeqCst);
        }

        fn on_file_start(&self, _file: &str, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _file: &str, _index: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _file: &str, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgress;
        cb.on_batch_start(2);
        cb.on_file_start("a.md", 0, 2);
        cb.on_file_complete("a.md", 0, 2);
        cb.on_file_error("b.xyz", 1, 2, "unsupported");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(3);
        tracker.on_file_start("a", 0, 3);
        tracker.on_file_complete("a", 0, 3);
        tracker.on_file_start("b", 1, 3);
        tracker.on_file_complete("b", 1, 3);
        tracker.on_file_start("c", 2, 3);
        tracker.on_file_error("c", 2, 3, "boom");
        tracker.on_batch_complete(3, 2);

        assert_eq!(tracker.total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: BatchProgressCallback = Arc::new(NoopProgress);
        cb.on_batch_start(10);
    }
}
