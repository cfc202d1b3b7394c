//! Progress reporting and cooperative cancellation.
//!
//! A [`ProgressDelegate`] receives the archive path of the item being
//! processed and a completion fraction in `[0.0, 1.0]`. Calls are
//! serialized per engine, the fraction is globally non-decreasing across
//! one operation, and `1.0` is always reported at normal completion. The
//! delegate may be invoked from a codec worker thread; it must not block
//! for long and must not call back into the engine.
//!
//! ```rust
//! use lzarch::progress_fn;
//!
//! let delegate = progress_fn(|path, fraction| {
//!     println!("{path}: {:.0}%", fraction * 100.0);
//! });
//! # let _ = delegate;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Delegate receiving progress reports from an engine operation.
pub trait ProgressDelegate: Send {
    /// Called with the current item's archive path and the overall
    /// completion fraction in `[0.0, 1.0]`.
    fn on_progress(&mut self, path: &str, fraction: f64);
}

struct FnDelegate<F>(F);

impl<F: FnMut(&str, f64) + Send> ProgressDelegate for FnDelegate<F> {
    fn on_progress(&mut self, path: &str, fraction: f64) {
        (self.0)(path, fraction);
    }
}

/// Wraps a closure into a boxed [`ProgressDelegate`].
pub fn progress_fn<F: FnMut(&str, f64) + Send + 'static>(f: F) -> Box<dyn ProgressDelegate> {
    Box::new(FnDelegate(f))
}

/// Cloneable handle that requests cancellation of a running operation.
///
/// Obtained from [`Decoder::abort_handle`] or [`Encoder::abort_handle`]
/// before starting the operation; safe to trigger from any thread. The
/// running call observes the request at the next buffered copy and
/// returns `false`.
///
/// [`Decoder::abort_handle`]: crate::Decoder::abort_handle
/// [`Encoder::abort_handle`]: crate::Encoder::abort_handle
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Creates a fresh, unsignalled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub(crate) fn check(&self) -> crate::Result<()> {
        if self.is_aborted() {
            Err(crate::Error::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Engine-side progress accounting.
///
/// Owns the delegate; every report goes through one `&mut` access, which
/// serializes delegate invocations. The reported fraction is clamped to
/// `[0, 1]` and never decreases within one operation.
#[derive(Default)]
pub(crate) struct ProgressTracker {
    delegate: Option<Box<dyn ProgressDelegate>>,
    total: u64,
    completed: u64,
    item_done: u64,
    path: String,
    reported: f64,
}

impl ProgressTracker {
    pub(crate) fn set_delegate(&mut self, delegate: Option<Box<dyn ProgressDelegate>>) {
        self.delegate = delegate;
    }

    /// Starts a new operation over `total` payload bytes.
    pub(crate) fn begin(&mut self, total: u64) {
        self.total = total;
        self.completed = 0;
        self.item_done = 0;
        self.path.clear();
        self.reported = 0.0;
    }

    /// Starts accounting for one item.
    pub(crate) fn begin_item(&mut self, path: &str) {
        self.path.clear();
        self.path.push_str(path);
        self.item_done = 0;
        self.report();
    }

    /// Advances the current item by `bytes`.
    pub(crate) fn advance(&mut self, bytes: u64) {
        self.item_done += bytes;
        self.report();
    }

    /// Finishes the current item of the given size.
    pub(crate) fn finish_item(&mut self, size: u64) {
        self.completed += size;
        self.item_done = 0;
        self.report();
    }

    /// Reports completion of the whole operation.
    pub(crate) fn complete(&mut self) {
        self.reported = 1.0;
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.on_progress(&self.path, 1.0);
        }
    }

    fn report(&mut self) {
        let Some(delegate) = self.delegate.as_mut() else {
            return;
        };
        let fraction = if self.total == 0 {
            0.0
        } else {
            (self.completed + self.item_done) as f64 / self.total as f64
        };
        let fraction = fraction.clamp(self.reported, 1.0);
        self.reported = fraction;
        delegate.on_progress(&self.path, fraction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_abort_handle() {
        let handle = AbortHandle::new();
        assert!(!handle.is_aborted());
        assert!(handle.check().is_ok());

        let clone = handle.clone();
        clone.abort();
        assert!(handle.is_aborted());
        assert!(handle.check().unwrap_err().is_aborted());

        handle.reset();
        assert!(!handle.is_aborted());
    }

    #[test]
    fn test_tracker_monotonic_and_complete() {
        let reports: Arc<Mutex<Vec<f64>>> = Arc::default();
        let sink = Arc::clone(&reports);

        let mut tracker = ProgressTracker::default();
        tracker.set_delegate(Some(progress_fn(move |_path, fraction| {
            sink.lock().unwrap().push(fraction);
        })));

        tracker.begin(100);
        tracker.begin_item("a");
        tracker.advance(30);
        tracker.advance(20);
        tracker.finish_item(50);
        tracker.begin_item("b");
        tracker.advance(50);
        tracker.finish_item(50);
        tracker.complete();

        let reports = reports.lock().unwrap();
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*reports.last().unwrap(), 1.0);
        assert!(reports.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn test_tracker_zero_total() {
        let mut tracker = ProgressTracker::default();
        tracker.set_delegate(Some(progress_fn(|_path, fraction| {
            assert!((0.0..=1.0).contains(&fraction));
        })));
        tracker.begin(0);
        tracker.begin_item("empty");
        tracker.finish_item(0);
        tracker.complete();
    }

    #[test]
    fn test_tracker_without_delegate() {
        let mut tracker = ProgressTracker::default();
        tracker.begin(10);
        tracker.begin_item("a");
        tracker.advance(10);
        tracker.finish_item(10);
        tracker.complete();
    }
}
