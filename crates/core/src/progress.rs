//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type Callback = dyn Fn(usize) + Send + Sync;

/// Progress sink shared between a long-running operation and its caller.
///
/// Operations report whole-percent updates and poll the cancel flag at row
/// boundaries; a cancelled operation unwinds with `Error::Cancelled` and
/// leaves no partial output file behind.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    callback: Option<Box<Callback>>,
    cancelled: AtomicBool,
    last_percent: AtomicUsize,
}

impl ProgressReporter {
    /// A reporter that swallows updates; cancellation still works.
    pub fn silent() -> Self {
        Self::default()
    }

    /// A reporter forwarding whole-percent updates to `callback`.
    pub fn with_callback(callback: impl Fn(usize) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                callback: Some(Box::new(callback)),
                cancelled: AtomicBool::new(false),
                last_percent: AtomicUsize::new(usize::MAX),
            }),
        }
    }

    /// Report `done` of `total` work units. The callback only fires when the
    /// whole percentage changes.
    pub fn update(&self, done: usize, total: usize) {
        let Some(callback) = &self.inner.callback else {
            return;
        };
        if total == 0 {
            return;
        }
        let percent = (100 * done / total).min(100);
        if self.inner.last_percent.swap(percent, Ordering::Relaxed) != percent {
            callback(percent);
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Convenience for row loops: `Err(Cancelled)` once the flag is set.
    pub fn checkpoint(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_reports_whole_percent_steps() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = ProgressReporter::with_callback(move |p| sink.lock().unwrap().push(p));

        for done in 0..=200 {
            progress.update(done, 200);
        }
        let seen = seen.lock().unwrap();
        // one callback per distinct percent, in order
        assert_eq!(seen.len(), 101);
        assert_eq!(seen[0], 0);
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[test]
    fn test_cancellation() {
        let progress = ProgressReporter::silent();
        assert!(progress.checkpoint().is_ok());
        progress.cancel();
        assert!(matches!(
            progress.checkpoint(),
            Err(crate::Error::Cancelled)
        ));
    }
}
