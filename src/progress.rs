//! Progress reporting and cancellation support.
//!
//! The dispatcher calls a [`ProgressCallback`] once for every finished job
//! (converted, skipped or failed), and checks a [`CancellationToken`] before
//! starting each job.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mp4_to_mp3::{BatchOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{}/{} {} {:?}", info.completed, info.total, info.current_file.display(), info.status);
//!     }
//! }
//!
//! let options = BatchOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::job::JobStatus;

/// A snapshot of batch progress, taken when a job finishes.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Jobs finished so far, including this one.
    pub completed: u64,
    /// Jobs in the batch.
    pub total: u64,
    /// Completion percentage (0.0 – 100.0).
    pub percentage: f32,
    /// Wall-clock time since the batch started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on throughput so far.
    pub estimated_remaining: Option<Duration>,
    /// Input file of the job that just finished.
    pub current_file: PathBuf,
    /// How that job ended.
    pub status: JobStatus,
}

/// Receives a [`ProgressInfo`] each time a job finishes.
///
/// Callbacks observe but cannot halt the batch. Use [`CancellationToken`]
/// for that.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);
}

/// The default callback; discards everything.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Jobs already running are allowed to finish; jobs that have not started
/// when the token is cancelled are skipped.
///
/// ```
/// use mp4_to_mp3::CancellationToken;
///
/// let token = CancellationToken::new();
/// let shared = token.clone();
/// shared.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks batch timing and emits callbacks from the collecting thread.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: u64,
    completed: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: u64) -> Self {
        Self {
            callback,
            total,
            completed: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one finished job and fire the callback.
    pub(crate) fn advance(&mut self, current_file: PathBuf, status: JobStatus) {
        self.completed += 1;

        let elapsed = self.start_time.elapsed();
        let percentage = if self.total > 0 {
            (self.completed as f32 / self.total as f32) * 100.0
        } else {
            100.0
        };
        let remaining = self.total.saturating_sub(self.completed);
        let estimated_remaining = (self.completed > 0).then(|| {
            let per_job = elapsed / self.completed as u32;
            per_job * remaining as u32
        });

        self.callback.on_progress(&ProgressInfo {
            completed: self.completed,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_file,
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recording(Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recording {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn tracker_reports_every_job() {
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        let mut tracker = ProgressTracker::new(recording.clone(), 4);

        for name in ["a.mp4", "b.mp4", "c.mp4", "d.mp4"] {
            tracker.advance(PathBuf::from(name), JobStatus::Converted);
        }

        let infos = recording.0.lock().unwrap();
        assert_eq!(infos.len(), 4);
        assert_eq!(infos[1].completed, 2);
        assert!((infos[1].percentage - 50.0).abs() < f32::EPSILON);
        assert_eq!(infos[3].current_file, PathBuf::from("d.mp4"));
        assert_eq!(infos[3].estimated_remaining, Some(Duration::ZERO));
    }

    #[test]
    fn token_clone_shares_state() {
        let token = CancellationToken::default();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
