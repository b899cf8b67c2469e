//! Batch and encoder configuration.
//!
//! [`BatchOptions`] threads the worker count, overwrite policy, progress
//! callback and cancellation token through [`run_batch`](crate::run_batch).
//! [`AudioOptions`] carries the encoder settings used by
//! [`Mp3Converter`](crate::Mp3Converter).
//!
//! # Example
//!
//! ```
//! use mp4_to_mp3::{AudioOptions, BatchOptions, CancellationToken};
//!
//! let token = CancellationToken::new();
//! let batch = BatchOptions::new()
//!     .with_jobs(4)
//!     .with_skip_existing(true)
//!     .with_cancellation(token.clone());
//! let audio = AudioOptions::new().with_bit_rate(192_000);
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// MP3 bit rate used when none is configured, in bits per second.
pub const DEFAULT_BIT_RATE: usize = 128_000;

/// Lowest bit rate accepted by [`AudioOptions::with_bit_rate`].
pub const MIN_BIT_RATE: usize = 8_000;

/// Settings for the dispatcher.
#[derive(Clone)]
pub struct BatchOptions {
    /// Upper bound on workers. `None` uses the CPU count.
    pub(crate) jobs: Option<usize>,
    /// Keep outputs that already exist instead of overwriting them.
    pub(crate) skip_existing: bool,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for BatchOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BatchOptions")
            .field("jobs", &self.jobs)
            .field("skip_existing", &self.skip_existing)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: None,
            skip_existing: false,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }
}

impl BatchOptions {
    /// Default options: one worker per core, overwrite existing outputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the worker count. `0` restores the CPU-count default.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = (jobs > 0).then_some(jobs);
        self
    }

    /// Skip jobs whose output file already exists.
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    /// Attach a progress callback, invoked once per finished job.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Encoder settings for the produced MP3 files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioOptions {
    /// Target bit rate in bits per second.
    pub bit_rate: usize,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            bit_rate: DEFAULT_BIT_RATE,
        }
    }
}

impl AudioOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bit rate in bits per second, clamped to [`MIN_BIT_RATE`].
    pub fn with_bit_rate(mut self, bit_rate: usize) -> Self {
        self.bit_rate = bit_rate.max(MIN_BIT_RATE);
        self
    }
}
