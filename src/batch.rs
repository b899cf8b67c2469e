//! Batch dispatcher.
//!
//! [`run_batch`] fans a list of [`ConversionJob`]s out over a dedicated
//! [`rayon`] thread pool and gathers one [`JobResult`] per job over a
//! [`crossbeam_channel`]. Jobs share no state: each worker owns its own
//! input/output pair and its own FFmpeg contexts. A job that fails, or even
//! panics, is recorded and its siblings carry on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mp4_to_mp3::{AudioOptions, BatchOptions, Mp3Converter, discovery, run_batch};
//!
//! let jobs = discovery::jobs_for(discovery::discover("videos")?);
//! let converter = Arc::new(Mp3Converter::new(AudioOptions::new()));
//! let report = run_batch(jobs, converter, &BatchOptions::new())?;
//! println!("{} converted, {} failed", report.converted(), report.failed());
//! # Ok::<(), mp4_to_mp3::ConversionError>(())
//! ```

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::{Duration, Instant},
};

use rayon::ThreadPoolBuilder;

use crate::{
    audio::Converter,
    config::BatchOptions,
    error::ConversionError,
    job::{ConversionJob, JobOutcome, JobResult, SkipReason},
    progress::ProgressTracker,
};

/// Number of workers for `jobs` jobs.
///
/// Never more than the number of jobs or the `available` CPUs. A
/// `requested` count can only lower that bound. At least one worker runs
/// whenever there is work to do.
pub fn worker_count(jobs: usize, available: usize, requested: Option<usize>) -> usize {
    if jobs == 0 {
        return 0;
    }
    let limit = requested
        .filter(|&n| n > 0)
        .map_or(available, |n| n.min(available));
    jobs.min(limit).max(1)
}

/// Outcome of a whole batch, in completion order.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<JobResult>,
    /// Size of the worker pool that ran the batch.
    pub workers: usize,
    pub elapsed: Duration,
}

impl Default for BatchReport {
    /// The report of a batch with no jobs.
    fn default() -> Self {
        Self {
            results: Vec::new(),
            workers: 0,
            elapsed: Duration::ZERO,
        }
    }
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.count(JobOutcome::is_converted)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobOutcome::is_skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(JobOutcome::is_failed)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn count(&self, predicate: fn(&JobOutcome) -> bool) -> usize {
        self.results
            .iter()
            .filter(|result| predicate(&result.outcome))
            .count()
    }
}

/// Run every job on a bounded worker pool and wait for all of them.
///
/// Results are collected as each job finishes, and the progress callback in
/// `options` fires once per result on the calling thread. An empty job list
/// returns an empty report without starting a pool.
///
/// # Errors
///
/// Only [`ConversionError::WorkerPool`], when the thread pool cannot be
/// built. Per-job failures are reported inside the [`BatchReport`].
pub fn run_batch(
    jobs: Vec<ConversionJob>,
    converter: Arc<dyn Converter>,
    options: &BatchOptions,
) -> Result<BatchReport, ConversionError> {
    if jobs.is_empty() {
        return Ok(BatchReport::default());
    }

    let total = jobs.len();
    let workers = worker_count(total, num_cpus::get(), options.jobs);
    log::info!("Converting {total} file(s) with {workers} worker(s)");

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("mp4-to-mp3-worker-{index}"))
        .build()
        .map_err(|error| ConversionError::WorkerPool(error.to_string()))?;

    let start = Instant::now();
    let (sender, receiver) = crossbeam_channel::unbounded::<JobResult>();

    for job in jobs {
        let sender = sender.clone();
        let converter = Arc::clone(&converter);
        let options = options.clone();
        pool.spawn(move || {
            let outcome = run_job(&job, converter.as_ref(), &options);
            // The collector only stops listening after every job reported.
            let _ = sender.send(JobResult { job, outcome });
        });
    }
    drop(sender);

    let mut tracker = ProgressTracker::new(Arc::clone(&options.progress), total as u64);
    let mut results = Vec::with_capacity(total);
    for result in receiver.iter() {
        log_result(&result);
        tracker.advance(result.job.input.clone(), result.outcome.status());
        results.push(result);
    }

    Ok(BatchReport {
        results,
        workers,
        elapsed: start.elapsed(),
    })
}

/// Run a single job with cancellation, skip policy and panic containment.
fn run_job(job: &ConversionJob, converter: &dyn Converter, options: &BatchOptions) -> JobOutcome {
    if options.is_cancelled() {
        return JobOutcome::Skipped(SkipReason::Cancelled);
    }
    if options.skip_existing && job.output.exists() {
        return JobOutcome::Skipped(SkipReason::OutputExists);
    }

    let start = Instant::now();
    match catch_unwind(AssertUnwindSafe(|| converter.convert(job))) {
        Ok(Ok(())) => JobOutcome::Converted {
            elapsed: start.elapsed(),
        },
        Ok(Err(error)) => JobOutcome::Failed(error),
        Err(payload) => JobOutcome::Failed(ConversionError::Panicked(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_result(result: &JobResult) {
    let input = result.job.input.display();
    match &result.outcome {
        JobOutcome::Converted { elapsed } => {
            log::info!("Converted {input} -> {} in {elapsed:.2?}", result.job.output.display());
        }
        JobOutcome::Skipped(reason) => log::info!("Skipped {input}: {reason}"),
        JobOutcome::Failed(error) => log::warn!("Failed {input}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_bounded_by_jobs_and_cpus() {
        assert_eq!(worker_count(0, 8, None), 0);
        assert_eq!(worker_count(3, 8, None), 3);
        assert_eq!(worker_count(20, 8, None), 8);
        assert_eq!(worker_count(20, 8, Some(2)), 2);
        assert_eq!(worker_count(2, 8, Some(16)), 2);
        assert_eq!(worker_count(20, 8, Some(16)), 8);
        assert_eq!(worker_count(5, 8, Some(0)), 5);
        assert_eq!(worker_count(5, 0, None), 1);
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic");
    }
}
