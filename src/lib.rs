//! # mp4-to-mp3
//!
//! Batch-extract the audio track of every MP4 file in a folder into an MP3
//! file next to it, running one conversion per available CPU core.
//!
//! The crate does three things and leaves codecs to FFmpeg (via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate):
//!
//! - **Discovery**: list a directory and keep `*.mp4` files, ignoring case
//!   ([`discovery`]).
//! - **Dispatch**: run one [`ConversionJob`] per file on a bounded
//!   [`rayon`] pool and collect every outcome ([`run_batch`]).
//! - **Containment**: a failing (or panicking) job is reported as
//!   [`JobOutcome::Failed`] and never stops its siblings.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mp4_to_mp3::{AudioOptions, BatchOptions, JobOutcome, Mp3Converter, discovery, run_batch};
//!
//! let inputs = discovery::discover("videos")?;
//! if inputs.is_empty() {
//!     println!("No MP4 files found.");
//!     return Ok(());
//! }
//!
//! let converter = Arc::new(Mp3Converter::new(AudioOptions::new()));
//! let report = run_batch(discovery::jobs_for(inputs), converter, &BatchOptions::new())?;
//! for result in &report.results {
//!     if let JobOutcome::Failed(error) = &result.outcome {
//!         eprintln!("{}: {error}", result.job.input.display());
//!     }
//! }
//! # Ok::<(), mp4_to_mp3::ConversionError>(())
//! ```
//!
//! ## Requirements
//!
//! FFmpeg development libraries, built with an MP3 encoder (libmp3lame),
//! must be installed on the system.

pub mod audio;
pub mod batch;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ffmpeg;
pub mod job;
pub mod progress;

pub use audio::{Converter, Mp3Converter, extract_mp3};
pub use batch::{BatchReport, run_batch, worker_count};
pub use config::{AudioOptions, BatchOptions};
pub use error::ConversionError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use job::{ConversionJob, JobOutcome, JobResult, JobStatus, SkipReason};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
