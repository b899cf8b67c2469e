//! Conversion jobs and their outcomes.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{discovery::output_path_for, error::ConversionError};

/// One unit of work: extract the audio of `input` into `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Source media file.
    pub input: PathBuf,
    /// Destination MP3 file, always `input` with its extension replaced.
    pub output: PathBuf,
}

impl ConversionJob {
    /// Create a job whose output sits next to `input` with an `.mp3` extension.
    pub fn new<P: Into<PathBuf>>(input: P) -> Self {
        let input = input.into();
        let output = output_path_for(&input);
        Self { input, output }
    }

    /// File name of the input, for display.
    pub fn input_name(&self) -> String {
        display_name(&self.input)
    }

    /// File name of the output, for display.
    pub fn output_name(&self) -> String {
        display_name(&self.output)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Why a job was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The output existed and the batch was told to keep existing files.
    OutputExists,
    /// The batch was cancelled before this job started.
    Cancelled,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SkipReason::OutputExists => write!(f, "output already exists"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What happened to a single job.
#[derive(Debug)]
pub enum JobOutcome {
    /// The MP3 was written.
    Converted {
        /// Wall-clock time the conversion took.
        elapsed: Duration,
    },
    /// The job was never attempted.
    Skipped(SkipReason),
    /// The conversion failed; siblings are unaffected.
    Failed(ConversionError),
}

impl JobOutcome {
    /// Whether the output file was produced.
    pub fn is_converted(&self) -> bool {
        matches!(self, JobOutcome::Converted { .. })
    }

    /// Whether the job failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }

    /// Whether the job was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, JobOutcome::Skipped(_))
    }
}

/// A cloneable summary of a [`JobOutcome`], handed to progress callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Converted,
    Skipped(SkipReason),
    /// The failure, rendered as text.
    Failed(String),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Converted { .. } => JobStatus::Converted,
            JobOutcome::Skipped(reason) => JobStatus::Skipped(*reason),
            JobOutcome::Failed(error) => JobStatus::Failed(error.to_string()),
        }
    }
}

/// A job paired with its outcome.
#[derive(Debug)]
pub struct JobResult {
    pub job: ConversionJob,
    pub outcome: JobOutcome,
}
