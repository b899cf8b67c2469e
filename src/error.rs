//! Error types for the `mp4-to-mp3` crate.
//!
//! [`ConversionError`] is the single error type returned by discovery, the
//! dispatcher and the FFmpeg-backed converter. Variants carry the path or
//! upstream message needed to explain a failed job on its own.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `mp4-to-mp3` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConversionError {
    /// The source directory could not be listed.
    #[error("Failed to read source directory {path}: {reason}")]
    SourceDirectory {
        /// Directory passed to discovery.
        path: PathBuf,
        /// Underlying reason the listing failed.
        reason: String,
    },

    /// The input media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Input path of the job.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The input has no audio stream to extract.
    #[error("No audio stream found in {0}")]
    NoAudioStream(PathBuf),

    /// FFmpeg was built without an MP3 encoder (usually libmp3lame).
    #[error("No MP3 encoder available in this FFmpeg build")]
    UnsupportedEncoder,

    /// Audio data could not be decoded.
    #[error("Failed to decode audio: {0}")]
    AudioDecode(String),

    /// Audio data could not be resampled, encoded or written.
    #[error("Failed to encode audio: {0}")]
    AudioEncode(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The worker pool could not be created.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),

    /// A job panicked; the panic was contained to that job.
    #[error("Conversion panicked: {0}")]
    Panicked(String),
}

impl From<FfmpegError> for ConversionError {
    fn from(error: FfmpegError) -> Self {
        ConversionError::Ffmpeg(error.to_string())
    }
}
