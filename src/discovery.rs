//! Input discovery.
//!
//! Lists the top level of a source directory and keeps the regular files
//! whose extension matches (case-insensitively) the requested input
//! extension. Subdirectories are not searched.
//!
//! # Example
//!
//! ```no_run
//! use mp4_to_mp3::discovery;
//!
//! let inputs = discovery::discover("videos")?;
//! for job in discovery::jobs_for(inputs) {
//!     println!("{} -> {}", job.input.display(), job.output.display());
//! }
//! # Ok::<(), mp4_to_mp3::ConversionError>(())
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{error::ConversionError, job::ConversionJob};

/// Extension that discovery matches by default.
pub const INPUT_EXTENSION: &str = "mp4";

/// Extension given to every produced audio file.
pub const OUTPUT_EXTENSION: &str = "mp3";

/// Find every `.mp4` file (any letter case) directly inside `dir`.
///
/// Results are sorted by path so dispatch order does not depend on the
/// filesystem's listing order. An empty vector means nothing matched.
///
/// # Errors
///
/// Returns [`ConversionError::SourceDirectory`] if `dir` does not exist or
/// cannot be listed.
pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>, ConversionError> {
    discover_with_extension(dir, INPUT_EXTENSION)
}

/// Like [`discover`], matching `extension` instead of `mp4`.
///
/// A leading dot in `extension` is ignored, so `".mov"` and `"mov"` are
/// equivalent.
pub fn discover_with_extension<P: AsRef<Path>>(
    dir: P,
    extension: &str,
) -> Result<Vec<PathBuf>, ConversionError> {
    let dir = dir.as_ref();
    let wanted = extension.trim_start_matches('.');

    log::debug!("Scanning {} for *.{wanted} files", dir.display());

    let entries = fs::read_dir(dir).map_err(|error| ConversionError::SourceDirectory {
        path: dir.to_path_buf(),
        reason: error.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| ConversionError::SourceDirectory {
            path: dir.to_path_buf(),
            reason: error.to_string(),
        })?;
        let path = entry.path();

        if path.is_file() && has_extension(&path, wanted) {
            files.push(path);
        }
    }

    files.sort();
    log::debug!("Found {} matching file(s) in {}", files.len(), dir.display());
    Ok(files)
}

/// Whether the file name of `path` ends in `.extension`, ignoring ASCII case.
///
/// This is a suffix match on the name, so a file called just `.mp4` counts
/// and becomes `.mp4.mp3`.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let suffix_len = extension.len() + 1;
    if name.len() < suffix_len {
        return false;
    }
    let suffix = &name.as_bytes()[name.len() - suffix_len..];
    suffix[0] == b'.' && suffix[1..].eq_ignore_ascii_case(extension.as_bytes())
}

/// The MP3 path produced for `input`: same directory, same stem, `.mp3`.
pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension(OUTPUT_EXTENSION)
}

/// Pair each discovered input with its output path.
pub fn jobs_for<I>(inputs: I) -> Vec<ConversionJob>
where
    I: IntoIterator<Item = PathBuf>,
{
    inputs.into_iter().map(ConversionJob::new).collect()
}
