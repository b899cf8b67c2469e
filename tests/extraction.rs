//! FFmpeg-backed extraction tests.
//!
//! Tests that need real media require fixture files from
//! `tests/fixtures/generate_fixtures.sh` and return early when they are
//! missing.

use std::{fs, path::Path, sync::Arc};

use mp4_to_mp3::{
    AudioOptions, BatchOptions, ConversionError, ConversionJob, Converter, JobOutcome,
    Mp3Converter, discovery, extract_mp3, run_batch,
};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

fn sample_video_only_path() -> &'static str {
    "tests/fixtures/sample_video_only.mp4"
}

#[test]
fn open_nonexistent_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let output = temporary_directory.path().join("missing.mp3");

    let result = extract_mp3(
        Path::new("this_file_does_not_exist.mp4"),
        &output,
        &AudioOptions::new(),
    );
    let error_message = result.unwrap_err().to_string();
    assert!(
        error_message.contains("Failed to open media file"),
        "Error message should mention file open failure: {error_message}",
    );
    assert!(!output.exists());
}

#[test]
fn corrupt_input_fails_without_touching_existing_output() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let input = temporary_directory.path().join("corrupt.mp4");
    fs::write(&input, b"this is not a media file").expect("Failed to write invalid file");
    let job = ConversionJob::new(&input);
    fs::write(&job.output, b"previous run").expect("Failed to write old output");

    let result = Mp3Converter::default().convert(&job);
    assert!(matches!(result, Err(ConversionError::FileOpen { .. })));
    assert_eq!(fs::read(&job.output).unwrap(), b"previous run");
}

#[test]
fn extracts_audio_to_mp3() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let output = temporary_directory.path().join("sample_video.mp3");

    extract_mp3(Path::new(path), &output, &AudioOptions::new()).expect("Failed to extract");

    let bytes = fs::read(&output).expect("Output missing");
    assert!(bytes.len() > 1024, "MP3 output is suspiciously small");

    // The result must itself be a readable audio file.
    ffmpeg_next::init().unwrap();
    let context = ffmpeg_next::format::input(&output).expect("Output is not readable media");
    assert!(
        context
            .streams()
            .best(ffmpeg_next::media::Type::Audio)
            .is_some()
    );
}

#[test]
fn video_without_audio_reports_no_audio_stream() {
    let path = sample_video_only_path();
    if !Path::new(path).exists() {
        return;
    }

    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let output = temporary_directory.path().join("silent.mp3");

    let result = extract_mp3(Path::new(path), &output, &AudioOptions::new());
    match result {
        Err(ConversionError::NoAudioStream(_)) => {}
        other => panic!("Expected NoAudioStream, got: {other:?}"),
    }
    assert!(!output.exists());
}

#[test]
fn batch_with_one_corrupt_file_converts_the_rest() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = temporary_directory.path();
    fs::copy(path, dir.join("first.MP4")).unwrap();
    fs::copy(path, dir.join("second.mp4")).unwrap();
    fs::write(dir.join("broken.mp4"), b"garbage").unwrap();
    fs::write(dir.join("readme.txt"), b"not a video").unwrap();

    let jobs = discovery::jobs_for(discovery::discover(dir).unwrap());
    assert_eq!(jobs.len(), 3);

    let converter = Arc::new(Mp3Converter::new(AudioOptions::new().with_bit_rate(96_000)));
    let report = run_batch(jobs, converter, &BatchOptions::new()).unwrap();

    assert_eq!(report.converted(), 2);
    assert_eq!(report.failed(), 1);
    assert!(dir.join("first.mp3").exists());
    assert!(dir.join("second.mp3").exists());
    assert!(!dir.join("readme.mp3").exists());

    let broken = report
        .results
        .iter()
        .find(|result| result.job.input_name() == "broken.mp4")
        .unwrap();
    assert!(matches!(broken.outcome, JobOutcome::Failed(_)));
}

#[test]
fn damaged_audio_data_still_converts() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let input = temporary_directory.path().join("damaged.mp4");
    let mut bytes = fs::read(path).expect("Failed to read fixture");

    // The fixture keeps its index at the end, so the middle is sample data.
    let middle = bytes.len() / 2;
    for byte in &mut bytes[middle..middle + 64] {
        *byte ^= 0xA5;
    }
    fs::write(&input, &bytes).expect("Failed to write damaged copy");

    let job = ConversionJob::new(&input);
    let report = run_batch(
        vec![job],
        Arc::new(Mp3Converter::default()),
        &BatchOptions::new(),
    )
    .unwrap();

    assert_eq!(report.converted(), 1, "{:?}", report.results[0].outcome);
    assert!(temporary_directory.path().join("damaged.mp3").exists());
}
