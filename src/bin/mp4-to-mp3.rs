use std::{path::PathBuf, sync::Arc};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use mp4_to_mp3::{
    AudioOptions, BatchOptions, BatchReport, FfmpegLogLevel, JobOutcome, JobStatus, Mp3Converter,
    ProgressCallback, ProgressInfo, discovery, run_batch,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  mp4-to-mp3 ~/Videos\n  mp4-to-mp3 ~/Videos --jobs 2 --bit-rate 192 --progress\n  mp4-to-mp3 . --skip-existing --json\n  mp4-to-mp3 completions zsh > _mp4-to-mp3";

#[derive(Debug, Parser)]
#[command(
    name = "mp4-to-mp3",
    version,
    about = "Extract the audio of every MP4 in a folder into MP3 files",
    after_help = CLI_AFTER_HELP,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(flatten)]
    options: ConvertOptions,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Parser, Clone)]
struct ConvertOptions {
    /// Folder to scan for MP4 files (not recursive).
    #[arg(default_value = ".")]
    source: PathBuf,

    /// Maximum parallel conversions (default: one per CPU core).
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Input extension to match, ignoring case.
    #[arg(long, default_value = discovery::INPUT_EXTENSION)]
    ext: String,

    /// MP3 bit rate in kbit/s.
    #[arg(long, default_value_t = 128)]
    bit_rate: usize,

    /// Keep existing .mp3 files instead of overwriting them.
    #[arg(long)]
    skip_existing: bool,

    /// Show a progress bar.
    #[arg(long)]
    progress: bool,

    /// Print a machine-readable JSON report when done.
    #[arg(long)]
    json: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, default_value = "error")]
    log_level: String,

    /// Show debug logging output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Prints one line per finished job, through the progress bar when present.
struct TerminalProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl TerminalProgress {
    fn new(total: u64, show_bar: bool, quiet: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = if show_bar {
            let bar = ProgressBar::new(total);
            let style =
                ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
            bar.set_style(style.progress_chars("##-"));
            Some(bar)
        } else {
            None
        };
        Ok(Self { bar, quiet })
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message("done");
        }
    }

    fn print(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(bar) = &self.bar {
            bar.set_position(info.completed);
        }
        if !self.quiet {
            self.print(status_line(info));
        }
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn status_line(info: &ProgressInfo) -> String {
    let input = file_name(&info.current_file);
    let counter = format!("[{}/{}]", info.completed, info.total);
    match &info.status {
        JobStatus::Converted => {
            let output = file_name(&discovery::output_path_for(&info.current_file));
            format!("{counter} {} {input} -> {output}", "converted".green().bold())
        }
        JobStatus::Skipped(reason) => {
            format!("{counter} {} {input} ({reason})", "skipped".yellow().bold())
        }
        JobStatus::Failed(error) => {
            format!("{counter} {} {input}: {error}", "failed".red().bold())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init();
}

fn report_json(report: &BatchReport) -> serde_json::Value {
    let files: Vec<_> = report
        .results
        .iter()
        .map(|result| {
            let (status, detail) = match &result.outcome {
                JobOutcome::Converted { elapsed } => {
                    ("converted", json!({ "elapsed_seconds": elapsed.as_secs_f64() }))
                }
                JobOutcome::Skipped(reason) => ("skipped", json!({ "reason": reason.to_string() })),
                JobOutcome::Failed(error) => ("failed", json!({ "error": error.to_string() })),
            };
            json!({
                "input": result.job.input.display().to_string(),
                "output": result.job.output.display().to_string(),
                "status": status,
                "detail": detail,
            })
        })
        .collect();

    json!({
        "workers": report.workers,
        "elapsed_seconds": report.elapsed.as_secs_f64(),
        "converted": report.converted(),
        "skipped": report.skipped(),
        "failed": report.failed(),
        "files": files,
    })
}

fn convert(options: ConvertOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(options.verbose);

    let level: FfmpegLogLevel = options
        .log_level
        .parse()
        .map_err(|error| format!("unsupported --log-level: {error}"))?;
    mp4_to_mp3::set_ffmpeg_log_level(level);

    let inputs = discovery::discover_with_extension(&options.source, &options.ext)?;
    if inputs.is_empty() {
        if options.json {
            println!("{}", serde_json::to_string_pretty(&report_json(&BatchReport::default()))?);
            return Ok(());
        }
        println!(
            "{} {}",
            "notice:".yellow().bold(),
            format!(
                "No .{} files found in {}",
                options.ext.trim_start_matches('.'),
                options.source.display()
            )
            .yellow()
        );
        return Ok(());
    }

    let jobs = discovery::jobs_for(inputs);
    let progress = Arc::new(TerminalProgress::new(
        jobs.len() as u64,
        options.progress,
        options.json,
    )?);

    let mut batch = BatchOptions::new()
        .with_skip_existing(options.skip_existing)
        .with_progress(progress.clone());
    if let Some(jobs) = options.jobs {
        batch = batch.with_jobs(jobs);
    }

    let converter = Arc::new(Mp3Converter::new(
        AudioOptions::new().with_bit_rate(options.bit_rate.saturating_mul(1000)),
    ));
    let report = run_batch(jobs, converter, &batch)?;
    progress.finish();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    } else {
        let summary = format!(
            "{} converted, {} skipped, {} failed in {:.2?} ({} workers)",
            report.converted(),
            report.skipped(),
            report.failed(),
            report.elapsed,
            report.workers,
        );
        if report.failed() > 0 {
            println!("{} {}", "done:".yellow().bold(), summary.yellow());
        } else {
            println!("{} {}", "done:".green().bold(), summary.green());
        }
    }

    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "mp4-to-mp3", &mut std::io::stdout());
            Ok(())
        }
        None => convert(cli.options),
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use clap::Parser;
    use mp4_to_mp3::{BatchReport, JobStatus, ProgressInfo, SkipReason};

    use super::{Cli, Commands, report_json, status_line};

    fn info(status: JobStatus) -> ProgressInfo {
        ProgressInfo {
            completed: 1,
            total: 2,
            percentage: 50.0,
            elapsed: Duration::from_secs(1),
            estimated_remaining: Some(Duration::from_secs(1)),
            current_file: PathBuf::from("/videos/a.MP4"),
            status,
        }
    }

    #[test]
    fn parses_defaults() {
        let cli = Cli::try_parse_from(["mp4-to-mp3"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.options.source, PathBuf::from("."));
        assert_eq!(cli.options.ext, "mp4");
        assert_eq!(cli.options.bit_rate, 128);
        assert_eq!(cli.options.log_level, "error");
        assert!(cli.options.jobs.is_none());
        assert!(!cli.options.skip_existing);
    }

    #[test]
    fn parses_source_and_flags() {
        let cli = Cli::try_parse_from([
            "mp4-to-mp3",
            "/videos",
            "--jobs",
            "2",
            "--bit-rate",
            "192",
            "--skip-existing",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.options.source, PathBuf::from("/videos"));
        assert_eq!(cli.options.jobs, Some(2));
        assert_eq!(cli.options.bit_rate, 192);
        assert!(cli.options.skip_existing);
        assert!(cli.options.json);
    }

    #[test]
    fn parses_completions_subcommand() {
        let cli = Cli::try_parse_from(["mp4-to-mp3", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Completions { .. })));
    }

    #[test]
    fn status_lines_name_the_files() {
        colored::control::set_override(false);

        let converted = status_line(&info(JobStatus::Converted));
        assert_eq!(converted, "[1/2] converted a.MP4 -> a.mp3");

        let skipped = status_line(&info(JobStatus::Skipped(SkipReason::OutputExists)));
        assert_eq!(skipped, "[1/2] skipped a.MP4 (output already exists)");

        let failed = status_line(&info(JobStatus::Failed("bad data".to_string())));
        assert_eq!(failed, "[1/2] failed a.MP4: bad data");
    }

    #[test]
    fn empty_report_is_valid_json() {
        let value = report_json(&BatchReport::default());
        assert_eq!(value["converted"], 0);
        assert_eq!(value["skipped"], 0);
        assert_eq!(value["failed"], 0);
        assert_eq!(value["files"], serde_json::json!([]));

        let text = serde_json::to_string_pretty(&value).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
    }
}
