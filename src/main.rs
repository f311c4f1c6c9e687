// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;

use recapper::app_config::{self, BudgetPolicy, Config, SummarizerProvider};
use recapper::app_controller::clean_output;
use recapper::{Controller, JobProgress};

/// CLI Wrapper for SummarizerProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliSummarizer {
    Builtin,
    Ollama,
}

impl From<CliSummarizer> for SummarizerProvider {
    fn from(cli: CliSummarizer) -> Self {
        match cli {
            CliSummarizer::Builtin => SummarizerProvider::Builtin,
            CliSummarizer::Ollama => SummarizerProvider::Ollama,
        }
    }
}

/// CLI Wrapper for BudgetPolicy to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliBudgetPolicy {
    Stop,
    Skip,
}

impl From<CliBudgetPolicy> for BudgetPolicy {
    fn from(cli: CliBudgetPolicy) -> Self {
        match cli {
            CliBudgetPolicy::Stop => BudgetPolicy::Stop,
            CliBudgetPolicy::Skip => BudgetPolicy::Skip,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the recap from the input area
    Run(RunArgs),

    /// Print the progress record of the last run
    Status {
        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },

    /// Empty the output area
    Clean {
        /// Also remove a stale run lock
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions for recapper
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Only process these video file names (default: every video)
    #[arg(long, num_args = 1.., value_name = "FILE")]
    files: Option<Vec<String>>,

    /// Fade length at clip boundaries, in seconds
    #[arg(short, long)]
    transition: Option<f64>,

    /// Recap duration budget, in seconds
    #[arg(short = 'd', long)]
    max_duration: Option<u64>,

    /// What to do with a scene that does not fit the budget
    #[arg(long, value_enum)]
    budget_policy: Option<CliBudgetPolicy>,

    /// Summarizer to use
    #[arg(short, long, value_enum)]
    summarizer: Option<CliSummarizer>,

    /// Summarization model identifier
    #[arg(short, long)]
    model: Option<String>,

    /// Enable speaker attribution through this diarization service
    #[arg(long, value_name = "URL", env = "RECAP_DIARIZATION_URL")]
    diarization_url: Option<String>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,
}

/// Recapper - "previously on" recaps from episode videos
#[derive(Parser, Debug)]
#[command(name = "recapper")]
#[command(version)]
#[command(about = "Builds a short recap video from subtitled episodes")]
#[command(long_about = "Recapper pairs every video in the input area with <stem>.srt, picks the most
representative lines with an extractive summarizer, and renders them into one
faded recap video plus recap.txt and recap.json.

EXAMPLES:
    recapper run                                  # Recap every video in IN/videos
    recapper run --files s01_e01.mp4 s01_e02.mp4  # Recap a subset
    recapper run -d 90 --budget-policy skip       # 90 second budget, best-effort packing
    recapper run -s ollama -m llama3.2:3b         # Rank lines with a local Ollama model
    recapper status                               # Show progress of the last run
    recapper clean                                # Empty the output area
    recapper completions bash > recapper.bash     # Generate bash completions

CONFIGURATION:
    Configuration is stored in recap_config.json by default. If the file doesn't
    exist, a default one is created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "recap_config.json", global = true)]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,

    /// Directory holding the episode videos
    #[arg(long, global = true)]
    videos_dir: Option<PathBuf>,

    /// Directory holding the subtitle files
    #[arg(long, global = true)]
    subtitles_dir: Option<PathBuf>,

    /// Directory receiving the recap and progress record
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger::new(level)))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color and tag for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "ERROR"),
            Level::Warn => ("1;33", "WARN "),
            Level::Info => ("1;32", "INFO "),
            Level::Debug => ("1;36", "DEBUG"),
            Level::Trace => ("1;35", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, tag) = Self::style_for_level(record.level());
            let _ = writeln!(
                std::io::stderr(),
                "\x1B[{}m{} {} {}\x1B[0m",
                color, now, tag, record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Start at trace so the config level can only narrow it
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();
    if let Some(level) = &cli.log_level {
        log::set_max_level(level_filter(&level.clone().into()));
    }

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "recapper", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run(args) => run_recap(config, args).await,
        Commands::Status { json } => show_status(&config, json),
        Commands::Clean { force } => {
            let removed = clean_output(&config.paths.output_dir, force)?;
            println!("Removed {} item(s) from {}", removed, config.paths.output_dir.display());
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// Load (or create) the config file and apply global CLI overrides
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let (mut config, created) = Config::load_or_create(&cli.config_path)?;
    if created {
        warn!("Config file not found at {:?}, created a default one.", cli.config_path);
    }

    if let Some(dir) = &cli.videos_dir {
        config.paths.videos_dir = dir.clone();
    }
    if let Some(dir) = &cli.subtitles_dir {
        config.paths.subtitles_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }

    if let Some(level) = &cli.log_level {
        config.log_level = level.clone().into();
    } else {
        log::set_max_level(level_filter(&config.log_level));
    }

    Ok(config)
}

async fn run_recap(mut config: Config, args: RunArgs) -> Result<()> {
    if let Some(transition) = args.transition {
        config.transition_duration = transition;
    }
    if let Some(max_duration) = args.max_duration {
        config.max_recap_duration = max_duration;
    }
    if let Some(policy) = args.budget_policy {
        config.selection.budget_policy = policy.into();
    }
    if let Some(summarizer) = args.summarizer {
        config.summarizer.provider = summarizer.into();
    }
    if let Some(model) = args.model {
        config.summarizer_model = model;
    }
    if let Some(url) = args.diarization_url {
        config.diarization.enabled = true;
        config.diarization.endpoint = url;
    }

    let controller = Controller::with_config(config)
        .await
        .context("Configuration validation failed")?;
    info!(
        "Summarizer: {} ({}), budget {}s, transition {:.2}s",
        controller.config().summarizer.provider.display_name(),
        controller.config().summarizer_model,
        controller.config().max_recap_duration,
        controller.config().transition_duration
    );

    let prepared = controller.prepare_run()?;
    let progress_task = if args.no_progress {
        None
    } else {
        let mut receiver = prepared.subscribe();
        Some(tokio::spawn(async move {
            let progress_bar = ProgressBar::new(1000);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            progress_bar.set_style(style.progress_chars("#>-"));

            while receiver.changed().await.is_ok() {
                let snapshot = receiver.borrow_and_update().clone();
                progress_bar.set_position((snapshot.progress * 1000.0).round() as u64);
                progress_bar.set_message(snapshot.message.clone());
                if snapshot.status.is_terminal() {
                    break;
                }
            }
            progress_bar.finish_and_clear();
        }))
    };

    let result = controller.execute(prepared, args.files).await;
    if let Some(task) = progress_task {
        let _ = task.await;
    }

    match result {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for file in &report.files {
                    println!("  {}", file);
                }
                for dropped in &report.dropped_clips {
                    println!("  dropped clip from {}: {}", dropped.file, dropped.error);
                }
                println!(
                    "Recap: {} scene(s), {:.1}s -> {}",
                    report.scenes.len(),
                    report.duration,
                    report.video_path.display()
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}

fn show_status(config: &Config, json: bool) -> Result<()> {
    let progress = JobProgress::read(&config.paths.output_dir)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
    } else {
        println!("{}", progress);
    }
    Ok(())
}
