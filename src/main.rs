// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, Context};
use log::{info, warn, LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand};
use clap_complete::{generate, Shell};

use dualsub::app_config::{self, Config, TranslationProvider};
use dualsub::file_utils::FileManager;
use dualsub::report::aggregator::chunk_progress_bar;
use dualsub::storage::{ChunkManifest, FileArtifactStore};
use dualsub::{create_backend, ChunkOrchestrator};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    #[value(name = "lmstudio")]
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
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

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate pending chunks of a manifest
    Translate(TranslateArgs),

    /// Show the state of every chunk in a manifest
    Status(StatusArgs),

    /// Generate shell completions for dualsub
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Chunk manifest (defaults to paths.manifest from the config)
    #[arg(value_name = "MANIFEST")]
    manifest: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config: String,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Target language code (e.g., 'en', 'es', 'fr'); repeat for several
    #[arg(short, long = "target-language")]
    target_language: Vec<String>,

    /// Extra backend calls after a failed one
    #[arg(long)]
    api_retries: Option<u32>,

    /// Extra attempts after a validation failure
    #[arg(long)]
    validation_retries: Option<u32>,

    /// Chunks processed in parallel
    #[arg(long = "max-concurrent")]
    max_concurrent: Option<usize>,

    /// Reprocess chunks that are already completed
    #[arg(short, long)]
    force: bool,

    /// Only process this part number
    #[arg(long)]
    part: Option<u32>,

    /// Skip timing validation
    #[arg(long)]
    no_timing_check: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Parser, Debug)]
struct StatusArgs {
    /// Chunk manifest (defaults to paths.manifest from the config)
    #[arg(value_name = "MANIFEST")]
    manifest: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config: String,
}

/// dualsub - dual-language subtitles with AI
///
/// Translates transcript chunks into dual-language subtitle entries using
/// various AI providers (Ollama, OpenAI, Anthropic, LM Studio).
#[derive(Parser, Debug)]
#[command(name = "dualsub")]
#[command(version)]
#[command(about = "AI-powered dual-language subtitle generation")]
#[command(long_about = "dualsub sends transcript chunks to a language model, validates the returned subtitle entries and stores them for downstream formatting.

EXAMPLES:
    dualsub translate                            # Process chunks.json with conf.json
    dualsub translate work/chunks.json --force   # Reprocess every chunk
    dualsub translate -p openai -m gpt-4o        # Use specific provider and model
    dualsub translate --part 7 --log-level debug # Retry a single chunk verbosely
    dualsub status work/chunks.json              # Show chunk states
    dualsub completions bash > dualsub.bash      # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    ollama    - Local Ollama server (default)
    openai    - OpenAI API (requires API key or OPENAI_API_KEY)
    anthropic - Anthropic Claude API (requires API key or ANTHROPIC_API_KEY)
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
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
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI colour for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // The max level set through log::set_max_level may be raised later
        metadata.level() <= log::max_level() || metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "dualsub", &mut std::io::stdout());
            Ok(())
        }
        Commands::Status(args) => run_status(args),
        Commands::Translate(args) => {
            let failed = run_translate(args).await?;
            if failed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Load the configuration, creating a default one if the file is missing
fn load_or_create_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let content = FileManager::read_to_string(config_path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        FileManager::write_to_file(config_path, &config_json)
            .with_context(|| format!("Failed to write default config to file: {}", config_path))?;
        Ok(config)
    }
}

/// Apply command line overrides on top of the file configuration
fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.set_model(model);
    }
    if !options.target_language.is_empty() {
        config.target_languages = options.target_language.clone();
    }
    if let Some(api_retries) = options.api_retries {
        config.translation.common.api_retries = api_retries;
    }
    if let Some(validation_retries) = options.validation_retries {
        config.translation.common.validation_retries = validation_retries;
    }
    if let Some(max_concurrent) = options.max_concurrent {
        config.translation.common.max_concurrent_chunks = max_concurrent;
    }
    if options.force {
        config.run.force_reprocess = true;
    }
    if options.part.is_some() {
        config.run.only_part = options.part;
    }
    if options.no_timing_check {
        config.validation.timing_check = false;
    }
    if let Some(manifest) = &options.manifest {
        config.paths.manifest = manifest.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

/// Returns true if any targeted chunk failed
async fn run_translate(options: TranslateArgs) -> Result<bool> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        let config_log_level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(config_log_level.to_level_filter());
    }

    let mut config = load_or_create_config(&options.config)?;
    apply_overrides(&mut config, &options);

    // Validate the configuration after loading and overriding
    config.validate()
        .context("Configuration validation failed")?;

    if options.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let manifest_path = config.paths.manifest.clone();
    let manifest = ChunkManifest::load(&manifest_path)?;
    info!(
        "Loaded {} chunks from {} ({} -> {})",
        manifest.chunks.len(),
        manifest_path.display(),
        config.source_language,
        config.target_languages.join(", ")
    );

    let backend = create_backend(&config.translation)?;
    let store = Arc::new(FileArtifactStore::new(config.paths.artifacts_dir.clone()));
    let orchestrator = ChunkOrchestrator::new(&config, backend, store)?;

    let (report, _) = orchestrator
        .run(manifest, Some(manifest_path), chunk_progress_bar(0))
        .await?;

    println!("{}", report.render());
    if let Some(report_path) = &options.report {
        report.write_json(report_path)?;
        info!("Run report written to {}", report_path.display());
    }

    Ok(report.has_failures())
}

fn run_status(options: StatusArgs) -> Result<()> {
    let manifest_path = match options.manifest {
        Some(path) => path,
        None => load_or_create_config(&options.config)?.paths.manifest,
    };
    let manifest = ChunkManifest::load(&manifest_path)?;

    println!("{:>6}  {:<12} {:>8}  {}", "part", "status", "attempts", "detail");
    for chunk in &manifest.chunks {
        let detail = chunk
            .error
            .clone()
            .or_else(|| chunk.parsed_data_path.as_ref().map(|p| p.display().to_string()))
            .unwrap_or_default();
        println!(
            "{:>6}  {:<12} {:>8}  {}",
            chunk.part_number,
            chunk.status.as_str(),
            chunk.token_counts.len(),
            detail
        );
    }

    let completed = manifest.count_by_status(dualsub::ChunkStatus::Completed);
    println!("{} of {} chunks completed", completed, manifest.chunks.len());
    Ok(())
}
