//! Waypoint CLI
//!
//! Inspects lesson documents and runs them against the in-process pipeline.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use waypoint_engine::{
    evaluator_fn, ChallengeBlueprint, Config, EvaluationResult, LessonDocument, LessonMode,
    LessonParser, MarkdownLessonParser, ParsedLesson, StartLessonDirective, StartOptions,
    Submission, START_LESSON_DIRECTIVE,
};
use waypoint_kernel::{
    Command, CommandHandler, CommandKind, EventKind, Kernel, KernelError, KernelEvent,
    KernelInvocationContext, Pipeline,
};

/// Waypoint - Guided Lesson Runner
///
/// Runs lessons made of challenges: every submission is evaluated against the
/// active challenge, and passing submissions advance the lesson.
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a lesson document and print its structure
    Inspect {
        /// Path to the lesson markdown file
        #[arg(value_name = "LESSON")]
        lesson: PathBuf,

        /// Print the structure as JSON
        #[arg(long)]
        json: bool,

        /// Path to configuration file (default: waypoint.json in current directory)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Start a lesson and send submissions to it
    Run {
        /// Path to the lesson markdown file
        #[arg(value_name = "LESSON")]
        lesson: PathBuf,

        /// Path to configuration file (default: waypoint.json in current directory)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Reset policy: teacher or student
        #[arg(long, value_name = "MODE")]
        mode: Option<LessonMode>,

        /// Code to submit after the lesson starts (repeatable)
        #[arg(short, long = "submit", value_name = "CODE")]
        submissions: Vec<String>,

        /// Accept every submission, walking through the whole lesson
        #[arg(long)]
        walkthrough: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Commands::Inspect {
            lesson,
            json,
            config,
        } => inspect(&lesson, json, config.as_deref()),
        Commands::Run {
            lesson,
            config,
            mode,
            submissions,
            walkthrough,
        } => run(&lesson, config.as_deref(), mode, &submissions, walkthrough).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

// ============================================================================
// inspect
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LessonSummary {
    name: String,
    setup: usize,
    challenges: Vec<ChallengeSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeSummary {
    name: String,
    line: usize,
    setup: usize,
    environment_setup: usize,
    contents: usize,
}

impl From<&ChallengeBlueprint> for ChallengeSummary {
    fn from(blueprint: &ChallengeBlueprint) -> Self {
        Self {
            name: blueprint.name.clone(),
            line: blueprint.line,
            setup: blueprint.setup.len(),
            environment_setup: blueprint.environment_setup.len(),
            contents: blueprint.contents.len(),
        }
    }
}

impl From<&ParsedLesson> for LessonSummary {
    fn from(parsed: &ParsedLesson) -> Self {
        Self {
            name: parsed.lesson.name.clone(),
            setup: parsed.lesson.setup.len(),
            challenges: parsed.challenges.iter().map(ChallengeSummary::from).collect(),
        }
    }
}

fn inspect(lesson: &Path, json: bool, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let document = LessonDocument::load(lesson, config.max_document_size)?;
    let parsed = MarkdownLessonParser::new(config.default_language.clone()).parse(&document)?;
    let summary = LessonSummary::from(&parsed);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Lesson: {}", summary.name);
    println!("  Path: {}", document.path.display());
    println!("  Size: {} bytes", document.size_bytes);
    println!("  Setup commands: {}", summary.setup);
    println!("  Challenges: {}", summary.challenges.len());
    for (index, challenge) in summary.challenges.iter().enumerate() {
        println!(
            "  {}. {} (line {}): {} setup, {} environment setup, {} contents",
            index + 1,
            challenge.name,
            challenge.line,
            challenge.setup,
            challenge.environment_setup,
            challenge.contents
        );
    }
    Ok(())
}

// ============================================================================
// run
// ============================================================================

/// Terminal handler that prints every command it executes.
#[derive(Debug, Default)]
struct TranscriptHandler {
    executed: AtomicUsize,
}

#[async_trait]
impl CommandHandler for TranscriptHandler {
    async fn handle(
        &self,
        command: &Command,
        context: &mut KernelInvocationContext,
    ) -> Result<(), KernelError> {
        let index = self.executed.fetch_add(1, Ordering::Relaxed) + 1;
        match command.kind() {
            CommandKind::SubmitCode { code } => {
                println!("[{index}] run: {code}");
                context.publish(EventKind::ReturnValueProduced(code.clone()));
            }
            CommandKind::SendEditableCode { language, code } => {
                println!("[{index}] editable ({language}):");
                print_indented(code);
            }
            CommandKind::DisplayMarkdown { markdown } => {
                println!("[{index}] show:");
                print_indented(markdown);
            }
        }
        Ok(())
    }
}

fn print_indented(text: &str) {
    for line in text.lines() {
        println!("    {line}");
    }
}

fn print_displays(events: &[KernelEvent]) {
    for value in events.iter().filter_map(KernelEvent::displayed_value) {
        println!("--- evaluation ({}) ---", value.mime_type);
        println!("{}", value.value);
        println!("---");
    }
}

async fn run(
    lesson: &Path,
    config_path: Option<&Path>,
    mode: Option<LessonMode>,
    submissions: &[String],
    walkthrough: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(mode) = mode {
        config.mode = mode;
    }
    config.validate()?;

    let mut options = StartOptions::new(config);
    if walkthrough {
        options = options.with_default_evaluator(evaluator_fn(|_: &Submission<'_>| {
            Ok(EvaluationResult::success().with_reason("Accepted in walkthrough mode."))
        }));
    }

    let pipeline = Pipeline::new(Arc::new(TranscriptHandler::default()));
    let directive = Arc::new(StartLessonDirective::new(options));
    pipeline.add_directive(directive.clone());

    tracing::info!(lesson = %lesson.display(), "Starting lesson");
    pipeline
        .send(Command::submit_code(format!(
            "{START_LESSON_DIRECTIVE} \"{}\"",
            lesson.display()
        )))
        .await?;

    let Some(shared) = directive.lesson() else {
        anyhow::bail!("Lesson did not start");
    };

    for code in submissions {
        let events = pipeline.send(Command::submit_code(code.as_str())).await?;
        print_displays(&events);
    }

    let lesson = shared.lock().await;
    println!();
    println!("=== Lesson Summary ===");
    println!("Lesson: {}", lesson.name());
    println!("Mode: {}", lesson.mode());
    match lesson.challenge_status() {
        Some(status) => {
            println!("Current challenge: {}", status.name);
            if let Some(outcome) = status.last_outcome {
                println!("Last outcome: {outcome}");
            }
        }
        None => println!("Current challenge: none"),
    }
    Ok(())
}
