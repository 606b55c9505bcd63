use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use switchboard::{
    FileOutputWriter, HandlerId, LoopController, LoopResult, RecordWriter, SwitchboardConfig,
    format_handler_output, run_slug,
};

/// Switchboard CLI: routes requests to specialized handlers until the work is done
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single request through the loop
    #[command(name = "run")]
    Run {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Read requests interactively, one per line
    #[command(name = "repl")]
    Repl {
        #[command(flatten)]
        options: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Request text
    #[arg(short, long, conflicts_with = "path")]
    request: Option<String>,

    /// Read the request from a file
    #[arg(short = 'p', long)]
    path: Option<PathBuf>,

    #[command(flatten)]
    options: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum routing steps per request
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Override the default model (e.g., "claude-3-5-haiku-20241022")
    #[arg(long)]
    model: Option<String>,

    /// Override provider ("anthropic" or "mock")
    #[arg(long)]
    provider: Option<String>,

    /// Write record.json and report.md for each run
    #[arg(long)]
    export: bool,

    /// Print the final record as JSON instead of the text report
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Run { args }) => handle_run_command(args).await,
        Some(Command::Repl { options }) => handle_repl_command(options).await,
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            eprintln!("Example: switchboard run --request \"Write a haiku about Rust\"");
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so stdout carries only results.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Configuration from file, then environment, then CLI flags.
fn load_config(options: &CommonArgs) -> Result<SwitchboardConfig> {
    let mut config = SwitchboardConfig::load_or_default(options.config.as_deref())?;
    config.apply_env_overrides();

    if let Some(max_iterations) = options.max_iterations {
        config.loop_config.max_iterations = max_iterations;
    }
    if let Some(model) = &options.model {
        config.llm.default_model = model.clone();
    }
    if let Some(provider) = &options.provider {
        config.llm.provider = provider.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Recipes resolve relative to the config file, else the current directory.
fn base_dir(options: &CommonArgs) -> PathBuf {
    options
        .config
        .as_ref()
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

fn resolve_request(args: &RunArgs) -> Result<String> {
    match (&args.request, &args.path) {
        (Some(request), _) => Ok(request.trim().to_string()),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read: {:?}", path))?;
            Ok(content.trim().to_string())
        }
        (None, None) => anyhow::bail!("Either --request or --path is required"),
    }
}

/// What a Ctrl-C press should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    /// Stop the active run before its next routing step.
    CancelRun,
    /// Nothing left to stop gracefully.
    Exit,
}

/// One Ctrl-C listener for the whole session.
///
/// The first press cancels the active run; a second press, or a press while
/// idle, exits the process.
#[derive(Clone, Default)]
struct Interrupts {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    fn install() -> Self {
        let interrupts = Self::default();
        let listener = interrupts.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match listener.on_interrupt() {
                    InterruptAction::CancelRun => {
                        warn!("Interrupted; stopping after the current step");
                        warn!("Press Ctrl-C again to exit");
                    }
                    InterruptAction::Exit => {
                        eprintln!("\nInterrupted");
                        std::process::exit(130);
                    }
                }
            }
        });
        interrupts
    }

    fn on_interrupt(&self) -> InterruptAction {
        let token = self.active.lock().ok().and_then(|slot| slot.clone());
        match token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                InterruptAction::CancelRun
            }
            _ => InterruptAction::Exit,
        }
    }

    fn set_active(&self, token: Option<CancellationToken>) {
        if let Ok(mut slot) = self.active.lock() {
            *slot = token;
        }
    }

    /// Run one request with Ctrl-C wired to its cancellation token.
    async fn run(&self, controller: &LoopController, request: String) -> LoopResult {
        let token = CancellationToken::new();
        self.set_active(Some(token.clone()));
        let result = controller.run_with_cancel(request, token).await;
        self.set_active(None);
        result
    }
}

async fn handle_run_command(args: RunArgs) -> Result<()> {
    init_logging(args.options.verbose);
    info!("Switchboard starting");

    let request = resolve_request(&args)?;
    if request.is_empty() {
        anyhow::bail!("Request is empty");
    }

    let config = load_config(&args.options)?;
    let controller = LoopController::from_config(&config, &base_dir(&args.options))?;

    let result = Interrupts::install().run(&controller, request).await;

    finish_run(&result, &config, &args.options).await?;

    if !result.success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn handle_repl_command(options: CommonArgs) -> Result<()> {
    init_logging(options.verbose);

    let config = load_config(&options)?;
    let controller = LoopController::from_config(&config, &base_dir(&options))?;

    println!("Interactive Mode");
    println!("Enter your requests below. Type 'help' for examples, 'quit' to exit.\n");

    let interrupts = Interrupts::install();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let request = line.trim();

        match request.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" | "q" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_help();
                continue;
            }
            _ => {}
        }

        let result = interrupts.run(&controller, request.to_string()).await;
        if let Err(e) = finish_run(&result, &config, &options).await {
            eprintln!("Error: {:#}", e);
        }
        println!("\n{}\n", "─".repeat(80));
    }

    Ok(())
}

fn print_help() {
    println!("Example requests:");
    println!("  - Write a 3-paragraph summary of microservices architecture");
    println!("  - Create a Python function to calculate Fibonacci numbers");
    println!("  - Research the latest trends in AI agent frameworks, then write a summary");
    println!("  - Analyze the pros and cons of static typing and explain the results");
    println!();
    println!("Tips:");
    println!("  - Be specific in your requests");
    println!("  - The decision log shows how each request was routed");
    println!("  - Type 'quit' to leave");
}

/// Print (and optionally export) a finished run.
async fn finish_run(
    result: &LoopResult,
    config: &SwitchboardConfig,
    options: &CommonArgs,
) -> Result<()> {
    if options.json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print_result(result, config.output.show_decision_log);
    }

    if options.export {
        let slug = run_slug(result.record.original_request());
        let writer = FileOutputWriter::new(config.output.clone());
        let dir = writer.write_run(result, &slug).await?;
        print_export_location(&dir, options.json);
    }
    Ok(())
}

fn print_export_location(dir: &Path, json: bool) {
    if json {
        eprintln!("Run exported to {}", dir.display());
    } else {
        println!("\nRun exported to {}", dir.display());
    }
}

fn print_result(result: &LoopResult, show_decision_log: bool) {
    let record = &result.record;

    println!("\n========================================");
    println!("Result");
    println!("========================================");
    println!("Total iterations: {}", result.total_iterations());
    println!("Stop reason: {:?}", result.stop_reason);

    if record.has_errors() {
        println!("\nErrors occurred:");
        for error in record.errors() {
            println!("  ❌ {}", error);
        }
    }

    for id in HandlerId::ALL.iter().rev() {
        if let Some(output) = record.output(*id) {
            println!("\n--- {} output ---\n", id);
            println!("{}", format_handler_output(output));
        }
    }

    if show_decision_log && !record.events().is_empty() {
        println!("\n========================================");
        println!("Decision Log");
        println!("========================================");
        for event in record.events() {
            println!(
                "{:<12} {}  {}",
                event.actor,
                event.timestamp.format("%H:%M:%S"),
                event.summary
            );
        }
    }
}
