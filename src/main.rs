//! Cadre CLI - sequential pipelines of specialized AI workers

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use cadre::{
    CadreError, FixSuggestion, LlmEvaluator, ModeController, ModeReport, Pipeline,
    PipelineExecutor, PipelineInputs, PipelineRun, RunMode, RunStore, TestReport, TrainingReport,
};

#[derive(Parser)]
#[command(name = "cadre")]
#[command(about = "Cadre - run sequential pipelines of specialized AI workers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by every executing subcommand
#[derive(Args)]
struct PipelineArgs {
    /// Path to the .cadre.yaml pipeline file
    file: PathBuf,

    /// Override the worker capability backend (claude, openai, mock)
    #[arg(long)]
    capability: Option<String>,

    /// Override the default model
    #[arg(long)]
    model: Option<String>,

    /// Per-invocation timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Directory for run records
    #[arg(long, default_value = cadre::run_store::DEFAULT_STATE_DIR)]
    state_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once and print the final output
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Pipeline input as key=value (repeatable)
        #[arg(short, long)]
        input: Vec<String>,
    },

    /// Run the pipeline repeatedly, accumulating training state in a checkpoint
    Train {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Number of training iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: u32,

        /// Checkpoint file for the accumulated training state
        #[arg(long)]
        checkpoint: PathBuf,

        /// Pipeline input as key=value (repeatable)
        #[arg(short, long)]
        input: Vec<String>,
    },

    /// Re-run from a named task, reusing the latest run's earlier results
    Replay {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Task to resume from
        #[arg(long)]
        from: String,
    },

    /// Run the pipeline repeatedly and score each run with an evaluator
    Test {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Number of scored iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: u32,

        /// Capability backend used for scoring
        #[arg(long, default_value = "claude")]
        evaluator: String,

        /// Pipeline input as key=value (repeatable)
        #[arg(short, long)]
        input: Vec<String>,
    },

    /// Validate a pipeline file without executing it
    Validate {
        /// Path to the .cadre.yaml pipeline file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { pipeline, input } => execute_mode(pipeline, input, RunMode::Run).await,
        Commands::Train {
            pipeline,
            iterations,
            checkpoint,
            input,
        } => {
            execute_mode(
                pipeline,
                input,
                RunMode::Train {
                    iterations,
                    checkpoint,
                },
            )
            .await
        }
        Commands::Replay { pipeline, from } => {
            execute_mode(pipeline, vec![], RunMode::Replay { from_task: from }).await
        }
        Commands::Test {
            pipeline,
            iterations,
            evaluator,
            input,
        } => match build_evaluator(&evaluator) {
            Err(e) => Err(e),
            Ok(evaluator) => {
                execute_mode(
                    pipeline,
                    input,
                    RunMode::Test {
                        iterations,
                        evaluator,
                    },
                )
                .await
            }
        },
        Commands::Validate { file } => validate_pipeline(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

/// Load the pipeline, apply overrides, and drive the selected run mode
async fn execute_mode(
    args: PipelineArgs,
    input: Vec<String>,
    mode: RunMode,
) -> Result<(), CadreError> {
    let controller = build_controller(&args)?;
    let inputs = PipelineInputs::from_assignments(&input)?;

    match controller.execute(mode, &inputs).await? {
        ModeReport::Single(run) => print_run(&run),
        ModeReport::Training(report) => print_training(&report),
        ModeReport::Test(report) => print_test(&report),
    }
    Ok(())
}

fn build_controller(args: &PipelineArgs) -> Result<ModeController, CadreError> {
    let mut pipeline = Pipeline::from_file(&args.file)?;
    if let Some(ref capability) = args.capability {
        pipeline.capability = capability.clone();
    }
    if let Some(ref model) = args.model {
        pipeline.model = Some(model.clone());
    }

    println!(
        "{} Pipeline '{}': {} tasks | capability: {} | model: {}",
        "→".cyan(),
        pipeline.name.cyan().bold(),
        pipeline.task_count(),
        pipeline.capability.cyan(),
        pipeline.model.as_deref().unwrap_or("(default)").cyan()
    );

    let executor =
        PipelineExecutor::new(Arc::new(pipeline)).with_timeout(Duration::from_secs(args.timeout));

    // Ctrl-C cancels cooperatively at the next task boundary
    let cancel = executor.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    Ok(ModeController::new(
        executor,
        RunStore::new(&args.state_dir),
    ))
}

fn build_evaluator(capability: &str) -> Result<Box<dyn cadre::Evaluator>, CadreError> {
    let evaluator = LlmEvaluator::from_capability_name(capability)
        .map_err(|e| CadreError::InvalidArgument(format!("cannot create evaluator: {e:#}")))?;
    Ok(Box::new(evaluator))
}

fn print_run(run: &PipelineRun) {
    println!(
        "{} Completed {} tasks (run #{})",
        "✓".green(),
        run.results.len(),
        run.sequence
    );
    if let Some(output) = run.final_output() {
        println!("{}", "Output:".cyan().bold());
        println!("{output}");
    }
}

fn print_training(report: &TrainingReport) {
    println!(
        "{} Trained {} iterations | checkpoint: {}",
        "✓".green(),
        report.iterations,
        report.checkpoint.display()
    );
}

fn print_test(report: &TestReport) {
    println!("{}", "Scores:".cyan().bold());
    for iteration in &report.iterations {
        let mark = if iteration.completed {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} iteration {}: {:.1}",
            mark, iteration.iteration, iteration.score.value
        );
    }
    println!("  average: {:.2}", report.average_score());
}

fn validate_pipeline(file: &std::path::Path) -> Result<(), CadreError> {
    let pipeline = Pipeline::from_file(file)?;

    println!("{} Pipeline '{}' is valid", "✓".green(), file.display());
    println!("  Name: {}", pipeline.name);
    println!("  Capability: {}", pipeline.capability);
    println!(
        "  Model: {}",
        pipeline.model.as_deref().unwrap_or("(default)")
    );
    println!("  Workers: {}", pipeline.worker_count());
    println!("  Tasks: {}", pipeline.task_count());
    Ok(())
}
