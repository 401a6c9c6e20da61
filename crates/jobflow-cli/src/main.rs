//! Jobflow CLI — run and inspect job-application workflows.
//!
//! Workflows run against offline pass-through agents; the engine, bus and
//! state store are the same ones library callers use.

use clap::{Parser, Subcommand};

use jobflow_cli::commands;

/// Jobflow — job-application workflow runner
#[derive(Parser)]
#[command(name = "jobflow", version, about = "Jobflow — job-application workflow runner")]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(long, env = "JOBFLOW_CONFIG")]
    config: Option<String>,

    /// Directory holding workflow state files (overrides config)
    #[arg(long, env = "JOBFLOW_STATE_DIR")]
    state_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job through a workflow
    Run {
        /// Job posting URL
        url: String,
        /// Company name (derived from the URL if omitted)
        #[arg(long)]
        company: Option<String>,
        /// Role title
        #[arg(long)]
        role: Option<String>,
        /// Workflow variant, or "auto" to pick by role (defaults to workflow.default_variant)
        #[arg(long)]
        variant: Option<String>,
        /// Use this job id instead of a generated one
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Run several jobs, a few at a time
    Batch {
        /// Job posting URLs
        urls: Vec<String>,
        /// File with one URL per line
        #[arg(long, short = 'f')]
        file: Option<String>,
        /// Workflow variant, or "auto" to pick by role (defaults to workflow.default_variant)
        #[arg(long)]
        variant: Option<String>,
        /// Concurrent workflows (defaults to workflow.max_parallel)
        #[arg(long, short = 'p')]
        parallel: Option<usize>,
    },

    /// Score a job posting without running a workflow
    Score {
        /// Job posting URL
        url: String,
        /// Job description text handed to the agents
        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Check configuration, workflow variants and the state directory
    Health,

    /// Show the status of a job
    Status {
        /// Job ID
        job_id: String,
    },

    /// List stored workflows, most recently updated first
    List {
        /// Filter by status (e.g. COMPLETE, FAILED)
        #[arg(long)]
        status: Option<String>,
        /// Filter by workflow variant
        #[arg(long)]
        variant: Option<String>,
        /// Maximum number of rows
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show metrics recorded for a job
    Metrics {
        /// Job ID
        job_id: String,
    },

    /// Delete the stored state of a job
    Clear {
        /// Job ID
        job_id: String,
    },

    /// Inspect workflow variants
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Validate a workflow YAML file without running it
    Validate {
        /// Path to the workflow YAML file
        file: String,
    },
    /// List loaded workflow variants
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobflow_core=info,jobflow_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        return;
    };

    if let Err(e) = dispatch(command, cli.config.as_deref(), cli.state_dir.as_deref()).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(
    command: Commands,
    config: Option<&str>,
    state_dir: Option<&str>,
) -> Result<(), String> {
    // Validation reads a single file and needs no state.
    if let Commands::Workflow {
        action: WorkflowAction::Validate { file },
    } = &command
    {
        return commands::workflow::validate(file).map(|_| ());
    }
    // Health reports a broken config instead of failing on it.
    if matches!(command, Commands::Health) {
        return commands::health::run(config, state_dir).map(|_| ());
    }

    let orchestrator = commands::init_orchestrator(config, state_dir)?;

    match command {
        Commands::Run {
            url,
            company,
            role,
            variant,
            job_id,
        } => commands::run::run(
            &orchestrator,
            &url,
            company.as_deref(),
            role.as_deref(),
            variant.as_deref(),
            job_id.as_deref(),
        )
        .await
        .map(|_| ()),

        Commands::Batch {
            urls,
            file,
            variant,
            parallel,
        } => {
            let summary = commands::batch::run(
                &orchestrator,
                urls,
                file.as_deref(),
                variant.as_deref(),
                parallel,
            )
            .await?;
            if summary.failed == 0 {
                Ok(())
            } else {
                Err(format!("{} of {} jobs failed", summary.failed, summary.total))
            }
        }

        Commands::Score { url, description } => {
            let outcome = commands::score::run(&orchestrator, &url, description.as_deref()).await;
            orchestrator.shutdown().await;
            outcome.map(|_| ())
        }

        Commands::Health => commands::health::run(config, state_dir).map(|_| ()),

        Commands::Status { job_id } => commands::state::status(&orchestrator, &job_id)
            .await
            .map(|_| ()),

        Commands::List {
            status,
            variant,
            limit,
            json,
        } => commands::state::list(
            &orchestrator,
            status.as_deref(),
            variant.as_deref(),
            limit,
            json,
        )
        .await
        .map(|_| ()),

        Commands::Metrics { job_id } => commands::state::metrics(&orchestrator, &job_id)
            .await
            .map(|_| ()),

        Commands::Clear { job_id } => commands::state::clear(&orchestrator, &job_id).await,

        Commands::Workflow { action } => match action {
            WorkflowAction::List => commands::workflow::list(&orchestrator),
            WorkflowAction::Validate { file } => commands::workflow::validate(&file).map(|_| ()),
        },
    }
}
