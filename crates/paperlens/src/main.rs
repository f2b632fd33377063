//! `paperlens` command-line host for the document pipeline.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

use paperlens::config::{default_config_path, load_config};
use paperlens::logging::init_logging;
use paperlens::registry::JobQuery;
use paperlens::taxonomy::{TopicCatalog, TopicProvider};
use paperlens::worker::{JobStatus, Orchestrator, PollPolicy, SubmitMetadata};
use paperlens::Result;

#[derive(Parser, Debug)]
#[command(name = "paperlens")]
#[command(about = "Extract and analyze academic papers")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.paperlens/config.json)
    #[arg(short, long, global = true, env = "PAPERLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a document and wait for its analysis
    Process {
        file: PathBuf,
        #[arg(long, env = "PAPERLENS_OWNER")]
        owner: String,
        /// Declared MIME type
        #[arg(long)]
        mime: Option<String>,
        /// Seconds between status polls
        #[arg(long, default_value_t = 5)]
        interval: u64,
        /// Polls before giving up
        #[arg(long, default_value_t = 60)]
        attempts: u32,
    },
    /// Show a job
    Status {
        job_id: String,
        #[arg(long, env = "PAPERLENS_OWNER")]
        owner: String,
    },
    /// Print a job's analysis result
    Result {
        job_id: String,
        #[arg(long, env = "PAPERLENS_OWNER")]
        owner: String,
    },
    /// Delete a job, its result and its files
    Delete {
        job_id: String,
        #[arg(long, env = "PAPERLENS_OWNER")]
        owner: String,
    },
    /// List an owner's jobs, newest first
    List {
        #[arg(long, env = "PAPERLENS_OWNER")]
        owner: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
    },
    /// Inspect or extend the topic taxonomy
    Topics {
        #[command(subcommand)]
        action: TopicsAction,
    },
    /// Apply the recovery policy to unfinished jobs
    Recover,
    /// Job counts and daily processing statistics
    Stats {
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TopicsAction {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = load_config(&config_path)?;
    init_logging(&config.log_level, cli.log_json)?;

    info!(
        "paperlens v{} using {}",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    let orchestrator = Orchestrator::from_config(&config)?;

    // Drain even on error so no spawned pipeline is cut off mid-stage.
    let outcome = dispatch(&orchestrator, cli.command).await;
    orchestrator.drain().await;
    outcome
}

async fn dispatch(orchestrator: &Orchestrator, command: Command) -> Result<ExitCode> {
    let code = match command {
        Command::Process {
            file,
            owner,
            mime,
            interval,
            attempts,
        } => {
            orchestrator.recover()?;
            let policy = PollPolicy {
                interval: Duration::from_secs(interval),
                max_attempts: attempts,
            };
            process(orchestrator, &file, &owner, mime, policy).await?
        }
        Command::Status { job_id, owner } => {
            print_json(&orchestrator.get_job(&job_id, &owner)?.view())?;
            ExitCode::SUCCESS
        }
        Command::Result { job_id, owner } => {
            print_json(&orchestrator.get_result(&job_id, &owner)?)?;
            ExitCode::SUCCESS
        }
        Command::Delete { job_id, owner } => {
            orchestrator.delete_job(&job_id, &owner)?;
            println!("Deleted {}", job_id);
            ExitCode::SUCCESS
        }
        Command::List {
            owner,
            status,
            limit,
            offset,
        } => {
            let status = match status.as_deref() {
                Some(s) => match JobStatus::parse(s) {
                    Some(status) => Some(status),
                    None => {
                        eprintln!("Unknown status '{}'", s);
                        return Ok(ExitCode::from(2));
                    }
                },
                None => None,
            };
            let query = JobQuery {
                status,
                limit,
                offset,
            };
            print_json(&orchestrator.list_jobs(&owner, &query)?)?;
            ExitCode::SUCCESS
        }
        Command::Topics { action } => {
            let catalog = TopicCatalog::new(orchestrator.registry().database().clone());
            match action {
                TopicsAction::List => print_json(&catalog.list_topics()?)?,
                TopicsAction::Add { name, description } => {
                    print_json(&catalog.add(&name, &description)?)?
                }
            }
            ExitCode::SUCCESS
        }
        Command::Recover => {
            let report = orchestrator.recover()?;
            println!(
                "Recovered jobs: {} failed, {} resumed",
                report.failed, report.resumed
            );
            ExitCode::SUCCESS
        }
        Command::Stats { from, to } => {
            #[derive(Serialize)]
            struct StatsOutput {
                jobs: paperlens::registry::StatusCounts,
                daily: Vec<paperlens::db::stats_repo::ProcessingStatRow>,
            }
            let registry = orchestrator.registry();
            print_json(&StatsOutput {
                jobs: registry.status_counts()?,
                daily: registry.stats(from.as_deref(), to.as_deref())?,
            })?;
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}

async fn process(
    orchestrator: &Orchestrator,
    file: &Path,
    owner: &str,
    mime: Option<String>,
    policy: PollPolicy,
) -> Result<ExitCode> {
    let content = tokio::fs::read(file).await?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut metadata = SubmitMetadata::new(filename);
    if let Some(mime) = mime {
        metadata = metadata.with_mime_type(mime);
    }

    let job_id = orchestrator.submit(owner, &content, metadata)?;
    eprintln!("Submitted job {}", job_id);

    let job = orchestrator.wait_or_drain(&job_id, owner, policy).await?;
    match job.status {
        JobStatus::Analyzed => {
            print_json(&orchestrator.get_result(&job_id, owner)?)?;
            Ok(ExitCode::SUCCESS)
        }
        JobStatus::Uploaded | JobStatus::Processing => {
            eprintln!("Job {} is still {}", job_id, job.status);
            Ok(ExitCode::FAILURE)
        }
        JobStatus::Failed => {
            eprintln!(
                "Job {} failed during {}",
                job_id,
                job.failed_stage
                    .map(|s| s.as_str())
                    .unwrap_or("processing")
            );
            print_json(&job.view())?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
