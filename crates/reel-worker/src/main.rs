//! Pipeline worker binary.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_jobstore::{JobStore, PostgrestJobStore};
use reel_models::JobId;
use reel_queue::JobQueue;
use reel_storage::{ObjectStore, StorageClient};
use reel_worker::{config, metrics, JobExecutor, Pipeline, Providers, WorkerConfig, WorkerResult};

#[derive(Debug, Parser)]
#[command(name = "reel-worker", about = "Turns queued scripts into narrated videos")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Consume dispatch messages from Redis until interrupted
    Run,
    /// Run a single job's pipeline and exit
    Once {
        #[arg(long, env = "JOB_ID")]
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    init_tracing();
    let cli = Cli::parse();
    info!("Starting reel-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match metrics::install_exporter(addr) {
            Ok(()) => info!("Prometheus metrics on {}", addr),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let pipeline = match build_pipeline(config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("Failed to set up pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Once { job_id } => run_once(&pipeline, JobId::from_string(job_id)).await,
        Command::Run => run_queue(pipeline).await,
    }
}

fn build_pipeline(config: WorkerConfig) -> WorkerResult<Pipeline> {
    config::require_backends()?;
    let jobs: Arc<dyn JobStore> = Arc::new(PostgrestJobStore::from_env()?);
    let storage: Arc<dyn ObjectStore> = Arc::new(StorageClient::from_env()?);

    let providers = Providers::from_env(&config)?;
    Ok(Pipeline::new(config, jobs, storage, providers))
}

async fn run_once(pipeline: &Pipeline, job_id: JobId) -> ExitCode {
    if !job_id.is_valid() {
        error!("Invalid job id: {}", job_id);
        return ExitCode::FAILURE;
    }

    match pipeline.run(&job_id).await {
        Ok(()) => {
            info!(job_id = %job_id, "Job complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(job_id = %job_id, "Job failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_queue(pipeline: Arc<Pipeline>) -> ExitCode {
    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown_timeout = pipeline.config().shutdown_timeout;
    let executor = Arc::new(JobExecutor::new(pipeline, queue));

    let runner = Arc::clone(&executor);
    let mut handle = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        joined = &mut handle => return exit_code(joined),
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            executor.shutdown();
        }
    }

    match tokio::time::timeout(shutdown_timeout, handle).await {
        Ok(joined) => {
            let code = exit_code(joined);
            info!("Worker shutdown complete");
            code
        }
        Err(_) => {
            // The job row stays mid-stage; its redelivery fails it as interrupted
            warn!("Job still running after {:?}, exiting anyway", shutdown_timeout);
            ExitCode::FAILURE
        }
    }
}

fn exit_code(joined: Result<WorkerResult<()>, tokio::task::JoinError>) -> ExitCode {
    match joined {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("Executor error: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Executor task panicked: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reel=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
