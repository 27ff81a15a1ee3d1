// src/main.rs

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::info;

use chrysalis::store::{JobQueue, SqliteDlq, SqliteQueue, SqliteRegistry, SqliteStore, init};
use chrysalis::worker::{GoverningMode, Worker, WorkerOptions};
use chrysalis::{Config, Job, PromotionPolicy, ValidationMode};

#[derive(Parser)]
#[command(name = "chrysalis")]
#[command(author, version, about = "Schema-evolution ingest worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the backing database
    Init {
        /// Database path
        #[arg(short, long, default_value = "chrysalis.db")]
        db: String,
    },
    /// Run one worker loop until interrupted
    Worker {
        /// Database path
        #[arg(short, long, default_value = "chrysalis.db")]
        db: String,
        /// Promotion policy
        #[arg(long, value_enum, default_value = "drift")]
        policy: PolicyArg,
        /// Validate against the candidate schema instead of the latest
        /// registered one
        #[arg(long)]
        candidate: bool,
        /// Derive required fields only from the schema's explicit list
        #[arg(long)]
        lenient: bool,
    },
    /// Enqueue a JSON file of documents as one ingest job
    Enqueue {
        /// Database path
        #[arg(short, long, default_value = "chrysalis.db")]
        db: String,
        /// Path to a JSON array of documents, or an object with a
        /// "documents" array
        file: PathBuf,
        /// Value recorded as the job's source
        #[arg(long, default_value = "cli")]
        source: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Drift,
    Coverage,
}

impl From<PolicyArg> for PromotionPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Drift => PromotionPolicy::Drift,
            PolicyArg::Coverage => PromotionPolicy::Coverage,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Init { db } => {
            init(&db)?;
            info!(path = %db, "database initialized");
            Ok(())
        }
        Commands::Worker {
            db,
            policy,
            candidate,
            lenient,
        } => run_worker(&db, config, policy, candidate, lenient),
        Commands::Enqueue { db, file, source } => enqueue(&db, &config, &file, &source),
    }
}

fn run_worker(
    db: &str,
    config: Config,
    policy: PolicyArg,
    candidate: bool,
    lenient: bool,
) -> Result<()> {
    let queue = SqliteQueue::open(db, &config.queue_name)?;
    let registry = SqliteRegistry::open(db)?;
    let store = SqliteStore::open(db)?;
    let dlq = SqliteDlq::open(db, &config.dlq_name)?;

    let options = WorkerOptions {
        policy: policy.into(),
        mode: if lenient {
            ValidationMode::Lenient
        } else {
            ValidationMode::Strict
        },
        governing: if candidate {
            GoverningMode::Candidate
        } else {
            GoverningMode::Latest
        },
        ..WorkerOptions::default()
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        info!("stop requested, finishing current job");
        handler_stop.store(true, Ordering::Relaxed);
    })
    .context("failed to install the interrupt handler")?;

    Worker::new(&queue, &registry, &store, &dlq, config, options).run(&stop);
    Ok(())
}

fn enqueue(db: &str, config: &Config, file: &PathBuf, source: &str) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: Value = serde_json::from_str(&raw).context("file is not valid JSON")?;

    let documents = match parsed {
        Value::Array(documents) => documents,
        Value::Object(mut fields) => match fields.remove("documents") {
            Some(Value::Array(documents)) => documents,
            _ => bail!("expected a \"documents\" array"),
        },
        _ => bail!("expected a JSON array of documents"),
    };
    if documents.is_empty() {
        bail!("no documents to enqueue");
    }

    let job = Job::new(source, documents);
    let queue = SqliteQueue::open(db, &config.queue_name)?;
    queue.push(&job.encode()?)?;
    info!(job_id = %job.job_id, documents = job.documents.len(), "job enqueued");
    Ok(())
}
