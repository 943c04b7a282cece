//! sandrun-cli: run one leased task through the sandboxed pipeline.
//!
//! Leasing is not done here. A task context (the engine's external-task
//! JSON) is read from a file, executed, and the outcome printed as JSON for
//! whatever reports it back to the engine.
//!
//! # 使用例
//! ```text
//! sandrun-cli --config sandrun.toml run --package robots.zip --task task.json
//! sandrun-cli topics --package robots/
//! ```
//!
//! Logs go to stderr so stdout stays a single JSON document.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sandrun_core::app::WorkerBuilder;
use sandrun_core::config::{PackageManifest, WorkerSettings};
use sandrun_core::domain::TaskContext;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sandrun-cli")]
#[command(about = "Run workflow tasks as sandboxed subprocesses", long_about = None)]
#[command(version)]
struct Cli {
    /// Worker settings file (TOML); SANDRUN_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one task context and print the outcome
    Run {
        /// Package directory or zip archive
        #[arg(long)]
        package: PathBuf,

        /// Topic to run; defaults to the task's own topicName
        #[arg(long)]
        topic: Option<String>,

        /// Task context JSON as delivered by the engine
        #[arg(long)]
        task: PathBuf,
    },

    /// List the topics a package declares: topic, policy, lease scope, name
    Topics {
        /// Package directory or zip archive
        #[arg(long)]
        package: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // settings を先に読む (log level の既定値がそこにあるため)
    let settings = WorkerSettings::load(cli.config.as_deref()).context("loading settings")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            package,
            topic,
            task,
        } => run(settings, &package, topic, &task).await,
        Commands::Topics { package } => {
            let manifest = PackageManifest::load(&package)
                .with_context(|| format!("reading manifest of {}", package.display()))?;
            for (topic, config) in &manifest.topics {
                let policy = config.effective_policy(settings.on_fail);
                let scope = config.lease_scope();
                let name = config.name.as_deref().unwrap_or("");
                println!("{topic}\t{policy}\t{scope}\t{name}");
            }
            Ok(())
        }
    }
}

async fn run(
    settings: WorkerSettings,
    package: &Path,
    topic: Option<String>,
    task_file: &Path,
) -> Result<()> {
    let text = std::fs::read_to_string(task_file)
        .with_context(|| format!("reading {}", task_file.display()))?;
    let mut task: TaskContext =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", task_file.display()))?;

    // --topic は task 側の topicName より優先
    if let Some(topic) = topic {
        task.topic_name = Some(topic);
    }
    let Some(topic) = task.topic_name.clone() else {
        bail!("no topic: pass --topic or set topicName in the task");
    };

    let worker = WorkerBuilder::new(settings)
        .package(package)
        .expect_topics(&[topic.as_str()])
        .build()?;

    let outcome = worker.execute(&task).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
