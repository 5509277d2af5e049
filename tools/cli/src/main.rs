//! FieldSync CLI - Command line interface for offline-first field records.
//!
//! Records are written to the local store first. `sync` pushes whatever is
//! dirty when the remote is reachable, and `watch` keeps doing so every time
//! connectivity returns.

mod config;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use fieldsync_common::{Evidence, EvidenceType, Project, RecordId, SyncItem, Task, TaskStatus};
use fieldsync_storage::{create_default_registry, LocalStore};
use fieldsync_sync::{
    HttpRemote, ManualMonitor, NetworkMonitor, ProbeMonitor, StatusAggregator, SyncEngine,
};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "FieldSync - Offline-first field data capture and sync")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of the file-backed store.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Base URL of the sync API.
    #[arg(short, long)]
    remote_url: Option<String>,

    /// Treat the network as unavailable.
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectCommand,
    },

    /// Manage tasks.
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },

    /// Manage evidence.
    Evidence {
        #[command(subcommand)]
        action: EvidenceCommand,
    },

    /// Flag an existing record for the next sync.
    Queue(QueueTarget),

    /// Run one sync cycle now.
    Sync,

    /// Show the sync summary.
    Status,

    /// Sync whenever connectivity returns, until Ctrl-C.
    Watch,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project.
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List projects.
    List,
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Create a task in a project.
    Add {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Due date (RFC 3339).
        #[arg(long)]
        due: Option<DateTime<Utc>>,
    },

    /// Edit a task.
    Update {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Due date (RFC 3339).
        #[arg(long)]
        due: Option<DateTime<Utc>>,
    },

    /// Mark a task completed.
    Complete { id: String },

    /// List tasks, optionally for one project.
    List {
        #[arg(short, long)]
        project: Option<String>,
    },
}

#[derive(Subcommand)]
enum EvidenceCommand {
    /// Record captured evidence for a task.
    Add {
        #[arg(short, long)]
        task: String,

        /// "photo", "document", or "file".
        #[arg(short = 'k', long, default_value = "photo")]
        kind: EvidenceType,

        /// Path to the captured file.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List evidence, optionally for one task.
    List {
        #[arg(short, long)]
        task: Option<String>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct QueueTarget {
    /// Task id.
    #[arg(long)]
    task: Option<String>,

    /// Evidence id.
    #[arg(long)]
    evidence: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    }
    .with_overrides(cli.data_dir, cli.remote_url);

    let store = open_store(&config)?;

    match cli.command {
        Commands::Project { action } => cmd_project(&store, action).await,
        Commands::Task { action } => cmd_task(&store, action).await,
        Commands::Evidence { action } => cmd_evidence(&store, action).await,
        Commands::Queue(target) => cmd_queue(&store, target).await,
        Commands::Sync => cmd_sync(store, &config, cli.offline).await,
        Commands::Status => cmd_status(store, &config, cli.offline).await,
        Commands::Watch => cmd_watch(store, &config, cli.offline).await,
    }
}

fn open_store(config: &CliConfig) -> Result<Arc<LocalStore>> {
    let registry = create_default_registry();
    let kv = registry
        .resolve(&config.store.kind, config.store.options.clone())
        .with_context(|| format!("Failed to open '{}' store", config.store.kind))?;
    info!("Using {} store", kv.name());
    Ok(Arc::new(LocalStore::new(kv)))
}

async fn open_network(config: &CliConfig, offline: bool) -> Result<Arc<dyn NetworkMonitor>> {
    if offline {
        return Ok(Arc::new(ManualMonitor::offline()));
    }
    match config.probe_config()? {
        Some(probe) => Ok(Arc::new(ProbeMonitor::start(probe).await)),
        None => {
            warn!("No remote configured, treating network as unavailable");
            Ok(Arc::new(ManualMonitor::offline()))
        }
    }
}

async fn open_engine(
    store: Arc<LocalStore>,
    config: &CliConfig,
    offline: bool,
) -> Result<Arc<SyncEngine>> {
    let url = config
        .remote_url
        .as_deref()
        .context("No remote URL configured (use --remote-url or the config file)")?;
    let remote = HttpRemote::new(url, config.request_timeout()).context("Invalid remote URL")?;
    let network = open_network(config, offline).await?;
    Ok(Arc::new(SyncEngine::new(
        store,
        network,
        Arc::new(remote),
        config.sync.clone(),
    )))
}

fn record_id(raw: &str) -> Result<RecordId> {
    RecordId::new(raw).with_context(|| format!("Invalid id: {:?}", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to format output")?;
    println!("{}", out);
    Ok(())
}

async fn cmd_project(store: &LocalStore, action: ProjectCommand) -> Result<()> {
    match action {
        ProjectCommand::Add { name, description } => {
            let project = store
                .add_project(Project::new(name, description))
                .await
                .context("Failed to add project")?;
            info!("Created project {}", project.id);
            print_json(&project)
        }
        ProjectCommand::List => {
            let projects = store.get_projects().await.context("Failed to read projects")?;
            print_json(&projects)
        }
    }
}

async fn cmd_task(store: &LocalStore, action: TaskCommand) -> Result<()> {
    match action {
        TaskCommand::Add {
            project,
            title,
            description,
            due,
        } => {
            let mut task = Task::new(record_id(&project)?, title, description);
            if let Some(due) = due {
                task = task.with_due_date(due);
            }
            let task = store.add_task(task).await.context("Failed to add task")?;
            info!("Created task {}", task.id);
            print_json(&task)
        }
        TaskCommand::Update {
            id,
            title,
            description,
            due,
        } => {
            let task = store
                .update_task(&record_id(&id)?, |task| {
                    if let Some(title) = title {
                        task.title = title;
                    }
                    if let Some(description) = description {
                        task.description = description;
                    }
                    if due.is_some() {
                        task.due_date = due;
                    }
                })
                .await
                .context("Failed to update task")?;
            print_json(&task)
        }
        TaskCommand::Complete { id } => {
            let task = store
                .set_task_status(&record_id(&id)?, TaskStatus::Completed)
                .await
                .context("Failed to complete task")?;
            print_json(&task)
        }
        TaskCommand::List { project } => {
            let project = project.as_deref().map(record_id).transpose()?;
            let tasks = store
                .get_tasks(project.as_ref())
                .await
                .context("Failed to read tasks")?;
            print_json(&tasks)
        }
    }
}

async fn cmd_evidence(store: &LocalStore, action: EvidenceCommand) -> Result<()> {
    match action {
        EvidenceCommand::Add { task, kind, file } => {
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .with_context(|| format!("Not a file path: {}", file.display()))?;
            let evidence = Evidence::new(
                record_id(&task)?,
                kind,
                file_name,
                file.to_string_lossy(),
            );
            let evidence = store
                .add_evidence(evidence)
                .await
                .context("Failed to add evidence")?;
            info!("Recorded evidence {} for task {}", evidence.id, evidence.task_id);
            print_json(&evidence)
        }
        EvidenceCommand::List { task } => {
            let task = task.as_deref().map(record_id).transpose()?;
            let evidence = store
                .get_evidence(task.as_ref())
                .await
                .context("Failed to read evidence")?;
            print_json(&evidence)
        }
    }
}

async fn cmd_queue(store: &LocalStore, target: QueueTarget) -> Result<()> {
    let item: SyncItem = match (target.task, target.evidence) {
        (Some(id), _) => store
            .get_one::<Task>(&record_id(&id)?)
            .await?
            .with_context(|| format!("Task not found: {}", id))?
            .into(),
        (None, Some(id)) => store
            .get_one::<Evidence>(&record_id(&id)?)
            .await?
            .with_context(|| format!("Evidence not found: {}", id))?
            .into(),
        (None, None) => anyhow::bail!("Pass --task or --evidence"),
    };

    let queued = store
        .queue_item(item)
        .await
        .context("Failed to queue record")?;
    println!("Queued {} {} for sync", queued.bucket(), queued.id());
    Ok(())
}

async fn cmd_sync(store: Arc<LocalStore>, config: &CliConfig, offline: bool) -> Result<()> {
    let engine = open_engine(store, config, offline).await?;
    let result = engine.manual_sync().await;
    print_json(&result)?;
    if !result.success {
        anyhow::bail!("Sync did not complete: {}", result.errors.join("; "));
    }
    Ok(())
}

async fn cmd_status(store: Arc<LocalStore>, config: &CliConfig, offline: bool) -> Result<()> {
    let network = open_network(config, offline).await?;
    let status = StatusAggregator::new(store, network).snapshot().await;
    if let Some(e) = &status.read_error {
        warn!("Status is incomplete: {}", e);
    }
    print_json(&status)
}

async fn cmd_watch(store: Arc<LocalStore>, config: &CliConfig, offline: bool) -> Result<()> {
    let engine = open_engine(store, config, offline).await?;
    engine.on_sync_complete(|success| {
        if success {
            info!("Background sync completed");
        } else {
            warn!("Background sync finished with errors");
        }
    });

    engine.start_auto_sync().await;
    if engine.get_sync_status_data().await.is_online {
        let result = engine.manual_sync().await;
        print_json(&result)?;
    }

    info!("Watching for connectivity changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    engine.stop_auto_sync();
    print_json(&engine.get_sync_status_data().await)
}
