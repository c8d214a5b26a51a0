//! eventsync - Redmine to event calendar synchronization
//!
//! Main entry point for the eventsync CLI.

use anyhow::{bail, Context};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use eventsync::config::{validate_config_result, EventSyncConfig, MappingFile};
use eventsync::integrations::{RedmineAdapter, RetryPolicy};
use eventsync::model::IssueId;
use eventsync::storage::{Checkpoint, CheckpointStore, FileCheckpointStore, SqliteEventStore};
use eventsync::sync::{SyncContext, SyncRunner};
use eventsync::templates::{expand_template, TemplateTrackers};
use eventsync::EventSyncError;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// eventsync - One-way sync of Redmine event tickets into the event calendar
#[derive(Parser, Debug)]
#[command(name = "eventsync")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to config file (default: ~/.config/eventsync/config.yaml)
    #[arg(short, long, global = true, env = "EVENTSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Run the pass and log decisions, but commit nothing and keep the checkpoint
    #[arg(long, global = true)]
    dry_run: bool,

    /// Poll every INTERVAL seconds; run once when absent or 0
    interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect or move the sync checkpoint
    #[command(subcommand)]
    Checkpoint(CheckpointCommands),

    /// Work with recurring event templates
    #[command(subcommand)]
    Template(TemplateCommands),
}

#[derive(Subcommand, Debug)]
enum CheckpointCommands {
    /// Print the stored checkpoint
    Show,

    /// Set the checkpoint to a local date and time
    Set {
        /// Date (YYYY-MM-DD)
        date: String,

        /// Time (HH:MM:SS, default 00:00:00)
        time: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateCommands {
    /// Expand a template issue into one event issue per occurrence
    Expand {
        /// Redmine id of the template issue
        issue_id: u64,

        /// Create the issues in Redmine instead of printing them
        #[arg(long)]
        create: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %format!("{:#}", e), "eventsync failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config {
        Some(ref path) => EventSyncConfig::load(path)?,
        None => EventSyncConfig::load_default()
            .context("No configuration found (pass --config or set EVENTSYNC_CONFIG)")?,
    };

    if let Err(e) = eventsync::logging::init(config.logging.file.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    validate_config_result(&config)?;

    match cli.command {
        Some(Commands::Checkpoint(cmd)) => handle_checkpoint_command(&cmd, &config),
        Some(Commands::Template(TemplateCommands::Expand { issue_id, create })) => {
            handle_template_expand(&config, issue_id, create && !cli.dry_run).await
        }
        None => run_sync(&config, cli.interval.unwrap_or(0), cli.dry_run).await,
    }
}

async fn run_sync(config: &EventSyncConfig, interval: u64, dry_run: bool) -> anyhow::Result<()> {
    let source = RedmineAdapter::from_config(&config.redmine)?;
    let store = SqliteEventStore::open(&config.database.path).with_context(|| {
        format!("Failed to open event database {}", config.database.path.display())
    })?;
    let checkpoints = FileCheckpointStore::new(&config.checkpoint.path);
    let mappings = MappingFile::load(&config.mappings.path).with_context(|| {
        format!("Failed to load project mappings {}", config.mappings.path.display())
    })?;

    for label in source.unknown_status_labels(&config.statuses).await? {
        tracing::warn!(label = %label, "Configured status label is not a Redmine status");
    }

    let context = SyncContext::resolve(config, &mappings, &source, &store)
        .await
        .context("Failed to resolve sync user, category, trackers or mappings")?;
    let mut runner = SyncRunner::new(source, store, checkpoints, context).with_dry_run(dry_run);

    if interval == 0 {
        let report = runner.run_once().await?;
        if dry_run {
            for decision in &report.decisions {
                println!("#{} {} {}", decision.issue_id, decision.action, decision.url);
            }
        }
        Ok(())
    } else {
        runner.run_forever(Duration::from_secs(interval)).await?;
        Ok(())
    }
}

fn handle_checkpoint_command(
    cmd: &CheckpointCommands,
    config: &EventSyncConfig,
) -> anyhow::Result<()> {
    let store = FileCheckpointStore::new(&config.checkpoint.path);

    match cmd {
        CheckpointCommands::Show => match store.load_checkpoint()? {
            Some(checkpoint) => println!("{}", checkpoint.last_updated.to_rfc3339()),
            None => println!("No checkpoint stored at {}", store.path().display()),
        },
        CheckpointCommands::Set { date, time } => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
            let time = match time {
                Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S")
                    .with_context(|| format!("Invalid time '{}', expected HH:MM:SS", t))?,
                None => NaiveTime::MIN,
            };

            let checkpoint = Checkpoint::from_local(date, time)?;
            store.save_checkpoint(&checkpoint)?;
            tracing::info!(checkpoint = %checkpoint.last_updated, "Checkpoint set");
            println!("{}", checkpoint.last_updated.to_rfc3339());
        }
    }

    Ok(())
}

async fn handle_template_expand(
    config: &EventSyncConfig,
    issue_id: u64,
    create: bool,
) -> anyhow::Result<()> {
    let adapter =
        RedmineAdapter::from_config(&config.redmine)?.with_retry_policy(RetryPolicy::interactive());
    let template = adapter
        .get_issue(IssueId(issue_id))
        .await
        .with_context(|| format!("Failed to fetch template issue #{}", issue_id))?;

    if template.tracker.name != config.redmine.template_tracker {
        bail!(
            "Issue #{} is a '{}', not a '{}'",
            issue_id,
            template.tracker.name,
            config.redmine.template_tracker
        );
    }

    let trackers = TemplateTrackers {
        internal: resolve_tracker(&adapter, config.redmine.internal_tracker()).await?,
        external: resolve_tracker(&adapter, config.redmine.external_tracker()).await?,
    };

    let drafts = expand_template(&template, &trackers)
        .with_context(|| format!("Failed to expand template issue #{}", issue_id))?;
    tracing::info!(issue_id, drafts = drafts.len(), "Template expanded");

    if !create {
        println!("{}", serde_json::to_string_pretty(&drafts)?);
        return Ok(());
    }

    for draft in &drafts {
        let created = adapter
            .create_issue(draft)
            .await
            .with_context(|| format!("Failed to create '{}'", draft.subject))?;
        println!("#{} {}", created.id, created.subject);
    }

    Ok(())
}

async fn resolve_tracker(
    adapter: &RedmineAdapter,
    name: Option<&str>,
) -> eventsync::Result<redmine::IdName> {
    let name = name.ok_or_else(|| {
        EventSyncError::Config("redmine.trackers needs an internal and an external tracker".into())
    })?;
    adapter
        .find_tracker(name)
        .await?
        .ok_or_else(|| EventSyncError::UnknownTracker(name.to_string()))
}
