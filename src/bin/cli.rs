//! Novel Notify CLI
//!
//! Local execution entry point: runs the scheduler or single operations
//! against the local JSON store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use novel_notify::{
    error::{AppError, Result},
    models::{Config, SubscriberId},
    pipeline::{CheckOutcome, CycleTrigger, Scheduler, TrackOutcome, Tracker, UpdateChecker},
    services::{HttpFetcher, LogSender, MessageSender, TelegramSender},
    storage::{LocalStore, NovelStore},
};
use tokio::sync::watch;

/// Novel Notify - chapter update notifier
#[derive(Parser, Debug)]
#[command(
    name = "novel-notify",
    version,
    about = "Tracks novel catalog pages and notifies subscribers about new chapters"
)]
struct Cli {
    /// Path to storage directory containing config.toml and the data files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run scheduled check cycles until Ctrl-C
    Run,

    /// Run a single check cycle now
    Cycle,

    /// Check one novel, or every novel a subscriber follows, now
    Check {
        /// Catalog URL or numeric novel id
        #[arg(required_unless_present = "subscriber")]
        novel: Option<String>,
        #[arg(long, conflicts_with = "novel")]
        subscriber: Option<SubscriberId>,
    },

    /// Start tracking a novel for a subscriber
    Track {
        /// Catalog URL or numeric novel id
        novel: String,
        #[arg(long)]
        subscriber: SubscriberId,
    },

    /// List a subscriber's tracked novels
    List {
        #[arg(long)]
        subscriber: SubscriberId,
    },

    /// Stop tracking a novel
    Remove {
        /// Catalog URL or numeric novel id
        novel: String,
        #[arg(long)]
        subscriber: SubscriberId,
    },

    /// Pause notifications for a tracked novel
    Mute {
        /// Catalog URL or numeric novel id
        novel: String,
        #[arg(long)]
        subscriber: SubscriberId,
    },

    /// Resume notifications for a tracked novel
    Unmute {
        /// Catalog URL or numeric novel id
        novel: String,
        #[arg(long)]
        subscriber: SubscriberId,
    },

    /// Validate configuration
    Validate,

    /// Show stored state
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn build_scheduler(config: &Config, store: Arc<dyn NovelStore>) -> Result<Arc<Scheduler>> {
    let fetcher = Arc::new(HttpFetcher::new(config.fetcher.clone())?);
    let sender: Arc<dyn MessageSender> = match &config.notifier.telegram_token {
        Some(token) => Arc::new(TelegramSender::new(&config.notifier, token.as_str())?),
        None => {
            log::warn!("TELEGRAM_BOT_TOKEN not set, messages will only be logged");
            Arc::new(LogSender)
        }
    };
    let checker = UpdateChecker::new(config, store, fetcher, sender)?;
    Ok(Arc::new(Scheduler::new(config.scheduler.clone(), checker)))
}

fn describe(outcome: &CheckOutcome) -> String {
    match outcome {
        CheckOutcome::Initialized(snapshot) => {
            format!("initialized, latest chapter {}", snapshot.latest_chapter.title)
        }
        CheckOutcome::Unchanged { .. } => "no new chapter".to_string(),
        CheckOutcome::Updated { event, report } => format!(
            "new chapter {} ({} delivered)",
            event.chapter.title,
            report.map_or(0, |r| r.delivered)
        ),
    }
}

async fn set_notifications(
    tracker: &Tracker,
    subscriber: SubscriberId,
    novel: &str,
    enabled: bool,
) -> Result<()> {
    if !tracker.set_notifications(subscriber, novel, enabled).await? {
        return Err(AppError::validation(format!("{novel} is not tracked")));
    }
    log::info!(
        "Notifications for {} {}",
        novel,
        if enabled { "resumed" } else { "paused" }
    );
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::load_or_default(&config_path)
    };
    config.apply_env();
    config.storage.dir = cli.storage_dir.clone();

    if let Command::Validate = cli.command {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("Config OK");
        return Ok(());
    }
    config.validate()?;

    let store: Arc<dyn NovelStore> = Arc::new(LocalStore::new(&config.storage.dir));
    let scheduler = build_scheduler(&config, store.clone())?;
    let tracker = Tracker::new(scheduler.clone());

    match cli.command {
        Command::Run => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Could not listen for Ctrl-C: {e}");
                    return;
                }
                let _ = shutdown_tx.send(true);
            });

            let mut events = scheduler.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    log::debug!("Update event: {} -> {}", event.novel_id, event.chapter.title);
                }
            });

            scheduler.run(shutdown_rx).await;
        }

        Command::Cycle => match scheduler.run_cycle().await? {
            CycleTrigger::Ran(report) => log::info!(
                "{} novels: {} updated, {} unchanged, {} failed",
                report.total,
                report.updated,
                report.unchanged + report.initialized,
                report.failed
            ),
            CycleTrigger::Coalesced => log::info!("A cycle is already running"),
        },

        Command::Check {
            novel: Some(novel), ..
        } => {
            let outcome = tracker.check_now(&novel).await?;
            log::info!("{}: {}", novel, describe(&outcome));
        }

        Command::Check {
            subscriber: Some(subscriber),
            ..
        } => {
            let results = tracker.check_subscriber(subscriber).await?;
            if results.is_empty() {
                log::info!("Subscriber {subscriber} tracks no novels");
            }
            let mut updated = 0;
            for (novel_id, result) in &results {
                match result {
                    Ok(outcome) => {
                        updated += usize::from(outcome.event().is_some());
                        log::info!("{}: {}", novel_id, describe(outcome));
                    }
                    Err(e) => log::warn!("{novel_id}: check failed: {e}"),
                }
            }
            log::info!("{} of {} novels updated", updated, results.len());
        }

        Command::Check { .. } => {
            return Err(AppError::validation("check needs a novel or --subscriber"));
        }

        Command::Track { novel, subscriber } => match tracker.track(subscriber, &novel).await? {
            TrackOutcome::Tracking(snapshot) => log::info!(
                "Now tracking {} by {} ({} chapters, latest: {})",
                snapshot.title,
                snapshot.author,
                snapshot.total_chapters(),
                snapshot.latest_chapter.title
            ),
            TrackOutcome::AlreadyTracking(id) => log::info!("Already tracking {id}"),
        },

        Command::List { subscriber } => {
            let tracked = tracker.list(subscriber).await?;
            if tracked.is_empty() {
                log::info!("Subscriber {subscriber} tracks no novels");
            }
            for item in tracked {
                let sub = &item.subscription;
                let muted = if sub.notifications_enabled { "" } else { " [muted]" };
                match &item.snapshot {
                    Some(s) => log::info!(
                        "{} {} - latest: {} (checked {}){}",
                        sub.novel_id,
                        s.title,
                        s.latest_chapter.title,
                        s.checked_at.format("%Y-%m-%d %H:%M"),
                        muted
                    ),
                    None => log::info!("{} (not checked yet){}", sub.novel_id, muted),
                }
            }
        }

        Command::Remove { novel, subscriber } => {
            if !tracker.remove(subscriber, &novel).await? {
                return Err(AppError::validation(format!("{novel} is not tracked")));
            }
        }

        Command::Mute { novel, subscriber } => {
            set_notifications(&tracker, subscriber, &novel, false).await?
        }

        Command::Unmute { novel, subscriber } => {
            set_notifications(&tracker, subscriber, &novel, true).await?
        }

        Command::Info => {
            log::info!("Storage directory: {}", config.storage.dir.display());
            let ids = store.list_all_tracked_ids().await?;
            log::info!("Tracked novels with active subscribers: {}", ids.len());
            for id in ids {
                match store.get_snapshot(&id).await? {
                    Some(s) => log::info!(
                        "  {} {} - {} chapters, latest {}, checked {}",
                        id,
                        s.title,
                        s.total_chapters(),
                        s.latest_chapter.title,
                        s.checked_at
                    ),
                    None => log::info!("  {id} - no snapshot yet"),
                }
            }
        }

        // Handled before the store is opened
        Command::Validate => {}
    }

    Ok(())
}
