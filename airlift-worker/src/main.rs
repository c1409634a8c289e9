use airlift_core::artwork::ArtworkProcessor;
use airlift_core::config::AppConfig;
use airlift_core::db::{Database, DbFile, DbPlatform, FileKind};
use airlift_core::distribution::{Distributor, TemplatedPlatformClient};
use airlift_core::jobs::{spawn_housekeeping, Job, JobContext, JobScheduler, JobSchedulerHandle};
use airlift_core::metadata::MetadataExtractor;
use airlift_core::notify::{HttpMailer, LoggingMailer, MailTransport, Notifier};
use airlift_core::store::LocalFileStore;
use airlift_core::validation::ValidationPolicy;
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// airlift headless worker — runs file processing, distribution and
/// housekeeping off the web request path.
#[derive(Parser)]
#[command(name = "airlift-worker")]
struct Args {
    /// Path to airlift.yaml (ignored in dev mode).
    #[arg(long, env = "AIRLIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the database path from the config file.
    #[arg(long, env = "AIRLIFT_DATABASE_PATH_OVERRIDE")]
    database_path: Option<PathBuf>,

    /// Override the worker pool size from the config file.
    #[arg(long)]
    workers: Option<usize>,

    /// How often to poll for newly uploaded files, in seconds.
    #[arg(long, default_value = "5")]
    poll_interval: u64,
}

fn configure_logging() {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_target(false)
        .with_file(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() {
    configure_logging();
    let args = Args::parse();

    info!("airlift-worker starting");

    let mut config = AppConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        error!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    if let Some(database_path) = args.database_path {
        config.database_path = database_path;
    }
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }

    let database = Database::new(&config.database_path).await.unwrap_or_else(|e| {
        error!("Failed to open database: {e}");
        std::process::exit(1);
    });

    if let Err(e) = seed_default_platforms(&database).await {
        error!("Failed to seed platforms: {e}");
        std::process::exit(1);
    }

    let transport: Arc<dyn MailTransport> = match &config.mail_endpoint {
        Some(endpoint) => Arc::new(HttpMailer::new(endpoint, config.mail_api_key.clone())),
        None => {
            warn!("No mail endpoint configured; notifications will only be logged");
            Arc::new(LoggingMailer)
        }
    };
    let notifier = Arc::new(Notifier::new(transport, config.mail_sender.clone()));

    let distributor = Arc::new(Distributor::new(
        database.clone(),
        Arc::new(TemplatedPlatformClient::new()),
        notifier,
        config.attempt_timeout(),
    ));

    let ctx = JobContext {
        database: database.clone(),
        extractor: Arc::new(MetadataExtractor::with_defaults()),
        validation: ValidationPolicy::default(),
        artwork: ArtworkProcessor::new(config.artwork_policy()),
        store: Arc::new(LocalFileStore::new(config.storage_root.clone())),
        distributor,
        cleanup: config.cleanup(),
    };

    let scheduler = JobScheduler::start(ctx, config.worker_count);
    let housekeeping = spawn_housekeeping(config.cleanup());
    let poller = spawn_pending_file_poller(
        database,
        scheduler.clone(),
        Duration::from_secs(args.poll_interval.max(1)),
    );

    info!(
        "airlift-worker ready ({} workers, sweeping {} scratch dirs)",
        config.worker_count,
        config.scratch_dirs.len()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("airlift-worker shutting down");
    housekeeping.abort();
    poller.abort();
}

/// Enqueue processing jobs for files still pending in the database.
///
/// The web app only writes rows; this poll loop is what turns them into
/// work. Already-enqueued files are remembered so a slow job is not queued
/// twice while it still shows `pending`.
fn spawn_pending_file_poller(
    database: Database,
    scheduler: JobSchedulerHandle,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut enqueued: HashSet<String> = HashSet::new();
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let pending = match database.list_pending_files().await {
                Ok(pending) => pending,
                Err(e) => {
                    warn!("Failed to poll pending files: {e}");
                    continue;
                }
            };
            // Files that left the pending state can be forgotten, which keeps
            // the dedup set bounded over a long-running worker.
            let pending_ids: HashSet<&str> = pending.iter().map(|f| f.id.as_str()).collect();
            enqueued.retain(|id| pending_ids.contains(id.as_str()));
            for file in pending {
                if !enqueued.insert(file.id.clone()) {
                    continue;
                }
                let job = job_for_file(&file);
                info!("Queueing {:?} for file {}", job, file.id);
                scheduler.enqueue(job);
            }
        }
    })
}

fn job_for_file(file: &DbFile) -> Job {
    match file.file_kind {
        FileKind::Audio => Job::ProcessAudioFile {
            file_id: file.id.clone(),
        },
        FileKind::Artwork => Job::ProcessArtworkFile {
            file_id: file.id.clone(),
        },
    }
}

/// First-run platform seed. Real deployments manage this table directly;
/// seeding keeps a fresh database usable out of the box.
async fn seed_default_platforms(database: &Database) -> Result<(), sqlx::Error> {
    if database.platform_count().await? > 0 {
        return Ok(());
    }

    for (name, display_name) in [
        ("spotify", "Spotify"),
        ("apple music", "Apple Music"),
        ("youtube music", "YouTube Music"),
    ] {
        let mut platform = DbPlatform::new(name, display_name);
        platform.max_file_size = Some(200 * 1024 * 1024);
        platform.supported_formats = Some("mp3,wav,flac,ogg".to_string());
        database.insert_platform(&platform).await?;
        info!("Seeded platform {display_name}");
    }
    Ok(())
}
