//! The asynchronous carrier for extraction, validation, distribution and
//! housekeeping work.
//!
//! Jobs run on a bounded worker pool off the request path. Job status is
//! observational only — it reports progress to subscribers and never gates
//! the correctness of the underlying work, which commits its own state to the
//! database. Every job execution receives its context explicitly; there is no
//! ambient application state to re-enter.

mod cleanup;
mod tasks;

pub use cleanup::{spawn_housekeeping, sweep_once, CleanupConfig, SweepStats};

use crate::artwork::{ArtworkError, ArtworkProcessor};
use crate::db::Database;
use crate::distribution::{DistributionError, Distributor};
use crate::metadata::{MetadataError, MetadataExtractor};
use crate::store::{FileStore, StoreError};
use crate::validation::ValidationPolicy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("release not found: {0}")]
    ReleaseNotFound(String),
    #[error("file validation failed: {0}")]
    ValidationFailed(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Artwork(#[from] ArtworkError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("cleanup sweep failed: {0}")]
    Cleanup(#[from] std::io::Error),
}

/// The work this core runs off the request path.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    ProcessAudioFile { file_id: String },
    ProcessArtworkFile { file_id: String },
    DistributeRelease { release_id: String },
    CleanupScratch,
}

pub type JobId = String;

/// Coarse progress state for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Everything a job execution needs, bundled and passed in explicitly.
#[derive(Clone)]
pub struct JobContext {
    pub database: Database,
    pub extractor: Arc<MetadataExtractor>,
    pub validation: ValidationPolicy,
    pub artwork: ArtworkProcessor,
    pub store: Arc<dyn FileStore>,
    pub distributor: Arc<Distributor>,
    pub cleanup: CleanupConfig,
}

struct QueuedJob {
    id: JobId,
    job: Job,
}

pub struct JobScheduler;

impl JobScheduler {
    /// Start the dispatcher and return a handle for enqueueing and observing.
    ///
    /// At most `worker_count` jobs run concurrently; further jobs wait in the
    /// queue. Dropping every handle shuts the dispatcher down once the queue
    /// drains.
    pub fn start(ctx: JobContext, worker_count: usize) -> JobSchedulerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedJob>();
        let statuses: Arc<Mutex<HashMap<JobId, JobStatus>>> = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, _) = broadcast::channel(64);

        let dispatcher_statuses = statuses.clone();
        let dispatcher_events = events_tx.clone();
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
            let ctx = Arc::new(ctx);
            while let Some(queued) = rx.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let ctx = ctx.clone();
                let statuses = dispatcher_statuses.clone();
                let events = dispatcher_events.clone();
                tokio::spawn(async move {
                    set_status(&statuses, &events, &queued.id, JobStatus::Running);
                    let result = run_job(&ctx, &queued.job).await;
                    let status = match result {
                        Ok(()) => JobStatus::Succeeded,
                        Err(e) => {
                            warn!("Job {} ({:?}) failed: {}", queued.id, queued.job, e);
                            JobStatus::Failed {
                                error: e.to_string(),
                            }
                        }
                    };
                    set_status(&statuses, &events, &queued.id, status);
                    drop(permit);
                });
            }
            info!("Job dispatcher stopped");
        });

        JobSchedulerHandle {
            tx,
            statuses,
            events_tx,
        }
    }
}

/// Handle for enqueueing jobs and observing their progress.
#[derive(Clone)]
pub struct JobSchedulerHandle {
    tx: mpsc::UnboundedSender<QueuedJob>,
    statuses: Arc<Mutex<HashMap<JobId, JobStatus>>>,
    events_tx: broadcast::Sender<JobEvent>,
}

impl JobSchedulerHandle {
    pub fn enqueue(&self, job: Job) -> JobId {
        let id = Uuid::new_v4().to_string();
        set_status(&self.statuses, &self.events_tx, &id, JobStatus::Queued);
        if self.tx.send(QueuedJob {
            id: id.clone(),
            job,
        })
        .is_err()
        {
            warn!("Job queue is closed; job {id} will not run");
            set_status(
                &self.statuses,
                &self.events_tx,
                &id,
                JobStatus::Failed {
                    error: "job queue is closed".to_string(),
                },
            );
        }
        id
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.statuses.lock().ok()?.get(job_id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events_tx.subscribe()
    }

    /// Close the queue. Jobs already queued still drain; new enqueues fail.
    /// Other clones of the handle keep the queue open until they drop too.
    pub fn shutdown(self) {
        drop(self.tx);
    }
}

fn set_status(
    statuses: &Mutex<HashMap<JobId, JobStatus>>,
    events: &broadcast::Sender<JobEvent>,
    job_id: &str,
    status: JobStatus,
) {
    if let Ok(mut map) = statuses.lock() {
        map.insert(job_id.to_string(), status.clone());
    }
    let _ = events.send(JobEvent {
        job_id: job_id.to_string(),
        status,
    });
}

async fn run_job(ctx: &JobContext, job: &Job) -> Result<(), JobError> {
    match job {
        Job::ProcessAudioFile { file_id } => tasks::process_audio_file(ctx, file_id).await,
        Job::ProcessArtworkFile { file_id } => tasks::process_artwork_file(ctx, file_id).await,
        Job::DistributeRelease { release_id } => {
            ctx.distributor.distribute(release_id).await?;
            Ok(())
        }
        Job::CleanupScratch => {
            sweep_once(&ctx.cleanup).await?;
            Ok(())
        }
    }
}
