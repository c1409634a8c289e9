//! The release distribution state machine.
//!
//! draft -> processing -> distributed | failed
//!
//! Once a release enters `processing`, submission attempts fan out
//! concurrently, one task per active platform. Attempts are isolated: each
//! settles on its own (success, rejection, timeout or panic) and commits its
//! own attempt row. A join barrier waits for every attempt before the
//! release's terminal state is computed.
//!
//! Release-level success is decoupled from per-platform success: the release
//! ends `distributed` even when individual platforms failed. Per-platform
//! failures are visible only on the attempt records. `failed` is reserved for
//! a release that never had distributable content to begin with.

mod platforms;

pub use platforms::{PlatformClient, PlatformSubmission, SubmissionError, TemplatedPlatformClient};

use crate::db::{AttemptStatus, Database, DbFile, DbPlatform, DbRelease, FileKind,
    ProcessingStatus, ReleaseStatus};
use crate::notify::Notifier;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("release not found: {0}")]
    ReleaseNotFound(String),
    #[error("release {id} cannot start distribution from status '{status}'")]
    InvalidState { id: String, status: ReleaseStatus },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How one platform fared in a distribution run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformOutcome {
    pub platform_name: String,
    pub status: AttemptStatus,
    pub url: Option<String>,
    pub error: Option<String>,
}

/// The aggregate result of one distribution run.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionReport {
    pub release_id: String,
    pub status: ReleaseStatus,
    pub outcomes: Vec<PlatformOutcome>,
}

/// Drives releases through the distribution lifecycle.
pub struct Distributor {
    database: Database,
    client: Arc<dyn PlatformClient>,
    notifier: Arc<Notifier>,
    /// Hard bound on a single platform submission; a timed-out attempt is
    /// recorded as failed like any other rejection.
    attempt_timeout: Duration,
}

impl Distributor {
    pub fn new(
        database: Database,
        client: Arc<dyn PlatformClient>,
        notifier: Arc<Notifier>,
        attempt_timeout: Duration,
    ) -> Self {
        Distributor {
            database,
            client,
            notifier,
            attempt_timeout,
        }
    }

    /// Run one full distribution for a release.
    ///
    /// Fails with `InvalidState` (writing nothing) unless the release is in
    /// `draft`. A release with no processed audio transitions straight to
    /// `failed` with zero attempts. Otherwise the release always ends
    /// `distributed`, with per-platform results on the attempt rows, and one
    /// notification is emitted for the terminal state.
    pub async fn distribute(&self, release_id: &str) -> Result<DistributionReport, DistributionError> {
        let release = self
            .database
            .get_release(release_id)
            .await?
            .ok_or_else(|| DistributionError::ReleaseNotFound(release_id.to_string()))?;

        if release.status != ReleaseStatus::Draft {
            return Err(DistributionError::InvalidState {
                id: release.id,
                status: release.status,
            });
        }

        self.database
            .update_release_status(&release.id, ReleaseStatus::Processing)
            .await?;
        info!("Release {} entered processing", release.id);

        let files = self.database.files_for_release(&release.id).await?;
        let has_distributable_audio = files.iter().any(|f| {
            f.file_kind == FileKind::Audio && f.processing_status == ProcessingStatus::Completed
        });
        if !has_distributable_audio {
            self.database
                .update_release_status(&release.id, ReleaseStatus::Failed)
                .await?;
            warn!(
                "Release {} failed distribution: no processed audio file",
                release.id
            );
            self.send_failure_notice(&release, "The release has no processed audio file.")
                .await;
            return Ok(DistributionReport {
                release_id: release.id,
                status: ReleaseStatus::Failed,
                outcomes: Vec::new(),
            });
        }

        let platforms = self.database.list_active_platforms().await?;
        let outcomes = self.fan_out(&release, &files, platforms).await?;

        let summary = serde_json::to_string(&summary_map(&outcomes))?;
        self.database
            .mark_release_distributed(&release.id, &summary)
            .await?;
        info!(
            "Release {} distributed: {}/{} platforms succeeded",
            release.id,
            outcomes
                .iter()
                .filter(|o| o.status == AttemptStatus::Distributed)
                .count(),
            outcomes.len()
        );

        if let Err(e) = self
            .notifier
            .notify_distribution_complete(&release.user_email, &release.title, &outcomes)
            .await
        {
            // Best-effort: the terminal state is already committed
            warn!(
                "Failed to send distribution notification for {}: {}",
                release.id, e
            );
        }

        Ok(DistributionReport {
            release_id: release.id,
            status: ReleaseStatus::Distributed,
            outcomes,
        })
    }

    /// Submit to every platform concurrently and wait for all of them.
    async fn fan_out(
        &self,
        release: &DbRelease,
        files: &[DbFile],
        platforms: Vec<DbPlatform>,
    ) -> Result<Vec<PlatformOutcome>, DistributionError> {
        let mut tasks = JoinSet::new();
        // Attempt bookkeeping per task id, so even a panicking task still
        // gets its failure recorded.
        let mut in_flight: HashMap<tokio::task::Id, (String, String)> = HashMap::new();

        for platform in platforms {
            let attempt = self.database.ensure_attempt(&release.id, &platform.id).await?;
            let database = self.database.clone();
            let client = self.client.clone();
            let release = release.clone();
            let files = files.to_vec();
            let attempt_id = attempt.id.clone();
            let platform_name = platform.name.clone();
            let attempt_timeout = self.attempt_timeout;

            let handle = tasks.spawn(async move {
                run_attempt(
                    database,
                    client,
                    release,
                    files,
                    platform,
                    attempt.id,
                    attempt_timeout,
                )
                .await
            });
            in_flight.insert(handle.id(), (attempt_id, platform_name));
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, outcome)) => {
                    in_flight.remove(&task_id);
                    outcomes.push(outcome);
                }
                Err(join_error) => {
                    // A panicked attempt must not abort its siblings
                    let Some((attempt_id, platform_name)) = in_flight.remove(&join_error.id())
                    else {
                        warn!("Unknown submission task failed: {join_error}");
                        continue;
                    };
                    let message = format!("submission task aborted: {join_error}");
                    warn!("{platform_name}: {message}");
                    if let Err(e) = self
                        .database
                        .record_attempt_failure(&attempt_id, &message)
                        .await
                    {
                        warn!("Failed to record aborted attempt {attempt_id}: {e}");
                    }
                    outcomes.push(PlatformOutcome {
                        platform_name,
                        status: AttemptStatus::Failed,
                        url: None,
                        error: Some(message),
                    });
                }
            }
        }

        outcomes.sort_by(|a, b| a.platform_name.cmp(&b.platform_name));
        Ok(outcomes)
    }

    async fn send_failure_notice(&self, release: &DbRelease, reason: &str) {
        if let Err(e) = self
            .notifier
            .notify_distribution_failed(&release.user_email, &release.title, reason)
            .await
        {
            warn!(
                "Failed to send distribution failure notification for {}: {}",
                release.id, e
            );
        }
    }
}

/// One isolated submission attempt. Always resolves to an outcome; errors are
/// captured as data on the attempt row, never propagated.
async fn run_attempt(
    database: Database,
    client: Arc<dyn PlatformClient>,
    release: DbRelease,
    files: Vec<DbFile>,
    platform: DbPlatform,
    attempt_id: String,
    attempt_timeout: Duration,
) -> PlatformOutcome {
    if let Err(e) = database.mark_attempt_processing(&attempt_id).await {
        warn!("Failed to mark attempt {attempt_id} processing: {e}");
    }

    let submission = match timeout(
        attempt_timeout,
        client.submit(&release, &files, &platform),
    )
    .await
    {
        Ok(Ok(submission)) => Ok(submission),
        Ok(Err(rejection)) => Err(rejection.message),
        Err(_) => Err(format!(
            "submission to {} timed out after {}s",
            platform.name,
            attempt_timeout.as_secs()
        )),
    };

    match submission {
        Ok(submission) => {
            if let Err(e) = database
                .record_attempt_success(
                    &attempt_id,
                    &submission.platform_release_id,
                    &submission.platform_url,
                )
                .await
            {
                let message = format!("failed to commit successful attempt: {e}");
                warn!("{}: {message}", platform.name);
                return PlatformOutcome {
                    platform_name: platform.name,
                    status: AttemptStatus::Failed,
                    url: None,
                    error: Some(message),
                };
            }
            info!(
                "Release {} distributed to {} ({})",
                release.id, platform.name, submission.platform_url
            );
            PlatformOutcome {
                platform_name: platform.name,
                status: AttemptStatus::Distributed,
                url: Some(submission.platform_url),
                error: None,
            }
        }
        Err(message) => {
            warn!("Distribution to {} failed: {}", platform.name, message);
            if let Err(e) = database.record_attempt_failure(&attempt_id, &message).await {
                warn!("Failed to record attempt failure {attempt_id}: {e}");
            }
            PlatformOutcome {
                platform_name: platform.name,
                status: AttemptStatus::Failed,
                url: None,
                error: Some(message),
            }
        }
    }
}

/// The summary persisted on the release: platform name -> outcome, in the
/// original notification payload shape.
fn summary_map(outcomes: &[PlatformOutcome]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for outcome in outcomes {
        let entry = match (&outcome.status, &outcome.url) {
            (AttemptStatus::Distributed, Some(url)) => serde_json::json!({
                "status": "success",
                "url": url,
            }),
            _ => serde_json::json!({
                "status": "failed",
                "error": outcome.error.as_deref().unwrap_or("Unknown error"),
            }),
        };
        map.insert(outcome.platform_name.clone(), entry);
    }
    serde_json::Value::Object(map)
}
