//! Integration tests for the distribution state machine.
//!
//! Each test runs against a real SQLite database in a temp dir, with a
//! scripted platform client and a capturing mail transport.

mod support;

use airlift_core::db::{
    AttemptStatus, Database, DbFile, DbPlatform, DbRelease, FileKind, ProcessingStatus,
    ReleaseStatus,
};
use airlift_core::distribution::{DistributionError, Distributor, PlatformClient};
use airlift_core::notify::{MailTransport, Notifier};
use std::sync::Arc;
use std::time::Duration;
use support::{
    tracing_init, CapturingTransport, RejectingTransport, ScriptedPlatformClient,
};
use tempfile::TempDir;

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

async fn temp_database() -> (TempDir, Database) {
    let temp = TempDir::new().expect("temp dir");
    let db = Database::new(temp.path().join("airlift.db"))
        .await
        .expect("database");
    (temp, db)
}

/// Insert a draft release with one processed audio file.
async fn seed_release(db: &Database) -> DbRelease {
    let release = DbRelease::new("u1", "u1@example.com", "Night Drive", "Mara", "electronic");
    db.insert_release(&release).await.unwrap();

    let mut file = DbFile::new(
        &release.id,
        "night_drive.wav",
        "uploads/night_drive.wav",
        FileKind::Audio,
        5_000_000,
    );
    file.processing_status = ProcessingStatus::Completed;
    db.insert_file(&file).await.unwrap();
    release
}

async fn seed_platforms(db: &Database, names: &[(&str, &str)]) -> Vec<DbPlatform> {
    let mut platforms = Vec::new();
    for (name, display_name) in names {
        let platform = DbPlatform::new(name, display_name);
        db.insert_platform(&platform).await.unwrap();
        platforms.push(platform);
    }
    platforms
}

fn distributor(
    db: &Database,
    client: Arc<dyn PlatformClient>,
    transport: Arc<dyn MailTransport>,
) -> Distributor {
    let notifier = Arc::new(Notifier::new(transport, "noreply@airlift.dev"));
    Distributor::new(db.clone(), client, notifier, ATTEMPT_TIMEOUT)
}

#[tokio::test]
async fn partial_platform_failure_still_distributes_the_release() {
    tracing_init();
    let (_temp, db) = temp_database().await;
    let release = seed_release(&db).await;
    seed_platforms(
        &db,
        &[
            ("spotify", "Spotify"),
            ("apple music", "Apple Music"),
            ("youtube music", "YouTube Music"),
        ],
    )
    .await;

    let transport = CapturingTransport::new();
    let distributor = distributor(
        &db,
        Arc::new(ScriptedPlatformClient::failing_for(&["apple music"])),
        Arc::new(transport.clone()),
    );

    let report = distributor.distribute(&release.id).await.unwrap();
    assert_eq!(report.status, ReleaseStatus::Distributed);
    assert_eq!(report.outcomes.len(), 3);

    // Release-level success is decoupled from per-platform failures
    let loaded = db.get_release(&release.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ReleaseStatus::Distributed);
    assert!(loaded.distributed_at.is_some());

    let attempts = db.attempts_for_release(&release.id).await.unwrap();
    assert_eq!(attempts.len(), 3);
    let distributed: Vec<_> = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Distributed)
        .collect();
    let failed: Vec<_> = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Failed)
        .collect();
    assert_eq!(distributed.len(), 2);
    assert_eq!(failed.len(), 1);

    // URL/id populated exactly on success
    for attempt in &distributed {
        assert!(attempt.platform_url.is_some());
        assert!(attempt.platform_release_id.is_some());
        assert!(attempt.error_message.is_none());
    }
    let failed = failed[0];
    assert!(failed.platform_url.is_none());
    assert!(failed.platform_release_id.is_none());
    assert_eq!(failed.retry_count, 1);
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("rejected the release"));

    // One notification listing all three outcomes
    let messages = transport.messages().await;
    assert_eq!(messages.len(), 1);
    let body = &messages[0].html_body;
    assert!(body.contains("Spotify"));
    assert!(body.contains("Apple Music"));
    assert!(body.contains("YouTube Music"));
    assert!(body.contains("Failed - Apple Music ingestion rejected the release"));

    // Summary persisted on the release
    let summary: serde_json::Value =
        serde_json::from_str(loaded.distribution_summary.as_deref().unwrap()).unwrap();
    assert_eq!(summary["spotify"]["status"], "success");
    assert_eq!(summary["apple music"]["status"], "failed");
}

#[tokio::test]
async fn distribution_from_non_draft_state_is_rejected_without_writes() {
    tracing_init();
    let (_temp, db) = temp_database().await;
    let release = seed_release(&db).await;
    seed_platforms(&db, &[("spotify", "Spotify")]).await;
    db.update_release_status(&release.id, ReleaseStatus::Processing)
        .await
        .unwrap();

    let transport = CapturingTransport::new();
    let distributor = distributor(
        &db,
        Arc::new(ScriptedPlatformClient::succeeding()),
        Arc::new(transport.clone()),
    );

    let err = distributor.distribute(&release.id).await.unwrap_err();
    assert!(matches!(
        err,
        DistributionError::InvalidState {
            status: ReleaseStatus::Processing,
            ..
        }
    ));

    // No transition, no attempts, no notification
    let loaded = db.get_release(&release.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ReleaseStatus::Processing);
    assert!(db
        .attempts_for_release(&release.id)
        .await
        .unwrap()
        .is_empty());
    assert!(transport.messages().await.is_empty());
}

#[tokio::test]
async fn terminal_states_are_rejected_as_start_states() {
    tracing_init();
    let (_temp, db) = temp_database().await;
    let transport = Arc::new(CapturingTransport::new());

    for status in [ReleaseStatus::Distributed, ReleaseStatus::Failed] {
        let release = seed_release(&db).await;
        db.update_release_status(&release.id, status).await.unwrap();
        let distributor = distributor(
            &db,
            Arc::new(ScriptedPlatformClient::succeeding()),
            transport.clone(),
        );
        let err = distributor.distribute(&release.id).await.unwrap_err();
        assert!(matches!(err, DistributionError::InvalidState { .. }));
    }
}

#[tokio::test]
async fn unknown_release_is_reported_as_not_found() {
    tracing_init();
    let (_temp, db) = temp_database().await;
    let distributor = distributor(
        &db,
        Arc::new(ScriptedPlatformClient::succeeding()),
        Arc::new(CapturingTransport::new()),
    );
    let err = distributor.distribute("no-such-release").await.unwrap_err();
    assert!(matches!(err, DistributionError::ReleaseNotFound(_)));
}

#[tokio::test]
async fn release_without_processed_audio_fails_before_any_attempt() {
    tracing_init();
    let (_temp, db) = temp_database().await;
    seed_platforms(&db, &[("spotify", "Spotify")]).await;

    // Draft release whose only audio file is still pending
    let release = DbRelease::new("u1", "u1@example.com", "Unfinished", "Mara", "ambient");
    db.insert_release(&release).await.unwrap();
    let file = DbFile::new(
        &release.id,
        "raw.wav",
        "uploads/raw.wav",
        FileKind::Audio,
        1_000,
    );
    db.insert_file(&file).await.unwrap();

    let transport = CapturingTransport::new();
    let distributor = distributor(
        &db,
        Arc::new(ScriptedPlatformClient::succeeding()),
        Arc::new(transport.clone()),
    );

    let report = distributor.distribute(&release.id).await.unwrap();
    assert_eq!(report.status, ReleaseStatus::Failed);
    assert!(report.outcomes.is_empty());

    let loaded = db.get_release(&release.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ReleaseStatus::Failed);
    assert!(db
        .attempts_for_release(&release.id)
        .await
        .unwrap()
        .is_empty());

    // The terminal state still produces a notification
    let messages = transport.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].subject.contains("Distribution Failed"));
}

#[tokio::test]
async fn notification_failure_never_rolls_back_the_release() {
    tracing_init();
    let (_temp, db) = temp_database().await;
    let release = seed_release(&db).await;
    seed_platforms(&db, &[("spotify", "Spotify")]).await;

    let distributor = distributor(
        &db,
        Arc::new(ScriptedPlatformClient::succeeding()),
        Arc::new(RejectingTransport),
    );

    let report = distributor.distribute(&release.id).await.unwrap();
    assert_eq!(report.status, ReleaseStatus::Distributed);

    let loaded = db.get_release(&release.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ReleaseStatus::Distributed);
    assert!(loaded.distribution_summary.is_some());
}

#[tokio::test]
async fn stalled_platform_attempt_times_out_as_a_failed_attempt() {
    tracing_init();
    let (_temp, db) = temp_database().await;
    let release = seed_release(&db).await;
    seed_platforms(&db, &[("spotify", "Spotify")]).await;

    let notifier = Arc::new(Notifier::new(
        Arc::new(CapturingTransport::new()),
        "noreply@airlift.dev",
    ));
    let distributor = Distributor::new(
        db.clone(),
        Arc::new(ScriptedPlatformClient::stalling(Duration::from_secs(60))),
        notifier,
        Duration::from_millis(100),
    );

    let report = distributor.distribute(&release.id).await.unwrap();
    // The timed-out platform fails; the release still reaches distributed
    assert_eq!(report.status, ReleaseStatus::Distributed);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, AttemptStatus::Failed);
    assert!(report.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("timed out"));

    let attempts = db.attempts_for_release(&release.id).await.unwrap();
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(attempts[0].retry_count, 1);
}

#[tokio::test]
async fn rerunning_after_reset_reuses_attempt_rows() {
    tracing_init();
    let (_temp, db) = temp_database().await;
    let release = seed_release(&db).await;
    seed_platforms(&db, &[("spotify", "Spotify")]).await;

    let transport = Arc::new(CapturingTransport::new());

    // First run: platform down
    let failing = distributor(
        &db,
        Arc::new(ScriptedPlatformClient::failing_for(&["spotify"])),
        transport.clone(),
    );
    failing.distribute(&release.id).await.unwrap();

    // Upload flow resets the release to draft for another run
    db.update_release_status(&release.id, ReleaseStatus::Draft)
        .await
        .unwrap();

    let succeeding = distributor(
        &db,
        Arc::new(ScriptedPlatformClient::succeeding()),
        transport.clone(),
    );
    succeeding.distribute(&release.id).await.unwrap();

    // One row accumulated both runs: now distributed, retry from the failure kept
    let attempts = db.attempts_for_release(&release.id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Distributed);
    assert_eq!(attempts[0].retry_count, 1);
    assert!(attempts[0].platform_url.is_some());
}
