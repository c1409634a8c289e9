use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

const RELEASE_STATUS_DRAFT: &str = "draft";
const RELEASE_STATUS_PROCESSING: &str = "processing";
const RELEASE_STATUS_DISTRIBUTED: &str = "distributed";
const RELEASE_STATUS_FAILED: &str = "failed";

/// Lifecycle status for a release.
///
/// `Distributed` and `Failed` are terminal for a distribution run. A release
/// only re-enters the machine after being reset to `Draft` by the upload flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum ReleaseStatus {
    Draft,
    Processing,
    Distributed,
    Failed,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Draft => RELEASE_STATUS_DRAFT,
            ReleaseStatus::Processing => RELEASE_STATUS_PROCESSING,
            ReleaseStatus::Distributed => RELEASE_STATUS_DISTRIBUTED,
            ReleaseStatus::Failed => RELEASE_STATUS_FAILED,
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            RELEASE_STATUS_PROCESSING => ReleaseStatus::Processing,
            RELEASE_STATUS_DISTRIBUTED => ReleaseStatus::Distributed,
            RELEASE_STATUS_FAILED => ReleaseStatus::Failed,
            _ => ReleaseStatus::Draft,
        }
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an uploaded file is: the audio itself or cover artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum FileKind {
    Audio,
    Artwork,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Audio => "audio",
            FileKind::Artwork => "artwork",
        }
    }
}

/// Processing status for an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

/// Status of one release's submission to one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Processing,
    Distributed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Processing => "processing",
            AttemptStatus::Distributed => "distributed",
            AttemptStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's submitted release — the aggregate root of the distribution flow.
///
/// Files belong to exactly one release and are destroyed with it (FK cascade).
/// `distribution_summary` is the per-platform outcome map, serialized as JSON
/// and written exactly once when the fan-out aggregation commits the terminal
/// state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DbRelease {
    pub id: String,
    pub user_id: String,
    /// Notification recipient. Account data itself lives outside this core;
    /// the address is denormalized here so the dispatcher needs no user store.
    pub user_email: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub genre: String,
    pub description: Option<String>,
    /// Comma-separated free-form tags
    pub tags: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub status: ReleaseStatus,
    /// JSON map platform name -> outcome, set at aggregation time
    pub distribution_summary: Option<String>,
    pub distributed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbRelease {
    pub fn new(user_id: &str, user_email: &str, title: &str, artist: &str, genre: &str) -> Self {
        let now = Utc::now();
        DbRelease {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            user_email: user_email.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            genre: genre.to_string(),
            description: None,
            tags: None,
            release_date: None,
            status: ReleaseStatus::Draft,
            distribution_summary: None,
            distributed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An uploaded file (audio or artwork) belonging to a release.
///
/// The metadata columns are populated by the processing job once extraction
/// succeeds; `processing_error` records why a file was marked failed.
/// `file_path` is a logical reference resolved through the `FileStore` seam —
/// this core never decides where bytes actually live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DbFile {
    pub id: String,
    pub release_id: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_kind: FileKind,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    /// Audio properties (audio files only)
    pub duration_secs: Option<i64>,
    pub bitrate: Option<i64>,
    pub sample_rate: Option<i64>,
    pub channels: Option<i64>,
    /// Image dimensions (artwork files only)
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbFile {
    pub fn new(
        release_id: &str,
        original_filename: &str,
        file_path: &str,
        file_kind: FileKind,
        file_size: i64,
    ) -> Self {
        let now = Utc::now();
        DbFile {
            id: Uuid::new_v4().to_string(),
            release_id: release_id.to_string(),
            original_filename: original_filename.to_string(),
            file_path: file_path.to_string(),
            file_kind,
            file_size,
            mime_type: None,
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            duration_secs: None,
            bitrate: None,
            sample_rate: None,
            channels: None,
            width: None,
            height: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A distribution destination. Read-only reference data for the state machine;
/// rows are seeded at deploy time and toggled via `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DbPlatform {
    pub id: String,
    /// Stable lookup name, unique (e.g. "spotify")
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    /// Upper bound on a single audio file, in bytes
    pub max_file_size: Option<i64>,
    /// Comma-separated container extensions the platform ingests
    pub supported_formats: Option<String>,
    pub endpoint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbPlatform {
    pub fn new(name: &str, display_name: &str) -> Self {
        let now = Utc::now();
        DbPlatform {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            is_active: true,
            max_file_size: None,
            supported_formats: None,
            endpoint: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Extensions this platform ingests, lowercased. Empty means "no restriction".
    pub fn supported_extensions(&self) -> Vec<String> {
        self.supported_formats
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// The record of one release's submission to one platform.
///
/// One row per (release, platform) pair; retries accumulate on the same row
/// via `retry_count` rather than inserting new rows. `platform_release_id`
/// and `platform_url` are populated on success and never on failure.
/// `retry_count` is bookkeeping for an external retry policy — nothing in
/// this core re-submits automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DbDistributionAttempt {
    pub id: String,
    pub release_id: String,
    pub platform_id: String,
    pub status: AttemptStatus,
    pub platform_release_id: Option<String>,
    pub platform_url: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub distributed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbDistributionAttempt {
    pub fn new(release_id: &str, platform_id: &str) -> Self {
        let now = Utc::now();
        DbDistributionAttempt {
            id: Uuid::new_v4().to_string(),
            release_id: release_id.to_string(),
            platform_id: platform_id.to_string(),
            status: AttemptStatus::Pending,
            platform_release_id: None,
            platform_url: None,
            error_message: None,
            retry_count: 0,
            distributed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
