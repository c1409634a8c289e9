//! SQLite persistence for releases, files, platforms and distribution attempts.
//!
//! The schema is created on open. Every status change is a single-statement
//! commit, which is what lets the fan-out record attempt outcomes
//! independently without coordinating writers.

mod models;

pub use models::{
    AttemptStatus, DbDistributionAttempt, DbFile, DbPlatform, DbRelease, FileKind,
    ProcessingStatus, ReleaseStatus,
};

use crate::metadata::AudioMetadata;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `path` and ensure the schema.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let database = Database { pool };
        database.create_schema().await?;
        info!("Database ready at {}", path.as_ref().display());
        Ok(database)
    }

    async fn create_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS releases (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                user_email TEXT NOT NULL,
                title TEXT NOT NULL,
                artist TEXT NOT NULL,
                album TEXT,
                genre TEXT NOT NULL,
                description TEXT,
                tags TEXT,
                release_date TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                distribution_summary TEXT,
                distributed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                release_id TEXT NOT NULL REFERENCES releases(id) ON DELETE CASCADE,
                original_filename TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_kind TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                mime_type TEXT,
                processing_status TEXT NOT NULL DEFAULT 'pending',
                processing_error TEXT,
                duration_secs INTEGER,
                bitrate INTEGER,
                sample_rate INTEGER,
                channels INTEGER,
                width INTEGER,
                height INTEGER,
                processed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_release_kind
                ON files(release_id, file_kind);

            CREATE TABLE IF NOT EXISTS platforms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                max_file_size INTEGER,
                supported_formats TEXT,
                endpoint TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS distribution_attempts (
                id TEXT PRIMARY KEY,
                release_id TEXT NOT NULL REFERENCES releases(id) ON DELETE CASCADE,
                platform_id TEXT NOT NULL REFERENCES platforms(id),
                status TEXT NOT NULL DEFAULT 'pending',
                platform_release_id TEXT,
                platform_url TEXT,
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                distributed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(release_id, platform_id)
            );
            CREATE INDEX IF NOT EXISTS idx_attempts_release
                ON distribution_attempts(release_id);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- releases ---

    pub async fn insert_release(&self, release: &DbRelease) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO releases (id, user_id, user_email, title, artist, album, genre, \
             description, tags, release_date, status, distribution_summary, distributed_at, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&release.id)
        .bind(&release.user_id)
        .bind(&release.user_email)
        .bind(&release.title)
        .bind(&release.artist)
        .bind(&release.album)
        .bind(&release.genre)
        .bind(&release.description)
        .bind(&release.tags)
        .bind(release.release_date)
        .bind(release.status)
        .bind(&release.distribution_summary)
        .bind(release.distributed_at)
        .bind(release.created_at)
        .bind(release.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_release(&self, id: &str) -> Result<Option<DbRelease>, sqlx::Error> {
        sqlx::query_as::<_, DbRelease>("SELECT * FROM releases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn update_release_status(
        &self,
        id: &str,
        status: ReleaseStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE releases SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Commit the distributed terminal state together with the outcome summary.
    pub async fn mark_release_distributed(
        &self,
        id: &str,
        summary_json: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE releases SET status = ?, distribution_summary = ?, distributed_at = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(ReleaseStatus::Distributed)
        .bind(summary_json)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_release(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM releases WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- files ---

    pub async fn insert_file(&self, file: &DbFile) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO files (id, release_id, original_filename, file_path, file_kind, \
             file_size, mime_type, processing_status, processing_error, duration_secs, bitrate, \
             sample_rate, channels, width, height, processed_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.release_id)
        .bind(&file.original_filename)
        .bind(&file.file_path)
        .bind(file.file_kind)
        .bind(file.file_size)
        .bind(&file.mime_type)
        .bind(file.processing_status)
        .bind(&file.processing_error)
        .bind(file.duration_secs)
        .bind(file.bitrate)
        .bind(file.sample_rate)
        .bind(file.channels)
        .bind(file.width)
        .bind(file.height)
        .bind(file.processed_at)
        .bind(file.created_at)
        .bind(file.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_file(&self, id: &str) -> Result<Option<DbFile>, sqlx::Error> {
        sqlx::query_as::<_, DbFile>("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn files_for_release(&self, release_id: &str) -> Result<Vec<DbFile>, sqlx::Error> {
        sqlx::query_as::<_, DbFile>(
            "SELECT * FROM files WHERE release_id = ? ORDER BY created_at, id",
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Files still waiting to be processed, oldest first. The worker drains
    /// these into the job queue.
    pub async fn list_pending_files(&self) -> Result<Vec<DbFile>, sqlx::Error> {
        sqlx::query_as::<_, DbFile>(
            "SELECT * FROM files WHERE processing_status = 'pending' ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn mark_file_processing(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE files SET processing_status = ?, updated_at = ? WHERE id = ?")
            .bind(ProcessingStatus::Processing)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_file_failed(&self, id: &str, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE files SET processing_status = ?, processing_error = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(ProcessingStatus::Failed)
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record extracted audio properties and mark the file completed.
    pub async fn complete_audio_file(
        &self,
        id: &str,
        metadata: &AudioMetadata,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE files SET processing_status = ?, processing_error = NULL, \
             duration_secs = ?, bitrate = ?, sample_rate = ?, channels = ?, \
             processed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(ProcessingStatus::Completed)
        .bind(metadata.duration_secs as i64)
        .bind(metadata.bitrate.map(|b| b as i64))
        .bind(metadata.sample_rate as i64)
        .bind(metadata.channels as i64)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record normalized artwork dimensions and mark the file completed.
    /// Artwork is always re-encoded as JPEG, so the MIME type is fixed here.
    pub async fn complete_artwork_file(
        &self,
        id: &str,
        width: u32,
        height: u32,
        file_size: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE files SET processing_status = ?, processing_error = NULL, \
             width = ?, height = ?, file_size = ?, mime_type = 'image/jpeg', \
             processed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(ProcessingStatus::Completed)
        .bind(width as i64)
        .bind(height as i64)
        .bind(file_size)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- platforms ---

    pub async fn insert_platform(&self, platform: &DbPlatform) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO platforms (id, name, display_name, is_active, max_file_size, \
             supported_formats, endpoint, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&platform.id)
        .bind(&platform.name)
        .bind(&platform.display_name)
        .bind(platform.is_active)
        .bind(platform.max_file_size)
        .bind(&platform.supported_formats)
        .bind(&platform.endpoint)
        .bind(platform.created_at)
        .bind(platform.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_active_platforms(&self) -> Result<Vec<DbPlatform>, sqlx::Error> {
        sqlx::query_as::<_, DbPlatform>(
            "SELECT * FROM platforms WHERE is_active = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn platform_count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM platforms")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // --- distribution attempts ---

    /// Fetch or create the single attempt row for (release, platform).
    /// Re-running a distribution reuses the existing row so retries accumulate.
    pub async fn ensure_attempt(
        &self,
        release_id: &str,
        platform_id: &str,
    ) -> Result<DbDistributionAttempt, sqlx::Error> {
        if let Some(existing) = sqlx::query_as::<_, DbDistributionAttempt>(
            "SELECT * FROM distribution_attempts WHERE release_id = ? AND platform_id = ?",
        )
        .bind(release_id)
        .bind(platform_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(existing);
        }

        let attempt = DbDistributionAttempt::new(release_id, platform_id);
        sqlx::query(
            "INSERT INTO distribution_attempts (id, release_id, platform_id, status, \
             platform_release_id, platform_url, error_message, retry_count, distributed_at, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&attempt.id)
        .bind(&attempt.release_id)
        .bind(&attempt.platform_id)
        .bind(attempt.status)
        .bind(&attempt.platform_release_id)
        .bind(&attempt.platform_url)
        .bind(&attempt.error_message)
        .bind(attempt.retry_count)
        .bind(attempt.distributed_at)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(attempt)
    }

    pub async fn mark_attempt_processing(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE distribution_attempts SET status = ?, updated_at = ? WHERE id = ?")
            .bind(AttemptStatus::Processing)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Commit a successful submission: status, platform id/url, timestamp.
    pub async fn record_attempt_success(
        &self,
        id: &str,
        platform_release_id: &str,
        platform_url: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE distribution_attempts SET status = ?, platform_release_id = ?, \
             platform_url = ?, error_message = NULL, distributed_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(AttemptStatus::Distributed)
        .bind(platform_release_id)
        .bind(platform_url)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Commit a failed submission: the error is data, not control flow.
    /// Clears any stale success fields and bumps `retry_count`.
    pub async fn record_attempt_failure(&self, id: &str, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE distribution_attempts SET status = ?, platform_release_id = NULL, \
             platform_url = NULL, error_message = ?, retry_count = retry_count + 1, \
             updated_at = ? WHERE id = ?",
        )
        .bind(AttemptStatus::Failed)
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn attempts_for_release(
        &self,
        release_id: &str,
    ) -> Result<Vec<DbDistributionAttempt>, sqlx::Error> {
        sqlx::query_as::<_, DbDistributionAttempt>(
            "SELECT * FROM distribution_attempts WHERE release_id = ? ORDER BY created_at, id",
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_database() -> (TempDir, Database) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("airlift.db")).await.unwrap();
        (temp, db)
    }

    #[tokio::test]
    async fn release_round_trip() {
        let (_temp, db) = temp_database().await;
        let release = DbRelease::new("u1", "u1@example.com", "Night Drive", "Mara", "electronic");
        db.insert_release(&release).await.unwrap();

        let loaded = db.get_release(&release.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Night Drive");
        assert_eq!(loaded.status, ReleaseStatus::Draft);
    }

    #[tokio::test]
    async fn deleting_release_cascades_to_files_and_attempts() {
        let (_temp, db) = temp_database().await;
        let release = DbRelease::new("u1", "u1@example.com", "EP", "Mara", "ambient");
        db.insert_release(&release).await.unwrap();

        let file = DbFile::new(&release.id, "a.wav", "uploads/a.wav", FileKind::Audio, 1024);
        db.insert_file(&file).await.unwrap();

        let platform = DbPlatform::new("spotify", "Spotify");
        db.insert_platform(&platform).await.unwrap();
        db.ensure_attempt(&release.id, &platform.id).await.unwrap();

        db.delete_release(&release.id).await.unwrap();

        assert!(db.get_file(&file.id).await.unwrap().is_none());
        assert!(db
            .attempts_for_release(&release.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn ensure_attempt_is_idempotent_per_platform() {
        let (_temp, db) = temp_database().await;
        let release = DbRelease::new("u1", "u1@example.com", "EP", "Mara", "ambient");
        db.insert_release(&release).await.unwrap();
        let platform = DbPlatform::new("spotify", "Spotify");
        db.insert_platform(&platform).await.unwrap();

        let first = db.ensure_attempt(&release.id, &platform.id).await.unwrap();
        let second = db.ensure_attempt(&release.id, &platform.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(db.attempts_for_release(&release.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn attempt_failure_accumulates_retries_and_clears_success_fields() {
        let (_temp, db) = temp_database().await;
        let release = DbRelease::new("u1", "u1@example.com", "EP", "Mara", "ambient");
        db.insert_release(&release).await.unwrap();
        let platform = DbPlatform::new("spotify", "Spotify");
        db.insert_platform(&platform).await.unwrap();

        let attempt = db.ensure_attempt(&release.id, &platform.id).await.unwrap();
        db.record_attempt_success(&attempt.id, "spotify_1", "https://example.com/1")
            .await
            .unwrap();
        db.record_attempt_failure(&attempt.id, "upstream 503")
            .await
            .unwrap();
        db.record_attempt_failure(&attempt.id, "upstream 503 again")
            .await
            .unwrap();

        let attempts = db.attempts_for_release(&release.id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        let attempt = &attempts[0];
        assert_eq!(attempt.status, AttemptStatus::Failed);
        assert_eq!(attempt.retry_count, 2);
        assert!(attempt.platform_release_id.is_none());
        assert!(attempt.platform_url.is_none());
        assert_eq!(attempt.error_message.as_deref(), Some("upstream 503 again"));
    }

    #[tokio::test]
    async fn list_active_platforms_skips_inactive() {
        let (_temp, db) = temp_database().await;
        let active = DbPlatform::new("spotify", "Spotify");
        let mut inactive = DbPlatform::new("defunctfm", "Defunct FM");
        inactive.is_active = false;
        db.insert_platform(&active).await.unwrap();
        db.insert_platform(&inactive).await.unwrap();

        let platforms = db.list_active_platforms().await.unwrap();
        assert_eq!(platforms.len(), 1);
        assert_eq!(platforms[0].name, "spotify");
    }
}
