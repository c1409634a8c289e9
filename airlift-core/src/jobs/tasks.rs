//! Job bodies for file processing.
//!
//! Extraction and validation failures abort the owning job and are recorded
//! on the file row; the job's failed status mirrors what the database says.

use super::{JobContext, JobError};
use tracing::{info, warn};

pub(super) async fn process_audio_file(ctx: &JobContext, file_id: &str) -> Result<(), JobError> {
    let file = ctx
        .database
        .get_file(file_id)
        .await?
        .ok_or_else(|| JobError::FileNotFound(file_id.to_string()))?;
    ctx.database.mark_file_processing(&file.id).await?;

    let extraction = {
        let extractor = ctx.extractor.clone();
        let path = ctx.store.resolve(&file.file_path);
        tokio::task::spawn_blocking(move || extractor.extract(&path)).await?
    };

    let metadata = match extraction {
        Ok(metadata) => metadata,
        Err(e) => {
            ctx.database
                .mark_file_failed(&file.id, &e.to_string())
                .await?;
            return Err(e.into());
        }
    };

    let report = ctx
        .validation
        .validate(&metadata, file.file_size.max(0) as u64);
    for warning in &report.warnings {
        warn!("File {} ({}): {}", file.id, file.original_filename, warning);
    }
    if !report.is_valid() {
        let message = report.errors.join("; ");
        ctx.database.mark_file_failed(&file.id, &message).await?;
        return Err(JobError::ValidationFailed(message));
    }

    ctx.database.complete_audio_file(&file.id, &metadata).await?;
    info!(
        "Processed audio file {} ({}): {}s, {} Hz",
        file.id, file.original_filename, metadata.duration_secs, metadata.sample_rate
    );
    Ok(())
}

pub(super) async fn process_artwork_file(ctx: &JobContext, file_id: &str) -> Result<(), JobError> {
    let file = ctx
        .database
        .get_file(file_id)
        .await?
        .ok_or_else(|| JobError::FileNotFound(file_id.to_string()))?;
    ctx.database.mark_file_processing(&file.id).await?;

    let bytes = match ctx.store.read(&file.file_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            ctx.database
                .mark_file_failed(&file.id, &e.to_string())
                .await?;
            return Err(e.into());
        }
    };

    let processed = {
        let processor = ctx.artwork.clone();
        tokio::task::spawn_blocking(move || processor.process(&bytes)).await?
    };

    let artwork = match processed {
        Ok(artwork) => artwork,
        Err(e) => {
            ctx.database
                .mark_file_failed(&file.id, &e.to_string())
                .await?;
            return Err(e.into());
        }
    };

    // The normalized JPEG replaces the original upload
    ctx.store.write(&file.file_path, &artwork.data).await?;
    ctx.database
        .complete_artwork_file(&file.id, artwork.width, artwork.height, artwork.size_bytes as i64)
        .await?;
    info!(
        "Processed artwork file {} ({}): {}x{}",
        file.id, file.original_filename, artwork.width, artwork.height
    );
    Ok(())
}
