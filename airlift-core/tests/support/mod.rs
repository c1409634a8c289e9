//! Shared helpers for integration tests: synthesized audio fixtures, a
//! capturing mail transport and a scriptable platform client.

use airlift_core::distribution::{PlatformClient, PlatformSubmission, SubmissionError};
use airlift_core::db::{DbFile, DbPlatform, DbRelease};
use airlift_core::notify::{MailTransport, NotifyError, OutboundEmail};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Initialize tracing for tests
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_line_number(true)
        .with_target(false)
        .with_file(true)
        .try_init();
}

/// Write a minimal PCM WAV file: 16-bit little-endian, all-zero samples.
pub fn write_wav(path: &Path, seconds: u32, sample_rate: u32, channels: u16) {
    let bytes_per_sample: u32 = 2;
    let byte_rate = sample_rate * channels as u32 * bytes_per_sample;
    let data_len = byte_rate * seconds;

    let mut buf = Vec::with_capacity(44 + data_len as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&(channels * bytes_per_sample as u16).to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    buf.resize(44 + data_len as usize, 0);

    std::fs::write(path, buf).unwrap();
}

/// Build a FLAC file out of metadata blocks alone: a STREAMINFO declaring the
/// stream parameters, and an optional VORBIS_COMMENT block.
pub fn write_flac(
    path: &Path,
    sample_rate: u32,
    channels: u32,
    bps: u32,
    total_samples: u64,
    comments: &[(&str, &str)],
) {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"fLaC");

    // STREAMINFO block header: type=0, length=34
    let streaminfo_last = comments.is_empty();
    buf.push(if streaminfo_last { 0x80 } else { 0x00 });
    buf.extend_from_slice(&[0x00, 0x00, 34]);

    // min/max block size (2+2), min/max frame size (3+3)
    buf.extend_from_slice(&[0x10, 0x00, 0x10, 0x00]);
    buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    // sample rate (20 bits) | channels-1 (3 bits) | bps-1 (5 bits) | total_samples (36 bits)
    let ch_minus_1 = (channels - 1) & 0x07;
    let bps_minus_1 = (bps - 1) & 0x1F;
    let ts_high = ((total_samples >> 32) & 0x0F) as u32;
    buf.push((sample_rate >> 12) as u8);
    buf.push(((sample_rate >> 4) & 0xFF) as u8);
    buf.push((((sample_rate & 0x0F) as u8) << 4) | ((ch_minus_1 as u8) << 1) | ((bps_minus_1 >> 4) as u8));
    buf.push((((bps_minus_1 & 0x0F) as u8) << 4) | ts_high as u8);
    let ts_low = (total_samples & 0xFFFF_FFFF) as u32;
    buf.extend_from_slice(&ts_low.to_be_bytes());

    // MD5 signature
    buf.extend_from_slice(&[0u8; 16]);

    if !comments.is_empty() {
        // VORBIS_COMMENT block: little-endian lengths, "KEY=value" entries
        let mut body = Vec::new();
        let vendor = b"airlift-test";
        body.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        body.extend_from_slice(vendor);
        body.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for (key, value) in comments {
            let entry = format!("{key}={value}");
            body.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            body.extend_from_slice(entry.as_bytes());
        }

        buf.push(0x80 | 0x04); // last block, type=4
        let len = body.len() as u32;
        buf.push(((len >> 16) & 0xFF) as u8);
        buf.push(((len >> 8) & 0xFF) as u8);
        buf.push((len & 0xFF) as u8);
        buf.extend_from_slice(&body);
    }

    std::fs::write(path, buf).unwrap();
}

/// Mail transport that records every message instead of delivering it.
#[derive(Clone, Default)]
pub struct CapturingTransport {
    pub sent: Arc<Mutex<Vec<OutboundEmail>>>,
}

impl CapturingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for CapturingTransport {
    async fn send(&self, message: &OutboundEmail) -> Result<(), NotifyError> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Mail transport that always rejects.
pub struct RejectingTransport;

#[async_trait]
impl MailTransport for RejectingTransport {
    async fn send(&self, _message: &OutboundEmail) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("smtp relay said no".to_string()))
    }
}

/// Platform client that fails for a configured set of platform names and can
/// stall to exercise the attempt timeout.
pub struct ScriptedPlatformClient {
    pub fail: HashSet<String>,
    pub stall: Option<Duration>,
}

impl ScriptedPlatformClient {
    pub fn succeeding() -> Self {
        ScriptedPlatformClient {
            fail: HashSet::new(),
            stall: None,
        }
    }

    pub fn failing_for(names: &[&str]) -> Self {
        ScriptedPlatformClient {
            fail: names.iter().map(|n| n.to_string()).collect(),
            stall: None,
        }
    }

    pub fn stalling(stall: Duration) -> Self {
        ScriptedPlatformClient {
            fail: HashSet::new(),
            stall: Some(stall),
        }
    }
}

#[async_trait]
impl PlatformClient for ScriptedPlatformClient {
    async fn submit(
        &self,
        release: &DbRelease,
        _files: &[DbFile],
        platform: &DbPlatform,
    ) -> Result<PlatformSubmission, SubmissionError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if self.fail.contains(&platform.name) {
            return Err(SubmissionError::new(format!(
                "{} ingestion rejected the release",
                platform.display_name
            )));
        }
        Ok(PlatformSubmission {
            platform_release_id: format!("{}_{}", platform.name, release.id),
            platform_url: format!("https://{}.example/release/{}", platform.name, release.id),
        })
    }
}
