//! Upload acceptance policy for extracted audio metadata.
//!
//! Policy checks are outcomes, not errors: every rule is evaluated and the
//! caller gets the full list. Only errors block a file; warnings are logged
//! and kept for display.

use crate::metadata::AudioMetadata;
use serde::{Deserialize, Serialize};

/// Thresholds for audio acceptance. Defaults match the platform's published
/// upload requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub min_duration_secs: u64,
    pub min_sample_rate: u32,
    /// Bits per second; only enforced when the container reports a bitrate
    pub min_bitrate: u32,
    pub min_file_size: u64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        ValidationPolicy {
            min_duration_secs: 30,
            min_sample_rate: 44_100,
            min_bitrate: 128_000,
            // ~30 seconds at 128kbps
            min_file_size: 480_000,
        }
    }
}

/// The outcome of validating one audio file. Errors hard-fail the file;
/// warnings never affect validity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ValidationPolicy {
    /// Evaluate every rule against the extracted metadata. Rules are
    /// independent; none short-circuits the others.
    pub fn validate(&self, metadata: &AudioMetadata, file_size: u64) -> ValidationReport {
        let mut report = ValidationReport::default();

        if metadata.duration_secs < self.min_duration_secs {
            report.errors.push(format!(
                "audio must be at least {} seconds long",
                self.min_duration_secs
            ));
        }

        if metadata.sample_rate < self.min_sample_rate {
            report
                .warnings
                .push("sample rate is below 44.1kHz".to_string());
        }

        if let Some(bitrate) = metadata.bitrate {
            if bitrate < self.min_bitrate {
                report.warnings.push("bitrate is below 128kbps".to_string());
            }
        }

        if file_size < self.min_file_size {
            report
                .warnings
                .push("file size seems unusually small".to_string());
        }

        report
    }
}
